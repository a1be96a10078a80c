use bytes::BytesMut;
use std::collections::VecDeque;

use crate::codec::Encoder;
use crate::error::{Result, TrackTranscoderError};
use crate::resample::{output_frame_count, AudioResampler, DefaultAudioResampler};
use crate::types::{BufferFlags, BufferInfo, Dequeued, Frame, MediaFormat, Surface};

use super::Renderer;

const BYTES_PER_SAMPLE: usize = 2;
const DEFAULT_CHANNEL_COUNT: usize = 2;

/// Rendered PCM not yet handed to the encoder
#[derive(Debug)]
struct PendingPcm {
    data: Vec<u8>,
    /// Bytes of `data` already queued into the encoder
    offset: usize,
    presentation_time_us: i64,
    flags: BufferFlags,
}

/// Buffer renderer for 16-bit little-endian PCM.
///
/// Resamples when the source and target sample rates differ and splits the
/// result over as many encoder input slots as it needs. End of stream is
/// carried on the last slot only. PCM that does not fit into the free
/// encoder slots is held back until `drain_pending` finds room for it.
pub struct AudioRenderer {
    resampler: Box<dyn AudioResampler>,
    timeout_us: i64,
    source_rate: Option<u32>,
    target_rate: Option<u32>,
    channel_count: usize,
    sample_duration_us: f64,
    /// Running output timestamp while resampling
    next_presentation_time_us: Option<i64>,
    pending: VecDeque<PendingPcm>,
    released: bool,
}

impl AudioRenderer {
    pub fn new(timeout_us: i64) -> Self {
        Self::with_resampler(Box::new(DefaultAudioResampler), timeout_us)
    }

    pub fn with_resampler(resampler: Box<dyn AudioResampler>, timeout_us: i64) -> Self {
        Self {
            resampler,
            timeout_us,
            source_rate: None,
            target_rate: None,
            channel_count: DEFAULT_CHANNEL_COUNT,
            sample_duration_us: 0.0,
            next_presentation_time_us: None,
            pending: VecDeque::new(),
            released: false,
        }
    }

    fn needs_resampling(&self) -> bool {
        matches!((self.source_rate, self.target_rate), (Some(s), Some(t)) if s != t)
    }

    /// Bytes of PCM waiting for encoder input slots
    pub fn pending_bytes(&self) -> usize {
        self.pending.iter().map(|p| p.data.len() - p.offset).sum()
    }

    /// Resample `data`, returning the PCM bytes and their presentation time.
    fn transform(&mut self, data: &[u8], presentation_time_us: i64) -> Result<(Vec<u8>, i64)> {
        let (Some(source_rate), Some(target_rate)) = (self.source_rate, self.target_rate) else {
            return Ok((data.to_vec(), presentation_time_us));
        };
        if source_rate == target_rate {
            return Ok((data.to_vec(), presentation_time_us));
        }

        let input: Vec<i16> = data
            .chunks_exact(BYTES_PER_SAMPLE)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        let expected_frames = output_frame_count(input.len() / self.channel_count, source_rate, target_rate);
        let mut output = Vec::with_capacity(expected_frames * self.channel_count);
        self.resampler
            .resample(&input, source_rate, &mut output, target_rate, self.channel_count)?;

        let pts = *self
            .next_presentation_time_us
            .get_or_insert(presentation_time_us);
        let frames = output.len() / self.channel_count;
        self.next_presentation_time_us = Some(pts + (frames as f64 * self.sample_duration_us) as i64);

        let bytes = output.iter().flat_map(|s| s.to_le_bytes()).collect();
        Ok((bytes, pts))
    }

    /// Bytes that fit into a slot of `capacity`, whole PCM frames only unless
    /// a single frame is larger than the slot.
    fn slot_room(&self, capacity: usize, remaining: usize) -> usize {
        if capacity == 0 || remaining <= capacity {
            return remaining;
        }
        let frame_bytes = self.channel_count * BYTES_PER_SAMPLE;
        match capacity - capacity % frame_bytes {
            0 => capacity,
            whole_frames => whole_frames,
        }
    }

    /// Fill free encoder input slots from the front of the pending queue.
    ///
    /// Stops without error as soon as the encoder has no free slot.
    fn fill_encoder_slots(&mut self, encoder: &mut dyn Encoder) -> Result<()> {
        let frame_bytes = self.channel_count * BYTES_PER_SAMPLE;

        while let Some(pending) = self.pending.front() {
            let tag = match encoder.dequeue_input_frame(self.timeout_us) {
                Dequeued::Tag(tag) => tag,
                Dequeued::TryAgainLater => return Ok(()),
                Dequeued::FormatChanged => {
                    tracing::error!("Unexpected format change when dequeuing encoder input");
                    return Ok(());
                }
            };
            let mut slot = encoder
                .input_frame(tag)
                .ok_or(TrackTranscoderError::NoFrameAvailable(tag))?;

            let buffer = slot.buffer.get_or_insert_with(BytesMut::new);
            let remaining = pending.data.len() - pending.offset;
            let room = self.slot_room(buffer.capacity(), remaining);
            let end = pending.offset + room;

            buffer.clear();
            buffer.extend_from_slice(&pending.data[pending.offset..end]);

            let last = end >= pending.data.len();
            let flags = if last {
                pending.flags
            } else {
                pending.flags.without(BufferFlags::END_OF_STREAM)
            };
            let pts = pending.presentation_time_us
                + ((pending.offset / frame_bytes) as f64 * self.sample_duration_us) as i64;
            slot.info = BufferInfo::new(0, room, pts, flags);
            encoder.queue_input_frame(slot);

            if last {
                self.pending.pop_front();
            } else if let Some(pending) = self.pending.front_mut() {
                pending.offset = end;
            }
        }
        Ok(())
    }
}

impl Renderer for AudioRenderer {
    fn init(
        &mut self,
        _output_surface: Option<Surface>,
        source_format: Option<&MediaFormat>,
        target_format: Option<&MediaFormat>,
    ) -> Result<()> {
        self.on_media_format_changed(source_format, target_format);
        self.next_presentation_time_us = None;
        self.pending.clear();
        self.released = false;
        if self.needs_resampling() {
            tracing::debug!(
                source_rate = ?self.source_rate,
                target_rate = ?self.target_rate,
                channels = self.channel_count,
                "Audio renderer will resample"
            );
        }
        Ok(())
    }

    fn on_media_format_changed(
        &mut self,
        source_format: Option<&MediaFormat>,
        target_format: Option<&MediaFormat>,
    ) {
        self.source_rate = source_format.and_then(MediaFormat::sample_rate);
        self.target_rate = target_format
            .and_then(MediaFormat::sample_rate)
            .or(self.source_rate);

        if let Some(rate) = self.target_rate.filter(|r| *r > 0) {
            self.sample_duration_us = 1_000_000.0 / rate as f64;
        }

        self.channel_count = target_format
            .and_then(MediaFormat::channel_count)
            .or_else(|| source_format.and_then(MediaFormat::channel_count))
            .map(usize::from)
            .filter(|c| *c > 0)
            .unwrap_or(DEFAULT_CHANNEL_COUNT);
    }

    fn input_surface(&self) -> Option<Surface> {
        None
    }

    fn render_frame(
        &mut self,
        input: Option<&Frame>,
        presentation_time_ns: i64,
        encoder: &mut dyn Encoder,
    ) -> Result<()> {
        if self.released {
            return Ok(());
        }
        let Some(frame) = input else {
            tracing::error!("Null input frame provided to audio renderer");
            return Ok(());
        };

        let (data, presentation_time_us) = self.transform(frame.data(), presentation_time_ns / 1_000)?;
        let flags = frame.info.flags;
        if !data.is_empty() || flags.is_end_of_stream() {
            self.pending.push_back(PendingPcm {
                data,
                offset: 0,
                presentation_time_us,
                flags,
            });
        }
        self.fill_encoder_slots(encoder)
    }

    fn drain_pending(&mut self, encoder: &mut dyn Encoder) -> Result<bool> {
        if self.released {
            return Ok(true);
        }
        self.fill_encoder_slots(encoder)?;
        Ok(self.pending.is_empty())
    }

    fn release(&mut self) {
        self.pending.clear();
        self.released = true;
    }
}
