use bytes::BytesMut;

use super::{advance_to_next_track, TrackIo, TrackTranscoder, TranscodeResult, TranscoderState};
use crate::codec::{Decoder, Encoder};
use crate::config::TransformationOptions;
use crate::error::{Result, TrackTranscoderError};
use crate::render::{DefaultFrameDropper, FrameDropper, Renderer};
use crate::types::{BufferFlags, BufferInfo, Dequeued, MediaFormat, TrackKind};

/// Progress of one pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Active,
    Eos,
}

/// How decoded frames reach the encoder
enum Path {
    /// Decoder renders to a surface, the renderer draws it into the encoder
    Surface {
        frame_dropper: Option<Box<dyn FrameDropper>>,
    },
    /// Decoded buffers are handed to the renderer, which queues them into the encoder
    Buffer,
}

/// Decode, render and re-encode one track.
pub struct CodecTrackTranscoder {
    io: TrackIo,
    decoder: Box<dyn Decoder>,
    encoder: Box<dyn Encoder>,
    renderer: Box<dyn Renderer>,
    path: Path,
    source_format: MediaFormat,
    target_format: MediaFormat,
    decoder_timeout_us: i64,
    encoder_timeout_us: i64,
    extract_stage: Stage,
    decode_stage: Stage,
    encode_stage: Stage,
    /// Decoder EoS was handed to a buffer renderer
    decoder_eos_rendered: bool,
    state: TranscoderState,
    released: bool,
}

impl CodecTrackTranscoder {
    pub(super) fn new(
        io: TrackIo,
        source_format: MediaFormat,
        target_format: MediaFormat,
        mut decoder: Box<dyn Decoder>,
        mut encoder: Box<dyn Encoder>,
        mut renderer: Box<dyn Renderer>,
        options: &TransformationOptions,
    ) -> Result<Self> {
        let target_format = io.with_track_duration(target_format);

        let path = match target_format.kind {
            TrackKind::Video { .. } => {
                let frame_dropper = create_frame_dropper(&source_format, &target_format);
                encoder.init(&target_format)?;
                let surface = encoder.create_input_surface();
                renderer.init(surface, Some(&source_format), Some(&target_format))?;
                decoder.init(&source_format, renderer.input_surface())?;
                Path::Surface { frame_dropper }
            }
            _ => {
                encoder.init(&target_format)?;
                renderer.init(None, Some(&source_format), Some(&target_format))?;
                decoder.init(&source_format, None)?;
                Path::Buffer
            }
        };

        Ok(Self {
            io,
            decoder,
            encoder,
            renderer,
            path,
            source_format,
            target_format,
            decoder_timeout_us: options.decoder_timeout_us,
            encoder_timeout_us: options.encoder_timeout_us,
            extract_stage: Stage::Active,
            decode_stage: Stage::Active,
            encode_stage: Stage::Active,
            decoder_eos_rendered: false,
            state: TranscoderState::Created,
            released: false,
        })
    }

    /// Move the next compressed sample of this track into the decoder.
    fn extract_and_enqueue_input_frame(&mut self) -> Result<Stage> {
        let mut source = self.io.source.lock();
        match source.sample_track_index() {
            Some(track) if track != self.io.source_track => return Ok(Stage::Active),
            _ => {}
        }

        let tag = match self.decoder.dequeue_input_frame(self.decoder_timeout_us) {
            Dequeued::Tag(tag) => tag,
            Dequeued::TryAgainLater => return Ok(Stage::Active),
            Dequeued::FormatChanged => {
                tracing::error!(track = self.io.source_track, "Unexpected format change on decoder input");
                return Ok(Stage::Active);
            }
        };

        let mut frame = self
            .decoder
            .input_frame(tag)
            .ok_or(TrackTranscoderError::NoFrameAvailable(tag))?;
        let buffer = frame.buffer.get_or_insert_with(BytesMut::new);
        let bytes_read = source.read_sample_data(buffer);
        let sample_time = source.sample_time();
        let sample_flags = source.sample_flags();

        match bytes_read {
            Some(size) if !sample_flags.is_end_of_stream() && sample_time < self.io.range.end => {
                frame.info = BufferInfo::new(0, size, sample_time, sample_flags);
                self.decoder.queue_input_frame(frame);
                source.advance();
                Ok(Stage::Active)
            }
            Some(_) if !sample_flags.is_end_of_stream() => {
                frame.info = BufferInfo::end_of_stream();
                self.decoder.queue_input_frame(frame);
                advance_to_next_track(&mut *source, self.io.source_track);
                tracing::debug!(track = self.io.source_track, pts = sample_time, "Selection end reached on the input stream");
                Ok(Stage::Eos)
            }
            _ => {
                frame.info = BufferInfo::end_of_stream();
                self.decoder.queue_input_frame(frame);
                tracing::debug!(track = self.io.source_track, "EoS reached on the input stream");
                Ok(Stage::Eos)
            }
        }
    }

    /// Hand the next decoded frame to the renderer.
    fn render_decoded_frame(&mut self) -> Result<Stage> {
        if matches!(self.path, Path::Buffer) {
            // held back output must reach the encoder before new decoder output is taken
            if !self.renderer.drain_pending(self.encoder.as_mut())? {
                return Ok(Stage::Active);
            }
            if self.decoder_eos_rendered {
                tracing::debug!(track = self.io.source_track, "EoS on decoder output stream");
                return Ok(Stage::Eos);
            }
        }

        let tag = match self.decoder.dequeue_output_frame(self.decoder_timeout_us) {
            Dequeued::Tag(tag) => tag,
            Dequeued::TryAgainLater => return Ok(Stage::Active),
            Dequeued::FormatChanged => {
                if let Some(format) = self.decoder.output_format() {
                    tracing::debug!(track = self.io.source_track, format = ?format, "Decoder output format changed");
                    self.source_format = format;
                    self.renderer
                        .on_media_format_changed(Some(&self.source_format), Some(&self.target_format));
                }
                return Ok(Stage::Active);
            }
        };

        let frame = self
            .decoder
            .output_frame(tag)
            .ok_or(TrackTranscoderError::NoFrameAvailable(tag))?;
        let flags = frame.info.flags;
        let pts_us = frame.info.presentation_time_us;
        let render_time_ns = (pts_us - self.io.range.start) * 1_000;
        let after_start = pts_us >= self.io.range.start;

        match &mut self.path {
            Path::Surface { frame_dropper } => {
                if flags.is_end_of_stream() {
                    tracing::debug!(track = self.io.source_track, "EoS on decoder output stream");
                    self.decoder.release_output_frame(frame, false);
                    self.encoder.signal_end_of_input_stream();
                    return Ok(Stage::Eos);
                }
                self.decoder.release_output_frame(frame, after_start);
                let should_render = frame_dropper.as_mut().map_or(true, |d| d.should_render());
                if after_start && should_render {
                    self.renderer
                        .render_frame(None, render_time_ns, self.encoder.as_mut())?;
                }
                Ok(Stage::Active)
            }
            Path::Buffer => {
                let rendered = if after_start || flags.is_end_of_stream() {
                    self.renderer
                        .render_frame(Some(&frame), render_time_ns, self.encoder.as_mut())
                } else {
                    Ok(())
                };
                self.decoder.release_output_frame(frame, false);
                rendered?;

                // Eos is reported once the renderer has nothing held back
                if flags.is_end_of_stream() {
                    self.decoder_eos_rendered = true;
                }
                Ok(Stage::Active)
            }
        }
    }

    /// Write the next encoded sample to the target.
    fn write_encoded_output_frame(&mut self) -> Result<Stage> {
        let tag = match self.encoder.dequeue_output_frame(self.encoder_timeout_us) {
            Dequeued::Tag(tag) => tag,
            Dequeued::TryAgainLater => return Ok(Stage::Active),
            Dequeued::FormatChanged => {
                self.on_encoder_format_changed()?;
                return Ok(Stage::Active);
            }
        };

        let frame = self
            .encoder
            .output_frame(tag)
            .ok_or(TrackTranscoderError::NoFrameAvailable(tag))?;

        if frame.info.flags.is_end_of_stream() {
            tracing::debug!(track = self.io.source_track, "Encoder produced EoS, track done");
            self.io.progress = 1.0;
            self.encoder.release_output_frame(frame);
            return Ok(Stage::Eos);
        }

        let written = if frame.info.size > 0 && !frame.info.flags.contains(BufferFlags::CODEC_CONFIG) {
            let result = self
                .io
                .target
                .lock()
                .write_sample_data(self.io.target_track, frame.data(), &frame.info);
            if result.is_ok() {
                self.io.report_position(frame.info.presentation_time_us);
            }
            result
        } else {
            Ok(())
        };
        self.encoder.release_output_frame(frame);
        written?;
        Ok(Stage::Active)
    }

    fn on_encoder_format_changed(&mut self) -> Result<()> {
        let Some(format) = self.encoder.output_format() else {
            tracing::warn!(track = self.io.source_track, "Encoder reported a format change without a format");
            return Ok(());
        };
        tracing::debug!(track = self.io.source_track, format = ?format, "Encoder output format received");

        // Only the first negotiated format is registered with the target
        if self.io.target_track_added {
            return Ok(());
        }
        let format = self.io.with_track_duration(format);
        self.io.target_track = self
            .io
            .target
            .lock()
            .add_track(&format, self.io.target_track)?;
        self.io.target_track_added = true;
        self.target_format = format;
        self.renderer
            .on_media_format_changed(Some(&self.source_format), Some(&self.target_format));
        Ok(())
    }
}

fn create_frame_dropper(source: &MediaFormat, target: &MediaFormat) -> Option<Box<dyn FrameDropper>> {
    let source_fps = source.frame_rate()?;
    let target_fps = target
        .frame_rate()
        .filter(|fps| *fps >= 1)
        .unwrap_or(source_fps);

    if source_fps > target_fps {
        tracing::debug!(source_fps, target_fps, "Dropping frames to lower the frame rate");
        Some(Box::new(DefaultFrameDropper::new(source_fps, target_fps)))
    } else {
        None
    }
}

impl TrackTranscoder for CodecTrackTranscoder {
    fn start(&mut self) -> Result<()> {
        match self.state {
            TranscoderState::Created if !self.released => {}
            TranscoderState::Created => return Err(TrackTranscoderError::CodecInReleasedState.into()),
            _ => return Ok(()),
        }
        self.io.source.lock().select_track(self.io.source_track);
        self.encoder.start()?;
        self.decoder.start()?;
        self.state = TranscoderState::Running;
        Ok(())
    }

    fn process_next_frame(&mut self) -> Result<TranscodeResult> {
        if self.released {
            return Err(TrackTranscoderError::CodecInReleasedState.into());
        }
        if self.state == TranscoderState::Done {
            return Ok(TranscodeResult::EosReached);
        }
        if !self.encoder.is_running() || !self.decoder.is_running() {
            return Err(TrackTranscoderError::CodecInReleasedState.into());
        }

        if self.extract_stage != Stage::Eos {
            self.extract_stage = self.extract_and_enqueue_input_frame()?;
        }
        if self.decode_stage != Stage::Eos {
            self.decode_stage = self.render_decoded_frame()?;
        }
        if self.encode_stage != Stage::Eos {
            self.encode_stage = self.write_encoded_output_frame()?;
        }

        if self.encode_stage == Stage::Eos
            && self.decode_stage == Stage::Eos
            && self.extract_stage == Stage::Eos
        {
            self.state = TranscoderState::Done;
            Ok(TranscodeResult::EosReached)
        } else {
            if self.extract_stage == Stage::Eos {
                self.state = TranscoderState::Draining;
            }
            Ok(TranscodeResult::FrameProcessed)
        }
    }

    fn stop(&mut self) {
        if self.released {
            return;
        }
        self.encoder.stop();
        self.encoder.release();
        self.decoder.stop();
        self.decoder.release();
        self.renderer.release();
        self.released = true;
        self.state = TranscoderState::Done;
    }

    fn progress(&self) -> f32 {
        self.io.progress
    }

    fn state(&self) -> TranscoderState {
        self.state
    }

    fn source_track(&self) -> usize {
        self.io.source_track
    }

    fn target_track(&self) -> usize {
        self.io.target_track
    }

    fn decoder_name(&self) -> Result<String> {
        self.decoder.name()
    }

    fn encoder_name(&self) -> Result<String> {
        self.encoder.name()
    }

    fn target_format(&self) -> Option<MediaFormat> {
        Some(self.target_format.clone())
    }
}
