use bytes::BytesMut;

use super::{advance_to_next_track, TrackIo, TrackTranscoder, TranscodeResult, TranscoderState};
use crate::error::{Result, TrackTranscoderError};
use crate::io::{SharedMediaSource, SharedMediaTarget};
use crate::types::{BufferFlags, BufferInfo, MediaFormat, MediaRange};

const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;
const CODEC_NAME: &str = "passthrough";

/// Copies compressed samples from source to target without decoding.
pub struct PassthroughTrackTranscoder {
    io: TrackIo,
    buffer: BytesMut,
    target_format: Option<MediaFormat>,
    state: TranscoderState,
}

impl PassthroughTrackTranscoder {
    pub fn new(
        source: SharedMediaSource,
        source_track: usize,
        target: SharedMediaTarget,
        target_track: usize,
        source_format: &MediaFormat,
        range: MediaRange,
    ) -> Result<Self> {
        Ok(Self {
            io: TrackIo::new(source, source_track, target, target_track, source_format, range)?,
            buffer: BytesMut::new(),
            target_format: None,
            state: TranscoderState::Created,
        })
    }

    /// Register the unchanged source format with the target.
    fn add_target_track(&mut self) -> Result<()> {
        let source_format = self.io.source.lock().track_format(self.io.source_track)?;
        let format = self.io.with_track_duration(source_format);

        self.io.target_track = self
            .io
            .target
            .lock()
            .add_track(&format, self.io.target_track)?;
        self.io.target_track_added = true;
        self.buffer = BytesMut::with_capacity(format.max_input_size.unwrap_or(DEFAULT_BUFFER_SIZE));
        self.target_format = Some(format);
        Ok(())
    }

    fn finish(&mut self) -> TranscodeResult {
        self.buffer.clear();
        self.io.progress = 1.0;
        self.state = TranscoderState::Done;
        TranscodeResult::EosReached
    }
}

impl TrackTranscoder for PassthroughTrackTranscoder {
    fn start(&mut self) -> Result<()> {
        if self.state == TranscoderState::Created {
            self.io.source.lock().select_track(self.io.source_track);
            self.state = TranscoderState::Running;
        }
        Ok(())
    }

    fn process_next_frame(&mut self) -> Result<TranscodeResult> {
        match self.state {
            TranscoderState::Done => return Ok(TranscodeResult::EosReached),
            TranscoderState::Created => return Err(TrackTranscoderError::CodecInReleasedState.into()),
            _ => {}
        }

        // the muxer needs every track's format before it accepts samples
        if !self.io.target_track_added {
            self.add_target_track()?;
            return Ok(TranscodeResult::FrameProcessed);
        }

        let source = self.io.source.clone();
        let mut source = source.lock();
        match source.sample_track_index() {
            Some(track) if track != self.io.source_track => return Ok(TranscodeResult::FrameProcessed),
            _ => {}
        }

        let bytes_read = source.read_sample_data(&mut self.buffer);
        let sample_time = source.sample_time();
        let input_flags = source.sample_flags();

        let size = match bytes_read {
            Some(size) if !input_flags.is_end_of_stream() => size,
            _ => {
                tracing::debug!(track = self.io.source_track, "Reached EoS on input stream");
                return Ok(self.finish());
            }
        };

        if sample_time >= self.io.range.end {
            let info = BufferInfo::new(
                0,
                0,
                sample_time - self.io.range.start,
                BufferFlags::END_OF_STREAM,
            );
            self.io
                .target
                .lock()
                .write_sample_data(self.io.target_track, &[], &info)?;
            advance_to_next_track(&mut *source, self.io.source_track);
            tracing::debug!(track = self.io.source_track, pts = sample_time, "Reached selection end on input stream");
            return Ok(self.finish());
        }

        if sample_time >= self.io.range.start {
            let output_flags = if input_flags.contains(BufferFlags::KEY_FRAME) {
                BufferFlags::KEY_FRAME
            } else {
                BufferFlags::NONE
            };
            let pts = sample_time - self.io.range.start;
            let size = size.min(self.buffer.len());
            let info = BufferInfo::new(0, size, pts, output_flags);
            self.io
                .target
                .lock()
                .write_sample_data(self.io.target_track, &self.buffer[..size], &info)?;
            self.io.report_position(pts);
        }
        source.advance();
        Ok(TranscodeResult::FrameProcessed)
    }

    fn stop(&mut self) {
        self.buffer = BytesMut::new();
        if self.state != TranscoderState::Created {
            self.state = TranscoderState::Done;
        }
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
        Ok(CODEC_NAME.to_string())
    }

    fn encoder_name(&self) -> Result<String> {
        Ok(CODEC_NAME.to_string())
    }

    fn target_format(&self) -> Option<MediaFormat> {
        self.target_format.clone()
    }
}
