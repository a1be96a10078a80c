//! Per-track transcoders
//!
//! A transcoder moves the samples of one source track into one target track:
//! - `CodecTrackTranscoder` decodes, renders and re-encodes (video or audio)
//! - `PassthroughTrackTranscoder` copies compressed samples untouched
//!
//! Transcoders are driven by the job loop, one `process_next_frame` call per
//! track per iteration, and never block for longer than their dequeue timeouts.

mod codec_transcoder;
mod passthrough;

use std::fmt;

use crate::config::TransformationOptions;
use crate::error::{Result, TrackTranscoderError, TransformError};
use crate::io::{MediaSource, SharedMediaSource, SharedMediaTarget};
use crate::render::AudioRenderer;
use crate::track_transform::TrackTransform;
use crate::types::{MediaFormat, MediaRange, TrackKind};

pub use codec_transcoder::CodecTrackTranscoder;
pub use passthrough::PassthroughTrackTranscoder;

/// Outcome of one `process_next_frame` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeResult {
    /// Work was attempted; the track is not finished
    FrameProcessed,
    /// The track has written its last sample
    EosReached,
}

/// Lifecycle of a transcoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscoderState {
    Created,
    Running,
    /// Input exhausted, codecs still flushing
    Draining,
    Done,
}

pub trait TrackTranscoder: Send {
    /// Select the source track and start the codecs. Repeated calls are no-ops.
    fn start(&mut self) -> Result<()>;

    fn process_next_frame(&mut self) -> Result<TranscodeResult>;

    /// Stop and release the codecs and renderer. Safe to call more than once.
    fn stop(&mut self);

    /// Fraction of the track written so far, in `[0, 1]`
    fn progress(&self) -> f32;

    fn state(&self) -> TranscoderState;

    fn source_track(&self) -> usize;

    fn target_track(&self) -> usize;

    fn decoder_name(&self) -> Result<String>;

    fn encoder_name(&self) -> Result<String>;

    /// Output format, once known
    fn target_format(&self) -> Option<MediaFormat>;
}

impl fmt::Debug for dyn TrackTranscoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackTranscoder")
            .field("source_track", &self.source_track())
            .field("target_track", &self.target_track())
            .field("state", &self.state())
            .field("progress", &self.progress())
            .finish()
    }
}

/// Source/target side shared by both transcoder kinds
struct TrackIo {
    source: SharedMediaSource,
    source_track: usize,
    target: SharedMediaTarget,
    target_track: usize,
    target_track_added: bool,
    range: MediaRange,
    /// Track duration inside `range`, if the source knows it
    duration_us: Option<i64>,
    progress: f32,
}

impl TrackIo {
    fn new(
        source: SharedMediaSource,
        source_track: usize,
        target: SharedMediaTarget,
        target_track: usize,
        source_format: &MediaFormat,
        range: MediaRange,
    ) -> Result<Self> {
        if !range.is_valid() {
            return Err(TransformError::InvalidMediaRange {
                start_us: range.start,
                end_us: range.end,
            });
        }
        Ok(Self {
            source,
            source_track,
            target,
            target_track,
            target_track_added: false,
            range,
            duration_us: source_format.duration_us.map(|d| range.duration_within(d)),
            progress: 0.0,
        })
    }

    /// Update progress from the presentation time of a written sample.
    fn report_position(&mut self, presentation_time_us: i64) {
        if let Some(duration) = self.duration_us.filter(|d| *d > 0) {
            self.progress = (presentation_time_us as f32 / duration as f32).clamp(0.0, 1.0);
        }
    }

    /// `format` with the trimmed track duration filled in
    fn with_track_duration(&self, mut format: MediaFormat) -> MediaFormat {
        if let Some(duration) = self.duration_us.filter(|d| *d > 0) {
            format.duration_us = Some(duration);
        }
        format
    }
}

/// Skip the remaining samples of `track` so transcoders of other tracks can
/// read theirs.
pub fn advance_to_next_track(source: &mut dyn MediaSource, track: usize) {
    while source.sample_track_index() == Some(track) {
        source.advance();
        if source.sample_flags().is_end_of_stream() {
            return;
        }
    }
}

/// Build the transcoder for `transform`.
///
/// Tracks without a target format, tracks of an unknown kind and tracks
/// whose target matches the source without a renderer are copied through.
/// Video needs a decoder, an encoder and a renderer. Audio needs a decoder
/// and an encoder and falls back to `AudioRenderer`.
pub fn create(
    transform: TrackTransform,
    range: MediaRange,
    options: &TransformationOptions,
) -> Result<Box<dyn TrackTranscoder>> {
    let TrackTransform {
        source,
        source_track,
        target,
        target_track,
        decoder,
        encoder,
        renderer,
        target_format,
    } = transform;

    let source_format = source.lock().track_format(source_track)?;

    let passthrough = |source, target| -> Result<Box<dyn TrackTranscoder>> {
        Ok(Box::new(PassthroughTrackTranscoder::new(
            source,
            source_track,
            target,
            target_track,
            &source_format,
            range,
        )?))
    };

    let Some(target_format) = target_format else {
        return passthrough(source, target);
    };
    if target_format.mime.is_empty() {
        return Err(TrackTranscoderError::SourceTrackMimeTypeNotFound.into());
    }
    if matches!(target_format.kind, TrackKind::Other) {
        tracing::info!(
            track = source_track,
            mime = %target_format.mime,
            "Unsupported track type, will use passthrough transcoder"
        );
        return passthrough(source, target);
    }
    if target_format == source_format && renderer.is_none() {
        tracing::debug!(track = source_track, "Target format matches source, copying track");
        return passthrough(source, target);
    }

    let decoder = decoder.ok_or(TrackTranscoderError::DecoderNotProvided)?;
    let encoder = encoder.ok_or(TrackTranscoderError::EncoderNotProvided)?;
    let renderer = match (&target_format.kind, renderer) {
        (_, Some(renderer)) => renderer,
        (TrackKind::Video { .. }, None) => {
            return Err(TrackTranscoderError::RendererNotProvided.into())
        }
        (_, None) => Box::new(AudioRenderer::new(options.encoder_timeout_us)),
    };

    let transcoder = CodecTrackTranscoder::new(
        TrackIo::new(source, source_track, target, target_track, &source_format, range)?,
        source_format,
        target_format,
        decoder,
        encoder,
        renderer,
        options,
    )?;
    Ok(Box::new(transcoder))
}
