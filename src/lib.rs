//! Multi-track media transformation core
//!
//! Decodes each source track, optionally renders (video filters, audio
//! resampling), re-encodes and muxes every track into one output. Codecs,
//! renderers, demuxers and muxers are supplied by the caller through the
//! collaborator traits in `codec`, `render` and `io`.

pub mod codec;
pub mod config;
pub mod error;
pub mod io;
pub mod job;
pub mod listener;
pub mod logging;
pub mod render;
pub mod resample;
pub mod stats;
pub mod track_transform;
pub mod transcode;
pub mod transformer;
pub mod types;

#[cfg(test)]
pub(crate) mod tests;

pub use config::{
    LogFormat, LoggingConfig, TransformationOptions, TransformerConfig, GRANULARITY_DEFAULT,
    GRANULARITY_NONE,
};
pub use error::{
    MediaSourceError, MediaTargetError, MediaTargetErrorKind, ResampleError, Result,
    TrackTranscoderError, TransformError,
};
pub use job::{CancellationFlag, TransformationJob};
pub use listener::{ChannelListener, TransformationEvent, TransformationListener};
pub use stats::{TrackTransformationInfo, TransformationStatsCollector};
pub use track_transform::{TrackTransform, TrackTransformBuilder};
pub use transformer::MediaTransformer;
pub use types::{
    BufferFlags, BufferInfo, Dequeued, Frame, MediaFormat, MediaRange, SeekMode, Surface, TrackKind,
};
