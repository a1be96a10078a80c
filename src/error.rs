use std::path::PathBuf;

use thiserror::Error;

/// Main error type for a transformation job
#[derive(Error, Debug)]
pub enum TransformError {
    /// The media source could not be opened or read
    #[error("Media source error: {0}")]
    Source(#[from] MediaSourceError),

    /// The media target could not be opened, configured or written
    #[error("Media target error: {0}")]
    Target(#[from] MediaTargetError),

    /// A track transcoder or one of its codecs failed
    #[error("Track transcoder error: {0}")]
    Transcoder(#[from] TrackTranscoderError),

    /// Pre-flight size estimate does not fit into the free space of the output volume
    #[error(
        "Insufficient disk space, estimated file size in bytes {estimated_bytes}, available disk space in bytes {available_bytes}"
    )]
    InsufficientDiskSpace {
        estimated_bytes: u64,
        available_bytes: u64,
    },

    /// PCM resampling precondition violated
    #[error("Resampling error: {0}")]
    Resample(#[from] ResampleError),

    /// Trim range end lies before its start
    #[error("Invalid media range: end {end_us}us is before start {start_us}us")]
    InvalidMediaRange { start_us: i64, end_us: i64 },

    /// A collaborator observed an interruption of the worker thread
    #[error("Interrupted: {0}")]
    Interrupted(String),

    /// A collaborator panicked while the job loop was running
    #[error("Panic in transformation job: {0}")]
    Panicked(String),

    /// A job with the same request id is still registered
    #[error("Request with id {0} already exists")]
    DuplicateRequest(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while reading the input container
#[derive(Error, Debug)]
pub enum MediaSourceError {
    /// The data source could not be opened or read
    #[error("Failed to create media source due to a data source error: {0}")]
    DataSource(String),

    /// A track index outside of the source's track list was requested
    #[error("Track {0} not found in media source")]
    TrackNotFound(usize),
}

/// Kind of failure while preparing the output container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaTargetErrorKind {
    InvalidParams,
    IoFailure,
    UnsupportedUriType,
}

impl MediaTargetErrorKind {
    fn text(self) -> &'static str {
        match self {
            Self::InvalidParams => "Invalid parameters",
            Self::IoFailure => "Failed to open the media target for write",
            Self::UnsupportedUriType => "URI type not supported",
        }
    }
}

/// Errors raised by the output container
#[derive(Error, Debug)]
#[error("{}: {output_path:?} ({detail})", .kind.text())]
pub struct MediaTargetError {
    pub kind: MediaTargetErrorKind,
    pub output_path: Option<PathBuf>,
    pub detail: String,
}

impl MediaTargetError {
    pub fn new(kind: MediaTargetErrorKind, output_path: Option<PathBuf>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            output_path,
            detail: detail.into(),
        }
    }
}

/// Track transcoder and codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackTranscoderError {
    #[error("Failed to create decoder codec: {0}")]
    DecoderFormatNotFound(String),

    #[error("Failed to configure decoder codec: {0}")]
    DecoderConfiguration(String),

    #[error("Failed to create encoder codec: {0}")]
    EncoderFormatNotFound(String),

    #[error("Failed to configure encoder codec: {0}")]
    EncoderConfiguration(String),

    #[error("No decoder found: {0}")]
    DecoderNotFound(String),

    #[error("No encoder found: {0}")]
    EncoderNotFound(String),

    #[error("Codecs are in released state")]
    CodecInReleasedState,

    #[error("Mime type not found for the source track")]
    SourceTrackMimeTypeNotFound,

    #[error("No tracks found")]
    NoTracksFound,

    #[error("Internal codec error occurred: {0}")]
    InternalCodec(String),

    #[error("No frame available for tag {0}")]
    NoFrameAvailable(usize),

    #[error("Decoder is not provided")]
    DecoderNotProvided,

    #[error("Encoder is not provided")]
    EncoderNotProvided,

    #[error("Renderer is not provided")]
    RendererNotProvided,
}

/// PCM resampler precondition failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResampleError {
    #[error("Illegal use of {resampler} resampler: input rate {input_rate}, output rate {output_rate}")]
    InvalidRates {
        resampler: &'static str,
        input_rate: u32,
        output_rate: u32,
    },

    #[error("Illegal use of {resampler} resampler, channels: {channels}")]
    UnsupportedChannels {
        resampler: &'static str,
        channels: usize,
    },
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, TransformError>;
