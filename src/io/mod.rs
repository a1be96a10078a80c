//! Source and target container contracts
//!
//! A `MediaSource` is a demuxer over all tracks of the input; a `MediaTarget`
//! is a muxer over all tracks of the output. Several track transcoders share
//! one source and one target, so both are handed around behind `Arc<Mutex<_>>`.

pub mod muxer;

use bytes::BytesMut;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::types::{BufferFlags, BufferInfo, MediaFormat, MediaRange, SeekMode};

pub use muxer::{Muxer, MuxerMediaTarget};

/// Demuxer over the input container
pub trait MediaSource: Send {
    /// Rotation of the video in degrees (0, 90, 180, 270)
    fn orientation_hint(&self) -> i32 {
        0
    }

    fn track_count(&self) -> usize;

    fn track_format(&self, track: usize) -> Result<MediaFormat>;

    /// Select a track so subsequent reads include its samples.
    fn select_track(&mut self, track: usize);

    fn seek_to(&mut self, position_us: i64, mode: SeekMode);

    /// Track of the current sample, `None` once no samples are left.
    fn sample_track_index(&self) -> Option<usize>;

    /// Copy the current sample into `buffer` (replacing its content).
    ///
    /// Returns the sample size, or `None` when no samples are left.
    fn read_sample_data(&mut self, buffer: &mut BytesMut) -> Option<usize>;

    /// Presentation time of the current sample in microseconds, -1 when exhausted.
    fn sample_time(&self) -> i64;

    fn sample_flags(&self) -> BufferFlags;

    /// Move to the next sample. Returns `false` when no samples are left.
    fn advance(&mut self) -> bool;

    fn release(&mut self);

    /// Total size in bytes, if known
    fn size(&self) -> Option<u64>;

    /// Trim selection applied to this source
    fn selection(&self) -> MediaRange {
        MediaRange::whole()
    }
}

/// Muxer over the output container
pub trait MediaTarget: Send {
    /// Register the format of `target_track`. Returns the index the track was added at.
    fn add_track(&mut self, format: &MediaFormat, target_track: usize) -> Result<usize>;

    fn write_sample_data(&mut self, target_track: usize, data: &[u8], info: &BufferInfo) -> Result<()>;

    fn release(&mut self);

    /// Output file, if the target writes to one
    fn output_path(&self) -> Option<&Path>;
}

pub type SharedMediaSource = Arc<Mutex<dyn MediaSource>>;
pub type SharedMediaTarget = Arc<Mutex<dyn MediaTarget>>;

/// Wrap a source for sharing between tracks.
pub fn shared_source<S: MediaSource + 'static>(source: S) -> SharedMediaSource {
    Arc::new(Mutex::new(source))
}

/// Wrap a target for sharing between tracks.
pub fn shared_target<T: MediaTarget + 'static>(target: T) -> SharedMediaTarget {
    Arc::new(Mutex::new(target))
}
