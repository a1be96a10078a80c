//! Value types shared by the transcoding core
//!
//! Track formats, trim ranges, codec frames and the small enums exchanged
//! with decoder, encoder, source and target collaborators.

use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Kind-specific parameters of a track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrackKind {
    Video {
        width: u32,
        height: u32,
        frame_rate: Option<u32>,
    },
    Audio {
        sample_rate: u32,
        channel_count: u16,
    },
    Other,
}

/// Format description of one elementary stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaFormat {
    pub mime: String,
    pub kind: TrackKind,
    /// Bits per second, if known
    pub bitrate: Option<u32>,
    /// Track duration in microseconds, if known
    pub duration_us: Option<i64>,
    /// Largest compressed sample the track produces, in bytes
    pub max_input_size: Option<usize>,
}

impl MediaFormat {
    pub fn video(mime: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            mime: mime.into(),
            kind: TrackKind::Video {
                width,
                height,
                frame_rate: None,
            },
            bitrate: None,
            duration_us: None,
            max_input_size: None,
        }
    }

    pub fn audio(mime: impl Into<String>, sample_rate: u32, channel_count: u16) -> Self {
        Self {
            mime: mime.into(),
            kind: TrackKind::Audio {
                sample_rate,
                channel_count,
            },
            bitrate: None,
            duration_us: None,
            max_input_size: None,
        }
    }

    pub fn other(mime: impl Into<String>) -> Self {
        Self {
            mime: mime.into(),
            kind: TrackKind::Other,
            bitrate: None,
            duration_us: None,
            max_input_size: None,
        }
    }

    pub fn with_bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = Some(bitrate);
        self
    }

    pub fn with_duration_us(mut self, duration_us: i64) -> Self {
        self.duration_us = Some(duration_us);
        self
    }

    pub fn with_frame_rate(mut self, fps: u32) -> Self {
        if let TrackKind::Video { frame_rate, .. } = &mut self.kind {
            *frame_rate = Some(fps);
        }
        self
    }

    pub fn with_max_input_size(mut self, size: usize) -> Self {
        self.max_input_size = Some(size);
        self
    }

    pub fn is_video(&self) -> bool {
        matches!(self.kind, TrackKind::Video { .. })
    }

    pub fn is_audio(&self) -> bool {
        matches!(self.kind, TrackKind::Audio { .. })
    }

    pub fn sample_rate(&self) -> Option<u32> {
        match self.kind {
            TrackKind::Audio { sample_rate, .. } => Some(sample_rate),
            _ => None,
        }
    }

    pub fn channel_count(&self) -> Option<u16> {
        match self.kind {
            TrackKind::Audio { channel_count, .. } => Some(channel_count),
            _ => None,
        }
    }

    pub fn frame_rate(&self) -> Option<u32> {
        match self.kind {
            TrackKind::Video { frame_rate, .. } => frame_rate,
            _ => None,
        }
    }
}

/// Trim selection of the source media, in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRange {
    pub start: i64,
    pub end: i64,
}

impl MediaRange {
    /// Sentinel for "until the end of media"
    pub const UNBOUNDED_END: i64 = i64::MAX;

    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// The whole media
    pub fn whole() -> Self {
        Self::new(0, Self::UNBOUNDED_END)
    }

    pub fn is_valid(&self) -> bool {
        self.end >= self.start
    }

    /// Overlap of two selections; invalid if they are disjoint
    pub fn intersect(&self, other: &MediaRange) -> MediaRange {
        Self::new(self.start.max(other.start), self.end.min(other.end))
    }

    /// Portion of a track of `track_duration_us` that falls inside this range
    pub fn duration_within(&self, track_duration_us: i64) -> i64 {
        track_duration_us.min(self.end) - self.start.max(0)
    }
}

impl Default for MediaRange {
    fn default() -> Self {
        Self::whole()
    }
}

/// Sample/buffer flag bits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BufferFlags(u32);

impl BufferFlags {
    pub const NONE: Self = Self(0);
    pub const KEY_FRAME: Self = Self(1);
    pub const CODEC_CONFIG: Self = Self(2);
    pub const END_OF_STREAM: Self = Self(4);
    pub const PARTIAL_FRAME: Self = Self(8);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    pub fn is_end_of_stream(self) -> bool {
        self.contains(Self::END_OF_STREAM)
    }
}

impl BitOr for BufferFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for BufferFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for BufferFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

/// Metadata of one sample held in a buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferInfo {
    pub offset: usize,
    pub size: usize,
    pub presentation_time_us: i64,
    pub flags: BufferFlags,
}

impl BufferInfo {
    pub fn new(offset: usize, size: usize, presentation_time_us: i64, flags: BufferFlags) -> Self {
        Self {
            offset,
            size,
            presentation_time_us,
            flags,
        }
    }

    /// Empty end-of-stream marker
    pub fn end_of_stream() -> Self {
        Self::new(0, 0, -1, BufferFlags::END_OF_STREAM)
    }
}

/// One unit of data borrowed from a codec's buffer pool.
///
/// A frame is handed out by `input_frame`/`output_frame` and must travel back
/// into the codec that produced it, through `queue_input_frame` or
/// `release_output_frame`. Both consume the frame, so it can only be returned
/// once.
#[derive(Debug)]
pub struct Frame {
    pub tag: usize,
    pub buffer: Option<BytesMut>,
    pub info: BufferInfo,
}

impl Frame {
    pub fn new(tag: usize, buffer: Option<BytesMut>, info: BufferInfo) -> Self {
        Self { tag, buffer, info }
    }

    /// Payload bytes described by `info`
    pub fn data(&self) -> &[u8] {
        match &self.buffer {
            Some(buffer) => {
                let start = self.info.offset.min(buffer.len());
                let end = (self.info.offset + self.info.size).min(buffer.len());
                &buffer[start..end]
            }
            None => &[],
        }
    }
}

/// Outcome of a bounded-timeout dequeue on a codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dequeued {
    /// A buffer slot identified by its tag
    Tag(usize),
    /// Nothing available within the timeout
    TryAgainLater,
    /// The output format changed; read it with `output_format()`
    FormatChanged,
}

/// Opaque handle to a rendering surface shared between encoder, renderer and decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Surface(pub u64);

/// How a source seek lands relative to sync samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    PreviousSync,
    NextSync,
    ClosestSync,
}
