//! Write-gating muxer adapter
//!
//! A container muxer can only be started once the formats of all of its
//! tracks are known. Track transcoders negotiate their output formats
//! independently, so samples can arrive before the last track is registered.
//! `MuxerMediaTarget` buffers those samples and flushes them in arrival order
//! as soon as the final track has been added.

use bytes::Bytes;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use crate::error::{MediaTargetError, MediaTargetErrorKind, Result};
use crate::io::MediaTarget;
use crate::types::{BufferInfo, MediaFormat};

/// Underlying container writer
pub trait Muxer: Send {
    /// Add a track, returning the muxer's own index for it.
    fn add_track(&mut self, format: &MediaFormat) -> Result<usize>;

    fn set_orientation_hint(&mut self, _degrees: i32) {}

    fn start(&mut self) -> Result<()>;

    fn write_sample_data(&mut self, track: usize, data: &[u8], info: &BufferInfo) -> Result<()>;

    fn release(&mut self);
}

/// Sample held back until the muxer starts
#[derive(Debug)]
struct QueuedSample {
    target_track: usize,
    data: Bytes,
    info: BufferInfo,
}

/// `MediaTarget` that holds samples back until every track format is known
pub struct MuxerMediaTarget<M: Muxer> {
    muxer: M,
    output_path: Option<PathBuf>,
    formats: Vec<Option<MediaFormat>>,
    /// Muxer track index per target track, filled on start
    track_map: Vec<usize>,
    tracks_added: usize,
    queue: VecDeque<QueuedSample>,
    started: bool,
    released: bool,
}

impl<M: Muxer> MuxerMediaTarget<M> {
    /// Create an adapter expecting `track_count` tracks.
    pub fn new(
        mut muxer: M,
        track_count: usize,
        orientation_hint: i32,
        output_path: Option<PathBuf>,
    ) -> Result<Self> {
        if track_count == 0 {
            return Err(MediaTargetError::new(
                MediaTargetErrorKind::InvalidParams,
                output_path,
                "track count must be at least 1",
            )
            .into());
        }
        muxer.set_orientation_hint(orientation_hint);

        Ok(Self {
            muxer,
            output_path,
            formats: vec![None; track_count],
            track_map: Vec::with_capacity(track_count),
            tracks_added: 0,
            queue: VecDeque::new(),
            started: false,
            released: false,
        })
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn queued_samples(&self) -> usize {
        self.queue.len()
    }

    pub fn muxer(&self) -> &M {
        &self.muxer
    }

    fn start_and_flush(&mut self) -> Result<()> {
        tracing::debug!(
            queued = self.queue.len(),
            "All tracks added, starting muxer and writing out queued samples"
        );

        for format in self.formats.iter().flatten() {
            let index = self.muxer.add_track(format)?;
            self.track_map.push(index);
        }
        self.muxer.start()?;
        self.started = true;

        while let Some(sample) = self.queue.pop_front() {
            let track = self.track_map[sample.target_track];
            self.muxer
                .write_sample_data(track, &sample.data, &sample.info)?;
        }
        Ok(())
    }
}

impl<M: Muxer> MediaTarget for MuxerMediaTarget<M> {
    fn add_track(&mut self, format: &MediaFormat, target_track: usize) -> Result<usize> {
        let slot = self.formats.get_mut(target_track).ok_or_else(|| {
            MediaTargetError::new(
                MediaTargetErrorKind::InvalidParams,
                self.output_path.clone(),
                format!("target track {} out of range", target_track),
            )
        })?;

        if slot.is_some() {
            tracing::warn!(target_track, "Track format already registered, ignoring");
            return Ok(target_track);
        }
        *slot = Some(format.clone());
        self.tracks_added += 1;

        if self.tracks_added == self.formats.len() {
            self.start_and_flush()?;
        }

        Ok(target_track)
    }

    fn write_sample_data(&mut self, target_track: usize, data: &[u8], info: &BufferInfo) -> Result<()> {
        if target_track >= self.formats.len() {
            return Err(MediaTargetError::new(
                MediaTargetErrorKind::InvalidParams,
                self.output_path.clone(),
                format!("target track {} out of range", target_track),
            )
            .into());
        }

        if self.started {
            let track = self.track_map[target_track];
            self.muxer.write_sample_data(track, data, info)
        } else {
            // deep copy so the caller can hand its buffer back to the encoder right away
            self.queue.push_back(QueuedSample {
                target_track,
                data: Bytes::copy_from_slice(data),
                info: BufferInfo {
                    offset: 0,
                    ..*info
                },
            });
            Ok(())
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if !self.queue.is_empty() {
            tracing::warn!(
                dropped = self.queue.len(),
                "Releasing muxer with samples still queued"
            );
            self.queue.clear();
        }
        self.muxer.release();
    }

    fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }
}
