//! Transformation job
//!
//! A job owns the track transcoders of one request and drives them from a
//! single cooperative loop on the calling thread:
//! 1. register source tracks with the stats collector
//! 2. check the size estimate against the free space of the output volume
//! 3. create and start one transcoder per track
//! 4. seek every source to the start of its selection
//! 5. call `process_next_frame` on each transcoder until all reached EoS
//!
//! Whatever happens, the listener receives exactly one of `on_completed`,
//! `on_cancelled` or `on_error`, and every source and target is released once.

pub mod disk;

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::config::TransformationOptions;
use crate::error::{Result, TrackTranscoderError, TransformError};
use crate::io::{SharedMediaSource, SharedMediaTarget};
use crate::listener::TransformationListener;
use crate::stats::TransformationStatsCollector;
use crate::track_transform::TrackTransform;
use crate::transcode::{self, TrackTranscoder, TranscodeResult};
use crate::types::{MediaRange, SeekMode};

use disk::{DiskSpaceProbe, StatvfsDiskProbe};

/// Cooperative cancellation request shared between a job and its owner
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// How the frame loop ended when no error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Cancelled,
}

/// Whether `current` progress is far enough from the last reported value to report it.
///
/// `step` is the minimum delta between reports, `None` to report every change.
pub fn should_report_progress(step: Option<f32>, last_reported: f32, current: f32) -> bool {
    match step {
        Some(step) => current >= last_reported + step,
        None => current != last_reported,
    }
}

pub struct TransformationJob {
    id: String,
    transforms: Vec<TrackTransform>,
    transcoders: Vec<Box<dyn TrackTranscoder>>,
    /// Distinct sources with the selection that applies to them
    sources: Vec<(SharedMediaSource, MediaRange)>,
    targets: Vec<SharedMediaTarget>,
    options: TransformationOptions,
    listener: Arc<dyn TransformationListener>,
    stats: TransformationStatsCollector,
    disk_probe: Box<dyn DiskSpaceProbe>,
    cancellation: CancellationFlag,
    last_progress: f32,
    released: bool,
    terminated: bool,
}

impl TransformationJob {
    pub fn new(
        id: impl Into<String>,
        transforms: Vec<TrackTransform>,
        options: TransformationOptions,
        listener: Arc<dyn TransformationListener>,
    ) -> Self {
        let mut sources: Vec<(SharedMediaSource, MediaRange)> = Vec::new();
        let mut targets: Vec<SharedMediaTarget> = Vec::new();
        for transform in &transforms {
            if !sources.iter().any(|(s, _)| Arc::ptr_eq(s, &transform.source)) {
                let range = transform
                    .source
                    .lock()
                    .selection()
                    .intersect(&options.source_media_range);
                sources.push((transform.source.clone(), range));
            }
            if !targets.iter().any(|t| Arc::ptr_eq(t, &transform.target)) {
                targets.push(transform.target.clone());
            }
        }

        Self {
            id: id.into(),
            transforms,
            transcoders: Vec::new(),
            sources,
            targets,
            options,
            listener,
            stats: TransformationStatsCollector::new(),
            disk_probe: Box::new(StatvfsDiskProbe),
            cancellation: CancellationFlag::new(),
            last_progress: 0.0,
            released: false,
            terminated: false,
        }
    }

    pub fn with_disk_probe(mut self, probe: impl DiskSpaceProbe + 'static) -> Self {
        self.disk_probe = Box::new(probe);
        self
    }

    pub fn with_cancellation_flag(mut self, flag: CancellationFlag) -> Self {
        self.cancellation = flag;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Handle for cancelling this job from another thread
    pub fn cancellation_flag(&self) -> CancellationFlag {
        self.cancellation.clone()
    }

    pub fn stats(&self) -> &TransformationStatsCollector {
        &self.stats
    }

    pub fn transcoders(&self) -> &[Box<dyn TrackTranscoder>] {
        &self.transcoders
    }

    /// Run the job to its end on the calling thread.
    pub fn run(&mut self) {
        if self.terminated {
            tracing::warn!(job_id = %self.id, "Transformation job already ran");
            return;
        }
        let span = tracing::info_span!("transformation_job", job_id = %self.id);
        let _enter = span.enter();

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.transform()))
            .unwrap_or_else(|payload| Err(TransformError::Panicked(panic_message(payload.as_ref()))));

        match result {
            Ok(Outcome::Completed) => self.complete(),
            Ok(Outcome::Cancelled) => self.cancel(),
            Err(e) => {
                tracing::error!(error = %e, "Transformation job error");
                self.error(e);
            }
        }
    }

    fn transform(&mut self) -> Result<Outcome> {
        self.options.validate()?;
        if self.transforms.is_empty() {
            return Err(TrackTranscoderError::NoTracksFound.into());
        }

        self.init_stats_collector()?;
        self.verify_available_disk_space()?;
        self.create_track_transcoders()?;
        self.start_track_transcoders()?;
        self.seek_to_media_range_start();

        tracing::info!(tracks = self.transcoders.len(), "Transformation started");
        self.listener.on_started(&self.id);
        self.last_progress = 0.0;

        if self.cancellation.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }
        loop {
            if self.process_next_frame()? {
                return Ok(Outcome::Completed);
            }
            if self.cancellation.is_cancelled() {
                return Ok(Outcome::Cancelled);
            }
        }
    }

    fn init_stats_collector(&mut self) -> Result<()> {
        for transform in &self.transforms {
            let format = transform.source.lock().track_format(transform.source_track)?;
            self.stats.add_source_track(format);
        }
        Ok(())
    }

    /// Fail if the padded size estimate does not fit the output volume.
    ///
    /// The check is skipped when no target writes to a file or the free
    /// space cannot be determined.
    pub fn verify_available_disk_space(&self) -> Result<()> {
        if !self.options.check_disk_space {
            return Ok(());
        }
        let estimated_bytes =
            disk::estimate_transforms(&self.transforms, self.options.source_media_range)?;
        let padded_bytes = (estimated_bytes as f64 * (1.0 + self.options.disk_space_padding)) as u64;

        let Some(directory) = self.output_directory() else {
            tracing::debug!("No output file, skipping disk space check");
            return Ok(());
        };
        match self.disk_probe.available_bytes(&directory) {
            Some(available_bytes) if available_bytes < padded_bytes => {
                Err(TransformError::InsufficientDiskSpace {
                    estimated_bytes,
                    available_bytes,
                })
            }
            Some(_) => Ok(()),
            None => {
                tracing::warn!(directory = %directory.display(), "Free disk space check failed, continuing");
                Ok(())
            }
        }
    }

    fn output_directory(&self) -> Option<PathBuf> {
        self.targets.iter().find_map(|target| {
            let target = target.lock();
            let path = target.output_path()?;
            match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => Some(parent.to_path_buf()),
                _ => Some(PathBuf::from(".")),
            }
        })
    }

    fn range_for(&self, source: &SharedMediaSource) -> MediaRange {
        self.sources
            .iter()
            .find(|(s, _)| Arc::ptr_eq(s, source))
            .map(|(_, range)| *range)
            .unwrap_or(self.options.source_media_range)
    }

    /// Build one transcoder per transform. Fails with `NoTracksFound` when there are none.
    pub fn create_track_transcoders(&mut self) -> Result<()> {
        if self.transforms.is_empty() {
            return Err(TrackTranscoderError::NoTracksFound.into());
        }

        for (track, transform) in std::mem::take(&mut self.transforms).into_iter().enumerate() {
            let range = self.range_for(&transform.source);
            let transcoder = transcode::create(transform, range, &self.options)?;
            self.stats.set_track_codecs(
                track,
                Some(transcoder.decoder_name()?),
                Some(transcoder.encoder_name()?),
            );
            self.transcoders.push(transcoder);
        }
        Ok(())
    }

    fn start_track_transcoders(&mut self) -> Result<()> {
        for transcoder in &mut self.transcoders {
            transcoder.start()?;
        }
        Ok(())
    }

    fn seek_to_media_range_start(&self) {
        for (source, range) in &self.sources {
            source.lock().seek_to(range.start, SeekMode::PreviousSync);
        }
    }

    /// Advance every transcoder once. Returns `true` when all reached EoS.
    pub fn process_next_frame(&mut self) -> Result<bool> {
        let mut completed = true;

        for (track, transcoder) in self.transcoders.iter_mut().enumerate() {
            let started = Instant::now();
            let result = transcoder.process_next_frame();
            self.stats
                .increase_track_processing_duration(track, started.elapsed());
            completed &= result? == TranscodeResult::EosReached;
        }

        let progress = self.progress();
        if should_report_progress(self.options.progress_step(), self.last_progress, progress) {
            tracing::trace!(progress, "Progress");
            self.listener.on_progress(&self.id, progress);
            self.last_progress = progress;
        }

        Ok(completed)
    }

    /// Mean progress of all transcoders
    pub fn progress(&self) -> f32 {
        if self.transcoders.is_empty() {
            return 0.0;
        }
        let total: f32 = self.transcoders.iter().map(|t| t.progress()).sum();
        total / self.transcoders.len() as f32
    }

    /// Stop all transcoders, release sources and targets, and drop the output
    /// files unless the job succeeded. Only the first call has any effect.
    fn release(&mut self, success: bool) {
        if self.released {
            return;
        }
        self.released = true;

        for (track, transcoder) in self.transcoders.iter_mut().enumerate() {
            transcoder.stop();
            self.stats.set_target_format(track, transcoder.target_format());
        }
        for (source, _) in &self.sources {
            source.lock().release();
        }
        for target in &self.targets {
            let output_path = {
                let mut target = target.lock();
                target.release();
                target.output_path().map(Path::to_path_buf)
            };
            if !success {
                delete_output_file(output_path.as_deref());
            }
        }
    }

    /// Claim the single terminal notification. Returns `false` if it was already sent.
    fn terminate(&mut self) -> bool {
        !std::mem::replace(&mut self.terminated, true)
    }

    fn complete(&mut self) {
        self.release(true);
        if self.terminate() {
            tracing::info!("Transformation completed");
            self.listener.on_completed(&self.id, self.stats.stats());
        }
    }

    fn cancel(&mut self) {
        self.release(false);
        if self.terminate() {
            tracing::info!("Transformation cancelled");
            self.listener.on_cancelled(&self.id, self.stats.stats());
        }
    }

    fn error(&mut self, error: TransformError) {
        self.release(false);
        if self.terminate() {
            self.listener.on_error(&self.id, error, self.stats.stats());
        }
    }
}

/// Remove a partially written output file. Returns whether a file was deleted.
pub fn delete_output_file(path: Option<&Path>) -> bool {
    let Some(path) = path else {
        return false;
    };
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Deleted output file");
            true
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to delete output file");
            false
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
