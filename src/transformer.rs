//! Job executor
//!
//! `MediaTransformer` runs each transformation request as a
//! `TransformationJob` on the tokio blocking pool, at most
//! `max_concurrent_jobs` at a time. Requests are tracked by id until their
//! terminal notification so they can be cancelled.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::config::{TransformationOptions, TransformerConfig};
use crate::error::{Result, TransformError};
use crate::job::disk::{self, DiskSpaceProbe, StatvfsDiskProbe};
use crate::job::{CancellationFlag, TransformationJob};
use crate::listener::TransformationListener;
use crate::stats::TrackTransformationInfo;
use crate::track_transform::TrackTransform;
use crate::types::MediaRange;

type JobRegistry = Arc<DashMap<String, CancellationFlag>>;

pub struct MediaTransformer {
    config: TransformerConfig,
    runtime: Handle,
    jobs: JobRegistry,
    permits: Arc<Semaphore>,
    disk_probe: Arc<dyn DiskSpaceProbe>,
}

impl MediaTransformer {
    /// Create a transformer on the current tokio runtime.
    pub fn new(config: TransformerConfig) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| TransformError::Config(format!("no tokio runtime available: {}", e)))?;
        Ok(Self::with_handle(config, runtime))
    }

    pub fn with_handle(config: TransformerConfig, runtime: Handle) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        Self {
            config,
            runtime,
            jobs: Arc::new(DashMap::new()),
            permits,
            disk_probe: Arc::new(StatvfsDiskProbe),
        }
    }

    pub fn with_disk_probe(mut self, probe: impl DiskSpaceProbe + 'static) -> Self {
        self.disk_probe = Arc::new(probe);
        self
    }

    pub fn config(&self) -> &TransformerConfig {
        &self.config
    }

    /// Fresh random request id
    pub fn generate_request_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Queue a transformation.
    ///
    /// `options` defaults to the configured options. Fails without notifying
    /// `listener` if a request with the same id is still running or the
    /// options are invalid.
    pub fn transform(
        &self,
        request_id: impl Into<String>,
        mut transforms: Vec<TrackTransform>,
        options: Option<TransformationOptions>,
        listener: Arc<dyn TransformationListener>,
    ) -> Result<()> {
        let request_id = request_id.into();
        let options = options.unwrap_or_else(|| self.config.options.clone());
        options.validate()?;

        for transform in &mut transforms {
            apply_source_format_for_filters(transform)?;
        }

        let cancellation = CancellationFlag::new();
        match self.jobs.entry(request_id.clone()) {
            Entry::Occupied(_) => return Err(TransformError::DuplicateRequest(request_id)),
            Entry::Vacant(entry) => {
                entry.insert(cancellation.clone());
            }
        }

        let listener = Arc::new(RegistryListener {
            inner: listener,
            jobs: self.jobs.clone(),
        });
        let probe = SharedProbe(self.disk_probe.clone());
        let mut job = TransformationJob::new(request_id.clone(), transforms, options, listener)
            .with_cancellation_flag(cancellation)
            .with_disk_probe(probe);

        let permits = self.permits.clone();
        tracing::debug!(job_id = %request_id, "Queued transformation job");
        self.runtime.spawn(async move {
            // The semaphore is never closed, so acquiring only waits
            let _permit = permits.acquire_owned().await;
            if let Err(e) = tokio::task::spawn_blocking(move || job.run()).await {
                tracing::error!(job_id = %request_id, error = %e, "Transformation worker failed");
            }
        });
        Ok(())
    }

    /// Request cancellation. Returns `false` if no such request is running.
    pub fn cancel(&self, request_id: &str) -> bool {
        match self.jobs.get(request_id) {
            Some(flag) => {
                tracing::debug!(job_id = %request_id, "Cancelling transformation job");
                flag.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every running request.
    pub fn release(&self) {
        for entry in self.jobs.iter() {
            entry.value().cancel();
        }
    }

    pub fn is_running(&self, request_id: &str) -> bool {
        self.jobs.contains_key(request_id)
    }

    pub fn active_jobs(&self) -> usize {
        self.jobs.len()
    }

    /// Estimated output size of `transforms` in bytes
    pub fn estimated_target_size(&self, transforms: &[TrackTransform], range: MediaRange) -> Result<u64> {
        disk::estimate_transforms(transforms, range)
    }
}

/// A track with filters but no target format cannot be copied through, so
/// it is re-encoded with the parameters of its source.
fn apply_source_format_for_filters(transform: &mut TrackTransform) -> Result<()> {
    let has_filters = transform
        .renderer
        .as_ref()
        .is_some_and(|renderer| renderer.has_filters());
    if transform.target_format.is_none() && has_filters {
        let format = transform.source.lock().track_format(transform.source_track)?;
        tracing::debug!(track = transform.source_track, "Filters set, transcoding with source format");
        transform.target_format = Some(format);
    }
    Ok(())
}

struct SharedProbe(Arc<dyn DiskSpaceProbe>);

impl DiskSpaceProbe for SharedProbe {
    fn available_bytes(&self, directory: &std::path::Path) -> Option<u64> {
        self.0.available_bytes(directory)
    }
}

/// Drops the request from the registry before forwarding its terminal event
struct RegistryListener {
    inner: Arc<dyn TransformationListener>,
    jobs: JobRegistry,
}

impl TransformationListener for RegistryListener {
    fn on_started(&self, job_id: &str) {
        self.inner.on_started(job_id);
    }

    fn on_progress(&self, job_id: &str, progress: f32) {
        self.inner.on_progress(job_id, progress);
    }

    fn on_completed(&self, job_id: &str, stats: Vec<TrackTransformationInfo>) {
        self.jobs.remove(job_id);
        self.inner.on_completed(job_id, stats);
    }

    fn on_cancelled(&self, job_id: &str, stats: Vec<TrackTransformationInfo>) {
        self.jobs.remove(job_id);
        self.inner.on_cancelled(job_id, stats);
    }

    fn on_error(&self, job_id: &str, error: TransformError, stats: Vec<TrackTransformationInfo>) {
        self.jobs.remove(job_id);
        self.inner.on_error(job_id, error, stats);
    }
}
