//! Per-track transformation statistics

use serde::{Serialize, Serializer};
use std::time::Duration;

use crate::types::MediaFormat;

/// What happened to one track during a job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackTransformationInfo {
    pub source_format: MediaFormat,
    /// Negotiated output format, `None` until the encoder reported it
    pub target_format: Option<MediaFormat>,
    pub decoder: Option<String>,
    pub encoder: Option<String>,
    /// Time spent in this track's transcoder
    #[serde(rename = "processing_duration_ms", serialize_with = "serialize_millis")]
    pub processing_duration: Duration,
}

impl TrackTransformationInfo {
    fn new(source_format: MediaFormat) -> Self {
        Self {
            source_format,
            target_format: None,
            decoder: None,
            encoder: None,
            processing_duration: Duration::ZERO,
        }
    }
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Collects one `TrackTransformationInfo` per track, indexed like the job's transforms.
///
/// Updates for unknown track indices are ignored.
#[derive(Debug, Default)]
pub struct TransformationStatsCollector {
    tracks: Vec<TrackTransformationInfo>,
}

impl TransformationStatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source_track(&mut self, source_format: MediaFormat) {
        self.tracks.push(TrackTransformationInfo::new(source_format));
    }

    pub fn set_track_codecs(&mut self, track: usize, decoder: Option<String>, encoder: Option<String>) {
        if let Some(info) = self.tracks.get_mut(track) {
            info.decoder = decoder;
            info.encoder = encoder;
        }
    }

    pub fn set_target_format(&mut self, track: usize, target_format: Option<MediaFormat>) {
        if let Some(info) = self.tracks.get_mut(track) {
            info.target_format = target_format;
        }
    }

    pub fn increase_track_processing_duration(&mut self, track: usize, elapsed: Duration) {
        if let Some(info) = self.tracks.get_mut(track) {
            info.processing_duration += elapsed;
        }
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Snapshot of the collected stats
    pub fn stats(&self) -> Vec<TrackTransformationInfo> {
        self.tracks.clone()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.tracks)
    }
}
