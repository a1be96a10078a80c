//! Output size estimate and free space lookup

use std::path::Path;

use crate::error::Result;
use crate::track_transform::TrackTransform;
use crate::types::{MediaFormat, MediaRange};

/// Bitrate assumed for audio tracks that do not declare one
pub const COMMON_AUDIO_BITRATE: u64 = 320_000;

/// Reports free space of the volume holding a directory
pub trait DiskSpaceProbe: Send + Sync {
    /// Free bytes available to unprivileged writers, `None` if the lookup failed
    fn available_bytes(&self, directory: &Path) -> Option<u64>;
}

/// Free space lookup through `statvfs(3)`
#[derive(Debug, Default, Clone, Copy)]
pub struct StatvfsDiskProbe;

#[cfg(unix)]
impl DiskSpaceProbe for StatvfsDiskProbe {
    fn available_bytes(&self, directory: &Path) -> Option<u64> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let path = CString::new(directory.as_os_str().as_bytes()).ok()?;
        // SAFETY: `path` is NUL terminated and `stat` is a plain C struct
        unsafe {
            let mut stat: libc::statvfs = std::mem::zeroed();
            if libc::statvfs(path.as_ptr(), &mut stat) == 0 {
                Some((stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64))
            } else {
                tracing::warn!(directory = %directory.display(), "Could not get available disk space");
                None
            }
        }
    }
}

#[cfg(not(unix))]
impl DiskSpaceProbe for StatvfsDiskProbe {
    fn available_bytes(&self, _directory: &Path) -> Option<u64> {
        None
    }
}

/// Inputs of the size estimate for one track
#[derive(Debug, Clone)]
pub struct TrackEstimate {
    pub source_format: MediaFormat,
    pub target_format: Option<MediaFormat>,
    pub range: MediaRange,
}

impl TrackEstimate {
    /// Duration inside the range, `None` if the source does not know it
    fn duration_us(&self) -> Option<i64> {
        self.source_format
            .duration_us
            .map(|d| self.range.duration_within(d).max(0))
    }

    /// Bits per second the track is expected to be written at
    fn bitrate(&self) -> u64 {
        match &self.target_format {
            Some(target) => target.bitrate.map(u64::from).unwrap_or(0),
            None => match self.source_format.bitrate {
                Some(bitrate) => u64::from(bitrate),
                None if self.source_format.is_audio() => COMMON_AUDIO_BITRATE,
                None => 0,
            },
        }
    }
}

/// Estimated output size in bytes.
///
/// Tracks with an unknown duration are assumed to last as long as the
/// longest known track. Tracks with an unknown bitrate contribute nothing.
pub fn estimated_target_size(tracks: &[TrackEstimate]) -> u64 {
    let max_duration_us = tracks
        .iter()
        .filter_map(TrackEstimate::duration_us)
        .max()
        .unwrap_or(0);

    let bits: f64 = tracks
        .iter()
        .map(|track| {
            let duration_us = track.duration_us().unwrap_or_else(|| {
                tracing::debug!("Track duration is not available, using maximum duration");
                max_duration_us
            });
            track.bitrate() as f64 * duration_us as f64 / 1_000_000.0
        })
        .sum();

    (bits / 8.0) as u64
}

/// Estimate for a list of transforms, trimmed to `range` and to each source's selection.
pub fn estimate_transforms(transforms: &[TrackTransform], range: MediaRange) -> Result<u64> {
    let tracks = transforms
        .iter()
        .map(|transform| {
            let source = transform.source.lock();
            Ok(TrackEstimate {
                source_format: source.track_format(transform.source_track)?,
                target_format: transform.target_format.clone(),
                range: source.selection().intersect(&range),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(estimated_target_size(&tracks))
}
