//! PCM sample rate conversion
//!
//! Resamplers work on interleaved 16-bit PCM in whole-frame units (one frame
//! is one sample for every channel). `DefaultAudioResampler` dispatches on
//! the rate comparison:
//! - input rate > output rate: proportional frame dropping
//! - input rate == output rate: verbatim copy
//! - input rate < output rate: verbatim copy (no interpolation yet)

mod downsample;
mod passthrough;

use crate::error::ResampleError;

pub use downsample::DownsampleAudioResampler;
pub use passthrough::{PassthroughAudioResampler, UpsampleAudioResampler};

/// Converts interleaved PCM between sample rates
pub trait AudioResampler: Send + Sync {
    /// Resample `input` at `input_rate` and append the result to `output`.
    fn resample(
        &self,
        input: &[i16],
        input_rate: u32,
        output: &mut Vec<i16>,
        output_rate: u32,
        channels: usize,
    ) -> Result<(), ResampleError>;
}

/// Picks the resampler matching the direction of the conversion
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAudioResampler;

impl AudioResampler for DefaultAudioResampler {
    fn resample(
        &self,
        input: &[i16],
        input_rate: u32,
        output: &mut Vec<i16>,
        output_rate: u32,
        channels: usize,
    ) -> Result<(), ResampleError> {
        use std::cmp::Ordering;

        match input_rate.cmp(&output_rate) {
            Ordering::Greater => {
                DownsampleAudioResampler.resample(input, input_rate, output, output_rate, channels)
            }
            Ordering::Equal => {
                PassthroughAudioResampler.resample(input, input_rate, output, output_rate, channels)
            }
            Ordering::Less => {
                UpsampleAudioResampler.resample(input, input_rate, output, output_rate, channels)
            }
        }
    }
}

/// Number of output frames produced for `input_frames` frames, rounded up.
pub fn output_frame_count(input_frames: usize, input_rate: u32, output_rate: u32) -> usize {
    if input_rate == 0 {
        return 0;
    }
    let numerator = input_frames as u64 * output_rate as u64;
    numerator.div_ceil(input_rate as u64) as usize
}
