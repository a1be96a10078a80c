use super::{output_frame_count, AudioResampler};
use crate::error::ResampleError;

/// Drops whole frames to lower the sample rate.
///
/// Kept and dropped frames are interleaved in proportion to the remaining
/// budget of each, instead of dropping one contiguous block, which keeps the
/// periodic artifacts of frame dropping spread out evenly.
#[derive(Debug, Default, Clone, Copy)]
pub struct DownsampleAudioResampler;

impl AudioResampler for DownsampleAudioResampler {
    fn resample(
        &self,
        input: &[i16],
        input_rate: u32,
        output: &mut Vec<i16>,
        output_rate: u32,
        channels: usize,
    ) -> Result<(), ResampleError> {
        if input_rate < output_rate {
            return Err(ResampleError::InvalidRates {
                resampler: "downsample",
                input_rate,
                output_rate,
            });
        }
        if channels != 1 && channels != 2 {
            return Err(ResampleError::UnsupportedChannels {
                resampler: "downsample",
                channels,
            });
        }

        let input_frames = input.len() / channels;
        let output_frames = output_frame_count(input_frames, input_rate, output_rate);
        let drop_frames = input_frames - output_frames;

        output.reserve(output_frames * channels);

        let mut remaining_output = output_frames;
        let mut remaining_drop = drop_frames;
        let mut frames = input.chunks_exact(channels);

        while remaining_output > 0 || remaining_drop > 0 {
            let Some(frame) = frames.next() else {
                break;
            };

            // remaining_output / output_frames >= remaining_drop / drop_frames,
            // cross-multiplied to stay exact and well-defined for empty budgets
            let keep = remaining_output as u64 * drop_frames as u64
                >= remaining_drop as u64 * output_frames as u64;

            if keep && remaining_output > 0 {
                output.extend_from_slice(frame);
                remaining_output -= 1;
            } else {
                remaining_drop -= 1;
            }
        }

        Ok(())
    }
}
