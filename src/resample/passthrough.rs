use super::AudioResampler;
use crate::error::ResampleError;

/// Copies input to output; only valid when both rates match
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughAudioResampler;

impl AudioResampler for PassthroughAudioResampler {
    fn resample(
        &self,
        input: &[i16],
        input_rate: u32,
        output: &mut Vec<i16>,
        output_rate: u32,
        _channels: usize,
    ) -> Result<(), ResampleError> {
        if input_rate != output_rate {
            return Err(ResampleError::InvalidRates {
                resampler: "passthrough",
                input_rate,
                output_rate,
            });
        }
        output.extend_from_slice(input);
        Ok(())
    }
}

/// Raises the sample rate.
///
/// No frames are interpolated: the input is copied as is, so the output
/// plays back shorter than the source.
// TODO: insert interpolated frames once consumers stop relying on the copy behaviour
#[derive(Debug, Default, Clone, Copy)]
pub struct UpsampleAudioResampler;

impl AudioResampler for UpsampleAudioResampler {
    fn resample(
        &self,
        input: &[i16],
        input_rate: u32,
        output: &mut Vec<i16>,
        output_rate: u32,
        _channels: usize,
    ) -> Result<(), ResampleError> {
        if input_rate > output_rate {
            return Err(ResampleError::InvalidRates {
                resampler: "upsample",
                input_rate,
                output_rate,
            });
        }
        output.extend_from_slice(input);
        Ok(())
    }
}
