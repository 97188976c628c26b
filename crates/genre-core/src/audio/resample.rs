//! Sample rate conversion using rubato
//!
//! Band-limited sinc interpolation. The resampler's group delay is trimmed and
//! the tail flushed so the output lines up with the input and its length is
//! exactly `round(len * target / source)`.

use std::borrow::Cow;

use rubato::{
    Resampler as RubatoResampler, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};

use super::error::{AudioError, AudioResult};

/// Input frames fed to the resampler per call
const CHUNK_SIZE: usize = 1024;

/// Output length for `input_len` samples converted from `source_rate` to `target_rate`
pub fn expected_output_len(input_len: usize, source_rate: u32, target_rate: u32) -> usize {
    let source = source_rate as u64;
    ((input_len as u64 * target_rate as u64 + source / 2) / source) as usize
}

/// Resample mono samples from `source_rate` to `target_rate`
///
/// Equal rates return the input untouched (borrowed).
pub fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> AudioResult<Cow<'_, [f32]>> {
    if source_rate == 0 || target_rate == 0 {
        return Err(AudioError::InvalidRate { source_rate, target_rate });
    }
    if source_rate == target_rate {
        return Ok(Cow::Borrowed(samples));
    }
    if samples.is_empty() {
        return Ok(Cow::Owned(Vec::new()));
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let expected_len = expected_output_len(samples.len(), source_rate, target_rate);
    log::debug!(
        "Resampling {} samples {} Hz -> {} Hz (ratio {:.4})",
        samples.len(),
        source_rate,
        target_rate,
        ratio
    );

    resample_sinc(samples, ratio, expected_len).map(Cow::Owned)
}

fn resample_sinc(samples: &[f32], ratio: f64, expected_len: usize) -> AudioResult<Vec<f32>> {
    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, CHUNK_SIZE, 1)
        .map_err(|e| AudioError::Resample(e.to_string()))?;

    let delay = resampler.output_delay();
    let wanted = expected_len + delay;
    let mut output = Vec::with_capacity(wanted + CHUNK_SIZE);

    let mut chunks = samples.chunks_exact(CHUNK_SIZE);
    for chunk in &mut chunks {
        let out = resampler
            .process(&[chunk], None)
            .map_err(|e| AudioError::Resample(e.to_string()))?;
        output.extend_from_slice(&out[0]);
    }

    let remainder = chunks.remainder();
    if !remainder.is_empty() {
        let input: [&[f32]; 1] = [remainder];
        let out = resampler
            .process_partial(Some(&input[..]), None)
            .map_err(|e| AudioError::Resample(e.to_string()))?;
        output.extend_from_slice(&out[0]);
    }

    // Flush the filter tail
    while output.len() < wanted {
        let out = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| AudioError::Resample(e.to_string()))?;
        if out[0].is_empty() {
            break;
        }
        output.extend_from_slice(&out[0]);
    }

    let mut aligned = output.split_off(delay.min(output.len()));
    aligned.resize(expected_len, 0.0);
    Ok(aligned)
}
