//! Mel spectrogram extraction
//!
//! Parameters come from [`FeatureParams`]:
//! - Hann-windowed frames of `frame_size` samples every `hop_size` samples
//!   (no centering or padding: a clip shorter than one frame yields zero frames)
//! - Power spectrum via real FFT
//! - Triangular HTK mel filters over [0, target_rate / 2], each scaled to unit area
//! - Log compression: 10 * log10(energy + log_epsilon)

use std::sync::Arc;

use realfft::{RealFftPlanner, RealToComplex};

use super::error::ExtractionError;
use super::grid::SpectrogramGrid;
use super::FeatureParams;

/// Log-compress one mel band energy
///
/// Computed in f64 so `log_compress(0.0, 1e-6)` lands exactly on -60.
pub fn log_compress(energy: f32, epsilon: f32) -> f32 {
    (10.0 * (energy as f64 + epsilon as f64).log10()) as f32
}

/// One triangular filter, stored from its first non-zero bin
#[derive(Debug, Clone)]
struct MelFilter {
    start_bin: usize,
    weights: Vec<f32>,
    center_hz: f32,
}

/// Mel spectrogram extractor with a precomputed window, filterbank and FFT plan
pub struct MelExtractor {
    frame_size: usize,
    hop_size: usize,
    log_epsilon: f32,
    window: Vec<f32>,
    filters: Vec<MelFilter>,
    fft: Arc<dyn RealToComplex<f32>>,
}

impl MelExtractor {
    pub fn new(params: &FeatureParams) -> Result<Self, ExtractionError> {
        params.validate()?;

        let filters = create_mel_filterbank(params.mel_bands, params.frame_size, params.target_rate as f32);
        let empty = filters.iter().filter(|f| f.weights.is_empty()).count();
        if empty > 0 {
            log::debug!(
                "{} of {} mel filters fall between FFT bins and stay silent",
                empty,
                params.mel_bands
            );
        }

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(params.frame_size);

        Ok(Self {
            frame_size: params.frame_size,
            hop_size: params.hop_size,
            log_epsilon: params.log_epsilon,
            window: hann_window(params.frame_size),
            filters,
            fft,
        })
    }

    /// Frames produced for a signal of `n_samples`
    pub fn frame_count(&self, n_samples: usize) -> usize {
        if n_samples < self.frame_size {
            0
        } else {
            (n_samples - self.frame_size) / self.hop_size + 1
        }
    }

    pub fn n_bands(&self) -> usize {
        self.filters.len()
    }

    /// Center frequency of each mel band
    pub fn band_centers_hz(&self) -> Vec<f32> {
        self.filters.iter().map(|f| f.center_hz).collect()
    }

    /// Compute the log mel spectrogram of a signal already at the target rate
    pub fn compute(&self, samples: &[f32]) -> Result<SpectrogramGrid, ExtractionError> {
        let n_frames = self.frame_count(samples.len());
        let mut grid = SpectrogramGrid::with_capacity(n_frames, self.n_bands());

        let mut frame_buf = vec![0.0f32; self.frame_size];
        let mut spectrum = self.fft.make_output_vec();
        let mut scratch = self.fft.make_scratch_vec();
        let mut power = vec![0.0f32; spectrum.len()];

        for frame_idx in 0..n_frames {
            let start = frame_idx * self.hop_size;
            let frame = &samples[start..start + self.frame_size];

            for ((dst, &s), &w) in frame_buf.iter_mut().zip(frame).zip(&self.window) {
                *dst = s * w;
            }

            self.fft
                .process_with_scratch(&mut frame_buf, &mut spectrum, &mut scratch)
                .map_err(|e| ExtractionError::Fft(format!("{:?}", e)))?;

            for (p, c) in power.iter_mut().zip(&spectrum) {
                *p = c.norm_sqr();
            }

            let bands = self
                .filters
                .iter()
                .map(|filter| {
                    let energy: f32 = filter
                        .weights
                        .iter()
                        .zip(&power[filter.start_bin..])
                        .map(|(&w, &p)| w * p)
                        .sum();
                    log_compress(energy.max(0.0), self.log_epsilon)
                })
                .collect();

            grid.push_frame(bands);
        }

        log::debug!(
            "Mel spectrogram: {} samples -> {} frames x {} bands",
            samples.len(),
            n_frames,
            self.n_bands()
        );

        Ok(grid)
    }
}

/// Periodic Hann window
fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let phase = 2.0 * std::f32::consts::PI * i as f32 / size as f32;
            0.5 * (1.0 - phase.cos())
        })
        .collect()
}

/// Create the triangular mel filterbank over [0, sample_rate / 2]
fn create_mel_filterbank(n_bands: usize, frame_size: usize, sample_rate: f32) -> Vec<MelFilter> {
    let n_bins = frame_size / 2 + 1;
    let mel_min = hz_to_mel(0.0);
    let mel_max = hz_to_mel(sample_rate / 2.0);

    // n_bands + 2 evenly spaced mel points give each filter its left/center/right edge
    let n_points = n_bands + 2;
    let bin_points: Vec<f32> = (0..n_points)
        .map(|i| mel_min + (mel_max - mel_min) * i as f32 / (n_points - 1) as f32)
        .map(|mel| mel_to_hz(mel) * frame_size as f32 / sample_rate)
        .collect();

    (0..n_bands)
        .map(|band| {
            let left = bin_points[band];
            let center = bin_points[band + 1];
            let right = bin_points[band + 2];

            let mut weights = vec![0.0f32; n_bins];
            for (bin, weight) in weights.iter_mut().enumerate() {
                let bin_f = bin as f32;
                if bin_f > left && bin_f <= center && center > left {
                    *weight = (bin_f - left) / (center - left);
                } else if bin_f > center && bin_f < right && right > center {
                    *weight = (right - bin_f) / (right - center);
                }
            }

            // Unit area
            let area: f32 = weights.iter().sum();
            if area > 0.0 {
                weights.iter_mut().for_each(|w| *w /= area);
            }

            let start_bin = weights.iter().position(|&w| w > 0.0).unwrap_or(0);
            let end_bin = weights.iter().rposition(|&w| w > 0.0).map_or(start_bin, |i| i + 1);

            MelFilter {
                start_bin,
                weights: weights[start_bin..end_bin].to_vec(),
                center_hz: center * sample_rate / frame_size as f32,
            }
        })
        .collect()
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0_f32.powf(mel / 2595.0) - 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::SILENCE_FLOOR_DB;

    fn sine(freq: f32, rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_mel_hz_roundtrip() {
        let hz = 1000.0;
        let mel = hz_to_mel(hz);
        let back = mel_to_hz(mel);
        assert!((back - hz).abs() < 0.1, "Roundtrip: {} -> {} -> {}", hz, mel, back);
    }

    #[test]
    fn test_log_floor_matches_padding_constant() {
        assert_eq!(log_compress(0.0, 1e-6), SILENCE_FLOOR_DB);
        assert_eq!(log_compress(0.0, 1e-6), FeatureParams::default().padding_floor());
    }

    #[test]
    fn test_frame_count_formula() {
        let extractor = MelExtractor::new(&FeatureParams::default()).unwrap();
        assert_eq!(extractor.frame_count(0), 0);
        assert_eq!(extractor.frame_count(2047), 0);
        assert_eq!(extractor.frame_count(2048), 1);
        assert_eq!(extractor.frame_count(3071), 1);
        assert_eq!(extractor.frame_count(3072), 2);
        assert_eq!(extractor.frame_count(66150), 63);
    }

    #[test]
    fn test_short_signal_has_no_frames() {
        let extractor = MelExtractor::new(&FeatureParams::default()).unwrap();
        let grid = extractor.compute(&[0.1; 2000]).unwrap();
        assert_eq!(grid.frame_count(), 0);
        assert_eq!(grid.n_bands(), 64);
    }

    #[test]
    fn test_silence_sits_on_floor() {
        let extractor = MelExtractor::new(&FeatureParams::default()).unwrap();
        let grid = extractor.compute(&[0.0; 4096]).unwrap();
        assert_eq!(grid.frame_count(), 3);
        assert!(grid.frames().iter().flatten().all(|&v| v == SILENCE_FLOOR_DB));
    }

    #[test]
    fn test_filters_have_unit_area() {
        let filters = create_mel_filterbank(64, 2048, 22050.0);
        assert_eq!(filters.len(), 64);
        for (i, filter) in filters.iter().enumerate() {
            if filter.weights.is_empty() {
                continue;
            }
            let area: f32 = filter.weights.iter().sum();
            assert!((area - 1.0).abs() < 1e-4, "filter {} area {}", i, area);
        }
    }

    #[test]
    fn test_tone_peaks_in_matching_band() {
        let params = FeatureParams::default();
        let extractor = MelExtractor::new(&params).unwrap();
        let grid = extractor.compute(&sine(1000.0, params.target_rate, 22050)).unwrap();

        let frame = &grid.frames()[5];
        let peak = frame
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
            .unwrap();
        let centers = extractor.band_centers_hz();
        assert!((centers[peak] - 1000.0).abs() < 100.0, "peak band centered at {} Hz", centers[peak]);
        assert!(frame[peak] > SILENCE_FLOOR_DB + 40.0);
    }

    #[test]
    fn test_deterministic() {
        let params = FeatureParams::default();
        let samples = sine(330.0, params.target_rate, 30000);
        let a = MelExtractor::new(&params).unwrap().compute(&samples).unwrap();
        let b = MelExtractor::new(&params).unwrap().compute(&samples).unwrap();
        assert_eq!(a, b);
    }
}
