//! Rhythm, periodicity and harmonic/percussive balance

use super::{SpectralContext, HOP_LENGTH, N_FFT};
use crate::audio::{mean_std, mean_std_f64};
use crate::spectral::inverse_stft;
use ndarray::Array2;

/// Number of waveform autocorrelation lags summarized
pub const AUTOCORR_LAGS: usize = 100;
/// Median filter length for both separation directions
pub const HPSS_KERNEL: usize = 31;
/// Added to the mean absolute amplitude before dividing
pub const HPSS_EPSILON: f64 = 1e-6;
/// Fastest tempo considered
pub const MAX_BPM: f64 = 320.0;
/// Center of the log-normal tempo prior
pub const PRIOR_BPM: f64 = 120.0;
/// Longest autocorrelation lag searched for tempo, in onset frames
const MAX_TEMPO_LAG: usize = 384;

/// Onset strength envelope from positive mel-dB flux
///
/// Frame `t` holds the mean rise of every mel band between frames `t - 1`
/// and `t`, shifted to line up with the centered frames.
pub fn onset_strength(ctx: &SpectralContext) -> Vec<f32> {
    let mel = &ctx.mel_db;
    let (n_mels, n_frames) = mel.dim();
    if n_frames == 0 {
        return Vec::new();
    }

    let flux = (1..n_frames).map(|t| {
        (0..n_mels)
            .map(|m| (mel[[m, t]] - mel[[m, t - 1]]).max(0.0))
            .sum::<f32>()
            / n_mels as f32
    });

    let pad = 1 + N_FFT / (2 * HOP_LENGTH);
    std::iter::repeat(0.0)
        .take(pad)
        .chain(flux)
        .take(n_frames)
        .collect()
}

/// Global tempo estimate in BPM, 0 when the envelope has no energy
pub fn tempo(onset: &[f32], sample_rate: u32) -> f64 {
    let n = onset.len();
    if n < 2 || onset.iter().all(|&v| v <= 0.0) {
        return 0.0;
    }

    let frame_rate = sample_rate as f64 / HOP_LENGTH as f64;
    let max_lag = (n - 1).min(MAX_TEMPO_LAG);

    let mut best: Option<(f64, f64)> = None;
    for lag in 1..=max_lag {
        let bpm = 60.0 * frame_rate / lag as f64;
        if bpm > MAX_BPM {
            continue;
        }
        let ac: f64 = onset[..n - lag]
            .iter()
            .zip(&onset[lag..])
            .map(|(&a, &b)| a as f64 * b as f64)
            .sum();
        let prior = (-0.5 * (bpm / PRIOR_BPM).log2().powi(2)).exp();
        let score = ac * prior;
        if best.map_or(true, |(s, _)| score > s) {
            best = Some((score, bpm));
        }
    }

    match best {
        Some((score, bpm)) if score > 0.0 => bpm,
        _ => 0.0,
    }
}

/// Raw waveform autocorrelation at lags `0..AUTOCORR_LAGS`
pub fn autocorrelation(y: &[f32]) -> Vec<f64> {
    (0..AUTOCORR_LAGS.min(y.len()))
        .map(|lag| {
            y[..y.len() - lag]
                .iter()
                .zip(&y[lag..])
                .map(|(&a, &b)| a as f64 * b as f64)
                .sum()
        })
        .collect()
}

/// Median-filtering harmonic/percussive separation
///
/// Returns `(harmonic, percussive)` waveforms of the same length as `y`.
pub fn hpss(y: &[f32], ctx: &SpectralContext) -> (Vec<f32>, Vec<f32>) {
    let mag = &ctx.magnitude;
    let harmonic_env = median_filter_time(mag, HPSS_KERNEL);
    let percussive_env = median_filter_freq(mag, HPSS_KERNEL);

    let mut harmonic_s = ctx.stft.s.clone();
    let mut percussive_s = ctx.stft.s.clone();
    for ((i, j), &h) in harmonic_env.indexed_iter() {
        let p = percussive_env[[i, j]];
        let (h2, p2) = (h * h, p * p);
        let total = h2 + p2;
        let (h_mask, p_mask) = if total > 0.0 {
            (h2 / total, p2 / total)
        } else {
            (0.0, 0.0)
        };
        harmonic_s[[i, j]] *= h_mask;
        percussive_s[[i, j]] *= p_mask;
    }

    (
        inverse_stft(&harmonic_s, N_FFT, HOP_LENGTH, y.len()),
        inverse_stft(&percussive_s, N_FFT, HOP_LENGTH, y.len()),
    )
}

fn median(values: &mut [f32]) -> f32 {
    let mid = values.len() / 2;
    let (_, m, _) = values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    *m
}

/// Median over a window of neighbouring frames (horizontal)
fn median_filter_time(mag: &Array2<f32>, kernel_size: usize) -> Array2<f32> {
    let (n_freq, n_time) = mag.dim();
    let half = kernel_size / 2;
    let mut out = Array2::<f32>::zeros((n_freq, n_time));
    let mut window = Vec::with_capacity(kernel_size);

    for i in 0..n_freq {
        for j in 0..n_time {
            let start = j.saturating_sub(half);
            let end = (j + half + 1).min(n_time);
            window.clear();
            window.extend((start..end).map(|t| mag[[i, t]]));
            out[[i, j]] = median(&mut window);
        }
    }
    out
}

/// Median over a window of neighbouring bins (vertical)
fn median_filter_freq(mag: &Array2<f32>, kernel_size: usize) -> Array2<f32> {
    let (n_freq, n_time) = mag.dim();
    let half = kernel_size / 2;
    let mut out = Array2::<f32>::zeros((n_freq, n_time));
    let mut window = Vec::with_capacity(kernel_size);

    for j in 0..n_time {
        for i in 0..n_freq {
            let start = i.saturating_sub(half);
            let end = (i + half + 1).min(n_freq);
            window.clear();
            window.extend((start..end).map(|f| mag[[f, j]]));
            out[[i, j]] = median(&mut window);
        }
    }
    out
}

fn mean_abs(y: &[f32]) -> f64 {
    if y.is_empty() {
        return 0.0;
    }
    y.iter().map(|&v| v.abs() as f64).sum::<f64>() / y.len() as f64
}

/// `[onset mean, onset std, tempo, autocorr mean, autocorr std, harmonic ratio, percussive ratio]`
pub fn extract(y: &[f32], ctx: &SpectralContext) -> Vec<f64> {
    let onset = onset_strength(ctx);
    let [onset_mean, onset_std] = mean_std(&onset);
    let bpm = tempo(&onset, ctx.sample_rate);

    let [ac_mean, ac_std] = mean_std_f64(&autocorrelation(y));

    let (harmonic, percussive) = hpss(y, ctx);
    let denom = mean_abs(y) + HPSS_EPSILON;

    vec![
        onset_mean,
        onset_std,
        bpm,
        ac_mean,
        ac_std,
        mean_abs(&harmonic) / denom,
        mean_abs(&percussive) / denom,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn click_track(bpm: f32, sr: u32, seconds: f32) -> Vec<f32> {
        let n = (sr as f32 * seconds) as usize;
        let period = (60.0 / bpm * sr as f32) as usize;
        let mut y = vec![0.0f32; n];
        for start in (0..n).step_by(period) {
            for (k, sample) in y[start..(start + 200).min(n)].iter_mut().enumerate() {
                *sample = (2.0 * PI * 1500.0 * k as f32 / sr as f32).sin() * (1.0 - k as f32 / 200.0);
            }
        }
        y
    }

    #[test]
    fn test_onset_envelope_alignment() {
        let y = click_track(120.0, 22050, 4.0);
        let ctx = SpectralContext::new(&y, 22050);
        let onset = onset_strength(&ctx);
        assert_eq!(onset.len(), ctx.stft.n_frames());
        assert_eq!(onset[0], 0.0);
        assert!(onset.iter().any(|&v| v > 0.0));
    }

    #[test]
    fn test_tempo_of_click_track() {
        let y = click_track(120.0, 22050, 8.0);
        let ctx = SpectralContext::new(&y, 22050);
        let bpm = tempo(&onset_strength(&ctx), 22050);
        assert!((bpm - 120.0).abs() < 6.0, "estimated {} BPM", bpm);
    }

    #[test]
    fn test_tempo_of_flat_envelope_is_zero() {
        assert_eq!(tempo(&[0.0; 50], 22050), 0.0);
        assert_eq!(tempo(&[], 22050), 0.0);
    }

    #[test]
    fn test_autocorrelation_lag_zero_is_energy() {
        let y: Vec<f32> = (0..1000).map(|i| (i as f32 * 0.05).sin()).collect();
        let ac = autocorrelation(&y);
        assert_eq!(ac.len(), AUTOCORR_LAGS);
        let energy: f64 = y.iter().map(|&v| (v as f64).powi(2)).sum();
        assert!((ac[0] - energy).abs() < 1e-6 * energy);
        assert!(ac.iter().all(|&v| v <= ac[0] + 1e-9));
    }

    #[test]
    fn test_steady_tone_is_mostly_harmonic() {
        let sr = 22050;
        let y: Vec<f32> = (0..sr as usize)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / sr as f32).sin())
            .collect();
        let ctx = SpectralContext::new(&y, sr);
        let values = extract(&y, &ctx);
        let (harmonic_ratio, percussive_ratio) = (values[5], values[6]);
        assert!(harmonic_ratio > percussive_ratio);
        assert!(harmonic_ratio > 0.5 && harmonic_ratio < 1.2);
    }

    #[test]
    fn test_silence() {
        let y = vec![0.0f32; 8192];
        let ctx = SpectralContext::new(&y, 22050);
        let values = extract(&y, &ctx);
        assert_eq!(values.len(), 7);
        assert!(values.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_median_filters_truncate_at_edges() {
        let mag = Array2::from_shape_vec((1, 5), vec![5.0, 1.0, 3.0, 2.0, 4.0]).unwrap();
        let filtered = median_filter_time(&mag, 3);
        assert_eq!(filtered.row(0).to_vec(), vec![5.0, 3.0, 2.0, 3.0, 4.0]);
    }
}
