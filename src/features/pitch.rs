//! Fundamental frequency (F0) estimation
//!
//! YIN-style estimator: the cumulative-mean-normalized difference function
//! is computed per frame from an FFT cross-correlation, and the first dip
//! below [`YIN_THRESHOLD`] inside the vocal lag range gives the period.
//! Frames without such a dip, and silent frames, are unvoiced.

use super::{HOP_LENGTH, N_FFT};
use crate::audio::{mean, std_dev};
use rustfft::{num_complex::Complex64, Fft, FftPlanner};
use std::sync::Arc;

/// Lowest detectable F0 (C2)
pub const FMIN: f32 = 65.41;
/// Highest detectable F0 (C7)
pub const FMAX: f32 = 2093.0;
/// Analysis frame length
pub const FRAME_LENGTH: usize = N_FFT;
/// Aperiodicity threshold on the normalized difference function
pub const YIN_THRESHOLD: f64 = 0.1;
/// Mean frame power below which a frame is treated as silent
const SILENCE_POWER: f64 = 1e-10;
/// Per-lag difference, relative to frame energy, treated as numerically zero
const FLAT_RESIDUE: f64 = 1e-9;

/// Per-frame pitch estimator with precomputed FFT plans
pub struct PitchTracker {
    sample_rate: u32,
    tau_min: usize,
    tau_max: usize,
    window: usize,
    fft_len: usize,
    fft: Arc<dyn Fft<f64>>,
    ifft: Arc<dyn Fft<f64>>,
}

impl PitchTracker {
    pub fn new(sample_rate: u32) -> Self {
        let sr = sample_rate as f32;
        let tau_max = ((sr / FMIN).ceil() as usize).min(FRAME_LENGTH / 2);
        let tau_min = ((sr / FMAX).floor() as usize).clamp(1, tau_max.saturating_sub(2).max(1));
        let window = FRAME_LENGTH - tau_max;
        let fft_len = (FRAME_LENGTH + window).next_power_of_two();

        let mut planner = FftPlanner::new();
        Self {
            sample_rate,
            tau_min,
            tau_max,
            window,
            fft_len,
            fft: planner.plan_fft_forward(fft_len),
            ifft: planner.plan_fft_inverse(fft_len),
        }
    }

    /// F0 in Hz for one frame of `FRAME_LENGTH` samples, `None` when unvoiced
    pub fn estimate(&self, frame: &[f32]) -> Option<f32> {
        debug_assert_eq!(frame.len(), FRAME_LENGTH);
        let n = self.window;

        // Prefix sums of squared samples give the sliding-window energies
        let mut energy_prefix = Vec::with_capacity(frame.len() + 1);
        energy_prefix.push(0.0f64);
        for &x in frame {
            let last = *energy_prefix.last().unwrap_or(&0.0);
            energy_prefix.push(last + (x as f64) * (x as f64));
        }

        let e0 = energy_prefix[n];
        if e0 / (n as f64) < SILENCE_POWER {
            return None;
        }

        let r = self.cross_correlation(frame);

        let mut cmndf = vec![1.0f64; self.tau_max + 1];
        let mut running_sum = 0.0;
        for tau in 1..=self.tau_max {
            let e_tau = energy_prefix[tau + n] - energy_prefix[tau];
            let d = (e0 + e_tau - 2.0 * r[tau]).max(0.0);
            running_sum += d;
            // Rounding residue of a flat (DC) frame must not read as periodicity
            cmndf[tau] = if running_sum > FLAT_RESIDUE * e0 * tau as f64 {
                d * tau as f64 / running_sum
            } else {
                1.0
            };
        }

        let mut tau = (self.tau_min..self.tau_max).find(|&t| cmndf[t] < YIN_THRESHOLD)?;
        while tau + 1 < self.tau_max && cmndf[tau + 1] < cmndf[tau] {
            tau += 1;
        }

        let period = tau as f64 + parabolic_shift(cmndf[tau - 1], cmndf[tau], cmndf[tau + 1]);
        let f0 = (self.sample_rate as f64 / period) as f32;

        (FMIN..=FMAX).contains(&f0).then_some(f0)
    }

    /// r[tau] = sum_{j < window} x[j] * x[j + tau]
    fn cross_correlation(&self, frame: &[f32]) -> Vec<f64> {
        let mut a = vec![Complex64::new(0.0, 0.0); self.fft_len];
        let mut b = vec![Complex64::new(0.0, 0.0); self.fft_len];
        for (i, &x) in frame.iter().enumerate() {
            a[i].re = x as f64;
            if i < self.window {
                b[i].re = x as f64;
            }
        }

        self.fft.process(&mut a);
        self.fft.process(&mut b);
        for (ai, bi) in a.iter_mut().zip(&b) {
            *ai *= bi.conj();
        }
        self.ifft.process(&mut a);

        let scale = 1.0 / self.fft_len as f64;
        a[..=self.tau_max].iter().map(|c| c.re * scale).collect()
    }
}

/// Sub-sample offset of the minimum of a parabola through three points
fn parabolic_shift(left: f64, center: f64, right: f64) -> f64 {
    let denom = left - 2.0 * center + right;
    if denom.abs() < 1e-12 {
        return 0.0;
    }
    (0.5 * (left - right) / denom).clamp(-1.0, 1.0)
}

/// F0 contour over uncentered frames; `None` marks unvoiced frames
pub fn f0_contour(y: &[f32], sample_rate: u32) -> Vec<Option<f32>> {
    if y.len() < FRAME_LENGTH {
        return Vec::new();
    }

    let tracker = PitchTracker::new(sample_rate);
    let n_frames = (y.len() - FRAME_LENGTH) / HOP_LENGTH + 1;
    (0..n_frames)
        .map(|i| {
            let start = i * HOP_LENGTH;
            tracker.estimate(&y[start..start + FRAME_LENGTH])
        })
        .collect()
}

/// `[mean, std, min, max, range]` over voiced frames, or five zeros when none are voiced
pub fn extract(y: &[f32], sample_rate: u32) -> Vec<f64> {
    let voiced: Vec<f32> = f0_contour(y, sample_rate).into_iter().flatten().collect();

    if voiced.is_empty() {
        return vec![0.0; 5];
    }

    let min = voiced.iter().copied().fold(f32::INFINITY, f32::min) as f64;
    let max = voiced.iter().copied().fold(f32::NEG_INFINITY, f32::max) as f64;
    vec![mean(&voiced), std_dev(&voiced), min, max, max - min]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, sr: u32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f32 / sr as f32).sin())
            .collect()
    }

    #[test]
    fn test_single_frame_estimates() {
        let sr = 22050;
        let tracker = PitchTracker::new(sr);
        for &freq in &[110.0f32, 200.0, 440.0, 880.0] {
            let y = sine(freq, sr, FRAME_LENGTH);
            let f0 = tracker.estimate(&y).expect("tone should be voiced");
            assert!(
                (f0 - freq).abs() / freq < 0.02,
                "expected ~{} Hz, got {} Hz",
                freq,
                f0
            );
        }
    }

    #[test]
    fn test_silent_frame_is_unvoiced() {
        let tracker = PitchTracker::new(22050);
        assert_eq!(tracker.estimate(&vec![0.0; FRAME_LENGTH]), None);
    }

    #[test]
    fn test_constant_frame_is_unvoiced() {
        let tracker = PitchTracker::new(22050);
        assert_eq!(tracker.estimate(&vec![1.0; FRAME_LENGTH]), None);
        assert_eq!(extract(&vec![1.0f32; 22050], 22050), vec![0.0; 5]);
    }

    #[test]
    fn test_silence_gives_zero_features() {
        let y = vec![0.0f32; 22050];
        assert_eq!(extract(&y, 22050), vec![0.0; 5]);
    }

    #[test]
    fn test_contour_frame_count() {
        let y = sine(200.0, 22050, 22050);
        let contour = f0_contour(&y, 22050);
        assert_eq!(contour.len(), (22050 - FRAME_LENGTH) / HOP_LENGTH + 1);
        assert!(contour.iter().all(Option::is_some));
    }

    #[test]
    fn test_parabolic_shift() {
        assert_eq!(parabolic_shift(1.0, 0.0, 1.0), 0.0);
        assert!(parabolic_shift(0.5, 0.0, 1.0) < 0.0);
        assert!(parabolic_shift(1.0, 0.0, 0.5) > 0.0);
        assert_eq!(parabolic_shift(1.0, 1.0, 1.0), 0.0);
    }
}
