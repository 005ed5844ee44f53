//! Spectral processing utilities (STFT, mel filterbank, cepstral transform)

use ndarray::Array2;
use rustfft::{num_complex::Complex32, FftPlanner};
use std::f32::consts::PI;

/// Floor applied before taking logarithms of power values
pub const AMIN: f32 = 1e-10;

/// STFT data structure
#[derive(Debug, Clone)]
pub struct StftData {
    /// Complex spectrogram, shape `(n_fft / 2 + 1, n_frames)`
    pub s: Array2<Complex32>,
    /// Center frequency of each bin in Hz
    pub freqs: Vec<f32>,
}

impl StftData {
    pub fn n_bins(&self) -> usize {
        self.s.shape()[0]
    }

    pub fn n_frames(&self) -> usize {
        self.s.shape()[1]
    }
}

/// Compute STFT of audio signal
///
/// With `center` the signal is zero-padded by `n_fft / 2` on both sides so
/// frame `t` is centered on sample `t * hop_length`.
pub fn stft(y: &[f32], n_fft: usize, hop_length: usize, center: bool, sample_rate: u32) -> StftData {
    let padded;
    let signal: &[f32] = if center {
        padded = pad_center(y, n_fft / 2);
        &padded
    } else {
        y
    };

    let n_frames = if signal.len() >= n_fft {
        (signal.len() - n_fft) / hop_length + 1
    } else {
        0
    };
    let n_bins = n_fft / 2 + 1;

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n_fft);
    let window = hann_window(n_fft);

    let mut s = Array2::<Complex32>::zeros((n_bins, n_frames));
    let mut frame = vec![Complex32::new(0.0, 0.0); n_fft];

    for frame_idx in 0..n_frames {
        let start = frame_idx * hop_length;

        for (slot, (&sample, &win)) in frame
            .iter_mut()
            .zip(signal[start..start + n_fft].iter().zip(&window))
        {
            *slot = Complex32::new(sample * win, 0.0);
        }

        fft.process(&mut frame);

        for (i, &val) in frame[..n_bins].iter().enumerate() {
            s[[i, frame_idx]] = val;
        }
    }

    StftData {
        s,
        freqs: fft_frequencies(sample_rate, n_fft),
    }
}

/// Inverse STFT by windowed overlap-add
///
/// Inverts a centered [`stft`] and trims the result to `length` samples.
pub fn inverse_stft(s: &Array2<Complex32>, n_fft: usize, hop_length: usize, length: usize) -> Vec<f32> {
    let n_frames = s.shape()[1];
    if n_frames == 0 {
        return vec![0.0; length];
    }

    let mut planner = FftPlanner::new();
    let ifft = planner.plan_fft_inverse(n_fft);
    let window = hann_window(n_fft);

    let expected_length = (n_frames - 1) * hop_length + n_fft;
    let mut y = vec![0.0f32; expected_length];
    let mut window_sum = vec![0.0f32; expected_length];
    let mut frame = vec![Complex32::new(0.0, 0.0); n_fft];
    let n_bins = n_fft / 2 + 1;

    for frame_idx in 0..n_frames {
        // Rebuild the full conjugate-symmetric spectrum
        for k in 0..n_bins {
            frame[k] = s[[k, frame_idx]];
        }
        for k in 1..(n_fft - n_bins + 1) {
            frame[n_fft - k] = s[[k, frame_idx]].conj();
        }

        ifft.process(&mut frame);

        let start = frame_idx * hop_length;
        for i in 0..n_fft {
            y[start + i] += frame[i].re / n_fft as f32 * window[i];
            window_sum[start + i] += window[i] * window[i];
        }
    }

    for (sample, &norm) in y.iter_mut().zip(&window_sum) {
        if norm > 1e-8 {
            *sample /= norm;
        }
    }

    let offset = n_fft / 2;
    (0..length)
        .map(|i| y.get(i + offset).copied().unwrap_or(0.0))
        .collect()
}

/// Periodic Hann window
pub fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / size as f32).cos()))
        .collect()
}

/// Zero-pad both ends of a signal
pub fn pad_center(y: &[f32], pad: usize) -> Vec<f32> {
    let mut padded = vec![0.0f32; y.len() + 2 * pad];
    padded[pad..pad + y.len()].copy_from_slice(y);
    padded
}

/// Bin center frequencies for an `n_fft`-point real FFT
pub fn fft_frequencies(sample_rate: u32, n_fft: usize) -> Vec<f32> {
    (0..n_fft / 2 + 1)
        .map(|i| i as f32 * sample_rate as f32 / n_fft as f32)
        .collect()
}

/// Compute magnitude spectrogram
pub fn magnitude_spectrogram(stft_data: &StftData) -> Array2<f32> {
    stft_data.s.map(|c| c.norm())
}

/// Convert Hz to mel (Slaney scale: linear below 1 kHz, logarithmic above)
pub fn hz_to_mel(hz: f32) -> f32 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = 6.4f32.ln() / 27.0;

    if hz >= min_log_hz {
        min_log_mel + (hz / min_log_hz).ln() / logstep
    } else {
        hz / f_sp
    }
}

/// Convert mel (Slaney scale) back to Hz
pub fn mel_to_hz(mel: f32) -> f32 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = 6.4f32.ln() / 27.0;

    if mel >= min_log_mel {
        min_log_hz * (logstep * (mel - min_log_mel)).exp()
    } else {
        mel * f_sp
    }
}

/// Area-normalized triangular mel filterbank, shape `(n_mels, n_fft / 2 + 1)`
pub fn mel_filterbank(sample_rate: u32, n_fft: usize, n_mels: usize, fmin: f32, fmax: f32) -> Array2<f32> {
    let fft_freqs = fft_frequencies(sample_rate, n_fft);
    let mel_min = hz_to_mel(fmin);
    let mel_max = hz_to_mel(fmax);

    let mel_f: Vec<f32> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f32 / (n_mels + 1) as f32))
        .collect();

    let mut weights = Array2::<f32>::zeros((n_mels, fft_freqs.len()));
    for m in 0..n_mels {
        let lower_width = mel_f[m + 1] - mel_f[m];
        let upper_width = mel_f[m + 2] - mel_f[m + 1];
        let enorm = 2.0 / (mel_f[m + 2] - mel_f[m]);

        for (k, &f) in fft_freqs.iter().enumerate() {
            let lower = (f - mel_f[m]) / lower_width;
            let upper = (mel_f[m + 2] - f) / upper_width;
            weights[[m, k]] = lower.min(upper).max(0.0) * enorm;
        }
    }

    weights
}

/// Convert a power spectrogram to decibels, clamped to `top_db` below the peak
pub fn power_to_db(power: &Array2<f32>, top_db: f32) -> Array2<f32> {
    let mut db = power.mapv(|p| 10.0 * p.max(AMIN).log10());
    let max_db = db.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if max_db.is_finite() {
        let floor = max_db - top_db;
        db.mapv_inplace(|x| x.max(floor));
    }
    db
}

/// Orthonormal DCT-II basis, shape `(n_out, n_in)`
pub fn dct_basis(n_out: usize, n_in: usize) -> Array2<f32> {
    let mut basis = Array2::<f32>::zeros((n_out, n_in));
    let scale_0 = (1.0 / n_in as f32).sqrt();
    let scale_k = (2.0 / n_in as f32).sqrt();

    for k in 0..n_out {
        let scale = if k == 0 { scale_0 } else { scale_k };
        for n in 0..n_in {
            basis[[k, n]] =
                scale * (PI * k as f32 * (2 * n + 1) as f32 / (2 * n_in) as f32).cos();
        }
    }

    basis
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stft_frame_count_centered() {
        let y = vec![0.0f32; 22050];
        let data = stft(&y, 2048, 512, true, 22050);
        assert_eq!(data.n_frames(), 1 + 22050 / 512);
        assert_eq!(data.n_bins(), 1025);
        assert_eq!(data.freqs.len(), 1025);
    }

    #[test]
    fn test_stft_peak_bin_for_sine() {
        let sr = 22050;
        let freq = 1000.0;
        let y: Vec<f32> = (0..8192)
            .map(|i| (2.0 * PI * freq * i as f32 / sr as f32).sin())
            .collect();
        let data = stft(&y, 2048, 512, false, sr);
        let mag = magnitude_spectrogram(&data);
        let column = mag.column(1);
        let (peak_bin, _) = column
            .iter()
            .enumerate()
            .fold((0, 0.0f32), |best, (i, &v)| if v > best.1 { (i, v) } else { best });
        assert!((data.freqs[peak_bin] - freq).abs() < sr as f32 / 2048.0);
    }

    #[test]
    fn test_inverse_stft_reconstructs_signal() {
        let sr = 22050;
        let y: Vec<f32> = (0..6000)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / sr as f32).sin() * 0.5)
            .collect();
        let data = stft(&y, 2048, 512, true, sr);
        let rebuilt = inverse_stft(&data.s, 2048, 512, y.len());
        assert_eq!(rebuilt.len(), y.len());
        for i in (100..5900).step_by(97) {
            assert!((rebuilt[i] - y[i]).abs() < 1e-3, "sample {} differs", i);
        }
    }

    #[test]
    fn test_mel_scale_roundtrip() {
        for &hz in &[0.0f32, 300.0, 1000.0, 4000.0, 11025.0] {
            assert!((mel_to_hz(hz_to_mel(hz)) - hz).abs() < 0.05 * hz.max(1.0));
        }
    }

    #[test]
    fn test_mel_filterbank_shape_and_sign() {
        let bank = mel_filterbank(22050, 2048, 128, 0.0, 11025.0);
        assert_eq!(bank.shape(), &[128, 1025]);
        assert!(bank.iter().all(|&w| w >= 0.0));
        for m in 0..128 {
            assert!(bank.row(m).iter().any(|&w| w > 0.0), "empty filter {}", m);
        }
    }

    #[test]
    fn test_dct_basis_is_orthonormal() {
        let basis = dct_basis(8, 8);
        let product = basis.dot(&basis.t());
        for i in 0..8 {
            for j in 0..8 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((product[[i, j]] - expected).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_power_to_db_clamps_dynamic_range() {
        let power = Array2::from_shape_vec((1, 3), vec![1.0, 1e-12, 0.0]).unwrap();
        let db = power_to_db(&power, 80.0);
        assert!((db[[0, 0]] - 0.0).abs() < 1e-6);
        assert!((db[[0, 1]] + 80.0).abs() < 1e-4);
        assert!((db[[0, 2]] + 80.0).abs() < 1e-4);
    }
}
