//! Frame energy and zero-crossing statistics

use super::{HOP_LENGTH, N_FFT};
use crate::audio::{mean_std, zero_crossings};
use crate::spectral::pad_center;

/// Centered frames of `N_FFT` samples, one per `HOP_LENGTH`
fn centered_frames(y: &[f32]) -> impl Iterator<Item = Vec<f32>> + '_ {
    let padded = pad_center(y, N_FFT / 2);
    let n_frames = 1 + y.len() / HOP_LENGTH;
    (0..n_frames).map(move |i| {
        let start = i * HOP_LENGTH;
        padded[start..start + N_FFT].to_vec()
    })
}

/// Root-mean-square amplitude per frame
pub fn rms(y: &[f32]) -> Vec<f32> {
    centered_frames(y)
        .map(|frame| {
            let power = frame.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>() / N_FFT as f64;
            power.sqrt() as f32
        })
        .collect()
}

/// Fraction of adjacent sample pairs changing sign, per frame
pub fn zero_crossing_rate(y: &[f32]) -> Vec<f32> {
    centered_frames(y)
        .map(|frame| zero_crossings(&frame) as f32 / N_FFT as f32)
        .collect()
}

/// `[rms mean, rms std, zcr mean, zcr std]`
pub fn extract(y: &[f32]) -> Vec<f64> {
    let [rms_mean, rms_std] = mean_std(&rms(y));
    let [zcr_mean, zcr_std] = mean_std(&zero_crossing_rate(y));
    vec![rms_mean, rms_std, zcr_mean, zcr_std]
}
