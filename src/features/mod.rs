//! Acoustic feature extraction
//!
//! Produces a fixed 39-element vector from a normalized mono waveform:
//!
//! | indices | family    | contents                                         |
//! |---------|-----------|--------------------------------------------------|
//! | 0..13   | cepstral  | MFCC means                                       |
//! | 13..18  | pitch     | F0 mean, std, min, max, range                    |
//! | 18..22  | energy    | RMS mean/std, ZCR mean/std                       |
//! | 22..32  | spectral  | centroid, rolloff, flatness, bandwidth, contrast |
//! | 32..39  | prosody   | onset mean/std, tempo, autocorr mean/std, HPSS   |

pub mod cepstral;
pub mod energy;
pub mod pitch;
pub mod prosody;
pub mod shape;

use crate::audio::Waveform;
use crate::error::{Result, VoiceError};
use crate::spectral::{magnitude_spectrogram, mel_filterbank, power_to_db, stft, StftData};
use ndarray::Array2;
use std::ops::Range;
use tracing::debug;

/// Analysis window size in samples
pub const N_FFT: usize = 2048;
/// Hop between analysis frames in samples
pub const HOP_LENGTH: usize = 512;
/// Mel bands used for cepstral and onset analysis
pub const N_MELS: usize = 128;
/// Dynamic range kept when converting power to dB
pub const TOP_DB: f32 = 80.0;

/// Total feature count
pub const N_FEATURES: usize = 39;

pub const CEPSTRAL: Range<usize> = 0..13;
pub const PITCH: Range<usize> = 13..18;
pub const ENERGY: Range<usize> = 18..22;
pub const SPECTRAL: Range<usize> = 22..32;
pub const PROSODY: Range<usize> = 32..39;

/// Indices of individual features referenced outside extraction
pub mod idx {
    pub const PITCH_MEAN: usize = 13;
    pub const PITCH_STD: usize = 14;
    pub const PITCH_RANGE: usize = 17;
    pub const RMS_MEAN: usize = 18;
    pub const RMS_STD: usize = 19;
    pub const ZCR_MEAN: usize = 20;
    pub const CENTROID_MEAN: usize = 22;
    pub const FLATNESS_MEAN: usize = 26;
    pub const CONTRAST_MEAN: usize = 30;
    pub const ONSET_STD: usize = 33;
    pub const TEMPO: usize = 34;
    pub const AUTOCORR_STD: usize = 36;
    pub const HARMONIC_RATIO: usize = 37;
}

/// Human-readable name of every feature, in vector order
pub const FEATURE_NAMES: [&str; N_FEATURES] = [
    "MFCC-1",
    "MFCC-2",
    "MFCC-3",
    "MFCC-4",
    "MFCC-5",
    "MFCC-6",
    "MFCC-7",
    "MFCC-8",
    "MFCC-9",
    "MFCC-10",
    "MFCC-11",
    "MFCC-12",
    "MFCC-13",
    "Pitch Mean",
    "Pitch Std",
    "Pitch Min",
    "Pitch Max",
    "Pitch Range",
    "RMS Mean",
    "RMS Std",
    "ZCR Mean",
    "ZCR Std",
    "Spectral Centroid Mean",
    "Spectral Centroid Std",
    "Spectral Rolloff Mean",
    "Spectral Rolloff Std",
    "Spectral Flatness Mean",
    "Spectral Flatness Std",
    "Spectral Bandwidth Mean",
    "Spectral Bandwidth Std",
    "Spectral Contrast Mean",
    "Spectral Contrast Std",
    "Onset Mean",
    "Onset Std",
    "Tempo",
    "Autocorr Mean",
    "Autocorr Std",
    "Harmonic Ratio",
    "Percussive Ratio",
];

/// Fixed-length acoustic feature vector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    values: [f64; N_FEATURES],
}

impl FeatureVector {
    /// Build a vector from exactly 39 values
    pub fn from_slice(values: &[f64]) -> Result<Self> {
        let values: [f64; N_FEATURES] = values.try_into().map_err(|_| {
            VoiceError::FeatureExtraction(format!(
                "expected {} features, got {}",
                N_FEATURES,
                values.len()
            ))
        })?;
        Ok(Self { values })
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied()
    }

    pub fn len(&self) -> usize {
        N_FEATURES
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Values of one feature family
    pub fn family(&self, range: Range<usize>) -> &[f64] {
        &self.values[range]
    }

    /// `(name, value)` pairs in vector order
    pub fn named(&self) -> Vec<(&'static str, f64)> {
        FEATURE_NAMES
            .iter()
            .copied()
            .zip(self.values.iter().copied())
            .collect()
    }

    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }
}

impl std::ops::Index<usize> for FeatureVector {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.values[index]
    }
}

/// Spectral representations shared by several feature families
pub struct SpectralContext {
    pub stft: StftData,
    pub magnitude: Array2<f32>,
    /// Power mel spectrogram in dB, shape `(N_MELS, n_frames)`
    pub mel_db: Array2<f32>,
    pub sample_rate: u32,
}

impl SpectralContext {
    pub fn new(samples: &[f32], sample_rate: u32) -> Self {
        let stft = stft(samples, N_FFT, HOP_LENGTH, true, sample_rate);
        let magnitude = magnitude_spectrogram(&stft);
        let power = magnitude.mapv(|m| m * m);
        let mel_basis = mel_filterbank(sample_rate, N_FFT, N_MELS, 0.0, sample_rate as f32 / 2.0);
        let mel_db = power_to_db(&mel_basis.dot(&power), TOP_DB);

        Self {
            stft,
            magnitude,
            mel_db,
            sample_rate,
        }
    }
}

/// Extract the 39-element feature vector from a normalized mono waveform
pub fn extract(waveform: &Waveform) -> Result<FeatureVector> {
    if !waveform.is_mono() {
        return Err(VoiceError::FeatureExtraction(format!(
            "expected mono waveform, got {} channels",
            waveform.channels
        )));
    }
    if waveform.sample_rate == 0 {
        return Err(VoiceError::FeatureExtraction(
            "waveform has a zero sample rate".to_string(),
        ));
    }
    if waveform.samples.len() < N_FFT {
        return Err(VoiceError::FeatureExtraction(format!(
            "waveform has {} samples, at least one {}-sample analysis window is required",
            waveform.samples.len(),
            N_FFT
        )));
    }

    let y = &waveform.samples;
    let sr = waveform.sample_rate;
    let ctx = SpectralContext::new(y, sr);
    debug!(
        "Spectral context: {} bins x {} frames",
        ctx.stft.n_bins(),
        ctx.stft.n_frames()
    );

    let mut values = Vec::with_capacity(N_FEATURES);
    values.extend(cepstral::extract(&ctx));
    values.extend(pitch::extract(y, sr));
    values.extend(energy::extract(y));
    values.extend(shape::extract(&ctx));
    values.extend(prosody::extract(y, &ctx));

    let vector = FeatureVector::from_slice(&values)?;

    if let Some((name, value)) = vector.named().into_iter().find(|(_, v)| !v.is_finite()) {
        return Err(VoiceError::FeatureExtraction(format!(
            "non-finite value {} for feature '{}'",
            value, name
        )));
    }

    debug!("Extracted {} features", vector.len());
    Ok(vector)
}
