//! Mel-frequency cepstral coefficients

use super::{SpectralContext, CEPSTRAL, N_MELS};
use crate::audio::mean;
use crate::spectral::dct_basis;

/// Number of cepstral coefficients kept
pub const N_MFCC: usize = CEPSTRAL.end - CEPSTRAL.start;

/// Per-frame MFCC matrix, shape `(N_MFCC, n_frames)`
pub fn mfcc(ctx: &SpectralContext) -> ndarray::Array2<f32> {
    dct_basis(N_MFCC, N_MELS).dot(&ctx.mel_db)
}

/// Across-time mean of each coefficient
pub fn extract(ctx: &SpectralContext) -> Vec<f64> {
    let coefficients = mfcc(ctx);
    coefficients
        .outer_iter()
        .map(|row| mean(&row.to_vec()))
        .collect()
}
