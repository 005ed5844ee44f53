//! Spectral shape descriptors
//!
//! All descriptors are computed per STFT frame on the magnitude spectrum
//! and summarized as `[mean, std]` pairs, in the order centroid, rolloff,
//! flatness, bandwidth, contrast. Contrast is computed for every octave band
//! but only the lowest band (below `CONTRAST_FMIN`) enters the summary.

use super::SpectralContext;
use crate::audio::mean_std;
use crate::spectral::AMIN;
use ndarray::{Array2, ArrayView1};

/// Fraction of total magnitude below the rolloff frequency
pub const ROLL_PERCENT: f32 = 0.85;
/// Lower edge of the first contrast octave band
pub const CONTRAST_FMIN: f32 = 200.0;
/// Number of octave bands above `CONTRAST_FMIN`
pub const CONTRAST_BANDS: usize = 6;
/// Fraction of a band's bins averaged into its peak and valley
pub const CONTRAST_QUANTILE: f32 = 0.02;

/// Magnitude-weighted mean frequency per frame
pub fn centroid(ctx: &SpectralContext) -> Vec<f32> {
    let freqs = &ctx.stft.freqs;
    ctx.magnitude
        .columns()
        .into_iter()
        .map(|col| frame_centroid(col, freqs))
        .collect()
}

fn frame_centroid(col: ArrayView1<f32>, freqs: &[f32]) -> f32 {
    let total: f32 = col.sum();
    if total <= 0.0 {
        return 0.0;
    }
    col.iter().zip(freqs).map(|(&m, &f)| m * f).sum::<f32>() / total
}

/// Frequency below which `ROLL_PERCENT` of the magnitude lies, per frame
pub fn rolloff(ctx: &SpectralContext) -> Vec<f32> {
    let freqs = &ctx.stft.freqs;
    ctx.magnitude
        .columns()
        .into_iter()
        .map(|col| {
            let threshold = ROLL_PERCENT * col.sum();
            let mut cumulative = 0.0f32;
            for (&m, &f) in col.iter().zip(freqs) {
                cumulative += m;
                if cumulative >= threshold {
                    return f;
                }
            }
            freqs.last().copied().unwrap_or(0.0)
        })
        .collect()
}

/// Ratio of geometric to arithmetic mean of the power spectrum, per frame
pub fn flatness(ctx: &SpectralContext) -> Vec<f32> {
    ctx.magnitude
        .columns()
        .into_iter()
        .map(|col| {
            let n = col.len() as f64;
            let (log_sum, sum) = col.iter().fold((0.0f64, 0.0f64), |(ls, s), &m| {
                let p = ((m * m).max(AMIN)) as f64;
                (ls + p.ln(), s + p)
            });
            ((log_sum / n).exp() / (sum / n)) as f32
        })
        .collect()
}

/// Second-order spectral spread around the centroid, per frame
pub fn bandwidth(ctx: &SpectralContext) -> Vec<f32> {
    let freqs = &ctx.stft.freqs;
    ctx.magnitude
        .columns()
        .into_iter()
        .map(|col| {
            let total: f32 = col.sum();
            if total <= 0.0 {
                return 0.0;
            }
            let c = frame_centroid(col, freqs);
            let spread: f32 = col
                .iter()
                .zip(freqs)
                .map(|(&m, &f)| (m / total) * (f - c).powi(2))
                .sum();
            spread.sqrt()
        })
        .collect()
}

/// Inclusive bin range of each contrast band
fn contrast_bands(freqs: &[f32]) -> Vec<Option<(usize, usize)>> {
    let mut edges = vec![0.0f32];
    edges.extend((0..=CONTRAST_BANDS).map(|k| CONTRAST_FMIN * 2f32.powi(k as i32)));

    (0..=CONTRAST_BANDS)
        .map(|k| {
            let (low, high) = (edges[k], edges[k + 1]);
            let first = freqs.iter().position(|&f| f >= low)?;
            let last = freqs.iter().rposition(|&f| f <= high)?;
            if last < first {
                return None;
            }
            // Bands overlap their lower neighbour by one bin
            let start = if k > 0 { first.saturating_sub(1) } else { first };
            // The top band extends to Nyquist
            let end = if k == CONTRAST_BANDS { freqs.len() - 1 } else { last };
            Some((start, end))
        })
        .collect()
}

/// Peak-to-valley ratio in dB per octave band, shape `(CONTRAST_BANDS + 1, n_frames)`
pub fn contrast(ctx: &SpectralContext) -> Array2<f32> {
    let bands = contrast_bands(&ctx.stft.freqs);
    let n_frames = ctx.stft.n_frames();
    let mut peaks = Array2::<f32>::zeros((bands.len(), n_frames));
    let mut valleys = Array2::<f32>::zeros((bands.len(), n_frames));

    for (k, band) in bands.iter().enumerate() {
        let Some((start, end)) = *band else {
            continue;
        };
        let band_size = end - start + 1;
        let quantile_count = ((CONTRAST_QUANTILE * band_size as f32).round() as usize).max(1);
        // Every band but the last drops its top bin from the statistics
        let stop = if k < CONTRAST_BANDS { end } else { end + 1 };
        if stop <= start {
            continue;
        }

        for (t, col) in ctx.magnitude.columns().into_iter().enumerate() {
            let mut sub_band: Vec<f32> = col.iter().skip(start).take(stop - start).copied().collect();
            sub_band.sort_by(|a, b| a.total_cmp(b));
            let take = quantile_count.min(sub_band.len());
            valleys[[k, t]] = sub_band[..take].iter().sum::<f32>() / take as f32;
            peaks[[k, t]] = sub_band[sub_band.len() - take..].iter().sum::<f32>() / take as f32;
        }
    }

    let peak_db = rows_to_db(&peaks);
    let valley_db = rows_to_db(&valleys);
    peak_db - valley_db
}

/// Per-band dB conversion with an 80 dB range clamp
fn rows_to_db(values: &Array2<f32>) -> Array2<f32> {
    let mut db = values.mapv(|v| 10.0 * v.max(AMIN).log10());
    for mut row in db.rows_mut() {
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        if max.is_finite() {
            row.mapv_inplace(|x| x.max(max - super::TOP_DB));
        }
    }
    db
}

/// `[mean, std]` of centroid, rolloff, flatness, bandwidth and low-band contrast
pub fn extract(ctx: &SpectralContext) -> Vec<f64> {
    let contrast_values: Vec<f32> = contrast(ctx).row(0).to_vec();

    [
        centroid(ctx),
        rolloff(ctx),
        flatness(ctx),
        bandwidth(ctx),
        contrast_values,
    ]
    .iter()
    .flat_map(|series| mean_std(series))
    .collect()
}
