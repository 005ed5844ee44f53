//! Audio decoding, resampling and normalization

use crate::error::{Result, VoiceError};
use hound::WavReader;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::io::Cursor;
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::conv::IntoSample;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;
use tracing::debug;

/// PCM waveform with interleaved samples
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    /// Samples, interleaved when `channels > 1`
    pub samples: Vec<f32>,
    pub channels: u16,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl Waveform {
    /// Create a mono waveform
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            channels: 1,
            sample_rate,
        }
    }

    /// Interleave planar channel buffers into a waveform
    pub fn from_channels(planar: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        let channels = planar.len().max(1);
        let n_frames = planar.iter().map(Vec::len).min().unwrap_or(0);
        let mut samples = Vec::with_capacity(n_frames * channels);
        for i in 0..n_frames {
            for channel in &planar {
                samples.push(channel[i]);
            }
        }
        Self {
            samples,
            channels: channels as u16,
            sample_rate,
        }
    }

    /// Split interleaved samples back into one buffer per channel
    pub fn to_channels(&self) -> Vec<Vec<f32>> {
        let channels = self.channels.max(1) as usize;
        let mut planar = vec![Vec::with_capacity(self.n_frames()); channels];
        for frame in self.samples.chunks_exact(channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                planar[ch].push(sample);
            }
        }
        planar
    }

    pub fn is_mono(&self) -> bool {
        self.channels == 1
    }

    /// Number of sample frames (samples per channel)
    pub fn n_frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Get audio duration in seconds
    pub fn duration_sec(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.n_frames() as f32 / self.sample_rate as f32
    }

    /// Peak absolute amplitude
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |acc, &x| acc.max(x.abs()))
    }
}

/// Decode an audio byte buffer and resample it to `target_sample_rate`
///
/// WAV data is read directly; every other container goes through symphonia's
/// probe. The byte buffer is decoded from memory.
pub fn decode(bytes: &[u8], target_sample_rate: u32) -> Result<Waveform> {
    if bytes.is_empty() {
        return Err(VoiceError::Decode("Audio buffer is empty".to_string()));
    }

    let (planar, native_rate) = if is_riff_wave(bytes) {
        decode_wav(bytes)?
    } else {
        decode_compressed(bytes)?
    };

    if planar.iter().all(Vec::is_empty) {
        return Err(VoiceError::Decode(
            "Audio stream contains no samples".to_string(),
        ));
    }

    debug!(
        "Decoded {} channel(s), {} frames at {} Hz",
        planar.len(),
        planar[0].len(),
        native_rate
    );

    let planar = if native_rate != target_sample_rate {
        resample_channels(planar, native_rate, target_sample_rate)?
    } else {
        planar
    };

    Ok(Waveform::from_channels(planar, target_sample_rate))
}

fn is_riff_wave(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

/// Read WAV bytes into planar channels
fn decode_wav(bytes: &[u8]) -> Result<(Vec<Vec<f32>>, u32)> {
    let mut reader =
        WavReader::new(Cursor::new(bytes)).map_err(|e| VoiceError::Decode(e.to_string()))?;
    let spec = reader.spec();

    if spec.channels == 0 {
        return Err(VoiceError::Decode("WAV header declares zero channels".to_string()));
    }

    if spec.bits_per_sample > 32 {
        return Err(VoiceError::Decode(format!(
            "Unsupported bit depth: {}",
            spec.bits_per_sample
        )));
    }

    let mut interleaved: Vec<f32> = Vec::with_capacity(reader.len() as usize);
    match spec.sample_format {
        hound::SampleFormat::Int => {
            let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
            for sample in reader.samples::<i32>() {
                let sample = sample.map_err(|e| VoiceError::Decode(e.to_string()))?;
                interleaved.push(sample as f32 / max_value);
            }
        }
        hound::SampleFormat::Float => {
            for sample in reader.samples::<f32>() {
                interleaved.push(sample.map_err(|e| VoiceError::Decode(e.to_string()))?);
            }
        }
    }

    let waveform = Waveform {
        samples: interleaved,
        channels: spec.channels,
        sample_rate: spec.sample_rate,
    };
    Ok((waveform.to_channels(), spec.sample_rate))
}

/// Decode MP3 (and any other format symphonia can probe) into planar channels
fn decode_compressed(bytes: &[u8]) -> Result<(Vec<Vec<f32>>, u32)> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());

    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| VoiceError::Decode(format!("Failed to probe audio format: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| VoiceError::Decode("No audio tracks found".to_string()))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let native_rate = codec_params
        .sample_rate
        .ok_or_else(|| VoiceError::Decode("Sample rate not specified in stream".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| VoiceError::Decode(format!("Failed to create decoder: {}", e)))?;

    let mut planar: Vec<Vec<f32>> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(VoiceError::Decode(format!("Failed to read packet: {}", e)));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => append_decoded(decoded, &mut planar),
            // Corrupt frames are skipped, matching symphonia's recommended recovery
            Err(SymphoniaError::DecodeError(msg)) => {
                debug!("Skipping undecodable packet: {}", msg);
            }
            Err(e) => return Err(VoiceError::Decode(format!("Failed to decode packet: {}", e))),
        }
    }

    Ok((planar, native_rate))
}

fn append_decoded(decoded: AudioBufferRef<'_>, planar: &mut Vec<Vec<f32>>) {
    match decoded {
        AudioBufferRef::U8(buf) => append_planar(&buf, planar),
        AudioBufferRef::U16(buf) => append_planar(&buf, planar),
        AudioBufferRef::U24(buf) => append_planar(&buf, planar),
        AudioBufferRef::U32(buf) => append_planar(&buf, planar),
        AudioBufferRef::S8(buf) => append_planar(&buf, planar),
        AudioBufferRef::S16(buf) => append_planar(&buf, planar),
        AudioBufferRef::S24(buf) => append_planar(&buf, planar),
        AudioBufferRef::S32(buf) => append_planar(&buf, planar),
        AudioBufferRef::F32(buf) => append_planar(&buf, planar),
        AudioBufferRef::F64(buf) => append_planar(&buf, planar),
    }
}

fn append_planar<S>(buf: &AudioBuffer<S>, planar: &mut Vec<Vec<f32>>)
where
    S: Sample + IntoSample<f32>,
{
    let n_channels = buf.spec().channels.count();
    if planar.len() < n_channels {
        planar.resize_with(n_channels, Vec::new);
    }
    for (ch, out) in planar.iter_mut().enumerate().take(n_channels) {
        out.extend(buf.chan(ch).iter().map(|&s| s.into_sample()));
    }
}

/// Resample planar channels with rubato sinc interpolation
pub fn resample_channels(
    planar: Vec<Vec<f32>>,
    source_rate: u32,
    target_rate: u32,
) -> Result<Vec<Vec<f32>>> {
    let n_frames = planar.iter().map(Vec::len).min().unwrap_or(0);
    if n_frames == 0 || source_rate == target_rate {
        return Ok(planar);
    }
    if source_rate == 0 {
        return Err(VoiceError::Decode("Source sample rate is zero".to_string()));
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = target_rate as f64 / source_rate as f64;
    let n_channels = planar.len();

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, n_frames, n_channels)
        .map_err(|e| VoiceError::Decode(format!("Failed to create resampler: {}", e)))?;

    let input: Vec<Vec<f32>> = planar
        .into_iter()
        .map(|mut channel| {
            channel.truncate(n_frames);
            channel
        })
        .collect();

    let output = resampler
        .process(&input, None)
        .map_err(|e| VoiceError::Decode(format!("Resampling failed: {}", e)))?;

    debug!(
        "Resampled {} frames ({} Hz) -> {} frames ({} Hz)",
        n_frames,
        source_rate,
        output.first().map(Vec::len).unwrap_or(0),
        target_rate
    );

    Ok(output)
}

/// Bring a waveform of any rate to `target_rate`, keeping its channel layout
pub fn resample(waveform: Waveform, target_rate: u32) -> Result<Waveform> {
    if waveform.sample_rate == target_rate {
        return Ok(waveform);
    }
    if waveform.sample_rate == 0 {
        return Err(VoiceError::Validation(
            "Waveform has a zero sample rate".to_string(),
        ));
    }
    let planar = resample_channels(waveform.to_channels(), waveform.sample_rate, target_rate)?;
    Ok(Waveform::from_channels(planar, target_rate))
}

/// Downmix to mono and peak-normalize to [-1, 1]
///
/// An all-zero waveform is returned unchanged.
pub fn normalize(waveform: Waveform) -> Waveform {
    let mono = downmix(waveform);
    let peak = mono.peak();
    if peak > 0.0 {
        let samples = mono.samples.iter().map(|&x| x / peak).collect();
        Waveform::mono(samples, mono.sample_rate)
    } else {
        mono
    }
}

/// Average interleaved channels into a single channel
pub fn downmix(waveform: Waveform) -> Waveform {
    if waveform.channels <= 1 {
        return Waveform::mono(waveform.samples, waveform.sample_rate);
    }

    let channels = waveform.channels as usize;
    let samples = waveform
        .samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();
    debug!("Downmixed {} channels to mono", channels);
    Waveform::mono(samples, waveform.sample_rate)
}

/// Check that the waveform duration lies within `[min_sec, max_sec]`
pub fn validate_duration(waveform: &Waveform, min_sec: f32, max_sec: f32) -> Result<bool> {
    if waveform.sample_rate == 0 {
        return Err(VoiceError::Validation(
            "Waveform has a zero sample rate".to_string(),
        ));
    }

    let duration = waveform.duration_sec();
    if duration < min_sec {
        return Err(VoiceError::Validation(format!(
            "Audio too short: {:.2}s (minimum {}s)",
            duration, min_sec
        )));
    }
    if duration > max_sec {
        return Err(VoiceError::Validation(format!(
            "Audio too long: {:.2}s (maximum {}s)",
            duration, max_sec
        )));
    }

    debug!("Audio duration: {:.2}s", duration);
    Ok(true)
}

/// Arithmetic mean, accumulated in f64
pub fn mean(data: &[f32]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().map(|&x| x as f64).sum::<f64>() / data.len() as f64
}

/// Population standard deviation (divides by N)
pub fn std_dev(data: &[f32]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let m = mean(data);
    let sum_squared_diff = data.iter().map(|&x| (x as f64 - m).powi(2)).sum::<f64>();
    (sum_squared_diff / data.len() as f64).sqrt()
}

/// `[mean, std]` pair used by every frame-level feature
pub fn mean_std(data: &[f32]) -> [f64; 2] {
    [mean(data), std_dev(data)]
}

/// `[mean, std]` of an f64 series, population std
pub fn mean_std_f64(data: &[f64]) -> [f64; 2] {
    if data.is_empty() {
        return [0.0, 0.0];
    }
    let n = data.len() as f64;
    let m = data.iter().sum::<f64>() / n;
    let std = if data.len() < 2 {
        0.0
    } else {
        (data.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n).sqrt()
    };
    [m, std]
}

/// Count sign changes between adjacent samples
pub fn zero_crossings(samples: &[f32]) -> usize {
    if samples.len() < 2 {
        return 0;
    }

    samples
        .windows(2)
        .filter(|w| w[0].is_sign_negative() != w[1].is_sign_negative())
        .count()
}
