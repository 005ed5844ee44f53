//! Decoding, normalization and duration validation

use std::f32::consts::PI;
use std::io::Cursor;
use voicedetect::audio::{decode, normalize, validate_duration, Waveform};
use voicedetect::config::AudioConfig;
use voicedetect::features::PITCH;
use voicedetect::{extract_features, VoiceError};

/// 50 silent MPEG-1 Layer III frames, mono, 48 kHz, 128 kbps
const SILENT_MP3: &[u8] = include_bytes!("data/silence_48k_mono.mp3");

/// Generate a sine tone
fn generate_tone(freq: f32, amplitude: f32, sr: u32, seconds: f32) -> Vec<f32> {
    let n = (sr as f32 * seconds) as usize;
    (0..n)
        .map(|i| (2.0 * PI * freq * i as f32 / sr as f32).sin() * amplitude)
        .collect()
}

/// Encode interleaved samples as 16-bit PCM WAV bytes
fn wav_bytes(samples: &[f32], channels: u16, sr: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate: sr,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_wav_at_target_rate() {
        let tone = generate_tone(440.0, 0.5, 22050, 1.0);
        let waveform = decode(&wav_bytes(&tone, 1, 22050), 22050).unwrap();
        assert_eq!(waveform.sample_rate, 22050);
        assert_eq!(waveform.channels, 1);
        assert_eq!(waveform.samples.len(), tone.len());
        assert!((waveform.peak() - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_decode_resamples_to_target() {
        let tone = generate_tone(440.0, 0.5, 44100, 1.0);
        let waveform = decode(&wav_bytes(&tone, 1, 44100), 22050).unwrap();
        assert_eq!(waveform.sample_rate, 22050);
        let expected = 22050.0;
        assert!(
            (waveform.n_frames() as f32 - expected).abs() / expected < 0.02,
            "got {} frames",
            waveform.n_frames()
        );
    }

    #[test]
    fn test_decode_stereo_keeps_channels() {
        let left = generate_tone(300.0, 0.4, 22050, 0.5);
        let interleaved: Vec<f32> = left.iter().flat_map(|&s| [s, -s]).collect();
        let waveform = decode(&wav_bytes(&interleaved, 2, 22050), 22050).unwrap();
        assert_eq!(waveform.channels, 2);
        assert_eq!(waveform.n_frames(), left.len());
    }

    #[test]
    fn test_decode_mp3_resamples_to_target() {
        let waveform = decode(SILENT_MP3, 22050).unwrap();
        assert_eq!(waveform.sample_rate, 22050);
        assert_eq!(waveform.channels, 1);
        // 50 frames of 1152 samples at 48 kHz
        let duration = waveform.duration_sec();
        assert!((duration - 1.2).abs() < 0.05, "duration {}", duration);

        let normalized = normalize(waveform);
        assert!(normalized.is_mono());
        assert_eq!(normalized.peak(), 0.0);
        assert!(validate_duration(&normalized, 0.5, 30.0).unwrap());
    }

    #[test]
    fn test_mp3_features_extract() {
        let features = extract_features(SILENT_MP3, &AudioConfig::default()).unwrap();
        assert!(features.is_finite());
        assert!(features.family(PITCH).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_decode_rejects_empty_and_garbage() {
        assert!(matches!(decode(&[], 22050), Err(VoiceError::Decode(_))));
        let garbage: Vec<u8> = (0..4096).map(|i| (i * 37 % 251) as u8).collect();
        let err = decode(&garbage, 22050).unwrap_err();
        assert!(matches!(err, VoiceError::Decode(_)));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_decode_rejects_wav_without_samples() {
        let bytes = wav_bytes(&[], 1, 22050);
        assert!(matches!(decode(&bytes, 22050), Err(VoiceError::Decode(_))));
    }

    #[test]
    fn test_normalize_sets_unit_peak() {
        let waveform = Waveform::mono(generate_tone(200.0, 0.25, 22050, 0.5), 22050);
        let normalized = normalize(waveform);
        assert!((normalized.peak() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_downmixes_stereo() {
        let left = generate_tone(200.0, 0.2, 22050, 0.5);
        let interleaved: Vec<f32> = left.iter().flat_map(|&s| [s, s * 0.5]).collect();
        let waveform = Waveform {
            samples: interleaved,
            channels: 2,
            sample_rate: 22050,
        };
        let normalized = normalize(waveform);
        assert!(normalized.is_mono());
        assert_eq!(normalized.samples.len(), left.len());
        assert!((normalized.peak() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_leaves_silence_unchanged() {
        let waveform = Waveform::mono(vec![0.0; 1000], 22050);
        let normalized = normalize(waveform.clone());
        assert_eq!(normalized, waveform);
    }

    #[test]
    fn test_duration_bounds() {
        let short = Waveform::mono(vec![0.1; (22050.0 * 0.3) as usize], 22050);
        let long = Waveform::mono(vec![0.1; 22050 * 45], 22050);
        let ok = Waveform::mono(vec![0.1; 22050 * 2], 22050);

        let err = validate_duration(&short, 0.5, 30.0).unwrap_err();
        assert!(matches!(err, VoiceError::Validation(_)));
        assert!(err.to_string().contains("0.30s"));
        assert!(err.to_string().contains("0.5"));

        let err = validate_duration(&long, 0.5, 30.0).unwrap_err();
        assert!(err.to_string().contains("45.00s"));

        assert!(validate_duration(&ok, 0.5, 30.0).unwrap());
    }
}
