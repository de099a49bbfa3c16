//! Integration tests: WAV file through the full audio front door.

use std::path::Path;

use audio::{audio_len, load_wav, to_mono, Resampler};

/// Write a stereo 16-bit WAV with a 440 Hz tone on both channels.
fn write_tone_wav(path: &Path, sample_rate: u32, seconds: f32) {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let num_frames = (sample_rate as f32 * seconds) as usize;
    for i in 0..num_frames {
        let t = i as f32 / sample_rate as f32;
        let value = ((2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5 * 32767.0) as i16;
        writer.write_sample(value).unwrap();
        writer.write_sample(value).unwrap();
    }
    writer.finalize().unwrap();
}

#[test]
fn test_wav_to_model_rate() {
    let path = std::env::temp_dir().join("citrinet-wav-pipeline-test.wav");
    write_tone_wav(&path, 32000, 0.5);

    let secs = audio_len(&path).unwrap();
    assert!((secs - 0.5).abs() < 1e-3);

    let buffer = load_wav(&path).unwrap();
    assert_eq!(buffer.sample_rate, 32000);
    assert_eq!(buffer.channels, 2);

    let mono = to_mono(&buffer);
    assert_eq!(mono.channels, 1);
    assert_eq!(mono.num_samples(), buffer.num_samples());

    let resampled = Resampler::default().resample(&mono).unwrap();
    assert_eq!(resampled.sample_rate, 16000);
    // 0.5 s of audio stays 0.5 s after resampling, within one chunk.
    let expected = mono.samples.len() / 2;
    assert!(resampled.samples.len().abs_diff(expected) <= 1024);
    assert!(resampled.samples.iter().all(|s| s.is_finite()));

    std::fs::remove_file(&path).ok();
}
