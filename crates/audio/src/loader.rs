//! WAV decoding.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use citrinet_core::{AsrError, AsrResult, AudioBuffer};
use hound::{SampleFormat, WavReader};

fn open(path: &Path) -> AsrResult<WavReader<BufReader<File>>> {
    WavReader::open(path)
        .map_err(|e| AsrError::Audio(format!("Failed to open {}: {e}", path.display())))
}

fn collect_samples<I>(samples: I) -> AsrResult<Vec<f32>>
where
    I: Iterator<Item = Result<f32, hound::Error>>,
{
    samples
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AsrError::Audio(format!("Failed to read samples: {e}")))
}

/// Decode a WAV file into an [`AudioBuffer`].
///
/// Integer samples are scaled by their bit depth into [-1.0, 1.0]; float
/// WAVs are passed through unchanged.
pub fn load_wav(path: impl AsRef<Path>) -> AsrResult<AudioBuffer> {
    let reader = open(path.as_ref())?;
    let spec = reader.spec();

    let samples = match spec.sample_format {
        SampleFormat::Float => collect_samples(reader.into_samples::<f32>())?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            collect_samples(
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale)),
            )?
        }
    };

    Ok(AudioBuffer::new(
        samples,
        spec.sample_rate as usize,
        spec.channels as usize,
    ))
}

/// Downmix interleaved multi-channel audio to mono by averaging each frame.
pub fn to_mono(buffer: &AudioBuffer) -> AudioBuffer {
    if buffer.channels == 1 {
        return buffer.clone();
    }

    let channels = buffer.channels as f32;
    let mut mono = Vec::with_capacity(buffer.num_samples());
    for frame in buffer.samples.chunks_exact(buffer.channels) {
        mono.push(frame.iter().sum::<f32>() / channels);
    }

    AudioBuffer::new(mono, buffer.sample_rate, 1)
}

/// Length of a WAV file in seconds, read from the header without decoding
/// the sample data.
pub fn audio_len(path: impl AsRef<Path>) -> AsrResult<f32> {
    let reader = open(path.as_ref())?;
    let sample_rate = reader.spec().sample_rate;
    Ok(reader.duration() as f32 / sample_rate as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_test_wav(path: &Path, num_samples: usize, sample_rate: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..num_samples {
            writer.write_sample((i % 128) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_to_mono_averages_frames() {
        let stereo = AudioBuffer::new(vec![0.8, 0.2, -0.5, 0.5, 1.0, 1.0], 16000, 2);
        let mono = to_mono(&stereo);

        assert_eq!(mono.channels, 1);
        assert_eq!(mono.samples.len(), 3);
        assert!((mono.samples[0] - 0.5).abs() < 1e-6);
        assert!(mono.samples[1].abs() < 1e-6);
        assert!((mono.samples[2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_to_mono_passthrough() {
        let mono = AudioBuffer::new(vec![0.1, 0.2, 0.3], 16000, 1);
        let out = to_mono(&mono);
        assert_eq!(out.samples, mono.samples);
    }

    #[test]
    fn test_load_and_len_roundtrip() {
        let path = std::env::temp_dir().join("citrinet-loader-test.wav");
        write_test_wav(&path, 16000, 16000);

        let buffer = load_wav(&path).unwrap();
        assert_eq!(buffer.sample_rate, 16000);
        assert_eq!(buffer.channels, 1);
        assert_eq!(buffer.samples.len(), 16000);
        // 16-bit samples land inside [-1, 1] after scaling.
        assert!(buffer.samples.iter().all(|s| s.abs() <= 1.0));

        let secs = audio_len(&path).unwrap();
        assert!((secs - 1.0).abs() < 1e-6);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_wav("/nonexistent/missing.wav").unwrap_err();
        assert!(matches!(err, AsrError::Audio(_)));
    }
}
