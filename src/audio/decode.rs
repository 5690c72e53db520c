use std::io::Cursor;

use log::debug;
use rodio::Source;

use super::format::{self, AudioFormat};
use super::{DecodeError, PcmAudio, wav};

/// Decode an uploaded audio payload into f32 PCM.
///
/// The container is sniffed from magic bytes and each format is handled by
/// its own decoder: WAV natively, compressed formats through rodio.
pub fn decode(bytes: &[u8]) -> Result<PcmAudio, DecodeError> {
    let format = format::sniff(bytes).ok_or(DecodeError::UnsupportedFormat)?;
    debug!("sniffed {} payload, {} bytes", format.name(), bytes.len());

    let audio = match format {
        AudioFormat::Wav => wav::decode_wav(bytes)?,
        AudioFormat::Flac | AudioFormat::Mp3 | AudioFormat::Ogg => {
            decode_compressed(format, bytes)?
        }
    };

    if audio.samples.is_empty() {
        return Err(DecodeError::Empty);
    }
    debug!(
        "decoded {} samples at {}Hz, {} channel(s)",
        audio.samples.len(),
        audio.sample_rate,
        audio.channels
    );
    Ok(audio)
}

fn decode_compressed(format: AudioFormat, bytes: &[u8]) -> Result<PcmAudio, DecodeError> {
    let decoder = rodio::Decoder::new(Cursor::new(bytes.to_vec()))
        .map_err(|e| DecodeError::Malformed(format.name(), e.to_string()))?;

    let sample_rate = decoder.sample_rate();
    let channels = decoder.channels() as usize;
    let samples: Vec<f32> = decoder.convert_samples::<f32>().collect();

    Ok(PcmAudio {
        samples,
        sample_rate,
        channels,
    })
}

/// Average interleaved channels into a single mono track.
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    let frames = samples.len() / channels;
    let mut mono = Vec::with_capacity(frames);
    for frame_idx in 0..frames {
        let mut sum = 0.0f32;
        for ch in 0..channels {
            sum += samples[frame_idx * channels + ch];
        }
        mono.push(sum / channels as f32);
    }
    mono
}
