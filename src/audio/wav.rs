use log::{debug, error};

use super::{DecodeError, PcmAudio};

const FORMAT_PCM: u16 = 1;
const FORMAT_IEEE_FLOAT: u16 = 3;

struct FmtChunk {
    audio_format: u16,
    channels: usize,
    sample_rate: u32,
    bits_per_sample: u16,
}

fn malformed(detail: impl Into<String>) -> DecodeError {
    DecodeError::Malformed("WAV", detail.into())
}

/// Parse a RIFF/WAVE payload and convert its PCM data to f32 samples.
///
/// The header is validated strictly: a `.wav`-looking upload with corrupt
/// chunk structure is rejected here, before any model work happens.
pub fn decode_wav(bytes: &[u8]) -> Result<PcmAudio, DecodeError> {
    if bytes.len() < 12 || !bytes.starts_with(b"RIFF") || &bytes[8..12] != b"WAVE" {
        return Err(malformed("missing RIFF/WAVE header"));
    }

    let mut fmt: Option<FmtChunk> = None;
    let mut data: Option<&[u8]> = None;

    // Walk the chunk list: [id:4][size:4 LE][payload], padded to even length.
    let mut offset = 12usize;
    while offset + 8 <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let size = u32::from_le_bytes([
            bytes[offset + 4],
            bytes[offset + 5],
            bytes[offset + 6],
            bytes[offset + 7],
        ]) as usize;
        let body_start = offset + 8;
        let body_end = body_start
            .checked_add(size)
            .ok_or_else(|| malformed("chunk size overflow"))?;
        if body_end > bytes.len() {
            return Err(malformed(format!(
                "chunk '{}' claims {} bytes but only {} remain",
                String::from_utf8_lossy(id),
                size,
                bytes.len() - body_start
            )));
        }
        let body = &bytes[body_start..body_end];

        match id {
            b"fmt " => fmt = Some(parse_fmt_chunk(body)?),
            b"data" => data = Some(body),
            _ => debug!("skipping chunk '{}'", String::from_utf8_lossy(id)),
        }

        offset = body_end + (size & 1);
    }

    let fmt = fmt.ok_or_else(|| malformed("no fmt chunk"))?;
    let data = data.ok_or_else(|| malformed("no data chunk"))?;
    if data.is_empty() {
        return Err(DecodeError::Empty);
    }

    debug!(
        "WAV payload: format={}, {} channel(s), {}Hz, {} bits",
        fmt.audio_format, fmt.channels, fmt.sample_rate, fmt.bits_per_sample
    );

    let samples = convert_samples(data, fmt.audio_format, fmt.bits_per_sample)?;
    Ok(PcmAudio {
        samples,
        sample_rate: fmt.sample_rate,
        channels: fmt.channels,
    })
}

fn parse_fmt_chunk(body: &[u8]) -> Result<FmtChunk, DecodeError> {
    if body.len() < 16 {
        return Err(malformed("fmt chunk too short"));
    }
    let audio_format = u16::from_le_bytes([body[0], body[1]]);
    let channels = u16::from_le_bytes([body[2], body[3]]);
    let sample_rate = u32::from_le_bytes([body[4], body[5], body[6], body[7]]);
    let bits_per_sample = u16::from_le_bytes([body[14], body[15]]);

    if channels == 0 {
        return Err(malformed("zero channels"));
    }
    if sample_rate == 0 {
        return Err(malformed("zero sample rate"));
    }

    Ok(FmtChunk {
        audio_format,
        channels: channels as usize,
        sample_rate,
        bits_per_sample,
    })
}

fn convert_samples(
    data: &[u8],
    audio_format: u16,
    bits_per_sample: u16,
) -> Result<Vec<f32>, DecodeError> {
    match (audio_format, bits_per_sample) {
        (FORMAT_PCM, 16) => {
            if data.len() % 2 != 0 {
                error!("invalid 16-bit audio data: odd number of bytes ({})", data.len());
                return Err(malformed("16-bit data chunk has odd byte count"));
            }
            Ok(data
                .chunks_exact(2)
                .map(|chunk| {
                    let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
                    sample as f32 / i16::MAX as f32
                })
                .collect())
        }
        (FORMAT_PCM, 24) => {
            if data.len() % 3 != 0 {
                error!(
                    "invalid 24-bit audio data: byte count ({}) not divisible by 3",
                    data.len()
                );
                return Err(malformed("24-bit data chunk not divisible by 3"));
            }
            Ok(data
                .chunks_exact(3)
                .map(|chunk| {
                    // place the 24 bits in the high end so the arithmetic
                    // shift sign-extends
                    let sample = i32::from_le_bytes([0, chunk[0], chunk[1], chunk[2]]) >> 8;
                    sample as f32 / 8388607.0
                })
                .collect())
        }
        (FORMAT_PCM, 32) => {
            if data.len() % 4 != 0 {
                error!(
                    "invalid 32-bit audio data: byte count ({}) not divisible by 4",
                    data.len()
                );
                return Err(malformed("32-bit data chunk not divisible by 4"));
            }
            Ok(data
                .chunks_exact(4)
                .map(|chunk| {
                    let sample = i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                    sample as f32 / i32::MAX as f32
                })
                .collect())
        }
        (FORMAT_IEEE_FLOAT, 32) => {
            if data.len() % 4 != 0 {
                return Err(malformed("float data chunk not divisible by 4"));
            }
            Ok(data
                .chunks_exact(4)
                .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect())
        }
        (FORMAT_PCM, bits) => Err(malformed(format!("unsupported bit depth: {bits}"))),
        (other, _) => Err(malformed(format!("unsupported WAV codec: {other}"))),
    }
}

#[cfg(test)]
pub(crate) fn build_wav(sample_rate: u32, channels: u16, bits: u16, data: &[u8]) -> Vec<u8> {
    let block_align = channels * bits / 8;
    let byte_rate = sample_rate * block_align as u32;

    let mut out = Vec::new();
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data.len() as u32).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&bits.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
    out
}
