pub mod decode;
pub mod format;
pub mod wav;

pub use decode::{decode, downmix_to_mono};

use thiserror::Error;

/// Decoded audio as interleaved f32 samples in [-1.0, 1.0].
#[derive(Debug)]
pub struct PcmAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: usize,
}

impl PcmAudio {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1)
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unsupported audio encoding")]
    UnsupportedFormat,

    #[error("malformed {0} payload: {1}")]
    Malformed(&'static str, String),

    #[error("audio payload contains no samples")]
    Empty,
}
