pub mod resampler;
pub mod whisper;

use thiserror::Error;

use crate::audio::PcmAudio;

/// Per-request knobs forwarded to the model.
#[derive(Debug, Clone, Default)]
pub struct TranscribeOptions {
    /// Language hint; `None` lets the model auto-detect.
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptSegment {
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
    pub confidence: f32,
}

#[derive(Debug, Clone)]
pub struct Transcript {
    pub text: String,
    pub language: String,
    pub segments: Vec<TranscriptSegment>,
}

#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error("audio is too short (less than one second)")]
    AudioTooShort,

    #[error("{0}")]
    Model(String),
}

/// The speech-recognition capability the service delegates to. The HTTP
/// layer treats it as a black box: audio in, transcript or error out.
pub trait SpeechToText: Send + Sync {
    fn transcribe(
        &self,
        audio: &PcmAudio,
        opts: &TranscribeOptions,
    ) -> Result<Transcript, TranscribeError>;
}
