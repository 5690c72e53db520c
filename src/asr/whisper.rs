use std::sync::{Arc, Mutex};

use anyhow::Result;
use log::{debug, info};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::audio::{PcmAudio, downmix_to_mono};
use crate::config::WhisperSettings;

use super::resampler::{WHISPER_SAMPLE_RATE, resample_to_16khz};
use super::{SpeechToText, TranscribeError, TranscribeOptions, Transcript, TranscriptSegment};

/// Whisper-backed implementation of [`SpeechToText`].
///
/// The model context is loaded once at startup and shared read-only across
/// requests; a per-call whisper state carries all mutable decoding state.
/// The mutex serializes access to the context, so one transcription runs at
/// a time on the blocking pool.
#[derive(Clone)]
pub struct WhisperEngine {
    inner: Arc<Mutex<WhisperContext>>,
    settings: WhisperSettings,
}

impl WhisperEngine {
    pub fn new(settings: WhisperSettings) -> Result<Self> {
        let mut ctx_params = WhisperContextParameters::default();
        ctx_params.use_gpu(settings.use_gpu);

        let model_path = settings
            .model_path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("model path is not valid UTF-8"))?;

        info!("loading whisper model from {model_path}");
        let ctx = WhisperContext::new_with_params(model_path, ctx_params)
            .map_err(|e| anyhow::anyhow!("failed to load model: {}", e))?;

        Ok(Self {
            inner: Arc::new(Mutex::new(ctx)),
            settings,
        })
    }

    fn calculate_segment_confidence(
        state: &whisper_rs::WhisperState,
        segment_idx: i32,
    ) -> Result<f32, TranscribeError> {
        let n_tokens = state
            .full_n_tokens(segment_idx)
            .map_err(|e| TranscribeError::Model(format!("failed to get token count: {e}")))?;
        if n_tokens == 0 {
            return Ok(0.0);
        }

        let mut sum_logprob = 0.0_f32;
        for token_idx in 0..n_tokens {
            let token_data = state
                .full_get_token_data(segment_idx, token_idx)
                .map_err(|e| TranscribeError::Model(format!("failed to get token data: {e}")))?;
            sum_logprob += token_data.plog;
        }

        let avg_logprob = sum_logprob / n_tokens as f32;
        Ok(avg_logprob.exp())
    }
}

impl SpeechToText for WhisperEngine {
    fn transcribe(
        &self,
        audio: &PcmAudio,
        opts: &TranscribeOptions,
    ) -> Result<Transcript, TranscribeError> {
        let mono = downmix_to_mono(&audio.samples, audio.channels);
        let mono = resample_to_16khz(&mono, audio.sample_rate)
            .map_err(|e| TranscribeError::Model(format!("resampling failed: {e}")))?;

        if mono.len() < WHISPER_SAMPLE_RATE as usize {
            return Err(TranscribeError::AudioTooShort);
        }

        let requested = opts
            .language
            .as_deref()
            .unwrap_or(&self.settings.language);

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        // whisper.cpp treats "auto" as a request for language detection
        params.set_language(Some(requested));
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_audio_ctx(self.settings.audio_context);
        params.set_no_speech_thold(self.settings.no_speech_threshold);
        params.set_n_threads(self.settings.num_threads);

        let inner = self
            .inner
            .lock()
            .map_err(|_| TranscribeError::Model("failed to acquire model lock".to_string()))?;

        let mut state = inner
            .create_state()
            .map_err(|e| TranscribeError::Model(format!("failed to create whisper state: {e}")))?;

        debug!("running whisper over {} samples", mono.len());
        state
            .full(params, &mono)
            .map_err(|e| TranscribeError::Model(format!("failed to run transcription: {e}")))?;

        let num_segments = state
            .full_n_segments()
            .map_err(|e| TranscribeError::Model(format!("failed to get segment count: {e}")))?;

        let mut combined = String::new();
        let mut segments = Vec::with_capacity(num_segments as usize);

        for i in 0..num_segments {
            let text = state
                .full_get_segment_text(i)
                .map_err(|e| TranscribeError::Model(format!("failed to get segment text: {e}")))?;
            let start = state
                .full_get_segment_t0(i)
                .map_err(|e| TranscribeError::Model(format!("failed to get segment start: {e}")))?;
            let end = state
                .full_get_segment_t1(i)
                .map_err(|e| TranscribeError::Model(format!("failed to get segment end: {e}")))?;

            let confidence = Self::calculate_segment_confidence(&state, i)?;

            combined.push_str(&text);
            // whisper timestamps are in 10ms ticks
            segments.push(TranscriptSegment {
                start_ms: (start.max(0) as u64) * 10,
                end_ms: (end.max(0) as u64) * 10,
                text,
                confidence,
            });
        }

        let language = if requested == "auto" {
            state
                .full_lang_id_from_state()
                .ok()
                .and_then(whisper_rs::get_lang_str)
                .unwrap_or(requested)
                .to_string()
        } else {
            requested.to_string()
        };

        Ok(Transcript {
            text: combined.trim().to_string(),
            language,
            segments,
        })
    }
}
