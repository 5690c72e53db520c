use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use dotenv::dotenv;

/// Runtime configuration for the `serve` subcommand. Host and port come from
/// the CLI, everything else from the environment (a `.env` file is honored).
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
    pub model_timeout_secs: u64,
    pub model_retries: u32,
    pub whisper: WhisperSettings,
}

#[derive(Clone, Debug)]
pub struct WhisperSettings {
    pub model_path: PathBuf,
    pub use_gpu: bool,
    /// Default language, `"auto"` for per-request detection.
    pub language: String,
    pub audio_context: i32,
    pub no_speech_threshold: f32,
    pub num_threads: i32,
}

impl ServiceConfig {
    pub fn from_env(host: String, port: u16) -> Result<Self> {
        dotenv().ok();
        Ok(Self {
            host,
            port,
            max_upload_bytes: env_parse("ASR_MAX_UPLOAD_BYTES", 25 * 1024 * 1024)?,
            model_timeout_secs: env_parse("ASR_MODEL_TIMEOUT_SECS", 120)?,
            model_retries: env_parse("ASR_MODEL_RETRIES", 0)?,
            whisper: WhisperSettings::from_env()?,
        })
    }
}

impl WhisperSettings {
    pub fn from_env() -> Result<Self> {
        let model_path =
            std::env::var("WHISPER_MODEL_PATH").context("WHISPER_MODEL_PATH is not set")?;
        Ok(Self {
            model_path: PathBuf::from(model_path),
            use_gpu: env_parse("WHISPER_USE_GPU", true)?,
            language: std::env::var("WHISPER_LANGUAGE").unwrap_or_else(|_| "auto".to_string()),
            audio_context: env_parse("WHISPER_AUDIO_CONTEXT", 768)?,
            no_speech_threshold: env_parse("WHISPER_NO_SPEECH_THRESHOLD", 0.5)?,
            num_threads: env_parse("WHISPER_NUM_THREADS", 2)?,
        })
    }
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|e| anyhow!("invalid value for {key}: {e}")),
        Err(_) => Ok(default),
    }
}
