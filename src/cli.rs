use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "asr-service",
    about = "ASR Service - HTTP speech-to-text backed by a local Whisper model",
    after_help = "EXAMPLES:\n    # Fetch a model and start the server\n    asr-service download-model base.en\n    WHISPER_MODEL_PATH=ggml-base.en.bin asr-service serve\n\n    # Transcribe an audio file against a running server\n    asr-service file my_audio.wav\n\n    # Ask for segment timings and a language hint\n    asr-service file my_audio.flac --language fr --response-format verbose_json"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP transcription server
    #[command(name = "serve")]
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(long, default_value = "8080")]
        port: u16,
    },

    /// Upload an audio file to a running server and print the transcript
    #[command(name = "file")]
    TranscribeFile {
        audio_file: String,

        #[arg(long, default_value = "http://localhost:8080")]
        server_url: String,

        /// Language hint, e.g. "en"; omit for auto-detection
        #[arg(long)]
        language: Option<String>,

        /// One of: json, verbose_json, text
        #[arg(long, default_value = "json")]
        response_format: String,
    },

    /// Download a ggml Whisper model from Hugging Face
    #[command(name = "download-model")]
    DownloadModel {
        model: String,

        #[arg(long)]
        models_path: Option<String>,
    },
}
