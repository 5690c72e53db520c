use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_multipart::{Field, Multipart};
use actix_web::{App, HttpResponse, HttpServer, get, middleware::Logger, post, web};
use futures_util::TryStreamExt;
use log::{debug, error, info, warn};

use crate::asr::whisper::WhisperEngine;
use crate::asr::{SpeechToText, TranscribeOptions, Transcript};
use crate::audio::{self, PcmAudio};
use crate::config::ServiceConfig;
use crate::dto::{HealthDto, SegmentDto, TranscriptionDto};
use crate::error::ApiError;

// Text fields on the multipart form stay well under this.
const TEXT_FIELD_LIMIT: usize = 1024;

pub struct AppState {
    pub model: Arc<dyn SpeechToText>,
    pub config: ServiceConfig,
    pub model_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseFormat {
    Json,
    VerboseJson,
    Text,
}

impl ResponseFormat {
    fn parse(value: &str) -> Result<Self, ApiError> {
        match value {
            "" | "json" => Ok(ResponseFormat::Json),
            "verbose_json" => Ok(ResponseFormat::VerboseJson),
            "text" => Ok(ResponseFormat::Text),
            other => Err(ApiError::InvalidInput(format!(
                "unknown response format: {other}"
            ))),
        }
    }
}

#[get("/api/v1/health")]
async fn health_check(data: web::Data<AppState>) -> HttpResponse {
    debug!("health check endpoint called");
    HttpResponse::Ok().json(HealthDto {
        status: "ok",
        service: "asr-service",
        model: data.model_name.clone(),
    })
}

#[post("/api/v1/transcribe")]
async fn transcribe_upload(
    data: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    debug!("transcription request received");

    let limit = data.config.max_upload_bytes;
    let mut audio_bytes: Option<Vec<u8>> = None;
    let mut language: Option<String> = None;
    let mut format = ResponseFormat::Json;

    while let Some(field) = payload.try_next().await.map_err(|e| {
        warn!("malformed multipart payload: {e}");
        ApiError::InvalidInput("malformed multipart payload".to_string())
    })? {
        match field.name() {
            Some("audio") => {
                let bytes = read_field_data(field, limit).await?;
                debug!("audio field received: {} bytes", bytes.len());
                audio_bytes = Some(bytes);
            }
            Some("language") => {
                let text = read_text_field(field).await?;
                language = parse_language(text.trim())?;
                debug!("language hint set to: {language:?}");
            }
            Some("response_format") => {
                let text = read_text_field(field).await?;
                format = ResponseFormat::parse(text.trim())?;
                debug!("response format set to: {format:?}");
            }
            _ => continue,
        }
    }

    let audio_bytes = audio_bytes.ok_or_else(|| {
        warn!("no audio file provided in transcription request");
        ApiError::InvalidInput("no audio file provided".to_string())
    })?;
    if audio_bytes.is_empty() {
        warn!("empty audio file provided");
        return Err(ApiError::InvalidInput("empty audio file".to_string()));
    }

    info!("processing upload: {} bytes", audio_bytes.len());
    let pcm = audio::decode(&audio_bytes).inspect_err(|e| warn!("upload rejected: {e}"))?;
    info!(
        "decoded audio: {} frames, {}Hz, {} channel(s)",
        pcm.frames(),
        pcm.sample_rate,
        pcm.channels
    );

    let transcript = invoke_model(&data, pcm, language).await?;
    info!(
        "transcription completed: {} segments, {} characters",
        transcript.segments.len(),
        transcript.text.len()
    );

    Ok(render(transcript, format))
}

/// Drain a multipart field, rejecting it once it exceeds `limit` so an
/// oversized upload is dropped mid-stream instead of buffered whole.
async fn read_field_data(mut field: Field, limit: usize) -> Result<Vec<u8>, ApiError> {
    let mut data = Vec::new();
    while let Some(chunk) = field.try_next().await.map_err(|e| {
        warn!("failed to read multipart field: {e}");
        ApiError::InvalidInput("failed to read upload".to_string())
    })? {
        if data.len() + chunk.len() > limit {
            warn!("upload rejected: field exceeds size limit of {limit} bytes");
            return Err(ApiError::InvalidInput(format!(
                "upload exceeds size limit of {limit} bytes"
            )));
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}

async fn read_text_field(field: Field) -> Result<String, ApiError> {
    let name = field.name().unwrap_or("").to_string();
    let data = read_field_data(field, TEXT_FIELD_LIMIT).await?;
    String::from_utf8(data)
        .map_err(|_| ApiError::InvalidInput(format!("field '{name}' is not valid UTF-8")))
}

fn parse_language(value: &str) -> Result<Option<String>, ApiError> {
    if value.is_empty() || value == "auto" {
        return Ok(None);
    }
    let plausible = value.len() <= 8 && value.chars().all(|c| c.is_ascii_alphabetic() || c == '-');
    if !plausible {
        return Err(ApiError::InvalidInput(format!(
            "invalid language hint: {value}"
        )));
    }
    Ok(Some(value.to_ascii_lowercase()))
}

/// Run the blocking model call on the blocking pool, under the configured
/// timeout, with an optional bounded retry on model failure.
async fn invoke_model(
    data: &web::Data<AppState>,
    audio: PcmAudio,
    language: Option<String>,
) -> Result<Transcript, ApiError> {
    let timeout = Duration::from_secs(data.config.model_timeout_secs);
    let retries = data.config.model_retries;
    let audio = Arc::new(audio);
    let opts = TranscribeOptions { language };

    let mut attempt: u32 = 0;
    loop {
        let model = Arc::clone(&data.model);
        let audio = Arc::clone(&audio);
        let opts = opts.clone();
        let call = web::block(move || model.transcribe(&audio, &opts));

        let result = match tokio::time::timeout(timeout, call).await {
            Err(_) => {
                error!("model invocation timed out after {timeout:?}");
                Err(ApiError::Model("transcription timed out".to_string()))
            }
            Ok(Err(e)) => {
                error!("blocking pool failure: {e}");
                Err(ApiError::Internal)
            }
            Ok(Ok(Ok(transcript))) => Ok(transcript),
            Ok(Ok(Err(e))) => Err(ApiError::from(e)),
        };

        match result {
            Err(ApiError::Model(msg)) if attempt < retries => {
                attempt += 1;
                warn!("model invocation failed (attempt {attempt}): {msg}; retrying");
            }
            other => return other,
        }
    }
}

fn render(transcript: Transcript, format: ResponseFormat) -> HttpResponse {
    match format {
        ResponseFormat::Text => HttpResponse::Ok()
            .content_type("text/plain; charset=utf-8")
            .body(transcript.text),
        ResponseFormat::Json => HttpResponse::Ok().json(TranscriptionDto {
            text: transcript.text,
            language: transcript.language,
            segments: None,
        }),
        ResponseFormat::VerboseJson => {
            let segments = transcript
                .segments
                .into_iter()
                .map(|seg| SegmentDto {
                    start_ms: seg.start_ms,
                    end_ms: seg.end_ms,
                    text: seg.text,
                    confidence: seg.confidence,
                })
                .collect();
            HttpResponse::Ok().json(TranscriptionDto {
                text: transcript.text,
                language: transcript.language,
                segments: Some(segments),
            })
        }
    }
}

pub async fn run_server(config: ServiceConfig) -> anyhow::Result<()> {
    info!("initializing whisper engine...");
    info!(
        "using configuration: model_path={:?}, use_gpu={}, language={}, num_threads={}",
        config.whisper.model_path,
        config.whisper.use_gpu,
        config.whisper.language,
        config.whisper.num_threads
    );

    let engine = WhisperEngine::new(config.whisper.clone())?;
    let model_name = config
        .whisper
        .model_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string());

    let host = config.host.clone();
    let port = config.port;
    let app_state = web::Data::new(AppState {
        model: Arc::new(engine),
        config,
        model_name,
    });

    info!("starting HTTP server on {host}:{port}");

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .wrap(Logger::default())
            .service(health_check)
            .service(transcribe_upload)
    })
    .bind((host.as_str(), port))?
    .run()
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asr::{TranscribeError, TranscriptSegment};
    use crate::audio::wav::build_wav;
    use crate::config::WhisperSettings;
    use actix_web::body::BoxBody;
    use actix_web::dev::{Service, ServiceResponse};
    use actix_web::test;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum MockBehavior {
        Succeed(&'static str),
        Fail(&'static str),
        FailOnce(&'static str),
    }

    struct MockModel {
        calls: AtomicUsize,
        behavior: MockBehavior,
    }

    impl MockModel {
        fn new(behavior: MockBehavior) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                behavior,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl SpeechToText for MockModel {
        fn transcribe(
            &self,
            _audio: &PcmAudio,
            opts: &TranscribeOptions,
        ) -> Result<Transcript, TranscribeError> {
            let prior_calls = self.calls.fetch_add(1, Ordering::SeqCst);
            let text = match &self.behavior {
                MockBehavior::Succeed(text) => text,
                MockBehavior::Fail(msg) => return Err(TranscribeError::Model(msg.to_string())),
                MockBehavior::FailOnce(text) => {
                    if prior_calls == 0 {
                        return Err(TranscribeError::Model("transient failure".to_string()));
                    }
                    text
                }
            };
            Ok(Transcript {
                text: text.to_string(),
                // no hint: stand in for the engine's detected language
                language: opts.language.clone().unwrap_or_else(|| "detected".to_string()),
                segments: vec![TranscriptSegment {
                    start_ms: 0,
                    end_ms: 1000,
                    text: text.to_string(),
                    confidence: 0.9,
                }],
            })
        }
    }

    fn test_config(max_upload_bytes: usize, model_retries: u32) -> ServiceConfig {
        ServiceConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            max_upload_bytes,
            model_timeout_secs: 5,
            model_retries,
            whisper: WhisperSettings {
                model_path: PathBuf::from("ggml-test.bin"),
                use_gpu: false,
                language: "auto".to_string(),
                audio_context: 768,
                no_speech_threshold: 0.5,
                num_threads: 1,
            },
        }
    }

    async fn spawn_app(
        model: Arc<MockModel>,
        config: ServiceConfig,
    ) -> impl Service<actix_http::Request, Response = ServiceResponse<BoxBody>, Error = actix_web::Error>
    {
        let state = web::Data::new(AppState {
            model,
            config,
            model_name: "ggml-test".to_string(),
        });
        test::init_service(
            App::new()
                .app_data(state)
                .service(health_check)
                .service(transcribe_upload),
        )
        .await
    }

    const BOUNDARY: &str = "asr-test-boundary";

    fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, filename, data) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match filename {
                Some(f) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                ),
            }
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn transcribe_request(parts: &[(&str, Option<&str>, &[u8])]) -> actix_http::Request {
        test::TestRequest::post()
            .uri("/api/v1/transcribe")
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            ))
            .set_payload(multipart_body(parts))
            .to_request()
    }

    fn silence_wav(seconds: u32) -> Vec<u8> {
        // 16kHz mono 16-bit PCM of zeros
        build_wav(16000, 1, 16, &vec![0u8; (16000 * 2 * seconds) as usize])
    }

    async fn error_code(resp: ServiceResponse<BoxBody>) -> String {
        let body: serde_json::Value = test::read_body_json(resp).await;
        body["error"]["code"].as_str().unwrap_or_default().to_string()
    }

    #[actix_web::test]
    async fn health_reports_loaded_model() {
        let mock = MockModel::new(MockBehavior::Succeed("hi"));
        let app = spawn_app(mock, test_config(1 << 20, 0)).await;

        let req = test::TestRequest::get().uri("/api/v1/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["model"], "ggml-test");
    }

    #[actix_web::test]
    async fn transcribes_valid_wav() {
        let mock = MockModel::new(MockBehavior::Succeed("hello world"));
        let app = spawn_app(mock.clone(), test_config(1 << 20, 0)).await;

        let wav = silence_wav(3);
        let req = transcribe_request(&[
            ("audio", Some("speech.wav"), &wav),
            ("language", None, b"en"),
        ]);
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["text"], "hello world");
        assert_eq!(body["language"], "en");
        assert!(body.get("segments").is_none());
        assert_eq!(mock.calls(), 1);
    }

    #[actix_web::test]
    async fn reports_detected_language_without_hint() {
        let mock = MockModel::new(MockBehavior::Succeed("hallo welt"));
        let app = spawn_app(mock, test_config(1 << 20, 0)).await;

        let req = transcribe_request(&[("audio", Some("speech.wav"), &silence_wav(2))]);
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["language"], "detected");
    }

    #[actix_web::test]
    async fn same_payload_twice_yields_same_transcript() {
        let mock = MockModel::new(MockBehavior::Succeed("deterministic"));
        let app = spawn_app(mock.clone(), test_config(1 << 20, 0)).await;

        let wav = silence_wav(2);
        let mut texts = Vec::new();
        for _ in 0..2 {
            let req = transcribe_request(&[("audio", Some("speech.wav"), &wav)]);
            let resp = test::call_service(&app, req).await;
            assert!(resp.status().is_success());
            let body: serde_json::Value = test::read_body_json(resp).await;
            texts.push(body["text"].as_str().unwrap().to_string());
        }
        assert_eq!(texts[0], texts[1]);
        assert_eq!(mock.calls(), 2);
    }

    #[actix_web::test]
    async fn silence_can_yield_empty_transcript() {
        let mock = MockModel::new(MockBehavior::Succeed(""));
        let app = spawn_app(mock, test_config(1 << 20, 0)).await;

        let req = transcribe_request(&[("audio", Some("silence.wav"), &silence_wav(3))]);
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["text"], "");
    }

    #[actix_web::test]
    async fn rejects_missing_audio_field() {
        let mock = MockModel::new(MockBehavior::Succeed("hi"));
        let app = spawn_app(mock.clone(), test_config(1 << 20, 0)).await;

        let req = transcribe_request(&[("language", None, b"en")]);
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        assert_eq!(error_code(resp).await, "invalid_input");
        assert_eq!(mock.calls(), 0);
    }

    #[actix_web::test]
    async fn rejects_oversized_payload_without_model_call() {
        let mock = MockModel::new(MockBehavior::Succeed("hi"));
        let app = spawn_app(mock.clone(), test_config(1024, 0)).await;

        let wav = silence_wav(3); // ~96KB, far over the 1KB limit
        let req = transcribe_request(&[("audio", Some("big.wav"), &wav)]);
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], "invalid_input");
        assert!(
            body["error"]["message"]
                .as_str()
                .unwrap()
                .contains("size limit")
        );
        assert_eq!(mock.calls(), 0);
    }

    #[actix_web::test]
    async fn rejects_unsupported_encoding_without_model_call() {
        let mock = MockModel::new(MockBehavior::Succeed("hi"));
        let app = spawn_app(mock.clone(), test_config(1 << 20, 0)).await;

        let req = transcribe_request(&[(
            "audio",
            Some("notes.txt"),
            b"just some plain text, not audio".as_slice(),
        )]);
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        assert_eq!(error_code(resp).await, "invalid_input");
        assert_eq!(mock.calls(), 0);
    }

    #[actix_web::test]
    async fn rejects_corrupt_wav_without_model_call() {
        let mock = MockModel::new(MockBehavior::Succeed("hi"));
        let app = spawn_app(mock.clone(), test_config(1 << 20, 0)).await;

        // valid RIFF/WAVE magic followed by a truncated chunk list
        let mut corrupt = silence_wav(1);
        corrupt.truncate(20);
        let req = transcribe_request(&[("audio", Some("broken.wav"), &corrupt)]);
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        assert_eq!(error_code(resp).await, "invalid_input");
        assert_eq!(mock.calls(), 0);
    }

    #[actix_web::test]
    async fn model_failure_surfaces_without_transcript() {
        let mock = MockModel::new(MockBehavior::Fail("engine exploded"));
        let app = spawn_app(mock.clone(), test_config(1 << 20, 0)).await;

        let req = transcribe_request(&[("audio", Some("speech.wav"), &silence_wav(2))]);
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 502);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], "model_error");
        assert!(body.get("text").is_none());
        assert_eq!(mock.calls(), 1);
    }

    #[actix_web::test]
    async fn model_failure_is_not_retried_by_default() {
        let mock = MockModel::new(MockBehavior::FailOnce("recovered"));
        let app = spawn_app(mock.clone(), test_config(1 << 20, 0)).await;

        let req = transcribe_request(&[("audio", Some("speech.wav"), &silence_wav(2))]);
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 502);
        assert_eq!(mock.calls(), 1);
    }

    #[actix_web::test]
    async fn bounded_retry_recovers_from_transient_failure() {
        let mock = MockModel::new(MockBehavior::FailOnce("recovered"));
        let app = spawn_app(mock.clone(), test_config(1 << 20, 1)).await;

        let req = transcribe_request(&[("audio", Some("speech.wav"), &silence_wav(2))]);
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["text"], "recovered");
        assert_eq!(mock.calls(), 2);
    }

    #[actix_web::test]
    async fn language_hint_is_forwarded() {
        let mock = MockModel::new(MockBehavior::Succeed("bonjour"));
        let app = spawn_app(mock, test_config(1 << 20, 0)).await;

        let req = transcribe_request(&[
            ("audio", Some("speech.wav"), &silence_wav(2)),
            ("language", None, b"FR"),
        ]);
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["language"], "fr");
    }

    #[actix_web::test]
    async fn rejects_garbage_language_hint() {
        let mock = MockModel::new(MockBehavior::Succeed("hi"));
        let app = spawn_app(mock.clone(), test_config(1 << 20, 0)).await;

        let req = transcribe_request(&[
            ("audio", Some("speech.wav"), &silence_wav(2)),
            ("language", None, b"12345!"),
        ]);
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        assert_eq!(mock.calls(), 0);
    }

    #[actix_web::test]
    async fn text_format_returns_plain_body() {
        let mock = MockModel::new(MockBehavior::Succeed("plain text result"));
        let app = spawn_app(mock, test_config(1 << 20, 0)).await;

        let req = transcribe_request(&[
            ("audio", Some("speech.wav"), &silence_wav(2)),
            ("response_format", None, b"text"),
        ]);
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        assert!(
            resp.headers()
                .get("content-type")
                .unwrap()
                .to_str()
                .unwrap()
                .starts_with("text/plain")
        );

        let body = test::read_body(resp).await;
        assert_eq!(&body[..], b"plain text result");
    }

    #[actix_web::test]
    async fn verbose_json_includes_segments() {
        let mock = MockModel::new(MockBehavior::Succeed("segmented"));
        let app = spawn_app(mock, test_config(1 << 20, 0)).await;

        let req = transcribe_request(&[
            ("audio", Some("speech.wav"), &silence_wav(2)),
            ("response_format", None, b"verbose_json"),
        ]);
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["segments"][0]["text"], "segmented");
        assert_eq!(body["segments"][0]["end_ms"], 1000);
    }

    #[actix_web::test]
    async fn rejects_unknown_response_format() {
        let mock = MockModel::new(MockBehavior::Succeed("hi"));
        let app = spawn_app(mock.clone(), test_config(1 << 20, 0)).await;

        let req = transcribe_request(&[
            ("audio", Some("speech.wav"), &silence_wav(2)),
            ("response_format", None, b"yaml"),
        ]);
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        assert_eq!(mock.calls(), 0);
    }
}
