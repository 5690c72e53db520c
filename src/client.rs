use std::fs;
use std::path::Path;

use anyhow::{Result, anyhow};
use serde_json::Value;

/// Settings for the `file` subcommand.
#[derive(Debug)]
pub struct ClientConfig {
    pub server_url: String,
    pub audio_file: String,
    pub language: Option<String>,
    pub response_format: String,
}

pub async fn send_transcription_request(config: &ClientConfig) -> Result<String> {
    let client = reqwest::Client::new();

    if !Path::new(&config.audio_file).exists() {
        return Err(anyhow!("Audio file not found: {}", config.audio_file));
    }
    let audio_data =
        fs::read(&config.audio_file).map_err(|e| anyhow!("Failed to read audio file: {}", e))?;

    println!(
        "📁 Audio file: {} ({} bytes)",
        config.audio_file,
        audio_data.len()
    );

    let mut form = reqwest::multipart::Form::new()
        .part(
            "audio",
            reqwest::multipart::Part::bytes(audio_data).file_name(config.audio_file.clone()),
        )
        .text("response_format", config.response_format.clone());
    if let Some(ref language) = config.language {
        form = form.text("language", language.clone());
    }

    println!(
        "🚀 Sending transcription request to: {}/api/v1/transcribe",
        config.server_url
    );

    let response = client
        .post(format!("{}/api/v1/transcribe", config.server_url))
        .multipart(form)
        .send()
        .await
        .map_err(|e| anyhow!("Failed to send request: {}", e))?;

    let status = response.status();
    let response_text = response
        .text()
        .await
        .map_err(|e| anyhow!("Failed to read response: {}", e))?;

    if !status.is_success() {
        return Err(anyhow!(
            "Server returned error {}: {}",
            status,
            response_text
        ));
    }

    Ok(response_text)
}

pub async fn check_server_health(server_url: &str) -> Result<()> {
    let client = reqwest::Client::new();

    println!("🔍 Checking server health at: {server_url}/api/v1/health");

    let response = client
        .get(format!("{server_url}/api/v1/health"))
        .send()
        .await
        .map_err(|e| anyhow!("Failed to connect to server: {}", e))?;

    if response.status().is_success() {
        println!("✅ Server is healthy");
        Ok(())
    } else {
        Err(anyhow!("Server health check failed: {}", response.status()))
    }
}

pub async fn run_client(config: ClientConfig) -> Result<()> {
    println!("🎵 ASR Service Client");
    println!("=====================");

    if let Err(e) = check_server_health(&config.server_url).await {
        eprintln!("❌ {e}");
        eprintln!("💡 Make sure the server is running: asr-service serve");
        return Err(e);
    }

    match send_transcription_request(&config).await {
        Ok(body) => {
            println!("\n✅ Transcription completed!");
            println!("📝 Result:");
            match serde_json::from_str::<Value>(&body) {
                Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
                Err(_) => println!("{body}"),
            }
        }
        Err(e) => {
            eprintln!("❌ Transcription failed: {e}");
            return Err(e);
        }
    }

    Ok(())
}
