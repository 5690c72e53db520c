use std::path::Path;

use anyhow::{Result, anyhow};
use log::info;
use tokio::io::AsyncWriteExt;

const AVAILABLE_MODELS: &[&str] = &[
    "tiny",
    "tiny.en",
    "tiny-q5_1",
    "tiny.en-q5_1",
    "tiny-q8_0",
    "base",
    "base.en",
    "base-q5_1",
    "base.en-q5_1",
    "base-q8_0",
    "small",
    "small.en",
    "small-q5_1",
    "small.en-q5_1",
    "small-q8_0",
    "medium",
    "medium.en",
    "medium-q5_0",
    "medium.en-q5_0",
    "medium-q8_0",
    "large-v1",
    "large-v2",
    "large-v2-q5_0",
    "large-v2-q8_0",
    "large-v3",
    "large-v3-q5_0",
    "large-v3-turbo",
    "large-v3-turbo-q5_0",
    "large-v3-turbo-q8_0",
];

pub fn list_available_models() -> String {
    let mut output = String::from("\nAvailable models:\n");
    for model in AVAILABLE_MODELS {
        output.push_str(&format!("  {model}\n"));
    }
    output.push_str("\n.en = english-only  -q5_[01]/-q8_0 = quantized\n");
    output
}

pub fn validate_model(model: &str) -> Result<()> {
    if AVAILABLE_MODELS.contains(&model) {
        Ok(())
    } else {
        Err(anyhow!(
            "Invalid model: {}\n{}",
            model,
            list_available_models()
        ))
    }
}

fn model_url(model: &str) -> String {
    format!("https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-{model}.bin")
}

/// Fetch a ggml model into `models_path` (current directory by default),
/// skipping the download when the file is already present.
pub async fn download_model(model: &str, models_path: Option<String>) -> Result<()> {
    validate_model(model)?;

    let download_path = models_path.unwrap_or_else(|| ".".to_string());
    let file_path = Path::new(&download_path).join(format!("ggml-{model}.bin"));

    if file_path.exists() {
        println!("Model '{model}' already exists. Skipping download.");
        return Ok(());
    }

    if let Some(parent) = file_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| anyhow!("Failed to create directory: {}", e))?;
    }

    let url = model_url(model);
    println!("Downloading ggml model '{model}'...");
    info!("fetching {url}");

    let mut response = reqwest::get(&url)
        .await
        .map_err(|e| anyhow!("Download request failed: {}", e))?
        .error_for_status()
        .map_err(|e| anyhow!("Download failed: {}", e))?;

    let mut file = tokio::fs::File::create(&file_path)
        .await
        .map_err(|e| anyhow!("Failed to create {}: {}", file_path.display(), e))?;

    let mut downloaded: u64 = 0;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| anyhow!("Download interrupted: {}", e))?
    {
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;
    }
    file.flush().await?;

    println!(
        "Done! Model '{}' saved in '{}' ({} bytes)",
        model,
        file_path.display(),
        downloaded
    );
    println!("You can now serve it:");
    println!("  $ WHISPER_MODEL_PATH={} asr-service serve", file_path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_known_models() {
        assert!(validate_model("base.en").is_ok());
        assert!(validate_model("large-v3-turbo").is_ok());
    }

    #[test]
    fn rejects_unknown_models() {
        let err = validate_model("humongous-v9").unwrap_err();
        assert!(err.to_string().contains("Invalid model"));
    }

    #[test]
    fn builds_huggingface_url() {
        assert_eq!(
            model_url("base.en"),
            "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-base.en.bin"
        );
    }
}
