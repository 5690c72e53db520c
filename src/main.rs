mod asr;
mod audio;
mod cli;
mod client;
mod config;
mod download;
mod dto;
mod error;
mod server;

use anyhow::Result;
use clap::Parser;

use crate::cli::{Cli, Commands};

#[actix_web::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { host, port } => {
            let config = config::ServiceConfig::from_env(host, port)?;
            server::run_server(config).await
        }
        Commands::TranscribeFile {
            audio_file,
            server_url,
            language,
            response_format,
        } => {
            client::run_client(client::ClientConfig {
                server_url,
                audio_file,
                language,
                response_format,
            })
            .await
        }
        Commands::DownloadModel { model, models_path } => {
            download::download_model(&model, models_path).await
        }
    }
}
