use anyhow::Result;
use clap::Parser;
use providers::OllamaClient;
use services::settings_store::{FileSettingsStore, LayeredSettings, SettingsProvider};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    // stderr keeps stdout clean for model output
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let store = FileSettingsStore::default_location()?;
    let settings = Arc::new(LayeredSettings::new(store.clone(), cli.url, cli.model));
    let client = OllamaClient::new();

    match cli.command {
        Commands::Send {
            content_type,
            prompt,
            inputs,
        } => {
            let provider: Arc<dyn SettingsProvider> = settings;
            commands::send(provider, client, content_type, prompt, &inputs).await
        }
        Commands::Chat { page } => {
            commands::chat(&*settings, &client, page).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Pull { name } => commands::pull(&*settings, &client, &name).await,
        Commands::Delete { name } => {
            commands::delete(&*settings, &client, &name).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Models => {
            commands::models(&*settings, &client).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config { action } => {
            commands::config(&store, action)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
