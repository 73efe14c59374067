use anyhow::{Context, Result};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use token_broker::auth::{token_preview, AuthManager, DotenvStore, TokenStatus};
use token_broker::config::{run_interactive_setup, Command, Config, LogFormat};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load configuration first (for log level)
    let config = Config::load()?;
    init_tracing(&config)?;

    tracing::debug!(
        env_file = %config.env_file.display(),
        command = ?config.command,
        "Token broker starting"
    );

    if config.command == Command::Setup {
        run_interactive_setup(&config.env_file, config.credentials())?;
        return Ok(ExitCode::SUCCESS);
    }

    let store = Arc::new(DotenvStore::new(config.env_file.clone()));
    let auth_manager = AuthManager::new(
        config.credentials().clone(),
        store,
        Duration::from_secs(config.http_connect_timeout),
        Duration::from_secs(config.http_request_timeout),
    )?;

    match config.command {
        Command::Header => match auth_manager.get_authorization_header().await {
            Some(header) => {
                println!("{}", serde_json::to_string(&header)?);
                Ok(ExitCode::SUCCESS)
            }
            None => {
                anyhow::bail!("Failed to retrieve auth header: all authentication stages failed")
            }
        },
        Command::Check => match auth_manager.check_persisted().await {
            TokenStatus::Valid => {
                println!("valid");
                Ok(ExitCode::SUCCESS)
            }
            TokenStatus::Invalid => {
                println!("invalid");
                Ok(ExitCode::FAILURE)
            }
        },
        Command::Login => {
            let token = auth_manager.force_login().await?;
            tracing::info!(
                "✅ Authentication successful (token: {})",
                token_preview(&token.access_token)
            );
            println!("Tokens saved to {}", config.env_file.display());
            Ok(ExitCode::SUCCESS)
        }
        Command::Setup => Ok(ExitCode::SUCCESS),
    }
}

/// Initialize logging; stdout is reserved for command output
fn init_tracing(config: &Config) -> Result<()> {
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

    match &config.log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create log directory: {}", parent.display())
                })?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;

            let builder = builder.with_ansi(false).with_writer(Mutex::new(file));
            match config.log_format {
                LogFormat::Json => builder.json().init(),
                LogFormat::Text => builder.init(),
            }
        }
        None => {
            let builder = builder.with_writer(std::io::stderr);
            match config.log_format {
                LogFormat::Json => builder.json().init(),
                LogFormat::Text => builder.init(),
            }
        }
    }

    Ok(())
}
