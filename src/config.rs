use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::{Confirm, Input, Password};
use std::path::{Path, PathBuf};

use crate::auth::{Credentials, DotenvStore};

/// Token Broker - keeps an API bearer token usable for other jobs
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Env file holding secrets and persisted tokens
    #[arg(short = 'e', long, env = "AUTH_ENV_FILE", default_value = ".env")]
    pub env_file: String,

    /// Base URL of the remote API
    #[arg(short = 'u', long, env = "API_BASE_URL")]
    pub base_url: Option<String>,

    /// Operator id used for login
    #[arg(long, env = "API_USERNAME")]
    pub username: Option<String>,

    /// Operator password used for login
    #[arg(long, env = "API_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Append logs to this file instead of stderr
    #[arg(long, env = "AUTH_LOG_FILE")]
    pub log_file: Option<String>,

    /// HTTP connect timeout in seconds
    #[arg(long, env = "HTTP_CONNECT_TIMEOUT", default_value = "10")]
    pub connect_timeout: u64,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub request_timeout: u64,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Print a ready-to-use Authorization header as JSON (default)
    Header,
    /// Check whether the persisted access token is still accepted
    Check,
    /// Log in with the configured credentials and persist the new tokens
    Login,
    /// Prompt for API credentials and write them to the env file
    Setup,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub env_file: PathBuf,
    pub credentials: Credentials,

    // Logging
    pub log_level: String,
    pub log_format: LogFormat,
    pub log_file: Option<PathBuf>,

    // HTTP client
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,

    pub command: Command,
}

#[derive(Clone, Debug, PartialEq)]
pub enum LogFormat {
    Text,
    Json,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > env file > defaults
    pub fn load() -> Result<Self> {
        // Load the env file before parsing so clap sees its values
        let env_file = std::env::var("AUTH_ENV_FILE").unwrap_or_else(|_| ".env".to_string());
        dotenvy::from_path(expand_tilde(&env_file)).ok();

        let args = CliArgs::parse();
        Ok(Self::from_args(args))
    }

    /// Build config from parsed arguments, filling gaps from the environment
    pub fn from_args(args: CliArgs) -> Self {
        let env_file = expand_tilde(&args.env_file);

        // Pick up a non-default env file chosen on the command line
        dotenvy::from_path(&env_file).ok();

        let base_url = args
            .base_url
            .or_else(|| std::env::var("API_BASE_URL").ok())
            .unwrap_or_default();
        let username = args
            .username
            .or_else(|| std::env::var("API_USERNAME").ok())
            .unwrap_or_default();
        let password = args
            .password
            .or_else(|| std::env::var("API_PASSWORD").ok())
            .unwrap_or_default();

        Config {
            env_file,
            credentials: Credentials::new(base_url, username, password),
            log_level: args.log_level,
            log_format: parse_log_format(&args.log_format),
            log_file: args.log_file.map(|s| expand_tilde(&s)),
            http_connect_timeout: args.connect_timeout,
            http_request_timeout: args.request_timeout,
            command: args.command.unwrap_or(Command::Header),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Parse log format from string
fn parse_log_format(s: &str) -> LogFormat {
    match s.to_lowercase().as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    }
}

// === Interactive Setup ===

/// Prompt for the static API secrets and write them to the env file
pub fn run_interactive_setup(env_file: &Path, current: &Credentials) -> Result<Credentials> {
    println!();
    println!("Token Broker setup");
    println!("Secrets will be written to {}", env_file.display());
    println!();

    let mut base_url_prompt = Input::<String>::new().with_prompt("API base URL (API_BASE_URL)");
    if !current.base_url.is_empty() {
        base_url_prompt = base_url_prompt.default(current.base_url.clone());
    }
    let base_url = base_url_prompt
        .interact_text()
        .context("Failed to read API_BASE_URL")?;

    let mut username_prompt = Input::<String>::new().with_prompt("Operator id (API_USERNAME)");
    if !current.username.is_empty() {
        username_prompt = username_prompt.default(current.username.clone());
    }
    let username = username_prompt
        .interact_text()
        .context("Failed to read API_USERNAME")?;

    let password = Password::new()
        .with_prompt("Operator password (API_PASSWORD)")
        .interact()
        .context("Failed to read API_PASSWORD")?;

    let credentials = Credentials::new(base_url, username, password);
    credentials.ensure_complete()?;

    let save = Confirm::new()
        .with_prompt(format!("Save to {}?", env_file.display()))
        .default(true)
        .interact()
        .context("Failed to read save confirmation")?;

    if save {
        DotenvStore::new(env_file).set_values(&[
            ("API_BASE_URL", credentials.base_url.as_str()),
            ("API_USERNAME", credentials.username.as_str()),
            ("API_PASSWORD", credentials.password.as_str()),
        ])?;
        println!();
        println!("Configuration saved to {}", env_file.display());
    }

    Ok(credentials)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> CliArgs {
        let dir = std::env::temp_dir().join("token-broker-config-test-missing.env");
        let mut argv = vec![
            "token-broker",
            "--env-file",
            dir.to_str().unwrap(),
            "--base-url",
            "https://api.example.com/",
            "--username",
            "op",
            "--password",
            "pw",
        ];
        argv.extend_from_slice(extra);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_expand_tilde() {
        let path = expand_tilde("~/test/file.txt");
        assert!(path.to_string_lossy().contains("test/file.txt"));
        assert!(!path.to_string_lossy().starts_with("~"));

        let path = expand_tilde("/absolute/path");
        assert_eq!(path, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_expand_tilde_just_tilde() {
        // Just "~" without slash should not expand
        let path = expand_tilde("~");
        assert_eq!(path, PathBuf::from("~"));
    }

    #[test]
    fn test_parse_log_format() {
        assert_eq!(parse_log_format("json"), LogFormat::Json);
        assert_eq!(parse_log_format("JSON"), LogFormat::Json);
        assert_eq!(parse_log_format("text"), LogFormat::Text);
        assert_eq!(parse_log_format("unknown"), LogFormat::Text);
    }

    #[test]
    fn test_from_args_defaults_to_header() {
        let config = Config::from_args(args(&[]));
        assert_eq!(config.command, Command::Header);
        assert_eq!(config.credentials().base_url, "https://api.example.com");
        assert_eq!(config.credentials().username, "op");
        assert_eq!(config.http_connect_timeout, 10);
        assert_eq!(config.http_request_timeout, 30);
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_from_args_subcommand_and_logging() {
        let config = Config::from_args(args(&["--log-format", "json", "--request-timeout", "5", "check"]));
        assert_eq!(config.command, Command::Check);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.http_request_timeout, 5);
    }
}
