// Persistence of token material in a dotenv-style key-value file

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::NamedTempFile;

use super::types::{PersistedState, AUTH_REFRESH_TOKEN_KEY, AUTH_TOKEN_KEY};

/// Durable storage for the most recently obtained token pair
pub trait CredentialStore: Send + Sync {
    /// Read the persisted access and refresh tokens
    fn load(&self) -> Result<PersistedState>;

    /// Persist an access token, and the refresh token when one is given.
    /// An absent refresh token leaves the stored one untouched.
    fn save(&self, access_token: &str, refresh_token: Option<&str>) -> Result<()>;
}

/// Credential store backed by a `.env` file
///
/// Keys missing from the file fall back to the process environment. Writes
/// replace the whole file through a rename, so a reader sees either the old
/// or the new contents.
#[derive(Debug, Clone)]
pub struct DotenvStore {
    path: PathBuf,
}

impl DotenvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all entries from the file; a missing file reads as empty
    fn read_entries(&self) -> Result<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }

        let iter = dotenvy::from_path_iter(&self.path)
            .with_context(|| format!("Failed to open env file: {}", self.path.display()))?;

        let mut entries = HashMap::new();
        for item in iter {
            let (key, value) = item
                .with_context(|| format!("Failed to parse env file: {}", self.path.display()))?;
            entries.insert(key, value);
        }
        Ok(entries)
    }

    fn lookup(entries: &HashMap<String, String>, key: &str) -> Option<String> {
        entries
            .get(key)
            .cloned()
            .or_else(|| std::env::var(key).ok())
            .filter(|v| !v.is_empty())
    }

    /// Set keys in the file, keeping unrelated lines and comments
    pub fn set_values(&self, values: &[(&str, &str)]) -> Result<()> {
        let existing = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read env file: {}", self.path.display()))
            }
        };

        let contents = render_with_values(&existing, values);

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;

        if let Ok(metadata) = std::fs::metadata(&self.path) {
            tmp.as_file()
                .set_permissions(metadata.permissions())
                .context("Failed to copy env file permissions")?;
        }

        tmp.write_all(contents.as_bytes())
            .context("Failed to write temporary env file")?;
        tmp.as_file()
            .sync_all()
            .context("Failed to flush temporary env file")?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to replace env file: {}", self.path.display()))?;

        Ok(())
    }
}

impl CredentialStore for DotenvStore {
    fn load(&self) -> Result<PersistedState> {
        let entries = self.read_entries()?;
        Ok(PersistedState::new(
            Self::lookup(&entries, AUTH_TOKEN_KEY),
            Self::lookup(&entries, AUTH_REFRESH_TOKEN_KEY),
        ))
    }

    fn save(&self, access_token: &str, refresh_token: Option<&str>) -> Result<()> {
        let mut values = Vec::with_capacity(2);
        if !access_token.is_empty() {
            values.push((AUTH_TOKEN_KEY, access_token));
        }
        if let Some(refresh_token) = refresh_token.filter(|t| !t.is_empty()) {
            values.push((AUTH_REFRESH_TOKEN_KEY, refresh_token));
        }
        if values.is_empty() {
            return Ok(());
        }

        self.set_values(&values)?;
        tracing::debug!(path = %self.path.display(), keys = values.len(), "Env file updated");
        Ok(())
    }
}

/// Key defined by a `KEY=value` or `export KEY=value` line
fn line_key(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') {
        return None;
    }
    let trimmed = trimmed
        .strip_prefix("export ")
        .map(str::trim_start)
        .unwrap_or(trimmed);
    let (key, _) = trimmed.split_once('=')?;
    let key = key.trim_end();
    (!key.is_empty()).then_some(key)
}

/// Quote a value so dotenvy reads it back verbatim
fn format_entry(key: &str, value: &str) -> String {
    if !value.contains('\'') {
        return format!("{}='{}'", key, value);
    }

    let mut escaped = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        match c {
            '\\' | '"' | '$' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(c),
        }
    }
    format!("{}=\"{}\"", key, escaped)
}

fn render_with_values(existing: &str, values: &[(&str, &str)]) -> String {
    let mut written = vec![false; values.len()];
    let mut lines: Vec<String> = Vec::new();

    for line in existing.lines() {
        let replacement = line_key(line)
            .and_then(|key| values.iter().position(|(k, _)| *k == key));

        match replacement {
            Some(idx) => {
                let (key, value) = values[idx];
                lines.push(format_entry(key, value));
                written[idx] = true;
            }
            None => lines.push(line.to_string()),
        }
    }

    for (idx, (key, value)) in values.iter().enumerate() {
        if !written[idx] {
            lines.push(format_entry(key, value));
        }
    }

    let mut contents = lines.join("\n");
    contents.push('\n');
    contents
}

/// In-process credential store that counts writes
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<PersistedState>,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(access_token: Option<&str>, refresh_token: Option<&str>) -> Self {
        Self {
            state: Mutex::new(PersistedState::new(
                access_token.map(str::to_string),
                refresh_token.map(str::to_string),
            )),
            saves: AtomicUsize::new(0),
        }
    }

    /// Current stored state
    pub fn snapshot(&self) -> PersistedState {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Number of `save` calls so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl CredentialStore for MemoryStore {
    fn load(&self) -> Result<PersistedState> {
        Ok(self.snapshot())
    }

    fn save(&self, access_token: &str, refresh_token: Option<&str>) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !access_token.is_empty() {
            state.access_token = Some(access_token.to_string());
        }
        if let Some(refresh_token) = refresh_token.filter(|t| !t.is_empty()) {
            state.refresh_token = Some(refresh_token.to_string());
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
