use tracing::{error, info, warn};

/// Audit trail for authentication events, emitted on the `audit` target
#[derive(Debug, Clone, Default)]
pub struct AuditLogger;

impl AuditLogger {
    pub fn new() -> Self {
        Self
    }

    pub fn login_succeeded(&self, username: &str) {
        info!(target: "audit", event = "login_succeeded", username, "Successfully retrieved new auth token");
    }

    pub fn login_failed(&self, username: &str, reason: &str) {
        error!(target: "audit", event = "login_failed", username, reason, "Authentication failed");
    }

    pub fn refresh_succeeded(&self) {
        info!(target: "audit", event = "refresh_succeeded", "Successfully refreshed auth token");
    }

    pub fn refresh_failed(&self, reason: &str) {
        warn!(target: "audit", event = "refresh_failed", reason, "Token refresh failed");
    }

    pub fn token_validated(&self, token_preview: &str) {
        info!(target: "audit", event = "token_validated", token = token_preview, "Auth token is valid");
    }

    pub fn token_rejected(&self, reason: &str) {
        warn!(target: "audit", event = "token_rejected", reason, "Auth token invalid");
    }

    pub fn tokens_persisted(&self, refresh_token_written: bool) {
        info!(target: "audit", event = "tokens_persisted", refresh_token_written, "Tokens updated successfully");
    }

    pub fn lifecycle_exhausted(&self, error_msg: &str) {
        error!(target: "audit", event = "lifecycle_exhausted", error = error_msg, "Failed to authenticate");
    }
}
