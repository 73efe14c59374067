// Authentication module
// Keeps a bearer token usable: validate, refresh, log in, persist

mod audit;
mod login;
mod manager;
mod refresh;
mod store;
mod types;
mod validator;

pub use audit::AuditLogger;
pub use login::LoginClient;
pub use manager::AuthManager;
pub use refresh::RefreshClient;
pub use store::{CredentialStore, DotenvStore, MemoryStore};
pub use types::{
    token_preview, AuthorizationHeader, Credentials, ObtainedToken, PersistedState, TokenPair,
    TokenSource, TokenStatus, AUTH_REFRESH_TOKEN_KEY, AUTH_TOKEN_KEY,
};
pub use validator::TokenValidator;
