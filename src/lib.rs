// Token Broker - Library root

pub mod auth;
pub mod config;
pub mod error;

pub use auth::{AuthManager, AuthorizationHeader};
pub use error::AuthError;
