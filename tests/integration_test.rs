// Integration tests for Token Broker
//
// These tests drive full lifecycle passes against a mock API server and
// check what ends up in the credential store.

use mockito::{Matcher, Mock, Server, ServerGuard};
use proptest::prelude::*;
use proptest::test_runner::TestRunner;
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;

use token_broker::auth::{
    AuditLogger, AuthManager, CredentialStore, Credentials, DotenvStore, LoginClient,
    MemoryStore, PersistedState, TokenSource,
};
use token_broker::AuthError;

// ==================================================================================================
// Test Helpers
// ==================================================================================================

fn manager_for(server: &ServerGuard, store: Arc<dyn CredentialStore>) -> AuthManager {
    AuthManager::with_client(
        Credentials::new(server.url(), "op", "pw"),
        store,
        Client::new(),
        AuditLogger::new(),
    )
}

fn state(access: &str, refresh: &str) -> PersistedState {
    PersistedState::new(Some(access.to_string()), Some(refresh.to_string()))
}

async fn profile_mock(server: &mut ServerGuard, token: &str, status: usize, hits: usize) -> Mock {
    server
        .mock("GET", "/auth/profile")
        .match_header("authorization", Matcher::Exact(format!("Bearer {}", token)))
        .with_status(status)
        .expect(hits)
        .create_async()
        .await
}

async fn refresh_mock(server: &mut ServerGuard, status: usize, body: &str, hits: usize) -> Mock {
    server
        .mock("POST", "/auth/refresh")
        .with_status(status)
        .with_header("content-type", "application/json")
        .with_body(body)
        .expect(hits)
        .create_async()
        .await
}

async fn login_mock(server: &mut ServerGuard, status: usize, body: &str, hits: usize) -> Mock {
    server
        .mock("POST", "/auth/login")
        .match_body(Matcher::Json(json!({"op_id": "op", "op_password": "pw"})))
        .with_status(status)
        .with_header("content-type", "application/json")
        .with_body(body)
        .expect(hits)
        .create_async()
        .await
}

// ==================================================================================================
// Lifecycle Tests
// ==================================================================================================

#[tokio::test]
async fn test_expired_token_is_refreshed_and_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let env_path = dir.path().join(".env");
    std::fs::write(&env_path, "AUTH_TOKEN=expiredA\nAUTH_REFRESH_TOKEN=goodR\n").unwrap();

    let mut server = Server::new_async().await;
    let profile = profile_mock(&mut server, "expiredA", 401, 1).await;
    let refresh = server
        .mock("POST", "/auth/refresh")
        .match_header("refresh", "goodR")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"result":{"access_token":"freshA2"}}"#)
        .expect(1)
        .create_async()
        .await;
    let login = login_mock(&mut server, 200, "{}", 0).await;

    let store = Arc::new(DotenvStore::new(&env_path));
    let manager = manager_for(&server, store.clone());

    let header = manager.get_authorization_header().await.unwrap();
    assert_eq!(
        serde_json::to_value(&header).unwrap(),
        json!({"Authorization": "Bearer freshA2"})
    );
    assert_eq!(store.load().unwrap(), state("freshA2", "goodR"));

    profile.assert_async().await;
    refresh.assert_async().await;
    login.assert_async().await;
}

#[tokio::test]
async fn test_valid_token_leaves_store_untouched() {
    let mut server = Server::new_async().await;
    let profile = profile_mock(&mut server, "goodA", 200, 1).await;
    let refresh = refresh_mock(&mut server, 200, "{}", 0).await;
    let login = login_mock(&mut server, 200, "{}", 0).await;

    let store = Arc::new(MemoryStore::with_tokens(Some("goodA"), Some("goodR")));
    let manager = manager_for(&server, store.clone());

    let header = manager.get_authorization_header().await.unwrap();
    assert_eq!(header.value(), "Bearer goodA");
    assert_eq!(store.save_count(), 0);
    assert_eq!(store.snapshot(), state("goodA", "goodR"));

    profile.assert_async().await;
    refresh.assert_async().await;
    login.assert_async().await;
}

#[tokio::test]
async fn test_refresh_never_rotates_refresh_token() {
    let mut server = Server::new_async().await;
    let _profile = profile_mock(&mut server, "oldA", 401, 1).await;
    let _refresh = refresh_mock(
        &mut server,
        200,
        r#"{"result":{"access_token":"newA","refresh_token":"ignoredR"}}"#,
        1,
    )
    .await;

    let store = Arc::new(MemoryStore::with_tokens(Some("oldA"), Some("keepR")));
    let token = manager_for(&server, store.clone())
        .obtain_token()
        .await
        .unwrap();

    assert_eq!(token.source, TokenSource::Refreshed);
    assert_eq!(store.snapshot(), state("newA", "keepR"));
}

#[tokio::test]
async fn test_login_after_failed_refresh_persists_both_tokens() {
    let mut server = Server::new_async().await;
    let profile = profile_mock(&mut server, "oldA", 401, 1).await;
    let refresh = refresh_mock(&mut server, 401, r#"{"error":"expired"}"#, 1).await;
    let login = login_mock(
        &mut server,
        200,
        r#"{"result":{"access_token":"loginA","refresh_token":"loginR"}}"#,
        1,
    )
    .await;

    let store = Arc::new(MemoryStore::with_tokens(Some("oldA"), Some("oldR")));
    let token = manager_for(&server, store.clone())
        .obtain_token()
        .await
        .unwrap();

    assert_eq!(token.access_token, "loginA");
    assert_eq!(token.source, TokenSource::LoggedIn);
    assert_eq!(store.snapshot(), state("loginA", "loginR"));

    profile.assert_async().await;
    refresh.assert_async().await;
    login.assert_async().await;
}

#[tokio::test]
async fn test_all_stages_failing_yields_no_header_and_no_writes() {
    let dir = tempfile::tempdir().unwrap();
    let env_path = dir.path().join(".env");
    let original = "AUTH_TOKEN=oldA\nAUTH_REFRESH_TOKEN=oldR\n";
    std::fs::write(&env_path, original).unwrap();

    let mut server = Server::new_async().await;
    let _profile = profile_mock(&mut server, "oldA", 401, 1).await;
    let _refresh = refresh_mock(&mut server, 500, "", 1).await;
    let _login = login_mock(&mut server, 401, r#"{"error":"bad password"}"#, 1).await;

    let store = Arc::new(DotenvStore::new(&env_path));
    let manager = manager_for(&server, store);

    assert!(manager.get_authorization_header().await.is_none());
    assert_eq!(std::fs::read_to_string(&env_path).unwrap(), original);
}

#[tokio::test]
async fn test_login_with_partial_tokens_is_not_persisted() {
    let mut server = Server::new_async().await;
    let _profile = profile_mock(&mut server, "oldA", 401, 1).await;
    let _refresh = refresh_mock(&mut server, 401, "", 1).await;
    let _login = login_mock(&mut server, 200, r#"{"result":{"access_token":"onlyA"}}"#, 1).await;

    let store = Arc::new(MemoryStore::with_tokens(Some("oldA"), Some("oldR")));
    let manager = manager_for(&server, store.clone());

    assert!(manager.get_authorization_header().await.is_none());
    assert_eq!(store.save_count(), 0);
    assert_eq!(store.snapshot(), state("oldA", "oldR"));
}

#[tokio::test]
async fn test_transient_outage_falls_through_to_login() {
    // Profile endpoint answers 503: treated the same as a rejected token
    let mut server = Server::new_async().await;
    let _profile = profile_mock(&mut server, "goodA", 503, 1).await;
    let _refresh = refresh_mock(&mut server, 503, "", 1).await;
    let login = login_mock(
        &mut server,
        200,
        r#"{"result":{"access_token":"A9","refresh_token":"R9"}}"#,
        1,
    )
    .await;

    let store = Arc::new(MemoryStore::with_tokens(Some("goodA"), Some("goodR")));
    let header = manager_for(&server, store.clone())
        .get_authorization_header()
        .await
        .unwrap();

    assert_eq!(header.value(), "Bearer A9");
    login.assert_async().await;
}

#[tokio::test]
async fn test_repeated_passes_validate_once_each() {
    let mut server = Server::new_async().await;
    let profile = profile_mock(&mut server, "goodA", 200, 2).await;

    let store = Arc::new(MemoryStore::with_tokens(Some("goodA"), Some("goodR")));
    let manager = manager_for(&server, store.clone());

    let first = manager.get_authorization_header().await;
    let second = manager.get_authorization_header().await;

    assert!(first.is_some());
    assert_eq!(first, second);
    assert_eq!(store.save_count(), 0);
    profile.assert_async().await;
}

#[tokio::test]
async fn test_concurrent_passes_log_in_once() {
    let mut server = Server::new_async().await;
    // The first pass finds no token; the second sees the freshly persisted one
    let login = login_mock(
        &mut server,
        200,
        r#"{"result":{"access_token":"sharedA","refresh_token":"sharedR"}}"#,
        1,
    )
    .await;
    let profile = profile_mock(&mut server, "sharedA", 200, 1).await;

    let store = Arc::new(MemoryStore::new());
    let manager = Arc::new(manager_for(&server, store.clone()));

    let a = tokio::spawn({
        let manager = manager.clone();
        async move { manager.get_authorization_header().await }
    });
    let b = tokio::spawn({
        let manager = manager.clone();
        async move { manager.get_authorization_header().await }
    });

    let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
    assert_eq!(a, b);
    assert_eq!(a.value(), "Bearer sharedA");
    assert_eq!(store.save_count(), 1);

    login.assert_async().await;
    profile.assert_async().await;
}

#[tokio::test]
async fn test_missing_secrets_exhaust_lifecycle_as_configuration_error() {
    let mut server = Server::new_async().await;
    let login = server
        .mock("POST", "/auth/login")
        .expect(0)
        .create_async()
        .await;

    let manager = AuthManager::with_client(
        Credentials::new(server.url(), "", ""),
        Arc::new(MemoryStore::new()),
        Client::new(),
        AuditLogger::new(),
    );

    let err = manager.obtain_token().await.unwrap_err();
    assert!(matches!(err, AuthError::LifecycleExhausted { .. }));
    assert!(err.is_configuration());
    login.assert_async().await;
}

// ==================================================================================================
// Login Client Properties
// ==================================================================================================

#[test]
fn test_login_with_any_missing_field_never_hits_network() {
    let mut server = Server::new();
    let mock = server.mock("POST", "/auth/login").expect(0).create();
    let url = server.url();

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let client = LoginClient::new(Client::new(), AuditLogger::new());

    let fields = (any::<bool>(), any::<bool>(), any::<bool>())
        .prop_filter("at least one field missing", |(b, u, p)| !(*b && *u && *p));
    let strategy = (fields, "[a-z]{1,12}", "[ -~]{1,16}");

    let mut runner = TestRunner::default();
    runner
        .run(&strategy, |((has_base, has_user, has_pass), user, pass)| {
            let creds = Credentials::new(
                if has_base { url.clone() } else { String::new() },
                if has_user { user } else { String::new() },
                if has_pass { pass } else { String::new() },
            );
            let result = runtime.block_on(client.login(&creds));
            prop_assert!(matches!(result, Err(AuthError::Configuration(_))));
            Ok(())
        })
        .unwrap();

    mock.assert();
}
