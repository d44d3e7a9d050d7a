use std::sync::Arc;
use std::time::Duration;

use authkv::auth::session_key;
use authkv::infra::glob_match;
use authkv::{
    AccountService, AuthError, InMemoryUserDirectory, JwtService, KvStore, MemoryStore,
    ResetTokenManager, SessionManager, SessionStatus,
};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::json;

const SECRET: &str = "integration-secret-key-32-bytes!!";

struct Harness {
    store: MemoryStore,
    sessions: Arc<SessionManager>,
    resets: Arc<ResetTokenManager>,
}

fn harness() -> Harness {
    let store = MemoryStore::new("it:");
    let sessions = SessionManager::new(
        Arc::new(store.clone()),
        JwtService::new(SECRET, 1800),
        Duration::from_secs(1800),
    );
    let resets = ResetTokenManager::new(Arc::new(store.clone()), Duration::from_secs(600), 6);
    Harness {
        store,
        sessions: Arc::new(sessions),
        resets: Arc::new(resets),
    }
}

fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

#[tokio::test]
async fn test_single_session_per_identity() {
    let h = harness();

    h.sessions.issue_session("u1", "u1@example.com").await.unwrap();
    h.sessions.issue_session("u11", "u11@example.com").await.unwrap();
    h.sessions.issue_session("u1", "u1@example.com").await.unwrap();

    let keys = h
        .store
        .find_keys(&session_key::identity_pattern("u1"))
        .await
        .unwrap();
    assert_eq!(keys.len(), 1);

    // u1 的签发不影响 u11
    assert_eq!(h.sessions.list_sessions("u11").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_rotation_scenario() {
    let h = harness();

    let first = h.sessions.issue_session("u1", "u1@example.com").await.unwrap();
    assert_eq!(
        h.sessions
            .identity_from_refresh_token(&first.refresh_token)
            .await
            .unwrap(),
        "u1"
    );

    let second = h.sessions.refresh_session(&first.refresh_token).await.unwrap();
    assert_ne!(first.access_token, second.access_token);
    assert_ne!(first.refresh_token, second.refresh_token);

    // a1 签名仍然有效，但已不是当前会话
    let claims = h.sessions.validate_bearer(&bearer(&first.access_token)).unwrap();
    assert_eq!(claims.email, "u1@example.com");
    assert_eq!(
        h.sessions
            .session_status(&bearer(&first.access_token), "u1")
            .await
            .unwrap(),
        SessionStatus::Superseded
    );
    assert!(h.sessions.is_session_live(&bearer(&second.access_token), "u1").await);

    // r1 只能用一次
    assert!(matches!(
        h.sessions.refresh_session(&first.refresh_token).await,
        Err(AuthError::InvalidToken)
    ));
    assert!(matches!(
        h.sessions.identity_from_refresh_token(&first.refresh_token).await,
        Err(AuthError::InvalidToken)
    ));
}

#[tokio::test]
async fn test_revoked_session_is_not_live() {
    let h = harness();
    let tokens = h.sessions.issue_session("u1", "u1@example.com").await.unwrap();

    assert_eq!(h.sessions.revoke_by_identity("u1").await.unwrap(), 1);
    assert_eq!(
        h.sessions
            .session_status(&bearer(&tokens.access_token), "u1")
            .await
            .unwrap(),
        SessionStatus::NoSession
    );
    assert!(matches!(
        h.sessions.authenticate(&bearer(&tokens.access_token)).await,
        Err(AuthError::InvalidToken)
    ));
    assert!(matches!(
        h.sessions.refresh_session(&tokens.refresh_token).await,
        Err(AuthError::InvalidToken)
    ));
}

#[tokio::test]
async fn test_forged_and_expired_tokens() {
    let h = harness();
    let exp = Utc::now().timestamp() + 600;
    let claims = json!({"sub": "u1", "email": "u1@example.com", "exp": exp});

    let foreign = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(b"some-other-secret-entirely-here!!"),
    )
    .unwrap();
    assert!(matches!(
        h.sessions.validate_bearer(&bearer(&foreign)),
        Err(AuthError::InvalidToken)
    ));

    let expired = encode(
        &Header::new(Algorithm::HS256),
        &json!({"sub": "u1", "email": "u1@example.com", "exp": Utc::now().timestamp() - 10}),
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap();
    assert!(matches!(
        h.sessions.validate_bearer(&bearer(&expired)),
        Err(AuthError::ExpiredToken)
    ));

    assert!(matches!(
        h.sessions.validate_bearer(&foreign),
        Err(AuthError::InvalidToken)
    ));
}

#[tokio::test]
async fn test_concurrent_issue_leaves_one_live_or_ambiguous() {
    let h = harness();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let sessions = h.sessions.clone();
        handles.push(tokio::spawn(async move {
            sessions.issue_session("u1", "u1@example.com").await
        }));
    }
    let mut issued = Vec::new();
    for handle in handles {
        issued.push(handle.await.unwrap().unwrap());
    }

    let live = {
        let mut live = 0;
        for tokens in &issued {
            if h.sessions.is_session_live(&bearer(&tokens.access_token), "u1").await {
                live += 1;
            }
        }
        live
    };
    assert!(live <= 1);

    // 再签发一次会收拢所有残留条目
    let last = h.sessions.issue_session("u1", "u1@example.com").await.unwrap();
    assert_eq!(h.sessions.list_sessions("u1").await.unwrap().len(), 1);
    assert!(h.sessions.is_session_live(&bearer(&last.access_token), "u1").await);
}

#[tokio::test]
async fn test_session_entry_expires_with_ttl() {
    let store = MemoryStore::new("it:");
    let sessions = SessionManager::new(
        Arc::new(store.clone()),
        JwtService::new(SECRET, 1800),
        Duration::from_millis(40),
    );
    let tokens = sessions.issue_session("u1", "u1@example.com").await.unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert!(!sessions.is_session_live(&bearer(&tokens.access_token), "u1").await);
    assert!(matches!(
        sessions.refresh_session(&tokens.refresh_token).await,
        Err(AuthError::InvalidToken)
    ));
}

#[tokio::test]
async fn test_reset_code_lifecycle() {
    let h = harness();

    let code = h.resets.issue_reset_code("u1").await.unwrap();
    assert_eq!(code.len(), 6);
    assert_eq!(h.resets.redeem_reset_code(&code).await.unwrap(), "u1");

    // 重置码和会话条目互不干扰
    let keys = h.store.find_keys("*").await.unwrap();
    assert!(keys.iter().all(|k| !glob_match(&session_key::identity_pattern("u1"), k)));

    h.resets.delete_reset_code(&code).await.unwrap();
    assert!(matches!(
        h.resets.redeem_reset_code(&code).await,
        Err(AuthError::ResetTokenRetrieval(None))
    ));
}

#[tokio::test]
async fn test_account_flow_end_to_end() {
    let h = harness();
    let directory = InMemoryUserDirectory::with_cost(4);
    directory.insert("u1", "u1@example.com", "hunter22").unwrap();
    let accounts = AccountService::new(Arc::new(directory), h.sessions.clone(), h.resets.clone());

    let first = accounts.login("u1@example.com", "hunter22").await.unwrap();
    let second = accounts.refresh(&first.refresh_token).await.unwrap();
    assert!(accounts
        .sessions()
        .authenticate(&bearer(&second.access_token))
        .await
        .is_ok());

    let ticket = accounts.forgot_password("u1@example.com").await.unwrap();
    accounts.reset_password(&ticket.code, "correct-horse").await.unwrap();

    assert!(matches!(
        accounts.sessions().authenticate(&bearer(&second.access_token)).await,
        Err(AuthError::InvalidToken)
    ));
    assert!(matches!(
        accounts.reset_password(&ticket.code, "again").await,
        Err(AuthError::ResetTokenRetrieval(None))
    ));
    assert!(accounts.login("u1@example.com", "correct-horse").await.is_ok());
}

#[tokio::test]
async fn test_identity_with_session_marker_cannot_reach_other_user() {
    let h = harness();
    let directory = InMemoryUserDirectory::with_cost(4);
    directory.insert("u2", "victim@example.com", "victim-pw").unwrap();
    assert!(directory
        .insert("evil:jwt-clients--u2", "evil@example.com", "evil-pw")
        .is_err());
    let accounts = AccountService::new(Arc::new(directory), h.sessions.clone(), h.resets.clone());

    let victim = accounts.login("victim@example.com", "victim-pw").await.unwrap();

    // 绕过目录直接签发也不行
    assert!(matches!(
        h.sessions
            .issue_session("evil:jwt-clients--u2", "evil@example.com")
            .await,
        Err(AuthError::TokenGeneration(_))
    ));

    assert_eq!(
        h.sessions
            .session_status(&bearer(&victim.access_token), "u2")
            .await
            .unwrap(),
        SessionStatus::Live
    );
    let keys = h.store.find_keys("*").await.unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(
        h.sessions
            .identity_from_refresh_token(&victim.refresh_token)
            .await
            .unwrap(),
        "u2"
    );
}
