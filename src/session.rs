use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use axum::http::HeaderMap;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::claims::{claim_types, find_claim, Claim};
use crate::config::SessionConfig;
use crate::cookies::RequestCookies;
use crate::error::{AuthError, Result};
use crate::handler::AuthenticationTicket;

/// Data stored in the server-side session store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub scheme: String,
    pub user_id: String,
    pub tenant_id: Option<String>,
    pub claims: Vec<Claim>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    /// Unix timestamp after which the session is dropped.
    pub expires_at: i64,
}

impl SessionData {
    pub fn from_ticket(ticket: &AuthenticationTicket, max_age_seconds: u64) -> Self {
        let now = chrono::Utc::now().timestamp();
        let max_age = i64::try_from(max_age_seconds).unwrap_or(i64::MAX);
        let lifetime = ticket.tokens.expires_in.unwrap_or(max_age).min(max_age);

        Self {
            scheme: ticket.scheme.clone(),
            user_id: find_claim(&ticket.claims, claim_types::USER_ID)
                .unwrap_or_default()
                .to_string(),
            tenant_id: find_claim(&ticket.claims, claim_types::TENANT_ID).map(str::to_string),
            claims: ticket.claims.clone(),
            access_token: ticket.tokens.access_token.clone(),
            refresh_token: ticket.tokens.refresh_token.clone(),
            id_token: ticket.tokens.id_token.clone(),
            expires_at: now.saturating_add(lifetime),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= chrono::Utc::now().timestamp()
    }
}

/// Server-side sessions keyed by an encrypted session-id cookie.
pub struct SessionManager {
    cipher: Aes256Gcm,
    store: Arc<RwLock<HashMap<String, SessionData>>>,
    cookie_name: String,
    cookie_domain: String,
    max_age_seconds: u64,
    secure: bool,
}

impl SessionManager {
    pub fn new(config: &SessionConfig) -> Result<Self> {
        if config.secret.len() < 32 {
            return Err(AuthError::ConfigurationError(
                "session secret must be at least 32 characters".to_string(),
            ));
        }
        if config.max_age_seconds == 0 {
            return Err(AuthError::ConfigurationError(
                "session max_age_seconds must be greater than zero".to_string(),
            ));
        }

        // Derive a 256-bit key from the secret using SHA-256
        let key_bytes = Sha256::digest(config.secret.as_bytes());
        let cipher = Aes256Gcm::new_from_slice(&key_bytes)
            .map_err(|e| AuthError::Session(format!("invalid session key: {}", e)))?;

        Ok(Self {
            cipher,
            store: Arc::new(RwLock::new(HashMap::new())),
            cookie_name: config.cookie_name.clone(),
            cookie_domain: config.cookie_domain.clone(),
            max_age_seconds: config.max_age_seconds,
            secure: config.secure,
        })
    }

    pub fn max_age_seconds(&self) -> u64 {
        self.max_age_seconds
    }

    /// Extract and decrypt the session ID from request cookies.
    pub fn extract_session_id(&self, headers: &HeaderMap) -> Option<String> {
        let cookies = RequestCookies::from_headers(headers);
        let encoded = cookies.get(&self.cookie_name)?;

        let payload = URL_SAFE_NO_PAD.decode(encoded).ok()?;
        if payload.len() < 12 {
            return None;
        }

        let (nonce_bytes, ciphertext) = payload.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self.cipher.decrypt(nonce, ciphertext).ok()?;
        String::from_utf8(plaintext).ok()
    }

    /// Live session for the request, if any. Expired sessions are removed.
    pub async fn current(&self, headers: &HeaderMap) -> Option<(String, SessionData)> {
        let session_id = self.extract_session_id(headers)?;
        let session = self.store.read().await.get(&session_id).cloned()?;
        if session.is_expired() {
            self.destroy_session(&session_id).await;
            return None;
        }
        Some((session_id, session))
    }

    /// Store the data and return a Set-Cookie header value.
    pub async fn create_session(&self, data: SessionData) -> Result<String> {
        let session_id = uuid::Uuid::new_v4().to_string();
        tracing::debug!("Created session {} for user {}", session_id, data.user_id);
        self.store.write().await.insert(session_id.clone(), data);
        self.encrypt_cookie(&session_id)
    }

    pub async fn destroy_session(&self, session_id: &str) {
        self.store.write().await.remove(session_id);
    }

    /// Set-Cookie header value that clears the session cookie.
    pub fn clear_cookie(&self) -> String {
        let cookie = format!(
            "{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0",
            self.cookie_name
        );
        self.with_attributes(cookie)
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    /// Drop expired sessions. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        purge(&self.store).await
    }

    /// Start a background task to periodically clean up expired sessions.
    /// Intervals below one second are raised to one second.
    pub fn start_cleanup_task(&self, interval_secs: u64) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let interval = cleanup_interval(interval_secs);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let removed = purge(&store).await;
                if removed > 0 {
                    tracing::debug!("Session cleanup: removed {} expired sessions", removed);
                }
            }
        })
    }

    fn encrypt_cookie(&self, session_id: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, session_id.as_bytes())
            .map_err(|e| AuthError::Session(format!("encrypt error: {}", e)))?;

        let mut payload = Vec::with_capacity(12 + ciphertext.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&ciphertext);
        let encoded = URL_SAFE_NO_PAD.encode(&payload);

        let cookie = format!(
            "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
            self.cookie_name, encoded, self.max_age_seconds
        );
        Ok(self.with_attributes(cookie))
    }

    fn with_attributes(&self, mut cookie: String) -> String {
        if self.secure {
            cookie.push_str("; Secure");
        }
        if !self.cookie_domain.is_empty() {
            cookie.push_str(&format!("; Domain={}", self.cookie_domain));
        }
        cookie
    }
}

fn cleanup_interval(interval_secs: u64) -> tokio::time::Duration {
    tokio::time::Duration::from_secs(interval_secs.max(1))
}

async fn purge(store: &RwLock<HashMap<String, SessionData>>) -> usize {
    let now = chrono::Utc::now().timestamp();
    let mut sessions = store.write().await;
    let before = sessions.len();
    sessions.retain(|_, s| s.expires_at > now);
    before - sessions.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::TokenResponse;
    use axum::http::header::COOKIE;
    use axum::http::HeaderValue;

    fn config() -> SessionConfig {
        SessionConfig {
            secret: "0123456789abcdef0123456789abcdef".to_string(),
            cookie_name: "tenant_oidc_session".to_string(),
            cookie_domain: String::new(),
            max_age_seconds: 3600,
            secure: true,
        }
    }

    fn data(expires_at: i64) -> SessionData {
        SessionData {
            scheme: "OpenIdConnect".to_string(),
            user_id: "u-1".to_string(),
            tenant_id: Some("acme".to_string()),
            claims: vec![Claim::new(claim_types::USER_ID, "u-1")],
            access_token: "at".to_string(),
            refresh_token: None,
            id_token: None,
            expires_at,
        }
    }

    fn headers_for(set_cookie: &str) -> HeaderMap {
        let pair = set_cookie.split(';').next().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(&format!("__tenant=acme; {}", pair)).unwrap());
        headers
    }

    #[test]
    fn test_short_secret_rejected() {
        let mut cfg = config();
        cfg.secret = "short".to_string();
        assert!(SessionManager::new(&cfg).is_err());
    }

    #[tokio::test]
    async fn test_session_cookie_resolves_session() {
        let manager = SessionManager::new(&config()).unwrap();
        let expires = chrono::Utc::now().timestamp() + 600;
        let set_cookie = manager.create_session(data(expires)).await.unwrap();

        assert!(set_cookie.contains("HttpOnly"));
        assert!(set_cookie.ends_with("; Secure"));

        let (_, session) = manager.current(&headers_for(&set_cookie)).await.unwrap();
        assert_eq!(session.tenant_id.as_deref(), Some("acme"));
    }

    #[tokio::test]
    async fn test_session_cookie_in_later_cookie_header() {
        let manager = SessionManager::new(&config()).unwrap();
        let expires = chrono::Utc::now().timestamp() + 600;
        let set_cookie = manager.create_session(data(expires)).await.unwrap();
        let pair = set_cookie.split(';').next().unwrap();

        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("__tenant=x"));
        headers.append(COOKIE, HeaderValue::from_str(pair).unwrap());

        let (_, session) = manager.current(&headers).await.unwrap();
        assert_eq!(session.user_id, "u-1");
    }

    #[test]
    fn test_zero_max_age_rejected() {
        let mut cfg = config();
        cfg.max_age_seconds = 0;
        assert!(matches!(
            SessionManager::new(&cfg),
            Err(AuthError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_large_max_age_does_not_wrap() {
        let ticket = AuthenticationTicket {
            scheme: "OpenIdConnect".to_string(),
            claims: vec![Claim::new(claim_types::USER_ID, "u-1")],
            tokens: TokenResponse {
                access_token: "at".to_string(),
                refresh_token: None,
                id_token: None,
                token_type: "Bearer".to_string(),
                expires_in: None,
            },
            redirect_url: "/".to_string(),
        };

        let session = SessionData::from_ticket(&ticket, u64::MAX);
        assert!(!session.is_expired());
        assert_eq!(session.expires_at, i64::MAX);

        let mut short = ticket.clone();
        short.tokens.expires_in = Some(60);
        let session = SessionData::from_ticket(&short, u64::MAX);
        assert!(session.expires_at <= chrono::Utc::now().timestamp() + 60);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_with_zero_interval() {
        assert_eq!(cleanup_interval(0), tokio::time::Duration::from_secs(1));

        let manager = SessionManager::new(&config()).unwrap();
        let now = chrono::Utc::now().timestamp();
        manager.create_session(data(now - 1)).await.unwrap();

        let task = manager.start_cleanup_task(0);
        tokio::time::sleep(tokio::time::Duration::from_millis(1500)).await;
        assert_eq!(manager.len().await, 0);
        task.abort();
    }

    #[tokio::test]
    async fn test_tampered_cookie_ignored() {
        let manager = SessionManager::new(&config()).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("tenant_oidc_session=AAAAAAAAAAAAAAAAAAAAAAAA"));
        assert!(manager.extract_session_id(&headers).is_none());
    }

    #[tokio::test]
    async fn test_expired_sessions_purged() {
        let manager = SessionManager::new(&config()).unwrap();
        let now = chrono::Utc::now().timestamp();
        let expired = manager.create_session(data(now - 1)).await.unwrap();
        manager.create_session(data(now + 600)).await.unwrap();

        assert!(manager.current(&headers_for(&expired)).await.is_none());
        assert_eq!(manager.len().await, 1);
        assert_eq!(manager.purge_expired().await, 0);
    }
}
