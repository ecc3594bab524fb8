//! Server-side sessions carried by a signed cookie.
//!
//! A session maps an opaque token to the id of the logged-in user. The
//! token travels in a cookie as `<token>.<hex hmac-sha256>`, so a cookie
//! that was not issued by this process is rejected before any lookup.
//! Sessions idle for longer than the configured TTL are dropped.

use anyhow::Result;
use axum::http::{header, HeaderMap};
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use sha2::Sha256;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Token byte length before hex encoding (32 bytes = 64 hex chars).
const TOKEN_BYTES: usize = 32;

/// How often the background task sweeps idle sessions.
pub const SWEEP_INTERVAL_SECS: u64 = 300;

type HmacSha256 = Hmac<Sha256>;

/// Process-held session registry.
pub trait SessionStore: Send + Sync {
    /// Start a session for `user_id` and return its token.
    fn create(&self, user_id: &str) -> Result<String>;

    /// User id of a live session, refreshing its idle timer.
    fn user_id(&self, token: &str) -> Option<String>;

    /// End a session. Unknown tokens are not an error.
    fn destroy(&self, token: &str) -> Result<()>;

    /// Drop idle sessions, returning how many were removed.
    fn sweep_expired(&self) -> usize;
}

#[derive(Debug)]
struct SessionEntry {
    user_id: String,
    last_seen: Instant,
}

/// In-memory [`SessionStore`] with an idle timeout.
#[derive(Debug)]
pub struct MemorySessionStore {
    idle_ttl: Duration,
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl MemorySessionStore {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            idle_ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for MemorySessionStore {
    fn create(&self, user_id: &str) -> Result<String> {
        let token = generate_token();
        self.sessions.lock().insert(
            token.clone(),
            SessionEntry {
                user_id: user_id.to_owned(),
                last_seen: Instant::now(),
            },
        );
        Ok(token)
    }

    fn user_id(&self, token: &str) -> Option<String> {
        let mut sessions = self.sessions.lock();
        let entry = sessions.get_mut(token)?;
        if entry.last_seen.elapsed() >= self.idle_ttl {
            sessions.remove(token);
            return None;
        }
        entry.last_seen = Instant::now();
        Some(entry.user_id.clone())
    }

    fn destroy(&self, token: &str) -> Result<()> {
        self.sessions.lock().remove(token);
        Ok(())
    }

    fn sweep_expired(&self) -> usize {
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, entry| entry.last_seen.elapsed() < self.idle_ttl);
        before - sessions.len()
    }
}

/// Encodes and reads the session cookie.
#[derive(Clone)]
pub struct SessionCookie {
    name: String,
    mac: HmacSha256,
}

impl SessionCookie {
    pub fn new(name: &str, secret: &[u8]) -> Result<Self> {
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| anyhow::anyhow!("Invalid session secret: {e}"))?;
        Ok(Self {
            name: name.to_owned(),
            mac,
        })
    }

    fn signature(&self, token: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(token.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Cookie value for a token.
    pub fn sign(&self, token: &str) -> String {
        format!("{token}.{}", self.signature(token))
    }

    /// Token from a cookie value, if the signature checks out.
    pub fn verify(&self, value: &str) -> Option<String> {
        let (token, sig_hex) = value.rsplit_once('.')?;
        if token.is_empty() {
            return None;
        }
        let expected = hex::decode(sig_hex).ok()?;
        let mut mac = self.mac.clone();
        mac.update(token.as_bytes());
        // Constant-time comparison
        mac.verify_slice(&expected).ok()?;
        Some(token.to_owned())
    }

    /// Signed token carried by the request's `Cookie` headers, if any.
    pub fn token_from_headers(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find_map(|(name, value)| (name == self.name).then(|| self.verify(value)).flatten())
    }

    /// `Set-Cookie` value that installs a session.
    pub fn set_cookie(&self, token: &str) -> String {
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            self.name,
            self.sign(token)
        )
    }

    /// `Set-Cookie` value that removes the session cookie.
    pub fn clear_cookie(&self) -> String {
        format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", self.name)
    }
}

/// Generate a random session token (hex-encoded).
fn generate_token() -> String {
    let bytes: [u8; TOKEN_BYTES] = rand::random();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn cookie() -> SessionCookie {
        SessionCookie::new("sid", b"test-secret").unwrap()
    }

    #[test]
    fn create_and_resolve_session() {
        let store = MemorySessionStore::new(Duration::from_secs(60));
        let token = store.create("user-1").unwrap();
        assert_eq!(token.len(), TOKEN_BYTES * 2);
        assert_eq!(store.user_id(&token).as_deref(), Some("user-1"));
    }

    #[test]
    fn tokens_are_unique() {
        let store = MemorySessionStore::new(Duration::from_secs(60));
        let a = store.create("u").unwrap();
        let b = store.create("u").unwrap();
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn destroy_ends_session_and_tolerates_unknown_tokens() {
        let store = MemorySessionStore::new(Duration::from_secs(60));
        let token = store.create("user-1").unwrap();
        store.destroy(&token).unwrap();
        assert!(store.user_id(&token).is_none());
        store.destroy("never-issued").unwrap();
    }

    #[test]
    fn idle_sessions_expire() {
        let store = MemorySessionStore::new(Duration::ZERO);
        let token = store.create("user-1").unwrap();
        assert!(store.user_id(&token).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn sweep_removes_idle_sessions() {
        let store = MemorySessionStore::new(Duration::ZERO);
        store.create("a").unwrap();
        store.create("b").unwrap();
        assert_eq!(store.sweep_expired(), 2);
        assert!(store.is_empty());

        let live = MemorySessionStore::new(Duration::from_secs(60));
        live.create("a").unwrap();
        assert_eq!(live.sweep_expired(), 0);
        assert_eq!(live.len(), 1);
    }

    #[test]
    fn signed_value_verifies() {
        let cookie = cookie();
        let value = cookie.sign("abc123");
        assert_eq!(cookie.verify(&value).as_deref(), Some("abc123"));
    }

    #[test]
    fn tampered_value_is_rejected() {
        let cookie = cookie();
        let value = cookie.sign("abc123");
        let tampered = value.replacen("abc123", "abc124", 1);
        assert!(cookie.verify(&tampered).is_none());
        assert!(cookie.verify("abc123").is_none());
        assert!(cookie.verify("abc123.zz").is_none());
        assert!(cookie.verify(".deadbeef").is_none());
    }

    #[test]
    fn other_secret_is_rejected() {
        let value = cookie().sign("abc123");
        let other = SessionCookie::new("sid", b"another-secret").unwrap();
        assert!(other.verify(&value).is_none());
    }

    #[test]
    fn token_is_read_from_cookie_header() {
        let cookie = cookie();
        let mut headers = HeaderMap::new();
        let raw = format!("theme=dark; sid={}; lang=en", cookie.sign("tok"));
        headers.insert(header::COOKIE, HeaderValue::from_str(&raw).unwrap());
        assert_eq!(cookie.token_from_headers(&headers).as_deref(), Some("tok"));
    }

    #[test]
    fn stale_duplicate_cookie_does_not_hide_valid_one() {
        let cookie = cookie();
        let mut headers = HeaderMap::new();
        let raw = format!("sid=old.deadbeef; sid={}", cookie.sign("fresh"));
        headers.insert(header::COOKIE, HeaderValue::from_str(&raw).unwrap());
        assert_eq!(cookie.token_from_headers(&headers).as_deref(), Some("fresh"));
    }

    #[test]
    fn missing_cookie_yields_none() {
        let cookie = cookie();
        let mut headers = HeaderMap::new();
        assert!(cookie.token_from_headers(&headers).is_none());
        headers.insert(header::COOKIE, HeaderValue::from_static("other=1"));
        assert!(cookie.token_from_headers(&headers).is_none());
    }

    #[test]
    fn set_and_clear_cookie_attributes() {
        let cookie = cookie();
        let set = cookie.set_cookie("tok");
        assert!(set.starts_with("sid=tok."));
        assert!(set.contains("HttpOnly"));
        assert!(set.contains("SameSite=Lax"));
        assert!(cookie.clear_cookie().contains("Max-Age=0"));
    }
}
