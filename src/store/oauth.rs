//! OAuth2 access tokens for a Google service account.
//!
//! Signs an RS256 JWT assertion with the account's private key and trades it
//! at the token endpoint (JWT bearer grant). The token is cached until shortly
//! before it expires.

use anyhow::{Context, Result};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use ring::rand::SystemRandom;
use ring::signature::{RsaKeyPair, RSA_PKCS1_SHA256};
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

/// Google's OAuth2 token endpoint, used when the key file names none.
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Scope granting Firestore read/write.
pub const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime requested for each signed assertion (Google's maximum).
const ASSERTION_LIFETIME_SECS: u64 = 3600;

/// Refresh this long before the token endpoint's stated expiry.
const REFRESH_MARGIN_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    ASSERTION_LIFETIME_SECS
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Access-token source backed by a service account key.
pub struct ServiceAccountTokenSource {
    http: reqwest::Client,
    client_email: String,
    token_uri: String,
    key_pair: RsaKeyPair,
    rng: SystemRandom,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountTokenSource {
    /// `private_key_pem` is the PKCS#8 PEM block from the key file.
    pub fn new(
        http: reqwest::Client,
        client_email: &str,
        private_key_pem: &str,
        token_uri: &str,
    ) -> Result<Self> {
        let der = pem_to_der(private_key_pem)?;
        let key_pair = RsaKeyPair::from_pkcs8(&der)
            .map_err(|e| anyhow::anyhow!("Invalid service account private key: {e}"))?;
        Ok(Self {
            http,
            client_email: client_email.to_string(),
            token_uri: token_uri.to_string(),
            key_pair,
            rng: SystemRandom::new(),
            cached: Mutex::new(None),
        })
    }

    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    /// Current access token, exchanging a fresh assertion when the cached one
    /// is missing or about to expire.
    pub async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(ref token) = *cached {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let assertion = self.assertion()?;
        let resp = self
            .http
            .post(&self.token_uri)
            .form(&[
                ("grant_type", JWT_BEARER_GRANT),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .context("Token exchange request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Token exchange failed ({status}): {body}");
        }

        let token: TokenResponse = resp
            .json()
            .await
            .context("Token endpoint returned invalid JSON")?;

        let lifetime = token.expires_in.saturating_sub(REFRESH_MARGIN_SECS);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + Duration::from_secs(lifetime),
        });
        tracing::debug!(
            client_email = %self.client_email,
            expires_in = token.expires_in,
            "Fetched service account access token"
        );
        Ok(token.access_token)
    }

    /// Signed `header.claims.signature` JWT for the token endpoint.
    fn assertion(&self) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("System clock is before the Unix epoch")?
            .as_secs();

        let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&json!({
            "alg": "RS256",
            "typ": "JWT",
        }))?);
        let claims = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&json!({
            "iss": self.client_email,
            "scope": DATASTORE_SCOPE,
            "aud": self.token_uri,
            "iat": now,
            "exp": now + ASSERTION_LIFETIME_SECS,
        }))?);

        let signing_input = format!("{header}.{claims}");
        let mut signature = vec![0u8; self.key_pair.public().modulus_len()];
        self.key_pair
            .sign(
                &RSA_PKCS1_SHA256,
                &self.rng,
                signing_input.as_bytes(),
                &mut signature,
            )
            .map_err(|_| anyhow::anyhow!("Failed to sign token assertion"))?;

        Ok(format!(
            "{signing_input}.{}",
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }
}

/// Body of a PEM block, base64-decoded.
fn pem_to_der(pem: &str) -> Result<Vec<u8>> {
    let body: String = pem
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("-----"))
        .collect();
    STANDARD
        .decode(body)
        .context("Service account private key is not valid PEM")
}
