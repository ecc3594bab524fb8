//! Machine translation through the Google Cloud Translation v2 REST API.
//!
//! [`Translator`] is the seam handlers depend on; [`GoogleTranslator`] is the
//! HTTP implementation. [`translate_or_fallback`] wraps a translator in the
//! bounded retry used by the translate page: a fixed number of back-to-back
//! attempts, then a fixed user-facing message.

pub mod retry;

use crate::config::TranslateConfig;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Message shown when every attempt failed.
pub const TRANSLATION_FAILED_MESSAGE: &str = "Error translating text. Please try again later.";

/// Maximum length for error response bodies in error messages.
const MAX_ERROR_BODY_LENGTH: usize = 500;

#[derive(Error, Debug)]
pub enum TranslateError {
    #[error("Translation API key is not configured")]
    MissingApiKey,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected response structure: {0}")]
    InvalidResponse(String),
}

impl TranslateError {
    fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let body = if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        };
        Self::Status {
            status: status.as_u16(),
            body,
        }
    }
}

#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` into the language identified by `target` (e.g. `"fr"`).
    async fn translate(&self, text: &str, target: &str) -> Result<String, TranslateError>;
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    data: TranslateData,
}

#[derive(Debug, Deserialize)]
struct TranslateData {
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
struct Translation {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

/// Google Cloud Translation v2 client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct GoogleTranslator {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl GoogleTranslator {
    pub fn new(endpoint: &str, api_key: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            api_key,
        })
    }

    pub fn from_config(config: &TranslateConfig) -> anyhow::Result<Self> {
        if config.api_key.is_none() {
            tracing::warn!("GOOGLE_API_KEY is not set, translation requests will fail");
        }
        Self::new(
            &config.endpoint,
            config.api_key.clone(),
            Duration::from_secs(config.timeout_secs.max(1)),
        )
    }
}

#[async_trait]
impl Translator for GoogleTranslator {
    async fn translate(&self, text: &str, target: &str) -> Result<String, TranslateError> {
        let api_key = self.api_key.as_deref().ok_or(TranslateError::MissingApiKey)?;

        let response = self
            .http
            .post(&self.endpoint)
            .query(&[("key", api_key)])
            .json(&serde_json::json!({
                "q": text,
                "target": target,
                "format": "text",
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TranslateError::from_status(status, &body));
        }

        let body = response.text().await?;
        let parsed: TranslateResponse = serde_json::from_str(&body)
            .map_err(|e| TranslateError::InvalidResponse(e.to_string()))?;
        parsed
            .data
            .translations
            .into_iter()
            .next()
            .map(|t| t.translated_text)
            .ok_or_else(|| TranslateError::InvalidResponse("empty translations array".into()))
    }
}

/// Translate with up to `max_attempts` tries, falling back to
/// [`TRANSLATION_FAILED_MESSAGE`] once they are used up.
pub async fn translate_or_fallback(
    translator: &dyn Translator,
    text: &str,
    target: &str,
    max_attempts: u32,
) -> String {
    let result = retry::retry(
        max_attempts,
        |_| translator.translate(text, target),
        |attempt, max, error| {
            tracing::warn!(attempt, max, %error, "Error translating text");
        },
    )
    .await;

    match result {
        Ok(translation) => translation,
        Err(exhausted) => {
            tracing::error!(
                attempts = exhausted.attempts(),
                last_error = %exhausted.last().map(ToString::to_string).unwrap_or_default(),
                "Translation failed after all attempts"
            );
            TRANSLATION_FAILED_MESSAGE.to_string()
        }
    }
}
