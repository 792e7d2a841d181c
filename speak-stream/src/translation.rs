//! Translation collaborators.
//!
//! [`HttpTranslator`] talks to a LibreTranslate-compatible service. Long
//! input is split on line boundaries into batches of bounded size (see
//! [`split_for_translation`]) and the translated batches are concatenated.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::TranslationError;
use crate::settings::DEFAULT_MAX_TRANSLATE_CHARS;
use crate::traits::Translator;

/// Request timeout used when none is configured.
pub const DEFAULT_TRANSLATE_TIMEOUT: Duration = Duration::from_secs(30);

/// Split `text` into batches of at most `max_chars` characters.
///
/// Lines are kept whole together with their terminators, so the batches
/// concatenate back to `text`. A single line longer than `max_chars` becomes
/// its own batch.
///
/// ## Examples
///
/// ```
/// use speak_stream::translation::split_for_translation;
///
/// let batches = split_for_translation("one\ntwo\nthree\n", 8);
/// assert_eq!(batches, ["one\ntwo\n", "three\n"]);
/// ```
pub fn split_for_translation(text: &str, max_chars: usize) -> Vec<&str> {
    let mut batches = Vec::new();
    let mut start = 0;
    let mut end = 0;
    let mut batch_chars = 0;

    for line in text.split_inclusive('\n') {
        let line_chars = line.chars().count();
        if batch_chars > 0 && batch_chars + line_chars > max_chars {
            batches.push(&text[start..end]);
            start = end;
            batch_chars = 0;
        }
        end += line.len();
        batch_chars += line_chars;
    }
    if end > start {
        batches.push(&text[start..end]);
    }
    batches
}

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateResponse {
    translated_text: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// [`Translator`] backed by a LibreTranslate-compatible HTTP API.
///
/// Sends `POST {endpoint}/translate` with `{q, source: "auto", target,
/// format: "text"}` and reads `{translatedText}` back.
#[derive(Debug, Clone)]
pub struct HttpTranslator {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    max_batch_chars: usize,
}

impl HttpTranslator {
    /// ## Errors
    ///
    /// Returns [`TranslationError::Http`] if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, TranslationError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| TranslationError::Http { source })?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: None,
            max_batch_chars: DEFAULT_MAX_TRANSLATE_CHARS,
        })
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    /// A zero limit is treated as one.
    #[must_use]
    pub fn with_max_batch_chars(mut self, max: usize) -> Self {
        self.max_batch_chars = max.max(1);
        self
    }

    async fn translate_batch(&self, batch: &str, target_language: &str) -> Result<String, TranslationError> {
        let url = format!("{}/translate", self.endpoint);
        let body = TranslateRequest {
            q: batch,
            source: "auto",
            target: target_language,
            format: "text",
            api_key: self.api_key.as_deref(),
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|source| TranslationError::Http { source })?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|source| TranslationError::Http { source })?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&text)
                .map(|e| e.error)
                .unwrap_or(text);
            warn!(status = status.as_u16(), error = %message, "Translation provider rejected request");
            return Err(TranslationError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: TranslateResponse =
            serde_json::from_str(&text).map_err(|e| TranslationError::MalformedResponse {
                reason: e.to_string(),
            })?;
        Ok(parsed.translated_text)
    }
}

impl Translator for HttpTranslator {
    async fn translate(&self, text: &str, target_language: &str) -> Result<String, TranslationError> {
        let batches = split_for_translation(text, self.max_batch_chars);
        debug!(
            endpoint = %self.endpoint,
            target_language,
            batches = batches.len(),
            "Translating text"
        );

        let mut translated = String::with_capacity(text.len());
        for batch in batches {
            if batch.trim().is_empty() {
                translated.push_str(batch);
                continue;
            }
            translated.push_str(&self.translate_batch(batch, target_language).await?);
        }
        Ok(translated)
    }
}

// ============================================================================
// Tests
// ============================================================================
