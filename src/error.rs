//! Error types for upstream calls.
//!
//! Every message that could carry a request URL is scrubbed of the
//! `apiKey` query parameter before it is stored in the error.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FacetError>;

static API_KEY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"apiKey=[A-Za-z0-9\-]+").expect("valid regex"));

/// Replace any `apiKey=<secret>` occurrence with `apiKey=...`.
pub fn redact_api_key(text: &str) -> String {
    API_KEY_PATTERN.replace_all(text, "apiKey=...").into_owned()
}

#[derive(Debug, Error)]
pub enum FacetError {
    /// The upstream API answered with a non-2xx status.
    #[error("upstream {method} {url} not ok: status={status}, statusText={status_text}")]
    Upstream {
        method: String,
        status: u16,
        status_text: String,
        url: String,
    },

    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(String),

    /// The upstream body was not the JSON we expected.
    #[error("malformed response: {reason}, text={body}")]
    MalformedResponse { reason: String, body: String },

    #[error("API key not set: expected it in the {0} environment variable")]
    MissingApiKey(String),
}

impl FacetError {
    pub fn network(message: impl AsRef<str>) -> Self {
        FacetError::Network(redact_api_key(message.as_ref()))
    }

    pub fn malformed(reason: impl AsRef<str>, body: impl AsRef<str>) -> Self {
        FacetError::MalformedResponse {
            reason: redact_api_key(reason.as_ref()),
            body: redact_api_key(body.as_ref()),
        }
    }
}

impl From<reqwest::Error> for FacetError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FacetError::network(format!("request timed out: {}", err))
        } else if err.is_connect() {
            FacetError::network(format!("cannot connect: {}", err))
        } else {
            FacetError::network(err.to_string())
        }
    }
}
