//! Error types.
//!
//! Validation failures are not errors: they are returned as data by the
//! evaluator. The types here cover malformed input and bad configuration.

use thiserror::Error;

/// A request body that could not be decoded.
///
/// These indicate a broken test setup rather than a request worth
/// rejecting, so they are propagated instead of becoming a 400.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The body was declared as JSON but did not parse.
    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),

    /// A multipart part carried a file instead of a string value.
    #[error("formData: file field `{name}` not supported")]
    FileField { name: String },

    /// The multipart payload was malformed.
    #[error("invalid multipart body: {0}")]
    Multipart(#[from] multer::Error),

    /// A URL-encoded form body did not decode.
    #[error("invalid form body: {0}")]
    Form(#[from] serde_urlencoded::de::Error),

    /// Form fields could not be re-encoded.
    #[error("failed to encode form fields: {0}")]
    Encode(#[from] serde_urlencoded::ser::Error),

    /// Form body with a content type we cannot read.
    #[error("unsupported form content type: {0}")]
    ContentType(String),
}

/// Errors surfaced by the mock server.
#[derive(Debug, Error)]
pub enum MockError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("invalid request url `{url}`: {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// Problems in a handler configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("rule `{0}` does not start with params, headers, query, cookies or body")]
    UnknownSection(String),

    #[error("unknown method `{0}`")]
    UnknownMethod(String),

    #[error("invalid status code: {0}")]
    InvalidStatus(u16),

    #[error("invalid url pattern `{0}`")]
    InvalidPattern(String),
}
