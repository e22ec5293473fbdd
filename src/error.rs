//! Error types for the DSPAC client.

use thiserror::Error;

/// Errors raised by [`crate::dspac::DspacClient`].
///
/// Business failures (a response whose `Outcome` is not `"Success"`) are not
/// errors; they come back as ordinary JSON for the caller to inspect.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection, DNS, TLS or client-construction failure from reqwest
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The configured base URL could not be parsed
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// A configured value cannot be sent as a header
    #[error("Invalid header value: {0}")]
    InvalidHeader(String),

    /// The server answered with a body that is not JSON
    #[error("Failed to decode response (status {status}): {source}")]
    Decode {
        status: u16,
        #[source]
        source: serde_json::Error,
    },

    /// Writing the cookie file failed
    #[error("Failed to persist session: {0}")]
    Persist(#[from] std::io::Error),

    /// Serializing the cookie mapping failed
    #[error("Failed to encode session: {0}")]
    Encode(#[source] serde_json::Error),

    /// Validation succeeded but the priced order fields are missing
    #[error("Malformed validation response: {0}")]
    MalformedValidation(String),
}

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
