use std::fmt;
use std::path::PathBuf;

use reqwest::blocking::Response;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required configuration key is absent, empty or zero.
    #[error("{key} is required in configuration")]
    MissingConfig { key: &'static str },

    /// A configuration key is unknown or carries a value of the wrong type.
    #[error("invalid configuration key `{key}`: {reason}")]
    InvalidConfig { key: String, reason: String },

    /// A required argument was empty; raised before any network call.
    #[error("{0}")]
    InvalidArgument(&'static str),

    /// Structured API failure, e.g. a malformed token response.
    #[error("{0}")]
    Api(ApiError),

    /// Transport failure: non-2xx token status, timeout, connection or TLS error.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("failed to encode request body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn malformed_token_response() -> Self {
        Error::Api(ApiError::new(401, "Malformed token response"))
    }

    /// HTTP status attached to this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api(e) => e.status,
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<ApiError> for Error {
    fn from(e: ApiError) -> Self {
        Error::Api(e)
    }
}

/// Status, reason, body and headers of a failed API exchange.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ApiError {
    pub status: Option<u16>,
    pub reason: String,
    pub body: Option<String>,
    pub headers: Option<Vec<(String, String)>>,
}

impl ApiError {
    pub fn new(status: u16, reason: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            reason: reason.into(),
            body: None,
            headers: None,
        }
    }

    /// Captures a raw response. The body is read, so the response is consumed.
    pub fn from_response(resp: Response) -> Self {
        let status = resp.status();
        let headers = resp
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = resp.text().unwrap_or_default();

        Self {
            status: Some(status.as_u16()),
            reason: status.canonical_reason().unwrap_or("").to_string(),
            body: Some(body),
            headers: Some(headers),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => writeln!(f, "({})", status)?,
            None => writeln!(f, "(none)")?,
        }
        writeln!(f, "Reason: {}", self.reason)?;

        if let Some(headers) = self.headers.as_ref().filter(|h| !h.is_empty()) {
            let rendered = headers
                .iter()
                .map(|(k, v)| format!("{}: {}", k, v))
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(f, "HTTP response headers: {{{}}}", rendered)?;
        }

        if let Some(body) = self.body.as_deref().filter(|b| !b.is_empty()) {
            writeln!(f, "HTTP response body: {}", body)?;
        }

        Ok(())
    }
}

impl std::error::Error for ApiError {}
