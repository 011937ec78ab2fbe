//! Bearer token cache for the client-credentials grant.

use reqwest::blocking::Client as HttpClient;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderValue};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::config::Configuration;
use crate::error::{Error, Result};
use crate::util::parse_expires_in;

/// Upper bound for a cached token's lifetime; larger `expires_in` values are clamped.
const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Source of the current instant for token expiry decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    /// Already reduced by the configured expiry buffer.
    expires_at: Instant,
}

pub(crate) struct TokenManager {
    cached: Mutex<Option<CachedToken>>,
    clock: Arc<dyn Clock>,
}

impl TokenManager {
    pub(crate) fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            cached: Mutex::new(None),
            clock,
        }
    }

    pub(crate) fn set_clock(&mut self, clock: Arc<dyn Clock>) {
        self.clock = clock;
    }

    /// Returns the cached token while it is still valid, otherwise fetches a
    /// new one. The lock is held across check and refresh.
    pub(crate) fn access_token(&self, http: &HttpClient, config: &Configuration) -> Result<String> {
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(c) = cached.as_ref() {
            if self.clock.now() < c.expires_at {
                return Ok(c.token.clone());
            }
        }

        let fresh = self.fetch(http, config)?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    pub(crate) fn clear(&self) {
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn fetch(&self, http: &HttpClient, config: &Configuration) -> Result<CachedToken> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", config.client_id()),
            ("client_secret", config.client_secret()),
            ("audience", config.audience()),
        ];
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(form)
            .finish();

        tracing::info!(
            token_url = config.token_url(),
            client_id = config.client_id(),
            "fetching access token"
        );

        let start = self.clock.now();
        let resp = http
            .post(config.token_url())
            .header(
                CONTENT_TYPE,
                HeaderValue::from_static("application/x-www-form-urlencoded"),
            )
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .body(body)
            .send()?
            .error_for_status()?;

        let text = resp.text()?;
        let data: Value =
            serde_json::from_str(&text).map_err(|_| Error::malformed_token_response())?;

        let token = data
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(Error::malformed_token_response)?;
        let expires_in = data
            .get("expires_in")
            .and_then(parse_expires_in)
            .ok_or_else(Error::malformed_token_response)?;

        let lifetime = expires_in.saturating_sub_unsigned(config.token_expiry_buffer());
        let expires_at = expiry_after(start, lifetime);

        tracing::debug!(expires_in, "access token refreshed");

        Ok(CachedToken {
            token: token.to_string(),
            expires_at,
        })
    }
}

/// `start + lifetime` seconds, clamped to [`MAX_TOKEN_LIFETIME`]; never panics.
fn expiry_after(start: Instant, lifetime_secs: i64) -> Instant {
    if lifetime_secs <= 0 {
        return start;
    }
    let lifetime = Duration::from_secs(lifetime_secs as u64).min(MAX_TOKEN_LIFETIME);
    start.checked_add(lifetime).unwrap_or(start)
}
