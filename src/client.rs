use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Certificate, Method};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Configuration, TlsVerify};
use crate::error::{Error, Result};
use crate::token::{Clock, SystemClock, TokenManager};
use crate::util::{form_payload, is_json_content_type};

/// Page size used when a caller has no preference.
pub const DEFAULT_LIMIT: u32 = 5;

const GEOJSON: &str = "application/geo+json";

/// Authenticated client for the boundary registry.
///
/// Every operation blocks until the exchange (and any token refresh it
/// triggers) completes, and hands back the raw response for the caller to
/// inspect. Non-2xx registry responses are not errors at this layer.
pub struct Client {
    config: Configuration,
    tokens: TokenManager,
    http: HttpClient,
}

impl Client {
    /// Builds the HTTP stack from `config`: timeout and TLS policy are fixed here.
    pub fn new(config: Configuration) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("fieldid-rs/{}", env!("CARGO_PKG_VERSION")))
                .unwrap_or(HeaderValue::from_static("fieldid-rs")),
        );

        let mut builder = HttpClient::builder()
            .default_headers(default_headers)
            .timeout(Duration::from_secs(config.timeout()));

        match config.tls_policy() {
            TlsVerify::System => {}
            TlsVerify::Skip => {
                builder = builder.danger_accept_invalid_certs(true);
            }
            TlsVerify::CaBundle(path) => {
                let pem = std::fs::read(&path).map_err(|source| Error::Io {
                    path: path.clone(),
                    source,
                })?;
                let cert = Certificate::from_pem(&pem)?;
                builder = builder
                    .tls_built_in_root_certs(false)
                    .add_root_certificate(cert);
            }
        }

        let http = builder.build()?;

        Ok(Self {
            config,
            tokens: TokenManager::new(Arc::new(SystemClock)),
            http,
        })
    }

    /// Replaces the time source used for token expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.tokens.set_clock(clock);
        self
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// API root, always ending in `/`.
    pub fn base_url(&self) -> String {
        self.config.base_url()
    }

    /// Current bearer token, fetched from the token endpoint when absent or expired.
    pub fn access_token(&self) -> Result<String> {
        self.tokens.access_token(&self.http, &self.config)
    }

    /// Forgets the cached token; the next call fetches a new one.
    pub fn clear_token(&self) {
        self.tokens.clear();
    }

    /// Sends one authenticated request.
    ///
    /// `Authorization` is always replaced with the current bearer token. A body
    /// without a `Content-Type` header goes out as `application/json`; any
    /// content type mentioning "json" serializes the body as JSON, anything
    /// else sends it form-encoded. A `null` body is treated as no body.
    pub fn dispatch(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        params: &[(String, String)],
        mut headers: HeaderMap,
    ) -> Result<Response> {
        let token = self.access_token()?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| Error::malformed_token_response())?;
        headers.insert(AUTHORIZATION, bearer);

        tracing::debug!(%method, url, ?params, "dispatching request");

        let body = body.filter(|b| !b.is_null());
        if body.is_some() && !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        let mut req = self.http.request(method, url).query(params);

        if let Some(body) = body {
            let json = headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(is_json_content_type);
            req = if json {
                // `.json()` would set its own content type; keep the caller's.
                req.body(serde_json::to_vec(body)?)
            } else {
                req.body(form_payload(body))
            };
        }

        Ok(req.headers(headers).send()?)
    }

    /// `POST field-searches` with a GeoJSON geometry or feature.
    ///
    /// Only `limit` is sent; the search endpoint is not paged by offset.
    pub fn field_search(&self, payload: &Value, limit: u32) -> Result<Response> {
        let url = format!("{}field-searches", self.base_url());
        let params = vec![("limit".to_string(), limit.to_string())];

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(GEOJSON));

        self.dispatch(Method::POST, &url, Some(payload), &params, headers)
    }

    /// `GET boundaries` filtered by `args`. `offset` is sent only when non-zero.
    pub fn get_boundaries(
        &self,
        args: &[(&str, &str)],
        limit: u32,
        offset: Option<u32>,
    ) -> Result<Response> {
        self.list("boundaries", args, limit, offset)
    }

    /// `GET boundaries/{id}`. An empty id fails without touching the network.
    pub fn get_boundary(&self, boundary_id: &str) -> Result<Response> {
        if boundary_id.is_empty() {
            return Err(Error::InvalidArgument("Boundary ID is required"));
        }
        self.fetch_one("boundaries", boundary_id)
    }

    /// `GET boundary-references` filtered by `args`. `offset` is sent only when non-zero.
    pub fn get_boundary_references(
        &self,
        args: &[(&str, &str)],
        limit: u32,
        offset: Option<u32>,
    ) -> Result<Response> {
        self.list("boundary-references", args, limit, offset)
    }

    /// `GET boundary-references/{id}`. An empty id fails without touching the network.
    pub fn get_boundary_reference(&self, boundary_reference_id: &str) -> Result<Response> {
        if boundary_reference_id.is_empty() {
            return Err(Error::InvalidArgument("Boundary Reference ID is required"));
        }
        self.fetch_one("boundary-references", boundary_reference_id)
    }

    /// `POST boundaries`. With `dry_run` the registry only validates the payload.
    pub fn register_boundaries(&self, payload: &Value, dry_run: bool) -> Result<Response> {
        let url = format!("{}boundaries", self.base_url());

        let mut params = Vec::new();
        if dry_run {
            params.push(("dry_run".to_string(), "true".to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/geo+json, application/json"),
        );

        self.dispatch(Method::POST, &url, Some(payload), &params, headers)
    }

    fn list(
        &self,
        collection: &str,
        args: &[(&str, &str)],
        limit: u32,
        offset: Option<u32>,
    ) -> Result<Response> {
        let url = format!("{}{}", self.base_url(), collection);
        let params = page_params(args, limit, offset);
        self.dispatch(Method::GET, &url, None, &params, geojson_accept())
    }

    fn fetch_one(&self, collection: &str, id: &str) -> Result<Response> {
        let url = format!("{}{}/{}", self.base_url(), collection, id);
        self.dispatch(Method::GET, &url, None, &[], geojson_accept())
    }
}

fn geojson_accept() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(GEOJSON));
    headers
}

/// Caller args first, then `limit`, then `offset` when given and non-zero.
fn page_params(args: &[(&str, &str)], limit: u32, offset: Option<u32>) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = args
        .iter()
        .filter(|(k, _)| *k != "limit" && *k != "offset")
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    params.push(("limit".to_string(), limit.to_string()));
    if let Some(offset) = offset.filter(|o| *o != 0) {
        params.push(("offset".to_string(), offset.to_string()));
    }
    params
}
