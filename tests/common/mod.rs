//! Shared fixtures: a wiremock server driven from its own tokio runtime so the
//! blocking client can be called from plain `#[test]` functions.

#![allow(dead_code)]

use fieldid::{Client, Clock, Configuration};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

pub const TOKEN_PATH: &str = "/oauth/token";

pub struct TestServer {
    // Dropped before the runtime.
    pub server: MockServer,
    rt: Runtime,
}

impl TestServer {
    pub fn start() -> Self {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .expect("tokio runtime");
        let server = rt.block_on(MockServer::start());
        Self { server, rt }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn mount(&self, mock: Mock) {
        self.rt.block_on(mock.mount(&self.server));
    }

    /// Token endpoint answering every request with `body`.
    pub fn mount_token(&self, body: Value) {
        self.mount(
            Mock::given(method("POST"))
                .and(path(TOKEN_PATH))
                .respond_with(ResponseTemplate::new(200).set_body_json(body)),
        );
    }

    pub fn requests(&self) -> Vec<Request> {
        self.rt
            .block_on(self.server.received_requests())
            .unwrap_or_default()
    }

    pub fn token_requests(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.url.path() == TOKEN_PATH)
            .count()
    }

    /// Requests other than token fetches.
    pub fn api_requests(&self) -> Vec<Request> {
        self.requests()
            .into_iter()
            .filter(|r| r.url.path() != TOKEN_PATH)
            .collect()
    }

    pub fn config(&self) -> Configuration {
        Configuration::builder()
            .base_url(format!("{}/fid/v1", self.uri()))
            .token_url(format!("{}{}", self.uri(), TOKEN_PATH))
            .client_id("client-abc")
            .client_secret("secret-xyz")
            .token_expiry_buffer(10)
            .timeout(5)
            .build()
            .expect("valid test configuration")
    }

    /// Client with a token endpoint that always issues `tok1`.
    pub fn client(&self) -> Client {
        self.mount_token(json!({"access_token": "tok1", "expires_in": 3600}));
        Client::new(self.config()).expect("client")
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        })
    }

    pub fn set(&self, secs: u64) {
        *self.offset.lock().unwrap() = Duration::from_secs(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock().unwrap()
    }
}

pub fn header<'a>(req: &'a Request, name: &str) -> Option<&'a str> {
    req.headers.get(name).and_then(|v| v.to_str().ok())
}
