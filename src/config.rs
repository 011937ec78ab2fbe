use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::util::with_trailing_slash;

pub const DEFAULT_BASE_URL: &str = "https://api.varda.ag/fid/v1/";
pub const DEFAULT_AUDIENCE: &str = "https://api.varda.ag/fid/";
pub const DEFAULT_TOKEN_URL: &str = "https://auth.varda.ag/oauth/token";

/// Keys that must be present and non-empty, checked in this order.
pub const REQUIRED_KEYS: [&str; 7] = [
    "base_url",
    "audience",
    "token_url",
    "client_id",
    "client_secret",
    "token_expiry_buffer",
    "timeout",
];

/// Server certificate verification policy.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TlsVerify {
    /// Verify against the system trust store.
    #[default]
    System,
    /// Accept any certificate.
    Skip,
    /// Verify against the PEM bundle at this path only.
    CaBundle(PathBuf),
}

/// Connection and credential parameters. Immutable once built.
#[derive(Debug, Clone)]
pub struct Configuration {
    base_url: String,
    audience: String,
    token_url: String,
    client_id: String,
    client_secret: String,
    token_expiry_buffer: u64,
    timeout: u64,
    tls_verify: TlsVerify,
    tls_ca_cert: Option<PathBuf>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            audience: DEFAULT_AUDIENCE.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            token_expiry_buffer: 10,
            timeout: 10,
            tls_verify: TlsVerify::System,
            tls_ca_cert: None,
        }
    }
}

impl Configuration {
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::default()
    }

    /// Builds a configuration from a loosely-typed key-value mapping.
    ///
    /// Every key in `mapping` overrides the corresponding default. Unknown keys
    /// and mistyped values are rejected; afterwards each of [`REQUIRED_KEYS`]
    /// must be present and non-empty (non-zero for the integer fields).
    pub fn from_mapping(mapping: &Map<String, Value>) -> Result<Self> {
        let mut c = Configuration::default();

        for (key, value) in mapping {
            match key.as_str() {
                "base_url" => c.base_url = string_value(key, value)?,
                "audience" => c.audience = string_value(key, value)?,
                "token_url" => c.token_url = string_value(key, value)?,
                "client_id" => c.client_id = string_value(key, value)?,
                "client_secret" => c.client_secret = string_value(key, value)?,
                "token_expiry_buffer" => c.token_expiry_buffer = seconds_value(key, value)?,
                "timeout" => c.timeout = seconds_value(key, value)?,
                "tls_verify" => {
                    c.tls_verify = match value {
                        Value::Bool(true) => TlsVerify::System,
                        Value::Bool(false) => TlsVerify::Skip,
                        Value::String(p) if !p.is_empty() => TlsVerify::CaBundle(PathBuf::from(p)),
                        _ => return Err(invalid(key, "expected a boolean or a CA bundle path")),
                    }
                }
                "tls_ca_cert" => {
                    c.tls_ca_cert = match value {
                        Value::Null => None,
                        Value::String(p) if p.is_empty() => None,
                        Value::String(p) => Some(PathBuf::from(p)),
                        _ => return Err(invalid(key, "expected a file path")),
                    }
                }
                _ => return Err(invalid(key, "unknown key")),
            }
        }

        c.validate()?;
        Ok(c)
    }

    /// Reads a flat `key: value` YAML file and validates it like [`Configuration::from_mapping`].
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_mapping(&parse_flat_yaml(&text))
    }

    /// Loads the first configuration file found in the search order:
    /// `$FIELDID_CONFIG`, `./fieldid.yaml`, `~/.fieldid.yaml`.
    pub fn load() -> Result<Self> {
        let candidates = config_candidates();
        for path in &candidates {
            if path.exists() {
                tracing::debug!(path = %path.display(), "loading configuration");
                return Self::from_file(path);
            }
        }

        Err(Error::InvalidConfig {
            key: "config_file".to_string(),
            reason: format!(
                "no configuration file found (looked in: {})",
                candidates
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        })
    }

    fn validate(&self) -> Result<()> {
        for key in REQUIRED_KEYS {
            let present = match key {
                "base_url" => !self.base_url.is_empty(),
                "audience" => !self.audience.is_empty(),
                "token_url" => !self.token_url.is_empty(),
                "client_id" => !self.client_id.is_empty(),
                "client_secret" => !self.client_secret.is_empty(),
                "token_expiry_buffer" => self.token_expiry_buffer != 0,
                "timeout" => self.timeout != 0,
                _ => true,
            };
            if !present {
                return Err(Error::MissingConfig { key });
            }
        }
        Ok(())
    }

    /// API root, always ending in `/`.
    pub fn base_url(&self) -> String {
        with_trailing_slash(&self.base_url)
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// Seconds shaved off each token lifetime so renewal happens early.
    pub fn token_expiry_buffer(&self) -> u64 {
        self.token_expiry_buffer
    }

    /// Per-request timeout in seconds.
    pub fn timeout(&self) -> u64 {
        self.timeout
    }

    pub fn tls_verify(&self) -> &TlsVerify {
        &self.tls_verify
    }

    pub fn tls_ca_cert(&self) -> Option<&Path> {
        self.tls_ca_cert.as_deref()
    }

    /// Effective verification policy.
    ///
    /// `tls_ca_cert` only applies while verification is on; with
    /// `tls_verify = false` it is ignored.
    pub fn tls_policy(&self) -> TlsVerify {
        match (&self.tls_verify, &self.tls_ca_cert) {
            (TlsVerify::Skip, _) => TlsVerify::Skip,
            (TlsVerify::CaBundle(p), _) => TlsVerify::CaBundle(p.clone()),
            (TlsVerify::System, Some(p)) => TlsVerify::CaBundle(p.clone()),
            (TlsVerify::System, None) => TlsVerify::System,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigurationBuilder {
    inner: Configuration,
}

impl ConfigurationBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.inner.base_url = url.into();
        self
    }

    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.inner.audience = audience.into();
        self
    }

    pub fn token_url(mut self, url: impl Into<String>) -> Self {
        self.inner.token_url = url.into();
        self
    }

    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.inner.client_id = id.into();
        self
    }

    pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
        self.inner.client_secret = secret.into();
        self
    }

    pub fn token_expiry_buffer(mut self, secs: u64) -> Self {
        self.inner.token_expiry_buffer = secs;
        self
    }

    pub fn timeout(mut self, secs: u64) -> Self {
        self.inner.timeout = secs;
        self
    }

    pub fn tls_verify(mut self, verify: TlsVerify) -> Self {
        self.inner.tls_verify = verify;
        self
    }

    pub fn tls_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.inner.tls_ca_cert = Some(path.into());
        self
    }

    /// Fails with [`Error::MissingConfig`] if a required field is empty.
    pub fn build(self) -> Result<Configuration> {
        self.inner.validate()?;
        Ok(self.inner)
    }
}

fn invalid(key: &str, reason: &str) -> Error {
    Error::InvalidConfig {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn string_value(key: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        _ => Err(invalid(key, "expected a string")),
    }
}

fn seconds_value(key: &str, value: &Value) -> Result<u64> {
    match value {
        Value::Null => Ok(0),
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| invalid(key, "expected a non-negative integer")),
        Value::String(s) if s.trim().is_empty() => Ok(0),
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| invalid(key, "expected a non-negative integer")),
        _ => Err(invalid(key, "expected a non-negative integer")),
    }
}

/// Parses the flat subset of YAML used by credential files: one `key: value`
/// per line, `#` comments, optional quotes. Only booleans and null are typed;
/// every other scalar is kept as a string.
pub(crate) fn parse_flat_yaml(text: &str) -> Map<String, Value> {
    let mut map = Map::new();

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line == "---" {
            continue;
        }

        if let Some((k, v)) = line.split_once(':') {
            let k = k.trim();
            if k.is_empty() {
                continue;
            }
            map.insert(k.to_string(), scalar(v.trim()));
        }
    }

    map
}

fn scalar(raw: &str) -> Value {
    let quoted = raw.len() >= 2
        && ((raw.starts_with('"') && raw.ends_with('"'))
            || (raw.starts_with('\'') && raw.ends_with('\'')));
    if quoted {
        return Value::String(raw[1..raw.len() - 1].to_string());
    }

    // Trailing comment on an unquoted scalar.
    let raw = match raw.find(" #") {
        Some(idx) => raw[..idx].trim_end(),
        None => raw,
    };

    match raw {
        "" | "~" | "null" => Value::Null,
        "true" | "True" | "yes" => Value::Bool(true),
        "false" | "False" | "no" => Value::Bool(false),
        // Digits stay text: credentials such as `0123456789` keep their leading zeros.
        _ => Value::String(raw.to_string()),
    }
}

fn config_candidates() -> Vec<PathBuf> {
    if let Ok(p) = std::env::var("FIELDID_CONFIG") {
        return vec![PathBuf::from(p)];
    }

    let mut v = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        v.push(cwd.join("fieldid.yaml"));
    }
    if let Some(home) = dirs::home_dir() {
        v.push(home.join(".fieldid.yaml"));
    }
    v
}
