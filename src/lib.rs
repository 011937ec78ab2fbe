//! A small Rust client for the Field ID boundary registry API.
//!
//! The client authenticates with the OAuth2 client-credentials grant, caches
//! the bearer token until shortly before it expires, and issues registry
//! requests (field searches, boundaries, boundary references, boundary
//! registration) with the right content negotiation and TLS policy.
//!
//! ## Quick start
//! - Put `client_id` and `client_secret` (plus any overrides such as
//!   `base_url` or `token_url`) in a `fieldid.yaml` file, or point
//!   `FIELDID_CONFIG` at one.
//! - Call the operation you need and inspect the raw response.
//!
//! ```no_run
//! use fieldid::{Client, Configuration, DEFAULT_LIMIT};
//!
//! fn main() -> fieldid::Result<()> {
//!     let client = Client::new(Configuration::load()?)?;
//!     let resp = client.get_boundaries(
//!         &[("field_relationships.field_id", "a1b2c3")],
//!         DEFAULT_LIMIT,
//!         None,
//!     )?;
//!     println!("{}", resp.text()?);
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]

mod client;
mod config;
mod error;
mod token;
mod util;

pub use client::{Client, DEFAULT_LIMIT};
pub use config::{
    Configuration, ConfigurationBuilder, DEFAULT_AUDIENCE, DEFAULT_BASE_URL, DEFAULT_TOKEN_URL,
    REQUIRED_KEYS, TlsVerify,
};
pub use error::{ApiError, Error, Result};
pub use reqwest::Method;
pub use reqwest::blocking::Response;
pub use token::{Clock, SystemClock};
