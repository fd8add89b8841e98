//! Client-side authentication token lifecycle manager—JWT-shape validation, single-flight
//! refresh coordination, and retry-once request execution in one crate.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod config;
pub mod error;
pub mod executor;
pub mod housekeeper;
pub mod http;
pub mod obs;
pub mod refresh;
pub mod session;
pub mod store;
pub mod token;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and fixtures for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// crates.io
	use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
	use serde_json::json;
	// self
	#[cfg(feature = "reqwest")]
	use crate::{
		config::WardenConfig,
		executor::Warden,
		http::{HttpTransport, ReqwestTransport},
		store::memory::MemoryBackend,
	};

	/// Encodes a structurally valid JWT with the provided `iat`/`exp` claims (epoch seconds).
	///
	/// The signature segment carries no cryptographic meaning; the warden defers signature
	/// verification to the server and only checks token shape.
	pub fn encode_jwt(iat: i64, exp: i64) -> String {
		let header = URL_SAFE_NO_PAD.encode(json!({ "typ": "JWT", "alg": "HS256" }).to_string());
		let payload = URL_SAFE_NO_PAD.encode(json!({ "iat": iat, "exp": exp }).to_string());

		format!("{header}.{payload}.c2lnbmF0dXJl")
	}

	/// Encodes a JWT issued a minute ago that stays valid for `ttl_secs` seconds.
	pub fn fresh_jwt(ttl_secs: i64) -> String {
		let now = OffsetDateTime::now_utc().unix_timestamp();

		encode_jwt(now - 60, now + ttl_secs)
	}

	/// Encodes a JWT that expired `ago_secs` seconds before now.
	pub fn expired_jwt(ago_secs: i64) -> String {
		let now = OffsetDateTime::now_utc().unix_timestamp();

		encode_jwt(now - 3_600, now - ago_secs)
	}

	/// Builds a reqwest transport that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	#[cfg(feature = "reqwest")]
	pub fn test_reqwest_transport() -> ReqwestTransport {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestTransport::with_client(client)
	}

	/// Constructs a [`Warden`] backed by an in-memory store and the reqwest transport used
	/// across integration tests.
	#[cfg(feature = "reqwest")]
	pub fn build_reqwest_test_warden(config: WardenConfig) -> (Warden, Arc<MemoryBackend>) {
		let backend = Arc::new(MemoryBackend::default());
		let transport: Arc<dyn HttpTransport> = Arc::new(test_reqwest_transport());
		let warden = Warden::new(config, backend.clone(), transport)
			.expect("Warden configuration fixture should be valid.");

		(warden, backend)
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")] pub use reqwest::Client as ReqwestClient;
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use httpmock as _;
// The self dev-dependency only exists to hand the `test` feature to integration tests.
#[cfg(test)] use token_warden as _;
