//! Transport primitives for outbound authenticated calls.
//!
//! [`HttpTransport`] is the crate's only dependency on an HTTP stack: a generic
//! "send(method, url, headers, body)" capability returning status + body bytes. The warden
//! attaches credentials and interprets statuses; transports stay policy-free. A
//! reqwest-backed implementation ships behind the `reqwest` feature.

// std
use std::{borrow::Cow, ops::Deref};
// crates.io
use serde::de::DeserializeOwned;
// self
use crate::_prelude::*;

/// Boxed future returned by [`HttpTransport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<TransportResponse, TransportFailure>> + 'a + Send>>;

/// HTTP methods the executor issues.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
	/// HTTP GET.
	Get,
	/// HTTP POST.
	Post,
	/// HTTP PUT.
	Put,
	/// HTTP PATCH.
	Patch,
	/// HTTP DELETE.
	Delete,
}
impl Method {
	/// Returns the canonical uppercase method name.
	pub const fn as_str(self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Post => "POST",
			Method::Put => "PUT",
			Method::Patch => "PATCH",
			Method::Delete => "DELETE",
		}
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outbound request handed to a transport after the warden finished credential handling.
#[derive(Clone, Debug)]
pub struct TransportRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute target URL.
	pub url: Url,
	/// Bearer credential to attach as `Authorization: Bearer <value>`, when present.
	pub bearer: Option<String>,
	/// Optional JSON body.
	pub body: Option<serde_json::Value>,
}
impl TransportRequest {
	/// Creates a bare request for the method + URL.
	pub fn new(method: Method, url: Url) -> Self {
		Self { method, url, bearer: None, body: None }
	}

	/// Attaches a JSON body.
	pub fn with_body(mut self, body: serde_json::Value) -> Self {
		self.body = Some(body);

		self
	}

	/// Attaches a bearer credential.
	pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
		self.bearer = Some(token.into());

		self
	}
}

/// Response surface exposed to callers: status plus raw body with JSON/text accessors.
#[derive(Clone, Debug)]
pub struct TransportResponse {
	/// HTTP status code.
	pub status: u16,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl TransportResponse {
	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Returns `true` for HTTP 401.
	pub fn is_unauthorized(&self) -> bool {
		self.status == 401
	}

	/// Deserializes the body as JSON, reporting the failing path on malformed payloads.
	pub fn json<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let mut deserializer = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut deserializer).map_err(|e| Error::Network {
			message: format!("malformed JSON response: {e}"),
			status: Some(self.status),
		})
	}

	/// Returns the body as (lossily decoded) text.
	pub fn text(&self) -> Cow<'_, str> {
		String::from_utf8_lossy(&self.body)
	}
}

/// Transport-level failure reaching the server (DNS, TCP, TLS, timeout).
#[derive(Clone, Debug, ThisError)]
#[error("{message}")]
pub struct TransportFailure {
	/// Transport-supplied failure summary.
	pub message: String,
}
impl TransportFailure {
	/// Wraps a transport-specific error.
	pub fn new(source: impl Display) -> Self {
		Self { message: source.to_string() }
	}
}
impl From<TransportFailure> for Error {
	fn from(failure: TransportFailure) -> Self {
		Self::Network { message: failure.message, status: None }
	}
}

/// Abstraction over HTTP transports capable of executing warden requests.
///
/// Implementations must be `Send + Sync` so one transport can serve the executor, the
/// refresh coordinator, and the housekeeper concurrently, and the futures they return must
/// be `Send` so callers can box them across executor hops.
pub trait HttpTransport
where
	Self: Send + Sync,
{
	/// Executes the request, resolving with the response status + body or a transport failure.
	fn send(&self, request: TransportRequest) -> TransportFuture<'_>;
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestTransport {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn send(&self, request: TransportRequest) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let method = match request.method {
				Method::Get => reqwest::Method::GET,
				Method::Post => reqwest::Method::POST,
				Method::Put => reqwest::Method::PUT,
				Method::Patch => reqwest::Method::PATCH,
				Method::Delete => reqwest::Method::DELETE,
			};
			let mut builder = client.request(method, request.url);

			if let Some(bearer) = request.bearer {
				builder = builder.bearer_auth(bearer);
			}
			if let Some(body) = request.body {
				builder = builder.json(&body);
			}

			let response = builder.send().await.map_err(TransportFailure::new)?;
			let status = response.status().as_u16();
			let body = response.bytes().await.map_err(TransportFailure::new)?.to_vec();

			Ok(TransportResponse { status, body })
		})
	}
}
