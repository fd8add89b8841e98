//! Authenticated request execution with transparent refresh-and-retry.
//!
//! [`Warden`] is the crate's front door. Every outbound request passes through one pipeline:
//! sweep expired tokens, enforce the transport policy, resolve credentials (refreshing
//! through the coordinator when the stored access token is spent), send, and—on a 401 from
//! an authenticated endpoint—refresh and resend exactly once. A second 401 is terminal: the
//! stored pair is cleared and the caller must re-authenticate.

// self
use crate::{
	_prelude::*,
	config::{Endpoints, TransportPolicy, WardenConfig, WardenConfigError},
	housekeeper::Housekeeper,
	http::{HttpTransport, Method, TransportRequest, TransportResponse},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	refresh::RefreshCoordinator,
	session::SessionResponse,
	store::{StorageBackend, TokenStore},
	token::TokenValidator,
};

/// A request accepted by [`Warden::execute`], with an optional overall deadline.
#[derive(Clone, Debug)]
pub struct ExecutorRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute target URL.
	pub url: Url,
	/// Optional JSON body.
	pub body: Option<serde_json::Value>,
	/// Overall deadline covering credential resolution, the send, and any retry.
	pub deadline: Option<std::time::Duration>,
}
impl ExecutorRequest {
	/// Creates a bare request for the method + URL.
	pub fn new(method: Method, url: Url) -> Self {
		Self { method, url, body: None, deadline: None }
	}

	/// Attaches a JSON body.
	pub fn with_body(mut self, body: serde_json::Value) -> Self {
		self.body = Some(body);

		self
	}

	/// Bounds the whole execution, refresh and retry included.
	pub fn with_deadline(mut self, deadline: std::time::Duration) -> Self {
		self.deadline = Some(deadline);

		self
	}
}

/// Token lifecycle manager executing authenticated requests.
///
/// Cloning is cheap; all clones share the same store, coordinator, and housekeeper, so
/// refresh single-flighting holds across every handle in the process.
#[derive(Clone)]
pub struct Warden {
	store: TokenStore,
	validator: TokenValidator,
	coordinator: RefreshCoordinator,
	housekeeper: Housekeeper,
	transport: Arc<dyn HttpTransport>,
	policy: TransportPolicy,
	endpoints: Endpoints,
}
impl Warden {
	/// Builds a warden over the provided storage backend and transport.
	///
	/// The configuration is validated up front so misconfigurations fail at construction
	/// instead of on the first request.
	pub fn new(
		config: WardenConfig,
		backend: Arc<dyn StorageBackend>,
		transport: Arc<dyn HttpTransport>,
	) -> Result<Self, WardenConfigError> {
		config.validate()?;

		let store = TokenStore::new(backend, config.default_ttl);
		let coordinator = RefreshCoordinator::new(
			store.clone(),
			transport.clone(),
			config.endpoints.refresh.clone(),
			config.refresh,
		);
		let housekeeper = Housekeeper::new(
			store.clone(),
			coordinator.clone(),
			config.preemptive_buffer,
			config.sweep_interval,
		);

		Ok(Self {
			store,
			validator: config.validator,
			coordinator,
			housekeeper,
			transport,
			policy: config.transport,
			endpoints: config.endpoints,
		})
	}

	/// Builds a warden backed by a default [`ReqwestTransport`](crate::http::ReqwestTransport).
	#[cfg(feature = "reqwest")]
	pub fn with_reqwest(
		config: WardenConfig,
		backend: Arc<dyn StorageBackend>,
	) -> Result<Self, WardenConfigError> {
		Self::new(config, backend, Arc::new(crate::http::ReqwestTransport::default()))
	}

	/// Returns the shared token store.
	pub fn store(&self) -> &TokenStore {
		&self.store
	}

	/// Returns the shared refresh coordinator.
	pub fn coordinator(&self) -> &RefreshCoordinator {
		&self.coordinator
	}

	/// Returns the shared housekeeper; `tokio::spawn(warden.housekeeper().clone().run())` to
	/// run periodic sweeps for the process lifetime.
	pub fn housekeeper(&self) -> &Housekeeper {
		&self.housekeeper
	}

	/// Executes a request with credentials resolved automatically.
	pub async fn request(
		&self,
		method: Method,
		url: Url,
		body: Option<serde_json::Value>,
	) -> Result<TransportResponse> {
		let mut request = ExecutorRequest::new(method, url);

		if let Some(body) = body {
			request = request.with_body(body);
		}

		self.execute(request).await
	}

	/// Executes a request through the full pipeline, honoring its deadline when set.
	///
	/// A deadline expiry surfaces as a transient [`Error::Network`]; any refresh episode the
	/// request started keeps running and settles for the next caller.
	pub async fn execute(&self, request: ExecutorRequest) -> Result<TransportResponse> {
		const KIND: FlowKind = FlowKind::Request;

		let span = FlowSpan::new(KIND, "execute");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let ExecutorRequest { method, url, body, deadline } = request;
		let flow = span.instrument(self.execute_inner(method, url, body));
		let result = match deadline {
			Some(deadline) => tokio::time::timeout(deadline, flow).await.unwrap_or_else(|_| {
				Err(Error::Network {
					message: "deadline exceeded while executing the request".into(),
					status: None,
				})
			}),
			None => flow.await,
		};

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Logs in (or registers) through `url` and installs the returned session tokens.
	///
	/// Accepts both response shapes the backend has shipped; the legacy access-only shape
	/// leaves a previously stored refresh token in place. A successful login reopens the
	/// refresh attempt budget.
	pub async fn authenticate(
		&self,
		url: Url,
		credentials: serde_json::Value,
	) -> Result<SessionResponse> {
		let response = self.execute(ExecutorRequest::new(Method::Post, url).with_body(credentials)).await?;

		if !response.is_success() {
			return Err(Error::Network {
				message: format!("authentication failed with HTTP {}", response.status),
				status: Some(response.status),
			});
		}

		let session = response.json::<SessionResponse>()?;

		self.ingest_session(session.clone()).await?;

		Ok(session)
	}

	/// Installs tokens from a login/register response obtained outside [`authenticate`](Self::authenticate).
	pub async fn ingest_session(&self, session: SessionResponse) -> Result<()> {
		self.store.set_pair(&session.into_pair()).await?;
		self.coordinator.reset_attempts();

		Ok(())
	}

	async fn execute_inner(
		&self,
		method: Method,
		url: Url,
		body: Option<serde_json::Value>,
	) -> Result<TransportResponse> {
		// Sweeps are advisory; a failing backend read must not block the request itself.
		if let Err(_error) = self.housekeeper.sweep_expired().await {
			#[cfg(feature = "tracing")]
			tracing::warn!(error = %_error, "pre-send sweep failed");
		}

		self.policy.check(&url)?;

		let bearer = self.resolve_credentials(&url).await?;
		let mut request = TransportRequest::new(method, url.clone());

		if let Some(body) = body.clone() {
			request = request.with_body(body);
		}
		if let Some(bearer) = bearer {
			request = request.with_bearer(bearer);
		}

		let response = self.transport.send(request).await?;

		// Bootstrap endpoints are unauthenticated; a 401 from them is a credential failure
		// for the caller, not a spent access token.
		if response.is_unauthorized() && !self.endpoints.is_bootstrap(&url) {
			return self.retry_after_refresh(method, url, body).await;
		}

		log_server_errors(&response);

		Ok(response)
	}

	/// Resolves the bearer credential for `url`, refreshing when the stored access token is
	/// expired but a refresh token remains.
	async fn resolve_credentials(&self, url: &Url) -> Result<Option<String>> {
		let now = OffsetDateTime::now_utc();

		if let Some(access) = self.store.access().await? {
			match self.validator.validate_at(access.expose(), now) {
				Ok(_) => return Ok(Some(access.expose().to_owned())),
				// Expiry is recoverable through the refresh path below.
				Err(Error::Expired { .. }) => {},
				// Structurally broken tokens fail fast; sending them would only earn a 401.
				Err(error) => return Err(error),
			}
		}
		if self.endpoints.is_bootstrap(url) {
			return Ok(None);
		}
		if self.store.refresh().await?.is_some() {
			let token = match self.coordinator.ensure_fresh_token().await {
				Ok(token) => token,
				Err(error) => return Err(self.fail_terminal(error).await),
			};

			return Ok(Some(token.expose().to_owned()));
		}

		Err(Error::AuthenticationRequired)
	}

	async fn retry_after_refresh(
		&self,
		method: Method,
		url: Url,
		body: Option<serde_json::Value>,
	) -> Result<TransportResponse> {
		let token = match self.coordinator.ensure_fresh_token().await {
			Ok(token) => token,
			Err(error) => return Err(self.fail_terminal(error).await),
		};
		let mut retry = TransportRequest::new(method, url).with_bearer(token.expose());

		if let Some(body) = body {
			retry = retry.with_body(body);
		}

		let response = self.transport.send(retry).await?;

		if response.is_unauthorized() {
			// A fresh token was rejected too; whatever the server objects to, it is not
			// something another refresh can fix.
			let _ = self.store.clear().await;

			return Err(Error::SessionExpired {
				reason: "the request remained unauthorized after a token refresh".into(),
			});
		}

		log_server_errors(&response);

		Ok(response)
	}

	/// Converts terminal coordinator failures into a cleared store + [`Error::SessionExpired`].
	///
	/// Transient failures pass through untouched so callers may retry the same action.
	async fn fail_terminal(&self, error: Error) -> Error {
		if error.requires_reauthentication() {
			let _ = self.store.clear().await;

			Error::SessionExpired { reason: error.to_string() }
		} else {
			error
		}
	}
}
impl Debug for Warden {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Warden")
			.field("endpoints", &self.endpoints)
			.field("policy", &self.policy)
			.finish()
	}
}

fn log_server_errors(_response: &TransportResponse) {
	#[cfg(feature = "tracing")]
	if _response.status >= 500 {
		tracing::warn!(status = _response.status, "server error response");
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicU32, Ordering};
	// self
	use super::*;
	use crate::{
		_preludet::{expired_jwt, fresh_jwt},
		config::RefreshPolicy,
		http::{TransportFailure, TransportFuture},
		refresh::backoff::BackoffPolicy,
		store::MemoryBackend,
		token::TokenSecret,
	};

	struct ScriptedTransport {
		calls: AtomicU32,
		responses: Mutex<Vec<(Option<String>, TransportResponse)>>,
	}
	impl ScriptedTransport {
		fn new(responses: Vec<TransportResponse>) -> Arc<Self> {
			Arc::new(Self {
				calls: AtomicU32::new(0),
				responses: Mutex::new(responses.into_iter().map(|r| (None, r)).collect()),
			})
		}

		fn calls(&self) -> u32 {
			self.calls.load(Ordering::SeqCst)
		}

		fn bearers(&self) -> Vec<Option<String>> {
			self.responses.lock().iter().map(|(bearer, _)| bearer.clone()).collect()
		}
	}
	impl HttpTransport for ScriptedTransport {
		fn send(&self, request: TransportRequest) -> TransportFuture<'_> {
			let index = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
			let response = {
				let mut responses = self.responses.lock();

				responses.get_mut(index).map(|slot| {
					slot.0 = request.bearer.clone();

					slot.1.clone()
				})
			};

			Box::pin(async move {
				response.ok_or_else(|| TransportFailure::new("script exhausted"))
			})
		}
	}

	fn config() -> WardenConfig {
		WardenConfig::new(Endpoints::new(
			Url::parse("https://api.example.com/auth/refresh").expect("URL should parse."),
			Url::parse("https://api.example.com/auth/login").expect("URL should parse."),
			Url::parse("https://api.example.com/auth/register").expect("URL should parse."),
		))
		.with_refresh_policy(
			RefreshPolicy::default().with_min_interval(Duration::ZERO).with_backoff(
				BackoffPolicy::new(Duration::milliseconds(1), Duration::milliseconds(4))
					.with_jitter_factor(0.0),
			),
		)
	}

	fn warden(transport: Arc<ScriptedTransport>) -> (Warden, Arc<MemoryBackend>) {
		let backend = Arc::new(MemoryBackend::default());
		let warden = Warden::new(config(), backend.clone(), transport)
			.expect("Warden configuration fixture should be valid.");

		(warden, backend)
	}

	fn api_url() -> Url {
		Url::parse("https://api.example.com/meals").expect("URL should parse.")
	}

	fn ok_response() -> TransportResponse {
		TransportResponse { status: 200, body: b"{}".to_vec() }
	}

	#[tokio::test]
	async fn valid_access_token_is_attached_as_bearer() {
		let transport = ScriptedTransport::new(vec![ok_response()]);
		let (warden, _) = warden(transport.clone());
		let jwt = fresh_jwt(3_600);

		warden
			.store()
			.set_access(&TokenSecret::new(jwt.clone()))
			.await
			.expect("Seeding the access token should succeed.");

		let response = warden
			.request(Method::Get, api_url(), None)
			.await
			.expect("The scripted request should succeed.");

		assert!(response.is_success());
		assert_eq!(transport.bearers(), vec![Some(jwt)]);
	}

	#[tokio::test]
	async fn empty_store_requires_authentication_without_a_network_call() {
		let transport = ScriptedTransport::new(Vec::new());
		let (warden, _) = warden(transport.clone());

		let err = warden
			.request(Method::Get, api_url(), None)
			.await
			.expect_err("An empty store should fail before reaching the network.");

		assert!(matches!(err, Error::AuthenticationRequired));
		assert_eq!(transport.calls(), 0);
	}

	#[tokio::test]
	async fn malformed_access_token_fails_fast() {
		use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};

		let transport = ScriptedTransport::new(Vec::new());
		let (warden, _) = warden(transport.clone());
		// A decodable future expiry keeps the token past the sweep, but the non-JWT header
		// must still fail the structural check before any send.
		let now = OffsetDateTime::now_utc().unix_timestamp();
		let header = URL_SAFE_NO_PAD.encode("{\"typ\":\"SAML\"}");
		let payload =
			URL_SAFE_NO_PAD.encode(format!("{{\"iat\":{},\"exp\":{}}}", now - 60, now + 600));

		warden
			.store()
			.set_access(&TokenSecret::new(format!("{header}.{payload}.c2lnbmF0dXJl")))
			.await
			.expect("Seeding the access token should succeed.");

		let err = warden
			.request(Method::Get, api_url(), None)
			.await
			.expect_err("A structurally broken token should never be sent.");

		assert!(matches!(err, Error::Format(_)));
		assert_eq!(transport.calls(), 0);
	}

	#[tokio::test]
	async fn plain_http_target_is_rejected_by_policy() {
		let transport = ScriptedTransport::new(Vec::new());
		let (warden, _) = warden(transport.clone());
		let insecure = Url::parse("http://api.example.com/meals").expect("URL should parse.");

		let err = warden
			.request(Method::Get, insecure, None)
			.await
			.expect_err("Plain HTTP should be rejected.");

		assert!(matches!(err, Error::TransportPolicy { .. }));
		assert_eq!(transport.calls(), 0);
	}

	#[tokio::test]
	async fn expired_access_token_with_refresh_token_refreshes_before_sending() {
		let access = fresh_jwt(7_200);
		let refresh_body = format!("{{\"accessToken\":\"{access}\"}}");
		let transport = ScriptedTransport::new(vec![
			TransportResponse { status: 200, body: refresh_body.into_bytes() },
			ok_response(),
		]);
		let (warden, _) = warden(transport.clone());

		warden
			.store()
			.set_access(&TokenSecret::new(expired_jwt(10)))
			.await
			.expect("Seeding the expired access token should succeed.");
		warden
			.store()
			.set_refresh(&TokenSecret::new(fresh_jwt(86_400)))
			.await
			.expect("Seeding the refresh token should succeed.");

		let response = warden
			.request(Method::Get, api_url(), None)
			.await
			.expect("The refresh-then-send flow should succeed.");

		assert!(response.is_success());
		// The first wire call is the refresh itself; the API call carries the new token.
		assert_eq!(transport.bearers(), vec![None, Some(access)]);
	}

	#[tokio::test]
	async fn terminal_refresh_failure_clears_the_store() {
		// The refresh endpoint rejects the refresh token outright.
		let transport = ScriptedTransport::new(vec![TransportResponse {
			status: 401,
			body: Vec::new(),
		}]);
		let (warden, backend) = warden(transport.clone());

		warden
			.store()
			.set_access(&TokenSecret::new(expired_jwt(10)))
			.await
			.expect("Seeding the expired access token should succeed.");
		warden
			.store()
			.set_refresh(&TokenSecret::new(fresh_jwt(86_400)))
			.await
			.expect("Seeding the refresh token should succeed.");

		let err = warden
			.request(Method::Get, api_url(), None)
			.await
			.expect_err("A rejected refresh token should surface as session expiry.");

		assert!(matches!(err, Error::SessionExpired { .. }));
		assert!(err.requires_reauthentication());
		assert!(backend.is_empty(), "Terminal failures must leave no stale credentials.");
	}

	struct SlowTransport {
		delay: std::time::Duration,
	}
	impl HttpTransport for SlowTransport {
		fn send(&self, _: TransportRequest) -> TransportFuture<'_> {
			let delay = self.delay;

			Box::pin(async move {
				tokio::time::sleep(delay).await;

				Ok(ok_response())
			})
		}
	}

	#[tokio::test(start_paused = true)]
	async fn deadline_expiry_surfaces_as_a_transient_network_error() {
		let backend = Arc::new(MemoryBackend::default());
		let warden = Warden::new(
			config(),
			backend,
			Arc::new(SlowTransport { delay: std::time::Duration::from_millis(200) }),
		)
		.expect("Warden configuration fixture should be valid.");

		warden
			.store()
			.set_access(&TokenSecret::new(fresh_jwt(3_600)))
			.await
			.expect("Seeding the access token should succeed.");

		let err = warden
			.execute(
				ExecutorRequest::new(Method::Get, api_url())
					.with_deadline(std::time::Duration::from_millis(50)),
			)
			.await
			.expect_err("The deadline should expire before the slow endpoint responds.");

		assert!(matches!(err, Error::Network { .. }));
		assert!(err.is_transient(), "A deadline expiry must stay retryable.");
	}

	#[tokio::test]
	async fn login_401_is_returned_to_the_caller_without_a_refresh() {
		let transport = ScriptedTransport::new(vec![TransportResponse {
			status: 401,
			body: Vec::new(),
		}]);
		let (warden, _) = warden(transport.clone());
		let login = Url::parse("https://api.example.com/auth/login").expect("URL should parse.");

		let err = warden
			.authenticate(login, serde_json::json!({ "email": "u@example.com", "password": "x" }))
			.await
			.expect_err("Bad credentials should surface as the server's 401.");

		assert!(matches!(err, Error::Network { status: Some(401), .. }));
		assert_eq!(transport.calls(), 1, "A login 401 must not trigger a refresh.");
	}
}
