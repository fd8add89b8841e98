//! Single-flight refresh coordination with rate limiting, an attempt cap, and jittered backoff.
//!
//! The coordinator owns one logical refresh state machine per process:
//! `IDLE → REFRESHING → {SUCCESS → IDLE, FAILURE → BACKOFF → IDLE | TERMINAL}`. A caller that
//! finds an episode already in flight attaches to the episode's shared [`watch`] channel and
//! observes the exact same resolved outcome as the episode leader—never a stale or
//! half-written store read. The episode body runs on a spawned task, so a caller abandoning
//! [`RefreshCoordinator::ensure_fresh_token`] (drop, timeout) cannot strand in-flight state:
//! the episode still settles and clears its flag once the underlying network call resolves.
//!
//! The state is private to one coordinator instance within one process. Two processes sharing
//! the same persisted store (e.g., two browser tabs) can each run an episode concurrently;
//! cross-process locking is deliberately out of scope here.

pub mod backoff;

mod metrics;

pub use metrics::RefreshMetrics;

// crates.io
use tokio::sync::watch;
// self
use crate::{
	_prelude::*,
	config::RefreshPolicy,
	http::{HttpTransport, Method, TransportRequest},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::TokenStore,
	token::{TokenPair, TokenSecret},
};

type EpisodeOutcome = Result<TokenSecret>;
type EpisodeReceiver = watch::Receiver<Option<EpisodeOutcome>>;

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
	access_token: String,
	refresh_token: Option<String>,
}

#[derive(Debug, Default)]
struct RefreshState {
	episode: Option<EpisodeReceiver>,
	attempts: u32,
	last_attempt_at: Option<OffsetDateTime>,
}

/// Coordinates refresh episodes so concurrent callers trigger at most one network call.
#[derive(Clone)]
pub struct RefreshCoordinator {
	inner: Arc<CoordinatorInner>,
}
impl RefreshCoordinator {
	/// Creates a coordinator refreshing against `endpoint` through the provided transport.
	pub fn new(
		store: TokenStore,
		transport: Arc<dyn HttpTransport>,
		endpoint: Url,
		policy: RefreshPolicy,
	) -> Self {
		Self {
			inner: Arc::new(CoordinatorInner {
				store,
				transport,
				endpoint,
				policy,
				state: Mutex::new(RefreshState::default()),
				metrics: RefreshMetrics::default(),
			}),
		}
	}

	/// Returns a fresh access token, joining the in-flight episode when one exists.
	///
	/// Followers block until the episode settles and share its exact outcome. A new episode
	/// waits out the rate-limit interval before hitting the endpoint, and a failed one waits
	/// out a jittered backoff before resolving, so attached callers inherit both delays.
	pub async fn ensure_fresh_token(&self) -> Result<TokenSecret> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "ensure_fresh_token");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.join_or_start_episode()).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// [`ensure_fresh_token`](Self::ensure_fresh_token) bounded by an optional deadline.
	///
	/// A caller abandoning the wait leaves the episode running; the deadline expiry surfaces
	/// as a transient [`Error::Network`] so the caller may retry the same action later.
	pub async fn ensure_fresh_token_with_deadline(
		&self,
		deadline: Option<std::time::Duration>,
	) -> Result<TokenSecret> {
		match deadline {
			Some(deadline) => tokio::time::timeout(deadline, self.ensure_fresh_token())
				.await
				.unwrap_or_else(|_| {
					Err(Error::Network {
						message: "deadline exceeded while waiting for token refresh".into(),
						status: None,
					})
				}),
			None => self.ensure_fresh_token().await,
		}
	}

	/// Resets the episode attempt counter; invoked when a login establishes a new session.
	pub fn reset_attempts(&self) {
		let mut state = self.inner.state.lock();

		state.attempts = 0;
		state.last_attempt_at = None;
	}

	/// Returns the attempts consumed by the current episode run.
	pub fn attempt_count(&self) -> u32 {
		self.inner.state.lock().attempts
	}

	/// Returns the episode metrics recorder.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.inner.metrics
	}

	async fn join_or_start_episode(&self) -> Result<TokenSecret> {
		let mut rx = {
			let mut state = self.inner.state.lock();

			if let Some(rx) = state.episode.as_ref() {
				rx.clone()
			} else {
				if state.attempts >= self.inner.policy.max_attempts {
					self.inner.metrics.record_failure();

					return Err(Error::MaxAttemptsExceeded { attempts: state.attempts });
				}

				state.attempts += 1;

				let attempt = state.attempts;
				let (tx, rx) = watch::channel(None);

				state.episode = Some(rx.clone());
				self.inner.metrics.record_attempt();

				let inner = self.inner.clone();

				tokio::spawn(async move { CoordinatorInner::run_episode(inner, tx, attempt).await });

				rx
			}
		};

		loop {
			if let Some(outcome) = rx.borrow_and_update().clone() {
				return outcome;
			}
			if rx.changed().await.is_err() {
				// The episode task died without publishing; unhook it so the next caller can
				// start a fresh episode instead of re-joining a dead channel.
				let mut state = self.inner.state.lock();

				if state.episode.as_ref().is_some_and(|current| current.same_channel(&rx)) {
					state.episode = None;
				}

				return Err(Error::Network {
					message: "refresh episode aborted before settling".into(),
					status: None,
				});
			}
		}
	}
}
impl Debug for RefreshCoordinator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshCoordinator")
			.field("endpoint", &self.inner.endpoint.as_str())
			.field("attempts", &self.attempt_count())
			.finish()
	}
}

struct CoordinatorInner {
	store: TokenStore,
	transport: Arc<dyn HttpTransport>,
	endpoint: Url,
	policy: RefreshPolicy,
	state: Mutex<RefreshState>,
	metrics: RefreshMetrics,
}
impl CoordinatorInner {
	async fn run_episode(
		inner: Arc<Self>,
		tx: watch::Sender<Option<EpisodeOutcome>>,
		attempt: u32,
	) {
		let outcome = Self::attempt_refresh(&inner, attempt).await;

		{
			let mut state = inner.state.lock();

			if outcome.is_ok() {
				state.attempts = 0;
			}

			// Unhook before publishing so late arrivals start a new episode instead of
			// observing a settled one.
			state.episode = None;
		}

		match &outcome {
			Ok(_) => inner.metrics.record_success(),
			Err(_) => inner.metrics.record_failure(),
		}

		let _ = tx.send(Some(outcome));
	}

	async fn attempt_refresh(inner: &Arc<Self>, attempt: u32) -> Result<TokenSecret> {
		// Rate limiting: space attempts at least min_interval apart so a burst of rejected
		// requests cannot hammer the refresh endpoint.
		let wait = {
			let state = inner.state.lock();

			state.last_attempt_at.and_then(|previous| {
				let remaining =
					inner.policy.min_interval - (OffsetDateTime::now_utc() - previous);

				remaining.is_positive().then_some(remaining)
			})
		};

		if let Some(wait) = wait {
			tokio::time::sleep(std::time::Duration::try_from(wait).unwrap_or_default()).await;
		}

		inner.state.lock().last_attempt_at = Some(OffsetDateTime::now_utc());

		let Some(refresh_token) = inner.store.refresh().await? else {
			// Nothing to exchange; the session cannot be recovered without a new login.
			let _ = inner.store.clear().await;

			return Err(Error::SessionExpired { reason: "no refresh token is available".into() });
		};
		let request = TransportRequest::new(Method::Post, inner.endpoint.clone())
			.with_body(serde_json::json!({ "refreshToken": refresh_token.expose() }));
		let response = match inner.transport.send(request).await {
			Ok(response) => response,
			Err(failure) => return Self::retryable(inner, attempt, failure.into()).await,
		};

		if response.is_unauthorized() {
			// The server rejected the refresh token itself; the whole pair is dead.
			let _ = inner.store.clear().await;

			return Err(Error::SessionExpired {
				reason: "refresh token rejected by the server".into(),
			});
		}
		if !response.is_success() {
			return Self::retryable(inner, attempt, Error::Network {
				message: format!("refresh endpoint returned HTTP {}", response.status),
				status: Some(response.status),
			})
			.await;
		}

		let parsed = match response.json::<RefreshResponse>() {
			Ok(parsed) => parsed,
			Err(error) => return Self::retryable(inner, attempt, error).await,
		};
		let access = TokenSecret::new(parsed.access_token);
		let pair = TokenPair {
			access: Some(access.clone()),
			refresh: parsed.refresh_token.map(TokenSecret::new),
		};

		inner.store.set_pair(&pair).await?;

		Ok(access)
	}

	/// Waits out the jittered backoff before resolving, so every caller attached to the
	/// episode inherits the delay and the next attempt is naturally spaced out.
	async fn retryable(inner: &Arc<Self>, attempt: u32, error: Error) -> Result<TokenSecret> {
		tokio::time::sleep(inner.policy.backoff.jittered_delay_std(attempt)).await;

		Err(error)
	}
}
