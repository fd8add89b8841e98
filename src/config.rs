//! Warden configuration: endpoints, transport policy, refresh policy, and lifecycle knobs.

// self
use crate::{
	_prelude::*,
	refresh::backoff::BackoffPolicy,
	token::TokenValidator,
};

/// Endpoints the warden treats specially.
///
/// Login, register, and refresh are the unauthenticated bootstrap endpoints: requests to
/// them go out without credentials, and a 401 from the refresh endpoint is terminal for the
/// whole session.
#[derive(Clone, Debug)]
pub struct Endpoints {
	/// Refresh endpoint receiving `POST {"refreshToken": ...}`.
	pub refresh: Url,
	/// Login endpoint.
	pub login: Url,
	/// Registration endpoint.
	pub register: Url,
}
impl Endpoints {
	/// Creates the endpoint set.
	pub fn new(refresh: Url, login: Url, register: Url) -> Self {
		Self { refresh, login, register }
	}

	/// Returns `true` when `url` targets one of the unauthenticated bootstrap endpoints.
	pub fn is_bootstrap(&self, url: &Url) -> bool {
		same_endpoint(url, &self.refresh)
			|| same_endpoint(url, &self.login)
			|| same_endpoint(url, &self.register)
	}

	/// Returns `true` when `url` targets the refresh endpoint itself.
	pub fn is_refresh(&self, url: &Url) -> bool {
		same_endpoint(url, &self.refresh)
	}
}

/// Transport-security policy applied to every outbound URL.
#[derive(Clone, Debug)]
pub struct TransportPolicy {
	/// Require `https` target URLs. Relax only for local development.
	pub require_https: bool,
}
impl TransportPolicy {
	/// Relaxes the HTTPS requirement for local development.
	pub fn allow_insecure(mut self) -> Self {
		self.require_https = false;

		self
	}

	/// Checks a target URL against the policy.
	pub fn check(&self, url: &Url) -> Result<()> {
		if self.require_https && url.scheme() != "https" {
			return Err(Error::TransportPolicy {
				url: url.to_string(),
				reason: "HTTPS is required",
			});
		}

		Ok(())
	}
}
impl Default for TransportPolicy {
	fn default() -> Self {
		Self { require_https: true }
	}
}

/// Rate limiting, retry budget, and backoff knobs for the refresh coordinator.
#[derive(Clone, Debug)]
pub struct RefreshPolicy {
	/// Minimum spacing between refresh endpoint hits.
	pub min_interval: Duration,
	/// Attempts allowed per refresh episode before it is declared failed.
	pub max_attempts: u32,
	/// Exponential backoff applied between failed attempts.
	pub backoff: BackoffPolicy,
}
impl RefreshPolicy {
	/// Overrides the rate-limiting interval.
	pub fn with_min_interval(mut self, interval: Duration) -> Self {
		self.min_interval = interval;

		self
	}

	/// Overrides the attempt cap.
	pub fn with_max_attempts(mut self, attempts: u32) -> Self {
		self.max_attempts = attempts;

		self
	}

	/// Overrides the backoff policy.
	pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
		self.backoff = backoff;

		self
	}
}
impl Default for RefreshPolicy {
	fn default() -> Self {
		Self {
			min_interval: Duration::seconds(5),
			max_attempts: 3,
			backoff: BackoffPolicy::default(),
		}
	}
}

/// Errors raised while validating a [`WardenConfig`].
#[derive(Clone, Debug, PartialEq, ThisError)]
pub enum WardenConfigError {
	/// A configured endpoint violates the transport policy.
	#[error("The {endpoint} endpoint violates the transport policy: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// The refresh attempt cap must allow at least one attempt.
	#[error("max_attempts must be at least 1.")]
	ZeroAttempts,
	/// Validator length bounds are inverted.
	#[error("Validator length bounds are inverted: min {min} > max {max}.")]
	LengthBoundsInverted {
		/// Configured minimum length.
		min: usize,
		/// Configured maximum length.
		max: usize,
	},
	/// Backoff jitter factor must stay within `[0, 1)`.
	#[error("Backoff jitter factor {jitter} is outside [0, 1).")]
	JitterOutOfRange {
		/// Configured jitter factor.
		jitter: f64,
	},
	/// Backoff delays are inverted.
	#[error("Backoff base delay exceeds the maximum delay.")]
	BackoffBoundsInverted,
}

/// Top-level warden configuration, validated when the warden is constructed.
#[derive(Clone, Debug)]
pub struct WardenConfig {
	/// Bootstrap + refresh endpoints.
	pub endpoints: Endpoints,
	/// Structural token validation bounds.
	pub validator: TokenValidator,
	/// Refresh coordination policy.
	pub refresh: RefreshPolicy,
	/// Transport-security policy.
	pub transport: TransportPolicy,
	/// Advisory TTL stamped on newly stored access tokens.
	pub default_ttl: Duration,
	/// Window before expiry in which the housekeeper refreshes pre-emptively.
	pub preemptive_buffer: Duration,
	/// Interval between housekeeper passes.
	pub sweep_interval: Duration,
}
impl WardenConfig {
	/// Creates a configuration with default policies for the provided endpoints.
	pub fn new(endpoints: Endpoints) -> Self {
		Self {
			endpoints,
			validator: TokenValidator::default(),
			refresh: RefreshPolicy::default(),
			transport: TransportPolicy::default(),
			default_ttl: Duration::minutes(15),
			preemptive_buffer: Duration::minutes(5),
			sweep_interval: Duration::seconds(60),
		}
	}

	/// Overrides the structural validator bounds.
	pub fn with_validator(mut self, validator: TokenValidator) -> Self {
		self.validator = validator;

		self
	}

	/// Overrides the refresh policy.
	pub fn with_refresh_policy(mut self, refresh: RefreshPolicy) -> Self {
		self.refresh = refresh;

		self
	}

	/// Overrides the transport policy.
	pub fn with_transport_policy(mut self, transport: TransportPolicy) -> Self {
		self.transport = transport;

		self
	}

	/// Overrides the advisory TTL.
	pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
		self.default_ttl = ttl;

		self
	}

	/// Overrides the pre-emptive refresh buffer.
	pub fn with_preemptive_buffer(mut self, buffer: Duration) -> Self {
		self.preemptive_buffer = buffer;

		self
	}

	/// Overrides the housekeeper interval.
	pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
		self.sweep_interval = interval;

		self
	}

	/// Validates invariants for the configuration.
	pub fn validate(&self) -> Result<(), WardenConfigError> {
		for (name, url) in [
			("refresh", &self.endpoints.refresh),
			("login", &self.endpoints.login),
			("register", &self.endpoints.register),
		] {
			if self.transport.check(url).is_err() {
				return Err(WardenConfigError::InsecureEndpoint {
					endpoint: name,
					url: url.to_string(),
				});
			}
		}

		if self.refresh.max_attempts == 0 {
			return Err(WardenConfigError::ZeroAttempts);
		}
		if self.validator.min_length > self.validator.max_length {
			return Err(WardenConfigError::LengthBoundsInverted {
				min: self.validator.min_length,
				max: self.validator.max_length,
			});
		}

		let jitter = self.refresh.backoff.jitter_factor;

		if !(0.0..1.0).contains(&jitter) {
			return Err(WardenConfigError::JitterOutOfRange { jitter });
		}
		if self.refresh.backoff.base_delay > self.refresh.backoff.max_delay {
			return Err(WardenConfigError::BackoffBoundsInverted);
		}

		Ok(())
	}
}

fn same_endpoint(a: &Url, b: &Url) -> bool {
	a.scheme() == b.scheme()
		&& a.host_str() == b.host_str()
		&& a.port_or_known_default() == b.port_or_known_default()
		&& a.path() == b.path()
}
