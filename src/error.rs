//! Warden-level error types shared across the store, validator, coordinator, and executor.
//!
//! Every variant carries owned data so [`Error`] stays [`Clone`]; the refresh coordinator
//! broadcasts a resolved `Result` to every caller attached to an in-flight episode, and a
//! shared outcome must be cloneable.

// self
use crate::_prelude::*;

/// Warden-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical warden error exposed by public APIs.
///
/// Callers can distinguish a transient condition (safe to retry the same action) from a
/// terminal one (must re-authenticate) purely from the error kind; see
/// [`is_transient`](Error::is_transient) and
/// [`requires_reauthentication`](Error::requires_reauthentication).
#[derive(Clone, Debug, ThisError)]
pub enum Error {
	/// Persistence backend rejected a read or write.
	#[error("{0}")]
	Storage(#[from] crate::store::StoreError),
	/// Token failed structural validation.
	#[error(transparent)]
	Format(#[from] FormatError),
	/// Token is syntactically valid but past expiry.
	#[error("Token expired at {expired_at}.")]
	Expired {
		/// Expiry instant decoded from the token's `exp` claim.
		expired_at: OffsetDateTime,
	},
	/// Target URL violates the configured transport-security policy.
	#[error("Transport policy rejected `{url}`: {reason}.")]
	TransportPolicy {
		/// Rejected target URL.
		url: String,
		/// Policy clause that failed.
		reason: &'static str,
	},
	/// Transport-level failure reaching the server.
	#[error("Network error: {message}.")]
	Network {
		/// Transport-supplied failure summary.
		message: String,
		/// HTTP status code, when a response was received at all.
		status: Option<u16>,
	},

	/// No usable credentials exist and the target requires authentication.
	#[error("No valid credentials are available; authenticate first.")]
	AuthenticationRequired,
	/// Refresh episode exhausted its retry budget.
	#[error("Refresh retry budget exhausted after {attempts} attempts.")]
	MaxAttemptsExceeded {
		/// Attempts consumed before the episode was declared failed.
		attempts: u32,
	},
	/// Refresh token rejected by the server, or a retry-after-refresh still unauthorized.
	#[error("Session expired: {reason}.")]
	SessionExpired {
		/// Warden- or server-supplied reason string.
		reason: String,
	},
}
impl Error {
	/// Returns `true` when retrying the same action later may succeed without re-authenticating.
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::Network { .. } | Self::Expired { .. })
	}

	/// Returns `true` when the caller must obtain fresh credentials before retrying anything.
	pub fn requires_reauthentication(&self) -> bool {
		matches!(
			self,
			Self::AuthenticationRequired
				| Self::MaxAttemptsExceeded { .. }
				| Self::SessionExpired { .. }
		)
	}
}

/// Structural token validation failures (fail closed: any of these refuses the token).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum FormatError {
	/// Token string is empty.
	#[error("Token is empty.")]
	Empty,
	/// Token length falls outside the configured bounds.
	#[error("Token length {len} is outside the allowed range [{min}, {max}].")]
	LengthOutOfRange {
		/// Observed token length.
		len: usize,
		/// Minimum accepted length.
		min: usize,
		/// Maximum accepted length.
		max: usize,
	},
	/// Token is not composed of exactly three dot-separated segments.
	#[error("Token has {count} segments; a JWT requires exactly 3.")]
	SegmentCount {
		/// Observed segment count.
		count: usize,
	},
	/// A segment is empty or contains characters outside the base64url alphabet.
	#[error("Token segment {index} is not valid base64url.")]
	InvalidSegment {
		/// Zero-based segment index.
		index: usize,
	},
	/// Header segment did not decode to JSON with `typ == "JWT"`.
	#[error("Token header does not declare a JWT.")]
	HeaderNotJwt,
	/// Payload segment did not decode to a JSON claims object.
	#[error("Token payload is not a decodable claims object.")]
	PayloadUndecodable,
	/// Payload is missing a required claim.
	#[error("Token payload is missing the `{claim}` claim.")]
	MissingClaim {
		/// Name of the absent claim.
		claim: &'static str,
	},
	/// Token was issued further in the past than the configured maximum age.
	#[error("Token age {age_secs}s exceeds the allowed maximum of {max_secs}s.")]
	TooOld {
		/// Seconds elapsed since the `iat` claim.
		age_secs: i64,
		/// Configured maximum token age in seconds.
		max_secs: i64,
	},
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::store::StoreError;

	#[test]
	fn store_error_converts_with_source() {
		let store_error = StoreError::Backend { message: "quota exceeded".into() };
		let error: Error = store_error.clone().into();

		assert!(matches!(error, Error::Storage(_)));
		assert!(error.to_string().contains("quota exceeded"));

		let source = StdError::source(&error)
			.expect("Warden error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn transient_and_terminal_kinds_are_disjoint() {
		let transient = Error::Network { message: "connection reset".into(), status: None };
		let terminal = Error::SessionExpired { reason: "refresh token rejected".into() };

		assert!(transient.is_transient());
		assert!(!transient.requires_reauthentication());
		assert!(terminal.requires_reauthentication());
		assert!(!terminal.is_transient());

		let policy = Error::TransportPolicy { url: "http://api".into(), reason: "HTTPS required" };

		// Policy errors are neither: retrying cannot fix them, but the session is intact.
		assert!(!policy.is_transient());
		assert!(!policy.requires_reauthentication());
	}

	#[test]
	fn errors_stay_cloneable_for_shared_episodes() {
		let error = Error::MaxAttemptsExceeded { attempts: 3 };
		let clone = error.clone();

		assert!(matches!(clone, Error::MaxAttemptsExceeded { attempts: 3 }));
	}
}
