//! Structural JWT validation and expiry checks.
//!
//! Nothing here verifies signatures—that is deferred to the server. The warden only decides
//! whether a token is *shaped* like a JWT and whether its `exp`/`iat` claims allow attaching
//! it to a request. Every check fails closed: unparseable input is treated as invalid or
//! expired, never as acceptable.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::{_prelude::*, error::FormatError, token::secret::TokenSecret};

#[derive(Deserialize)]
struct RawHeader {
	typ: Option<String>,
}

#[derive(Deserialize)]
struct RawClaims {
	iat: Option<i64>,
	exp: Option<i64>,
}

/// Claims extracted from a structurally valid token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JwtClaims {
	/// Issued-at claim, epoch seconds.
	pub iat: i64,
	/// Expiry claim, epoch seconds.
	pub exp: i64,
}
impl JwtClaims {
	/// Issued-at instant.
	pub fn issued_at(&self) -> OffsetDateTime {
		OffsetDateTime::from_unix_timestamp(self.iat).unwrap_or(OffsetDateTime::UNIX_EPOCH)
	}

	/// Expiry instant.
	pub fn expires_at(&self) -> OffsetDateTime {
		OffsetDateTime::from_unix_timestamp(self.exp).unwrap_or(OffsetDateTime::UNIX_EPOCH)
	}
}

/// Structural validator configured with length and age bounds.
#[derive(Clone, Debug)]
pub struct TokenValidator {
	/// Minimum accepted token length in bytes.
	pub min_length: usize,
	/// Maximum accepted token length in bytes.
	pub max_length: usize,
	/// Maximum accepted age since the `iat` claim.
	pub max_age: Duration,
}
impl TokenValidator {
	/// Runs the full structural check against the provided instant.
	///
	/// Rejections, in order: empty input, length outside `[min_length, max_length]`, segment
	/// count ≠ 3, empty or non-base64url segment, header without `typ == "JWT"`, undecodable
	/// payload, missing `exp`/`iat`, and `now - iat` beyond [`max_age`](Self::max_age).
	pub fn validate_format_at(
		&self,
		token: &str,
		now: OffsetDateTime,
	) -> Result<JwtClaims, FormatError> {
		if token.is_empty() {
			return Err(FormatError::Empty);
		}

		let len = token.len();

		if len < self.min_length || len > self.max_length {
			return Err(FormatError::LengthOutOfRange {
				len,
				min: self.min_length,
				max: self.max_length,
			});
		}

		let segments = token.split('.').collect::<Vec<_>>();

		if segments.len() != 3 {
			return Err(FormatError::SegmentCount { count: segments.len() });
		}

		let decoded = segments
			.iter()
			.enumerate()
			.map(|(index, segment)| {
				decode_segment(segment).ok_or(FormatError::InvalidSegment { index })
			})
			.collect::<Result<Vec<_>, _>>()?;
		let header =
			serde_json::from_slice::<RawHeader>(&decoded[0]).map_err(|_| FormatError::HeaderNotJwt)?;

		if header.typ.as_deref() != Some("JWT") {
			return Err(FormatError::HeaderNotJwt);
		}

		let claims = serde_json::from_slice::<RawClaims>(&decoded[1])
			.map_err(|_| FormatError::PayloadUndecodable)?;
		let exp = claims.exp.ok_or(FormatError::MissingClaim { claim: "exp" })?;
		let iat = claims.iat.ok_or(FormatError::MissingClaim { claim: "iat" })?;
		let age_secs = now.unix_timestamp() - iat;
		let max_secs = self.max_age.whole_seconds();

		if age_secs > max_secs {
			return Err(FormatError::TooOld { age_secs, max_secs });
		}

		Ok(JwtClaims { iat, exp })
	}

	/// Runs the full structural check using the current UTC instant.
	pub fn validate_format(&self, token: &str) -> Result<JwtClaims, FormatError> {
		self.validate_format_at(token, OffsetDateTime::now_utc())
	}

	/// Full check against the provided instant: structural validation plus the expiry claim.
	///
	/// An expired token surfaces as [`Error::Expired`] carrying the decoded expiry instant,
	/// so callers can distinguish "recoverable through a refresh" from a shape rejection.
	pub fn validate_at(&self, token: &str, now: OffsetDateTime) -> Result<JwtClaims> {
		let claims = self.validate_format_at(token, now)?;
		let expires_at = claims.expires_at();

		if expires_at < now {
			return Err(Error::Expired { expired_at: expires_at });
		}

		Ok(claims)
	}

	/// [`validate_at`](Self::validate_at) using the current UTC instant.
	pub fn validate(&self, token: &str) -> Result<JwtClaims> {
		self.validate_at(token, OffsetDateTime::now_utc())
	}

	/// Boolean wrapper over [`validate_format`](Self::validate_format).
	pub fn is_valid_format(&self, token: &str) -> bool {
		self.validate_format(token).is_ok()
	}
}
impl Default for TokenValidator {
	fn default() -> Self {
		Self { min_length: 16, max_length: 4_096, max_age: Duration::days(30) }
	}
}

/// Decodes the `exp` claim from a token's payload segment, if one can be extracted at all.
pub fn expiry_of(token: &str) -> Option<OffsetDateTime> {
	let payload = token.split('.').nth(1)?;
	let decoded = decode_segment(payload)?;
	let claims = serde_json::from_slice::<RawClaims>(&decoded).ok()?;

	OffsetDateTime::from_unix_timestamp(claims.exp?).ok()
}

/// Returns `true` when the token is absent, undecodable, or its `exp` claim predates `now`.
pub fn is_expired_at(token: Option<&TokenSecret>, now: OffsetDateTime) -> bool {
	let Some(token) = token else { return true };

	match expiry_of(token.expose()) {
		Some(expires_at) => expires_at < now,
		// Fail-safe default: unparseable input counts as expired.
		None => true,
	}
}

/// Returns `true` when the token is absent, undecodable, or expires within `buffer` of `now`.
pub fn is_expiring_soon_at(
	token: Option<&TokenSecret>,
	buffer: Duration,
	now: OffsetDateTime,
) -> bool {
	let Some(token) = token else { return true };

	match expiry_of(token.expose()) {
		Some(expires_at) => expires_at <= now + buffer,
		None => true,
	}
}

/// [`is_expired_at`] against the current UTC instant.
pub fn is_expired(token: Option<&TokenSecret>) -> bool {
	is_expired_at(token, OffsetDateTime::now_utc())
}

/// [`is_expiring_soon_at`] against the current UTC instant.
pub fn is_expiring_soon(token: Option<&TokenSecret>, buffer: Duration) -> bool {
	is_expiring_soon_at(token, buffer, OffsetDateTime::now_utc())
}

fn decode_segment(segment: &str) -> Option<Vec<u8>> {
	if segment.is_empty() {
		return None;
	}

	URL_SAFE_NO_PAD.decode(segment).ok()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::{encode_jwt, expired_jwt, fresh_jwt};

	fn validator() -> TokenValidator {
		TokenValidator::default()
	}

	#[test]
	fn well_formed_token_passes_and_exposes_claims() {
		let now = OffsetDateTime::now_utc().unix_timestamp();
		let token = encode_jwt(now - 10, now + 600);
		let claims = validator()
			.validate_format(&token)
			.expect("Well-formed token should pass the structural check.");

		assert_eq!(claims.iat, now - 10);
		assert_eq!(claims.exp, now + 600);
	}

	#[test]
	fn malformed_shapes_are_rejected() {
		let validator = validator();

		assert_eq!(validator.validate_format(""), Err(FormatError::Empty));
		assert!(matches!(
			validator.validate_format("ab"),
			Err(FormatError::LengthOutOfRange { len: 2, .. })
		));
		assert_eq!(
			validator.validate_format("only-two-segments.abcdefgh"),
			Err(FormatError::SegmentCount { count: 2 })
		);
		assert_eq!(
			validator.validate_format("seg+ment!.abcdefgh.ijklmnop"),
			Err(FormatError::InvalidSegment { index: 0 })
		);
		assert_eq!(
			validator.validate_format("abcdefgh..ijklmnopqrstuvwx"),
			Err(FormatError::InvalidSegment { index: 1 })
		);
	}

	#[test]
	fn header_and_claims_are_enforced() {
		use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};

		let now = OffsetDateTime::now_utc().unix_timestamp();
		let payload = URL_SAFE_NO_PAD.encode(format!("{{\"iat\":{},\"exp\":{}}}", now, now + 60));
		let not_jwt = URL_SAFE_NO_PAD.encode("{\"typ\":\"SAML\"}");
		let jwt_header = URL_SAFE_NO_PAD.encode("{\"typ\":\"JWT\"}");
		let no_exp = URL_SAFE_NO_PAD.encode(format!("{{\"iat\":{now}}}"));

		assert_eq!(
			validator().validate_format(&format!("{not_jwt}.{payload}.c2ln")),
			Err(FormatError::HeaderNotJwt)
		);
		assert_eq!(
			validator().validate_format(&format!("{jwt_header}.{no_exp}.c2ln")),
			Err(FormatError::MissingClaim { claim: "exp" })
		);
	}

	#[test]
	fn ancient_tokens_are_rejected() {
		let now = OffsetDateTime::now_utc().unix_timestamp();
		let ancient = encode_jwt(now - Duration::days(31).whole_seconds(), now + 600);

		assert!(matches!(
			validator().validate_format(&ancient),
			Err(FormatError::TooOld { .. })
		));
	}

	#[test]
	fn full_validation_surfaces_the_expiry_instant() {
		let err = validator()
			.validate(&expired_jwt(120))
			.expect_err("An expired token should be rejected by full validation.");

		assert!(matches!(err, Error::Expired { .. }));
		assert!(err.is_transient(), "Expiry is recoverable through a refresh.");

		validator()
			.validate(&fresh_jwt(600))
			.expect("A fresh, well-formed token should pass full validation.");
	}

	#[test]
	fn expiry_checks_fail_safe() {
		let secret = TokenSecret::new("not-a-jwt-at-all");

		assert!(is_expired(None));
		assert!(is_expired(Some(&secret)));
		assert!(is_expiring_soon(None, Duration::minutes(5)));
	}

	#[test]
	fn expiry_boundaries_hold() {
		let now = OffsetDateTime::now_utc();
		let just_expired = TokenSecret::new(expired_jwt(1));
		let alive = TokenSecret::new(fresh_jwt(600));

		assert!(is_expired_at(Some(&just_expired), now));
		assert!(!is_expired_at(Some(&alive), now));
	}

	#[test]
	fn expiring_soon_boundary_is_inclusive() {
		let now = OffsetDateTime::now_utc();
		let ts = now.unix_timestamp();
		let at_buffer = TokenSecret::new(encode_jwt(ts - 60, ts + 300));
		let past_buffer = TokenSecret::new(encode_jwt(ts - 60, ts + 301));

		assert!(is_expiring_soon_at(Some(&at_buffer), Duration::minutes(5), now));
		assert!(!is_expiring_soon_at(Some(&past_buffer), Duration::minutes(5), now));
	}
}
