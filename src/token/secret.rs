//! Secure token secret wrapper that redacts sensitive material.

// self
use crate::_prelude::*;

/// Redacted token secret wrapper keeping sensitive material out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Access/refresh token pair mutated as a unit on login, refresh, and clear.
///
/// Either slot may be empty: access-only legacy login responses leave the refresh slot
/// untouched, and the housekeeper removes expired tokens individually.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenPair {
	/// Short-lived credential attached to outbound requests.
	pub access: Option<TokenSecret>,
	/// Longer-lived credential exchanged for a new access token.
	pub refresh: Option<TokenSecret>,
}
impl TokenPair {
	/// Builds a pair holding both secrets.
	pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
		Self { access: Some(TokenSecret::new(access)), refresh: Some(TokenSecret::new(refresh)) }
	}

	/// Returns `true` when neither slot holds a token.
	pub fn is_empty(&self) -> bool {
		self.access.is_none() && self.refresh.is_none()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn secret_formatters_redact() {
		let secret = TokenSecret::new("super-secret");

		assert_eq!(format!("{secret:?}"), "TokenSecret(\"<redacted>\")");
		assert_eq!(format!("{secret}"), "<redacted>");
	}

	#[test]
	fn pair_tracks_emptiness() {
		assert!(TokenPair::default().is_empty());
		assert!(!TokenPair::new("a", "r").is_empty());
	}
}
