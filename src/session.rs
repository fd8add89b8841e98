//! Boundary types for the two login/register response shapes the backend may return.
//!
//! Responses are validated into an explicit discriminated union before any field is read:
//! the current shape carries a `tokens` object plus the user record, while the legacy shape
//! inlines a single access token (no rotation) next to the user fields.

// self
use crate::{
	_prelude::*,
	token::{TokenPair, TokenSecret},
};

/// Union over the accepted login/register response shapes.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum SessionResponse {
	/// Current shape: `{ "tokens": { "accessToken", "refreshToken" }, "user": … }`.
	Issued(IssuedSession),
	/// Legacy shape: `{ "token": …, …user fields }`; access token only, no rotation.
	Legacy(LegacySession),
}
impl SessionResponse {
	/// Converts the response into the pair of secrets to persist.
	///
	/// The legacy shape yields an access-only pair, leaving any stored refresh token
	/// untouched when persisted through [`TokenStore::set_pair`](crate::store::TokenStore).
	pub fn into_pair(self) -> TokenPair {
		match self {
			Self::Issued(issued) => TokenPair {
				access: Some(TokenSecret::new(issued.tokens.access_token)),
				refresh: Some(TokenSecret::new(issued.tokens.refresh_token)),
			},
			Self::Legacy(legacy) =>
				TokenPair { access: Some(TokenSecret::new(legacy.token)), refresh: None },
		}
	}
}

/// Current login/register response body.
#[derive(Clone, Debug, Deserialize)]
pub struct IssuedSession {
	/// Freshly minted token pair.
	pub tokens: IssuedTokens,
	/// User record returned alongside the tokens.
	#[serde(default)]
	pub user: Option<serde_json::Value>,
}

/// Token pair carried by the current response shape.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedTokens {
	/// Access token.
	pub access_token: String,
	/// Refresh token.
	pub refresh_token: String,
}

/// Legacy login/register response body (access token inlined with the user fields).
#[derive(Clone, Debug, Deserialize)]
pub struct LegacySession {
	/// Access token.
	pub token: String,
	/// Remaining user fields, kept opaque.
	#[serde(flatten)]
	pub user_fields: serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn issued_shape_yields_both_tokens() {
		let response: SessionResponse = serde_json::from_str(
			r#"{"tokens":{"accessToken":"a1","refreshToken":"r1"},"user":{"id":7}}"#,
		)
		.expect("Issued-shape response should deserialize.");
		let pair = response.into_pair();

		assert_eq!(pair.access.map(|t| t.expose().to_owned()), Some("a1".to_owned()));
		assert_eq!(pair.refresh.map(|t| t.expose().to_owned()), Some("r1".to_owned()));
	}

	#[test]
	fn legacy_shape_yields_access_only() {
		let response: SessionResponse =
			serde_json::from_str(r#"{"token":"a2","email":"u@example.com"}"#)
				.expect("Legacy-shape response should deserialize.");
		let pair = response.into_pair();

		assert_eq!(pair.access.map(|t| t.expose().to_owned()), Some("a2".to_owned()));
		assert_eq!(pair.refresh, None);
	}

	#[test]
	fn unrecognized_shapes_are_rejected() {
		assert!(serde_json::from_str::<SessionResponse>(r#"{"user":{"id":7}}"#).is_err());
	}
}
