//! Advisory token metadata persisted alongside the access token.
//!
//! Serialized with epoch-millisecond fields under the camelCase names used by the persisted
//! `tokenMetadata` slot. Authoritative expiry always comes from decoding the token's own
//! `exp` claim; this record only covers the window before the claim can be decoded.

// self
use crate::_prelude::*;

/// Advisory issued-at/expires-at/last-checked instants for the stored access token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMetadata {
	/// Instant the token was stored.
	#[serde(with = "epoch_ms")]
	pub issued_at: OffsetDateTime,
	/// Advisory expiry, used only until the real `exp` claim is decoded.
	#[serde(with = "epoch_ms")]
	pub expires_at: OffsetDateTime,
	/// Instant the token was last validated.
	#[serde(with = "epoch_ms")]
	pub last_checked: OffsetDateTime,
}
impl TokenMetadata {
	/// Builds advisory metadata for a token stored at `now` with a default TTL.
	pub fn advisory(now: OffsetDateTime, default_ttl: Duration) -> Self {
		Self { issued_at: now, expires_at: now + default_ttl, last_checked: now }
	}

	/// Returns a copy with `last_checked` stamped at `now`.
	pub fn touched(mut self, now: OffsetDateTime) -> Self {
		self.last_checked = now;

		self
	}
}

mod epoch_ms {
	// crates.io
	use serde::{Deserialize, Deserializer, Serializer};
	use time::OffsetDateTime;

	pub fn serialize<S>(instant: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_i64((instant.unix_timestamp_nanos() / 1_000_000) as i64)
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
	where
		D: Deserializer<'de>,
	{
		let millis = i64::deserialize(deserializer)?;

		OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
			.map_err(serde::de::Error::custom)
	}
}
