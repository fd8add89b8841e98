//! Persistence contracts and the token store choke point.
//!
//! [`StorageBackend`] is the generic "persist/read/remove named value" capability supplied by
//! the host (browser storage, keychain, a file, …). [`TokenStore`] layers the token slots on
//! top of it and is the single mutable shared resource of the crate: every write flows
//! through the refresh coordinator, login ingestion, or an explicit [`TokenStore::clear`].

pub mod memory;

pub use memory::MemoryBackend;

// self
use crate::{
	_prelude::*,
	token::{TokenMetadata, TokenPair, TokenSecret},
};

/// Persisted slot name for the access token. Literal value is load-bearing: existing
/// deployments already hold state under these keys.
pub const ACCESS_TOKEN_KEY: &str = "accessToken";
/// Persisted slot name for the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
/// Persisted slot name for the advisory token metadata (JSON, epoch milliseconds).
pub const TOKEN_METADATA_KEY: &str = "tokenMetadata";

/// Boxed future returned by [`StorageBackend`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Generic named-value persistence capability implemented by the host environment.
///
/// Implementations must surface backend failures (quota exceeded, disabled storage) as
/// [`StoreError`] instead of swallowing them; callers decide whether a failure is fatal.
pub trait StorageBackend
where
	Self: Send + Sync,
{
	/// Persists or replaces the value stored under `key`.
	fn persist<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a, ()>;

	/// Reads the value stored under `key`, if present.
	fn read<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

	/// Removes the value stored under `key`. Removing an absent key is not an error.
	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;
}

/// Error type produced by [`StorageBackend`] implementations and [`TokenStore`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Backend-level failure (quota exceeded, storage disabled, I/O).
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
	/// Metadata (de)serialization failure.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
}

/// Token store exposing the access/refresh/metadata slots over a pluggable backend.
#[derive(Clone)]
pub struct TokenStore {
	backend: Arc<dyn StorageBackend>,
	default_ttl: Duration,
}
impl TokenStore {
	/// Creates a store over the provided backend with the given advisory TTL.
	pub fn new(backend: Arc<dyn StorageBackend>, default_ttl: Duration) -> Self {
		Self { backend, default_ttl }
	}

	/// Persists the access token and stamps fresh advisory metadata
	/// (`issued_at = now`, `expires_at = now + default_ttl`, `last_checked = now`).
	pub async fn set_access(&self, token: &TokenSecret) -> Result<(), StoreError> {
		self.backend.persist(ACCESS_TOKEN_KEY, token.expose()).await?;
		self.write_metadata(TokenMetadata::advisory(OffsetDateTime::now_utc(), self.default_ttl))
			.await
	}

	/// Persists the refresh token.
	pub async fn set_refresh(&self, token: &TokenSecret) -> Result<(), StoreError> {
		self.backend.persist(REFRESH_TOKEN_KEY, token.expose()).await
	}

	/// Persists both slots of the pair as a unit; absent slots are left untouched so the
	/// access-only legacy login shape never destroys a still-valid refresh token.
	pub async fn set_pair(&self, pair: &TokenPair) -> Result<(), StoreError> {
		if let Some(access) = pair.access.as_ref() {
			self.set_access(access).await?;
		}
		if let Some(refresh) = pair.refresh.as_ref() {
			self.set_refresh(refresh).await?;
		}

		Ok(())
	}

	/// Reads the stored access token.
	pub async fn access(&self) -> Result<Option<TokenSecret>, StoreError> {
		Ok(self.backend.read(ACCESS_TOKEN_KEY).await?.map(TokenSecret::new))
	}

	/// Reads the stored refresh token.
	pub async fn refresh(&self) -> Result<Option<TokenSecret>, StoreError> {
		Ok(self.backend.read(REFRESH_TOKEN_KEY).await?.map(TokenSecret::new))
	}

	/// Reads the advisory metadata record.
	pub async fn metadata(&self) -> Result<Option<TokenMetadata>, StoreError> {
		self.backend
			.read(TOKEN_METADATA_KEY)
			.await?
			.map(|raw| {
				serde_json::from_str(&raw)
					.map_err(|e| StoreError::Serialization { message: e.to_string() })
			})
			.transpose()
	}

	/// Stamps `last_checked` on the stored metadata, if any exists.
	pub async fn touch(&self) -> Result<(), StoreError> {
		if let Some(metadata) = self.metadata().await? {
			self.write_metadata(metadata.touched(OffsetDateTime::now_utc())).await?;
		}

		Ok(())
	}

	/// Removes the access token slot only. Used by the housekeeper sweep.
	pub async fn remove_access(&self) -> Result<(), StoreError> {
		self.backend.remove(ACCESS_TOKEN_KEY).await
	}

	/// Removes the refresh token slot only. Used by the housekeeper sweep.
	pub async fn remove_refresh(&self) -> Result<(), StoreError> {
		self.backend.remove(REFRESH_TOKEN_KEY).await
	}

	/// Removes the metadata slot only.
	pub async fn remove_metadata(&self) -> Result<(), StoreError> {
		self.backend.remove(TOKEN_METADATA_KEY).await
	}

	/// Removes both tokens and the metadata record together.
	pub async fn clear(&self) -> Result<(), StoreError> {
		self.backend.remove(ACCESS_TOKEN_KEY).await?;
		self.backend.remove(REFRESH_TOKEN_KEY).await?;
		self.backend.remove(TOKEN_METADATA_KEY).await
	}

	async fn write_metadata(&self, metadata: TokenMetadata) -> Result<(), StoreError> {
		let raw = serde_json::to_string(&metadata)
			.map_err(|e| StoreError::Serialization { message: e.to_string() })?;

		self.backend.persist(TOKEN_METADATA_KEY, &raw).await
	}
}
impl Debug for TokenStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenStore").field("default_ttl", &self.default_ttl).finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::error::Error;

	#[test]
	fn store_error_converts_into_warden_error() {
		let store_error = StoreError::Backend { message: "storage disabled".into() };
		let error: Error = store_error.into();

		assert!(matches!(error, Error::Storage(_)));
		assert!(error.to_string().contains("storage disabled"));
	}

	#[tokio::test]
	async fn set_access_stamps_advisory_metadata() {
		let store = TokenStore::new(Arc::new(MemoryBackend::default()), Duration::minutes(15));
		let before = OffsetDateTime::now_utc();

		store
			.set_access(&TokenSecret::new("x"))
			.await
			.expect("Access write should succeed against the memory backend.");

		let metadata = store
			.metadata()
			.await
			.expect("Metadata read should succeed.")
			.expect("Advisory metadata should exist after an access write.");

		assert!(metadata.issued_at >= before - Duration::seconds(1));
		assert_eq!(metadata.expires_at - metadata.issued_at, Duration::minutes(15));
	}

	#[tokio::test]
	async fn legacy_pair_leaves_refresh_untouched() {
		let store = TokenStore::new(Arc::new(MemoryBackend::default()), Duration::minutes(15));

		store
			.set_refresh(&TokenSecret::new("r1"))
			.await
			.expect("Refresh write should succeed.");
		store
			.set_pair(&TokenPair {
				access: Some(TokenSecret::new("a2")),
				refresh: None,
			})
			.await
			.expect("Access-only pair write should succeed.");

		let refresh = store.refresh().await.expect("Refresh read should succeed.");

		assert_eq!(refresh.map(|t| t.expose().to_owned()), Some("r1".to_owned()));
	}
}
