//! Thread-safe in-memory [`StorageBackend`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	store::{StorageBackend, StoreError, StoreFuture},
};

type SlotMap = Arc<RwLock<HashMap<String, String>>>;

/// Thread-safe backend that keeps slots in-process for tests and demos.
#[derive(Clone, Debug, Default)]
pub struct MemoryBackend(SlotMap);
impl MemoryBackend {
	/// Returns the raw value stored under `key`, bypassing the async contract. Test helper.
	pub fn peek(&self, key: &str) -> Option<String> {
		self.0.read().get(key).cloned()
	}

	/// Returns the number of occupied slots. Test helper.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when no slots are occupied.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}
impl StorageBackend for MemoryBackend {
	fn persist<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().insert(key.to_owned(), value.to_owned());

			Ok(())
		})
	}

	fn read<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.read().get(key).cloned()) })
	}

	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().remove(key);

			Ok(())
		})
	}
}

/// Backend wrapper that fails every operation; exercises the [`StoreError`] surfacing paths.
#[cfg(any(test, feature = "test"))]
#[derive(Clone, Debug, Default)]
pub struct FailingBackend;
#[cfg(any(test, feature = "test"))]
impl StorageBackend for FailingBackend {
	fn persist<'a>(&'a self, _: &'a str, _: &'a str) -> StoreFuture<'a, ()> {
		Box::pin(async { Err(StoreError::Backend { message: "persistence disabled".into() }) })
	}

	fn read<'a>(&'a self, _: &'a str) -> StoreFuture<'a, Option<String>> {
		Box::pin(async { Err(StoreError::Backend { message: "persistence disabled".into() }) })
	}

	fn remove<'a>(&'a self, _: &'a str) -> StoreFuture<'a, ()> {
		Box::pin(async { Err(StoreError::Backend { message: "persistence disabled".into() }) })
	}
}
