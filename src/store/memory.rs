//! Thread-safe in-memory [`Storage`] implementation for local development and tests.

// std
use std::collections::BTreeSet;
// self
use crate::{
	_prelude::*,
	store::{self, Storage, StoreFuture},
};

type EntryMap = Arc<RwLock<HashMap<String, Vec<u8>>>>;

/// Storage backend that keeps raw values in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage(EntryMap);
impl MemoryStorage {
	/// Returns every key currently stored, sorted.
	pub fn keys(&self) -> BTreeSet<String> {
		self.0.read().keys().cloned().collect()
	}

	/// Number of stored entries.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns true when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	fn list_now(map: &EntryMap, prefix: &str) -> Vec<String> {
		let guard = map.read();

		store::children(guard.keys(), prefix)
	}
}
impl Storage for MemoryStorage {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Vec<u8>>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.read().get(key).cloned()) })
	}

	fn put<'a>(&'a self, key: &'a str, value: Vec<u8>) -> StoreFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().insert(key.to_owned(), value);

			Ok(())
		})
	}

	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().remove(key);

			Ok(())
		})
	}

	fn list<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<String>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(Self::list_now(&map, prefix)) })
	}
}

