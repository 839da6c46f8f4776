//! Key-value storage contract, built-in backends, and the typed token accessor.

pub mod file;
pub mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

// self
use crate::{
	_prelude::*,
	auth::TokenRecord,
	key::{BucketKey, CredentialKey},
};

/// Boxed future returned by [`Storage`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Persisted key-value storage the cache runs on.
///
/// Implementations must be atomic per key; the cache never relies on multi-key
/// transactions. Absence is reported as `Ok(None)`, never as an error.
pub trait Storage
where
	Self: Send + Sync,
{
	/// Fetches the raw value stored under `key`.
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Vec<u8>>>;

	/// Persists or replaces the raw value stored under `key`.
	fn put<'a>(&'a self, key: &'a str, value: Vec<u8>) -> StoreFuture<'a, ()>;

	/// Removes `key`; removing a missing key succeeds.
	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;

	/// Lists the immediate children of `prefix`.
	///
	/// Entries are returned relative to `prefix`. Children that have descendants of their
	/// own are returned once, with a trailing `/`.
	fn list<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<String>>;
}

/// Error type produced by [`Storage`] implementations and the token accessor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced while encoding or decoding a stored value.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Typed accessor that stores [`TokenRecord`]s as JSON under credential keys.
///
/// This is a pass-through: no caching and no retries.
#[derive(Clone)]
pub struct TokenStore {
	storage: Arc<dyn Storage>,
}
impl TokenStore {
	/// Wraps a storage backend.
	pub fn new(storage: Arc<dyn Storage>) -> Self {
		Self { storage }
	}

	/// Reads the record stored under `key`, if any.
	pub async fn get(&self, key: &CredentialKey) -> Result<Option<TokenRecord>, StoreError> {
		let Some(bytes) = self.storage.get(key.as_str()).await? else {
			return Ok(None);
		};

		serde_json::from_slice(&bytes).map(Some).map_err(|e| StoreError::Serialization {
			message: format!("Failed to decode token record at {key}: {e}"),
		})
	}

	/// Persists `record` under `key`, replacing any previous value.
	pub async fn put(&self, key: &CredentialKey, record: &TokenRecord) -> Result<(), StoreError> {
		let bytes = serde_json::to_vec(record).map_err(|e| StoreError::Serialization {
			message: format!("Failed to encode token record for {key}: {e}"),
		})?;

		self.storage.put(key.as_str(), bytes).await
	}

	/// Removes the record stored under `key`.
	pub async fn delete(&self, key: &CredentialKey) -> Result<(), StoreError> {
		self.storage.delete(key.as_str()).await
	}

	/// Lists the scope suffixes stored under `bucket`.
	pub async fn list(&self, bucket: &BucketKey) -> Result<Vec<String>, StoreError> {
		self.storage.list(&bucket.list_prefix()).await
	}
}
impl Debug for TokenStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("TokenStore(..)")
	}
}

/// Lists the immediate children of `prefix` among `keys`, using [`Storage::list`] semantics.
pub(crate) fn children<'a, I>(keys: I, prefix: &str) -> Vec<String>
where
	I: IntoIterator<Item = &'a String>,
{
	let mut out = keys
		.into_iter()
		.filter_map(|key| key.strip_prefix(prefix))
		.filter(|rest| !rest.is_empty())
		.map(|rest| match rest.find('/') {
			Some(idx) => rest[..=idx].to_owned(),
			None => rest.to_owned(),
		})
		.collect::<Vec<_>>();

	out.sort();
	out.dedup();

	out
}
