//! Simple file-backed [`Storage`] for single-node deployments.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
// self
use crate::{
	_prelude::*,
	store::{self, Storage, StoreError, StoreFuture},
};

type Snapshot = BTreeMap<String, Vec<u8>>;

/// Persists every entry to a JSON file after each mutation.
///
/// Values are base64-encoded inside the snapshot so arbitrary bytes survive the round trip.
/// Writes go to a sibling `.tmp` file first and are renamed into place.
#[derive(Clone, Debug)]
pub struct FileStorage {
	path: PathBuf,
	inner: Arc<RwLock<Snapshot>>,
}
impl FileStorage {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	fn load_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
		if !path.exists() {
			return Ok(Snapshot::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.is_empty() {
			return Ok(Snapshot::new());
		}

		let encoded: BTreeMap<String, String> =
			serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
				message: format!("Failed to parse {}: {e}", path.display()),
			})?;

		encoded
			.into_iter()
			.map(|(key, value)| {
				STANDARD.decode(value).map(|raw| (key.clone(), raw)).map_err(|e| {
					StoreError::Serialization {
						message: format!("Entry {key} in {} is not base64: {e}", path.display()),
					}
				})
			})
			.collect()
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, contents: &Snapshot) -> Result<(), StoreError> {
		let encoded = contents
			.iter()
			.map(|(key, value)| (key.as_str(), STANDARD.encode(value)))
			.collect::<BTreeMap<_, _>>();
		let serialized =
			serde_json::to_vec_pretty(&encoded).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl Storage for FileStorage {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Vec<u8>>> {
		Box::pin(async move { Ok(self.inner.read().get(key).cloned()) })
	}

	fn put<'a>(&'a self, key: &'a str, value: Vec<u8>) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();
			let mut next = guard.clone();

			next.insert(key.to_owned(), value);
			self.persist_locked(&next)?;
			*guard = next;

			Ok(())
		})
	}

	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();

			if !guard.contains_key(key) {
				return Ok(());
			}

			let mut next = guard.clone();

			next.remove(key);
			self.persist_locked(&next)?;
			*guard = next;

			Ok(())
		})
	}

	fn list<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<String>> {
		Box::pin(async move { Ok(store::children(self.inner.read().keys(), prefix)) })
	}
}
