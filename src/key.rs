//! Storage key derivation for cached credentials.
//!
//! A credential key has two halves. The bucket is derived from the credential name alone
//! and is split into nested segments so storage backends keep a bounded fan-out per
//! directory. The suffix is derived from the canonical scope set. Concatenating them means
//! every scope variant of a name can be found by listing the bucket, without knowing which
//! scope sets were ever requested.
//!
//! All digests are SHA-256 encoded as URL-safe base64 without padding, so every segment is
//! safe as a path component and independent of locale or process state.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{CredentialName, ScopeSet},
};

/// Storage prefix shared by every cached credential.
pub const CREDS_PREFIX: &str = "creds/";
/// Suffix reserved for the empty scope set.
///
/// Hashed suffixes are always 43 characters of URL-safe base64, so this 7-character value
/// can never collide with a real scope combination.
pub const DEFAULT_SCOPE_SUFFIX: &str = "default";

const SEPARATOR: char = '/';

/// Storage path identifying every scope variant of one credential name.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BucketKey(String);
impl BucketKey {
	/// Returns the bucket path without a trailing separator.
	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Returns the prefix used to list children of this bucket.
	pub fn list_prefix(&self) -> String {
		format!("{}{SEPARATOR}", self.0)
	}

	/// Builds the full key for a child entry listed under this bucket.
	pub fn child(&self, suffix: &str) -> CredentialKey {
		CredentialKey::new(self.clone(), suffix)
	}
}
impl Display for BucketKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Full storage key for one credential name and scope set.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CredentialKey {
	bucket: BucketKey,
	path: String,
}
impl CredentialKey {
	/// Joins a bucket and a scope suffix.
	pub fn new(bucket: BucketKey, suffix: &str) -> Self {
		let path = format!("{}{SEPARATOR}{suffix}", bucket.0);

		Self { bucket, path }
	}

	/// Derives the key for `name` under `scopes`.
	pub fn derive(name: &CredentialName, scopes: &ScopeSet) -> Self {
		Self::new(name_bucket(name), scopes.key_suffix())
	}

	/// Bucket half of the key.
	pub fn bucket(&self) -> &BucketKey {
		&self.bucket
	}

	/// Scope suffix half of the key.
	pub fn suffix(&self) -> &str {
		&self.path[self.bucket.0.len() + SEPARATOR.len_utf8()..]
	}

	/// Full storage path.
	pub fn as_str(&self) -> &str {
		&self.path
	}
}
impl Display for CredentialKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.path)
	}
}

/// Derives the bucket for a credential name.
///
/// The digest is split into `2 / 2 / 28` byte segments below [`CREDS_PREFIX`].
pub fn name_bucket(name: &CredentialName) -> BucketKey {
	let digest = Sha256::digest(name.as_str().as_bytes());
	let (first, rest) = digest.split_at(2);
	let (second, rest) = rest.split_at(2);

	BucketKey(format!(
		"{CREDS_PREFIX}{}{SEPARATOR}{}{SEPARATOR}{}",
		URL_SAFE_NO_PAD.encode(first),
		URL_SAFE_NO_PAD.encode(second),
		URL_SAFE_NO_PAD.encode(rest),
	))
}

/// Derives the key suffix for a canonical scope set.
///
/// The empty set maps to [`DEFAULT_SCOPE_SUFFIX`]; any other set hashes its comma-joined
/// canonical form.
pub fn scope_suffix(scopes: &ScopeSet) -> String {
	if scopes.is_empty() {
		return DEFAULT_SCOPE_SUFFIX.into();
	}

	URL_SAFE_NO_PAD.encode(Sha256::digest(scopes.canonical().as_bytes()))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn name(raw: &str) -> CredentialName {
		CredentialName::new(raw).expect("Name fixture should be valid.")
	}

	fn scopes(raw: &[&str]) -> ScopeSet {
		ScopeSet::new(raw.iter().copied()).expect("Scope fixture should be valid.")
	}

	#[test]
	fn equal_sets_derive_identical_keys() {
		let user = name("user");
		let lhs = CredentialKey::derive(&user, &scopes(&["a", "b", "c", "d", "e"]));
		let rhs = CredentialKey::derive(&user, &scopes(&["a", "b", "c", "e", "d", "d"]));

		assert_eq!(lhs, rhs);
		assert_eq!(lhs.as_str(), rhs.as_str());
	}

	#[test]
	fn different_sets_derive_different_keys() {
		let user = name("user");
		let variants = [
			scopes(&[]),
			scopes(&["a"]),
			scopes(&["a", "b"]),
			scopes(&["ab"]),
			scopes(&["a", "b", "c"]),
			scopes(&["a", "b", "c", "d", "e"]),
		];
		let keys = variants.iter().map(|set| CredentialKey::derive(&user, set)).collect::<Vec<_>>();

		for (i, lhs) in keys.iter().enumerate() {
			for rhs in &keys[i + 1..] {
				assert_ne!(lhs, rhs);
			}
		}
	}

	#[test]
	fn empty_set_uses_reserved_suffix() {
		let key = CredentialKey::derive(&name("user"), &ScopeSet::default());
		let hashed = scope_suffix(&scopes(&["a"]));

		assert_eq!(key.suffix(), DEFAULT_SCOPE_SUFFIX);
		assert_eq!(hashed.len(), 43);
		assert_ne!(hashed.len(), DEFAULT_SCOPE_SUFFIX.len());
	}

	#[test]
	fn bucket_is_shared_by_every_scope_variant() {
		let user = name("user");
		let plain = CredentialKey::derive(&user, &ScopeSet::default());
		let scoped = CredentialKey::derive(&user, &scopes(&["a", "b"]));

		assert_eq!(plain.bucket(), scoped.bucket());
		assert!(scoped.as_str().starts_with(&scoped.bucket().list_prefix()));
		assert_eq!(scoped.bucket().child(scoped.suffix()), scoped);
		assert_ne!(name_bucket(&user), name_bucket(&name("user2")));
	}

	#[test]
	fn bucket_layout_is_nested_and_path_safe() {
		let bucket = name_bucket(&name("svc.billing@eu-1"));
		let segments = bucket.as_str().trim_start_matches(CREDS_PREFIX).split('/').collect::<Vec<_>>();

		assert!(bucket.as_str().starts_with(CREDS_PREFIX));
		assert_eq!(segments.iter().map(|s| s.len()).collect::<Vec<_>>(), vec![3, 3, 38]);
		assert!(
			bucket
				.as_str()
				.chars()
				.all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '/'))
		);
		assert_eq!(bucket, name_bucket(&name("svc.billing@eu-1")));
	}
}
