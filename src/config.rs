//! Client configuration consumed by every credential read.
//!
//! Writing configuration is owned by the surrounding application; this module only exposes
//! the data model and the read-side [`ConfigSource`] accessor.

// self
use crate::{
	_prelude::*,
	auth::ScopeSet,
	error::ConfigError,
	store::{Storage, StoreFuture},
};

/// Storage key holding the JSON configuration entry.
pub const CONFIG_KEY: &str = "config";

/// Boxed future returned by [`ConfigSource::get`].
pub type ConfigFuture<'a> =
	Pin<Box<dyn Future<Output = Result<Option<Configuration>>> + 'a + Send>>;

/// OAuth client configuration for one mount.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
	/// OAuth 2.0 client identifier.
	pub client_id: String,
	/// OAuth 2.0 client secret.
	pub client_secret: String,
	/// Token endpoint used for the client-credentials grant.
	pub token_url: Url,
	/// Default scopes requested when a read carries no override, in configured order.
	#[serde(default)]
	pub scopes: Vec<String>,
}
impl Configuration {
	/// Creates a configuration without default scopes.
	pub fn new(
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
		token_url: Url,
	) -> Self {
		Self {
			client_id: client_id.into(),
			client_secret: client_secret.into(),
			token_url,
			scopes: Vec::new(),
		}
	}

	/// Replaces the default scopes.
	pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.scopes = scopes.into_iter().map(Into::into).collect();

		self
	}

	/// Canonical form of the default scopes.
	pub fn default_scopes(&self) -> Result<ScopeSet, ConfigError> {
		ScopeSet::new(self.scopes.iter().cloned()).map_err(ConfigError::from)
	}
}
impl Debug for Configuration {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Configuration")
			.field("client_id", &self.client_id)
			.field("client_secret", &"<redacted>")
			.field("token_url", &self.token_url.as_str())
			.field("scopes", &self.scopes)
			.finish()
	}
}

/// Read-side accessor for the mount configuration.
pub trait ConfigSource
where
	Self: Send + Sync,
{
	/// Returns the current configuration, or `None` when the mount is not configured.
	fn get(&self) -> ConfigFuture<'_>;
}
impl ConfigSource for Configuration {
	fn get(&self) -> ConfigFuture<'_> {
		let config = self.clone();

		Box::pin(async move { Ok(Some(config)) })
	}
}
impl ConfigSource for Option<Configuration> {
	fn get(&self) -> ConfigFuture<'_> {
		let config = self.clone();

		Box::pin(async move { Ok(config) })
	}
}

/// Reads the JSON configuration entry stored under [`CONFIG_KEY`].
#[derive(Clone)]
pub struct StorageConfigSource {
	storage: Arc<dyn Storage>,
}
impl StorageConfigSource {
	/// Reads configuration from `storage`.
	pub fn new(storage: Arc<dyn Storage>) -> Self {
		Self { storage }
	}

	fn load(&self) -> StoreFuture<'_, Option<Vec<u8>>> {
		self.storage.get(CONFIG_KEY)
	}
}
impl ConfigSource for StorageConfigSource {
	fn get(&self) -> ConfigFuture<'_> {
		Box::pin(async move {
			let Some(bytes) = self.load().await? else {
				return Ok(None);
			};
			let de = &mut serde_json::Deserializer::from_slice(&bytes);
			let config = serde_path_to_error::deserialize(de)
				.map_err(|source| ConfigError::Decode { source })?;

			Ok(Some(config))
		})
	}
}
impl Debug for StorageConfigSource {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("StorageConfigSource(..)")
	}
}
