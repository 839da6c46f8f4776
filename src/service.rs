//! Public entry points: read and delete credentials for one mount.

// self
use crate::{
	_prelude::*,
	auth::{CredentialName, ScopeSet, TokenRecord, TokenSecret},
	broker::TokenBroker,
	config::ConfigSource,
	context::RequestContext,
	error::RequestError,
	http::TokenHttpClient,
	key::{self, CredentialKey},
	oauth::TransportErrorMapper,
	obs::{self, OpKind},
};

/// Validated read request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadCredentialRequest {
	/// Credential name the token is cached under.
	pub name: CredentialName,
	/// Scope override; `None` falls back to the configured default scopes.
	pub scopes: Option<ScopeSet>,
}
impl ReadCredentialRequest {
	/// Reads `name` with the configured default scopes.
	pub fn new(name: CredentialName) -> Self {
		Self { name, scopes: None }
	}

	/// Overrides the requested scopes.
	pub fn with_scopes(mut self, scopes: ScopeSet) -> Self {
		self.scopes = Some(scopes);

		self
	}

	/// Validates raw boundary input.
	///
	/// `scopes` is a comma-separated list. A missing or blank list means "use the defaults".
	pub fn from_raw(name: &str, scopes: Option<&str>) -> Result<Self, RequestError> {
		let name = CredentialName::new(name)?;
		let scopes = match scopes.filter(|raw| !raw.trim().is_empty()) {
			Some(raw) => Some(ScopeSet::from_comma_separated(raw)?),
			None => None,
		};

		Ok(Self { name, scopes })
	}
}

/// Token handed back to callers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
	/// Bearer token value.
	pub access_token: TokenSecret,
	/// Expiry instant, `None` when the provider did not bound the token.
	#[serde(with = "time::serde::rfc3339::option")]
	pub expires: Option<OffsetDateTime>,
}
impl From<TokenRecord> for Credential {
	fn from(record: TokenRecord) -> Self {
		Self { access_token: record.access_token, expires: record.expiry }
	}
}

/// Credential cache for one mount.
///
/// Construct once and share by reference; all state lives in the configuration source and the
/// broker's storage.
pub struct CredentialService<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	config: Arc<dyn ConfigSource>,
	broker: TokenBroker<C, M>,
}
impl<C, M> CredentialService<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Wires a configuration source to a broker.
	pub fn new(config: Arc<dyn ConfigSource>, broker: TokenBroker<C, M>) -> Self {
		Self { config, broker }
	}

	/// Broker backing this service.
	pub fn broker(&self) -> &TokenBroker<C, M> {
		&self.broker
	}

	/// Returns a valid bearer token for the request's name and effective scopes.
	///
	/// Fails with [`Error::NotConfigured`] before any storage access when the mount has no
	/// configuration, and with [`Error::TokenExpired`] when the provider issued a token that
	/// is already inside the expiry margin. That token is kept, so the next read refreshes.
	pub async fn read_credential(
		&self,
		ctx: &RequestContext,
		request: ReadCredentialRequest,
	) -> Result<Credential> {
		obs::observe(OpKind::Read, "read_credential", async {
			let config = ctx.run("config_get", self.config.get()).await?.ok_or(Error::NotConfigured)?;
			let scopes = match request.scopes {
				Some(scopes) => scopes,
				None => config.default_scopes()?,
			};
			let key = CredentialKey::derive(&request.name, &scopes);
			let record = self.broker.get_or_refresh(ctx, &config, &key, &scopes).await?;

			if !record.is_valid_at(OffsetDateTime::now_utc(), self.broker.options().expiry_margin) {
				return Err(Error::TokenExpired);
			}

			Ok(record.into())
		})
		.await
	}

	/// Deletes every cached token for `name`, across all scope variants.
	///
	/// Deleting a name with nothing cached succeeds.
	pub async fn delete_credential(&self, ctx: &RequestContext, name: &CredentialName) -> Result<()> {
		obs::observe(OpKind::Delete, "delete_credential", async {
			self.broker.delete_all(ctx, &key::name_bucket(name)).await.map(|_| ())
		})
		.await
	}
}
impl<C, M> Debug for CredentialService<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialService").field("broker", &self.broker).finish()
	}
}
