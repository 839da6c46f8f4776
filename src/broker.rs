//! Guarded token refresh and cascade deletion.
//!
//! The broker is the only writer of token records. Reads that find a valid token return
//! without locking. Everything else goes through two lock tables: a read/write lock per
//! credential name and a mutex per credential key. Refreshes hold the name lock shared and
//! the key lock exclusively, so at most one exchange is in flight per key while distinct
//! keys refresh in parallel. Deletion holds the name lock exclusively and therefore never
//! interleaves with a refresh of any scope variant of that name.

mod guard;
mod metrics;

pub use metrics::*;

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenRecord},
	broker::guard::LockTable,
	config::Configuration,
	context::RequestContext,
	http::TokenHttpClient,
	key::{BucketKey, CredentialKey},
	oauth::{ClientAuthMethod, ExchangeFacade, TransportErrorMapper},
	obs::{self, CacheEvent, OpKind},
	provider::ProviderStrategy,
	store::{Storage, TokenStore},
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

#[cfg(feature = "reqwest")]
/// Broker specialized for the crate's default reqwest transport stack.
pub type ReqwestTokenBroker = TokenBroker<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Tunables applied to every refresh.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BrokerOptions {
	/// Tokens expiring within this window are treated as expired.
	pub expiry_margin: Duration,
	/// How client credentials are presented to the token endpoint.
	pub client_auth: ClientAuthMethod,
}
impl BrokerOptions {
	/// Overrides the expiry safety margin; negative values clamp to zero.
	pub fn with_expiry_margin(mut self, margin: Duration) -> Self {
		self.expiry_margin = if margin.is_negative() { Duration::ZERO } else { margin };

		self
	}

	/// Overrides the client authentication method.
	pub fn with_client_auth(mut self, method: ClientAuthMethod) -> Self {
		self.client_auth = method;

		self
	}
}
impl Default for BrokerOptions {
	fn default() -> Self {
		Self {
			expiry_margin: TokenRecord::DEFAULT_EXPIRY_MARGIN,
			client_auth: ClientAuthMethod::default(),
		}
	}
}

#[derive(Debug, Default)]
struct BrokerLocks {
	names: LockTable<BucketKey, AsyncRwLock<()>>,
	keys: LockTable<CredentialKey, AsyncMutex<()>>,
}

/// Fetches, caches, and deletes client-credentials tokens for one mount.
pub struct TokenBroker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// HTTP client wrapper used for every token request.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors before surfacing them to callers.
	pub transport_mapper: Arc<M>,
	/// Strategy responsible for provider-specific request adjustments and error classification.
	pub strategy: Arc<dyn ProviderStrategy>,
	store: TokenStore,
	options: BrokerOptions,
	metrics: Arc<RefreshMetrics>,
	locks: Arc<BrokerLocks>,
}
impl<C, M> TokenBroker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a broker that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		storage: Arc<dyn Storage>,
		strategy: Arc<dyn ProviderStrategy>,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			strategy,
			store: TokenStore::new(storage),
			options: BrokerOptions::default(),
			metrics: Default::default(),
			locks: Default::default(),
		}
	}

	/// Replaces the refresh options.
	pub fn with_options(mut self, options: BrokerOptions) -> Self {
		self.options = options;

		self
	}

	/// Active refresh options.
	pub fn options(&self) -> &BrokerOptions {
		&self.options
	}

	/// Counters describing how refreshes were resolved.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.metrics
	}

	/// Returns a valid token for `key`, exchanging `config`'s client credentials for a new one
	/// when the cached token is absent or expired.
	///
	/// The freshly exchanged token is returned as issued, even when the provider granted a
	/// lifetime shorter than the expiry margin; callers decide how to treat it.
	pub async fn get_or_refresh(
		&self,
		ctx: &RequestContext,
		config: &Configuration,
		key: &CredentialKey,
		scopes: &ScopeSet,
	) -> Result<TokenRecord> {
		obs::observe(OpKind::Refresh, "get_or_refresh", async {
			if let Some(record) = self.load_valid(ctx, key).await? {
				self.metrics.record_cache_hit();
				obs::emit(CacheEvent::CacheHit { key: key.as_str() });

				return Ok(record);
			}

			let result = self.refresh_guarded(ctx, config, key, scopes).await;

			if result.is_err() {
				self.metrics.record_failure();
			}

			result
		})
		.await
	}

	/// Removes every token stored under `bucket` and returns how many entries were deleted.
	///
	/// Holds the bucket's exclusive lock for the whole sweep.
	pub async fn delete_all(&self, ctx: &RequestContext, bucket: &BucketKey) -> Result<usize> {
		let slot = self.locks.names.checkout(bucket.clone());
		let _exclusive = ctx.bound("name_guard", slot.write()).await?;
		let children = ctx.run("store_list", self.store.list(bucket)).await?;
		let mut removed = 0;

		// Nested folders are never written under a bucket.
		for suffix in children.iter().filter(|child| !child.ends_with('/')) {
			ctx.run("store_delete", self.store.delete(&bucket.child(suffix))).await?;

			removed += 1;
		}

		obs::emit(CacheEvent::Deleted { bucket: bucket.as_str(), removed });

		Ok(removed)
	}

	async fn refresh_guarded(
		&self,
		ctx: &RequestContext,
		config: &Configuration,
		key: &CredentialKey,
		scopes: &ScopeSet,
	) -> Result<TokenRecord> {
		let name_slot = self.locks.names.checkout(key.bucket().clone());
		let _shared = ctx.bound("name_guard", name_slot.read()).await?;
		let key_slot = self.locks.keys.checkout(key.clone());
		let _singleflight = ctx.bound("key_guard", key_slot.lock()).await?;

		if let Some(record) = self.load_valid(ctx, key).await? {
			self.metrics.record_race_absorbed();
			obs::emit(CacheEvent::RaceAbsorbed { key: key.as_str() });

			return Ok(record);
		}

		let facade: ExchangeFacade<C, M> = ExchangeFacade::from_config(
			config,
			self.options.client_auth,
			self.http_client.clone(),
			self.transport_mapper.clone(),
		)?;
		let record = ctx
			.run("exchange", facade.exchange(self.strategy.as_ref(), scopes))
			.await
			.inspect_err(|err| {
				if let Error::InvalidCredentials { reason } = err {
					obs::emit(CacheEvent::Rejected { key: key.as_str(), reason });
				}
			})?;

		ctx.run("store_put", self.store.put(key, &record)).await?;

		self.metrics.record_exchange();
		obs::emit(CacheEvent::Exchanged { key: key.as_str() });

		Ok(record)
	}

	async fn load_valid(
		&self,
		ctx: &RequestContext,
		key: &CredentialKey,
	) -> Result<Option<TokenRecord>> {
		let record = ctx.run("store_get", self.store.get(key)).await?;
		let now = OffsetDateTime::now_utc();

		Ok(record.filter(|record| record.is_valid_at(now, self.options.expiry_margin)))
	}
}
#[cfg(feature = "reqwest")]
impl TokenBroker<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a broker that provisions its own reqwest-backed transport.
	pub fn new(storage: Arc<dyn Storage>, strategy: Arc<dyn ProviderStrategy>) -> Self {
		Self::with_http_client(
			storage,
			strategy,
			ReqwestHttpClient::default(),
			Arc::new(ReqwestTransportErrorMapper),
		)
	}
}
impl<C, M> Clone for TokenBroker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self {
			http_client: self.http_client.clone(),
			transport_mapper: self.transport_mapper.clone(),
			strategy: self.strategy.clone(),
			store: self.store.clone(),
			options: self.options,
			metrics: self.metrics.clone(),
			locks: self.locks.clone(),
		}
	}
}
impl<C, M> Debug for TokenBroker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenBroker")
			.field("options", &self.options)
			.field("metrics", &self.metrics)
			.finish()
	}
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// crates.io
	use httpmock::prelude::*;
	// self
	use super::*;
	use crate::{
		_preludet::{test_configuration, test_reqwest_http_client},
		auth::CredentialName,
		provider::DefaultProviderStrategy,
		store::MemoryStorage,
	};

	fn broker(storage: Arc<MemoryStorage>) -> ReqwestTokenBroker {
		TokenBroker::with_http_client(
			storage,
			Arc::new(DefaultProviderStrategy),
			test_reqwest_http_client(),
			Arc::new(ReqwestTransportErrorMapper),
		)
	}

	fn key_for(name: &str, scopes: &ScopeSet) -> CredentialKey {
		CredentialKey::derive(&CredentialName::new(name).expect("Name should be valid."), scopes)
	}

	#[tokio::test]
	async fn refresh_releases_lock_entries() {
		let server = MockServer::start_async().await;
		let mock = server
			.mock_async(|when, then| {
				when.method(POST).path("/token");
				then.status(200)
					.header("content-type", "application/json")
					.body(r#"{"access_token":"abcd1","token_type":"bearer","expires_in":3600}"#);
			})
			.await;
		let broker = broker(Arc::new(MemoryStorage::default()));
		let config = test_configuration(&server.url("/token"), &[]);
		let scopes = ScopeSet::default();
		let key = key_for("svc", &scopes);
		let ctx = RequestContext::background();
		let record = broker
			.get_or_refresh(&ctx, &config, &key, &scopes)
			.await
			.expect("Exchange should succeed.");

		assert_eq!(record.access_token.expose(), "abcd1");
		assert_eq!(broker.locks.names.len(), 0);
		assert_eq!(broker.locks.keys.len(), 0);

		broker.get_or_refresh(&ctx, &config, &key, &scopes).await.expect("Cached read should succeed.");

		mock.assert_calls_async(1).await;
		assert_eq!(broker.metrics().exchanges(), 1);
		assert_eq!(broker.metrics().cache_hits(), 1);
	}

	#[tokio::test]
	async fn pending_delete_blocks_refresh_until_deadline() {
		let broker = broker(Arc::new(MemoryStorage::default()));
		let config = test_configuration("http://127.0.0.1:9/token", &[]);
		let scopes = ScopeSet::default();
		let key = key_for("svc", &scopes);
		let slot = broker.locks.names.checkout(key.bucket().clone());
		let _exclusive = slot.write().await;
		let ctx = RequestContext::background().with_timeout(std::time::Duration::from_millis(50));
		let err = broker
			.get_or_refresh(&ctx, &config, &key, &scopes)
			.await
			.expect_err("Refresh must wait for the exclusive holder.");

		assert!(matches!(err, Error::DeadlineExceeded { stage: "name_guard" }));
		assert_eq!(broker.metrics().failures(), 1);
	}

	#[test]
	fn negative_margin_clamps_to_zero() {
		let options = BrokerOptions::default().with_expiry_margin(Duration::seconds(-5));

		assert_eq!(options.expiry_margin, Duration::ZERO);
		assert_eq!(BrokerOptions::default().expiry_margin, Duration::seconds(10));
	}
}
