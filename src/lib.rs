//! Scoped OAuth 2.0 client-credentials token cache.
//!
//! One bearer token is cached per credential name and scope set on top of any key-value
//! [`store::Storage`]. Refreshes are single-flight per key and deletion cascades across every
//! scope variant of a name.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod broker;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod key;
pub mod oauth;
pub mod obs;
pub mod provider;
pub mod service;
pub mod store;
#[cfg(feature = "reqwest")]
#[doc(hidden)]
pub mod _preludet {
	//! Convenience re-exports and helpers shared by unit tests, integration tests, and demos.

	pub use crate::_prelude::*;

	// self
	use crate::{
		broker::{BrokerOptions, TokenBroker},
		config::{ConfigSource, Configuration},
		http::ReqwestHttpClient,
		oauth::ReqwestTransportErrorMapper,
		provider::{DefaultProviderStrategy, ProviderStrategy},
		service::CredentialService,
		store::{MemoryStorage, Storage},
	};

	/// Service type alias used by reqwest-backed integration tests.
	pub type ReqwestTestService = CredentialService<ReqwestHttpClient, ReqwestTransportErrorMapper>;

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Builds a configuration pointing at `token_url` with the `foo`/`bar` client pair.
	pub fn test_configuration(token_url: &str, scopes: &[&str]) -> Configuration {
		Configuration::new(
			"foo",
			"bar",
			Url::parse(token_url).expect("Mock token endpoint should parse successfully."),
		)
		.with_scopes(scopes.iter().copied())
	}

	/// Constructs a [`CredentialService`] backed by in-memory storage, the default provider
	/// strategy, and the reqwest transport used across integration tests.
	pub fn build_reqwest_test_service(
		config: impl 'static + ConfigSource,
		options: BrokerOptions,
	) -> (ReqwestTestService, Arc<MemoryStorage>) {
		let storage_backend = Arc::new(MemoryStorage::default());
		let storage: Arc<dyn Storage> = storage_backend.clone();
		let strategy: Arc<dyn ProviderStrategy> = Arc::new(DefaultProviderStrategy);
		let broker = TokenBroker::with_http_client(
			storage,
			strategy,
			test_reqwest_http_client(),
			Arc::new(ReqwestTransportErrorMapper),
		)
		.with_options(options);
		let service = CredentialService::new(Arc::new(config), broker);

		(service, storage_backend)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		hash::Hash,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::{Mutex as AsyncMutex, RwLock as AsyncRwLock};
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
