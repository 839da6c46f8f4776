//! Reads a scoped credential twice against a mock token endpoint, showing that the second read
//! is served from storage, then deletes every cached variant of the name.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use url::Url;
// self
use oauth2_cc_cache::{
	auth::CredentialName,
	broker::TokenBroker,
	config::Configuration,
	context::RequestContext,
	provider::{DefaultProviderStrategy, ProviderStrategy},
	service::{CredentialService, ReadCredentialRequest},
	store::{MemoryStorage, Storage},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::default());
	let strategy: Arc<dyn ProviderStrategy> = Arc::new(DefaultProviderStrategy);
	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-access\",\"token_type\":\"bearer\",\"expires_in\":900}",
			);
		})
		.await;
	let token_url = Url::parse(&server.url("/token"))?;
	let config =
		Configuration::new("demo-client", "super-secret", token_url).with_scopes(["reports.read"]);
	let broker = TokenBroker::new(storage, strategy);
	let service = CredentialService::new(Arc::new(config), broker);
	let ctx = RequestContext::background();
	let first =
		service.read_credential(&ctx, ReadCredentialRequest::from_raw("reporting", None)?).await?;
	let second = service
		.read_credential(&ctx, ReadCredentialRequest::from_raw("reporting", Some("reports.read"))?)
		.await?;

	println!("Access token: {}, expires: {:?}.", first.access_token.expose(), first.expires);
	println!("Second read reused the cached token: {}.", first == second);

	token_mock.assert_async().await;

	service.delete_credential(&ctx, &CredentialName::new("reporting")?).await?;

	println!("Deleted every cached token for `reporting`.");

	Ok(())
}
