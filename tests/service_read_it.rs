// crates.io
use httpmock::{Mock, prelude::*};
// self
use oauth2_cc_cache::{
	_preludet::*,
	auth::{CredentialName, ScopeSet, TokenRecord},
	broker::BrokerOptions,
	config::{CONFIG_KEY, Configuration, StorageConfigSource},
	context::RequestContext,
	key::CredentialKey,
	oauth::ClientAuthMethod,
	service::ReadCredentialRequest,
	store::{MemoryStorage, Storage, TokenStore},
};

// base64("foo:bar")
const BASIC_AUTH: &str = "Basic Zm9vOmJhcg==";

async fn token_mock<'a>(server: &'a MockServer, token: &str, expires_in: u64) -> Mock<'a> {
	let body = format!(
		r#"{{"access_token":"{token}","token_type":"bearer","expires_in":{expires_in}}}"#
	);

	server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/token")
				.header("authorization", BASIC_AUTH)
				.form_urlencoded_tuple("grant_type", "client_credentials");
			then.status(200).header("content-type", "application/json").body(body);
		})
		.await
}

fn read(name: &str, scopes: Option<&str>) -> ReadCredentialRequest {
	ReadCredentialRequest::from_raw(name, scopes).expect("Test request should be valid.")
}

#[tokio::test]
async fn read_scenario_follows_cache_lifecycle() {
	let server = MockServer::start_async().await;
	let (service, _storage) = build_reqwest_test_service(
		test_configuration(&server.url("/token"), &["a", "b", "c"]),
		BrokerOptions::default(),
	);
	let ctx = RequestContext::background();
	let mock = token_mock(&server, "abcd1", 5).await;
	let err = service
		.read_credential(&ctx, read("user", None))
		.await
		.expect_err("A token inside the expiry margin must not be handed out.");

	assert!(matches!(err, Error::TokenExpired));
	assert_eq!(err.to_string(), "Token expired.");

	mock.assert_calls_async(1).await;
	mock.delete_async().await;

	let mock = token_mock(&server, "abcd2", 3600).await;
	let first =
		service.read_credential(&ctx, read("user", None)).await.expect("Refresh should succeed.");
	let cached =
		service.read_credential(&ctx, read("user", None)).await.expect("Cached read should succeed.");

	assert_eq!(first.access_token.expose(), "abcd2");
	assert!(first.expires.is_some());
	assert_eq!(cached, first);

	mock.assert_calls_async(1).await;
	mock.delete_async().await;

	let mock = token_mock(&server, "abcd3", 3600).await;
	let other_name =
		service.read_credential(&ctx, read("user2", None)).await.expect("Second name should fetch.");
	let explicit_defaults = service
		.read_credential(&ctx, read("user2", Some("c,b,a")))
		.await
		.expect("Override equal to the defaults should hit the cache.");

	assert_eq!(other_name.access_token.expose(), "abcd3");
	assert_eq!(explicit_defaults.access_token.expose(), "abcd3");

	mock.assert_calls_async(1).await;
	mock.delete_async().await;

	let mock = token_mock(&server, "abcd4", 3600).await;
	let wider = service
		.read_credential(&ctx, read("user2", Some("a,b,c,d,e")))
		.await
		.expect("New scopes should fetch.");
	let reordered = service
		.read_credential(&ctx, read("user2", Some("a,b,c,e,d")))
		.await
		.expect("Reordered scopes should hit the cache.");

	assert_eq!(wider.access_token.expose(), "abcd4");
	assert_eq!(reordered.access_token.expose(), "abcd4");

	mock.assert_calls_async(1).await;
	mock.delete_async().await;

	let name = CredentialName::new("user2").expect("Name should be valid.");

	service.delete_credential(&ctx, &name).await.expect("Delete should succeed.");

	let mock = token_mock(&server, "abcd5", 3600).await;
	let refetched = service
		.read_credential(&ctx, read("user2", Some("a,b,c,e,d")))
		.await
		.expect("Read after delete should fetch.");
	let untouched = service
		.read_credential(&ctx, read("user", None))
		.await
		.expect("Other names survive deletion.");

	assert_eq!(refetched.access_token.expose(), "abcd5");
	assert_eq!(untouched.access_token.expose(), "abcd2");

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn requested_scopes_are_sent_space_joined_in_sorted_order() {
	let server = MockServer::start_async().await;
	let (service, _storage) = build_reqwest_test_service(
		test_configuration(&server.url("/token"), &[]),
		BrokerOptions::default(),
	);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token").form_urlencoded_tuple("scope", "a b c");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"access_token":"scoped","token_type":"bearer","expires_in":3600}"#);
		})
		.await;
	let credential = service
		.read_credential(&RequestContext::background(), read("svc", Some("c,a,b,a")))
		.await
		.expect("Scoped read should succeed.");

	assert_eq!(credential.access_token.expose(), "scoped");

	mock.assert_async().await;
}

#[tokio::test]
async fn expired_records_are_replaced_by_exactly_one_exchange() {
	let server = MockServer::start_async().await;
	let (service, storage) = build_reqwest_test_service(
		test_configuration(&server.url("/token"), &[]),
		BrokerOptions::default(),
	);
	let name = CredentialName::new("svc").expect("Name should be valid.");
	let key = CredentialKey::derive(&name, &ScopeSet::default());
	let stale = TokenRecord::builder()
		.access_token("stale")
		.expiry(OffsetDateTime::now_utc() - Duration::minutes(1))
		.build()
		.expect("Stale record should build.");

	TokenStore::new(storage.clone()).put(&key, &stale).await.expect("Seeding should succeed.");

	let mock = token_mock(&server, "fresh", 3600).await;
	let credential = service
		.read_credential(&RequestContext::background(), ReadCredentialRequest::new(name))
		.await
		.expect("Expired record should be refreshed.");

	assert_eq!(credential.access_token.expose(), "fresh");
	assert_eq!(service.broker().metrics().exchanges(), 1);

	mock.assert_calls_async(1).await;

	let stored = TokenStore::new(storage)
		.get(&key)
		.await
		.expect("Store read should succeed.")
		.expect("Fresh record should be persisted.");

	assert_eq!(stored.access_token.expose(), "fresh");
}

#[tokio::test]
async fn unconfigured_mount_never_touches_storage() {
	let (service, storage) =
		build_reqwest_test_service(None::<Configuration>, BrokerOptions::default());
	let err = service
		.read_credential(&RequestContext::background(), read("user", None))
		.await
		.expect_err("Reads without configuration must fail.");

	assert!(matches!(err, Error::NotConfigured));
	assert_eq!(err.to_string(), "The mount is not configured.");
	assert!(storage.is_empty());
}

#[tokio::test]
async fn rejected_credentials_are_reported_and_not_persisted() {
	let server = MockServer::start_async().await;
	let (service, storage) = build_reqwest_test_service(
		test_configuration(&server.url("/token"), &[]),
		BrokerOptions::default(),
	);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(401)
				.header("content-type", "application/json")
				.body(r#"{"error":"invalid_client","error_description":"unknown client"}"#);
		})
		.await;
	let err = service
		.read_credential(&RequestContext::background(), read("user", None))
		.await
		.expect_err("Rejected credentials must surface as an error.");

	assert!(matches!(err, Error::InvalidCredentials { .. }));
	assert!(err.to_string().starts_with("Invalid client credentials"));
	assert!(storage.is_empty());
	assert_eq!(service.broker().metrics().failures(), 1);

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn missing_token_endpoint_counts_as_invalid_credentials() {
	let server = MockServer::start_async().await;
	let (service, storage) = build_reqwest_test_service(
		test_configuration(&server.url("/missing"), &[]),
		BrokerOptions::default(),
	);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/missing");
			then.status(404);
		})
		.await;
	let err = service
		.read_credential(&RequestContext::background(), read("user", None))
		.await
		.expect_err("A 404 token endpoint must fail.");

	assert!(matches!(err, Error::InvalidCredentials { .. }));
	assert!(storage.is_empty());

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn server_errors_are_upstream_failures() {
	let server = MockServer::start_async().await;
	let (service, storage) = build_reqwest_test_service(
		test_configuration(&server.url("/token"), &[]),
		BrokerOptions::default(),
	);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(503)
				.header("content-type", "application/json")
				.header("retry-after", "30")
				.body(r#"{"error":"temporarily_unavailable"}"#);
		})
		.await;
	let err = service
		.read_credential(&RequestContext::background(), read("user", None))
		.await
		.expect_err("Server errors must fail the read.");

	match err {
		Error::Upstream(upstream) => assert_eq!(upstream.status(), Some(503)),
		other => panic!("Expected an upstream error, got {other:?}."),
	}
	assert!(storage.is_empty());

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn request_body_client_auth_posts_credentials_in_the_form() {
	let server = MockServer::start_async().await;
	let (service, _storage) = build_reqwest_test_service(
		test_configuration(&server.url("/token"), &[]),
		BrokerOptions::default().with_client_auth(ClientAuthMethod::ClientSecretPost),
	);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/token")
				.form_urlencoded_tuple("client_id", "foo")
				.form_urlencoded_tuple("client_secret", "bar");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"access_token":"posted","token_type":"bearer"}"#);
		})
		.await;
	let credential = service
		.read_credential(&RequestContext::background(), read("user", None))
		.await
		.expect("Form-authenticated read should succeed.");

	assert_eq!(credential.access_token.expose(), "posted");
	assert!(credential.expires.is_none(), "Tokens without expires_in never expire.");

	mock.assert_async().await;
}

#[tokio::test]
async fn custom_margin_changes_the_validity_window() {
	let server = MockServer::start_async().await;
	let (service, _storage) = build_reqwest_test_service(
		test_configuration(&server.url("/token"), &[]),
		BrokerOptions::default().with_expiry_margin(Duration::ZERO),
	);
	let mock = token_mock(&server, "short", 5).await;
	let credential = service
		.read_credential(&RequestContext::background(), read("user", None))
		.await
		.expect("Without a margin a 5 second token is valid.");

	assert_eq!(credential.access_token.expose(), "short");

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn storage_config_source_drives_reads() {
	let server = MockServer::start_async().await;
	let backend = Arc::new(MemoryStorage::default());
	let raw = serde_json::to_vec(&test_configuration(&server.url("/token"), &["a"]))
		.expect("Configuration should serialize.");

	backend.put(CONFIG_KEY, raw).await.expect("Config write should succeed.");

	let (service, _storage) = build_reqwest_test_service(
		StorageConfigSource::new(backend),
		BrokerOptions::default(),
	);
	let mock = token_mock(&server, "from-storage", 3600).await;
	let credential = service
		.read_credential(&RequestContext::background(), read("user", None))
		.await
		.expect("Stored configuration should be used.");

	assert_eq!(credential.access_token.expose(), "from-storage");

	mock.assert_calls_async(1).await;
}
