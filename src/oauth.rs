//! Client-credentials exchange over the `oauth2` crate.

pub use oauth2;

// crates.io
use oauth2::{
	AuthType, ClientId, ClientSecret, EndpointNotSet, EndpointSet, ExtraTokenFields,
	HttpClientError, RequestTokenError, Scope, StandardRevocableToken, StandardTokenResponse,
	TokenResponse, TokenUrl,
	basic::{
		BasicErrorResponse, BasicRequestTokenError, BasicRevocationErrorResponse,
		BasicTokenIntrospectionResponse, BasicTokenType,
	},
};
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenRecord, TokenRecordBuilderError},
	config::Configuration,
	error::{ConfigError, UpstreamError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	provider::{ProviderErrorContext, ProviderErrorKind, ProviderStrategy},
};

type ExchangeClient = oauth2::Client<
	BasicErrorResponse,
	RawTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointSet,
>;
type RawTokenResponse = StandardTokenResponse<RawTokenFields, BasicTokenType>;

/// Response fields beyond the standard token response, kept verbatim on the record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTokenFields {
	/// Every unrecognized top-level field.
	#[serde(flatten)]
	pub fields: BTreeMap<String, serde_json::Value>,
}
impl ExtraTokenFields for RawTokenFields {}

/// How the client ID/secret pair is presented to the token endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	/// HTTP Basic with `client_id`/`client_secret`.
	#[default]
	ClientSecretBasic,
	/// Form POST body parameters for `client_id`/`client_secret`.
	ClientSecretPost,
}

/// Maps HTTP transport failures into cache [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a cache error.
	fn map_transport_error(
		&self,
		strategy: &dyn ProviderStrategy,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		_strategy: &dyn ProviderStrategy,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(meta, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => UpstreamError::Io(inner).into(),
			HttpClientError::Other(message) => endpoint_error(
				meta,
				format!("HTTP client error occurred while calling the token endpoint: {message}"),
			),
			_ => endpoint_error(meta, "HTTP client error occurred while calling the token endpoint"),
		}
	}
}

/// One-shot client-credentials exchange built from the current configuration.
pub(crate) struct ExchangeFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ExchangeClient,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> ExchangeFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) fn from_config(
		config: &Configuration,
		auth_method: ClientAuthMethod,
		http_client: Arc<C>,
		error_mapper: Arc<M>,
	) -> Result<Self> {
		let token_url = TokenUrl::new(config.token_url.to_string())
			.map_err(|source| ConfigError::InvalidTokenUrl { source })?;
		let auth_type = match auth_method {
			ClientAuthMethod::ClientSecretBasic => AuthType::BasicAuth,
			ClientAuthMethod::ClientSecretPost => AuthType::RequestBody,
		};
		let oauth_client: ExchangeClient = oauth2::Client::new(ClientId::new(config.client_id.clone()))
			.set_client_secret(ClientSecret::new(config.client_secret.clone()))
			.set_auth_type(auth_type)
			.set_token_uri(token_url);

		Ok(Self { oauth_client, http_client, error_mapper })
	}

	/// Performs a single `grant_type=client_credentials` request for `scopes`.
	pub(crate) async fn exchange(
		&self,
		strategy: &dyn ProviderStrategy,
		scopes: &ScopeSet,
	) -> Result<TokenRecord> {
		let meta = ResponseMetadataSlot::default();
		let handle = self.http_client.with_metadata(meta.clone());
		let mut form = BTreeMap::new();

		strategy.augment_token_request(&mut form);

		let mut request = self.oauth_client.exchange_client_credentials();

		for scope in scopes {
			request = request.add_scope(Scope::new(scope.to_owned()));
		}
		for (key, value) in form.iter().filter(|(key, _)| !is_reserved_param(key)) {
			request = request.add_extra_param(key.as_str(), value.as_str());
		}

		let response = request
			.request_async(&handle)
			.await
			.map_err(|err| map_request_error(strategy, meta.take(), err, self.error_mapper.as_ref()))?;

		map_token_response(response)
	}
}

fn is_reserved_param(key: &str) -> bool {
	matches!(key, "grant_type" | "scope" | "client_id" | "client_secret")
}

fn map_token_response(response: RawTokenResponse) -> Result<TokenRecord> {
	let access_token = response.access_token().secret();

	if access_token.is_empty() {
		return Err(UpstreamError::EmptyAccessToken.into());
	}

	let token_type: &str = response.token_type().as_ref();
	let mut builder = TokenRecord::builder()
		.access_token(access_token.to_owned())
		.token_type(token_type)
		.issued_at(OffsetDateTime::now_utc())
		.extra(response.extra_fields().fields.clone());

	let lifetime = response.expires_in().filter(|lifetime| !lifetime.is_zero());

	// A zero lifetime means the provider did not bound the token.
	if let Some(expires_in) = lifetime {
		let seconds = expires_in.as_secs();
		let secs = i64::try_from(seconds)
			.map_err(|_| UpstreamError::ExpiresInOutOfRange { seconds })?;

		builder = builder.expires_in(Duration::seconds(secs));
	}
	if let Some(refresh) = response.refresh_token() {
		builder = builder.refresh_token(refresh.secret().to_owned());
	}

	builder.build().map_err(|err| match err {
		TokenRecordBuilderError::MissingAccessToken => UpstreamError::EmptyAccessToken.into(),
		TokenRecordBuilderError::ExpiryOutOfRange => UpstreamError::ExpiresInOutOfRange {
			seconds: lifetime.map(|value| value.as_secs()).unwrap_or_default(),
		}
		.into(),
	})
}

fn map_request_error<E, M>(
	strategy: &dyn ProviderStrategy,
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
	mapper: &M,
) -> Error
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let meta_ref = meta.as_ref();

	match err {
		RequestTokenError::ServerResponse(response) => {
			let code: &str = response.error().as_ref();
			let mut ctx = response_context(meta_ref).with_oauth_error(code);

			if let Some(description) = response.error_description() {
				ctx = ctx.with_error_description(description.clone());
			}

			let message = match response.error_description() {
				Some(description) => format!("{code}: {description}"),
				None => code.to_owned(),
			};

			classify(strategy, &ctx, meta_ref, message)
		},
		RequestTokenError::Request(error) => mapper.map_transport_error(strategy, meta_ref, error),
		RequestTokenError::Parse(source, _body) => {
			let ctx = response_context(meta_ref);

			if meta_status(meta_ref).is_some_and(|status| status >= 400)
				&& strategy.classify_token_error(&ctx) == ProviderErrorKind::Rejected
			{
				return rejected(format!(
					"token endpoint answered with HTTP {}",
					meta_status(meta_ref).unwrap_or_default()
				));
			}

			UpstreamError::TokenResponseParse { source, status: meta_status(meta_ref) }.into()
		},
		RequestTokenError::Other(message) =>
			classify(strategy, &response_context(meta_ref), meta_ref, message),
	}
}

fn classify(
	strategy: &dyn ProviderStrategy,
	ctx: &ProviderErrorContext,
	meta: Option<&ResponseMetadata>,
	message: String,
) -> Error {
	match strategy.classify_token_error(ctx) {
		ProviderErrorKind::Rejected => rejected(message),
		ProviderErrorKind::Transient => endpoint_error(meta, message),
	}
}

fn rejected(reason: String) -> Error {
	Error::InvalidCredentials { reason }
}

fn response_context(meta: Option<&ResponseMetadata>) -> ProviderErrorContext {
	let mut ctx = ProviderErrorContext::new();

	if let Some(status) = meta_status(meta) {
		ctx = ctx.with_http_status(status);
	}
	if let Some(body) = meta.and_then(|value| value.body_preview.clone()) {
		ctx = ctx.with_body_preview(body);
	}

	ctx
}

fn endpoint_error(meta: Option<&ResponseMetadata>, message: impl Into<String>) -> Error {
	UpstreamError::TokenEndpoint {
		message: message.into(),
		status: meta_status(meta),
		retry_after: meta.and_then(|value| value.retry_after),
	}
	.into()
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(meta: Option<&ResponseMetadata>, err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return UpstreamError::TokenEndpoint {
			message: "Request timed out while calling the token endpoint".into(),
			status: meta_status(meta).or_else(|| err.status().map(|code| code.as_u16())),
			retry_after: meta.and_then(|value| value.retry_after),
		}
		.into();
	}

	UpstreamError::from(err).into()
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::provider::DefaultProviderStrategy;

	fn response(body: &str) -> RawTokenResponse {
		serde_json::from_str(body).expect("Token response fixture should parse.")
	}

	#[test]
	fn token_response_keeps_type_refresh_and_extra_fields() {
		let record = map_token_response(response(
			r#"{"access_token":"abcd1","token_type":"bearer","expires_in":3600,"refresh_token":"r1","audience":"api"}"#,
		))
		.expect("Complete response should map.");

		assert_eq!(record.access_token.expose(), "abcd1");
		assert_eq!(record.token_type, "bearer");
		assert!(record.expiry.is_some());
		assert_eq!(record.refresh_token.as_ref().map(|secret| secret.expose()), Some("r1"));
		assert_eq!(record.extra.get("audience"), Some(&serde_json::json!("api")));
		assert!(!record.extra.contains_key("access_token"));
	}

	#[test]
	fn missing_or_zero_lifetime_means_no_expiry() {
		let unbounded = map_token_response(response(r#"{"access_token":"a","token_type":"bearer"}"#))
			.expect("Response without expires_in should map.");
		let zero = map_token_response(response(
			r#"{"access_token":"a","token_type":"bearer","expires_in":0}"#,
		))
		.expect("Response with zero expires_in should map.");

		assert!(unbounded.expiry.is_none());
		assert!(zero.expiry.is_none());
	}

	#[test]
	fn empty_access_token_is_an_upstream_error() {
		let err = map_token_response(response(r#"{"access_token":"","token_type":"bearer"}"#))
			.expect_err("Empty access tokens must be rejected.");

		assert!(matches!(err, Error::Upstream(UpstreamError::EmptyAccessToken)));
	}

	#[test]
	fn oversized_lifetime_is_an_upstream_error() {
		let err = map_token_response(response(
			r#"{"access_token":"a","token_type":"bearer","expires_in":1000000000000000}"#,
		))
		.expect_err("Lifetimes past the clock range must be reported.");

		assert!(matches!(
			err,
			Error::Upstream(UpstreamError::ExpiresInOutOfRange { seconds: 1_000_000_000_000_000 })
		));

		let err = map_token_response(response(&format!(
			r#"{{"access_token":"a","token_type":"bearer","expires_in":{}}}"#,
			u64::MAX
		)))
		.expect_err("Lifetimes past i64 must be reported.");

		assert!(matches!(err, Error::Upstream(UpstreamError::ExpiresInOutOfRange { .. })));
	}

	#[test]
	fn other_errors_with_auth_status_count_as_rejections() {
		let meta = ResponseMetadata { status: Some(401), ..Default::default() };
		let err = classify(
			&DefaultProviderStrategy,
			&response_context(Some(&meta)),
			Some(&meta),
			"Server returned empty error response".into(),
		);

		assert!(matches!(err, Error::InvalidCredentials { .. }));

		let meta = ResponseMetadata { status: Some(503), ..Default::default() };
		let err = classify(
			&DefaultProviderStrategy,
			&response_context(Some(&meta)),
			Some(&meta),
			"Service unavailable".into(),
		);

		assert!(matches!(err, Error::Upstream(UpstreamError::TokenEndpoint { status: Some(503), .. })));
	}

	#[test]
	fn reserved_form_parameters_are_protected() {
		assert!(is_reserved_param("grant_type"));
		assert!(is_reserved_param("scope"));
		assert!(!is_reserved_param("audience"));
	}
}
