//! Cache-level error types shared across the service, broker, and stores.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
///
/// Operators can tell "not set up yet" ([`Error::NotConfigured`]) apart from "set up with the
/// wrong secret" ([`Error::InvalidCredentials`]) and from transient failures
/// ([`Error::Upstream`], [`Error::Storage`]).
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Token endpoint or transport failure; the caller may retry.
	#[error(transparent)]
	Upstream(#[from] UpstreamError),
	/// Caller-supplied request failed boundary validation.
	#[error(transparent)]
	InvalidRequest(#[from] RequestError),

	/// No client configuration exists for this mount.
	#[error("The mount is not configured.")]
	NotConfigured,
	/// Provider rejected the configured client ID/secret.
	#[error("Invalid client credentials: {reason}.")]
	InvalidCredentials {
		/// Provider- or cache-supplied reason string.
		reason: String,
	},
	/// A token outside its validity window reached the response path.
	#[error("Token expired.")]
	TokenExpired,
	/// The caller cancelled the operation.
	#[error("Operation was cancelled while waiting on {stage}.")]
	Cancelled {
		/// Suspension point that observed the cancellation.
		stage: &'static str,
	},
	/// The caller-supplied deadline elapsed.
	#[error("Deadline exceeded while waiting on {stage}.")]
	DeadlineExceeded {
		/// Suspension point that observed the deadline.
		stage: &'static str,
	},
}

/// Configuration and validation failures raised locally.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Configuration contains an invalid token URL.
	#[error("Configured token URL is invalid.")]
	InvalidTokenUrl {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Configured default scopes cannot be normalized.
	#[error("Configured scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Stored configuration entry could not be decoded.
	#[error("Stored configuration could not be decoded.")]
	Decode {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Failures raised while talking to the token endpoint. None of them are retried internally.
#[derive(Debug, ThisError)]
pub enum UpstreamError {
	/// Provider returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Provider- or cache-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Token endpoint returned a success response without an access token.
	#[error("Token endpoint returned an empty access token.")]
	EmptyAccessToken,
	/// Token endpoint returned an `expires_in` that does not fit the clock range.
	#[error("Token endpoint returned an expires_in value of {seconds}s, beyond the supported range.")]
	ExpiresInOutOfRange {
		/// Lifetime as reported by the provider.
		seconds: u64,
	},
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the token endpoint.")]
	Io(#[from] std::io::Error),
}
impl UpstreamError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// HTTP status reported by the token endpoint, when one was observed.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::TokenEndpoint { status, .. } | Self::TokenResponseParse { status, .. } => *status,
			_ => None,
		}
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for UpstreamError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Boundary validation failures for inbound credential requests.
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum RequestError {
	/// Credential name failed validation.
	#[error(transparent)]
	Name(#[from] crate::auth::NameError),
	/// Scope override failed validation.
	#[error(transparent)]
	Scope(#[from] crate::auth::ScopeValidationError),
}
