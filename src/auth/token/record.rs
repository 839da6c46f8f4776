//! Persisted token records, validity checks, and builders.

// self
use crate::{_prelude::*, auth::token::secret::TokenSecret};

/// Current lifecycle status for a token record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
	/// Token can be handed out.
	Valid,
	/// Token is past (or inside the safety margin before) its expiry instant.
	Expired,
	/// Token carries no access token at all.
	Empty,
}

/// Errors produced by [`TokenRecordBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum TokenRecordBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when the relative expiry lands outside the representable clock range.
	#[error("Expiry is outside the supported range.")]
	ExpiryOutOfRange,
}

/// Token record exactly as returned by the upstream exchange.
///
/// The JSON form uses the field names `access_token`, `token_type`, `expiry` (RFC 3339),
/// `refresh_token`, and `extra` for any additional response fields.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenRecord {
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Token type reported by the provider (usually `bearer`).
	#[serde(default)]
	pub token_type: String,
	/// Absolute expiry; `None` means the token never expires.
	#[serde(default, with = "time::serde::rfc3339::option")]
	pub expiry: Option<OffsetDateTime>,
	/// Refresh token secret, if the provider issued one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<TokenSecret>,
	/// Extra response fields the provider returned alongside the token.
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub extra: BTreeMap<String, serde_json::Value>,
}
impl TokenRecord {
	/// Safety margin applied when no explicit margin is configured.
	pub const DEFAULT_EXPIRY_MARGIN: Duration = Duration::seconds(10);

	/// Returns a builder for constructing records.
	pub fn builder() -> TokenRecordBuilder {
		TokenRecordBuilder::default()
	}

	/// Computes the lifecycle status at a given instant, treating tokens that expire within
	/// `margin` as already expired.
	pub fn status_at(&self, instant: OffsetDateTime, margin: Duration) -> TokenStatus {
		if self.access_token.is_empty() {
			return TokenStatus::Empty;
		}

		match self.expiry {
			Some(expiry) if expiry <= instant + margin => TokenStatus::Expired,
			_ => TokenStatus::Valid,
		}
	}

	/// Returns `true` if the record can be handed out at `instant`.
	pub fn is_valid_at(&self, instant: OffsetDateTime, margin: Duration) -> bool {
		matches!(self.status_at(instant, margin), TokenStatus::Valid)
	}
}
impl Debug for TokenRecord {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRecord")
			.field("access_token", &"<redacted>")
			.field("token_type", &self.token_type)
			.field("expiry", &self.expiry)
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("extra", &self.extra.keys().collect::<Vec<_>>())
			.finish()
	}
}

/// Builder for [`TokenRecord`].
#[derive(Clone, Debug, Default)]
pub struct TokenRecordBuilder {
	access_token: Option<TokenSecret>,
	token_type: Option<String>,
	refresh_token: Option<TokenSecret>,
	issued_at: Option<OffsetDateTime>,
	expiry: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
	extra: BTreeMap<String, serde_json::Value>,
}
impl TokenRecordBuilder {
	/// Sets the issued-at instant used to resolve relative expiries.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expiry(mut self, instant: OffsetDateTime) -> Self {
		self.expiry = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the token type (defaults to `bearer`).
	pub fn token_type(mut self, token_type: impl Into<String>) -> Self {
		self.token_type = Some(token_type.into());

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Adds extra response fields.
	pub fn extra(mut self, fields: impl IntoIterator<Item = (String, serde_json::Value)>) -> Self {
		self.extra.extend(fields);

		self
	}

	/// Consumes the builder and produces a [`TokenRecord`].
	pub fn build(self) -> Result<TokenRecord, TokenRecordBuilderError> {
		let access_token = self.access_token.ok_or(TokenRecordBuilderError::MissingAccessToken)?;
		let expiry = match (self.expiry, self.expires_in) {
			(Some(instant), _) => Some(instant),
			(None, Some(delta)) => Some(
				self.issued_at
					.unwrap_or_else(OffsetDateTime::now_utc)
					.checked_add(delta)
					.ok_or(TokenRecordBuilderError::ExpiryOutOfRange)?,
			),
			(None, None) => None,
		};

		Ok(TokenRecord {
			access_token,
			token_type: self.token_type.unwrap_or_else(|| "bearer".into()),
			expiry,
			refresh_token: self.refresh_token,
			extra: self.extra,
		})
	}
}
