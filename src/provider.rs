//! Provider strategy hooks that customize token exchanges.
//!
//! Implementations decorate outgoing token requests and decide whether a token-endpoint
//! failure means "the provider rejected these client credentials" or "something transient
//! went wrong", without tying the cache to any particular HTTP client.

// self
use crate::_prelude::*;

/// Strategy hook that allows providers to decorate requests and classify errors.
///
/// Implementors are required to be `Send + Sync`. `augment_token_request` has a default
/// no-op implementation.
pub trait ProviderStrategy: Send + Sync {
	/// Maps token-endpoint failures into the cache's error taxonomy.
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind;

	/// Gives providers a chance to add custom form parameters (audience, resource, ...)
	/// before dispatching. `grant_type`, `scope`, and client credentials are owned by the
	/// exchange and cannot be overridden here.
	fn augment_token_request(&self, _form: &mut BTreeMap<String, String>) {}
}

/// Canonical provider error categories used by strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
	/// Provider refused the client ID/secret or the grant; reconfiguration is required.
	Rejected,
	/// Failure is not attributable to the credentials; the caller may retry.
	Transient,
}

/// Context passed to provider strategies when classifying token errors.
///
/// Only primitive data is carried (status codes, OAuth fields, body preview) so strategies
/// stay decoupled from any HTTP client.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProviderErrorContext {
	/// HTTP status code returned by the provider, when available.
	pub http_status: Option<u16>,
	/// Provider-supplied OAuth `error` field.
	pub oauth_error: Option<String>,
	/// Provider-supplied OAuth `error_description` field.
	pub error_description: Option<String>,
	/// Preview of the response body for non-JSON payloads.
	pub body_preview: Option<String>,
}
impl ProviderErrorContext {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Creates an empty context.
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds an HTTP status code (e.g., 400, 401, 500).
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the OAuth error code string returned by the provider.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth `error_description` field.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}

	/// Adds a body preview for providers that return non-JSON payloads.
	pub fn with_body_preview(mut self, body: impl Into<String>) -> Self {
		self.body_preview = Some(truncate_preview(body.into()));

		self
	}
}

/// Default strategy that applies RFC 6749 heuristics.
///
/// Structured OAuth fields win, then body hints, then the HTTP status code, where any 4xx
/// other than 408 and 429 counts as a rejection. Body hints only match whole OAuth error codes.
#[derive(Debug, Default)]
pub struct DefaultProviderStrategy;
impl Display for DefaultProviderStrategy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("default-provider-strategy")
	}
}
impl ProviderStrategy for DefaultProviderStrategy {
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		if let Some(kind) = ctx
			.oauth_error
			.as_deref()
			.and_then(match_exact_value)
			.or_else(|| ctx.error_description.as_deref().and_then(classify_text))
			.or_else(|| ctx.body_preview.as_deref().and_then(classify_text))
		{
			return kind;
		}

		classify_status(ctx.http_status)
	}
}

/// Strategy that adds a fixed `audience` form parameter, as required by Auth0-style providers.
#[derive(Clone, Debug)]
pub struct AudienceStrategy {
	audience: String,
}
impl AudienceStrategy {
	/// Requests tokens for `audience`.
	pub fn new(audience: impl Into<String>) -> Self {
		Self { audience: audience.into() }
	}
}
impl ProviderStrategy for AudienceStrategy {
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		DefaultProviderStrategy.classify_token_error(ctx)
	}

	fn augment_token_request(&self, form: &mut BTreeMap<String, String>) {
		form.insert("audience".into(), self.audience.clone());
	}
}

fn truncate_preview(body: String) -> String {
	if body.chars().count() <= ProviderErrorContext::BODY_PREVIEW_LIMIT {
		return body;
	}

	let mut buf = body.chars().take(ProviderErrorContext::BODY_PREVIEW_LIMIT).collect::<String>();

	buf.push('…');

	buf
}

fn match_exact_value(value: &str) -> Option<ProviderErrorKind> {
	const REJECTED: [&str; 6] = [
		"invalid_client",
		"unauthorized_client",
		"invalid_grant",
		"access_denied",
		"invalid_scope",
		"insufficient_scope",
	];
	const TRANSIENT: [&str; 2] = ["temporarily_unavailable", "server_error"];

	if REJECTED.iter().any(|code| value.eq_ignore_ascii_case(code)) {
		Some(ProviderErrorKind::Rejected)
	} else if TRANSIENT.iter().any(|code| value.eq_ignore_ascii_case(code)) {
		Some(ProviderErrorKind::Transient)
	} else {
		None
	}
}

fn classify_text(text: &str) -> Option<ProviderErrorKind> {
	let lowered = text.to_ascii_lowercase();

	match lowered.as_str() {
		text if text.contains("invalid_client")
			|| text.contains("unauthorized_client")
			|| text.contains("invalid_grant") =>
			Some(ProviderErrorKind::Rejected),
		text if text.contains("temporarily_unavailable") || text.contains("server_error") =>
			Some(ProviderErrorKind::Transient),
		_ => None,
	}
}

// Client errors point at the configuration (credentials or token URL) unless the provider
// asked the caller to slow down.
fn classify_status(status: Option<u16>) -> ProviderErrorKind {
	match status {
		Some(408 | 429) => ProviderErrorKind::Transient,
		Some(400..=499) => ProviderErrorKind::Rejected,
		_ => ProviderErrorKind::Transient,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn oauth_error_codes_win() {
		let strategy = DefaultProviderStrategy;
		let ctx = ProviderErrorContext::new().with_http_status(503).with_oauth_error("invalid_client");

		assert_eq!(strategy.classify_token_error(&ctx), ProviderErrorKind::Rejected);

		let ctx = ProviderErrorContext::new().with_http_status(400).with_oauth_error("server_error");

		assert_eq!(strategy.classify_token_error(&ctx), ProviderErrorKind::Transient);
	}

	#[test]
	fn falls_back_to_description_body_and_status() {
		let strategy = DefaultProviderStrategy;
		let described = ProviderErrorContext::new()
			.with_http_status(500)
			.with_error_description("invalid_grant: client disabled");
		let body = ProviderErrorContext::new().with_body_preview("error=unauthorized_client");

		assert_eq!(strategy.classify_token_error(&described), ProviderErrorKind::Rejected);
		assert_eq!(strategy.classify_token_error(&body), ProviderErrorKind::Rejected);
		assert_eq!(
			strategy.classify_token_error(&ProviderErrorContext::new().with_http_status(401)),
			ProviderErrorKind::Rejected
		);
		assert_eq!(
			strategy.classify_token_error(&ProviderErrorContext::new().with_http_status(404)),
			ProviderErrorKind::Rejected
		);
		assert_eq!(
			strategy.classify_token_error(&ProviderErrorContext::new().with_http_status(429)),
			ProviderErrorKind::Transient
		);
		assert_eq!(
			strategy.classify_token_error(&ProviderErrorContext::new().with_http_status(502)),
			ProviderErrorKind::Transient
		);
	}

	#[test]
	fn loose_retry_wording_does_not_mask_a_rejection() {
		let strategy = DefaultProviderStrategy;
		let rejected = ProviderErrorContext::new()
			.with_http_status(401)
			.with_body_preview("Please retry with valid credentials.");
		let unavailable = ProviderErrorContext::new()
			.with_http_status(400)
			.with_body_preview("{\"error\":\"temporarily_unavailable\"}");

		assert_eq!(strategy.classify_token_error(&rejected), ProviderErrorKind::Rejected);
		assert_eq!(strategy.classify_token_error(&unavailable), ProviderErrorKind::Transient);
	}

	#[test]
	fn body_preview_is_truncated() {
		let ctx = ProviderErrorContext::new().with_body_preview("x".repeat(1_000));
		let preview = ctx.body_preview.expect("Preview should be stored.");

		assert_eq!(preview.chars().count(), ProviderErrorContext::BODY_PREVIEW_LIMIT + 1);
		assert!(preview.ends_with('…'));
	}

	#[test]
	fn audience_strategy_adds_form_parameter() {
		let mut form = BTreeMap::new();

		AudienceStrategy::new("https://api.example.com").augment_token_request(&mut form);

		assert_eq!(form.get("audience").map(String::as_str), Some("https://api.example.com"));
	}
}
