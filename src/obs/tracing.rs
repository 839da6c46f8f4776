// self
use crate::{_prelude::*, obs::OpKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedOp<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedOp<F> = F;

/// Noteworthy points inside an operation, logged when tracing is enabled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheEvent<'a> {
	/// A valid token was served from storage without locking.
	CacheHit {
		/// Storage key of the served token.
		key: &'a str,
	},
	/// Another caller refreshed the token while this one waited on the guard.
	RaceAbsorbed {
		/// Storage key of the served token.
		key: &'a str,
	},
	/// A new token was fetched from the token endpoint and persisted.
	Exchanged {
		/// Storage key of the new token.
		key: &'a str,
	},
	/// The provider refused the configured client credentials.
	Rejected {
		/// Storage key the refresh was for.
		key: &'a str,
		/// Provider-supplied reason.
		reason: &'a str,
	},
	/// Every token under a name bucket was removed.
	Deleted {
		/// Bucket that was cleared.
		bucket: &'a str,
		/// Number of removed entries.
		removed: usize,
	},
}

/// Emits `event` on the current span (when enabled).
pub fn emit(event: CacheEvent<'_>) {
	#[cfg(feature = "tracing")]
	{
		match event {
			CacheEvent::CacheHit { key } => tracing::debug!(key, "served cached token"),
			CacheEvent::RaceAbsorbed { key } => tracing::debug!(key, "token refreshed by a concurrent caller"),
			CacheEvent::Exchanged { key } => tracing::info!(key, "fetched new token"),
			CacheEvent::Rejected { key, reason } =>
				tracing::warn!(key, reason, "token endpoint rejected client credentials"),
			CacheEvent::Deleted { bucket, removed } =>
				tracing::info!(bucket, removed, "deleted cached tokens"),
		}
	}

	#[cfg(not(feature = "tracing"))]
	{
		let _ = event;
	}
}

/// A span builder used by cache operations.
#[derive(Clone, Debug)]
pub struct OpSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl OpSpan {
	/// Creates a new span tagged with the provided operation kind + stage.
	pub fn new(kind: OpKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("oauth2_cc_cache.op", op = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedOp<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn events_are_accepted_without_a_subscriber() {
		emit(CacheEvent::CacheHit { key: "creds/a/b/c/default" });
		emit(CacheEvent::Deleted { bucket: "creds/a/b/c", removed: 2 });
	}

	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = OpSpan::new(OpKind::Refresh, "instrument_wraps_future");
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}
}
