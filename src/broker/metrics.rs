// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for broker refreshes.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	cache_hits: AtomicU64,
	races_absorbed: AtomicU64,
	exchanges: AtomicU64,
	failures: AtomicU64,
}
impl RefreshMetrics {
	/// Returns the number of reads served from storage without taking a guard.
	pub fn cache_hits(&self) -> u64 {
		self.cache_hits.load(Ordering::Relaxed)
	}

	/// Returns the number of refreshes satisfied by a concurrent caller's token.
	pub fn races_absorbed(&self) -> u64 {
		self.races_absorbed.load(Ordering::Relaxed)
	}

	/// Returns the number of upstream exchanges that produced a persisted token.
	pub fn exchanges(&self) -> u64 {
		self.exchanges.load(Ordering::Relaxed)
	}

	/// Returns the number of refreshes that ended in an error.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	pub(crate) fn record_cache_hit(&self) {
		self.cache_hits.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_race_absorbed(&self) {
		self.races_absorbed.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_exchange(&self) {
		self.exchanges.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
	}
}
