//! Caller-supplied deadline and cancellation for a single operation.

// std
use std::time::Duration as StdDuration;
// crates.io
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
// self
use crate::_prelude::*;

/// Deadline and cancellation scope applied to every suspension point of an operation.
///
/// Storage calls, guard acquisition, and the upstream exchange all observe the context.
/// Whichever fires first ends the operation with [`Error::DeadlineExceeded`] or
/// [`Error::Cancelled`]; guards held at that moment are released on drop.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
	deadline: Option<Instant>,
	cancel: Option<CancellationToken>,
}
impl RequestContext {
	/// Context without deadline or cancellation.
	pub fn background() -> Self {
		Self::default()
	}

	/// Bounds the operation to finish before `deadline`.
	pub fn with_deadline(mut self, deadline: Instant) -> Self {
		self.deadline = Some(deadline);

		self
	}

	/// Bounds the operation to finish within `timeout` from now.
	pub fn with_timeout(self, timeout: StdDuration) -> Self {
		self.with_deadline(Instant::now() + timeout)
	}

	/// Ends the operation as soon as `token` is cancelled.
	pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
		self.cancel = Some(token);

		self
	}

	/// Drives `fut` to completion unless the context ends first.
	pub async fn bound<F>(&self, stage: &'static str, fut: F) -> Result<F::Output>
	where
		F: Future,
	{
		let timed = async {
			match self.deadline {
				Some(deadline) => time::timeout_at(deadline, fut)
					.await
					.map_err(|_| Error::DeadlineExceeded { stage }),
				None => Ok(fut.await),
			}
		};

		match &self.cancel {
			Some(token) => tokio::select! {
				biased;
				_ = token.cancelled() => Err(Error::Cancelled { stage }),
				out = timed => out,
			},
			None => timed.await,
		}
	}

	/// Like [`bound`](Self::bound) for fallible futures, flattening the error.
	pub async fn run<F, T, E>(&self, stage: &'static str, fut: F) -> Result<T>
	where
		F: Future<Output = Result<T, E>>,
		E: Into<Error>,
	{
		self.bound(stage, fut).await?.map_err(Into::into)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn unbounded_context_passes_results_through() {
		let ctx = RequestContext::background();
		let value = ctx.bound("test", async { 7 }).await.expect("Unbounded future should finish.");

		assert_eq!(value, 7);
	}

	#[tokio::test]
	async fn deadline_interrupts_pending_futures() {
		let ctx = RequestContext::background().with_timeout(StdDuration::from_millis(20));
		let err = ctx
			.bound("lock", std::future::pending::<()>())
			.await
			.expect_err("Pending future must hit the deadline.");

		assert!(matches!(err, Error::DeadlineExceeded { stage: "lock" }));
	}

	#[tokio::test]
	async fn cancellation_wins_over_pending_work() {
		let token = CancellationToken::new();
		let ctx = RequestContext::background().with_cancellation(token.clone());

		token.cancel();

		let err = ctx
			.bound("exchange", std::future::pending::<()>())
			.await
			.expect_err("Cancelled context must stop waiting.");

		assert!(matches!(err, Error::Cancelled { stage: "exchange" }));
	}
}
