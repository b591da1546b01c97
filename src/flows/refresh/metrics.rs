// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for refresh decisions.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempts: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
	upstream_calls: AtomicU64,
}
impl RefreshMetrics {
	/// Returns the number of freshness checks performed.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of checks that produced a usable token (including cache reuses).
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of failed checks.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	/// Returns the number of `grant_type=refresh_token` calls sent to the identity server.
	pub fn upstream_calls(&self) -> u64 {
		self.upstream_calls.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.success.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_upstream_call(&self) {
		self.upstream_calls.fetch_add(1, Ordering::Relaxed);
	}
}
