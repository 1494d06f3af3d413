use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Outcome counters for background jobs.
#[derive(Debug, Default)]
pub struct TaskStats {
	succeeded: AtomicU64,
	failed: AtomicU64,
	dead: AtomicU64,
}
impl TaskStats {
	pub fn record_success(&self) {
		self.succeeded.fetch_add(1, Ordering::Relaxed);
	}

	/// A failed attempt that will be retried.
	pub fn record_failure(&self) {
		self.failed.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_dead(&self) {
		self.dead.fetch_add(1, Ordering::Relaxed);
	}

	pub fn snapshot(&self) -> TaskStatsSnapshot {
		TaskStatsSnapshot {
			succeeded: self.succeeded.load(Ordering::Relaxed),
			failed: self.failed.load(Ordering::Relaxed),
			dead: self.dead.load(Ordering::Relaxed),
		}
	}
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct TaskStatsSnapshot {
	pub succeeded: u64,
	pub failed: u64,
	pub dead: u64,
}
impl TaskStatsSnapshot {
	pub fn total(&self) -> u64 {
		self.succeeded + self.failed + self.dead
	}
}
