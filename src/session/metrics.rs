//! Recovery counters exposed through [`SessionClient::metrics`](crate::session::SessionClient::metrics).

// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for session recovery, shared by every clone of a session.
#[derive(Debug, Default)]
pub struct SessionMetrics {
	refresh_attempts: AtomicU64,
	refresh_success: AtomicU64,
	refresh_failure: AtomicU64,
	csrf_rotations: AtomicU64,
	replays: AtomicU64,
	forced_logouts: AtomicU64,
}
impl SessionMetrics {
	/// Returns the number of refresh calls issued (one per flight, not per waiter).
	pub fn refresh_attempts(&self) -> u64 {
		self.refresh_attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of refresh calls that produced a new access token.
	pub fn refresh_successes(&self) -> u64 {
		self.refresh_success.load(Ordering::Relaxed)
	}

	/// Returns the number of failed refresh calls.
	pub fn refresh_failures(&self) -> u64 {
		self.refresh_failure.load(Ordering::Relaxed)
	}

	/// Returns the number of CSRF rotations requested from the server.
	pub fn csrf_rotations(&self) -> u64 {
		self.csrf_rotations.load(Ordering::Relaxed)
	}

	/// Returns the number of requests replayed after a recovery step.
	pub fn replays(&self) -> u64 {
		self.replays.load(Ordering::Relaxed)
	}

	/// Returns the number of forced logouts.
	pub fn forced_logouts(&self) -> u64 {
		self.forced_logouts.load(Ordering::Relaxed)
	}

	pub(crate) fn record_refresh_attempt(&self) {
		self.refresh_attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_refresh_success(&self) {
		self.refresh_success.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_refresh_failure(&self) {
		self.refresh_failure.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_csrf_rotation(&self) {
		self.csrf_rotations.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_replay(&self) {
		self.replays.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_forced_logout(&self) {
		self.forced_logouts.fetch_add(1, Ordering::Relaxed);
	}
}
