//! Optional observability helpers for session recovery.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `bearer_session.recovery` with the `kind`
//!   (recovery strategy) and `stage` (call site) fields, plus debug/warn events for each
//!   recovery decision.
//! - Enable `metrics` to increment the `bearer_session_recovery_total` counter for every
//!   attempt/success/failure, labeled by `kind` + `outcome`.

mod metrics;
mod tracing;

pub use self::{metrics::*, tracing::*};

pub(crate) use self::tracing::event;

// self
use crate::_prelude::*;

/// Recovery strategies observed by the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecoveryKind {
	/// Plain request dispatch through the pipeline.
	Request,
	/// Single-flight credential refresh.
	Refresh,
	/// CSRF token rotation.
	CsrfRotation,
	/// Replay of a request after recovery.
	Replay,
}
impl RecoveryKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RecoveryKind::Request => "request",
			RecoveryKind::Refresh => "refresh",
			RecoveryKind::CsrfRotation => "csrf_rotation",
			RecoveryKind::Replay => "replay",
		}
	}
}
impl Display for RecoveryKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecoveryOutcome {
	/// Entry to a recovery step.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl RecoveryOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RecoveryOutcome::Attempt => "attempt",
			RecoveryOutcome::Success => "success",
			RecoveryOutcome::Failure => "failure",
		}
	}
}
impl Display for RecoveryOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
