// self
use crate::obs::{RecoveryKind, RecoveryOutcome};

/// Records a recovery outcome via the global metrics recorder (when enabled).
pub fn record_recovery(kind: RecoveryKind, outcome: RecoveryOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"bearer_session_recovery_total",
			"kind" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}
