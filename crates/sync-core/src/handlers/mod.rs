//! Pass drivers.
//!
//! The submission driver pushes consolidated orders to the fulfillment
//! provider; the reconciliation driver pulls tracking back into the ledger.
//! Both run strictly sequentially and stop between units of work once their
//! time budget is spent. An outbound call already in flight is never
//! cancelled.

pub mod reconciliation;
pub mod submission;

pub use reconciliation::ReconciliationDriver;
pub use submission::SubmissionDriver;

use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Errors that abort a pass.
///
/// Per-order failures never surface here; they end up in the pass report.
#[derive(Debug, Error)]
pub enum HandlerError {
	#[error("State error: {0}")]
	State(String),
}

/// Wall-clock budget for one pass.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
	started: Instant,
	limit: Duration,
}

impl Budget {
	/// Starts counting now.
	pub fn start(limit: Duration) -> Self {
		Self {
			started: Instant::now(),
			limit,
		}
	}

	pub fn limit(&self) -> Duration {
		self.limit
	}

	pub fn elapsed(&self) -> Duration {
		self.started.elapsed()
	}

	pub fn is_exhausted(&self) -> bool {
		self.elapsed() >= self.limit
	}
}
