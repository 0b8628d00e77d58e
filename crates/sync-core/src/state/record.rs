//! Record state machine.
//!
//! Validates each status change against the lifecycle table in
//! [`RecordStatus::is_valid_transition`] and writes it to the ledger.
//! Writes are independent per row; there is no grouping across the rows of
//! one order.

use std::sync::Arc;
use sync_ledger::LedgerService;
use sync_types::{RecordPatch, RecordStatus, RowRef};
use thiserror::Error;

/// Errors that can occur while changing a row's status.
#[derive(Debug, Error)]
pub enum StateError {
	#[error("Invalid status transition for row {row_id} from {from:?} to {to}")]
	InvalidTransition {
		row_id: String,
		from: Option<RecordStatus>,
		to: RecordStatus,
	},
	#[error("Ledger error: {0}")]
	Ledger(String),
}

/// Applies validated status changes to ledger rows.
pub struct RecordStateMachine {
	ledger: Arc<LedgerService>,
}

impl RecordStateMachine {
	pub fn new(ledger: Arc<LedgerService>) -> Self {
		Self { ledger }
	}

	fn check(row: &RowRef, to: RecordStatus) -> Result<(), StateError> {
		if RecordStatus::is_valid_transition(row.status, to) {
			Ok(())
		} else {
			Err(StateError::InvalidTransition {
				row_id: row.row_id.clone(),
				from: row.status,
				to,
			})
		}
	}

	/// Whether `row` may move to `to`.
	pub fn can_transition(row: &RowRef, to: RecordStatus) -> bool {
		Self::check(row, to).is_ok()
	}

	/// Moves one row to `to` with a comment.
	pub async fn transition(
		&self,
		row: &RowRef,
		to: RecordStatus,
		comment: &str,
	) -> Result<(), StateError> {
		Self::check(row, to)?;
		self.write(&row.row_id, &RecordPatch::status(to, comment))
			.await
	}

	/// Moves every row to `to`, one write at a time, stopping at the first
	/// failure.
	pub async fn transition_all(
		&self,
		rows: &[RowRef],
		to: RecordStatus,
		comment: &str,
	) -> Result<usize, StateError> {
		for row in rows {
			self.transition(row, to, comment).await?;
		}
		Ok(rows.len())
	}

	/// Records the shipment and completes the row in a single write.
	pub async fn complete_with_tracking(
		&self,
		row: &RowRef,
		carrier: &str,
		tracking: &str,
	) -> Result<(), StateError> {
		Self::check(row, RecordStatus::Completed)?;
		let patch = RecordPatch::status(
			RecordStatus::Completed,
			format!("Tracking info synced: {tracking}"),
		)
		.with_shipment(carrier, tracking);
		self.write(&row.row_id, &patch).await
	}

	async fn write(&self, row_id: &str, patch: &RecordPatch) -> Result<(), StateError> {
		self.ledger
			.apply_patch(row_id, patch)
			.await
			.map_err(|e| StateError::Ledger(e.to_string()))?;
		tracing::debug!(row_id, status = ?patch.status, "Wrote ledger row");
		Ok(())
	}
}
