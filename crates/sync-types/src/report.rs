//! Pass reports.
//!
//! Both sync passes return a structured summary instead of failing on
//! per-order problems. These types are serialized as-is by the HTTP API and
//! the `--once` CLI mode.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::SubmissionOutcome;

/// Message used when a pass stops at its wall-clock budget.
pub fn partial_message(deadline: Duration) -> String {
	format!("Partial execution. Stopped at {}s limit.", deadline.as_secs())
}

/// Outcome of one order in a submission pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderOutcome {
	pub order_no: String,
	pub outcome: SubmissionOutcome,
}

/// Summary of a submission pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReport {
	/// Orders created or found already existing upstream.
	pub success: usize,
	/// Orders whose submission failed.
	pub failed: usize,
	/// Orders that failed local validation.
	pub skipped: usize,
	/// Ledger rows the normalizer refused (unknown status, missing row id).
	pub rejected: usize,
	pub errors: Vec<String>,
	pub partial: bool,
	pub message: String,
	pub outcomes: Vec<OrderOutcome>,
}

impl SubmissionReport {
	/// Report for a pass that found nothing to submit.
	pub fn nothing_to_do() -> Self {
		Self {
			message: "No pending or error orders to process.".to_string(),
			..Default::default()
		}
	}

	/// Counts an order outcome and appends its error entry when it failed.
	pub fn record(&mut self, order_no: &str, outcome: SubmissionOutcome) {
		match &outcome {
			SubmissionOutcome::Success { .. } | SubmissionOutcome::AlreadyExists { .. } => {
				self.success += 1;
			},
			SubmissionOutcome::ValidationFailed { message } => {
				self.skipped += 1;
				self.errors.push(format!("{}: {}", order_no, message));
			},
			SubmissionOutcome::TransientError { message }
			| SubmissionOutcome::FatalError { message } => {
				self.failed += 1;
				self.errors.push(format!("{}: {}", order_no, message));
			},
		}
		self.outcomes.push(OrderOutcome {
			order_no: order_no.to_string(),
			outcome,
		});
	}

	pub fn mark_partial(&mut self, deadline: Duration) {
		self.partial = true;
		self.message = partial_message(deadline);
	}

	/// Sets the closing message unless the pass already stopped early.
	pub fn finish(&mut self) {
		if !self.partial {
			self.message = format!(
				"Processed {} successfully, {} failed, {} skipped (validation).",
				self.success, self.failed, self.skipped
			);
		}
	}
}

/// Summary of a reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
	/// Records pulled from the ledger.
	pub fetched: usize,
	/// Records in a reconciliation-eligible status.
	pub matched: usize,
	/// Distinct order numbers queried.
	pub checked: usize,
	/// Rows marked completed.
	pub updated: usize,
	/// Rows marked as errored after a failed batch.
	pub failed: usize,
	pub rejected: usize,
	pub errors: Vec<String>,
	pub partial: bool,
	pub message: String,
}

impl ReconciliationReport {
	pub fn mark_partial(&mut self, deadline: Duration) {
		self.partial = true;
		self.message = partial_message(deadline);
	}

	pub fn finish(&mut self) {
		if !self.partial {
			self.message = format!(
				"Checked {} orders, updated {} records, {} failed.",
				self.checked, self.updated, self.failed
			);
		}
	}
}

/// Record counts per status across the whole ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
	pub pending: usize,
	pub processed: usize,
	pub error: usize,
	pub completed: usize,
	/// All fetched rows, including blank and rejected ones.
	pub total: usize,
}

/// Result of a manual retry request for one order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryReport {
	pub order_no: String,
	pub message: String,
	/// Rows moved back to `Pending`.
	pub updated: usize,
	/// Rows whose current status does not allow a retry.
	pub skipped: usize,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_submission_report_counts() {
		let mut report = SubmissionReport::default();
		report.record(
			"A",
			SubmissionOutcome::Success {
				order_id: Some("9".into()),
				message: "ok".into(),
			},
		);
		report.record(
			"B",
			SubmissionOutcome::AlreadyExists {
				message: "dup".into(),
			},
		);
		report.record(
			"C",
			SubmissionOutcome::ValidationFailed {
				message: "Validation failed: x".into(),
			},
		);
		report.record(
			"D",
			SubmissionOutcome::FatalError {
				message: "boom".into(),
			},
		);
		report.finish();

		assert_eq!((report.success, report.failed, report.skipped), (2, 1, 1));
		assert_eq!(report.errors, vec!["C: Validation failed: x", "D: boom"]);
		assert_eq!(report.outcomes.len(), 4);
		assert_eq!(
			report.message,
			"Processed 2 successfully, 1 failed, 1 skipped (validation)."
		);
	}

	#[test]
	fn test_partial_message_survives_finish() {
		let mut report = ReconciliationReport::default();
		report.mark_partial(Duration::from_secs(40));
		report.finish();
		assert!(report.partial);
		assert_eq!(report.message, "Partial execution. Stopped at 40s limit.");
	}

	#[test]
	fn test_report_json_shape() {
		let json = serde_json::to_value(SubmissionReport::nothing_to_do()).unwrap();
		assert_eq!(json["message"], "No pending or error orders to process.");
		assert_eq!(json["success"], 0);
		assert!(json["outcomes"].as_array().unwrap().is_empty());
	}
}
