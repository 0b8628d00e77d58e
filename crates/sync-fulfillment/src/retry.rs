//! Exponential backoff for outbound fulfillment calls.
//!
//! Retry number `n` waits `base_delay * 2^n`, so with the default one second
//! base the three retries wait 2s, 4s and 8s. Only errors that report
//! themselves as retryable are retried; everything else surfaces on the first
//! failure.

use backoff::ExponentialBackoff;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use sync_config::RetryConfig;

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
	fn is_retryable(&self) -> bool;
}

/// How often and how patiently to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	pub max_retries: u32,
	pub base_delay: Duration,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_retries: 3,
			base_delay: Duration::from_secs(1),
		}
	}
}

impl From<&RetryConfig> for RetryPolicy {
	fn from(config: &RetryConfig) -> Self {
		Self {
			max_retries: config.max_retries,
			base_delay: config.base_delay(),
		}
	}
}

impl RetryPolicy {
	pub fn new(max_retries: u32, base_delay: Duration) -> Self {
		Self {
			max_retries,
			base_delay,
		}
	}

	/// A policy that never retries.
	pub fn none() -> Self {
		Self::new(0, Duration::ZERO)
	}

	/// Delay before retry number `attempt` (1-based).
	pub fn delay_for(&self, attempt: u32) -> Duration {
		self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
	}

	fn schedule(&self) -> ExponentialBackoff {
		let initial = self.delay_for(1);
		ExponentialBackoff {
			current_interval: initial,
			initial_interval: initial,
			randomization_factor: 0.0,
			multiplier: 2.0,
			max_interval: self.delay_for(self.max_retries.max(1)),
			max_elapsed_time: None,
			..ExponentialBackoff::default()
		}
	}

	/// Runs `op` until it succeeds, fails permanently or runs out of retries.
	///
	/// `operation` names the call in retry logs.
	pub async fn execute<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, E>
	where
		E: Retryable + std::fmt::Display,
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T, E>>,
	{
		let attempts = AtomicU32::new(0);
		let max_retries = self.max_retries;

		backoff::future::retry_notify(
			self.schedule(),
			|| {
				let call = op();
				let attempts = &attempts;
				async move {
					let attempt = attempts.fetch_add(1, Ordering::SeqCst);
					call.await.map_err(|e| {
						if e.is_retryable() && attempt < max_retries {
							backoff::Error::transient(e)
						} else {
							backoff::Error::permanent(e)
						}
					})
				}
			},
			|err: E, delay: Duration| {
				tracing::warn!(
					operation,
					attempt = attempts.load(Ordering::SeqCst),
					max_retries,
					delay_ms = delay.as_millis() as u64,
					error = %err,
					"Retrying after transient failure"
				);
			},
		)
		.await
	}
}
