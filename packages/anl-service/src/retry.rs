use std::{future::Future, time::Duration};

use crate::Result;

/// Runs `op` up to `cfg.max_attempts` times, doubling the sleep between attempts.
///
/// The last error is returned once attempts run out.
pub async fn with_retry<T, F, Fut>(cfg: &anl_config::Retry, label: &str, mut op: F) -> Result<T>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T>>,
{
	let max_attempts = cfg.max_attempts.max(1);
	let mut attempt = 1;

	loop {
		match op().await {
			Ok(value) => return Ok(value),
			Err(err) if attempt < max_attempts => {
				let delay = backoff(cfg.base_backoff_ms, attempt);

				tracing::warn!(
					error = %err,
					call = label,
					attempt,
					max_attempts,
					delay_ms = delay.as_millis() as u64,
					"External call failed; retrying."
				);
				tokio::time::sleep(delay).await;

				attempt += 1;
			},
			Err(err) => return Err(err),
		}
	}
}

fn backoff(base_ms: u64, attempt: u32) -> Duration {
	let exp = attempt.saturating_sub(1).min(16);

	Duration::from_millis(base_ms.saturating_mul(1 << exp))
}
