//! Durable queue of background profile jobs.
//!
//! Jobs for one user run strictly in creation order: a job is only claimable when no older
//! unfinished job exists for the same user. Claims take a lease by pushing `available_at`
//! forward, so a crashed worker's job becomes claimable again once the lease expires.

use serde_json::Value;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{Result, db::Db, models::ProfileOutboxEntry};

pub const OP_MESSAGE: &str = "MESSAGE";
pub const OP_VECTORIZE: &str = "VECTORIZE";

const MAX_OUTBOX_ERROR_CHARS: usize = 1_024;

/// Lease and backoff settings for claiming and failing jobs.
#[derive(Clone, Copy, Debug)]
pub struct OutboxPolicy {
	pub lease: Duration,
	pub max_attempts: i32,
	pub base_backoff_ms: i64,
	pub max_backoff_ms: i64,
}
impl OutboxPolicy {
	pub fn from_config(cfg: &anl_config::Worker) -> Self {
		Self {
			lease: Duration::seconds(cfg.lease_seconds),
			max_attempts: i32::try_from(cfg.max_attempts).unwrap_or(i32::MAX),
			base_backoff_ms: cfg.base_backoff_ms,
			max_backoff_ms: cfg.max_backoff_ms,
		}
	}

	/// `base * 2^(attempt - 1)`, capped at `max_backoff_ms`.
	pub fn backoff_for_attempt(&self, attempt: i32) -> Duration {
		let attempts = attempt.max(1) as u32;
		let exp = attempts.saturating_sub(1).min(20);
		let base = self.base_backoff_ms.saturating_mul(1 << exp);

		Duration::milliseconds(base.min(self.max_backoff_ms))
	}
}
impl Default for OutboxPolicy {
	fn default() -> Self {
		Self::from_config(&anl_config::Worker::default())
	}
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailureOutcome {
	Retrying { attempts: i32, available_at: OffsetDateTime },
	Dead { attempts: i32 },
}

pub async fn enqueue_job(db: &Db, user_id: Uuid, op: &str, payload: &Value) -> Result<Uuid> {
	let job_id = Uuid::new_v4();
	let now = OffsetDateTime::now_utc();

	sqlx::query(
		"\
INSERT INTO profile_outbox (job_id, user_id, op, payload, status, available_at, created_at, updated_at)
VALUES ($1, $2, $3, $4, 'PENDING', $5, $5, $5)",
	)
	.bind(job_id)
	.bind(user_id)
	.bind(op)
	.bind(payload)
	.bind(now)
	.execute(&db.pool)
	.await?;

	Ok(job_id)
}

pub async fn fetch_next_job(
	db: &Db,
	now: OffsetDateTime,
	policy: &OutboxPolicy,
) -> Result<Option<ProfileOutboxEntry>> {
	let mut tx = db.pool.begin().await?;
	let row = sqlx::query_as::<_, ProfileOutboxEntry>(
		"\
SELECT
	job.job_id,
	job.user_id,
	job.op,
	job.payload,
	job.status,
	job.attempts,
	job.last_error,
	job.available_at,
	job.created_at,
	job.updated_at
FROM profile_outbox job
WHERE job.status IN ('PENDING','FAILED')
	AND job.available_at <= $1
	AND NOT EXISTS (
		SELECT 1
		FROM profile_outbox prior
		WHERE prior.user_id = job.user_id
			AND prior.status IN ('PENDING','FAILED')
			AND (prior.created_at, prior.job_id) < (job.created_at, job.job_id)
	)
ORDER BY job.available_at ASC, job.created_at ASC
LIMIT 1
FOR UPDATE SKIP LOCKED",
	)
	.bind(now)
	.fetch_optional(&mut *tx)
	.await?;
	let job = if let Some(mut job) = row {
		let lease_until = now + policy.lease;

		sqlx::query(
			"UPDATE profile_outbox SET available_at = $1, updated_at = $2 WHERE job_id = $3",
		)
		.bind(lease_until)
		.bind(now)
		.bind(job.job_id)
		.execute(&mut *tx)
		.await?;

		job.available_at = lease_until;
		job.updated_at = now;

		Some(job)
	} else {
		None
	};

	tx.commit().await?;

	Ok(job)
}

pub async fn mark_done(db: &Db, job_id: Uuid) -> Result<()> {
	let now = OffsetDateTime::now_utc();

	sqlx::query("UPDATE profile_outbox SET status = 'DONE', updated_at = $1 WHERE job_id = $2")
		.bind(now)
		.bind(job_id)
		.execute(&db.pool)
		.await?;

	Ok(())
}

/// Records a failed attempt. The job is parked as `DEAD` once it reaches `max_attempts`.
pub async fn mark_failed(
	db: &Db,
	job: &ProfileOutboxEntry,
	error: &str,
	policy: &OutboxPolicy,
) -> Result<FailureOutcome> {
	let next_attempts = job.attempts.saturating_add(1);
	let now = OffsetDateTime::now_utc();
	let error_text = sanitize_outbox_error(error);
	let (status, available_at, outcome) = if next_attempts >= policy.max_attempts {
		("DEAD", now, FailureOutcome::Dead { attempts: next_attempts })
	} else {
		let available_at = now + policy.backoff_for_attempt(next_attempts);

		("FAILED", available_at, FailureOutcome::Retrying { attempts: next_attempts, available_at })
	};

	sqlx::query(
		"\
UPDATE profile_outbox
SET status = $1,
	attempts = $2,
	last_error = $3,
	available_at = $4,
	updated_at = $5
WHERE job_id = $6",
	)
	.bind(status)
	.bind(next_attempts)
	.bind(error_text)
	.bind(available_at)
	.bind(now)
	.bind(job.job_id)
	.execute(&db.pool)
	.await?;

	Ok(outcome)
}

pub async fn get_job(db: &Db, job_id: Uuid) -> Result<Option<ProfileOutboxEntry>> {
	let row = sqlx::query_as::<_, ProfileOutboxEntry>(
		"\
SELECT job_id, user_id, op, payload, status, attempts, last_error, available_at, created_at, updated_at
FROM profile_outbox
WHERE job_id = $1",
	)
	.bind(job_id)
	.fetch_optional(&db.pool)
	.await?;

	Ok(row)
}

/// Redacts credentials and truncates an error before it is persisted.
pub fn sanitize_outbox_error(text: &str) -> String {
	let mut parts = Vec::new();
	let mut redact_next = false;

	for raw in text.split_whitespace() {
		let mut word = raw.to_string();

		if redact_next {
			word = "[REDACTED]".to_string();
			redact_next = false;
		}
		if raw.eq_ignore_ascii_case("bearer") {
			redact_next = true;
		}

		let lowered = raw.to_ascii_lowercase();

		for key in ["api_key", "apikey", "password", "secret", "token"] {
			if lowered.contains(key) && (lowered.contains('=') || lowered.contains(':')) {
				let sep = if raw.contains('=') { '=' } else { ':' };
				let prefix = raw.split(sep).next().unwrap_or(raw);

				word = format!("{prefix}{sep}[REDACTED]");

				break;
			}
		}

		parts.push(word);
	}

	let mut out = parts.join(" ");

	if out.chars().count() > MAX_OUTBOX_ERROR_CHARS {
		out = out.chars().take(MAX_OUTBOX_ERROR_CHARS).collect();
		out.push_str("...");
	}

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn backoff_doubles_and_caps() {
		let policy = OutboxPolicy {
			lease: Duration::seconds(30),
			max_attempts: 8,
			base_backoff_ms: 500,
			max_backoff_ms: 30_000,
		};

		assert_eq!(policy.backoff_for_attempt(0), Duration::milliseconds(500));
		assert_eq!(policy.backoff_for_attempt(1), Duration::milliseconds(500));
		assert_eq!(policy.backoff_for_attempt(3), Duration::milliseconds(2_000));
		assert_eq!(policy.backoff_for_attempt(12), Duration::milliseconds(30_000));
	}

	#[test]
	fn sanitizer_redacts_credentials() {
		let text = "request failed: Authorization: Bearer sk-live-123 api_key=abc password:hunter2";
		let sanitized = sanitize_outbox_error(text);

		assert!(!sanitized.contains("sk-live-123"));
		assert!(!sanitized.contains("abc"));
		assert!(!sanitized.contains("hunter2"));
		assert!(sanitized.contains("api_key=[REDACTED]"));
	}

	#[test]
	fn sanitizer_truncates_long_errors() {
		let sanitized = sanitize_outbox_error(&"x".repeat(5_000));

		assert_eq!(sanitized.chars().count(), MAX_OUTBOX_ERROR_CHARS + 3);
	}
}
