//! Polls the profile outbox and runs one job at a time.

use std::time::Duration as StdDuration;

use time::{Duration, OffsetDateTime};

use anl_service::{AnlService, JobReport, TaskStats};
use anl_storage::outbox::{self, FailureOutcome, OutboxPolicy};

use crate::Result;

const STATS_LOG_INTERVAL_SECONDS: i64 = 300;

pub struct WorkerState {
	pub service: AnlService,
	pub policy: OutboxPolicy,
	pub stats: TaskStats,
}
impl WorkerState {
	pub fn new(service: AnlService) -> Self {
		let policy = OutboxPolicy::from_config(&service.cfg.worker);

		Self { service, policy, stats: TaskStats::default() }
	}
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobOutcome {
	Done,
	Retrying { attempts: i32 },
	Dead { attempts: i32 },
}

pub async fn run_worker(state: WorkerState) -> color_eyre::Result<()> {
	let poll_interval = StdDuration::from_millis(state.service.cfg.worker.poll_interval_ms);
	let mut last_stats_log = OffsetDateTime::now_utc();

	tracing::info!(
		poll_interval_ms = state.service.cfg.worker.poll_interval_ms,
		max_attempts = state.policy.max_attempts,
		"Profile worker started."
	);

	loop {
		let processed = match process_outbox_once(&state).await {
			Ok(outcome) => outcome.is_some(),
			Err(err) => {
				tracing::error!(error = %err, "Profile outbox processing failed.");

				false
			},
		};
		let now = OffsetDateTime::now_utc();

		if stats_due(last_stats_log, now) {
			let snapshot = state.stats.snapshot();

			tracing::info!(
				succeeded = snapshot.succeeded,
				failed = snapshot.failed,
				dead = snapshot.dead,
				"Profile job totals."
			);

			last_stats_log = now;
		}

		// Drain the queue without pausing; only sleep once it is empty.
		if !processed {
			tokio::time::sleep(poll_interval).await;
		}
	}
}

/// Claims and runs the next eligible job. Returns `None` when nothing is due.
pub async fn process_outbox_once(state: &WorkerState) -> Result<Option<JobOutcome>> {
	let db = &state.service.db;
	let Some(job) = outbox::fetch_next_job(db, OffsetDateTime::now_utc(), &state.policy).await?
	else {
		return Ok(None);
	};

	match state.service.process_job(&job).await {
		Ok(report) => {
			outbox::mark_done(db, job.job_id).await?;
			state.stats.record_success();
			log_report(&job.job_id, &report);

			Ok(Some(JobOutcome::Done))
		},
		Err(err) => match outbox::mark_failed(db, &job, &err.to_string(), &state.policy).await? {
			FailureOutcome::Retrying { attempts, available_at } => {
				state.stats.record_failure();
				tracing::error!(
					error = %err,
					job_id = %job.job_id,
					user_id = %job.user_id,
					op = %job.op,
					attempts,
					%available_at,
					"Profile job failed; retry scheduled."
				);

				Ok(Some(JobOutcome::Retrying { attempts }))
			},
			FailureOutcome::Dead { attempts } => {
				state.stats.record_dead();
				tracing::error!(
					error = %err,
					job_id = %job.job_id,
					user_id = %job.user_id,
					op = %job.op,
					attempts,
					"Profile job is dead."
				);

				Ok(Some(JobOutcome::Dead { attempts }))
			},
		},
	}
}

fn log_report(job_id: &uuid::Uuid, report: &JobReport) {
	match report {
		JobReport::Message(report) => tracing::info!(
			job_id = %job_id,
			extracted = report.extracted,
			applied = report.merge.applied(),
			relationship_updated = report.relationship_updated,
			vector = ?report.vector,
			"Message job done."
		),
		JobReport::Vectorize { outcome } =>
			tracing::info!(job_id = %job_id, outcome = ?outcome, "Vectorize job done."),
	}
}

fn stats_due(last: OffsetDateTime, now: OffsetDateTime) -> bool {
	now - last >= Duration::seconds(STATS_LOG_INTERVAL_SECONDS)
}

#[cfg(test)]
mod tests {
	use time::macros::datetime;

	use super::*;

	#[test]
	fn stats_are_logged_every_five_minutes() {
		let last = datetime!(2026-01-01 00:00 UTC);

		assert!(!stats_due(last, datetime!(2026-01-01 00:04:59 UTC)));
		assert!(stats_due(last, datetime!(2026-01-01 00:05 UTC)));
	}
}
