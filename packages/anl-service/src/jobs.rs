//! Background profile jobs executed by the worker.
//!
//! `MESSAGE` jobs run extraction, merge, the audit write and vectorization in that order for
//! one user. A failed vectorization does not fail the message job; it is queued as its own
//! `VECTORIZE` job behind any work already waiting for that user.
//!
//! The audit row records the job id and is written in the merge transaction. A job that is
//! replayed after its merge committed finds that row and only reruns the follow-up steps.

use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use anl_domain::{
	profile::serialize_profile,
	relationship::sanitize_relationship_profile,
	trait_merge::{MergePolicy, MergeReport, TraitMap, merge_traits},
};
use anl_storage::{models::ProfileOutboxEntry, outbox, queries};

use crate::{AnlService, Error, Result, extraction, profile::decode_trait_map, retry::with_retry};

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum JobReport {
	Message(MessageReport),
	Vectorize { outcome: VectorizeOutcome },
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct MessageReport {
	pub extracted: usize,
	pub merge: MergeReport,
	pub version_id: Option<Uuid>,
	pub versions_pruned: u64,
	pub relationship_updated: bool,
	/// The merge had already been committed by an earlier attempt of the same job.
	pub already_applied: bool,
	/// `None` when the trait map did not change.
	pub vector: Option<VectorizeOutcome>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VectorizeOutcome {
	Stored { dimensions: usize },
	/// Nothing to embed; any previous vector is kept.
	EmptyProfile,
	Deferred { job_id: Uuid },
}

impl AnlService {
	pub async fn process_job(&self, job: &ProfileOutboxEntry) -> Result<JobReport> {
		match job.op.as_str() {
			outbox::OP_MESSAGE => {
				let message = job.payload.get("message").and_then(Value::as_str).ok_or_else(|| {
					Error::InvalidRequest {
						message: "MESSAGE job payload is missing message.".to_string(),
					}
				})?;

				let report = self.apply_message(Some(job.job_id), job.user_id, message).await?;

				Ok(JobReport::Message(report))
			},
			outbox::OP_VECTORIZE =>
				Ok(JobReport::Vectorize { outcome: self.vectorize_user(job.user_id).await? }),
			other =>
				Err(Error::InvalidRequest { message: format!("Unknown profile job op {other:?}.") }),
		}
	}

	/// Extracts traits from `message` and folds them into the user's profile.
	///
	/// Extractor transport failures are returned so the job is retried. A reply that does not
	/// decode counts as an empty extraction.
	pub async fn process_message(&self, user_id: Uuid, message: &str) -> Result<MessageReport> {
		self.apply_message(None, user_id, message).await
	}

	async fn apply_message(
		&self,
		job_id: Option<Uuid>,
		user_id: Uuid,
		message: &str,
	) -> Result<MessageReport> {
		let Some(user) = queries::get_user(&self.db, user_id).await? else {
			return Err(Error::NotFound { message: format!("User {user_id} does not exist.") });
		};
		let known = decode_trait_map(&user.trait_map)?;

		if let Some(job_id) = job_id
			&& let Some(version_id) = queries::version_for_job(&self.db, job_id).await?
		{
			return self.replay_applied(job_id, user_id, version_id, &known).await;
		}

		let messages = extraction::trait_messages(message, &known);
		let raw = with_retry(&self.cfg.retry, "trait extractor", || {
			self.providers.extractor.extract(&self.cfg.providers.llm_extractor, &messages)
		})
		.await?;
		let extracted = match extraction::decode_extracted_traits(&raw) {
			Some(extracted) => extracted,
			None => {
				tracing::warn!(
					user_id = %user_id,
					"Extractor reply did not match the trait schema; treating it as empty."
				);

				Vec::new()
			},
		};
		let mut report = MessageReport { extracted: extracted.len(), ..MessageReport::default() };

		if extracted.is_empty() {
			return Ok(report);
		}

		let now = OffsetDateTime::now_utc();
		let policy = MergePolicy::from_config(&self.cfg.profile);
		let mut tx = self.db.pool.begin().await?;
		let Some(stored) = queries::get_trait_map_for_update(&mut tx, user_id).await? else {
			return Err(Error::NotFound { message: format!("User {user_id} does not exist.") });
		};
		let before = decode_trait_map(&stored)?;

		if let Some(job_id) = job_id
			&& let Some(version_id) = queries::version_for_job_tx(&mut tx, job_id).await?
		{
			tx.rollback().await?;

			return self.replay_applied(job_id, user_id, version_id, &before).await;
		}

		let outcome = merge_traits(&before, &extracted, now, policy);

		report.merge = outcome.report;

		if outcome.report.applied() == 0 {
			tx.rollback().await?;

			return Ok(report);
		}

		let after = serde_json::to_value(&outcome.traits)?;
		let extracted_json = serde_json::to_value(&extracted)?;

		queries::update_trait_map_tx(&mut tx, user_id, &after, now).await?;

		let version_id = queries::insert_profile_version_tx(
			&mut tx,
			user_id,
			job_id,
			&stored,
			&after,
			&extracted_json,
			now,
		)
		.await?;

		report.version_id = Some(version_id);
		report.versions_pruned = queries::prune_profile_versions_tx(
			&mut tx,
			user_id,
			i64::from(self.cfg.profile.max_versions),
		)
		.await?;

		tx.commit().await?;

		tracing::info!(
			user_id = %user_id,
			created = outcome.report.created,
			overwritten = outcome.report.overwritten,
			ambiguous = outcome.report.ambiguous,
			reinforced = outcome.report.reinforced,
			discarded = outcome.report.discarded,
			"Trait map updated."
		);

		self.finish_message(user_id, &outcome.traits, report).await
	}

	/// Follow-up steps for a job whose merge is already committed.
	async fn replay_applied(
		&self,
		job_id: Uuid,
		user_id: Uuid,
		version_id: Uuid,
		traits: &TraitMap,
	) -> Result<MessageReport> {
		tracing::info!(
			user_id = %user_id,
			job_id = %job_id,
			version_id = %version_id,
			"Message job was already merged; rerunning its follow-up steps."
		);

		let report = MessageReport {
			version_id: Some(version_id),
			already_applied: true,
			..MessageReport::default()
		};

		self.finish_message(user_id, traits, report).await
	}

	/// Relationship refresh and vectorization after a committed merge. Both only read the
	/// current trait map.
	async fn finish_message(
		&self,
		user_id: Uuid,
		traits: &TraitMap,
		mut report: MessageReport,
	) -> Result<MessageReport> {
		if self.cfg.profile.relationship_profile {
			report.relationship_updated = self.refresh_relationship_profile(user_id, traits).await;
		}

		let vector = match self.store_profile_vector(user_id, traits).await {
			Ok(vector) => vector,
			Err(err) => {
				let job_id = outbox::enqueue_job(
					&self.db,
					user_id,
					outbox::OP_VECTORIZE,
					&serde_json::json!({}),
				)
				.await?;

				tracing::warn!(
					error = %err,
					user_id = %user_id,
					job_id = %job_id,
					"Profile vectorization failed; queued a VECTORIZE job."
				);

				VectorizeOutcome::Deferred { job_id }
			},
		};

		report.vector = Some(vector);

		Ok(report)
	}

	/// Re-embeds the user's current trait map.
	pub async fn vectorize_user(&self, user_id: Uuid) -> Result<VectorizeOutcome> {
		let Some(user) = queries::get_user(&self.db, user_id).await? else {
			return Err(Error::NotFound { message: format!("User {user_id} does not exist.") });
		};
		let traits = decode_trait_map(&user.trait_map)?;

		self.store_profile_vector(user_id, &traits).await
	}

	async fn store_profile_vector(
		&self,
		user_id: Uuid,
		traits: &TraitMap,
	) -> Result<VectorizeOutcome> {
		let Some(text) = serialize_profile(traits) else {
			return Ok(VectorizeOutcome::EmptyProfile);
		};
		let texts = vec![text];
		let vectors = with_retry(&self.cfg.retry, "embedding", || {
			self.providers.embedding.embed(&self.cfg.providers.embedding, &texts)
		})
		.await?;
		let Some(vector) = vectors.into_iter().next() else {
			return Err(Error::Provider {
				message: "Embedding provider returned no vectors.".to_string(),
			});
		};

		if vector.len() != self.cfg.storage.qdrant.vector_dim as usize {
			return Err(Error::Provider {
				message: format!(
					"Embedding vector dimension mismatch. Expected {}, got {}.",
					self.cfg.storage.qdrant.vector_dim,
					vector.len()
				),
			});
		}

		let version = crate::embedding_version(&self.cfg);
		let now = OffsetDateTime::now_utc();

		queries::set_embedding(&self.db, user_id, &vector, &version, now).await?;
		with_retry(&self.cfg.retry, "qdrant upsert", || async {
			self.qdrant
				.upsert_profile_vector(user_id, &vector, &version, now)
				.await
				.map_err(Error::from)
		})
		.await?;

		tracing::info!(user_id = %user_id, embedding_version = %version, "Profile vector stored.");

		Ok(VectorizeOutcome::Stored { dimensions: vector.len() })
	}

	/// Rebuilds the relationship profile. Failures keep the previous one and return `false`.
	async fn refresh_relationship_profile(&self, user_id: Uuid, traits: &TraitMap) -> bool {
		let messages = extraction::relationship_messages(traits);
		let raw = match with_retry(&self.cfg.retry, "relationship extractor", || {
			self.providers.extractor.extract(&self.cfg.providers.llm_extractor, &messages)
		})
		.await
		{
			Ok(raw) => raw,
			Err(err) => {
				tracing::warn!(
					error = %err,
					user_id = %user_id,
					"Relationship profile extraction failed; keeping the previous one."
				);

				return false;
			},
		};
		let Some(profile) = sanitize_relationship_profile(&raw) else {
			tracing::warn!(
				user_id = %user_id,
				"Relationship profile reply did not match the schema; keeping the previous one."
			);

			return false;
		};
		let stored = serde_json::to_value(&profile).map_err(Error::from);
		let result = match stored {
			Ok(value) => queries::update_relationship_profile(
				&self.db,
				user_id,
				&value,
				OffsetDateTime::now_utc(),
			)
			.await
			.map_err(Error::from),
			Err(err) => Err(err),
		};

		if let Err(err) = result {
			tracing::warn!(
				error = %err,
				user_id = %user_id,
				"Relationship profile write failed; keeping the previous one."
			);

			return false;
		}

		true
	}
}
