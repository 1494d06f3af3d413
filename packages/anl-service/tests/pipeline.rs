use std::sync::Arc;

use serde_json::{Value, json};
use uuid::Uuid;

use anl_config::{EmbeddingProviderConfig, LlmProviderConfig};
use anl_domain::matching::SkipReason;
use anl_service::{
	AnlService, BoxFuture, CompatibilityRequest, EmbeddingProvider, Error, ExtractorProvider,
	IngestMessageRequest, JobReport, MatchesRequest, Providers, Result, UpsertUserRequest,
};
use anl_storage::{db::Db, outbox, qdrant::QdrantStore, queries};
use anl_testkit::TestDatabase;

const VECTOR_DIM: u32 = 4;

struct FixedEmbedding;
impl EmbeddingProvider for FixedEmbedding {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		let vec = vec![0.25; cfg.dimensions as usize];

		Box::pin(async move { Ok(vec![vec; texts.len()]) })
	}
}

/// Answers trait prompts and relationship prompts with fixed documents.
struct ScriptedExtractor {
	traits: Value,
	relationship: Value,
}
impl ExtractorProvider for ScriptedExtractor {
	fn extract<'a>(
		&'a self,
		_cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, Result<Value>> {
		let system = messages.first().and_then(|m| m["content"].as_str()).unwrap_or_default();
		let reply = if system.contains("relationship profile") {
			self.relationship.clone()
		} else {
			self.traits.clone()
		};

		Box::pin(async move { Ok(reply) })
	}
}

async fn setup(extractor: ScriptedExtractor) -> Option<(TestDatabase, AnlService)> {
	let base_dsn = anl_testkit::env_dsn()?;
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let qdrant_url =
		anl_testkit::env_qdrant_url().unwrap_or_else(|| "http://127.0.0.1:1".to_string());
	let collection = test_db.collection_name("anl_profiles");
	let cfg = anl_testkit::test_config(test_db.dsn(), &qdrant_url, &collection, VECTOR_DIM);
	let db = Db::connect(&cfg.storage.postgres).await.expect("Failed to connect to test database.");

	db.ensure_schema(VECTOR_DIM).await.expect("Failed to apply schema.");

	let qdrant = QdrantStore::new(&cfg.storage.qdrant).expect("Failed to create Qdrant store.");

	if anl_testkit::env_qdrant_url().is_some() {
		qdrant.ensure_collection().await.expect("Failed to create Qdrant collection.");
	}

	let providers = Providers::new(Arc::new(FixedEmbedding), Arc::new(extractor));

	Some((test_db, AnlService::with_providers(cfg, db, qdrant, providers)))
}

fn quiet_extractor() -> ScriptedExtractor {
	ScriptedExtractor { traits: json!({ "extracted_traits": [] }), relationship: json!({}) }
}

fn user(id: Uuid, name: &str, gender: &str, age: u32, sun: f64) -> UpsertUserRequest {
	UpsertUserRequest {
		user_id: id,
		display_name: Some(name.to_string()),
		gender: Some(gender.to_string()),
		birthdate: None,
		age: Some(age),
		chart: Some(anl_testkit::chart(sun, "Leo")),
		discoverable: true,
		profile_pic_url: None,
		last_active_at: None,
	}
}

async fn run_next_job(service: &AnlService) -> JobReport {
	let policy = outbox::OutboxPolicy::default();
	let job = outbox::fetch_next_job(&service.db, time::OffsetDateTime::now_utc(), &policy)
		.await
		.expect("Failed to fetch job.")
		.expect("Expected a queued job.");
	let report = service.process_job(&job).await.expect("Job should succeed.");

	outbox::mark_done(&service.db, job.job_id).await.expect("Failed to mark job done.");

	report
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set ANL_PG_DSN to run."]
async fn message_job_merges_traits_and_records_a_version() {
	let extractor = ScriptedExtractor {
		traits: json!({
			"extracted_traits": [
				{ "key": "Love Language", "value": "quality time", "confidence": 0.8 },
				{ "key": "humor", "value": null, "confidence": 0.9 }
			]
		}),
		relationship: json!({ "interests": ["hiking", "n/a"], "favorite_color": ["blue"] }),
	};
	let Some((test_db, service)) = setup(extractor).await else {
		return;
	};
	let id = Uuid::new_v4();

	service.upsert_user(user(id, "Ari", "female", 28, 10.0)).await.expect("Upsert failed.");

	let queued = service
		.ingest_message(IngestMessageRequest {
			user_id: id,
			message: "Spending an evening together matters most to me.".to_string(),
		})
		.await
		.expect("Ingest failed.");
	let JobReport::Message(report) = run_next_job(&service).await else {
		panic!("Expected a message report.");
	};

	assert_eq!(report.extracted, 2);
	assert_eq!(report.merge.created, 1);
	assert_eq!(report.merge.discarded, 1);
	assert!(report.version_id.is_some());
	assert!(report.relationship_updated);

	let profile = service.get_profile(id).await.expect("Profile should load.");

	assert_eq!(profile.traits["love_language"].value, "quality time");
	assert!(profile.has_embedding);
	assert_eq!(
		profile.relationship_profile.as_ref().map(|p| p["interests"].clone()),
		Some(json!(["hiking"]))
	);

	let versions =
		queries::list_profile_versions(&service.db, id, 10).await.expect("Versions should load.");

	assert_eq!(versions.len(), 1);
	assert_eq!(versions[0].before, json!({}));

	let job = outbox::get_job(&service.db, queued.job_id)
		.await
		.expect("Job should load.")
		.expect("Job should exist.");

	assert_eq!(job.status, "DONE");

	test_db.cleanup().await.expect("Failed to clean up test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set ANL_PG_DSN to run."]
async fn replayed_message_job_does_not_merge_twice() {
	let extractor = ScriptedExtractor {
		traits: json!({
			"extracted_traits": [
				{ "key": "humor", "value": "dry", "confidence": 0.7 },
				{ "key": "pace", "value": "slow mornings", "confidence": 0.6 }
			]
		}),
		relationship: json!({}),
	};
	let Some((test_db, service)) = setup(extractor).await else {
		return;
	};
	let id = Uuid::new_v4();

	service.upsert_user(user(id, "Cy", "male", 31, 70.0)).await.expect("Upsert failed.");
	service
		.ingest_message(IngestMessageRequest {
			user_id: id,
			message: "I like a slow start.".to_string(),
		})
		.await
		.expect("Ingest failed.");

	let job = outbox::fetch_next_job(
		&service.db,
		time::OffsetDateTime::now_utc(),
		&outbox::OutboxPolicy::default(),
	)
	.await
	.expect("Failed to fetch job.")
	.expect("Expected a queued job.");

	// The job is never marked done, as when the status write fails after the merge commits.
	let JobReport::Message(first) = service.process_job(&job).await.expect("First run failed.")
	else {
		panic!("Expected a message report.");
	};
	let JobReport::Message(second) = service.process_job(&job).await.expect("Replay failed.")
	else {
		panic!("Expected a message report.");
	};

	assert!(!first.already_applied);
	assert_eq!(first.merge.created, 2);
	assert!(second.already_applied);
	assert_eq!(second.version_id, first.version_id);
	assert_eq!(second.merge.applied(), 0);

	let profile = service.get_profile(id).await.expect("Profile should load.");

	assert_eq!(profile.traits["humor"].history.len(), 1);
	assert_eq!(profile.traits["pace"].history.len(), 1);

	let versions =
		queries::list_profile_versions(&service.db, id, 10).await.expect("Versions should load.");

	assert_eq!(versions.len(), 1);
	assert_eq!(versions[0].job_id, Some(job.job_id));

	test_db.cleanup().await.expect("Failed to clean up test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set ANL_PG_DSN to run."]
async fn malformed_extraction_leaves_profile_untouched() {
	let extractor = ScriptedExtractor {
		traits: json!({ "traits": "I could not decide" }),
		relationship: json!({}),
	};
	let Some((test_db, service)) = setup(extractor).await else {
		return;
	};
	let id = Uuid::new_v4();

	service.upsert_user(user(id, "Bo", "male", 30, 40.0)).await.expect("Upsert failed.");
	service
		.ingest_message(IngestMessageRequest { user_id: id, message: "Hello.".to_string() })
		.await
		.expect("Ingest failed.");

	let JobReport::Message(report) = run_next_job(&service).await else {
		panic!("Expected a message report.");
	};

	assert_eq!(report.extracted, 0);
	assert!(report.version_id.is_none());
	assert!(report.vector.is_none());

	let profile = service.get_profile(id).await.expect("Profile should load.");

	assert!(profile.traits.is_empty());
	assert!(!profile.has_embedding);

	test_db.cleanup().await.expect("Failed to clean up test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set ANL_PG_DSN to run."]
async fn ingest_for_unknown_user_is_not_found() {
	let Some((test_db, service)) = setup(quiet_extractor()).await else {
		return;
	};
	let result = service
		.ingest_message(IngestMessageRequest {
			user_id: Uuid::new_v4(),
			message: "Hi.".to_string(),
		})
		.await;

	assert!(matches!(result, Err(Error::NotFound { .. })));

	test_db.cleanup().await.expect("Failed to clean up test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set ANL_PG_DSN to run."]
async fn matches_without_embeddings_use_the_user_page() {
	let Some((test_db, service)) = setup(quiet_extractor()).await else {
		return;
	};
	let requester = Uuid::from_u128(1);
	let near = Uuid::from_u128(2);
	let far = Uuid::from_u128(3);
	let twin_name = Uuid::from_u128(4);
	let minor = Uuid::from_u128(5);
	let same_gender = Uuid::from_u128(6);

	for req in [
		user(requester, "Ari", "female", 28, 10.0),
		user(near, "Bo", "male", 30, 10.0),
		user(far, "Cy", "male", 31, 190.0),
		user(twin_name, "bo", "male", 29, 12.0),
		user(minor, "Di", "male", 16, 10.0),
		user(same_gender, "Eve", "female", 27, 10.0),
	] {
		service.upsert_user(req).await.expect("Upsert failed.");
	}

	let response = service
		.matches(MatchesRequest { user_id: requester, top_n: None })
		.await
		.expect("Matches should compute.");
	let ids = response.matches.iter().map(|m| m.candidate_id).collect::<Vec<_>>();

	assert!(response.complete);
	assert_eq!(ids.first(), Some(&near));
	assert!(ids.contains(&far));
	assert!(!ids.contains(&minor));
	assert!(!ids.contains(&same_gender));
	assert_eq!(ids.len(), 2);
	assert_eq!(response.summary.skipped.get(&SkipReason::DuplicateName), Some(&1));
	assert_eq!(response.summary.skipped.get(&SkipReason::BelowMinimumAge), Some(&1));
	assert_eq!(response.summary.skipped.get(&SkipReason::SameGender), Some(&1));

	test_db.cleanup().await.expect("Failed to clean up test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set ANL_PG_DSN to run."]
async fn matches_for_unknown_requester_is_not_found() {
	let Some((test_db, service)) = setup(quiet_extractor()).await else {
		return;
	};
	let result = service.matches(MatchesRequest { user_id: Uuid::new_v4(), top_n: None }).await;

	assert!(matches!(result, Err(Error::NotFound { .. })));

	test_db.cleanup().await.expect("Failed to clean up test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set ANL_PG_DSN to run."]
async fn compatibility_reports_both_directions() {
	let Some((test_db, service)) = setup(quiet_extractor()).await else {
		return;
	};
	let a = Uuid::new_v4();
	let b = Uuid::new_v4();
	let mut chartless = user(Uuid::new_v4(), "Cy", "male", 30, 0.0);

	chartless.chart = None;

	service.upsert_user(user(a, "Ari", "female", 28, 10.0)).await.expect("Upsert failed.");
	service.upsert_user(user(b, "Bo", "male", 30, 10.0)).await.expect("Upsert failed.");
	service.upsert_user(chartless.clone()).await.expect("Upsert failed.");

	let response = service
		.compatibility(CompatibilityRequest { user_id_a: a, user_id_b: b })
		.await
		.expect("Compatibility should compute.");

	assert!(response.score > 0);
	assert_eq!(response.score, response.score_a_to_b);

	let degraded = service
		.compatibility(CompatibilityRequest { user_id_a: a, user_id_b: chartless.user_id })
		.await
		.expect("Compatibility should compute.");

	assert_eq!(degraded.score, 0);

	let missing = service
		.compatibility(CompatibilityRequest { user_id_a: a, user_id_b: Uuid::new_v4() })
		.await;

	assert!(matches!(missing, Err(Error::NotFound { .. })));

	test_db.cleanup().await.expect("Failed to clean up test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set ANL_PG_DSN to run."]
async fn rebuild_queues_users_with_traits() {
	let extractor = ScriptedExtractor {
		traits: json!({
			"extracted_traits": [{ "key": "humor", "value": "dry", "confidence": 0.7 }]
		}),
		relationship: json!({}),
	};
	let Some((test_db, service)) = setup(extractor).await else {
		return;
	};
	let with_traits = Uuid::new_v4();

	service
		.upsert_user(user(with_traits, "Ari", "female", 28, 10.0))
		.await
		.expect("Upsert failed.");
	service
		.upsert_user(user(Uuid::new_v4(), "Bo", "male", 30, 10.0))
		.await
		.expect("Upsert failed.");
	service
		.ingest_message(IngestMessageRequest { user_id: with_traits, message: "Ha.".to_string() })
		.await
		.expect("Ingest failed.");
	run_next_job(&service).await;

	let report = service.rebuild_vectors().await.expect("Rebuild should queue jobs.");

	assert_eq!(report.enqueued, 1);

	test_db.cleanup().await.expect("Failed to clean up test database.");
}
