use serde_json::json;
use time::OffsetDateTime;
use uuid::Uuid;

use anl_storage::{db::Db, models::NewUser, queries};
use anl_testkit::TestDatabase;

#[tokio::test]
#[ignore = "Requires external Postgres. Set ANL_PG_DSN to run."]
async fn schema_bootstrap_is_idempotent() {
	let Some(base_dsn) = anl_testkit::env_dsn() else {
		eprintln!("Skipping schema_bootstrap_is_idempotent; set ANL_PG_DSN to run this test.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let cfg = anl_config::Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 1 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema(4).await.expect("Failed to ensure schema.");
	db.ensure_schema(4).await.expect("Failed to re-apply schema.");

	for table in ["users", "profile_versions", "profile_outbox"] {
		let count: i64 = sqlx::query_scalar(
			"SELECT count(*) FROM information_schema.tables WHERE table_name = $1",
		)
		.bind(table)
		.fetch_one(&db.pool)
		.await
		.expect("Failed to query schema tables.");

		assert_eq!(count, 1, "{table} should exist.");
	}

	test_db.cleanup().await.expect("Failed to clean up test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set ANL_PG_DSN to run."]
async fn trait_map_versions_and_embeddings_persist() {
	let Some(base_dsn) = anl_testkit::env_dsn() else {
		eprintln!(
			"Skipping trait_map_versions_and_embeddings_persist; set ANL_PG_DSN to run this test."
		);

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let cfg = anl_config::Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 2 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema(4).await.expect("Failed to ensure schema.");

	let user_id = Uuid::new_v4();
	let now = OffsetDateTime::now_utc();

	queries::upsert_user(
		&db,
		&NewUser {
			user_id,
			display_name: Some("Ari".to_string()),
			chart: Some(anl_testkit::chart(10.0, "Leo")),
			discoverable: true,
			..NewUser::default()
		},
	)
	.await
	.expect("Failed to insert user.");

	for round in 0..3 {
		let mut tx = db.pool.begin().await.expect("Failed to begin.");
		let before = queries::get_trait_map_for_update(&mut tx, user_id)
			.await
			.expect("Failed to lock trait map.")
			.expect("User should exist.");
		let after = json!({ "round": { "value": round.to_string(), "confidence": 0.5 } });

		queries::update_trait_map_tx(&mut tx, user_id, &after, now).await.expect("Update failed.");
		queries::insert_profile_version_tx(
			&mut tx,
			user_id,
			Some(Uuid::new_v4()),
			&before,
			&after,
			&json!([]),
			now,
		)
		.await
		.expect("Version insert failed.");
		queries::prune_profile_versions_tx(&mut tx, user_id, 2).await.expect("Prune failed.");

		tx.commit().await.expect("Failed to commit.");
	}

	let versions =
		queries::list_profile_versions(&db, user_id, 10).await.expect("Failed to list versions.");

	assert_eq!(versions.len(), 2);

	let newest_job = versions[0].job_id.expect("Version should record its job.");

	assert_eq!(
		queries::version_for_job(&db, newest_job).await.expect("Failed to look up job."),
		Some(versions[0].version_id)
	);
	assert_eq!(
		queries::version_for_job(&db, Uuid::new_v4()).await.expect("Failed to look up job."),
		None
	);

	queries::set_embedding(&db, user_id, &[0.1, 0.2, 0.3, 0.4], "test:model:4", now)
		.await
		.expect("Embedding write failed.");

	let wrong_dim = queries::set_embedding(&db, user_id, &[0.1, 0.2], "test:model:4", now).await;

	assert!(wrong_dim.is_err());

	let user = queries::get_user(&db, user_id)
		.await
		.expect("Failed to load user.")
		.expect("User should exist.");

	assert_eq!(user.embedding.as_deref().map(<[f32]>::len), Some(4));
	assert_eq!(user.trait_map["round"]["value"], json!("2"));

	let page =
		queries::list_embeddings_page(&db, Uuid::new_v4(), 10).await.expect("Failed to list.");

	assert_eq!(page.len(), 1);
	assert_eq!(queries::list_user_ids_with_traits(&db).await.expect("List failed."), vec![user_id]);

	test_db.cleanup().await.expect("Failed to clean up test database.");
}
