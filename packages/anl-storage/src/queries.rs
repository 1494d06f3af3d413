use serde_json::Value;
use sqlx::{Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Result,
	db::Db,
	models::{NewUser, ProfileVersion, UserEmbedding, UserRecord},
};

const USER_COLUMNS: &str = "\
user_id,
	display_name,
	gender,
	birthdate,
	age,
	chart,
	trait_map,
	relationship_profile,
	embedding,
	embedding_version,
	discoverable,
	profile_pic_url,
	last_active_at,
	created_at,
	updated_at";

pub async fn upsert_user(db: &Db, user: &NewUser) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO users (
	user_id,
	display_name,
	gender,
	birthdate,
	age,
	chart,
	discoverable,
	profile_pic_url,
	last_active_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
ON CONFLICT (user_id) DO UPDATE
SET
	display_name = EXCLUDED.display_name,
	gender = EXCLUDED.gender,
	birthdate = EXCLUDED.birthdate,
	age = EXCLUDED.age,
	chart = EXCLUDED.chart,
	discoverable = EXCLUDED.discoverable,
	profile_pic_url = EXCLUDED.profile_pic_url,
	last_active_at = EXCLUDED.last_active_at,
	updated_at = now()",
	)
	.bind(user.user_id)
	.bind(user.display_name.as_deref())
	.bind(user.gender.as_deref())
	.bind(user.birthdate.as_deref())
	.bind(user.age)
	.bind(user.chart.as_ref())
	.bind(user.discoverable)
	.bind(user.profile_pic_url.as_deref())
	.bind(user.last_active_at)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn user_exists(db: &Db, user_id: Uuid) -> Result<bool> {
	let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE user_id = $1)")
		.bind(user_id)
		.fetch_one(&db.pool)
		.await?;

	Ok(exists)
}

pub async fn get_user(db: &Db, user_id: Uuid) -> Result<Option<UserRecord>> {
	let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = $1");
	let user = sqlx::query_as::<_, UserRecord>(&sql).bind(user_id).fetch_optional(&db.pool).await?;

	Ok(user)
}

pub async fn get_users(db: &Db, user_ids: &[Uuid]) -> Result<Vec<UserRecord>> {
	if user_ids.is_empty() {
		return Ok(Vec::new());
	}

	let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ANY($1)");
	let users = sqlx::query_as::<_, UserRecord>(&sql).bind(user_ids).fetch_all(&db.pool).await?;

	Ok(users)
}

/// First `limit` users other than `exclude`, most recently active first.
pub async fn list_users_page(db: &Db, exclude: Uuid, limit: i64) -> Result<Vec<UserRecord>> {
	let sql = format!(
		"\
SELECT {USER_COLUMNS}
FROM users
WHERE user_id <> $1
ORDER BY last_active_at DESC NULLS LAST, user_id ASC
LIMIT $2"
	);
	let users =
		sqlx::query_as::<_, UserRecord>(&sql).bind(exclude).bind(limit).fetch_all(&db.pool).await?;

	Ok(users)
}

pub async fn list_embeddings_page(
	db: &Db,
	exclude: Uuid,
	limit: i64,
) -> Result<Vec<UserEmbedding>> {
	let rows = sqlx::query_as::<_, UserEmbedding>(
		"\
SELECT user_id, embedding
FROM users
WHERE embedding IS NOT NULL AND user_id <> $1
ORDER BY updated_at DESC, user_id ASC
LIMIT $2",
	)
	.bind(exclude)
	.bind(limit)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

pub async fn get_trait_map_for_update(
	tx: &mut Transaction<'_, Postgres>,
	user_id: Uuid,
) -> Result<Option<Value>> {
	let trait_map: Option<Value> =
		sqlx::query_scalar("SELECT trait_map FROM users WHERE user_id = $1 FOR UPDATE")
			.bind(user_id)
			.fetch_optional(&mut **tx)
			.await?;

	Ok(trait_map)
}

pub async fn update_trait_map_tx(
	tx: &mut Transaction<'_, Postgres>,
	user_id: Uuid,
	trait_map: &Value,
	now: OffsetDateTime,
) -> Result<()> {
	sqlx::query("UPDATE users SET trait_map = $1, updated_at = $2 WHERE user_id = $3")
		.bind(trait_map)
		.bind(now)
		.bind(user_id)
		.execute(&mut **tx)
		.await?;

	Ok(())
}

pub async fn insert_profile_version_tx(
	tx: &mut Transaction<'_, Postgres>,
	user_id: Uuid,
	job_id: Option<Uuid>,
	before: &Value,
	after: &Value,
	extracted: &Value,
	now: OffsetDateTime,
) -> Result<Uuid> {
	let version_id = Uuid::new_v4();

	sqlx::query(
		"\
INSERT INTO profile_versions (version_id, user_id, job_id, before, after, extracted, created_at)
VALUES ($1, $2, $3, $4, $5, $6, $7)",
	)
	.bind(version_id)
	.bind(user_id)
	.bind(job_id)
	.bind(before)
	.bind(after)
	.bind(extracted)
	.bind(now)
	.execute(&mut **tx)
	.await?;

	Ok(version_id)
}

/// Audit row written by `job_id`, if that job already committed its merge.
pub async fn version_for_job(db: &Db, job_id: Uuid) -> Result<Option<Uuid>> {
	let version_id: Option<Uuid> =
		sqlx::query_scalar("SELECT version_id FROM profile_versions WHERE job_id = $1")
			.bind(job_id)
			.fetch_optional(&db.pool)
			.await?;

	Ok(version_id)
}

pub async fn version_for_job_tx(
	tx: &mut Transaction<'_, Postgres>,
	job_id: Uuid,
) -> Result<Option<Uuid>> {
	let version_id: Option<Uuid> =
		sqlx::query_scalar("SELECT version_id FROM profile_versions WHERE job_id = $1")
			.bind(job_id)
			.fetch_optional(&mut **tx)
			.await?;

	Ok(version_id)
}

/// Keeps the newest `keep` audit rows for `user_id`.
pub async fn prune_profile_versions_tx(
	tx: &mut Transaction<'_, Postgres>,
	user_id: Uuid,
	keep: i64,
) -> Result<u64> {
	let result = sqlx::query(
		"\
DELETE FROM profile_versions
WHERE user_id = $1
	AND version_id NOT IN (
		SELECT version_id
		FROM profile_versions
		WHERE user_id = $1
		ORDER BY created_at DESC, version_id DESC
		LIMIT $2
	)",
	)
	.bind(user_id)
	.bind(keep)
	.execute(&mut **tx)
	.await?;

	Ok(result.rows_affected())
}

pub async fn list_profile_versions(
	db: &Db,
	user_id: Uuid,
	limit: i64,
) -> Result<Vec<ProfileVersion>> {
	let rows = sqlx::query_as::<_, ProfileVersion>(
		"\
SELECT version_id, user_id, job_id, before, after, extracted, created_at
FROM profile_versions
WHERE user_id = $1
ORDER BY created_at DESC, version_id DESC
LIMIT $2",
	)
	.bind(user_id)
	.bind(limit)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

pub async fn update_relationship_profile(
	db: &Db,
	user_id: Uuid,
	profile: &Value,
	now: OffsetDateTime,
) -> Result<()> {
	sqlx::query("UPDATE users SET relationship_profile = $1, updated_at = $2 WHERE user_id = $3")
		.bind(profile)
		.bind(now)
		.bind(user_id)
		.execute(&db.pool)
		.await?;

	Ok(())
}

pub async fn set_embedding(
	db: &Db,
	user_id: Uuid,
	embedding: &[f32],
	embedding_version: &str,
	now: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"\
UPDATE users
SET embedding = $1, embedding_version = $2, updated_at = $3
WHERE user_id = $4",
	)
	.bind(embedding)
	.bind(embedding_version)
	.bind(now)
	.bind(user_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn list_user_ids_with_traits(db: &Db) -> Result<Vec<Uuid>> {
	let ids: Vec<Uuid> = sqlx::query_scalar(
		"SELECT user_id FROM users WHERE trait_map <> '{}'::jsonb ORDER BY user_id ASC",
	)
	.fetch_all(&db.pool)
	.await?;

	Ok(ids)
}
