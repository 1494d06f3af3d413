use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct UserRecord {
	pub user_id: Uuid,
	pub display_name: Option<String>,
	pub gender: Option<String>,
	pub birthdate: Option<String>,
	pub age: Option<i32>,
	pub chart: Option<Value>,
	pub trait_map: Value,
	pub relationship_profile: Option<Value>,
	pub embedding: Option<Vec<f32>>,
	pub embedding_version: Option<String>,
	pub discoverable: bool,
	pub profile_pic_url: Option<String>,
	pub last_active_at: Option<OffsetDateTime>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

/// Fields a caller supplies when registering or refreshing a user.
#[derive(Clone, Debug, Default)]
pub struct NewUser {
	pub user_id: Uuid,
	pub display_name: Option<String>,
	pub gender: Option<String>,
	pub birthdate: Option<String>,
	pub age: Option<i32>,
	pub chart: Option<Value>,
	pub discoverable: bool,
	pub profile_pic_url: Option<String>,
	pub last_active_at: Option<OffsetDateTime>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct UserEmbedding {
	pub user_id: Uuid,
	pub embedding: Vec<f32>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct ProfileVersion {
	pub version_id: Uuid,
	pub user_id: Uuid,
	/// Outbox job that produced this row, when it came from one.
	pub job_id: Option<Uuid>,
	pub before: Value,
	pub after: Value,
	pub extracted: Value,
	pub created_at: OffsetDateTime,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct ProfileOutboxEntry {
	pub job_id: Uuid,
	pub user_id: Uuid,
	pub op: String,
	pub payload: Value,
	pub status: String,
	pub attempts: i32,
	pub last_error: Option<String>,
	pub available_at: OffsetDateTime,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}
