use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use anl_domain::trait_merge::TraitMap;
use anl_storage::{outbox, queries};

use crate::{AnlService, Error, Result};

const MAX_MESSAGE_CHARS: usize = 8_000;

#[derive(Clone, Debug, Deserialize)]
pub struct IngestMessageRequest {
	pub user_id: Uuid,
	pub message: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct IngestMessageResponse {
	pub job_id: Uuid,
}

#[derive(Clone, Debug, Serialize)]
pub struct ProfileResponse {
	pub user_id: Uuid,
	pub traits: TraitMap,
	pub relationship_profile: Option<Value>,
	pub has_embedding: bool,
	pub embedding_version: Option<String>,
	#[serde(with = "anl_domain::time_serde")]
	pub updated_at: OffsetDateTime,
}

impl AnlService {
	/// Queues a chat message for trait extraction and returns without waiting for it.
	pub async fn ingest_message(&self, req: IngestMessageRequest) -> Result<IngestMessageResponse> {
		if req.user_id.is_nil() {
			return Err(Error::InvalidRequest { message: "user_id must not be nil.".to_string() });
		}

		let message = req.message.trim();

		if message.is_empty() {
			return Err(Error::InvalidRequest { message: "message must not be empty.".to_string() });
		}
		if message.chars().count() > MAX_MESSAGE_CHARS {
			return Err(Error::InvalidRequest {
				message: format!("message must be at most {MAX_MESSAGE_CHARS} characters."),
			});
		}
		if !queries::user_exists(&self.db, req.user_id).await? {
			return Err(Error::NotFound { message: format!("User {} does not exist.", req.user_id) });
		}

		let payload = serde_json::json!({ "message": message });
		let job_id = outbox::enqueue_job(&self.db, req.user_id, outbox::OP_MESSAGE, &payload).await?;

		tracing::info!(user_id = %req.user_id, job_id = %job_id, "Message queued for profiling.");

		Ok(IngestMessageResponse { job_id })
	}

	pub async fn get_profile(&self, user_id: Uuid) -> Result<ProfileResponse> {
		let Some(user) = queries::get_user(&self.db, user_id).await? else {
			return Err(Error::NotFound { message: format!("User {user_id} does not exist.") });
		};
		let traits = decode_trait_map(&user.trait_map)?;

		Ok(ProfileResponse {
			user_id,
			traits,
			relationship_profile: user.relationship_profile,
			has_embedding: user.embedding.is_some(),
			embedding_version: user.embedding_version,
			updated_at: user.updated_at,
		})
	}
}

/// Stored trait maps are written by this crate only, so a malformed one is a storage fault.
pub(crate) fn decode_trait_map(raw: &Value) -> Result<TraitMap> {
	if raw.is_null() {
		return Ok(TraitMap::new());
	}

	serde_json::from_value(raw.clone()).map_err(|err| Error::Storage {
		message: format!("Stored trait map is malformed: {err}."),
	})
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn null_and_empty_trait_maps_decode_empty() {
		assert!(decode_trait_map(&Value::Null).expect("Null should decode.").is_empty());
		assert!(decode_trait_map(&json!({})).expect("Empty object should decode.").is_empty());
	}

	#[test]
	fn stored_trait_map_round_trips() {
		let raw = json!({
			"humor": {
				"value": "dry",
				"confidence": 0.7,
				"history": [{ "time": "2026-01-01T00:00:00Z", "value": "dry", "confidence": 0.7 }]
			}
		});
		let traits = decode_trait_map(&raw).expect("Trait map should decode.");

		assert_eq!(traits["humor"].value, "dry");
		assert_eq!(traits["humor"].history.len(), 1);
		assert!(traits["humor"].alternatives.is_empty());
	}

	#[test]
	fn malformed_trait_map_is_a_storage_error() {
		let err = decode_trait_map(&json!({ "humor": "dry" })).expect_err("Should be rejected.");

		assert!(matches!(err, Error::Storage { .. }));
	}
}
