use std::collections::HashMap;

use qdrant_client::{
	client::Payload,
	qdrant::{
		Condition, CreateCollectionBuilder, Distance, Filter, PointStruct, Query,
		QueryPointsBuilder, ScoredPoint, UpsertPointsBuilder, Value, VectorParamsBuilder,
		point_id::PointIdOptions,
	},
};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use crate::{Error, Result};

/// Payload key carrying the owning user's id.
pub const USER_ID_KEY: &str = "user_id";

pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &anl_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	/// Creates the profile collection with cosine distance when it does not exist yet.
	pub async fn ensure_collection(&self) -> Result<()> {
		if self.client.collection_exists(self.collection.as_str()).await? {
			return Ok(());
		}

		let builder = CreateCollectionBuilder::new(self.collection.clone())
			.vectors_config(VectorParamsBuilder::new(self.vector_dim.into(), Distance::Cosine));

		self.client.create_collection(builder).await?;

		Ok(())
	}

	/// One point per user, keyed by the user id.
	pub async fn upsert_profile_vector(
		&self,
		user_id: Uuid,
		vector: &[f32],
		embedding_version: &str,
		updated_at: OffsetDateTime,
	) -> Result<()> {
		if vector.len() != self.vector_dim as usize {
			return Err(Error::InvalidArgument(format!(
				"Vector dimension mismatch. Expected {}, got {}.",
				self.vector_dim,
				vector.len()
			)));
		}

		let updated_at = updated_at
			.format(&Rfc3339)
			.map_err(|err| Error::InvalidArgument(format!("Invalid timestamp: {err}.")))?;
		let mut payload_map = HashMap::new();

		payload_map.insert(USER_ID_KEY.to_string(), Value::from(user_id.to_string()));
		payload_map
			.insert("embedding_version".to_string(), Value::from(embedding_version.to_string()));
		payload_map.insert("updated_at".to_string(), Value::from(updated_at));

		let point =
			PointStruct::new(user_id.to_string(), vector.to_vec(), Payload::from(payload_map));
		let upsert = UpsertPointsBuilder::new(self.collection.clone(), vec![point]).wait(true);

		self.client.upsert_points(upsert).await?;

		Ok(())
	}

	/// Nearest profiles to `vector`, excluding `exclude`, best first.
	pub async fn nearest(
		&self,
		vector: &[f32],
		exclude: Uuid,
		limit: u64,
	) -> Result<Vec<(Uuid, f32)>> {
		let search = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(vector.to_vec()))
			.filter(Filter::must_not([Condition::matches(USER_ID_KEY, exclude.to_string())]))
			.limit(limit)
			.with_payload(false);
		let response = self.client.query(search).await?;

		Ok(response
			.result
			.iter()
			.filter_map(|point| point_user_id(point).map(|user_id| (user_id, point.score)))
			.collect())
	}
}

fn point_user_id(point: &ScoredPoint) -> Option<Uuid> {
	match point.id.as_ref()?.point_id_options.as_ref()? {
		PointIdOptions::Uuid(raw) => Uuid::parse_str(raw).ok(),
		PointIdOptions::Num(_) => None,
	}
}
