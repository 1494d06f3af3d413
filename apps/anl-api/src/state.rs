use std::sync::Arc;

use anl_service::AnlService;
use anl_storage::{db::Db, qdrant::QdrantStore};

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<AnlService>,
}
impl AppState {
	pub async fn new(config: anl_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema(config.storage.qdrant.vector_dim).await?;

		let qdrant = QdrantStore::new(&config.storage.qdrant)?;

		// Retrieval scans Postgres locally while the collection is unavailable.
		if let Err(err) = qdrant.ensure_collection().await {
			tracing::warn!(error = %err, "Qdrant collection check failed; continuing without it.");
		}

		Ok(Self::from_service(AnlService::new(config, db, qdrant)))
	}

	pub fn from_service(service: AnlService) -> Self {
		Self { service: Arc::new(service) }
	}
}
