pub mod admin;
pub mod extraction;
pub mod jobs;
pub mod matching;
pub mod profile;
pub mod retrieval;
pub mod retry;
pub mod stats;
pub mod users;

mod error;

pub use admin::RebuildReport;
pub use error::{Error, Result};
pub use jobs::{JobReport, MessageReport, VectorizeOutcome};
pub use matching::{
	CompatibilityRequest, CompatibilityResponse, MatchesRequest, MatchesResponse,
};
pub use profile::{IngestMessageRequest, IngestMessageResponse, ProfileResponse};
pub use retrieval::{CandidateSource, CandidateStub, EmbeddingSource, VectorIndex};
pub use stats::{TaskStats, TaskStatsSnapshot};
pub use users::UpsertUserRequest;

use std::{future::Future, pin::Pin, sync::Arc};

use serde_json::Value;

use anl_config::{Config, EmbeddingProviderConfig, LlmProviderConfig};
use anl_providers::{embedding, extractor};
use anl_storage::{db::Db, qdrant::QdrantStore};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;
}

pub trait ExtractorProvider
where
	Self: Send + Sync,
{
	fn extract<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, Result<Value>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub extractor: Arc<dyn ExtractorProvider>,
}
impl Providers {
	pub fn new(embedding: Arc<dyn EmbeddingProvider>, extractor: Arc<dyn ExtractorProvider>) -> Self {
		Self { embedding, extractor }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { embedding: provider.clone(), extractor: provider }
	}
}

pub struct AnlService {
	pub cfg: Config,
	pub db: Db,
	pub qdrant: QdrantStore,
	pub providers: Providers,
}
impl AnlService {
	pub fn new(cfg: Config, db: Db, qdrant: QdrantStore) -> Self {
		Self { cfg, db, qdrant, providers: Providers::default() }
	}

	pub fn with_providers(cfg: Config, db: Db, qdrant: QdrantStore, providers: Providers) -> Self {
		Self { cfg, db, qdrant, providers }
	}
}

struct DefaultProviders;
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move { embedding::embed(cfg, texts).await.map_err(Error::from) })
	}
}
impl ExtractorProvider for DefaultProviders {
	fn extract<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, Result<Value>> {
		Box::pin(async move { extractor::extract(cfg, messages).await.map_err(Error::from) })
	}
}

/// Identifies the model that produced a stored profile vector.
pub(crate) fn embedding_version(cfg: &Config) -> String {
	format!(
		"{}:{}:{}",
		cfg.providers.embedding.provider_id,
		cfg.providers.embedding.model,
		cfg.storage.qdrant.vector_dim
	)
}
