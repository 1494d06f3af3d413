use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub profile: Profile,
	#[serde(default)]
	pub retrieval: Retrieval,
	#[serde(default)]
	pub matching: Matching,
	#[serde(default)]
	pub retry: Retry,
	#[serde(default)]
	pub worker: Worker,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub admin_bind: String,
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub llm_extractor: LlmProviderConfig,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

/// Trait merge and audit trail settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Profile {
	/// Confidence advantage a new value needs before it replaces the stored one.
	pub merge_margin: f64,
	pub max_alternatives: u32,
	/// Newest audit rows kept per user.
	pub max_versions: u32,
	pub relationship_profile: bool,
}
impl Default for Profile {
	fn default() -> Self {
		Self { merge_margin: 0.05, max_alternatives: 8, max_versions: 500, relationship_profile: true }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Retrieval {
	pub candidate_k: u32,
	/// Upper bound on profiles scanned by the local cosine fallback.
	pub fallback_page_size: u32,
}
impl Default for Retrieval {
	fn default() -> Self {
		Self { candidate_k: 60, fallback_page_size: 500 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Matching {
	pub top_n: u32,
	pub min_age: u32,
	pub max_age_gap: Option<u32>,
	pub soulmate_threshold: u8,
	pub twin_flame_threshold: u8,
	pub ranking: RankingStrategy,
	pub scoring: ScoringStrategy,
	pub require_discoverable: bool,
}
impl Default for Matching {
	fn default() -> Self {
		Self {
			top_n: 30,
			min_age: 18,
			max_age_gap: None,
			soulmate_threshold: 85,
			twin_flame_threshold: 70,
			ranking: RankingStrategy::Score,
			scoring: ScoringStrategy::Directional,
			require_discoverable: true,
		}
	}
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingStrategy {
	#[default]
	Score,
	Recency,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringStrategy {
	/// House multipliers come from the requester's chart only.
	#[default]
	Directional,
	/// Average of both directions.
	Symmetric,
}

/// In-process retry around a single external call.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Retry {
	pub max_attempts: u32,
	pub base_backoff_ms: u64,
}
impl Default for Retry {
	fn default() -> Self {
		Self { max_attempts: 3, base_backoff_ms: 400 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Worker {
	pub poll_interval_ms: u64,
	pub max_attempts: u32,
	pub base_backoff_ms: i64,
	pub max_backoff_ms: i64,
	pub lease_seconds: i64,
}
impl Default for Worker {
	fn default() -> Self {
		Self {
			poll_interval_ms: 500,
			max_attempts: 8,
			base_backoff_ms: 500,
			max_backoff_ms: 30_000,
			lease_seconds: 30,
		}
	}
}
