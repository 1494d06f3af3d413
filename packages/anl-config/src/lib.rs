mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, EmbeddingProviderConfig, LlmProviderConfig, Matching, Postgres, Profile, Providers,
	Qdrant, RankingStrategy, Retrieval, Retry, ScoringStrategy, Service, Storage, Worker,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	for (label, value) in [
		("service.http_bind", &cfg.service.http_bind),
		("service.admin_bind", &cfg.service.admin_bind),
		("storage.postgres.dsn", &cfg.storage.postgres.dsn),
		("storage.qdrant.url", &cfg.storage.qdrant.url),
		("storage.qdrant.collection", &cfg.storage.qdrant.collection),
	] {
		if value.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}

	for (label, key) in [
		("embedding", &cfg.providers.embedding.api_key),
		("llm_extractor", &cfg.providers.llm_extractor.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	if !cfg.profile.merge_margin.is_finite()
		|| cfg.profile.merge_margin <= 0.0
		|| cfg.profile.merge_margin >= 1.0
	{
		return Err(Error::Validation {
			message: "profile.merge_margin must be in the range (0.0, 1.0).".to_string(),
		});
	}
	if cfg.profile.max_alternatives == 0 {
		return Err(Error::Validation {
			message: "profile.max_alternatives must be greater than zero.".to_string(),
		});
	}
	if cfg.profile.max_versions == 0 {
		return Err(Error::Validation {
			message: "profile.max_versions must be greater than zero.".to_string(),
		});
	}
	if cfg.retrieval.candidate_k == 0 {
		return Err(Error::Validation {
			message: "retrieval.candidate_k must be greater than zero.".to_string(),
		});
	}
	if cfg.retrieval.fallback_page_size == 0 {
		return Err(Error::Validation {
			message: "retrieval.fallback_page_size must be greater than zero.".to_string(),
		});
	}
	if cfg.matching.top_n == 0 {
		return Err(Error::Validation {
			message: "matching.top_n must be greater than zero.".to_string(),
		});
	}
	if cfg.matching.soulmate_threshold > 100 {
		return Err(Error::Validation {
			message: "matching.soulmate_threshold must be 100 or less.".to_string(),
		});
	}
	if cfg.matching.twin_flame_threshold > cfg.matching.soulmate_threshold {
		return Err(Error::Validation {
			message: "matching.twin_flame_threshold must not exceed matching.soulmate_threshold."
				.to_string(),
		});
	}
	if cfg.retry.max_attempts == 0 {
		return Err(Error::Validation {
			message: "retry.max_attempts must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.max_attempts == 0 {
		return Err(Error::Validation {
			message: "worker.max_attempts must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.base_backoff_ms <= 0 || cfg.worker.max_backoff_ms < cfg.worker.base_backoff_ms {
		return Err(Error::Validation {
			message: "worker backoff must be positive and max_backoff_ms must be at least base_backoff_ms."
				.to_string(),
		});
	}
	if cfg.worker.lease_seconds <= 0 {
		return Err(Error::Validation {
			message: "worker.lease_seconds must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.service.log_level.trim().is_empty() {
		cfg.service.log_level = "info".to_string();
	}
}
