//! Candidate retrieval: server-side nearest neighbours with a local cosine fallback.

use serde::Serialize;
use uuid::Uuid;

use anl_domain::similarity::cosine_similarity;
use anl_storage::{db::Db, qdrant::QdrantStore, queries};

use crate::{BoxFuture, Error, Result};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
	Index,
	LocalScan,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CandidateStub {
	pub user_id: Uuid,
	pub similarity: f32,
	pub source: CandidateSource,
}

/// Approximate nearest-neighbour search over stored profile vectors.
pub trait VectorIndex
where
	Self: Send + Sync,
{
	fn nearest<'a>(
		&'a self,
		vector: &'a [f32],
		exclude: Uuid,
		limit: u64,
	) -> BoxFuture<'a, Result<Vec<(Uuid, f32)>>>;
}

/// Bounded page of stored profile vectors for the local scan.
pub trait EmbeddingSource
where
	Self: Send + Sync,
{
	fn embeddings_page<'a>(
		&'a self,
		exclude: Uuid,
		limit: i64,
	) -> BoxFuture<'a, Result<Vec<(Uuid, Vec<f32>)>>>;
}

impl VectorIndex for QdrantStore {
	fn nearest<'a>(
		&'a self,
		vector: &'a [f32],
		exclude: Uuid,
		limit: u64,
	) -> BoxFuture<'a, Result<Vec<(Uuid, f32)>>> {
		Box::pin(async move {
			QdrantStore::nearest(self, vector, exclude, limit).await.map_err(Error::from)
		})
	}
}

impl EmbeddingSource for Db {
	fn embeddings_page<'a>(
		&'a self,
		exclude: Uuid,
		limit: i64,
	) -> BoxFuture<'a, Result<Vec<(Uuid, Vec<f32>)>>> {
		Box::pin(async move {
			let rows =
				queries::list_embeddings_page(self, exclude, limit).await.map_err(Error::from)?;

			Ok(rows.into_iter().map(|row| (row.user_id, row.embedding)).collect())
		})
	}
}

/// Up to `k` candidates most similar to `query`, excluding `exclude`.
///
/// Never fails: an index error switches to the local scan, and a local scan error yields an
/// empty list.
pub async fn retrieve(
	index: &dyn VectorIndex,
	source: &dyn EmbeddingSource,
	query: &[f32],
	exclude: Uuid,
	k: usize,
	fallback_page_size: usize,
) -> Vec<CandidateStub> {
	if k == 0 {
		return Vec::new();
	}

	match index.nearest(query, exclude, k as u64).await {
		Ok(hits) => {
			return hits
				.into_iter()
				.filter(|(user_id, _)| *user_id != exclude)
				.take(k)
				.map(|(user_id, similarity)| CandidateStub {
					user_id,
					similarity,
					source: CandidateSource::Index,
				})
				.collect();
		},
		Err(err) => {
			tracing::warn!(error = %err, "Nearest-neighbour search failed; scanning locally.");
		},
	}

	let limit = i64::try_from(fallback_page_size).unwrap_or(i64::MAX);

	match source.embeddings_page(exclude, limit).await {
		Ok(rows) => local_scan(query, exclude, rows, k),
		Err(err) => {
			tracing::warn!(error = %err, "Local candidate scan failed; returning no candidates.");

			Vec::new()
		},
	}
}

/// Cosine similarity against every row, best first, ties broken by user id.
pub fn local_scan(
	query: &[f32],
	exclude: Uuid,
	rows: Vec<(Uuid, Vec<f32>)>,
	k: usize,
) -> Vec<CandidateStub> {
	let mut scored = rows
		.into_iter()
		.filter(|(user_id, _)| *user_id != exclude)
		.map(|(user_id, vector)| CandidateStub {
			user_id,
			similarity: cosine_similarity(query, &vector),
			source: CandidateSource::LocalScan,
		})
		.collect::<Vec<_>>();

	scored.sort_by(|a, b| {
		b.similarity.total_cmp(&a.similarity).then_with(|| a.user_id.cmp(&b.user_id))
	});
	scored.truncate(k);

	scored
}
