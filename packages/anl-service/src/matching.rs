use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use anl_config::ScoringStrategy;
use anl_domain::{
	age,
	chart::{self, NatalChart},
	matching::{
		self, ConnectionType, MatchCandidate, MatchPolicy, MatchResult, MatchSummary, Requester,
	},
	synastry,
};
use anl_storage::{models::UserRecord, queries};

use crate::{AnlService, Error, Result, retrieval};

#[derive(Clone, Debug, Deserialize)]
pub struct MatchesRequest {
	pub user_id: Uuid,
	/// Overrides `matching.top_n` for this request.
	pub top_n: Option<u32>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct MatchesResponse {
	pub user_id: Uuid,
	/// `false` when a failure cut the computation short and the lists are empty.
	pub complete: bool,
	pub summary: MatchSummary,
	pub matches: Vec<MatchResult>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CompatibilityRequest {
	pub user_id_a: Uuid,
	pub user_id_b: Uuid,
}

#[derive(Clone, Debug, Serialize)]
pub struct CompatibilityResponse {
	pub user_id_a: Uuid,
	pub user_id_b: Uuid,
	pub score: u8,
	pub connection_type: ConnectionType,
	pub score_a_to_b: u8,
	pub score_b_to_a: u8,
	pub scoring: ScoringStrategy,
}

impl AnlService {
	/// Ranked matches for a user.
	///
	/// Only an unknown requester or a malformed request is an error. Any other failure is
	/// logged and answered with an empty, incomplete response.
	pub async fn matches(&self, req: MatchesRequest) -> Result<MatchesResponse> {
		if req.top_n == Some(0) {
			return Err(Error::InvalidRequest {
				message: "top_n must be greater than zero.".to_string(),
			});
		}

		let user_id = req.user_id;

		match self.compute_matches(req).await {
			Ok(response) => Ok(response),
			Err(err @ (Error::NotFound { .. } | Error::InvalidRequest { .. })) => Err(err),
			Err(err) => {
				tracing::warn!(
					error = %err,
					user_id = %user_id,
					"Match computation failed; returning no matches."
				);

				Ok(MatchesResponse { user_id, ..MatchesResponse::default() })
			},
		}
	}

	/// Score and connection type between two users, with both directional scores.
	pub async fn compatibility(&self, req: CompatibilityRequest) -> Result<CompatibilityResponse> {
		if req.user_id_a == req.user_id_b {
			return Err(Error::InvalidRequest {
				message: "user_id_a and user_id_b must differ.".to_string(),
			});
		}

		let a = self.require_user(req.user_id_a).await?;
		let b = self.require_user(req.user_id_b).await?;
		let scoring = self.cfg.matching.scoring;
		let (score, score_a_to_b, score_b_to_a) = match (stored_chart(&a), stored_chart(&b)) {
			(Some(chart_a), Some(chart_b)) => (
				synastry::score_with(scoring, &chart_a, &chart_b),
				synastry::score(&chart_a, &chart_b),
				synastry::score(&chart_b, &chart_a),
			),
			_ => (0, 0, 0),
		};
		let connection_type =
			MatchPolicy::from_config(&self.cfg.matching).thresholds.classify(score);

		Ok(CompatibilityResponse {
			user_id_a: req.user_id_a,
			user_id_b: req.user_id_b,
			score,
			connection_type,
			score_a_to_b,
			score_b_to_a,
			scoring,
		})
	}

	async fn compute_matches(&self, req: MatchesRequest) -> Result<MatchesResponse> {
		let user = self.require_user(req.user_id).await?;
		let mut policy = MatchPolicy::from_config(&self.cfg.matching);

		if let Some(top_n) = req.top_n {
			policy.top_n = top_n as usize;
		}

		let Some(chart) = stored_chart(&user) else {
			tracing::info!(user_id = %user.user_id, "Requester has no usable chart; no matches.");

			return Ok(MatchesResponse {
				user_id: user.user_id,
				complete: true,
				..MatchesResponse::default()
			});
		};
		let requester = Requester {
			user_id: user.user_id,
			gender: user.gender.clone(),
			age: age::resolve_age(user.age, user.birthdate.as_deref()),
			chart,
		};
		let candidates = self.candidates_for(&user).await?;
		let outcome = matching::rank(&requester, candidates, &policy);

		tracing::info!(
			user_id = %user.user_id,
			total_matches = outcome.summary.total_matches,
			returned = outcome.matches.len(),
			"Matches computed."
		);

		Ok(MatchesResponse {
			user_id: user.user_id,
			complete: true,
			summary: outcome.summary,
			matches: outcome.matches,
		})
	}

	/// Candidate records in retrieval order. Users without an embedding fall back to a page of
	/// recently active users so chart-only profiles still match.
	async fn candidates_for(&self, user: &UserRecord) -> Result<Vec<MatchCandidate>> {
		let page_size = i64::from(self.cfg.retrieval.fallback_page_size);
		let Some(embedding) = user.embedding.as_deref() else {
			let records = queries::list_users_page(&self.db, user.user_id, page_size).await?;

			return Ok(records.into_iter().map(|record| to_candidate(record, None)).collect());
		};
		let stubs = retrieval::retrieve(
			&self.qdrant,
			&self.db,
			embedding,
			user.user_id,
			self.cfg.retrieval.candidate_k as usize,
			self.cfg.retrieval.fallback_page_size as usize,
		)
		.await;
		let ids = stubs.iter().map(|stub| stub.user_id).collect::<Vec<_>>();
		let mut records = queries::get_users(&self.db, &ids)
			.await?
			.into_iter()
			.map(|record| (record.user_id, record))
			.collect::<HashMap<_, _>>();

		Ok(stubs
			.into_iter()
			.filter_map(|stub| {
				records.remove(&stub.user_id).map(|record| to_candidate(record, Some(stub.similarity)))
			})
			.collect())
	}

	async fn require_user(&self, user_id: Uuid) -> Result<UserRecord> {
		queries::get_user(&self.db, user_id)
			.await?
			.ok_or_else(|| Error::NotFound { message: format!("User {user_id} does not exist.") })
	}
}

fn stored_chart(user: &UserRecord) -> Option<NatalChart> {
	chart::parse_chart(user.chart.as_ref().unwrap_or(&Value::Null)).ok()
}

fn to_candidate(record: UserRecord, similarity: Option<f32>) -> MatchCandidate {
	MatchCandidate {
		age: age::resolve_age(record.age, record.birthdate.as_deref()),
		user_id: record.user_id,
		display_name: record.display_name,
		gender: record.gender,
		discoverable: record.discoverable,
		chart: record.chart.unwrap_or(Value::Null),
		profile_pic_url: record.profile_pic_url,
		last_active_at: record.last_active_at,
		similarity,
	}
}
