//! Eligibility filtering, connection classification and ranking of match candidates.

use std::{
	cmp::Ordering,
	collections::{BTreeMap, HashSet},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use anl_config::{RankingStrategy, ScoringStrategy};

use crate::{
	chart::{ChartIssue, NatalChart, parse_chart},
	synastry,
};

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
	Soulmate,
	TwinFlame,
	Karmic,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ConnectionThresholds {
	pub soulmate: u8,
	pub twin_flame: u8,
}
impl ConnectionThresholds {
	pub fn classify(&self, score: u8) -> ConnectionType {
		if score >= self.soulmate {
			ConnectionType::Soulmate
		} else if score >= self.twin_flame {
			ConnectionType::TwinFlame
		} else {
			ConnectionType::Karmic
		}
	}
}
impl Default for ConnectionThresholds {
	fn default() -> Self {
		Self { soulmate: 85, twin_flame: 70 }
	}
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
	SameIdentity,
	NotDiscoverable,
	SameGender,
	MissingChart,
	UnparseableChart,
	BelowMinimumAge,
	AgeGap,
	DuplicateName,
}

#[derive(Clone, Debug)]
pub struct MatchPolicy {
	pub top_n: usize,
	pub min_age: u32,
	pub max_age_gap: Option<u32>,
	pub thresholds: ConnectionThresholds,
	pub ranking: RankingStrategy,
	pub scoring: ScoringStrategy,
	pub require_discoverable: bool,
}
impl MatchPolicy {
	pub fn from_config(cfg: &anl_config::Matching) -> Self {
		Self {
			top_n: cfg.top_n as usize,
			min_age: cfg.min_age,
			max_age_gap: cfg.max_age_gap,
			thresholds: ConnectionThresholds {
				soulmate: cfg.soulmate_threshold,
				twin_flame: cfg.twin_flame_threshold,
			},
			ranking: cfg.ranking,
			scoring: cfg.scoring,
			require_discoverable: cfg.require_discoverable,
		}
	}
}
impl Default for MatchPolicy {
	fn default() -> Self {
		Self::from_config(&anl_config::Matching::default())
	}
}

/// The user asking for matches.
#[derive(Clone, Debug)]
pub struct Requester {
	pub user_id: Uuid,
	pub gender: Option<String>,
	pub age: Option<u32>,
	pub chart: NatalChart,
}

/// Another user projected for one match request. The chart is the raw stored JSON.
#[derive(Clone, Debug)]
pub struct MatchCandidate {
	pub user_id: Uuid,
	pub display_name: Option<String>,
	pub gender: Option<String>,
	pub age: Option<u32>,
	pub discoverable: bool,
	pub chart: Value,
	pub profile_pic_url: Option<String>,
	pub last_active_at: Option<OffsetDateTime>,
	pub similarity: Option<f32>,
}

#[derive(Clone, Debug, Serialize)]
pub struct MatchResult {
	pub candidate_id: Uuid,
	pub display_name: Option<String>,
	pub profile_pic_url: Option<String>,
	pub age: Option<u32>,
	pub score: u8,
	pub connection_type: ConnectionType,
	pub similarity: Option<f32>,
	#[serde(with = "crate::time_serde::option")]
	pub last_active_at: Option<OffsetDateTime>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct MatchSummary {
	pub total_matches: usize,
	pub soulmates: usize,
	pub twin_flames: usize,
	pub karmic: usize,
	pub top_match: Option<MatchResult>,
	pub skipped: BTreeMap<SkipReason, u32>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct RankOutcome {
	pub summary: MatchSummary,
	pub matches: Vec<MatchResult>,
}

/// Filters, scores, classifies and orders `candidates` for `requester`.
///
/// The summary counts every eligible candidate; `matches` is truncated to `policy.top_n`.
pub fn rank(
	requester: &Requester,
	candidates: Vec<MatchCandidate>,
	policy: &MatchPolicy,
) -> RankOutcome {
	let requester_gender =
		requester.gender.as_deref().map(normalize_label).filter(|gender| !gender.is_empty());
	let mut skipped = BTreeMap::new();
	let mut seen_names = HashSet::new();
	let mut results = Vec::new();

	for candidate in candidates {
		let chart = match check_eligibility(
			requester,
			requester_gender.as_deref(),
			&candidate,
			&seen_names,
			policy,
		) {
			Ok(chart) => chart,
			Err(reason) => {
				*skipped.entry(reason).or_insert(0) += 1;

				continue;
			},
		};

		if let Some(name) = candidate.display_name.as_deref().map(normalize_label)
			&& !name.is_empty()
		{
			seen_names.insert(name);
		}

		let score = synastry::score_with(policy.scoring, &requester.chart, &chart);

		results.push(MatchResult {
			candidate_id: candidate.user_id,
			display_name: candidate.display_name,
			profile_pic_url: candidate.profile_pic_url,
			age: candidate.age,
			score,
			connection_type: policy.thresholds.classify(score),
			similarity: candidate.similarity,
			last_active_at: candidate.last_active_at,
		});
	}

	sort_results(&mut results, policy.ranking);

	let summary = MatchSummary {
		total_matches: results.len(),
		soulmates: count_type(&results, ConnectionType::Soulmate),
		twin_flames: count_type(&results, ConnectionType::TwinFlame),
		karmic: count_type(&results, ConnectionType::Karmic),
		top_match: results.first().cloned(),
		skipped,
	};

	results.truncate(policy.top_n);

	RankOutcome { summary, matches: results }
}

fn check_eligibility(
	requester: &Requester,
	requester_gender: Option<&str>,
	candidate: &MatchCandidate,
	seen_names: &HashSet<String>,
	policy: &MatchPolicy,
) -> Result<NatalChart, SkipReason> {
	if candidate.user_id == requester.user_id {
		return Err(SkipReason::SameIdentity);
	}
	if policy.require_discoverable && !candidate.discoverable {
		return Err(SkipReason::NotDiscoverable);
	}
	if let (Some(requester_gender), Some(candidate_gender)) =
		(requester_gender, candidate.gender.as_deref().map(normalize_label))
		&& !candidate_gender.is_empty()
		&& requester_gender == candidate_gender
	{
		return Err(SkipReason::SameGender);
	}

	let chart = parse_chart(&candidate.chart).map_err(|issue| match issue {
		ChartIssue::Missing => SkipReason::MissingChart,
		ChartIssue::Unparseable => SkipReason::UnparseableChart,
	})?;
	let age =
		candidate.age.filter(|age| *age >= policy.min_age).ok_or(SkipReason::BelowMinimumAge)?;

	if let (Some(gap), Some(requester_age)) = (policy.max_age_gap, requester.age)
		&& age.abs_diff(requester_age) > gap
	{
		return Err(SkipReason::AgeGap);
	}
	if let Some(name) = candidate.display_name.as_deref().map(normalize_label)
		&& seen_names.contains(&name)
	{
		return Err(SkipReason::DuplicateName);
	}

	Ok(chart)
}

fn sort_results(results: &mut [MatchResult], ranking: RankingStrategy) {
	match ranking {
		RankingStrategy::Score => results.sort_by(by_score),
		// Missing activity sorts last.
		RankingStrategy::Recency => results.sort_by(|a, b| {
			b.last_active_at.cmp(&a.last_active_at).then_with(|| by_score(a, b))
		}),
	}
}

fn by_score(a: &MatchResult, b: &MatchResult) -> Ordering {
	b.score.cmp(&a.score).then_with(|| a.candidate_id.cmp(&b.candidate_id))
}

fn count_type(results: &[MatchResult], kind: ConnectionType) -> usize {
	results.iter().filter(|result| result.connection_type == kind).count()
}

fn normalize_label(raw: &str) -> String {
	raw.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn classification_thresholds_are_inclusive() {
		let thresholds = ConnectionThresholds::default();

		assert_eq!(thresholds.classify(85), ConnectionType::Soulmate);
		assert_eq!(thresholds.classify(84), ConnectionType::TwinFlame);
		assert_eq!(thresholds.classify(70), ConnectionType::TwinFlame);
		assert_eq!(thresholds.classify(69), ConnectionType::Karmic);
	}

	#[test]
	fn legacy_twin_flame_threshold_is_configurable() {
		let thresholds = ConnectionThresholds { soulmate: 85, twin_flame: 30 };

		assert_eq!(thresholds.classify(30), ConnectionType::TwinFlame);
		assert_eq!(thresholds.classify(29), ConnectionType::Karmic);
	}

	#[test]
	fn skip_reasons_serialize_as_snake_case_keys() {
		let mut skipped = BTreeMap::new();

		skipped.insert(SkipReason::BelowMinimumAge, 2_u32);

		let json = serde_json::to_value(&skipped).expect("Failed to serialize skip counts.");

		assert_eq!(json, serde_json::json!({ "below_minimum_age": 2 }));
	}
}
