//! Confidence-weighted trait merging.
//!
//! A stored value is only replaced when new evidence beats it by at least the merge margin.
//! Conflicting evidence inside the margin is kept as an alternative. Every applied item lands
//! in the entry history, so nothing extracted is ever dropped silently.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const DEFAULT_MERGE_MARGIN: f64 = 0.05;
pub const DEFAULT_MAX_ALTERNATIVES: usize = 8;

/// Absorbs representation error in confidence differences, so `0.35 - 0.30` meets a 0.05 margin.
const MARGIN_EPSILON: f64 = 1e-9;

/// Trait key to entry. Iteration order is the lexicographic key order.
pub type TraitMap = BTreeMap<String, TraitEntry>;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TraitEntry {
	pub value: String,
	pub confidence: f64,
	#[serde(default)]
	pub history: Vec<TraitObservation>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub alternatives: Vec<TraitObservation>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TraitObservation {
	#[serde(with = "crate::time_serde")]
	pub time: OffsetDateTime,
	pub value: String,
	pub confidence: f64,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ExtractedTrait {
	pub key: String,
	pub value: Option<String>,
	pub confidence: f64,
}

#[derive(Clone, Copy, Debug)]
pub struct MergePolicy {
	pub margin: f64,
	pub max_alternatives: usize,
}
impl MergePolicy {
	pub fn from_config(cfg: &anl_config::Profile) -> Self {
		Self { margin: cfg.merge_margin, max_alternatives: cfg.max_alternatives as usize }
	}
}
impl Default for MergePolicy {
	fn default() -> Self {
		Self { margin: DEFAULT_MERGE_MARGIN, max_alternatives: DEFAULT_MAX_ALTERNATIVES }
	}
}

/// Per-branch tally of one merge call, used for logging and audit rows.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct MergeReport {
	pub created: u32,
	pub overwritten: u32,
	pub ambiguous: u32,
	pub reinforced: u32,
	pub discarded: u32,
}
impl MergeReport {
	pub fn applied(&self) -> u32 {
		self.created + self.overwritten + self.ambiguous + self.reinforced
	}
}

#[derive(Clone, Debug)]
pub struct MergeOutcome {
	pub traits: TraitMap,
	pub report: MergeReport,
}

pub fn normalize_key(raw: &str) -> String {
	raw.trim()
		.chars()
		.map(|ch| if ch.is_whitespace() { '_' } else { ch })
		.flat_map(char::to_lowercase)
		.collect()
}

pub fn merge_traits(
	existing: &TraitMap,
	extracted: &[ExtractedTrait],
	now: OffsetDateTime,
	policy: MergePolicy,
) -> MergeOutcome {
	let mut traits = existing.clone();
	let mut report = MergeReport::default();

	for item in extracted {
		let key = normalize_key(&item.key);
		let value = item.value.as_deref().map(str::trim).unwrap_or_default();

		if key.is_empty() || value.is_empty() {
			report.discarded += 1;

			continue;
		}

		let observation =
			TraitObservation { time: now, value: value.to_string(), confidence: item.confidence };
		let Some(entry) = traits.get_mut(&key) else {
			traits.insert(
				key,
				TraitEntry {
					value: observation.value.clone(),
					confidence: observation.confidence,
					history: vec![observation],
					alternatives: Vec::new(),
				},
			);

			report.created += 1;

			continue;
		};
		let delta = observation.confidence - entry.confidence;

		if delta + MARGIN_EPSILON >= policy.margin {
			entry.value = observation.value.clone();
			entry.confidence = observation.confidence;

			entry.history.push(observation);

			report.overwritten += 1;
		} else if delta.abs() < policy.margin - MARGIN_EPSILON && observation.value != entry.value {
			entry.confidence = entry.confidence.max(observation.confidence);

			push_alternative(&mut entry.alternatives, observation.clone(), policy.max_alternatives);
			entry.history.push(observation);

			report.ambiguous += 1;
		} else {
			entry.confidence = entry.confidence.max(observation.confidence);

			entry.history.push(observation);

			report.reinforced += 1;
		}
	}

	MergeOutcome { traits, report }
}

fn push_alternative(
	alternatives: &mut Vec<TraitObservation>,
	observation: TraitObservation,
	max_alternatives: usize,
) {
	alternatives.retain(|alt| alt.value != observation.value);
	alternatives.push(observation);

	if alternatives.len() > max_alternatives {
		let overflow = alternatives.len() - max_alternatives;

		alternatives.drain(..overflow);
	}
}
