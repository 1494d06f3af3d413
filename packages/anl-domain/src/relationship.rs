//! Structured relationship summary derived from the trait map.

use std::collections::BTreeMap;

use serde_json::Value;

pub const RELATIONSHIP_KEYS: [&str; 28] = [
	"moods",
	"personality_traits",
	"love_language",
	"relationship_goals",
	"interests",
	"red_flags",
	"green_flags",
	"attachment_style",
	"communication_style",
	"conflict_style",
	"emotional_triggers",
	"stress_behaviors",
	"trauma_signals",
	"boundaries",
	"dealbreakers",
	"partner_preferences",
	"affection_style",
	"trust_style",
	"intimacy_style",
	"lifestyle_preferences",
	"values",
	"core_fears",
	"stability_needs",
	"compatibility_requirements",
	"likes",
	"dislikes",
	"emotional_needs",
	"emotional_giving_style",
];

const FILLER_VALUES: [&str; 3] = ["unknown", "n/a", "none"];
const MAX_VALUE_WORDS: usize = 3;

pub type RelationshipProfile = BTreeMap<String, Vec<String>>;

/// Every key present with an empty list.
pub fn empty_relationship_profile() -> RelationshipProfile {
	RELATIONSHIP_KEYS.iter().map(|key| (key.to_string(), Vec::new())).collect()
}

/// Strict decode of a model-produced relationship profile.
///
/// Returns `None` unless `raw` is an object whose known keys all hold arrays of strings.
/// Unknown keys are dropped. Filler values and values longer than three words are removed.
pub fn sanitize_relationship_profile(raw: &Value) -> Option<RelationshipProfile> {
	let object = raw.as_object()?;
	let mut profile = empty_relationship_profile();

	for (key, value) in object {
		let Some(slot) = profile.get_mut(key.as_str()) else {
			continue;
		};

		for item in value.as_array()? {
			let text = item.as_str()?.trim();

			if text.is_empty()
				|| FILLER_VALUES.iter().any(|filler| filler.eq_ignore_ascii_case(text))
				|| text.split_whitespace().count() > MAX_VALUE_WORDS
			{
				continue;
			}
			if !slot.iter().any(|existing| existing.eq_ignore_ascii_case(text)) {
				slot.push(text.to_string());
			}
		}
	}

	Some(profile)
}
