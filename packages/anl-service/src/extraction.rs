//! Prompts for the generative-text extractor and strict decoding of its replies.

use serde::Deserialize;
use serde_json::Value;

use anl_domain::{
	relationship::RELATIONSHIP_KEYS,
	trait_merge::{ExtractedTrait, TraitMap},
};

const TRAIT_SYSTEM_PROMPT: &str = "\
You infer psychological traits about a dating-app user from one chat message they wrote. \
Return a JSON object with exactly one field, \"extracted_traits\": an array of objects \
with fields \"key\" (short snake_case trait name), \"value\" (short phrase or null when the \
message gives no usable signal) and \"confidence\" (number between 0 and 1). \
Only report traits the message supports. Return {\"extracted_traits\": []} when there are none. \
Output JSON only.";

const RELATIONSHIP_SYSTEM_PROMPT: &str = "\
You summarize a dating-app user's inferred traits into a relationship profile. \
Return a JSON object whose keys are a subset of the listed keys and whose values are arrays \
of short strings of at most three words. Omit keys you have no evidence for. Output JSON only.";

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ExtractionDoc {
	extracted_traits: Vec<ExtractionItem>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ExtractionItem {
	key: String,
	value: Option<String>,
	confidence: f64,
}

/// Chat messages asking the extractor for traits expressed in `message`.
///
/// Current trait keys are listed so the model reuses them instead of inventing synonyms.
pub fn trait_messages(message: &str, existing: &TraitMap) -> Vec<Value> {
	let known_keys = existing.keys().cloned().collect::<Vec<_>>();
	let user = serde_json::json!({
		"known_trait_keys": known_keys,
		"message": message,
	});

	vec![
		serde_json::json!({ "role": "system", "content": TRAIT_SYSTEM_PROMPT }),
		serde_json::json!({ "role": "user", "content": user.to_string() }),
	]
}

/// Decodes `{"extracted_traits": [{key, value, confidence}]}`.
///
/// Any deviation from that shape yields `None`. Non-finite confidences are rejected too.
pub fn decode_extracted_traits(raw: &Value) -> Option<Vec<ExtractedTrait>> {
	let doc = ExtractionDoc::deserialize(raw).ok()?;
	let mut out = Vec::with_capacity(doc.extracted_traits.len());

	for item in doc.extracted_traits {
		if !item.confidence.is_finite() {
			return None;
		}

		out.push(ExtractedTrait { key: item.key, value: item.value, confidence: item.confidence });
	}

	Some(out)
}

pub fn relationship_messages(traits: &TraitMap) -> Vec<Value> {
	let summary = traits
		.iter()
		.map(|(key, entry)| (key.clone(), Value::String(entry.value.clone())))
		.collect::<serde_json::Map<_, _>>();
	let user = serde_json::json!({
		"keys": RELATIONSHIP_KEYS,
		"traits": summary,
	});

	vec![
		serde_json::json!({ "role": "system", "content": RELATIONSHIP_SYSTEM_PROMPT }),
		serde_json::json!({ "role": "user", "content": user.to_string() }),
	]
}
