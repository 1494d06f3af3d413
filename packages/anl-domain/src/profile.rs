use crate::trait_merge::TraitMap;

/// Renders the trait map as `key: value` pairs joined by `". "` in key order.
///
/// Returns `None` for an empty map so callers skip the embedding call entirely.
pub fn serialize_profile(traits: &TraitMap) -> Option<String> {
	if traits.is_empty() {
		return None;
	}

	let parts = traits
		.iter()
		.map(|(key, entry)| format!("{key}: {}", entry.value))
		.collect::<Vec<_>>();

	Some(parts.join(". "))
}

#[cfg(test)]
mod tests {
	use time::macros::datetime;

	use super::*;
	use crate::trait_merge::{ExtractedTrait, MergePolicy, merge_traits};

	fn build(items: &[(&str, &str)]) -> TraitMap {
		let extracted = items
			.iter()
			.map(|(key, value)| ExtractedTrait {
				key: key.to_string(),
				value: Some(value.to_string()),
				confidence: 0.8,
			})
			.collect::<Vec<_>>();

		merge_traits(
			&TraitMap::new(),
			&extracted,
			datetime!(2026-01-01 00:00 UTC),
			MergePolicy::default(),
		)
		.traits
	}

	#[test]
	fn empty_profile_serializes_to_none() {
		assert_eq!(serialize_profile(&TraitMap::new()), None);
	}

	#[test]
	fn serialization_ignores_insertion_order() {
		let forward = build(&[("humor", "dry"), ("attachment_style", "secure")]);
		let reverse = build(&[("attachment_style", "secure"), ("humor", "dry")]);

		assert_eq!(serialize_profile(&forward), serialize_profile(&reverse));
		assert_eq!(
			serialize_profile(&forward).as_deref(),
			Some("attachment_style: secure. humor: dry")
		);
	}
}
