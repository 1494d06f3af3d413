//! Synastry scoring between two natal charts.
//!
//! The directional score reads house multipliers from the first chart only, so
//! `score(a, b)` and `score(b, a)` can differ. `score_symmetric` averages both directions.

use anl_config::ScoringStrategy;
use serde::Serialize;

use crate::{
	age,
	chart::{NatalChart, angle_diff, sign_element},
};

pub const PLANET_WEIGHTS: [(&str, f64); 9] = [
	("Sun", 1.0),
	("Moon", 1.5),
	("Venus", 2.0),
	("Mars", 1.8),
	("Mercury", 1.0),
	("Jupiter", 1.2),
	("Saturn", 1.5),
	("North Node", 2.0),
	("South Node", 2.0),
];

/// Evaluated in this order; the first aspect whose orb contains the arc wins.
pub const ASPECTS: [Aspect; 5] = [
	Aspect { name: "conjunction", angle: 0.0, orb: 10.0, score: 10.0 },
	Aspect { name: "sextile", angle: 60.0, orb: 5.0, score: 5.0 },
	Aspect { name: "square", angle: 90.0, orb: 6.0, score: -5.0 },
	Aspect { name: "trine", angle: 120.0, orb: 8.0, score: 7.0 },
	Aspect { name: "opposition", angle: 180.0, orb: 8.0, score: -8.0 },
];

pub const ELEMENT_MATCH_BONUS: f64 = 5.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Aspect {
	pub name: &'static str,
	pub angle: f64,
	pub orb: f64,
	pub score: f64,
}

pub fn aspect_for(diff: f64) -> Option<&'static Aspect> {
	ASPECTS.iter().find(|aspect| (diff - aspect.angle).abs() <= aspect.orb)
}

pub fn aspect_score(diff: f64) -> f64 {
	aspect_for(diff).map(|aspect| aspect.score).unwrap_or(0.0)
}

pub fn house_multiplier(house: Option<u8>) -> f64 {
	match house {
		Some(5) => 1.5,
		Some(7) => 2.0,
		Some(8) => 1.8,
		_ => 1.0,
	}
}

pub fn score_with(strategy: ScoringStrategy, a: &NatalChart, b: &NatalChart) -> u8 {
	match strategy {
		ScoringStrategy::Directional => score(a, b),
		ScoringStrategy::Symmetric => score_symmetric(a, b),
	}
}

/// Compatibility of `b` as seen from `a`, in `[0, 100]`.
pub fn score(a: &NatalChart, b: &NatalChart) -> u8 {
	let mut score_sum = 0.0;
	let mut weight_sum = 0.0;

	for (name, weight) in PLANET_WEIGHTS {
		let (Some(planet_a), Some(lon_b)) = (a.planet(name), b.longitude(name)) else {
			continue;
		};
		let Some(lon_a) = planet_a.longitude else {
			continue;
		};
		let multiplier = house_multiplier(planet_a.house);

		score_sum += aspect_score(angle_diff(lon_a, lon_b)) * weight * multiplier;
		weight_sum += weight * multiplier;
	}

	if weight_sum == 0.0 {
		return 0;
	}

	score_sum += elemental_bonus(a, b);
	score_sum += moon_phase_bonus(a, b);
	score_sum += venus_mars_bonus(a, b);
	score_sum += nodal_bonus(a, b);
	score_sum += life_path_bonus(a, b);

	let percent = (score_sum / (weight_sum * 10.0) * 100.0).round_ties_even();

	percent.clamp(0.0, 100.0) as u8
}

pub fn score_symmetric(a: &NatalChart, b: &NatalChart) -> u8 {
	let total = f64::from(score(a, b)) + f64::from(score(b, a));

	(total / 2.0).round_ties_even() as u8
}

/// Flat bonus when both ascendants fall in the same element.
pub fn elemental_bonus(a: &NatalChart, b: &NatalChart) -> f64 {
	let element_a = a.ascendant_sign().as_deref().and_then(sign_element);
	let element_b = b.ascendant_sign().as_deref().and_then(sign_element);

	match (element_a, element_b) {
		(Some(left), Some(right)) if left == right => ELEMENT_MATCH_BONUS,
		_ => 0.0,
	}
}

pub fn moon_phase_bonus(a: &NatalChart, b: &NatalChart) -> f64 {
	let (Some(moon_a), Some(moon_b)) = (a.longitude("Moon"), b.longitude("Moon")) else {
		return 0.0;
	};
	let diff = angle_diff(moon_a, moon_b);

	if diff <= 60.0 {
		5.0
	} else if diff <= 120.0 {
		3.0
	} else {
		0.0
	}
}

pub fn venus_mars_bonus(a: &NatalChart, b: &NatalChart) -> f64 {
	cross_bonus(a, b, "Venus", "Mars", 30.0, 5.0)
}

pub fn nodal_bonus(a: &NatalChart, b: &NatalChart) -> f64 {
	cross_bonus(a, b, "North Node", "South Node", 15.0, 7.0)
}

/// Sums `bonus` for `a.first`/`b.second` and `b.first`/`a.second` pairs within `orb`.
fn cross_bonus(
	a: &NatalChart,
	b: &NatalChart,
	first: &str,
	second: &str,
	orb: f64,
	bonus: f64,
) -> f64 {
	let pair = |left: Option<f64>, right: Option<f64>| match (left, right) {
		(Some(left), Some(right)) if angle_diff(left, right) <= orb => bonus,
		_ => 0.0,
	};

	pair(a.longitude(first), b.longitude(second)) + pair(b.longitude(first), a.longitude(second))
}

pub fn life_path_bonus(a: &NatalChart, b: &NatalChart) -> f64 {
	let (Some(left), Some(right)) =
		(a.birthdate.as_deref().and_then(life_path), b.birthdate.as_deref().and_then(life_path))
	else {
		return 0.0;
	};

	match left.abs_diff(right) {
		0 => 5.0,
		1 => 3.0,
		2 => 2.0,
		_ => 0.0,
	}
}

/// Digit sum of `YYYYMMDD`, reduced until it is a single digit.
pub fn life_path(birthdate: &str) -> Option<u8> {
	let date = age::parse_birthdate(birthdate)?;
	let digits = format!("{:04}{:02}{:02}", date.year(), u8::from(date.month()), date.day());
	let mut total: u32 = digits.chars().filter_map(|ch| ch.to_digit(10)).sum();

	while total > 9 {
		total = total.to_string().chars().filter_map(|ch| ch.to_digit(10)).sum();
	}

	u8::try_from(total).ok()
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;
	use crate::chart::parse_chart;

	fn chart(value: serde_json::Value) -> NatalChart {
		parse_chart(&value).expect("Test chart should parse.")
	}

	#[test]
	fn aspects_match_in_declaration_order() {
		assert_eq!(aspect_for(4.0).map(|a| a.name), Some("conjunction"));
		assert_eq!(aspect_for(57.0).map(|a| a.name), Some("sextile"));
		assert_eq!(aspect_for(95.0).map(|a| a.name), Some("square"));
		assert_eq!(aspect_for(113.0).map(|a| a.name), Some("trine"));
		assert_eq!(aspect_for(172.0).map(|a| a.name), Some("opposition"));
		assert_eq!(aspect_for(30.0), None);
		assert_eq!(aspect_score(150.0), 0.0);
	}

	#[test]
	fn charts_without_common_planets_score_zero() {
		let a = chart(json!({
			"planets": { "Sun": { "longitude": 10.0 } },
			"ascendant": { "sign": "Leo" }
		}));
		let b = chart(json!({
			"planets": { "Moon": { "longitude": 10.0 } },
			"ascendant": { "sign": "Aries" }
		}));

		assert_eq!(score(&a, &b), 0);
	}

	#[test]
	fn matching_ascendant_element_adds_bonus() {
		let planets = |mars: f64| {
			json!({
				"Sun": { "longitude": 15.0 },
				"Mars": { "longitude": mars },
			})
		};
		let a = chart(json!({ "planets": planets(0.0), "ascendant": { "sign": "Leo" } }));
		let b_fire = chart(json!({ "planets": planets(90.0), "ascendant": { "sign": "Aries" } }));
		let b_water = chart(json!({ "planets": planets(90.0), "ascendant": { "sign": "Cancer" } }));

		// Sun conjunction (+10) and Mars square (-5 * 1.8) over a weight of 2.8.
		assert_eq!(score(&a, &b_water), 4);
		assert_eq!(score(&a, &b_fire), 21);
	}

	#[test]
	fn house_multiplier_makes_scores_directional() {
		let a = chart(json!({
			"planets": {
				"Sun": { "longitude": 10.0, "house": 7 },
				"Mercury": { "longitude": 100.0 }
			}
		}));
		let b = chart(json!({
			"planets": {
				"Sun": { "longitude": 12.0, "house": 1 },
				"Mercury": { "longitude": 220.0 }
			}
		}));

		assert_eq!(score(&a, &b), 90);
		assert_eq!(score(&b, &a), 85);
		assert_eq!(score_symmetric(&a, &b), 88);
		assert_eq!(score_with(ScoringStrategy::Directional, &b, &a), 85);
	}

	#[test]
	fn malformed_planet_data_contributes_nothing() {
		let b = chart(json!({
			"planets": {
				"Sun": { "longitude": 12.0 },
				"Mercury": { "longitude": 220.0 }
			}
		}));
		let float_house = chart(json!({
			"planets": {
				"Sun": { "longitude": 10.0, "house": 7.0 },
				"Mercury": { "longitude": 100.0 }
			}
		}));
		let integer_house = chart(json!({
			"planets": {
				"Sun": { "longitude": 10.0, "house": 7 },
				"Mercury": { "longitude": 100.0 }
			}
		}));
		let broken_mercury = chart(json!({
			"planets": {
				"Sun": { "longitude": 10.0, "house": "seventh" },
				"Mercury": { "longitude": "unknown" }
			}
		}));
		let sun_only = chart(json!({ "planets": { "Sun": { "longitude": 10.0 } } }));

		assert_eq!(score(&float_house, &b), score(&integer_house, &b));
		assert_eq!(score(&broken_mercury, &b), score(&sun_only, &b));
		assert_eq!(score(&broken_mercury, &b), 100);
	}

	#[test]
	fn scores_are_clamped() {
		let a = chart(json!({ "planets": { "Venus": { "longitude": 0.0 } } }));
		let b = chart(json!({ "planets": { "Venus": { "longitude": 180.0 } } }));
		let c = chart(json!({
			"planets": { "Venus": { "longitude": 0.0 }, "Mars": { "longitude": 5.0 } },
			"birthdate": "1990-01-01"
		}));
		let d = chart(json!({
			"planets": { "Venus": { "longitude": 2.0 }, "Mars": { "longitude": 3.0 } },
			"birthdate": "1990-01-01"
		}));

		assert_eq!(score(&a, &b), 0);
		assert_eq!(score(&c, &d), 100);
	}

	#[test]
	fn enrichment_bonuses_follow_their_thresholds() {
		let moon = |lon: f64| chart(json!({ "planets": { "Moon": { "longitude": lon } } }));

		assert_eq!(moon_phase_bonus(&moon(0.0), &moon(60.0)), 5.0);
		assert_eq!(moon_phase_bonus(&moon(0.0), &moon(120.0)), 3.0);
		assert_eq!(moon_phase_bonus(&moon(0.0), &moon(121.0)), 0.0);

		let a = chart(json!({
			"planets": {
				"Venus": { "longitude": 10.0 },
				"Mars": { "longitude": 200.0 },
				"North Node": { "longitude": 50.0 }
			}
		}));
		let b = chart(json!({
			"planets": {
				"Venus": { "longitude": 190.0 },
				"Mars": { "longitude": 35.0 },
				"South Node": { "longitude": 60.0 }
			}
		}));

		assert_eq!(venus_mars_bonus(&a, &b), 10.0);
		assert_eq!(nodal_bonus(&a, &b), 7.0);
	}

	#[test]
	fn life_path_reduces_to_single_digit() {
		// 1+9+9+0+0+5+1+7 = 32 -> 5
		assert_eq!(life_path("1990-05-17"), Some(5));
		assert_eq!(life_path("2000-01-01"), Some(4));
		assert_eq!(life_path("not a date"), None);

		let with_birthdate =
			|date: &str| chart(json!({ "planets": {}, "birthdate": date }));

		assert_eq!(
			life_path_bonus(&with_birthdate("1990-05-17"), &with_birthdate("1990-05-27")),
			3.0
		);
	}
}
