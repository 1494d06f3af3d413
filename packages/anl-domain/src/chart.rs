//! Natal chart model as produced by the chart provider.
//!
//! Charts are stored as opaque JSON. Parsing is tolerant about shape (stringified JSON,
//! bare-number angles, null planets) and about individual fields: a malformed planet,
//! longitude, house or angle counts as absent. Only a chart that is not an object, or whose
//! `planets` is not an object, is unparseable.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const SIGNS: [&str; 12] = [
	"Aries",
	"Taurus",
	"Gemini",
	"Cancer",
	"Leo",
	"Virgo",
	"Libra",
	"Scorpio",
	"Sagittarius",
	"Capricorn",
	"Aquarius",
	"Pisces",
];

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum Element {
	Fire,
	Earth,
	Air,
	Water,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChartIssue {
	Missing,
	Unparseable,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct NatalChart {
	#[serde(default, deserialize_with = "lenient_planets")]
	pub planets: BTreeMap<String, Option<PlanetPosition>>,
	#[serde(default, deserialize_with = "lenient_angle")]
	pub ascendant: Option<ChartAngle>,
	#[serde(default, deserialize_with = "lenient_angle")]
	pub midheaven: Option<ChartAngle>,
	#[serde(default, deserialize_with = "lenient_string")]
	pub birthdate: Option<String>,
}
impl NatalChart {
	/// Position of `name` when the chart carries a usable longitude for it.
	pub fn planet(&self, name: &str) -> Option<&PlanetPosition> {
		self.planets.get(name)?.as_ref().filter(|planet| planet.longitude.is_some_and(f64::is_finite))
	}

	pub fn longitude(&self, name: &str) -> Option<f64> {
		self.planet(name).and_then(|planet| planet.longitude)
	}

	pub fn ascendant_sign(&self) -> Option<String> {
		self.ascendant.as_ref().and_then(ChartAngle::sign)
	}
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct PlanetPosition {
	#[serde(default, deserialize_with = "lenient_degrees")]
	pub longitude: Option<f64>,
	#[serde(default, deserialize_with = "lenient_string")]
	pub sign: Option<String>,
	#[serde(default, deserialize_with = "lenient_degrees")]
	pub deg_in_sign: Option<f64>,
	/// `7`, `7.0` and `"7"` all read as house 7; anything outside 1..=12 is dropped.
	#[serde(default, deserialize_with = "lenient_house")]
	pub house: Option<u8>,
}

/// Ascendant or midheaven, either a bare longitude or a decomposed object.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChartAngle {
	Degrees(f64),
	Detailed {
		#[serde(default, deserialize_with = "lenient_degrees")]
		longitude: Option<f64>,
		#[serde(default, deserialize_with = "lenient_string")]
		sign: Option<String>,
		#[serde(default, deserialize_with = "lenient_degrees")]
		deg_in_sign: Option<f64>,
	},
}
impl ChartAngle {
	pub fn longitude(&self) -> Option<f64> {
		match self {
			Self::Degrees(deg) => Some(*deg),
			Self::Detailed { longitude, .. } => *longitude,
		}
	}

	/// Explicit sign when present, otherwise derived from the longitude.
	pub fn sign(&self) -> Option<String> {
		if let Self::Detailed { sign: Some(sign), .. } = self {
			let sign = sign.trim();

			if !sign.is_empty() {
				return Some(sign.to_string());
			}
		}

		self.longitude().and_then(deg_to_sign).map(|(sign, _)| sign.to_string())
	}
}

pub fn parse_chart(raw: &Value) -> Result<NatalChart, ChartIssue> {
	match raw {
		Value::Null => Err(ChartIssue::Missing),
		Value::String(text) => {
			if text.trim().is_empty() {
				return Err(ChartIssue::Missing);
			}

			let inner: Value =
				serde_json::from_str(text).map_err(|_| ChartIssue::Unparseable)?;

			match inner {
				Value::Object(_) => parse_chart(&inner),
				Value::Null => Err(ChartIssue::Missing),
				_ => Err(ChartIssue::Unparseable),
			}
		},
		Value::Object(map) if map.is_empty() => Err(ChartIssue::Missing),
		Value::Object(_) =>
			NatalChart::deserialize(raw).map_err(|_| ChartIssue::Unparseable),
		_ => Err(ChartIssue::Unparseable),
	}
}

fn lenient_number(value: &Value) -> Option<f64> {
	let number = match value {
		Value::Number(number) => number.as_f64(),
		Value::String(text) => text.trim().parse::<f64>().ok(),
		_ => None,
	};

	number.filter(|number| number.is_finite())
}

fn lenient_degrees<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
	D: Deserializer<'de>,
{
	Ok(lenient_number(&Value::deserialize(deserializer)?))
}

fn lenient_house<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
	D: Deserializer<'de>,
{
	let house = lenient_number(&Value::deserialize(deserializer)?)
		.filter(|house| house.fract() == 0.0 && (1.0..=12.0).contains(house));

	Ok(house.map(|house| house as u8))
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
	D: Deserializer<'de>,
{
	match Value::deserialize(deserializer)? {
		Value::String(text) => Ok(Some(text)),
		_ => Ok(None),
	}
}

fn lenient_angle<'de, D>(deserializer: D) -> Result<Option<ChartAngle>, D::Error>
where
	D: Deserializer<'de>,
{
	Ok(ChartAngle::deserialize(Value::deserialize(deserializer)?).ok())
}

fn lenient_planets<'de, D>(
	deserializer: D,
) -> Result<BTreeMap<String, Option<PlanetPosition>>, D::Error>
where
	D: Deserializer<'de>,
{
	let raw = Option::<BTreeMap<String, Value>>::deserialize(deserializer)?.unwrap_or_default();

	Ok(raw
		.into_iter()
		.map(|(name, value)| (name, PlanetPosition::deserialize(value).ok()))
		.collect())
}

/// Splits an ecliptic longitude into its sign and the degree inside that sign.
pub fn deg_to_sign(deg: f64) -> Option<(&'static str, f64)> {
	if !deg.is_finite() {
		return None;
	}

	let deg = deg.rem_euclid(360.0);
	let index = ((deg / 30.0).floor() as usize).min(SIGNS.len() - 1);

	Some((SIGNS[index], deg - index as f64 * 30.0))
}

pub fn sign_element(sign: &str) -> Option<Element> {
	let index = SIGNS.iter().position(|known| known.eq_ignore_ascii_case(sign.trim()))?;

	Some(match index % 4 {
		0 => Element::Fire,
		1 => Element::Earth,
		2 => Element::Air,
		_ => Element::Water,
	})
}

/// Shortest arc between two longitudes, in `[0, 180]`.
pub fn angle_diff(a: f64, b: f64) -> f64 {
	let diff = (a - b).abs() % 360.0;

	if diff > 180.0 { 360.0 - diff } else { diff }
}
