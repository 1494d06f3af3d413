use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result};

const MAX_DECODE_ATTEMPTS: usize = 3;

/// Sends `messages` to an OpenAI-compatible chat endpoint and returns the JSON document the
/// model answered with.
///
/// A reply whose content is not a JSON object is re-requested, up to three times in total.
/// Transport errors are returned immediately.
pub async fn extract(cfg: &anl_config::LlmProviderConfig, messages: &[Value]) -> Result<Value> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"messages": messages,
		"response_format": { "type": "json_object" },
	});

	for _ in 0..MAX_DECODE_ATTEMPTS {
		let res = client
			.post(&url)
			.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
			.json(&body)
			.send()
			.await?;
		let json: Value = res.error_for_status()?.json().await?;

		if let Ok(parsed) = parse_extractor_json(json) {
			return Ok(parsed);
		}
	}

	Err(Error::InvalidResponse { message: "Extractor response is not valid JSON.".to_string() })
}

fn parse_extractor_json(json: Value) -> Result<Value> {
	let content = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
		.ok_or_else(|| Error::InvalidResponse {
			message: "Extractor response is missing message content.".to_string(),
		})?;
	let parsed: Value = serde_json::from_str(strip_code_fence(content))?;

	if !parsed.is_object() {
		return Err(Error::InvalidResponse {
			message: "Extractor content must be a JSON object.".to_string(),
		});
	}

	Ok(parsed)
}

/// Unwraps a single fenced block such as ```` ```json {..} ``` ````.
fn strip_code_fence(content: &str) -> &str {
	let trimmed = content.trim();
	let Some(inner) = trimmed.strip_prefix("```").and_then(|rest| rest.strip_suffix("```")) else {
		return trimmed;
	};
	let inner = inner.strip_prefix("json").unwrap_or(inner);

	inner.trim()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn reply(content: &str) -> Value {
		serde_json::json!({ "choices": [{ "message": { "content": content } }] })
	}

	#[test]
	fn parses_choice_content_json() {
		let parsed = parse_extractor_json(reply("{\"extracted_traits\": []}")).expect("parse failed");

		assert!(parsed.get("extracted_traits").is_some());
	}

	#[test]
	fn unwraps_fenced_json() {
		let parsed = parse_extractor_json(reply("```json\n{\"a\": 1}\n```")).expect("parse failed");

		assert_eq!(parsed["a"], 1);
	}

	#[test]
	fn prose_around_json_is_rejected() {
		assert!(parse_extractor_json(reply("Sure! {\"a\": 1}")).is_err());
		assert!(parse_extractor_json(reply("[1, 2]")).is_err());
		assert!(parse_extractor_json(serde_json::json!({ "choices": [] })).is_err());
	}
}
