//! Pure transforms applied when a request/response is captured into the
//! per-request data bag. Every
//! field written to [`gateway_core::model::AccessLog`] or `BackendTraceLog`
//! goes through these functions rather than touching the live request.

use std::collections::HashMap;

use gateway_core::model::LogConfig;

const TRUNCATION_SUFFIX: &str = "...[truncated]";

/// `true` iff `b` starts a UTF-8 code point.
fn is_utf8_boundary(b: u8) -> bool {
	(b & 0x80) == 0 || (b & 0xC0) == 0xC0
}

/// Truncates `body` to at most `limit` bytes on a UTF-8-safe boundary,
/// appending `...[truncated]` when truncation actually happened. `limit ==
/// 0` means unlimited.
pub fn truncate_body(body: &str, limit: usize) -> String {
	if limit == 0 || body.len() <= limit {
		return body.to_string();
	}
	let suffix_len = TRUNCATION_SUFFIX.len();
	let bytes = body.as_bytes();

	// Not enough room to fit any of the body alongside the full suffix:
	// return a bare cut with no suffix so the result never exceeds `limit`.
	if limit <= suffix_len {
		let mut cut = limit.min(bytes.len());
		while cut > 0 && !is_utf8_boundary(bytes[cut]) {
			cut -= 1;
		}
		return body[..cut].to_string();
	}

	let budget = limit - suffix_len;
	let mut cut = budget.min(bytes.len());
	while cut > 0 && !is_utf8_boundary(bytes[cut]) {
		cut -= 1;
	}
	let mut out = String::with_capacity(cut + suffix_len);
	out.push_str(&body[..cut]);
	out.push_str(TRUNCATION_SUFFIX);
	out
}

/// Serializes a multi-valued header map into a single-value JSON object
/// (first value wins per name), case preserved on the key.
pub fn serialize_headers<'a>(headers: impl Iterator<Item = (&'a str, &'a str)>) -> serde_json::Value {
	let mut map = serde_json::Map::new();
	for (name, value) in headers {
		map.entry(name.to_string()).or_insert_with(|| serde_json::Value::String(value.to_string()));
	}
	serde_json::Value::Object(map)
}

/// Replaces values of keys matching `sensitive_fields` (case-insensitive)
/// with `masking_pattern` inside a serialized header/query JSON object.
pub fn mask_json(value: serde_json::Value, sensitive_fields: &[String], masking_pattern: &str) -> serde_json::Value {
	match value {
		serde_json::Value::Object(map) => {
			let masked = map
				.into_iter()
				.map(|(k, v)| {
					if is_sensitive_key(&k, sensitive_fields) {
						(k, serde_json::Value::String(masking_pattern.to_string()))
					} else {
						(k, mask_json(v, sensitive_fields, masking_pattern))
					}
				})
				.collect();
			serde_json::Value::Object(masked)
		},
		serde_json::Value::Array(items) => serde_json::Value::Array(items.into_iter().map(|v| mask_json(v, sensitive_fields, masking_pattern)).collect()),
		other => other,
	}
}

fn is_sensitive_key(key: &str, sensitive_fields: &[String]) -> bool {
	sensitive_fields.iter().any(|f| f.eq_ignore_ascii_case(key))
}

/// Masks a JSON request/response body if it parses as JSON; otherwise the
/// body is returned untouched (masking only applies to structured bodies
///).
pub fn mask_body_if_json(body: &str, sensitive_fields: &[String], masking_pattern: &str) -> String {
	match serde_json::from_str::<serde_json::Value>(body) {
		Ok(value) => {
			let masked = mask_json(value, sensitive_fields, masking_pattern);
			serde_json::to_string(&masked).unwrap_or_else(|_| body.to_string())
		},
		Err(_) => body.to_string(),
	}
}

pub fn mask_query(query: &HashMap<String, String>, sensitive_fields: &[String], masking_pattern: &str) -> HashMap<String, String> {
	query
		.iter()
		.map(|(k, v)| {
			if is_sensitive_key(k, sensitive_fields) {
				(k.clone(), masking_pattern.to_string())
			} else {
				(k.clone(), v.clone())
			}
		})
		.collect()
}

/// Builds the `requestHeaders`/`responseHeaders` JSON value for an
/// [`AccessLog`](gateway_core::model::AccessLog), applying masking when
/// `config.enable_sensitive_data_masking` is set. Returns `None` when
/// `config.record_headers` is off.
pub fn capture_headers<'a>(config: &LogConfig, headers: impl Iterator<Item = (&'a str, &'a str)>) -> Option<serde_json::Value> {
	if !config.record_headers {
		return None;
	}
	let serialized = serialize_headers(headers);
	Some(if config.enable_sensitive_data_masking {
		mask_json(serialized, &config.sensitive_fields, &config.masking_pattern)
	} else {
		serialized
	})
}

/// Builds the `requestBody`/`responseBody` string for an access log entry,
/// applying truncation and (if the body parses as JSON) masking. Returns
/// `None` when the corresponding `record_*_body` flag is off.
pub fn capture_body(config: &LogConfig, record: bool, body: &str) -> Option<String> {
	if !record {
		return None;
	}
	let masked = if config.enable_sensitive_data_masking {
		mask_body_if_json(body, &config.sensitive_fields, &config.masking_pattern)
	} else {
		body.to_string()
	};
	Some(truncate_body(&masked, config.max_body_size_bytes))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn truncate_respects_utf8_boundary() {
		let body = "héllo wörld"; // contains multi-byte chars
		// 6 bytes is under the suffix's own length, so this is a bare cut
		// with no suffix appended (the result must still never exceed 6 bytes).
		let truncated = truncate_body(body, 6);
		assert!(truncated.len() <= 6);
		assert!(std::str::from_utf8(truncated.as_bytes()).is_ok());
	}

	#[test]
	fn truncate_appends_suffix_when_room_allows() {
		let body = "héllo wörld, this is a much longer body than before";
		let truncated = truncate_body(body, 30);
		assert!(truncated.ends_with(TRUNCATION_SUFFIX));
		assert!(truncated.len() <= 30);
		assert!(std::str::from_utf8(truncated.as_bytes()).is_ok());
	}

	#[test]
	fn truncate_never_exceeds_limit_when_smaller_than_suffix() {
		let body = "a much longer body than the truncation suffix itself";
		let truncated = truncate_body(body, 10);
		assert!(truncated.len() <= 10);
		assert!(std::str::from_utf8(truncated.as_bytes()).is_ok());
	}

	#[test]
	fn truncate_is_noop_under_limit() {
		assert_eq!(truncate_body("short", 100), "short");
		assert_eq!(truncate_body("short", 0), "short");
	}

	#[test]
	fn header_serialization_first_value_wins() {
		let headers = vec![("X-Trace", "a"), ("X-Trace", "b")];
		let value = serialize_headers(headers.into_iter());
		assert_eq!(value["X-Trace"], serde_json::json!("a"));
	}

	#[test]
	fn header_serialization_is_idempotent() {
		let headers = vec![("Authorization", "Bearer xyz"), ("Accept", "json")];
		let once = serialize_headers(headers.clone().into_iter());
		let round_tripped: HashMap<String, String> = serde_json::from_value(once.clone()).unwrap();
		let twice = serialize_headers(round_tripped.iter().map(|(k, v)| (k.as_str(), v.as_str())));
		let mut once_keys: Vec<_> = once.as_object().unwrap().keys().cloned().collect();
		let mut twice_keys: Vec<_> = twice.as_object().unwrap().keys().cloned().collect();
		once_keys.sort();
		twice_keys.sort();
		assert_eq!(once_keys, twice_keys);
	}

	#[test]
	fn masking_replaces_sensitive_keys_case_insensitively() {
		let value = serde_json::json!({"Password": "hunter2", "user": "alice"});
		let masked = mask_json(value, &["password".to_string()], "***");
		assert_eq!(masked["Password"], serde_json::json!("***"));
		assert_eq!(masked["user"], serde_json::json!("alice"));
	}

	#[test]
	fn body_masking_skips_non_json() {
		let masked = mask_body_if_json("not json", &["password".to_string()], "***");
		assert_eq!(masked, "not json");
	}
}
