use arcstr::ArcStr;
use serde::{Deserialize, Serialize};

/// `activeFlag ∈ {Y,N}` as carried by every row-backed entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActiveFlag {
	Y,
	N,
}

impl ActiveFlag {
	pub fn is_active(self) -> bool {
		matches!(self, ActiveFlag::Y)
	}
}

impl From<bool> for ActiveFlag {
	fn from(b: bool) -> Self {
		if b { ActiveFlag::Y } else { ActiveFlag::N }
	}
}

/// Audit columns carried by every entity: `currentVersion`, `addTime/editTime`,
/// `addWho/editWho`, and a free-form `extProperty` JSON string.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Audit {
	pub current_version: i64,
	pub add_time: chrono::DateTime<chrono::Utc>,
	pub edit_time: chrono::DateTime<chrono::Utc>,
	pub add_who: ArcStr,
	pub edit_who: ArcStr,
	pub ext_property: Option<String>,
}

/// `defaultPolicy ∈ {ALLOW,DENY}` used by every access-control block in
/// [`crate::model::security::SecurityConfig`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccessPolicy {
	Allow,
	Deny,
}

impl Default for AccessPolicy {
	fn default() -> Self {
		AccessPolicy::Allow
	}
}

/// Parses `allowedMethods`/`allowedHosts`-style columns: a JSON array first,
/// falling back to a comma-separated list, trimming and dropping empties.
///
/// Mirrors the loader's `parseArray` helper.
pub fn parse_array(raw: &str) -> Vec<String> {
	if raw.trim().is_empty() {
		return Vec::new();
	}
	if let Ok(parsed) = serde_json::from_str::<Vec<String>>(raw) {
		return parsed;
	}
	raw
		.split(',')
		.map(|s| s.trim())
		.filter(|s| !s.is_empty())
		.map(String::from)
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_array_accepts_json() {
		assert_eq!(parse_array(r#"["GET","POST"]"#), vec!["GET", "POST"]);
	}

	#[test]
	fn parse_array_falls_back_to_csv() {
		assert_eq!(parse_array("GET, POST ,,PUT"), vec!["GET", "POST", "PUT"]);
	}

	#[test]
	fn parse_array_empty_is_empty() {
		assert!(parse_array("").is_empty());
		assert!(parse_array("   ").is_empty());
	}
}
