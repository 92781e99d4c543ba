use arcstr::ArcStr;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::model::security::{AuthConfig, CorsConfig, RateLimitConfig, SecurityConfig};

/// Path-matching mode for a [`Route`] (`Route.match`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
	Exact = 0,
	Prefix = 1,
	Regex = 2,
}

/// One per instance (or the process default if none is stored).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterConfig {
	pub default_priority: i32,
	pub route_cache_enabled: bool,
	pub route_cache_ttl_seconds: u64,
	pub case_sensitive: bool,
	pub remove_trailing_slash: bool,
	pub global_filter_enabled: bool,
	pub fallback_route: Option<ArcStr>,
	pub not_found_status_code: u16,
	pub not_found_message: ArcStr,
}

impl Default for RouterConfig {
	fn default() -> Self {
		Self {
			default_priority: 0,
			route_cache_enabled: true,
			route_cache_ttl_seconds: 60,
			case_sensitive: true,
			remove_trailing_slash: false,
			global_filter_enabled: true,
			fallback_route: None,
			not_found_status_code: 404,
			not_found_message: ArcStr::from("Route not found"),
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
	pub id: ArcStr,
	pub path: ArcStr,
	pub match_type: MatchType,
	pub allowed_methods: Vec<String>,
	pub allowed_hosts: Vec<String>,
	pub priority: i32,
	pub strip_prefix: bool,
	pub rewrite_path: Option<ArcStr>,
	pub enable_websocket: bool,
	pub timeout_ms: u64,
	pub retry_count: u32,
	pub retry_interval_ms: u64,
	pub service_definition_id: ArcStr,
	pub log_config_id: Option<ArcStr>,
	pub metadata: HashMap<String, serde_json::Value>,
	pub assertion_group: Option<AssertionGroup>,
	pub filters: Vec<Filter>,
	pub security: Option<SecurityConfig>,
	pub auth: Option<AuthConfig>,
	pub cors: Option<CorsConfig>,
	pub rate_limit: Option<RateLimitConfig>,
}

impl Route {
	/// `true` if `host` satisfies `allowedHosts` (exact, or `*.example` suffix).
	pub fn host_allowed(&self, host: &str) -> bool {
		if self.allowed_hosts.is_empty() {
			return true;
		}
		self.allowed_hosts.iter().any(|pattern| {
			if let Some(suffix) = pattern.strip_prefix("*.") {
				host == suffix || host.ends_with(&format!(".{suffix}"))
			} else {
				pattern == host
			}
		})
	}

	pub fn method_allowed(&self, method: &str) -> bool {
		self.allowed_methods.is_empty()
			|| self
				.allowed_methods
				.iter()
				.any(|m| m.eq_ignore_ascii_case(method))
	}
}

/// `(type, operator, fieldName?, expectedValue?, patternValue?, caseSensitive, order, isRequired)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteAssertion {
	pub assertion_type: AssertionType,
	pub operator: AssertionOperator,
	pub field_name: Option<String>,
	pub expected_value: Option<String>,
	pub pattern_value: Option<String>,
	pub case_sensitive: bool,
	pub order: i32,
	pub is_required: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssertionType {
	Path,
	Header,
	Query,
	Method,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssertionOperator {
	Equal,
	Matches,
	In,
	Exists,
}

/// A route's assertions grouped under one AND/OR combinator
/// (`metadata.assertion_group.all_required`, default `true`).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionGroup {
	pub all_required: bool,
	pub assertions: Vec<RouteAssertion>,
}

impl Default for AssertionGroup {
	fn default() -> Self {
		Self {
			all_required: true,
			assertions: Vec::new(),
		}
	}
}

/// The phase a [`Filter`] runs in, ordered as `pre-routing < post-routing < pre-response`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterAction {
	PreRouting = 0,
	PostRouting = 1,
	PreResponse = 2,
}

/// `(type, action, order, config)`. `config` has already had any
/// `headerConfig/queryConfig/bodyConfig/urlConfig` sub-objects flattened into
/// its top level by the loader.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
	pub filter_type: ArcStr,
	pub enabled: bool,
	pub action: FilterAction,
	pub order: i32,
	/// Monotonically increasing load-order, used only to break ties on
	/// `(action, order)` so the stable-sort invariant in holds.
	pub insertion_order: u64,
	pub run_always: bool,
	pub config: HashMap<String, serde_json::Value>,
}

impl Filter {
	/// Lifts `headerConfig/queryConfig/bodyConfig/urlConfig` sub-objects in
	/// `raw` one level, preserving all other keys, step 6.
	pub fn flatten_config(raw: serde_json::Value) -> HashMap<String, serde_json::Value> {
		const LIFTED: [&str; 4] = ["headerConfig", "queryConfig", "bodyConfig", "urlConfig"];
		let mut out = HashMap::new();
		let serde_json::Value::Object(map) = raw else {
			return out;
		};
		for (key, value) in map {
			if LIFTED.contains(&key.as_str()) {
				if let serde_json::Value::Object(nested) = value {
					for (nested_key, nested_value) in nested {
						out.insert(nested_key, nested_value);
					}
					continue;
				}
			}
			out.insert(key, value);
		}
		out
	}
}

/// Sorts filters by `(actionOrdinal, order asc, insertionOrder asc)` — the
/// deterministic, stable ordering filter execution relies on.
pub fn sort_filters(filters: &mut [Filter]) {
	filters.sort_by(|a, b| {
		(a.action, a.order, a.insertion_order).cmp(&(b.action, b.order, b.insertion_order))
	});
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn host_allowed_matches_wildcard_suffix() {
		let mut route = sample_route();
		route.allowed_hosts = vec!["*.example.com".into()];
		assert!(route.host_allowed("api.example.com"));
		assert!(route.host_allowed("example.com"));
		assert!(!route.host_allowed("example.org"));
	}

	#[test]
	fn empty_allowed_hosts_matches_everything() {
		let route = sample_route();
		assert!(route.host_allowed("anything"));
	}

	#[test]
	fn flatten_config_lifts_nested_objects() {
		let raw = json!({
			"headerConfig": {"add": {"X-Foo": "bar"}},
			"plain": 1,
		});
		let flat = Filter::flatten_config(raw);
		assert_eq!(flat.get("add"), Some(&json!({"X-Foo": "bar"})));
		assert_eq!(flat.get("plain"), Some(&json!(1)));
		assert!(!flat.contains_key("headerConfig"));
	}

	#[test]
	fn sort_filters_is_stable_on_ties() {
		let mut filters = vec![
			sample_filter(FilterAction::PostRouting, 0, 2),
			sample_filter(FilterAction::PreRouting, 5, 0),
			sample_filter(FilterAction::PreRouting, 5, 1),
		];
		sort_filters(&mut filters);
		let order: Vec<u64> = filters.iter().map(|f| f.insertion_order).collect();
		assert_eq!(order, vec![0, 1, 2]);
	}

	fn sample_filter(action: FilterAction, order: i32, insertion_order: u64) -> Filter {
		Filter {
			filter_type: "noop".into(),
			enabled: true,
			action,
			order,
			insertion_order,
			run_always: false,
			config: HashMap::new(),
		}
	}

	fn sample_route() -> Route {
		Route {
			id: "r1".into(),
			path: "/".into(),
			match_type: MatchType::Prefix,
			allowed_methods: vec![],
			allowed_hosts: vec![],
			priority: 0,
			strip_prefix: false,
			rewrite_path: None,
			enable_websocket: false,
			timeout_ms: 1000,
			retry_count: 0,
			retry_interval_ms: 0,
			service_definition_id: "s1".into(),
			log_config_id: None,
			metadata: HashMap::new(),
			assertion_group: None,
			filters: vec![],
			security: None,
			auth: None,
			cors: None,
			rate_limit: None,
		}
	}
}
