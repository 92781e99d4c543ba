//! Route matcher.
//!
//! Normalizes the incoming fingerprint per [`RouterConfig`], optionally
//! consults a TTL'd cache keyed by `(method, path, host)`, then falls back to
//! a linear scan of routes in ascending `priority` (stable on ties by
//! insertion order, since `routes` is already loaded in that order).

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use regex::Regex;

use crate::model::{AssertionGroup, AssertionOperator, AssertionType, MatchType, Route, RouterConfig};

#[derive(Clone, Debug, Default)]
pub struct RequestFingerprint {
	pub method: String,
	pub host: String,
	pub path: String,
	pub query: HashMap<String, String>,
	pub headers: HashMap<String, String>,
}

#[derive(Clone, Debug)]
pub struct MatchResult {
	pub route_index: usize,
	pub path_params: HashMap<String, String>,
}

struct CacheEntry {
	result: Option<MatchResult>,
	inserted_at: Instant,
}

pub struct RouteMatcher {
	router: RouterConfig,
	routes: Vec<Route>,
	compiled_regex: Vec<Option<Regex>>,
	cache: RwLock<HashMap<(String, String, String), CacheEntry>>,
}

impl RouteMatcher {
	pub fn new(router: RouterConfig, routes: Vec<Route>) -> Self {
		let compiled_regex = routes
			.iter()
			.map(|r| {
				(r.match_type == MatchType::Regex)
					.then(|| Regex::new(r.path.as_str()).ok())
					.flatten()
			})
			.collect();
		Self {
			router,
			routes,
			compiled_regex,
			cache: RwLock::new(HashMap::new()),
		}
	}

	fn normalize_path(&self, path: &str) -> String {
		let mut out = if self.router.case_sensitive {
			path.to_string()
		} else {
			path.to_lowercase()
		};
		if self.router.remove_trailing_slash && out.len() > 1 && out.ends_with('/') {
			out.pop();
		}
		out
	}

	pub fn find(&self, req: &RequestFingerprint) -> Option<MatchResult> {
		let path = self.normalize_path(&req.path);
		let key = (req.method.clone(), path.clone(), req.host.clone());

		if self.router.route_cache_enabled {
			let ttl = Duration::from_secs(self.router.route_cache_ttl_seconds);
			let cache = self.cache.read().expect("cache lock poisoned");
			if let Some(entry) = cache.get(&key) {
				if entry.inserted_at.elapsed() < ttl {
					return entry.result.clone();
				}
			}
		}

		let result = self.find_uncached(req, &path);

		if self.router.route_cache_enabled {
			let mut cache = self.cache.write().expect("cache lock poisoned");
			cache.insert(
				key,
				CacheEntry {
					result: result.clone(),
					inserted_at: Instant::now(),
				},
			);
		}

		result
	}

	fn find_uncached(&self, req: &RequestFingerprint, path: &str) -> Option<MatchResult> {
		for (index, route) in self.routes.iter().enumerate() {
			if !route.method_allowed(&req.method) {
				continue;
			}
			if !route.host_allowed(&req.host) {
				continue;
			}
			let Some(path_params) = self.match_path(route, index, path) else {
				continue;
			};
			if !evaluate_assertion_group(route.assertion_group.as_ref(), req) {
				continue;
			}
			return Some(MatchResult { route_index: index, path_params });
		}
		None
	}

	fn match_path(&self, route: &Route, index: usize, path: &str) -> Option<HashMap<String, String>> {
		let pattern = self.normalize_path(&route.path);
		match route.match_type {
			MatchType::Exact => (path == pattern).then(HashMap::new),
			MatchType::Prefix => path.starts_with(&pattern).then(HashMap::new),
			MatchType::Regex => {
				let re = self.compiled_regex.get(index)?.as_ref()?;
				let caps = re.captures(path)?;
				let mut params = HashMap::new();
				for name in re.capture_names().flatten() {
					if let Some(m) = caps.name(name) {
						params.insert(name.to_string(), m.as_str().to_string());
					}
				}
				Some(params)
			},
		}
	}
}

/// `AND` when `all_required`, else `OR`; a non-required assertion that fails
/// is skipped rather than failing the group.
fn evaluate_assertion_group(group: Option<&AssertionGroup>, req: &RequestFingerprint) -> bool {
	let Some(group) = group else { return true };
	if group.assertions.is_empty() {
		return true;
	}
	if group.all_required {
		group.assertions.iter().all(|a| !a.is_required || evaluate_assertion(a, req))
	} else {
		group.assertions.iter().any(|a| evaluate_assertion(a, req))
	}
}

fn evaluate_assertion(assertion: &crate::model::RouteAssertion, req: &RequestFingerprint) -> bool {
	let actual = match assertion.assertion_type {
		AssertionType::Path => Some(req.path.clone()),
		AssertionType::Method => Some(req.method.clone()),
		AssertionType::Header => assertion
			.field_name
			.as_ref()
			.and_then(|name| req.headers.get(&name.to_lowercase()).cloned()),
		AssertionType::Query => assertion
			.field_name
			.as_ref()
			.and_then(|name| req.query.get(name).cloned()),
	};
	let Some(actual) = actual else {
		return false;
	};
	let normalize = |s: &str| {
		if assertion.case_sensitive { s.to_string() } else { s.to_lowercase() }
	};
	match assertion.operator {
		AssertionOperator::Exists => true,
		AssertionOperator::Equal => assertion
			.expected_value
			.as_ref()
			.map(|expected| normalize(expected) == normalize(&actual))
			.unwrap_or(false),
		AssertionOperator::Matches => assertion
			.pattern_value
			.as_ref()
			.and_then(|p| Regex::new(p).ok())
			.map(|re| re.is_match(&actual))
			.unwrap_or(false),
		AssertionOperator::In => assertion
			.expected_value
			.as_ref()
			.map(|csv| csv.split(',').map(str::trim).any(|v| normalize(v) == normalize(&actual)))
			.unwrap_or(false),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap as Map;

	fn route(path: &str, match_type: MatchType, priority: i32) -> Route {
		Route {
			id: format!("{path}-{priority}").into(),
			path: path.into(),
			match_type,
			allowed_methods: vec![],
			allowed_hosts: vec![],
			priority,
			strip_prefix: false,
			rewrite_path: None,
			enable_websocket: false,
			timeout_ms: 1000,
			retry_count: 0,
			retry_interval_ms: 0,
			service_definition_id: "svc".into(),
			log_config_id: None,
			metadata: Default::default(),
			assertion_group: None,
			filters: vec![],
			security: None,
			auth: None,
			cors: None,
			rate_limit: None,
		}
	}

	fn fp(method: &str, path: &str) -> RequestFingerprint {
		RequestFingerprint {
			method: method.into(),
			host: "example.com".into(),
			path: path.into(),
			query: Map::new(),
			headers: Map::new(),
		}
	}

	#[test]
	fn picks_smallest_priority_among_accepting_routes() {
		let matcher = RouteMatcher::new(
			RouterConfig::default(),
			vec![route("/api", MatchType::Prefix, 5), route("/api", MatchType::Prefix, 1)],
		);
		let result = matcher.find(&fp("GET", "/api/users")).unwrap();
		assert_eq!(result.route_index, 1);
	}

	#[test]
	fn no_match_returns_none() {
		let matcher = RouteMatcher::new(RouterConfig::default(), vec![route("/api", MatchType::Exact, 0)]);
		assert!(matcher.find(&fp("GET", "/other")).is_none());
	}

	#[test]
	fn assertion_group_or_semantics() {
		let mut r = route("/api", MatchType::Prefix, 0);
		r.assertion_group = Some(AssertionGroup {
			all_required: false,
			assertions: vec![
				crate::model::RouteAssertion {
					assertion_type: AssertionType::Header,
					operator: AssertionOperator::Equal,
					field_name: Some("x-env".into()),
					expected_value: Some("prod".into()),
					pattern_value: None,
					case_sensitive: false,
					order: 0,
					is_required: true,
				},
				crate::model::RouteAssertion {
					assertion_type: AssertionType::Header,
					operator: AssertionOperator::Equal,
					field_name: Some("x-env".into()),
					expected_value: Some("staging".into()),
					pattern_value: None,
					case_sensitive: false,
					order: 1,
					is_required: true,
				},
			],
		});
		let matcher = RouteMatcher::new(RouterConfig::default(), vec![r]);

		let mut req = fp("GET", "/api/x");
		req.headers.insert("x-env".into(), "staging".into());
		assert!(matcher.find(&req).is_some());

		let mut req = fp("GET", "/api/x");
		req.headers.insert("x-env".into(), "dev".into());
		assert!(matcher.find(&req).is_none());
	}

	#[test]
	fn cache_hits_return_same_result() {
		let matcher = RouteMatcher::new(RouterConfig::default(), vec![route("/api", MatchType::Prefix, 0)]);
		let first = matcher.find(&fp("GET", "/api/x"));
		let second = matcher.find(&fp("GET", "/api/x"));
		assert_eq!(first.unwrap().route_index, second.unwrap().route_index);
	}
}
