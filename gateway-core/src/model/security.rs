use arcstr::ArcStr;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::model::common::AccessPolicy;

/// IP allow/deny list with precomputed CIDR sets (`IPAccess`, §4.4).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpAccess {
	pub default_policy: AccessPolicy,
	pub whitelist_ips: Vec<String>,
	pub blacklist_ips: Vec<String>,
	pub whitelist_cidrs: Vec<IpNet>,
	pub blacklist_cidrs: Vec<IpNet>,
	pub trust_x_forwarded_for: bool,
	pub trust_x_real_ip: bool,
}

impl Default for IpAccess {
	fn default() -> Self {
		Self {
			default_policy: AccessPolicy::Allow,
			whitelist_ips: Vec::new(),
			blacklist_ips: Vec::new(),
			whitelist_cidrs: Vec::new(),
			blacklist_cidrs: Vec::new(),
			trust_x_forwarded_for: false,
			trust_x_real_ip: false,
		}
	}
}

impl IpAccess {
	pub fn merge(rows: &[IpAccess]) -> Option<IpAccess> {
		merge_rows(rows, |acc, row| {
			acc.whitelist_ips.extend(row.whitelist_ips.iter().cloned());
			acc.blacklist_ips.extend(row.blacklist_ips.iter().cloned());
			acc.whitelist_cidrs.extend(row.whitelist_cidrs.iter().cloned());
			acc.blacklist_cidrs.extend(row.blacklist_cidrs.iter().cloned());
			acc.trust_x_forwarded_for |= row.trust_x_forwarded_for;
			acc.trust_x_real_ip |= row.trust_x_real_ip;
		})
	}

	pub fn check(&self, ip: std::net::IpAddr) -> bool {
		let ip_str = ip.to_string();
		if self.whitelist_ips.iter().any(|w| w == &ip_str)
			|| self.whitelist_cidrs.iter().any(|c| c.contains(&ip))
		{
			return true;
		}
		if self.blacklist_ips.iter().any(|b| b == &ip_str)
			|| self.blacklist_cidrs.iter().any(|c| c.contains(&ip))
		{
			return false;
		}
		self.default_policy == AccessPolicy::Allow
	}
}

/// A user-agent pattern: `re:`-prefixed entries are regexes, everything else
/// is a literal substring match.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UaPattern(pub String);

impl UaPattern {
	pub fn matches(&self, ua: &str) -> bool {
		if let Some(pattern) = self.0.strip_prefix("re:") {
			regex::Regex::new(pattern).map(|re| re.is_match(ua)).unwrap_or(false)
		} else {
			ua.contains(self.0.as_str())
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAgentAccess {
	pub default_policy: AccessPolicy,
	pub whitelist_patterns: Vec<UaPattern>,
	pub blacklist_patterns: Vec<UaPattern>,
	pub block_empty: bool,
}

impl Default for UserAgentAccess {
	fn default() -> Self {
		Self {
			default_policy: AccessPolicy::Allow,
			whitelist_patterns: Vec::new(),
			blacklist_patterns: Vec::new(),
			block_empty: false,
		}
	}
}

impl UserAgentAccess {
	pub fn merge(rows: &[UserAgentAccess]) -> Option<UserAgentAccess> {
		merge_rows(rows, |acc, row| {
			acc
				.whitelist_patterns
				.extend(row.whitelist_patterns.iter().cloned());
			acc
				.blacklist_patterns
				.extend(row.blacklist_patterns.iter().cloned());
			acc.block_empty |= row.block_empty;
		})
	}

	pub fn check(&self, ua: Option<&str>) -> bool {
		let ua = match ua {
			Some(ua) if !ua.is_empty() => ua,
			_ => return !self.block_empty,
		};
		if self.whitelist_patterns.iter().any(|p| p.matches(ua)) {
			return true;
		}
		if self.blacklist_patterns.iter().any(|p| p.matches(ua)) {
			return false;
		}
		self.default_policy == AccessPolicy::Allow
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiAccess {
	pub default_policy: AccessPolicy,
	pub whitelist_paths: Vec<String>,
	pub blacklist_paths: Vec<String>,
	pub allowed_methods: Vec<String>,
	pub blocked_methods: Vec<String>,
}

impl Default for ApiAccess {
	fn default() -> Self {
		Self {
			default_policy: AccessPolicy::Allow,
			whitelist_paths: Vec::new(),
			blacklist_paths: Vec::new(),
			allowed_methods: Vec::new(),
			blocked_methods: Vec::new(),
		}
	}
}

impl ApiAccess {
	pub fn merge(rows: &[ApiAccess]) -> Option<ApiAccess> {
		merge_rows(rows, |acc, row| {
			acc.whitelist_paths.extend(row.whitelist_paths.iter().cloned());
			acc.blacklist_paths.extend(row.blacklist_paths.iter().cloned());
			acc.allowed_methods.extend(row.allowed_methods.iter().cloned());
			acc.blocked_methods.extend(row.blocked_methods.iter().cloned());
		})
	}

	pub fn check(&self, path: &str, method: &str) -> bool {
		if !self.allowed_methods.is_empty() && !self.allowed_methods.iter().any(|m| m.eq_ignore_ascii_case(method))
		{
			return false;
		}
		if self.blocked_methods.iter().any(|m| m.eq_ignore_ascii_case(method)) {
			return false;
		}
		if self.whitelist_paths.iter().any(|p| path.starts_with(p.as_str())) {
			return true;
		}
		if self.blacklist_paths.iter().any(|p| path.starts_with(p.as_str())) {
			return false;
		}
		self.default_policy == AccessPolicy::Allow
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainAccess {
	pub default_policy: AccessPolicy,
	pub whitelist_domains: Vec<String>,
	pub blacklist_domains: Vec<String>,
	pub allow_subdomains: bool,
}

impl Default for DomainAccess {
	fn default() -> Self {
		Self {
			default_policy: AccessPolicy::Allow,
			whitelist_domains: Vec::new(),
			blacklist_domains: Vec::new(),
			allow_subdomains: false,
		}
	}
}

impl DomainAccess {
	pub fn merge(rows: &[DomainAccess]) -> Option<DomainAccess> {
		merge_rows(rows, |acc, row| {
			acc.whitelist_domains.extend(row.whitelist_domains.iter().cloned());
			acc.blacklist_domains.extend(row.blacklist_domains.iter().cloned());
			acc.allow_subdomains |= row.allow_subdomains;
		})
	}

	fn domain_matches(&self, pattern: &str, host: &str) -> bool {
		pattern == host || (self.allow_subdomains && host.ends_with(&format!(".{pattern}")))
	}

	pub fn check(&self, host: &str) -> bool {
		if self
			.whitelist_domains
			.iter()
			.any(|p| self.domain_matches(p, host))
		{
			return true;
		}
		if self
			.blacklist_domains
			.iter()
			.any(|p| self.domain_matches(p, host))
		{
			return false;
		}
		self.default_policy == AccessPolicy::Allow
	}
}

/// Rows sharing one `securityConfigId` merge by set-union and `any-Y ⇒ Y` for
/// booleans; `defaultPolicy` comes from
/// the first (lowest-ordered) row.
fn merge_rows<T: Default + Clone>(rows: &[T], mut extend: impl FnMut(&mut T, &T)) -> Option<T> {
	let mut iter = rows.iter();
	let first = iter.next()?.clone();
	let mut acc = first;
	for row in iter {
		extend(&mut acc, row);
	}
	Some(acc)
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityConfig {
	pub ip_access: Option<IpAccess>,
	pub user_agent_access: Option<UserAgentAccess>,
	pub api_access: Option<ApiAccess>,
	pub domain_access: Option<DomainAccess>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuthStrategy {
	NoAuth,
	Jwt,
	ApiKey,
	OAuth2,
	Basic,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuthMode {
	Required,
	Optional,
	Disabled,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
	pub strategy: AuthStrategy,
	pub mode: AuthMode,
	pub excluded_paths: Vec<String>,
	pub config: HashMap<String, serde_json::Value>,
	pub failure_status_code: u16,
	pub failure_message: ArcStr,
}

impl Default for AuthConfig {
	fn default() -> Self {
		Self {
			strategy: AuthStrategy::NoAuth,
			mode: AuthMode::Disabled,
			excluded_paths: Vec::new(),
			config: HashMap::new(),
			failure_status_code: 401,
			failure_message: ArcStr::from("Unauthorized"),
		}
	}
}

impl AuthConfig {
	/// `true` if auth should be skipped for `path` (exact match or `prefix*`).
	pub fn path_excluded(&self, path: &str) -> bool {
		self.excluded_paths.iter().any(|pattern| {
			if let Some(prefix) = pattern.strip_suffix('*') {
				path.starts_with(prefix)
			} else {
				pattern == path
			}
		})
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorsConfig {
	pub allow_origins: Vec<String>,
	pub allow_methods: Vec<String>,
	pub allow_headers: Vec<String>,
	pub expose_headers: Vec<String>,
	pub allow_credentials: bool,
	pub max_age: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum RateLimitAlgorithm {
	TokenBucket,
	LeakyBucket,
	SlidingWindow,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum KeyStrategy {
	ClientIp,
	UserId,
	RouteId,
	RouteIdClientIp,
	Header { name: String },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
	pub algorithm: RateLimitAlgorithm,
	pub rate: f64,
	pub burst: u64,
	/// Only consumed by `SlidingWindow`: preserved, ignored elsewhere.
	pub time_window_seconds: u64,
	pub key_strategy: KeyStrategy,
	pub rejection_status_code: u16,
	pub rejection_message: ArcStr,
	pub custom: HashMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ip_access_whitelist_wins_over_blacklist() {
		let access = IpAccess {
			whitelist_ips: vec!["10.0.0.5".into()],
			blacklist_ips: vec!["10.0.0.5".into()],
			..Default::default()
		};
		assert!(access.check("10.0.0.5".parse().unwrap()));
	}

	#[test]
	fn ip_access_blacklist_denies() {
		let access = IpAccess {
			default_policy: AccessPolicy::Allow,
			blacklist_ips: vec!["10.0.0.5".into()],
			..Default::default()
		};
		assert!(!access.check("10.0.0.5".parse().unwrap()));
		assert!(access.check("10.0.0.1".parse().unwrap()));
	}

	#[test]
	fn merge_is_union_and_any_y() {
		let a = IpAccess {
			whitelist_ips: vec!["1.1.1.1".into()],
			trust_x_forwarded_for: false,
			..Default::default()
		};
		let b = IpAccess {
			whitelist_ips: vec!["2.2.2.2".into()],
			trust_x_forwarded_for: true,
			..Default::default()
		};
		let merged = IpAccess::merge(&[a, b]).unwrap();
		assert_eq!(merged.whitelist_ips.len(), 2);
		assert!(merged.trust_x_forwarded_for);
	}

	#[test]
	fn domain_access_subdomain_match() {
		let access = DomainAccess {
			whitelist_domains: vec!["example.com".into()],
			allow_subdomains: true,
			..Default::default()
		};
		assert!(access.check("api.example.com"));
		assert!(access.check("example.com"));
		assert!(!access.check("notexample.com"));
	}

	#[test]
	fn auth_path_excluded_prefix() {
		let cfg = AuthConfig {
			excluded_paths: vec!["/public/*".into()],
			..Default::default()
		};
		assert!(cfg.path_excluded("/public/health"));
		assert!(!cfg.path_excluded("/private/health"));
	}
}
