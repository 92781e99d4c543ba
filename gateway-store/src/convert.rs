//! Translates raw DB rows into `gateway-core` domain types. Kept separate
//! from [`crate::loader`] so the loader reads as the 10-step procedure from
//! and the row-shape wrangling doesn't crowd it out.

use std::collections::HashMap;

use gateway_core::model::{
	AccessPolicy, ApiAccess, AssertionGroup, AssertionOperator, AssertionType, AuthConfig, AuthMode, AuthStrategy,
	CorsConfig, DomainAccess, Filter, FilterAction, HealthCheckConfig, InstanceStatus, IpAccess, KeyStrategy,
	LoadBalanceStrategy, LogConfig, LogFormat, MatchType, NodeConfig, OutputTarget, ProxyConfig, ProxyType,
	RateLimitAlgorithm, RateLimitConfig, Route, RouteAssertion, RouterConfig, RotationPattern, ServiceConfig,
	UaPattern, UserAgentAccess,
};
use gateway_core::model::parse_array;

use crate::error::StoreError;
use crate::rows::*;

fn policy(s: &str) -> AccessPolicy {
	if s.eq_ignore_ascii_case("deny") { AccessPolicy::Deny } else { AccessPolicy::Allow }
}

pub fn router_config(row: Option<RouterConfigRow>) -> RouterConfig {
	let Some(row) = row else { return RouterConfig::default() };
	RouterConfig {
		default_priority: row.default_priority,
		route_cache_enabled: row.route_cache_enabled,
		route_cache_ttl_seconds: row.route_cache_ttl_seconds.max(0) as u64,
		case_sensitive: row.case_sensitive,
		remove_trailing_slash: row.remove_trailing_slash,
		global_filter_enabled: row.global_filter_enabled,
		fallback_route: row.fallback_route.map(Into::into),
		not_found_status_code: row.not_found_status_code as u16,
		not_found_message: row.not_found_message.into(),
	}
}

pub fn assertion_group(rows: Vec<RouteAssertionRow>, all_required: bool) -> Option<AssertionGroup> {
	if rows.is_empty() {
		return None;
	}
	let assertions = rows
		.into_iter()
		.map(|row| RouteAssertion {
			assertion_type: match row.assertion_type.to_lowercase().as_str() {
				"header" => AssertionType::Header,
				"query" => AssertionType::Query,
				"method" => AssertionType::Method,
				_ => AssertionType::Path,
			},
			operator: match row.operator.to_lowercase().as_str() {
				"matches" => AssertionOperator::Matches,
				"in" => AssertionOperator::In,
				"exists" => AssertionOperator::Exists,
				_ => AssertionOperator::Equal,
			},
			field_name: row.field_name.map(|s| s.to_lowercase()),
			expected_value: row.expected_value,
			pattern_value: row.pattern_value,
			case_sensitive: row.case_sensitive,
			order: row.assertion_order,
			is_required: row.is_required,
		})
		.collect();
	Some(AssertionGroup { all_required, assertions })
}

/// `true` unless the route's metadata explicitly sets
/// `assertion_group.all_required = false`.
pub fn all_required_from_metadata(metadata: &Option<serde_json::Value>) -> bool {
	metadata
		.as_ref()
		.and_then(|m| m.pointer("/assertion_group/all_required"))
		.and_then(|v| v.as_bool())
		.unwrap_or(true)
}

pub fn filter(row: FilterConfigRow, insertion_order: u64) -> Filter {
	let action = match row.action.to_lowercase().as_str() {
		"post-routing" => FilterAction::PostRouting,
		"pre-response" => FilterAction::PreResponse,
		_ => FilterAction::PreRouting,
	};
	let config = row
		.filter_config
		.map(Filter::flatten_config)
		.unwrap_or_default();
	Filter {
		filter_type: row.filter_type.into(),
		enabled: row.enabled,
		action,
		order: row.filter_order,
		insertion_order,
		run_always: row.run_always,
		config,
	}
}

pub fn route(
	row: RouteRow,
	assertions: Vec<RouteAssertionRow>,
	filters: Vec<Filter>,
	security: Option<gateway_core::model::SecurityConfig>,
	auth: Option<AuthConfig>,
	cors: Option<CorsConfig>,
	rate_limit: Option<RateLimitConfig>,
) -> Route {
	let all_required = all_required_from_metadata(&row.route_metadata);
	let metadata: HashMap<String, serde_json::Value> = row
		.route_metadata
		.as_ref()
		.and_then(|v| v.as_object())
		.map(|m| m.clone().into_iter().collect())
		.unwrap_or_default();

	Route {
		id: row.id.into(),
		path: row.path.into(),
		match_type: match row.match_type {
			1 => MatchType::Prefix,
			2 => MatchType::Regex,
			_ => MatchType::Exact,
		},
		allowed_methods: row.allowed_methods.as_deref().map(parse_array).unwrap_or_default(),
		allowed_hosts: row.allowed_hosts.as_deref().map(parse_array).unwrap_or_default(),
		priority: row.priority,
		strip_prefix: row.strip_prefix,
		rewrite_path: row.rewrite_path.map(Into::into),
		enable_websocket: row.enable_websocket,
		timeout_ms: row.timeout_ms.max(0) as u64,
		retry_count: row.retry_count.max(0) as u32,
		retry_interval_ms: row.retry_interval_ms.max(0) as u64,
		service_definition_id: row.service_definition_id.into(),
		log_config_id: row.log_config_id.map(Into::into),
		metadata,
		assertion_group: assertion_group(assertions, all_required),
		filters,
		security,
		auth,
		cors,
		rate_limit,
	}
}

pub fn ip_access(row: IpAccessConfigRow) -> Result<IpAccess, StoreError> {
	let parse_cidrs = |raw: Option<String>| -> Result<Vec<ipnet::IpNet>, StoreError> {
		Ok(
			raw
				.as_deref()
				.map(parse_array)
				.unwrap_or_default()
				.into_iter()
				.filter_map(|s| s.parse().ok())
				.collect(),
		)
	};
	Ok(IpAccess {
		default_policy: policy(&row.default_policy),
		whitelist_ips: row.whitelist_ips.as_deref().map(parse_array).unwrap_or_default(),
		blacklist_ips: row.blacklist_ips.as_deref().map(parse_array).unwrap_or_default(),
		whitelist_cidrs: parse_cidrs(row.whitelist_cidrs)?,
		blacklist_cidrs: parse_cidrs(row.blacklist_cidrs)?,
		trust_x_forwarded_for: row.trust_x_forwarded_for,
		trust_x_real_ip: row.trust_x_real_ip,
	})
}

pub fn ua_access(row: UaAccessConfigRow) -> UserAgentAccess {
	UserAgentAccess {
		default_policy: policy(&row.default_policy),
		whitelist_patterns: row
			.whitelist_patterns
			.as_deref()
			.map(parse_array)
			.unwrap_or_default()
			.into_iter()
			.map(UaPattern)
			.collect(),
		blacklist_patterns: row
			.blacklist_patterns
			.as_deref()
			.map(parse_array)
			.unwrap_or_default()
			.into_iter()
			.map(UaPattern)
			.collect(),
		block_empty: row.block_empty,
	}
}

pub fn api_access(row: ApiAccessConfigRow) -> ApiAccess {
	ApiAccess {
		default_policy: policy(&row.default_policy),
		whitelist_paths: row.whitelist_paths.as_deref().map(parse_array).unwrap_or_default(),
		blacklist_paths: row.blacklist_paths.as_deref().map(parse_array).unwrap_or_default(),
		allowed_methods: row.allowed_methods.as_deref().map(parse_array).unwrap_or_default(),
		blocked_methods: row.blocked_methods.as_deref().map(parse_array).unwrap_or_default(),
	}
}

pub fn domain_access(row: DomainAccessConfigRow) -> DomainAccess {
	DomainAccess {
		default_policy: policy(&row.default_policy),
		whitelist_domains: row.whitelist_domains.as_deref().map(parse_array).unwrap_or_default(),
		blacklist_domains: row.blacklist_domains.as_deref().map(parse_array).unwrap_or_default(),
		allow_subdomains: row.allow_subdomains,
	}
}

pub fn auth_config(row: AuthConfigRow) -> AuthConfig {
	let strategy = match row.strategy.to_uppercase().as_str() {
		"JWT" => AuthStrategy::Jwt,
		"APIKEY" | "API_KEY" => AuthStrategy::ApiKey,
		"OAUTH2" => AuthStrategy::OAuth2,
		"BASIC" => AuthStrategy::Basic,
		_ => AuthStrategy::NoAuth,
	};
	let mode = match row.auth_strategy.to_uppercase().as_str() {
		"REQUIRED" => AuthMode::Required,
		"OPTIONAL" => AuthMode::Optional,
		_ => AuthMode::Disabled,
	};
	AuthConfig {
		strategy,
		mode,
		excluded_paths: row.excluded_paths.as_deref().map(parse_array).unwrap_or_default(),
		config: row
			.auth_config
			.and_then(|v| v.as_object().cloned())
			.map(|m| m.into_iter().collect())
			.unwrap_or_default(),
		failure_status_code: row.failure_status_code as u16,
		failure_message: row.failure_message.into(),
	}
}

pub fn cors_config(row: CorsConfigRow) -> CorsConfig {
	CorsConfig {
		allow_origins: row.allow_origins.as_deref().map(parse_array).unwrap_or_default(),
		allow_methods: row.allow_methods.as_deref().map(parse_array).unwrap_or_default(),
		allow_headers: row.allow_headers.as_deref().map(parse_array).unwrap_or_default(),
		expose_headers: row.expose_headers.as_deref().map(parse_array).unwrap_or_default(),
		allow_credentials: row.allow_credentials,
		max_age: row.max_age.max(0) as u64,
	}
}

pub fn rate_limit_config(row: RateLimitConfigRow) -> RateLimitConfig {
	let algorithm = match row.algorithm.to_uppercase().as_str() {
		"LEAKYBUCKET" | "LEAKY_BUCKET" => RateLimitAlgorithm::LeakyBucket,
		"SLIDINGWINDOW" | "SLIDING_WINDOW" => RateLimitAlgorithm::SlidingWindow,
		_ => RateLimitAlgorithm::TokenBucket,
	};
	let key_strategy = match row.key_strategy.as_str() {
		"user-id" => KeyStrategy::UserId,
		"route-id" => KeyStrategy::RouteId,
		"route-id+client-ip" => KeyStrategy::RouteIdClientIp,
		other if other.starts_with("header:") => KeyStrategy::Header {
			name: other.trim_start_matches("header:").to_string(),
		},
		_ => KeyStrategy::ClientIp,
	};
	RateLimitConfig {
		algorithm,
		rate: row.rate,
		burst: row.burst.max(0) as u64,
		time_window_seconds: row.time_window_seconds.max(0) as u64,
		key_strategy,
		rejection_status_code: row.rejection_status_code as u16,
		rejection_message: row.rejection_message.into(),
		custom: row
			.custom_config
			.and_then(|v| v.as_object().cloned())
			.map(|m| m.into_iter().collect())
			.unwrap_or_default(),
	}
}

pub fn health_check(row: &ServiceDefinitionRow) -> HealthCheckConfig {
	HealthCheckConfig {
		enabled: row.health_check_enabled,
		path: row.health_check_path.clone().unwrap_or_else(|| "/".into()).into(),
		method: row.health_check_method.clone().unwrap_or_else(|| "GET".into()).into(),
		interval_seconds: row.health_check_interval_seconds.unwrap_or(10).max(0) as u64,
		timeout_ms: row.health_check_timeout_ms.unwrap_or(2000).max(0) as u64,
		healthy_threshold: row.healthy_threshold.unwrap_or(2).max(0) as u32,
		unhealthy_threshold: row.unhealthy_threshold.unwrap_or(3).max(0) as u32,
		expected_status_codes: row
			.expected_status_codes
			.as_deref()
			.map(parse_array)
			.unwrap_or_default()
			.into_iter()
			.filter_map(|s| s.parse().ok())
			.collect(),
		headers: row
			.health_check_headers
			.clone()
			.and_then(|v| v.as_object().cloned())
			.map(|m| m.into_iter().filter_map(|(k, v)| Some((k, v.as_str()?.to_string()))).collect())
			.unwrap_or_default(),
	}
}

pub fn service(row: ServiceDefinitionRow, nodes: Vec<ServiceNodeRow>) -> ServiceConfig {
	let load_balance_strategy = match row.load_balance_strategy.as_str() {
		"WeightedRoundRobin" => LoadBalanceStrategy::WeightedRoundRobin,
		"Random" => LoadBalanceStrategy::Random,
		"LeastConn" => LoadBalanceStrategy::LeastConn,
		"IPHash" | "IpHash" => LoadBalanceStrategy::IpHash,
		"ConsistentHash" => LoadBalanceStrategy::ConsistentHash,
		_ => LoadBalanceStrategy::RoundRobin,
	};
	let health_check = health_check(&row);
	ServiceConfig {
		id: row.id.into(),
		name: row.name.into(),
		load_balance_strategy,
		discovery_type: row.discovery_type.into(),
		discovery_config: row
			.discovery_config
			.and_then(|v| v.as_object().cloned())
			.map(|m| m.into_iter().collect())
			.unwrap_or_default(),
		session_affinity: row.session_affinity,
		sticky_session: row.sticky_session,
		max_retries: row.max_retries.max(0) as u32,
		retry_timeout_ms: row.retry_timeout_ms.max(0) as u64,
		circuit_breaker_enabled: row.circuit_breaker_enabled,
		health_check,
		nodes: nodes.into_iter().map(node).collect(),
		round_robin_cursor: Default::default(),
	}
}

pub fn node(row: ServiceNodeRow) -> NodeConfig {
	NodeConfig {
		id: row.id.into(),
		url: row.url.into(),
		host: row.host.into(),
		port: row.port as u16,
		protocol: row.protocol.into(),
		weight: row.weight.max(0) as u32,
		healthy: row.healthy,
		enabled: row.enabled,
		metadata: row
			.node_metadata
			.and_then(|v| v.as_object().cloned())
			.map(|m| m.into_iter().filter_map(|(k, v)| Some((k, v.as_str()?.to_string()))).collect())
			.unwrap_or_default(),
		last_beat_time: row.last_beat_time,
		ephemeral: row.ephemeral,
		instance_status: if row.instance_status.eq_ignore_ascii_case("down") {
			InstanceStatus::Down
		} else {
			InstanceStatus::Up
		},
		in_flight: Default::default(),
	}
}

pub fn proxy(row: ProxyConfigRow, services: Vec<ServiceConfig>) -> ProxyConfig {
	let proxy_type = match row.proxy_type.to_uppercase().as_str() {
		"TCP" => ProxyType::Tcp,
		"UDP" => ProxyType::Udp,
		"WEBSOCKET" => ProxyType::WebSocket,
		_ => ProxyType::Http,
	};
	ProxyConfig {
		proxy_type,
		config: row
			.proxy_config
			.and_then(|v| v.as_object().cloned())
			.map(|m| m.into_iter().collect())
			.unwrap_or_default(),
		services,
	}
}

pub fn log_config(row: LogConfigRow) -> Result<LogConfig, StoreError> {
	let log_format = match row.log_format.to_uppercase().as_str() {
		"TEXT" => LogFormat::Text,
		"CSV" => LogFormat::Csv,
		_ => LogFormat::Json,
	};
	let output_target = match row.output_target.to_uppercase().as_str() {
		"FILE" => OutputTarget::File,
		"DATABASE" => OutputTarget::Database,
		"MONGODB" => OutputTarget::Mongodb,
		"ELASTICSEARCH" => OutputTarget::Elasticsearch,
		"CLICKHOUSE" => OutputTarget::Clickhouse,
		_ => OutputTarget::Console,
	};
	let rotation_pattern = match row.rotation_pattern.to_uppercase().as_str() {
		"HOURLY" => RotationPattern::Hourly,
		"WEEKLY" => RotationPattern::Weekly,
		"SIZE_BASED" => RotationPattern::SizeBased,
		_ => RotationPattern::Daily,
	};
	let alert = row
		.ext_property
		.as_deref()
		.map(parse_alert_config)
		.transpose()?
		.unwrap_or_default();

	Ok(
		LogConfig {
			id: row.id.into(),
			log_format,
			record_request_body: row.record_request_body,
			record_response_body: row.record_response_body,
			record_headers: row.record_headers,
			max_body_size_bytes: row.max_body_size_bytes.max(0) as usize,
			output_target,
			sink_config: row
				.sink_config
				.and_then(|v| v.as_object().cloned())
				.map(|m| m.into_iter().collect())
				.unwrap_or_default(),
			enable_async_logging: row.enable_async_logging,
			async_queue_size: row.async_queue_size.max(0) as usize,
			async_flush_interval_ms: row.async_flush_interval_ms.max(0) as u64,
			enable_batch_processing: row.enable_batch_processing,
			batch_size: row.batch_size.max(0) as usize,
			batch_timeout_ms: row.batch_timeout_ms.max(0) as u64,
			log_retention_days: row.log_retention_days.max(0) as u32,
			enable_file_rotation: row.enable_file_rotation,
			max_file_size_mb: row.max_file_size_mb.max(0) as u64,
			max_file_count: row.max_file_count.max(0) as u32,
			rotation_pattern,
			enable_sensitive_data_masking: row.enable_sensitive_data_masking,
			sensitive_fields: row.sensitive_fields.as_deref().map(parse_array).unwrap_or_default(),
			masking_pattern: row.masking_pattern.unwrap_or_default(),
			buffer_size: row.buffer_size.max(0) as usize,
			flush_threshold: row.flush_threshold.max(0) as usize,
			alert,
		}
		.with_defaults(),
	)
}

fn parse_alert_config(raw: &str) -> Result<gateway_core::model::AlertConfig, StoreError> {
	if raw.trim().is_empty() {
		return Ok(Default::default());
	}
	serde_json::from_str(raw).map_err(|source| StoreError::MalformedJson {
		column: "ext_property".into(),
		source,
	})
}
