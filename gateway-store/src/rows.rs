//! Row shapes for the tables enumerated in Every table carries
//! `active_flag`/`current_version`; tenant scoping and row-priority
//! selection happen in the SQL issued by [`crate::loader`], not here.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, FromRow)]
pub struct InstanceRow {
	pub id: String,
	pub tenant_id: String,
	pub bind_address: String,
	pub http_port: Option<i32>,
	pub https_port: Option<i32>,
	pub tls_enabled: bool,
	pub cert_file_path: Option<String>,
	pub key_file_path: Option<String>,
	pub cert_content: Option<String>,
	pub key_content: Option<String>,
	pub key_password: Option<String>,
	pub read_timeout_ms: i64,
	pub write_timeout_ms: i64,
	pub idle_timeout_ms: i64,
	pub graceful_shutdown_timeout_ms: i64,
	pub max_connections: i32,
	pub max_workers: i32,
	pub keep_alive: bool,
	pub cipher_policy: Option<String>,
	pub tls_version_policy: Option<String>,
	pub log_config_id: Option<String>,
}

#[derive(Debug, FromRow)]
pub struct RouterConfigRow {
	pub default_priority: i32,
	pub route_cache_enabled: bool,
	pub route_cache_ttl_seconds: i64,
	pub case_sensitive: bool,
	pub remove_trailing_slash: bool,
	pub global_filter_enabled: bool,
	pub fallback_route: Option<String>,
	pub not_found_status_code: i32,
	pub not_found_message: String,
}

#[derive(Debug, FromRow)]
pub struct RouteRow {
	pub id: String,
	pub path: String,
	pub match_type: i32,
	pub allowed_methods: Option<String>,
	pub allowed_hosts: Option<String>,
	pub priority: i32,
	pub strip_prefix: bool,
	pub rewrite_path: Option<String>,
	pub enable_websocket: bool,
	pub timeout_ms: i64,
	pub retry_count: i32,
	pub retry_interval_ms: i64,
	pub service_definition_id: String,
	pub log_config_id: Option<String>,
	pub route_metadata: Option<serde_json::Value>,
}

#[derive(Debug, FromRow)]
pub struct RouteAssertionRow {
	pub route_config_id: String,
	pub assertion_type: String,
	pub operator: String,
	pub field_name: Option<String>,
	pub expected_value: Option<String>,
	pub pattern_value: Option<String>,
	pub case_sensitive: bool,
	pub assertion_order: i32,
	pub is_required: bool,
}

#[derive(Debug, FromRow)]
pub struct FilterConfigRow {
	pub filter_type: String,
	pub enabled: bool,
	pub action: String,
	pub filter_order: i32,
	pub run_always: bool,
	pub filter_config: Option<serde_json::Value>,
}

#[derive(Debug, FromRow)]
pub struct ProxyConfigRow {
	pub id: String,
	pub proxy_type: String,
	pub proxy_config: Option<serde_json::Value>,
}

#[derive(Debug, FromRow)]
pub struct ServiceDefinitionRow {
	pub id: String,
	pub name: String,
	pub proxy_config_id: String,
	pub load_balance_strategy: String,
	pub discovery_type: String,
	pub discovery_config: Option<serde_json::Value>,
	pub session_affinity: bool,
	pub sticky_session: bool,
	pub max_retries: i32,
	pub retry_timeout_ms: i64,
	pub circuit_breaker_enabled: bool,
	pub health_check_enabled: bool,
	pub health_check_path: Option<String>,
	pub health_check_method: Option<String>,
	pub health_check_interval_seconds: Option<i64>,
	pub health_check_timeout_ms: Option<i64>,
	pub healthy_threshold: Option<i32>,
	pub unhealthy_threshold: Option<i32>,
	pub expected_status_codes: Option<String>,
	pub health_check_headers: Option<serde_json::Value>,
}

#[derive(Debug, FromRow)]
pub struct ServiceNodeRow {
	pub id: String,
	pub service_definition_id: String,
	pub url: String,
	pub host: String,
	pub port: i32,
	pub protocol: String,
	pub weight: i32,
	pub healthy: bool,
	pub enabled: bool,
	pub node_metadata: Option<serde_json::Value>,
	pub last_beat_time: DateTime<Utc>,
	pub ephemeral: bool,
	pub instance_status: String,
}

#[derive(Debug, FromRow)]
pub struct AuthConfigRow {
	pub strategy: String,
	pub auth_strategy: String,
	pub excluded_paths: Option<String>,
	pub auth_config: Option<serde_json::Value>,
	pub failure_status_code: i32,
	pub failure_message: String,
}

#[derive(Debug, FromRow)]
pub struct CorsConfigRow {
	pub allow_origins: Option<String>,
	pub allow_methods: Option<String>,
	pub allow_headers: Option<String>,
	pub expose_headers: Option<String>,
	pub allow_credentials: bool,
	pub max_age: i64,
}

#[derive(Debug, FromRow)]
pub struct RateLimitConfigRow {
	pub algorithm: String,
	pub rate: f64,
	pub burst: i64,
	pub time_window_seconds: i64,
	pub key_strategy: String,
	pub rejection_status_code: i32,
	pub rejection_message: String,
	pub custom_config: Option<serde_json::Value>,
}

#[derive(Debug, FromRow)]
pub struct IpAccessConfigRow {
	pub ip_access_config_id: i64,
	pub default_policy: String,
	pub whitelist_ips: Option<String>,
	pub blacklist_ips: Option<String>,
	pub whitelist_cidrs: Option<String>,
	pub blacklist_cidrs: Option<String>,
	pub trust_x_forwarded_for: bool,
	pub trust_x_real_ip: bool,
}

#[derive(Debug, FromRow)]
pub struct UaAccessConfigRow {
	pub default_policy: String,
	pub whitelist_patterns: Option<String>,
	pub blacklist_patterns: Option<String>,
	pub block_empty: bool,
}

#[derive(Debug, FromRow)]
pub struct ApiAccessConfigRow {
	pub default_policy: String,
	pub whitelist_paths: Option<String>,
	pub blacklist_paths: Option<String>,
	pub allowed_methods: Option<String>,
	pub blocked_methods: Option<String>,
}

#[derive(Debug, FromRow)]
pub struct DomainAccessConfigRow {
	pub default_policy: String,
	pub whitelist_domains: Option<String>,
	pub blacklist_domains: Option<String>,
	pub allow_subdomains: bool,
}

#[derive(Debug, FromRow)]
pub struct LogConfigRow {
	pub id: String,
	pub log_format: String,
	pub record_request_body: bool,
	pub record_response_body: bool,
	pub record_headers: bool,
	pub max_body_size_bytes: i64,
	pub output_target: String,
	pub sink_config: Option<serde_json::Value>,
	pub enable_async_logging: bool,
	pub async_queue_size: i64,
	pub async_flush_interval_ms: i64,
	pub enable_batch_processing: bool,
	pub batch_size: i64,
	pub batch_timeout_ms: i64,
	pub log_retention_days: i32,
	pub enable_file_rotation: bool,
	pub max_file_size_mb: i64,
	pub max_file_count: i32,
	pub rotation_pattern: String,
	pub enable_sensitive_data_masking: bool,
	pub sensitive_fields: Option<String>,
	pub masking_pattern: Option<String>,
	pub buffer_size: i64,
	pub flush_threshold: i64,
	pub ext_property: Option<String>,
}
