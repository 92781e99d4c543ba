use arcstr::ArcStr;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogFormat {
	Json,
	Text,
	Csv,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutputTarget {
	Console,
	File,
	Database,
	Mongodb,
	Elasticsearch,
	Clickhouse,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RotationPattern {
	Hourly,
	Daily,
	Weekly,
	SizeBased,
}

/// Parsed once at build from `LogConfig.extProperty`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertConfig {
	pub enabled: bool,
	pub channel_name: Option<String>,
	pub status_codes: Vec<u16>,
	pub alert_on_timeout: bool,
	pub timeout_threshold_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
	pub id: ArcStr,
	pub log_format: LogFormat,
	pub record_request_body: bool,
	pub record_response_body: bool,
	pub record_headers: bool,
	/// `0` = unlimited.
	pub max_body_size_bytes: usize,
	pub output_target: OutputTarget,
	pub sink_config: HashMap<String, serde_json::Value>,
	pub enable_async_logging: bool,
	pub async_queue_size: usize,
	pub async_flush_interval_ms: u64,
	pub enable_batch_processing: bool,
	pub batch_size: usize,
	pub batch_timeout_ms: u64,
	pub log_retention_days: u32,
	pub enable_file_rotation: bool,
	pub max_file_size_mb: u64,
	pub max_file_count: u32,
	pub rotation_pattern: RotationPattern,
	pub enable_sensitive_data_masking: bool,
	pub sensitive_fields: Vec<String>,
	pub masking_pattern: String,
	pub buffer_size: usize,
	pub flush_threshold: usize,
	pub alert: AlertConfig,
}

impl LogConfig {
	/// Applies documented defaults for fields missing from the stored row
	/// (step 9, `SetDefaults`).
	pub fn with_defaults(mut self) -> Self {
		if self.sensitive_fields.is_empty() {
			self.sensitive_fields = vec![
				"password".into(),
				"token".into(),
				"auth".into(),
				"secret".into(),
				"key".into(),
				"credential".into(),
			];
		}
		if self.masking_pattern.is_empty() {
			self.masking_pattern = "***".into();
		}
		self.async_queue_size = self.async_queue_size.clamp(100, 1_000_000);
		self.batch_size = self.batch_size.clamp(1, 10_000);
		self.log_retention_days = self.log_retention_days.clamp(1, 3650);
		self
	}
}

/// Classification bucket used by sink-side aggregations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
	Success,
	Redirect,
	ClientError,
	ServerError,
	Unknown,
}

impl StatusClass {
	pub fn of(status: u16) -> Self {
		match status {
			200..=299 => StatusClass::Success,
			300..=399 => StatusClass::Redirect,
			400..=499 => StatusClass::ClientError,
			500..=599 => StatusClass::ServerError,
			_ => StatusClass::Unknown,
		}
	}
}

/// One per request; every field is populated from the pre-return snapshot
/// ("Snapshot at response close" / §9), never from a live
/// request/response object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessLog {
	pub tenant_id: String,
	pub trace_id: String,
	pub gateway_instance_id: String,
	pub node_ip: Option<String>,
	pub route_id: Option<String>,
	pub service_id: Option<String>,
	pub log_config_id: Option<String>,
	pub received_at: Option<chrono::DateTime<chrono::Utc>>,
	pub start_processing_at: Option<chrono::DateTime<chrono::Utc>>,
	pub finished_processing_at: Option<chrono::DateTime<chrono::Utc>>,
	pub response_sent_at: Option<chrono::DateTime<chrono::Utc>>,
	pub client_ip: String,
	pub client_port: Option<u16>,
	pub user_agent: Option<String>,
	pub referer: Option<String>,
	pub user_id: Option<String>,
	pub request_method: String,
	pub request_path: String,
	pub request_query: Option<String>,
	pub request_headers: Option<serde_json::Value>,
	pub request_body: Option<String>,
	pub request_size: usize,
	pub matched_route: Option<String>,
	/// `0` = not attempted.
	pub backend_status_code: u16,
	pub response_status: u16,
	pub response_size: usize,
	pub response_headers: Option<serde_json::Value>,
	pub response_body: Option<String>,
	pub error_code: Option<String>,
	pub error_message: Option<String>,
	pub instance_name: Option<String>,
	pub route_name: Option<String>,
	pub service_name: Option<String>,
	pub proxy_name: Option<String>,
	pub total_processing_ms: u64,
	pub gateway_processing_ms: u64,
	pub backend_processing_ms: u64,
	pub client_closed: bool,
}

impl Default for OutputTarget {
	fn default() -> Self {
		OutputTarget::Console
	}
}

impl AccessLog {
	pub fn response_status(&self) -> u16 {
		if self.response_status == 0 { 200 } else { self.response_status }
	}

	pub fn status_class(&self) -> StatusClass {
		StatusClass::of(self.response_status())
	}
}

/// One per forwarded backend attempt, joined by `trace_id`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendTraceLog {
	pub tenant_id: String,
	pub trace_id: String,
	pub backend_trace_id: String,
	pub service_id: String,
	pub service_name: String,
	pub forward_url: String,
	pub method: String,
	pub path: String,
	pub query: Option<String>,
	pub headers: Option<serde_json::Value>,
	pub body: Option<String>,
	pub request_size: usize,
	pub response_status: u16,
	pub response_size: usize,
	pub response_headers: Option<serde_json::Value>,
	pub response_body: Option<String>,
	pub start_time: chrono::DateTime<chrono::Utc>,
	pub end_time: chrono::DateTime<chrono::Utc>,
	pub error_code: Option<String>,
	pub error_message: Option<String>,
	pub success: bool,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_fill_sensitive_fields() {
		let cfg = sample_log_config().with_defaults();
		assert!(cfg.sensitive_fields.contains(&"password".to_string()));
		assert_eq!(cfg.masking_pattern, "***");
	}

	#[test]
	fn defaults_clamp_ranges() {
		let mut cfg = sample_log_config();
		cfg.async_queue_size = 1;
		cfg.batch_size = 0;
		cfg.log_retention_days = 0;
		let cfg = cfg.with_defaults();
		assert_eq!(cfg.async_queue_size, 100);
		assert_eq!(cfg.batch_size, 1);
		assert_eq!(cfg.log_retention_days, 1);
	}

	#[test]
	fn status_class_buckets() {
		assert_eq!(StatusClass::of(204), StatusClass::Success);
		assert_eq!(StatusClass::of(301), StatusClass::Redirect);
		assert_eq!(StatusClass::of(404), StatusClass::ClientError);
		assert_eq!(StatusClass::of(500), StatusClass::ServerError);
	}

	#[test]
	fn access_log_response_status_defaults_to_200() {
		let log = AccessLog::default();
		assert_eq!(log.response_status(), 200);
	}

	fn sample_log_config() -> LogConfig {
		LogConfig {
			id: "lc1".into(),
			log_format: LogFormat::Json,
			record_request_body: false,
			record_response_body: false,
			record_headers: false,
			max_body_size_bytes: 0,
			output_target: OutputTarget::Console,
			sink_config: HashMap::new(),
			enable_async_logging: false,
			async_queue_size: 1000,
			async_flush_interval_ms: 1000,
			enable_batch_processing: false,
			batch_size: 100,
			batch_timeout_ms: 1000,
			log_retention_days: 30,
			enable_file_rotation: false,
			max_file_size_mb: 100,
			max_file_count: 10,
			rotation_pattern: RotationPattern::Daily,
			enable_sensitive_data_masking: false,
			sensitive_fields: vec![],
			masking_pattern: String::new(),
			buffer_size: 1024,
			flush_threshold: 100,
			alert: AlertConfig::default(),
		}
	}
}
