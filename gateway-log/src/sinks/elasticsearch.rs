use async_trait::async_trait;
use chrono::{Datelike, Utc};
use gateway_core::model::{AccessLog, BackendTraceLog, LogConfig};
use reqwest::Client;

use crate::error::LogError;
use crate::sinks::LogSink;

/// Bulk-API writer, indexing per day/week/month/year.
pub struct ElasticsearchSink {
	client: Client,
	base_url: String,
	index_prefix: String,
	index_rotation: IndexRotation,
}

#[derive(Clone, Copy)]
enum IndexRotation {
	Day,
	Week,
	Month,
	Year,
}

impl ElasticsearchSink {
	pub fn new(config: &LogConfig) -> Result<Self, LogError> {
		let base_url = config
			.sink_config
			.get("url")
			.and_then(|v| v.as_str())
			.ok_or_else(|| LogError::InvalidConfig("elasticsearch sink requires sinkConfig.url".to_string()))?
			.trim_end_matches('/')
			.to_string();
		let index_prefix = config.sink_config.get("indexPrefix").and_then(|v| v.as_str()).unwrap_or("gateway-access-log").to_string();
		let index_rotation = match config.sink_config.get("indexRotation").and_then(|v| v.as_str()).unwrap_or("day") {
			"week" => IndexRotation::Week,
			"month" => IndexRotation::Month,
			"year" => IndexRotation::Year,
			_ => IndexRotation::Day,
		};
		Ok(Self { client: Client::new(), base_url, index_prefix, index_rotation })
	}

	fn index_name(&self) -> String {
		let now = Utc::now();
		let suffix = match self.index_rotation {
			IndexRotation::Day => now.format("%Y.%m.%d").to_string(),
			IndexRotation::Week => format!("{}.w{:02}", now.year(), now.iso_week().week()),
			IndexRotation::Month => now.format("%Y.%m").to_string(),
			IndexRotation::Year => now.format("%Y").to_string(),
		};
		format!("{}-{}", self.index_prefix, suffix)
	}

	async fn bulk<T: serde::Serialize>(&self, docs: &[T]) -> Result<(), LogError> {
		if docs.is_empty() {
			return Ok(());
		}
		let index = self.index_name();
		let mut body = String::new();
		for doc in docs {
			body.push_str(&serde_json::json!({"index": {"_index": index}}).to_string());
			body.push('\n');
			body.push_str(&serde_json::to_string(doc).map_err(|e| LogError::Sink(e.to_string()))?);
			body.push('\n');
		}
		let response = self
			.client
			.post(format!("{}/_bulk", self.base_url))
			.header("Content-Type", "application/x-ndjson")
			.body(body)
			.send()
			.await
			.map_err(|e| LogError::Sink(e.to_string()))?;
		if !response.status().is_success() {
			return Err(LogError::Sink(format!("elasticsearch bulk returned {}", response.status())));
		}
		Ok(())
	}
}

#[async_trait]
impl LogSink for ElasticsearchSink {
	async fn write_access_batch(&self, logs: &[AccessLog]) -> Result<(), LogError> {
		self.bulk(logs).await
	}

	async fn write_trace_batch(&self, traces: &[BackendTraceLog]) -> Result<(), LogError> {
		self.bulk(traces).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	#[test]
	fn index_name_defaults_to_daily() {
		let mut sink_config = HashMap::new();
		sink_config.insert("url".to_string(), serde_json::json!("http://es.local:9200"));
		let config = gateway_core::model::LogConfig {
			id: "lc1".into(),
			log_format: gateway_core::model::LogFormat::Json,
			record_request_body: false,
			record_response_body: false,
			record_headers: false,
			max_body_size_bytes: 0,
			output_target: gateway_core::model::OutputTarget::Elasticsearch,
			sink_config,
			enable_async_logging: false,
			async_queue_size: 1000,
			async_flush_interval_ms: 1000,
			enable_batch_processing: false,
			batch_size: 10,
			batch_timeout_ms: 1000,
			log_retention_days: 30,
			enable_file_rotation: false,
			max_file_size_mb: 100,
			max_file_count: 10,
			rotation_pattern: gateway_core::model::RotationPattern::Daily,
			enable_sensitive_data_masking: false,
			sensitive_fields: vec![],
			masking_pattern: "***".into(),
			buffer_size: 1024,
			flush_threshold: 100,
			alert: gateway_core::model::AlertConfig::default(),
		};
		let sink = ElasticsearchSink::new(&config).unwrap();
		assert!(sink.index_name().starts_with("gateway-access-log-"));
	}
}
