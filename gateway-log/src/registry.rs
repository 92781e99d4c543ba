//! Per-instance `instanceId -> LogWriter` registry.

use std::sync::Arc;

use flurry::HashMap;
use gateway_core::model::LogConfig;

use crate::error::LogError;
use crate::writer::LogWriter;

#[derive(Default)]
pub struct LogWriterRegistry {
	writers: HashMap<String, Arc<LogWriter>>,
}

impl LogWriterRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the writer for `instance_id`, building one from `config` if
	/// this is the first time the instance is seen.
	pub fn get_or_create(&self, instance_id: &str, config: &LogConfig) -> Result<Arc<LogWriter>, LogError> {
		let guard = self.writers.guard();
		if let Some(writer) = self.writers.get(instance_id, &guard) {
			return Ok(writer.clone());
		}
		let writer = LogWriter::new(config.clone())?;
		match self.writers.try_insert(instance_id.to_string(), writer.clone(), &guard) {
			Ok(_) => Ok(writer),
			Err(occupied) => Ok(occupied.current.clone()),
		}
	}

	/// Swaps an instance's writer on config reload; the old writer is given
	/// a short grace period to drain before being dropped.
	pub async fn reload(&self, instance_id: &str, config: &LogConfig) -> Result<Arc<LogWriter>, LogError> {
		let new_writer = LogWriter::new(config.clone())?;
		let guard = self.writers.guard();
		let old = self.writers.insert(instance_id.to_string(), new_writer.clone(), &guard).cloned();
		if let Some(old_writer) = old {
			tokio::time::sleep(std::time::Duration::from_millis(100)).await;
			let _ = old_writer.close().await;
		}
		Ok(new_writer)
	}

	pub async fn remove(&self, instance_id: &str) {
		let guard = self.writers.guard();
		if let Some(writer) = self.writers.remove(instance_id, &guard) {
			let _ = writer.close().await;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap as StdHashMap;

	fn config() -> LogConfig {
		LogConfig {
			id: "lc1".into(),
			log_format: gateway_core::model::LogFormat::Json,
			record_request_body: false,
			record_response_body: false,
			record_headers: false,
			max_body_size_bytes: 0,
			output_target: gateway_core::model::OutputTarget::Console,
			sink_config: StdHashMap::new(),
			enable_async_logging: false,
			async_queue_size: 100,
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
		}
	}

	#[tokio::test]
	async fn get_or_create_returns_same_writer() {
		let registry = LogWriterRegistry::new();
		let a = registry.get_or_create("inst-1", &config()).unwrap();
		let b = registry.get_or_create("inst-1", &config()).unwrap();
		assert!(Arc::ptr_eq(&a, &b));
	}

	#[tokio::test]
	async fn reload_replaces_writer() {
		let registry = LogWriterRegistry::new();
		let a = registry.get_or_create("inst-1", &config()).unwrap();
		let b = registry.reload("inst-1", &config()).await.unwrap();
		assert!(!Arc::ptr_eq(&a, &b));
	}
}
