use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Timelike, Utc};
use gateway_core::model::{AccessLog, BackendTraceLog, LogConfig, RotationPattern};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::LogError;
use crate::sinks::LogSink;

/// Rotated/retained access-log file sink.
///
/// `tracing_appender::rolling` only knows `MINUTELY/HOURLY/DAILY/NEVER`; this
/// sink rolls its own bucket computation so `WEEKLY` and `SIZE_BASED` are
/// also supported, and owns retention (`maxFileCount`/`logRetentionDays`).
pub struct FileSink {
	dir: PathBuf,
	prefix: String,
	pattern: RotationPattern,
	max_file_size_mb: u64,
	max_file_count: u32,
	retention_days: u32,
	buffer_size: usize,
	inner: Mutex<State>,
}

struct State {
	file: Option<File>,
	bucket: String,
	bytes_written: u64,
}

impl FileSink {
	pub fn new(config: &LogConfig) -> Result<Self, LogError> {
		let dir = config
			.sink_config
			.get("directory")
			.and_then(|v| v.as_str())
			.unwrap_or("logs/access")
			.to_string();
		let prefix = config
			.sink_config
			.get("filePrefix")
			.and_then(|v| v.as_str())
			.unwrap_or("access")
			.to_string();
		Ok(Self {
			dir: PathBuf::from(dir),
			prefix,
			pattern: config.rotation_pattern,
			max_file_size_mb: config.max_file_size_mb,
			max_file_count: config.max_file_count,
			retention_days: config.log_retention_days,
			buffer_size: config.buffer_size.max(4096),
			inner: Mutex::new(State { file: None, bucket: String::new(), bytes_written: 0 }),
		})
	}

	fn bucket_for(&self, now: DateTime<Utc>) -> String {
		match self.pattern {
			RotationPattern::Hourly => now.format("%Y%m%d-%H").to_string(),
			RotationPattern::Daily => now.format("%Y%m%d").to_string(),
			RotationPattern::Weekly => format!("{}-W{:02}", now.year(), now.iso_week().week()),
			RotationPattern::SizeBased => "current".to_string(),
		}
	}

	async fn ensure_file(&self, state: &mut State) -> Result<(), LogError> {
		let now = Utc::now();
		let bucket = self.bucket_for(now);
		let size_rollover = self.pattern == RotationPattern::SizeBased && self.max_file_size_mb > 0 && state.bytes_written >= self.max_file_size_mb * 1024 * 1024;
		if state.file.is_some() && state.bucket == bucket && !size_rollover {
			return Ok(());
		}
		fs::create_dir_all(&self.dir).await?;
		let suffix = if self.pattern == RotationPattern::SizeBased {
			format!("{}", now.timestamp_millis())
		} else {
			bucket.clone()
		};
		let path = self.dir.join(format!("{}.{}.log", self.prefix, suffix));
		let file = OpenOptions::new().create(true).append(true).open(&path).await?;
		state.file = Some(file);
		state.bucket = bucket;
		state.bytes_written = 0;
		self.enforce_retention().await?;
		Ok(())
	}

	async fn enforce_retention(&self) -> Result<(), LogError> {
		let mut entries = match fs::read_dir(&self.dir).await {
			Ok(e) => e,
			Err(_) => return Ok(()),
		};
		let mut files = Vec::new();
		while let Some(entry) = entries.next_entry().await? {
			if let Ok(meta) = entry.metadata().await {
				files.push((entry.path(), meta.modified().ok()));
			}
		}
		files.sort_by_key(|(_, modified)| *modified);
		let retention_cutoff = Utc::now() - chrono::Duration::days(self.retention_days as i64);
		while files.len() > self.max_file_count.max(1) as usize {
			let (path, _) = files.remove(0);
			let _ = fs::remove_file(path).await;
		}
		for (path, modified) in &files {
			if let Some(modified) = modified {
				let modified: DateTime<Utc> = (*modified).into();
				if modified < retention_cutoff {
					let _ = fs::remove_file(path).await;
				}
			}
		}
		Ok(())
	}

	async fn write_line(&self, line: &str) -> Result<(), LogError> {
		let mut state = self.inner.lock().await;
		self.ensure_file(&mut state).await?;
		let bytes = format!("{line}\n");
		state.bytes_written += bytes.len() as u64;
		if let Some(file) = state.file.as_mut() {
			file.write_all(bytes.as_bytes()).await?;
			if bytes.len() >= self.buffer_size {
				file.flush().await?;
			}
		}
		Ok(())
	}
}

#[async_trait]
impl LogSink for FileSink {
	async fn write_access_batch(&self, logs: &[AccessLog]) -> Result<(), LogError> {
		for log in logs {
			let line = serde_json::to_string(log).map_err(|e| LogError::Sink(e.to_string()))?;
			self.write_line(&line).await?;
		}
		Ok(())
	}

	async fn write_trace_batch(&self, traces: &[BackendTraceLog]) -> Result<(), LogError> {
		for trace in traces {
			let line = serde_json::to_string(trace).map_err(|e| LogError::Sink(e.to_string()))?;
			self.write_line(&line).await?;
		}
		Ok(())
	}

	async fn flush(&self) -> Result<(), LogError> {
		let mut state = self.inner.lock().await;
		if let Some(file) = state.file.as_mut() {
			file.flush().await?;
		}
		Ok(())
	}

	async fn close(&self) -> Result<(), LogError> {
		self.flush().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	fn config(pattern: RotationPattern) -> LogConfig {
		LogConfig {
			id: "lc1".into(),
			log_format: gateway_core::model::LogFormat::Json,
			record_request_body: false,
			record_response_body: false,
			record_headers: false,
			max_body_size_bytes: 0,
			output_target: gateway_core::model::OutputTarget::File,
			sink_config: HashMap::new(),
			enable_async_logging: false,
			async_queue_size: 1000,
			async_flush_interval_ms: 1000,
			enable_batch_processing: false,
			batch_size: 10,
			batch_timeout_ms: 1000,
			log_retention_days: 30,
			enable_file_rotation: true,
			max_file_size_mb: 1,
			max_file_count: 5,
			rotation_pattern: pattern,
			enable_sensitive_data_masking: false,
			sensitive_fields: vec![],
			masking_pattern: "***".into(),
			buffer_size: 4096,
			flush_threshold: 100,
			alert: gateway_core::model::AlertConfig::default(),
		}
	}

	#[tokio::test]
	async fn writes_and_flushes_without_error() {
		let dir = std::env::temp_dir().join(format!("gateway-log-test-{}", std::process::id()));
		let mut cfg = config(RotationPattern::Daily);
		cfg.sink_config.insert("directory".into(), serde_json::json!(dir.to_string_lossy()));
		let sink = FileSink::new(&cfg).unwrap();
		let log = AccessLog::default();
		sink.write_access_batch(&[log]).await.unwrap();
		sink.flush().await.unwrap();
		let _ = fs::remove_dir_all(&dir).await;
	}
}
