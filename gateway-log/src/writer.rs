//! `LogWriter`: `Write`/`BatchWrite`, `WriteBackendTraceLog`,
//! `Flush`/`Close`/`GetLogConfig`, plus the async batching pipeline behind
//! it. State machine: `Created -> Running <-> Flushing -> Closed`.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gateway_core::model::{AccessLog, BackendTraceLog, LogConfig};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::alert;
use crate::error::LogError;
use crate::sinks::{build_sink, LogSink};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriterState {
	Created = 0,
	Running = 1,
	Flushing = 2,
	Closed = 3,
}

impl From<u8> for WriterState {
	fn from(v: u8) -> Self {
		match v {
			1 => WriterState::Running,
			2 => WriterState::Flushing,
			3 => WriterState::Closed,
			_ => WriterState::Created,
		}
	}
}

enum Record {
	Access(AccessLog),
	Trace(BackendTraceLog),
	FlushBarrier(oneshot::Sender<()>),
}

pub struct LogWriter {
	config: LogConfig,
	sink: Arc<dyn LogSink>,
	sender: Option<mpsc::Sender<Record>>,
	consumer: Mutex<Option<JoinHandle<()>>>,
	state: AtomicU8,
	dropped: AtomicU64,
}

impl LogWriter {
	pub fn new(config: LogConfig) -> Result<Arc<Self>, LogError> {
		let sink: Arc<dyn LogSink> = Arc::from(build_sink(&config)?);
		let (sender, consumer) = if config.enable_async_logging {
			let (tx, rx) = mpsc::channel(config.async_queue_size.max(1));
			(Some(tx), Some(rx))
		} else {
			(None, None)
		};

		let writer = Arc::new(Self {
			sink: sink.clone(),
			sender,
			consumer: Mutex::new(None),
			state: AtomicU8::new(WriterState::Created as u8),
			dropped: AtomicU64::new(0),
			config: config.clone(),
		});

		if let Some(rx) = consumer {
			let handle = tokio::spawn(consume(rx, sink, config));
			// Safe: no other task can observe `writer` before this returns.
			if let Ok(mut guard) = writer.consumer.try_lock() {
				*guard = Some(handle);
			}
		}
		writer.state.store(WriterState::Running as u8, Ordering::Release);
		Ok(writer)
	}

	pub fn get_log_config(&self) -> &LogConfig {
		&self.config
	}

	pub fn state(&self) -> WriterState {
		WriterState::from(self.state.load(Ordering::Acquire))
	}

	pub fn dropped_count(&self) -> u64 {
		self.dropped.load(Ordering::Relaxed)
	}

	pub async fn write(&self, log: AccessLog) -> Result<(), LogError> {
		self.write_record(Record::Access(log)).await
	}

	pub async fn batch_write(&self, logs: Vec<AccessLog>) -> Result<(), LogError> {
		if let Some(sender) = &self.sender {
			for log in logs {
				self.send_or_drop(sender, Record::Access(log));
			}
			Ok(())
		} else {
			let result = self.sink.write_access_batch(&logs).await;
			self.after_sync_write(&logs, &result);
			result
		}
	}

	pub async fn write_backend_trace(&self, trace: BackendTraceLog) -> Result<(), LogError> {
		self.write_record(Record::Trace(trace)).await
	}

	pub async fn batch_write_backend_trace(&self, traces: Vec<BackendTraceLog>) -> Result<(), LogError> {
		if let Some(sender) = &self.sender {
			for trace in traces {
				self.send_or_drop(sender, Record::Trace(trace));
			}
			Ok(())
		} else {
			self.sink.write_trace_batch(&traces).await
		}
	}

	async fn write_record(&self, record: Record) -> Result<(), LogError> {
		match &self.sender {
			Some(sender) => {
				self.send_or_drop(sender, record);
				Ok(())
			},
			None => match record {
				Record::Access(log) => {
					let result = self.sink.write_access_batch(std::slice::from_ref(&log)).await;
					self.after_sync_write(std::slice::from_ref(&log), &result);
					result
				},
				Record::Trace(trace) => self.sink.write_trace_batch(&[trace]).await,
				Record::FlushBarrier(ack) => {
					let _ = ack.send(());
					Ok(())
				},
			},
		}
	}

	fn after_sync_write(&self, logs: &[AccessLog], result: &Result<(), LogError>) {
		match result {
			Ok(()) => {
				for log in logs {
					alert::handle_log_write(&self.config.alert, log);
				}
			},
			Err(e) => {
				for log in logs {
					alert::handle_log_write_failure(&log.trace_id, &e.to_string());
				}
			},
		}
	}

	/// Non-blocking enqueue; on a full buffer the record is dropped with a
	/// counted warning rather than applying backpressure to the caller
	///.
	fn send_or_drop(&self, sender: &mpsc::Sender<Record>, record: Record) {
		if sender.try_send(record).is_err() {
			let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
			tracing::warn!(dropped, "log writer buffer full, dropping record");
		}
	}

	/// Posts a drain barrier and awaits completion, bounded by 30s.
	pub async fn flush(&self) -> Result<(), LogError> {
		self.state.store(WriterState::Flushing as u8, Ordering::Release);
		let result = if let Some(sender) = &self.sender {
			let (tx, rx) = oneshot::channel();
			if sender.send(Record::FlushBarrier(tx)).await.is_ok() {
				tokio::time::timeout(DRAIN_TIMEOUT, rx).await.map_err(|_| LogError::Sink("flush timed out".to_string()))?.ok();
			}
			self.sink.flush().await
		} else {
			self.sink.flush().await
		};
		self.state.store(WriterState::Running as u8, Ordering::Release);
		result
	}

	pub async fn close(&self) -> Result<(), LogError> {
		self.flush().await.ok();
		self.state.store(WriterState::Closed as u8, Ordering::Release);
		if let Some(handle) = self.consumer.lock().await.take() {
			handle.abort();
		}
		self.sink.close().await
	}
}

async fn consume(mut rx: mpsc::Receiver<Record>, sink: Arc<dyn LogSink>, config: LogConfig) {
	let mut access_batch: Vec<AccessLog> = Vec::new();
	let mut trace_batch: Vec<BackendTraceLog> = Vec::new();
	let mut batch_opened_at: Option<Instant> = None;
	let batch_size = if config.enable_batch_processing { config.batch_size.max(1) } else { 1 };
	let batch_timeout = Duration::from_millis(config.batch_timeout_ms.max(1));
	let mut flush_interval = tokio::time::interval(Duration::from_millis(config.async_flush_interval_ms.max(1)));

	loop {
		let deadline = batch_opened_at.map(|t| t + batch_timeout);
		tokio::select! {
			record = rx.recv() => {
				match record {
					Some(Record::Access(log)) => {
						if batch_opened_at.is_none() { batch_opened_at = Some(Instant::now()); }
						access_batch.push(log);
					},
					Some(Record::Trace(trace)) => {
						if batch_opened_at.is_none() { batch_opened_at = Some(Instant::now()); }
						trace_batch.push(trace);
					},
					Some(Record::FlushBarrier(ack)) => {
						drain(&sink, &mut access_batch, &mut trace_batch, &config).await;
						batch_opened_at = None;
						let _ = ack.send(());
						continue;
					},
					None => {
						drain(&sink, &mut access_batch, &mut trace_batch, &config).await;
						return;
					},
				}
				if access_batch.len() + trace_batch.len() >= batch_size {
					drain(&sink, &mut access_batch, &mut trace_batch, &config).await;
					batch_opened_at = None;
				}
			},
			_ = wait_until(deadline), if deadline.is_some() => {
				drain(&sink, &mut access_batch, &mut trace_batch, &config).await;
				batch_opened_at = None;
			},
			_ = flush_interval.tick() => {
				drain(&sink, &mut access_batch, &mut trace_batch, &config).await;
				batch_opened_at = None;
			},
		}
	}
}

async fn wait_until(deadline: Option<Instant>) {
	match deadline {
		Some(instant) => tokio::time::sleep_until(instant).await,
		None => std::future::pending().await,
	}
}

async fn drain(sink: &Arc<dyn LogSink>, access_batch: &mut Vec<AccessLog>, trace_batch: &mut Vec<BackendTraceLog>, config: &LogConfig) {
	if !access_batch.is_empty() {
		let logs = std::mem::take(access_batch);
		match sink.write_access_batch(&logs).await {
			Ok(()) => {
				for log in &logs {
					alert::handle_log_write(&config.alert, log);
				}
			},
			Err(e) => {
				for log in &logs {
					alert::handle_log_write_failure(&log.trace_id, &e.to_string());
				}
			},
		}
	}
	if !trace_batch.is_empty() {
		let traces = std::mem::take(trace_batch);
		if let Err(e) = sink.write_trace_batch(&traces).await {
			for trace in &traces {
				alert::handle_log_write_failure(&trace.trace_id, &e.to_string());
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	fn config() -> LogConfig {
		LogConfig {
			id: "lc1".into(),
			log_format: gateway_core::model::LogFormat::Json,
			record_request_body: false,
			record_response_body: false,
			record_headers: false,
			max_body_size_bytes: 0,
			output_target: gateway_core::model::OutputTarget::Console,
			sink_config: HashMap::new(),
			enable_async_logging: true,
			async_queue_size: 100,
			async_flush_interval_ms: 50,
			enable_batch_processing: true,
			batch_size: 2,
			batch_timeout_ms: 20,
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
	async fn write_then_flush_completes() {
		let writer = LogWriter::new(config()).unwrap();
		writer.write(AccessLog::default()).await.unwrap();
		writer.flush().await.unwrap();
		assert_eq!(writer.state(), WriterState::Running);
	}

	#[tokio::test]
	async fn close_transitions_to_closed() {
		let writer = LogWriter::new(config()).unwrap();
		writer.close().await.unwrap();
		assert_eq!(writer.state(), WriterState::Closed);
	}

	#[tokio::test]
	async fn sync_writer_writes_immediately() {
		let mut cfg = config();
		cfg.enable_async_logging = false;
		let writer = LogWriter::new(cfg).unwrap();
		writer.write(AccessLog::default()).await.unwrap();
	}
}
