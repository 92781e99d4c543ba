mod clickhouse_sink;
mod console;
mod database;
mod elasticsearch;
mod file;

use async_trait::async_trait;
use gateway_core::model::{AccessLog, BackendTraceLog, LogConfig, OutputTarget};

use crate::error::LogError;

/// One backing store for an instance's [`crate::writer::LogWriter`]. Exactly
/// one sink is active per writer.
#[async_trait]
pub trait LogSink: Send + Sync {
	async fn write_access_batch(&self, logs: &[AccessLog]) -> Result<(), LogError>;
	async fn write_trace_batch(&self, traces: &[BackendTraceLog]) -> Result<(), LogError>;
	async fn flush(&self) -> Result<(), LogError> {
		Ok(())
	}
	async fn close(&self) -> Result<(), LogError> {
		Ok(())
	}
}

pub fn build_sink(config: &LogConfig) -> Result<Box<dyn LogSink>, LogError> {
	match config.output_target {
		OutputTarget::Console => Ok(Box::new(console::ConsoleSink::new(config))),
		OutputTarget::File => Ok(Box::new(file::FileSink::new(config)?)),
		OutputTarget::Database => Ok(Box::new(database::DatabaseSink::new(config)?)),
		// No MongoDB driver crate is part of this stack; unsupported targets
		// return NotImplemented rather than fabricating a dependency.
		OutputTarget::Mongodb => Err(LogError::NotImplemented(OutputTarget::Mongodb)),
		OutputTarget::Elasticsearch => Ok(Box::new(elasticsearch::ElasticsearchSink::new(config)?)),
		OutputTarget::Clickhouse => Ok(Box::new(clickhouse_sink::ClickhouseSink::new(config)?)),
	}
}
