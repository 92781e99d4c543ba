use async_trait::async_trait;
use clickhouse::{Client, Row};
use gateway_core::model::{AccessLog, BackendTraceLog, LogConfig};
use serde::Serialize;

use crate::error::LogError;
use crate::sinks::LogSink;

pub struct ClickhouseSink {
	client: Client,
	access_table: String,
	trace_table: String,
}

#[derive(Row, Serialize)]
struct AccessLogRow<'a> {
	tenant_id: &'a str,
	trace_id: &'a str,
	gateway_instance_id: &'a str,
	client_ip: &'a str,
	request_method: &'a str,
	request_path: &'a str,
	response_status: u16,
	backend_status_code: u16,
	total_processing_ms: u64,
}

#[derive(Row, Serialize)]
struct TraceLogRow<'a> {
	tenant_id: &'a str,
	trace_id: &'a str,
	backend_trace_id: &'a str,
	service_id: &'a str,
	forward_url: &'a str,
	response_status: u16,
	success: bool,
}

impl ClickhouseSink {
	pub fn new(config: &LogConfig) -> Result<Self, LogError> {
		let url = config
			.sink_config
			.get("url")
			.and_then(|v| v.as_str())
			.ok_or_else(|| LogError::InvalidConfig("clickhouse sink requires sinkConfig.url".to_string()))?;
		let database = config.sink_config.get("database").and_then(|v| v.as_str()).unwrap_or("default");
		let access_table = config.sink_config.get("accessTable").and_then(|v| v.as_str()).unwrap_or("gateway_access_log").to_string();
		let trace_table = config.sink_config.get("traceTable").and_then(|v| v.as_str()).unwrap_or("gateway_backend_trace_log").to_string();
		let client = Client::default().with_url(url).with_database(database);
		Ok(Self { client, access_table, trace_table })
	}
}

#[async_trait]
impl LogSink for ClickhouseSink {
	async fn write_access_batch(&self, logs: &[AccessLog]) -> Result<(), LogError> {
		let mut insert = self.client.insert(&self.access_table).map_err(|e| LogError::Sink(e.to_string()))?;
		for log in logs {
			let row = AccessLogRow {
				tenant_id: &log.tenant_id,
				trace_id: &log.trace_id,
				gateway_instance_id: &log.gateway_instance_id,
				client_ip: &log.client_ip,
				request_method: &log.request_method,
				request_path: &log.request_path,
				response_status: log.response_status(),
				backend_status_code: log.backend_status_code,
				total_processing_ms: log.total_processing_ms,
			};
			insert.write(&row).await.map_err(|e| LogError::Sink(e.to_string()))?;
		}
		insert.end().await.map_err(|e| LogError::Sink(e.to_string()))
	}

	async fn write_trace_batch(&self, traces: &[BackendTraceLog]) -> Result<(), LogError> {
		let mut insert = self.client.insert(&self.trace_table).map_err(|e| LogError::Sink(e.to_string()))?;
		for trace in traces {
			let row = TraceLogRow {
				tenant_id: &trace.tenant_id,
				trace_id: &trace.trace_id,
				backend_trace_id: &trace.backend_trace_id,
				service_id: &trace.service_id,
				forward_url: &trace.forward_url,
				response_status: trace.response_status,
				success: trace.success,
			};
			insert.write(&row).await.map_err(|e| LogError::Sink(e.to_string()))?;
		}
		insert.end().await.map_err(|e| LogError::Sink(e.to_string()))
	}
}
