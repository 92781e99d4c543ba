use async_trait::async_trait;
use gateway_core::model::{AccessLog, BackendTraceLog, LogConfig};
use sqlx::PgPool;

use crate::error::LogError;
use crate::sinks::LogSink;

/// Batched inserts into `HUB_GW_ACCESS_LOG`.
pub struct DatabaseSink {
	pool: PgPool,
}

impl DatabaseSink {
	pub fn new(config: &LogConfig) -> Result<Self, LogError> {
		let dsn = config
			.sink_config
			.get("dsn")
			.and_then(|v| v.as_str())
			.ok_or_else(|| LogError::InvalidConfig("database sink requires sinkConfig.dsn".to_string()))?;
		let pool = PgPool::connect_lazy(dsn).map_err(|e| LogError::InvalidConfig(e.to_string()))?;
		Ok(Self { pool })
	}
}

#[async_trait]
impl LogSink for DatabaseSink {
	async fn write_access_batch(&self, logs: &[AccessLog]) -> Result<(), LogError> {
		let mut tx = self.pool.begin().await.map_err(|e| LogError::Sink(e.to_string()))?;
		for log in logs {
			sqlx::query(
				"INSERT INTO hub_gw_access_log \
				 (tenant_id, trace_id, gateway_instance_id, client_ip, request_method, request_path, \
				  request_query, response_status, backend_status_code, total_processing_ms, \
				  matched_route, service_id, error_code, error_message, received_at) \
				 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15)",
			)
			.bind(&log.tenant_id)
			.bind(&log.trace_id)
			.bind(&log.gateway_instance_id)
			.bind(&log.client_ip)
			.bind(&log.request_method)
			.bind(&log.request_path)
			.bind(&log.request_query)
			.bind(log.response_status() as i32)
			.bind(log.backend_status_code as i32)
			.bind(log.total_processing_ms as i64)
			.bind(&log.matched_route)
			.bind(&log.service_id)
			.bind(&log.error_code)
			.bind(&log.error_message)
			.bind(log.received_at)
			.execute(&mut *tx)
			.await
			.map_err(|e| LogError::Sink(e.to_string()))?;
		}
		tx.commit().await.map_err(|e| LogError::Sink(e.to_string()))?;
		Ok(())
	}

	async fn write_trace_batch(&self, traces: &[BackendTraceLog]) -> Result<(), LogError> {
		let mut tx = self.pool.begin().await.map_err(|e| LogError::Sink(e.to_string()))?;
		for trace in traces {
			sqlx::query(
				"INSERT INTO hub_gw_backend_trace_log \
				 (tenant_id, trace_id, backend_trace_id, service_id, service_name, forward_url, \
				  method, path, response_status, success, start_time, end_time) \
				 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)",
			)
			.bind(&trace.tenant_id)
			.bind(&trace.trace_id)
			.bind(&trace.backend_trace_id)
			.bind(&trace.service_id)
			.bind(&trace.service_name)
			.bind(&trace.forward_url)
			.bind(&trace.method)
			.bind(&trace.path)
			.bind(trace.response_status as i32)
			.bind(trace.success)
			.bind(trace.start_time)
			.bind(trace.end_time)
			.execute(&mut *tx)
			.await
			.map_err(|e| LogError::Sink(e.to_string()))?;
		}
		tx.commit().await.map_err(|e| LogError::Sink(e.to_string()))?;
		Ok(())
	}
}
