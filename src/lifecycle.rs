//! `Start`/`Stop`/`Reload` for one gateway instance: loads
//! the initial snapshot, binds the listener, and spawns the health-heartbeat
//! and config-reload background tasks alongside it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gateway_core::model::HealthStatus;
use gateway_log::LogWriterRegistry;
use gateway_proxy::pipeline::InstanceRuntime;
use gateway_store::ConfigLoader;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::metrics::GatewayMetrics;
use crate::server::Listener;
use crate::tls;

const HEALTH_REPORT_INTERVAL: Duration = Duration::from_secs(5);
const HEALTH_REPORT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(thiserror::Error, Debug)]
pub enum LifecycleError {
	#[error(transparent)]
	Store(#[from] gateway_store::StoreError),
	#[error(transparent)]
	Tls(#[from] tls::TlsSetupError),
	#[error(transparent)]
	Log(#[from] gateway_log::LogError),
}

/// A running instance's shutdown handle. `Drop` does not stop the instance —
/// call [`stop`](InstanceHandle::stop) explicitly so the graceful-shutdown
/// timeout from `GatewayInstance.gracefulShutdownTimeoutMs` is honored.
pub struct InstanceHandle {
	pub tenant_id: String,
	pub instance_id: String,
	shutdown: CancellationToken,
	graceful_timeout: Duration,
}

impl InstanceHandle {
	pub async fn stop(&self) {
		tracing::info!(tenant_id = %self.tenant_id, instance_id = %self.instance_id, "draining instance");
		self.shutdown.cancel();
		tokio::time::sleep(self.graceful_timeout).await;
	}
}

#[allow(clippy::too_many_arguments)]
pub async fn start(
	pool: PgPool,
	loader: Arc<ConfigLoader>,
	log_writers: Arc<LogWriterRegistry>,
	metrics: Arc<GatewayMetrics>,
	tenant_id: String,
	instance_id: String,
	reload_interval: Duration,
) -> Result<InstanceHandle, LifecycleError> {
	let config = loader.load(&tenant_id, &instance_id).await?;
	let listen_address = config.instance.listen_address();
	let graceful_timeout = Duration::from_millis(config.instance.graceful_shutdown_timeout_ms.max(1));

	let tls_acceptor = match &config.instance.tls {
		Some(material) => Some(tls::build_acceptor(material).await?),
		None => None,
	};

	let writer = log_writers.get_or_create(&instance_id, &config.log_config)?;
	let runtime = Arc::new(InstanceRuntime::new(config));
	let shutdown = CancellationToken::new();

	let listener = Arc::new(Listener {
		runtime: runtime.clone(),
		log_writers: log_writers.clone(),
		metrics: metrics.clone(),
		tenant_id: tenant_id.clone(),
		instance_id: instance_id.clone(),
		tls_acceptor,
	});
	{
		let addr = listen_address.clone();
		let listen_shutdown = shutdown.clone();
		tokio::spawn(async move {
			if let Err(e) = listener.serve(addr, listen_shutdown).await {
				tracing::error!(error = %e, "listener exited with error");
			}
		});
	}

	spawn_health_loop(pool.clone(), tenant_id.clone(), instance_id.clone(), shutdown.clone());
	spawn_dropped_log_sampler(log_writers.clone(), instance_id.clone(), metrics.clone(), writer, shutdown.clone());
	spawn_reload_loop(loader, log_writers, runtime, tenant_id.clone(), instance_id.clone(), reload_interval, shutdown.clone());

	Ok(InstanceHandle { tenant_id, instance_id, shutdown, graceful_timeout })
}

fn spawn_health_loop(pool: PgPool, tenant_id: String, instance_id: String, shutdown: CancellationToken) {
	tokio::spawn(async move {
		let mut ticker = tokio::time::interval(HEALTH_REPORT_INTERVAL);
		loop {
			tokio::select! {
				_ = ticker.tick() => {
					let report = gateway_store::health::report_health(&pool, &tenant_id, &instance_id, HealthStatus::Healthy, None);
					match tokio::time::timeout(HEALTH_REPORT_TIMEOUT, report).await {
						Ok(Ok(())) => {},
						Ok(Err(e)) => tracing::warn!(error = %e, tenant_id = %tenant_id, instance_id = %instance_id, "health report failed"),
						Err(_) => tracing::warn!(tenant_id = %tenant_id, instance_id = %instance_id, "health report timed out"),
					}
				},
				_ = shutdown.cancelled() => return,
			}
		}
	});
}

/// Samples the writer's cumulative drop counter into the process-wide
/// `dropped_log_records` gauge; the writer itself only tracks a running
/// total ("async writer channel send" drop-with-warning path).
fn spawn_dropped_log_sampler(
	log_writers: Arc<LogWriterRegistry>,
	instance_id: String,
	metrics: Arc<GatewayMetrics>,
	initial_writer: Arc<gateway_log::LogWriter>,
	shutdown: CancellationToken,
) {
	tokio::spawn(async move {
		let last_seen = AtomicU64::new(0);
		let mut current = initial_writer;
		let mut ticker = tokio::time::interval(HEALTH_REPORT_INTERVAL);
		loop {
			tokio::select! {
				_ = ticker.tick() => {
					if let Ok(fresh) = log_writers.get_or_create(&instance_id, current.get_log_config()) {
						current = fresh;
					}
					let total = current.dropped_count();
					let prev = last_seen.swap(total, Ordering::Relaxed);
					if total > prev {
						metrics.dropped_logs_total.inc_by(total - prev);
					}
				},
				_ = shutdown.cancelled() => return,
			}
		}
	});
}

#[allow(clippy::too_many_arguments)]
fn spawn_reload_loop(
	loader: Arc<ConfigLoader>,
	log_writers: Arc<LogWriterRegistry>,
	runtime: Arc<InstanceRuntime>,
	tenant_id: String,
	instance_id: String,
	reload_interval: Duration,
	shutdown: CancellationToken,
) {
	tokio::spawn(async move {
		let mut ticker = tokio::time::interval(reload_interval);
		ticker.tick().await;
		loop {
			tokio::select! {
				_ = ticker.tick() => {
					match loader.load(&tenant_id, &instance_id).await {
						Ok(fresh) => {
							if let Err(e) = log_writers.reload(&instance_id, &fresh.log_config).await {
								tracing::warn!(error = %e, tenant_id = %tenant_id, instance_id = %instance_id, "failed to reload log writer");
							}
							runtime.reload(fresh);
							tracing::info!(tenant_id = %tenant_id, instance_id = %instance_id, "config reloaded");
						},
						// Config-load errors are fatal for this reload attempt only;
						// the previous snapshot keeps serving.
						Err(e) => tracing::warn!(error = %e, tenant_id = %tenant_id, instance_id = %instance_id, "reload fetch failed, keeping previous snapshot"),
					}
				},
				_ = shutdown.cancelled() => return,
			}
		}
	});
}
