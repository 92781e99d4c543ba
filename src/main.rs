use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use gateway::lifecycle;
use gateway::metrics::{App as MetricsApp, GatewayMetrics};
use gateway::settings::Settings;
use gateway_log::LogWriterRegistry;
use gateway_store::ConfigLoader;
use prometheus_client::registry::Registry;
use sqlx::postgres::PgPoolOptions;
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
	/// Path to the gateway settings file (YAML).
	#[arg(short, long, value_name = "file")]
	file: std::path::PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
		.with_writer(std::io::stderr)
		.with_ansi(false)
		.init();

	let args = Args::parse();
	let settings = Settings::load(&args.file).await?;

	let pool = PgPoolOptions::new().max_connections(settings.max_db_connections).connect(&settings.database_url).await?;

	let loader = Arc::new(ConfigLoader::new(pool.clone()));
	let log_writers = Arc::new(LogWriterRegistry::new());

	let mut registry = Registry::default();
	let metrics = Arc::new(GatewayMetrics::new(&mut registry));

	let mut instance_handles = Vec::new();
	for instance in &settings.instances {
		let handle = lifecycle::start(
			pool.clone(),
			loader.clone(),
			log_writers.clone(),
			metrics.clone(),
			instance.tenant_id.clone(),
			instance.instance_id.clone(),
			settings.reload_interval(),
		)
		.await?;
		tracing::info!(tenant_id = %handle.tenant_id, instance_id = %handle.instance_id, "instance started");
		instance_handles.push(handle);
	}

	let mut run_set = JoinSet::new();
	let metrics_listener = tokio::net::TcpListener::bind(settings.metrics_addr).await?;
	let metrics_app = MetricsApp::new(Arc::new(registry));
	let metrics_router = metrics_app.router();
	run_set.spawn(async move { axum::serve(metrics_listener, metrics_router).await.map_err(anyhow::Error::from) });

	tokio::select! {
		_ = tokio::signal::ctrl_c() => {
			tracing::info!("shutdown signal received");
		},
		Some(result) = run_set.join_next() => {
			result??;
		},
	}

	for handle in &instance_handles {
		handle.stop().await;
	}

	Ok(())
}
