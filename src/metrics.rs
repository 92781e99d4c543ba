//! Prometheus metrics surface: a `Deferred`/`DeferRecorder`/`Recorder`/
//! `IncrementRecorder` pattern for recording outcomes on drop, plus a
//! `/metrics` axum handler serving the registry as text.

use std::mem;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;
use tracing::error;

pub fn sub_registry(registry: &mut Registry) -> &mut Registry {
	registry.sub_registry_with_prefix("gateway")
}

pub struct Deferred<'a, F, T>
where
	F: FnOnce(&'a T),
	T: ?Sized,
{
	param: &'a T,
	deferred_fn: Option<F>,
}

impl<'a, F, T> Deferred<'a, F, T>
where
	F: FnOnce(&'a T),
	T: ?Sized,
{
	pub fn new(param: &'a T, deferred_fn: F) -> Self {
		Self { param, deferred_fn: Some(deferred_fn) }
	}
}

impl<'a, F, T> Drop for Deferred<'a, F, T>
where
	F: FnOnce(&'a T),
	T: ?Sized,
{
	fn drop(&mut self) {
		if let Some(deferred_fn) = mem::take(&mut self.deferred_fn) {
			(deferred_fn)(self.param);
		} else {
			error!("defer deferred record failed, event is gone");
		}
	}
}

pub trait DeferRecorder {
	#[must_use = "metric will be dropped (and thus recorded) immediately if not assigned"]
	fn defer_record<'a, F>(&'a self, record: F) -> Deferred<'a, F, Self>
	where
		F: FnOnce(&'a Self),
	{
		Deferred::new(self, record)
	}
}

pub trait Recorder<E, T> {
	fn record(&self, event: &E, meta: T);
}

pub trait IncrementRecorder<E>: Recorder<E, u64> {
	fn increment(&self, event: &E);
}

impl<E, R> IncrementRecorder<E> for R
where
	R: Recorder<E, u64>,
{
	fn increment(&self, event: &E) {
		self.record(event, 1);
	}
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
	pub tenant_id: String,
	pub instance_id: String,
	pub status_class: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
	pub tenant_id: String,
	pub instance_id: String,
	pub error_code: String,
}

/// Per-process gateway counters, registered under the `gateway` sub-registry.
pub struct GatewayMetrics {
	pub requests_total: Family<RequestLabels, Counter>,
	pub errors_total: Family<ErrorLabels, Counter>,
	pub dropped_logs_total: Counter,
}

impl GatewayMetrics {
	pub fn new(registry: &mut Registry) -> Self {
		let sub = sub_registry(registry);
		let requests_total = Family::default();
		sub.register("requests", "Total requests processed by the gateway", requests_total.clone());
		let errors_total = Family::default();
		sub.register("errors", "Total request-pipeline errors by code", errors_total.clone());
		let dropped_logs_total = Counter::default();
		sub.register("dropped_log_records", "Access log records dropped due to a full async buffer", dropped_logs_total.clone());
		Self { requests_total, errors_total, dropped_logs_total }
	}
}

#[derive(Clone, Default)]
pub struct App {
	registry: Arc<Registry>,
}

impl App {
	pub fn new(registry: Arc<Registry>) -> Self {
		Self { registry }
	}

	pub fn router(&self) -> Router {
		Router::new().route("/metrics", get(metrics_handler)).with_state(self.clone())
	}
}

async fn metrics_handler(State(app): State<App>) -> Result<String, StatusCode> {
	let mut buffer = String::new();
	encode(&mut buffer, &app.registry).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
	Ok(buffer)
}
