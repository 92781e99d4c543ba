use std::net::IpAddr;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::Utc;
use gateway_core::model::{NodeConfig, Route, ServiceConfig};
use gateway_core::{model::BackendTraceLog, BackendTraceId, GatewayError, TraceId};
use http::{HeaderMap, HeaderValue, Method, Request, Response, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as LegacyClient;
use hyper_util::rt::TokioExecutor;

use crate::resolver::Resolver;

pub type ReqBody = Full<Bytes>;

/// Thin wrapper over a pooled `hyper` client for forwarding requests upstream.
#[derive(Clone)]
pub struct UpstreamClient {
	inner: LegacyClient<HttpConnector, ReqBody>,
}

impl Default for UpstreamClient {
	fn default() -> Self {
		Self::new()
	}
}

impl UpstreamClient {
	pub fn new() -> Self {
		let mut connector = HttpConnector::new();
		connector.set_nodelay(true);
		connector.enforce_http(false);
		Self { inner: LegacyClient::builder(TokioExecutor::new()).build(connector) }
	}
}

/// One forwarded upstream attempt's outcome: the response plus everything
/// needed for its [`BackendTraceLog`].
pub struct Attempt {
	pub response: Option<Response<hyper::body::Incoming>>,
	pub trace: BackendTraceLog,
	pub error: Option<GatewayError>,
}

/// Forwards `req` to a node selected from `service` for up to
/// `route.retryCount + 1` attempts, honoring `route.timeoutMs` as the
/// overall deadline. Each attempt that is a `NetworkError`
/// or HTTP 502/503/504 is retried against a different node when one is
/// available.
pub async fn forward(
	client: &UpstreamClient,
	resolver: &Resolver,
	route: &Route,
	service: &ServiceConfig,
	tenant_id: &str,
	trace_id: &TraceId,
	client_ip: IpAddr,
	host: &str,
	mut req: Request<ReqBody>,
) -> (Vec<Attempt>, Option<Response<hyper::body::Incoming>>) {
	let deadline = Instant::now() + Duration::from_millis(route.timeout_ms.max(1));
	let mut attempts = Vec::new();
	let mut tried_nodes: Vec<String> = Vec::new();
	let max_attempts = route.retry_count + 1;

	for attempt_no in 0..max_attempts {
		let Some(node) = pick_untried_node(resolver, service, client_ip, host, &tried_nodes) else {
			break;
		};
		tried_nodes.push(node.id.to_string());

		let remaining = deadline.saturating_duration_since(Instant::now());
		if remaining.is_zero() {
			break;
		}

		node.in_flight.fetch_add(1, Ordering::Relaxed);
		let mut attempt = run_attempt(client, route, &node, tenant_id, trace_id, host, &mut req, remaining).await;
		node.in_flight.fetch_sub(1, Ordering::Relaxed);

		let is_last_attempt = attempt_no + 1 == max_attempts;
		if attempt.response.is_some() && (!is_retryable(&attempt) || is_last_attempt) {
			let response = attempt.response.take();
			attempts.push(attempt);
			return (attempts, response);
		}
		attempts.push(attempt);
		if is_last_attempt {
			break;
		}
	}
	(attempts, None)
}

fn pick_untried_node<'a>(resolver: &Resolver, service: &'a ServiceConfig, client_ip: IpAddr, host: &str, tried: &[String]) -> Option<&'a NodeConfig> {
	if tried.len() < service.nodes.len() {
		for _ in 0..service.nodes.len() {
			let node = resolver.select(service, Some(client_ip), Some(host))?;
			if !tried.contains(&node.id.to_string()) {
				return Some(node);
			}
		}
	}
	// Every healthy node has already been tried at least once; reuse
	// whichever node the resolver picks next rather than giving up.
	resolver.select(service, Some(client_ip), Some(host))
}

fn is_retryable(attempt: &Attempt) -> bool {
	if attempt.error.is_some() {
		return true;
	}
	matches!(attempt.trace.response_status, 502 | 503 | 504)
}

async fn run_attempt(
	client: &UpstreamClient,
	route: &Route,
	node: &NodeConfig,
	tenant_id: &str,
	trace_id: &TraceId,
	host: &str,
	req: &mut Request<ReqBody>,
	remaining: Duration,
) -> Attempt {
	let backend_trace_id = BackendTraceId::default();
	let start = Utc::now();
	let started_at = Instant::now();

	let forward_uri = match build_forward_uri(node, req.uri()) {
		Ok(uri) => uri,
		Err(e) => {
			return Attempt {
				response: None,
				trace: trace_for_failure(tenant_id, trace_id, &backend_trace_id, node, route, req, start, start, Some("InvalidUri".into()), Some(e.to_string())),
				error: Some(GatewayError::UpstreamFailure(e.to_string())),
			};
		},
	};

	let forwarded = match clone_request(req, forward_uri.clone(), node, host) {
		Ok(r) => r,
		Err(e) => {
			return Attempt {
				response: None,
				trace: trace_for_failure(tenant_id, trace_id, &backend_trace_id, node, route, req, start, start, Some("RequestBuildFailed".into()), Some(e.clone())),
				error: Some(GatewayError::UpstreamFailure(e)),
			};
		},
	};

	let call = client.inner.request(forwarded);
	let outcome = tokio::time::timeout(remaining, call).await;
	let end = Utc::now();

	match outcome {
		Ok(Ok(response)) => {
			let status = response.status().as_u16();
			let trace = BackendTraceLog {
				tenant_id: tenant_id.to_string(),
				trace_id: trace_id.to_string(),
				backend_trace_id: backend_trace_id.to_string(),
				service_id: node.id.to_string(),
				service_name: node.host.to_string(),
				forward_url: forward_uri.to_string(),
				method: req.method().to_string(),
				path: req.uri().path().to_string(),
				query: req.uri().query().map(String::from),
				headers: None,
				body: None,
				request_size: 0,
				response_status: status,
				response_size: 0,
				response_headers: None,
				response_body: None,
				start_time: start,
				end_time: end,
				error_code: None,
				error_message: None,
				success: status < 500,
			};
			Attempt { response: Some(response), trace, error: None }
		},
		Ok(Err(e)) => Attempt {
			response: None,
			trace: trace_for_failure(tenant_id, trace_id, &backend_trace_id, node, route, req, start, end, Some("NetworkError".into()), Some(e.to_string())),
			error: Some(GatewayError::UpstreamFailure(e.to_string())),
		},
		Err(_) => Attempt {
			response: None,
			trace: trace_for_failure(tenant_id, trace_id, &backend_trace_id, node, route, req, start, end, Some("UpstreamTimeout".into()), Some("deadline exceeded".into())),
			error: Some(GatewayError::UpstreamTimeout(started_at.elapsed())),
		},
	}
}

#[allow(clippy::too_many_arguments)]
fn trace_for_failure(
	tenant_id: &str,
	trace_id: &TraceId,
	backend_trace_id: &BackendTraceId,
	node: &NodeConfig,
	_route: &Route,
	req: &Request<ReqBody>,
	start: chrono::DateTime<Utc>,
	end: chrono::DateTime<Utc>,
	error_code: Option<String>,
	error_message: Option<String>,
) -> BackendTraceLog {
	BackendTraceLog {
		tenant_id: tenant_id.to_string(),
		trace_id: trace_id.to_string(),
		backend_trace_id: backend_trace_id.to_string(),
		service_id: node.id.to_string(),
		service_name: node.host.to_string(),
		forward_url: node.base_url(),
		method: req.method().to_string(),
		path: req.uri().path().to_string(),
		query: req.uri().query().map(String::from),
		headers: None,
		body: None,
		request_size: 0,
		response_status: 0,
		response_size: 0,
		response_headers: None,
		response_body: None,
		start_time: start,
		end_time: end,
		error_code,
		error_message,
		success: false,
	}
}

fn build_forward_uri(node: &NodeConfig, original: &Uri) -> Result<Uri, String> {
	let base: Uri = node.base_url().parse().map_err(|_| "invalid node base url".to_string())?;
	let mut parts = base.into_parts();
	parts.path_and_query = original.path_and_query().cloned();
	Uri::from_parts(parts).map_err(|e| e.to_string())
}

fn clone_request(req: &Request<ReqBody>, uri: Uri, node: &NodeConfig, original_host: &str) -> Result<Request<ReqBody>, String> {
	let mut builder = Request::builder().method(req.method().clone()).uri(uri);
	for (name, value) in req.headers() {
		builder = builder.header(name, value);
	}
	builder = builder.header("x-forwarded-host", original_host);
	builder = builder.header("x-forwarded-proto", "http");
	if let Some(existing) = req.headers().get("x-forwarded-for") {
		let combined = format!("{}, {}", existing.to_str().unwrap_or_default(), node.host);
		if let Ok(v) = HeaderValue::from_str(&combined) {
			builder = builder.header("x-forwarded-for", v);
		}
	}
	let body = req.body().clone();
	builder.body(body).map_err(|e| e.to_string())
}

/// Assembles the forward path honoring `route.stripPrefix`/`route.rewritePath`
/// against the matched prefix, before query-string filters run.
pub fn rewrite_request_path(route: &Route, matched_prefix: &str, uri: &Uri) -> Uri {
	let original = uri.path().to_string();
	let stripped = route.strip_prefix.then(|| original.strip_prefix(matched_prefix)).flatten();

	let path = match (&route.rewrite_path, stripped) {
		(Some(rewrite), Some(rest)) => format!("{rewrite}{rest}"),
		(Some(rewrite), None) => rewrite.to_string(),
		(None, Some(rest)) if rest.is_empty() => "/".to_string(),
		(None, Some(rest)) => rest.to_string(),
		(None, None) => original,
	};
	let mut parts = uri.clone().into_parts();
	let path_and_query = match uri.query() {
		Some(q) => format!("{path}?{q}"),
		None => path,
	};
	parts.path_and_query = path_and_query.try_into().ok();
	Uri::from_parts(parts).unwrap_or_else(|_| uri.clone())
}

pub fn set_client_headers(headers: &mut HeaderMap<HeaderValue>, client_ip: IpAddr) {
	if let Ok(v) = HeaderValue::from_str(&client_ip.to_string()) {
		headers.insert("x-real-ip", v);
	}
}

pub fn is_websocket_upgrade(req: &Request<ReqBody>) -> bool {
	req.method() == Method::GET
		&& req
			.headers()
			.get(http::header::UPGRADE)
			.and_then(|v| v.to_str().ok())
			.is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

pub async fn buffer_body(body: ReqBody) -> Result<Bytes, GatewayError> {
	body
		.collect()
		.await
		.map(|c| c.to_bytes())
		.map_err(|e| GatewayError::UpstreamFailure(e.to_string()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use gateway_core::model::{HealthCheckConfig, InstanceStatus};
	use std::collections::HashMap;
	use std::sync::atomic::AtomicU64;
	use std::sync::Arc;

	fn node(id: &str) -> NodeConfig {
		NodeConfig {
			id: id.into(),
			url: format!("http://{id}").into(),
			host: "127.0.0.1".into(),
			port: 9000,
			protocol: "http".into(),
			weight: 1,
			healthy: true,
			enabled: true,
			metadata: HashMap::new(),
			last_beat_time: chrono::Utc::now(),
			ephemeral: false,
			instance_status: InstanceStatus::Up,
			in_flight: Arc::new(AtomicU64::new(0)),
		}
	}

	fn route() -> Route {
		Route {
			id: "r1".into(),
			path: "/api".into(),
			match_type: gateway_core::model::MatchType::Prefix,
			allowed_methods: vec![],
			allowed_hosts: vec![],
			priority: 0,
			strip_prefix: true,
			rewrite_path: None,
			enable_websocket: false,
			timeout_ms: 5000,
			retry_count: 0,
			retry_interval_ms: 0,
			service_definition_id: "s1".into(),
			log_config_id: None,
			metadata: HashMap::new(),
			assertion_group: None,
			filters: vec![],
			security: None,
			auth: None,
			cors: None,
			rate_limit: None,
		}
	}

	#[test]
	fn rewrite_strips_matched_prefix() {
		let uri = Uri::from_static("http://gw.example/api/users?x=1");
		let rewritten = rewrite_request_path(&route(), "/api", &uri);
		assert_eq!(rewritten.path(), "/users");
		assert_eq!(rewritten.query(), Some("x=1"));
	}

	#[test]
	fn rewrite_prepends_to_stripped_remainder() {
		let mut r = route();
		r.rewrite_path = Some("/v1".into());
		let uri = Uri::from_static("http://gw.example/api/v1/users?x=1");
		let rewritten = rewrite_request_path(&r, "/api/v1", &uri);
		assert_eq!(rewritten.path(), "/v1/users");
		assert_eq!(rewritten.query(), Some("x=1"));
	}

	#[test]
	fn build_forward_uri_keeps_path_and_query() {
		let n = node("n1");
		let original = Uri::from_static("http://gw.example/users?x=1");
		let forward = build_forward_uri(&n, &original).unwrap();
		assert_eq!(forward.authority().unwrap().as_str(), "127.0.0.1:9000");
		assert_eq!(forward.path_and_query().unwrap().as_str(), "/users?x=1");
	}

	#[test]
	fn detects_websocket_upgrade() {
		let req = Request::builder()
			.method(Method::GET)
			.header(http::header::UPGRADE, "websocket")
			.body(Full::new(Bytes::new()))
			.unwrap();
		assert!(is_websocket_upgrade(&req));
	}
}
