use std::net::IpAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use bytes::Bytes;
use chrono::Utc;
use gateway_core::matcher::{RequestFingerprint, RouteMatcher};
use gateway_core::model::{AccessLog, BackendTraceLog, FilterAction, GatewayConfig};
use gateway_core::{GatewayError, TraceId};
use gateway_store::ConfigSnapshot;
use http::{HeaderMap, Method, Request, Response, StatusCode, Uri};
use http_body_util::Full;

use crate::engine::{self, ReqBody, UpstreamClient};
use crate::filters::{self, FilterContext};
use crate::ratelimit::RateLimiter;
use crate::resolver::Resolver;
use crate::{auth, cors, security};

pub type OutBody = Full<Bytes>;

/// Everything the request pipeline needs for one gateway instance, rebuilt
/// together whenever the instance's [`GatewayConfig`] snapshot reloads
///.
pub struct InstanceRuntime {
	pub snapshot: ConfigSnapshot,
	matcher: ArcSwap<RouteMatcher>,
	pub rate_limiter: RateLimiter,
	pub resolver: Resolver,
	pub client: UpstreamClient,
}

impl InstanceRuntime {
	pub fn new(initial: GatewayConfig) -> Self {
		let matcher = build_matcher(&initial);
		Self {
			snapshot: ConfigSnapshot::new(initial),
			matcher: ArcSwap::from_pointee(matcher),
			rate_limiter: RateLimiter::new(),
			resolver: Resolver::new(),
			client: UpstreamClient::new(),
		}
	}

	/// Atomically swaps both the config snapshot and its derived matcher.
	pub fn reload(&self, updated: GatewayConfig) {
		let matcher = build_matcher(&updated);
		self.snapshot.store(updated);
		self.matcher.store(Arc::new(matcher));
	}
}

fn build_matcher(config: &GatewayConfig) -> RouteMatcher {
	RouteMatcher::new(config.router.clone(), config.routes.clone())
}

/// Outcome of running one request through the pipeline: the response to
/// write back, the [`AccessLog`] snapshot, and zero-or-more
/// [`BackendTraceLog`]s (one per forwarded attempt),
pub struct Outcome {
	pub response: Response<OutBody>,
	pub access_log: AccessLog,
	pub backend_traces: Vec<BackendTraceLog>,
}

#[allow(clippy::too_many_arguments)]
pub async fn handle(runtime: &InstanceRuntime, tenant_id: &str, instance_id: &str, peer_ip: IpAddr, req: Request<ReqBody>) -> Outcome {
	let received_at = Utc::now();
	let trace_id = TraceId::default();
	let config = runtime.snapshot.load();
	let matcher = runtime.matcher.load_full();

	let method = req.method().clone();
	let uri = req.uri().clone();
	let headers = req.headers().clone();
	let host = request_host(&headers, &uri);
	let (body_result, body) = split_body(req).await;

	let mut access_log = AccessLog {
		tenant_id: tenant_id.to_string(),
		trace_id: trace_id.to_string(),
		gateway_instance_id: instance_id.to_string(),
		client_ip: peer_ip.to_string(),
		request_method: method.to_string(),
		request_path: uri.path().to_string(),
		request_query: uri.query().map(String::from),
		user_agent: header_str(&headers, http::header::USER_AGENT),
		referer: header_str(&headers, http::header::REFERER),
		received_at: Some(received_at),
		start_processing_at: Some(Utc::now()),
		..Default::default()
	};

	let mut backend_traces = Vec::new();

	let outcome = run(runtime, &config, &matcher, &method, &uri, headers, body, peer_ip, &host, &mut access_log, &mut backend_traces).await;
	let response = match outcome {
		Ok(response) => response,
		Err(error) => {
			access_log.error_code = Some(error.code().to_string());
			access_log.error_message = Some(error.to_string());
			error_response(&error, &config)
		},
	};

	access_log.finished_processing_at = Some(Utc::now());
	access_log.response_sent_at = Some(Utc::now());
	access_log.response_status = response.status().as_u16();
	if let Some(err) = body_result.err() {
		access_log.error_message = Some(err);
	}
	if let (Some(start), Some(end)) = (access_log.start_processing_at, access_log.finished_processing_at) {
		access_log.total_processing_ms = (end - start).num_milliseconds().max(0) as u64;
		access_log.gateway_processing_ms = access_log.total_processing_ms;
	}

	Outcome { response, access_log, backend_traces }
}

#[allow(clippy::too_many_arguments)]
async fn run(
	runtime: &InstanceRuntime,
	config: &GatewayConfig,
	matcher: &RouteMatcher,
	method: &Method,
	uri: &Uri,
	headers: HeaderMap,
	body: Bytes,
	peer_ip: IpAddr,
	host: &str,
	access_log: &mut AccessLog,
	backend_traces: &mut Vec<BackendTraceLog>,
) -> Result<Response<OutBody>, GatewayError> {
	let fingerprint = RequestFingerprint {
		method: method.to_string(),
		host: host.to_string(),
		path: uri.path().to_string(),
		query: uri.query().map(query_pairs).unwrap_or_default(),
		headers: headers.iter().map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or_default().to_string())).collect(),
	};
	let matched = matcher.find(&fingerprint).ok_or(GatewayError::RouteNotFound)?;
	let route = &config.routes[matched.route_index];
	access_log.matched_route = Some(route.id.to_string());
	access_log.route_name = Some(route.id.to_string());

	access_log.request_headers =
		gateway_log::snapshot::capture_headers(&config.log_config, headers.iter().map(|(k, v)| (k.as_str(), v.to_str().unwrap_or_default())));
	access_log.request_body = gateway_log::snapshot::capture_body(&config.log_config, config.log_config.record_request_body, &String::from_utf8_lossy(&body));
	access_log.request_size = body.len();

	let mut ctx = FilterContext::new(method.as_str(), uri.clone(), headers.clone());
	ctx.client_ip = Some(peer_ip.to_string());
	ctx.body = Some(body);

	let mut all_filters: Vec<_> = config.global_filters.iter().chain(route.filters.iter()).cloned().collect();
	gateway_core::model::sort_filters(&mut all_filters);

	filters::run_phase(&all_filters, FilterAction::PreRouting, &mut ctx)?;

	// Route-level security/auth/cors/rate-limit override the instance's
	// defaults when both are present.
	let effective_cors = route.cors.as_ref().or(config.instance.cors.as_ref());
	let effective_security = route.security.as_ref().or(config.instance.security.as_ref());
	let effective_auth = route.auth.as_ref().or(config.instance.auth.as_ref());
	let effective_rate_limit = route.rate_limit.as_ref().or(config.instance.rate_limit.as_ref());

	if let Some(cors_cfg) = effective_cors {
		match cors::evaluate(cors_cfg, method, &ctx.headers) {
			cors::CorsOutcome::Preflight(cors_headers) => {
				return Ok(build_response(StatusCode::NO_CONTENT, cors_headers, Bytes::new()));
			},
			cors::CorsOutcome::Attach(cors_headers) => {
				for (k, v) in cors_headers.iter() {
					ctx.headers.insert(k.clone(), v.clone());
				}
			},
			cors::CorsOutcome::NotApplicable => {},
		}
	}

	if let Some(security_cfg) = effective_security {
		let client_ip = security::effective_client_ip(security_cfg.ip_access.as_ref(), &ctx.headers, peer_ip);
		let ua = header_str(&ctx.headers, http::header::USER_AGENT);
		security::check(security_cfg, client_ip, ua.as_deref(), host, uri.path(), method.as_str())?;
	}

	if let Some(auth_cfg) = effective_auth {
		auth::authenticate(auth_cfg, uri.path(), &ctx.headers)?;
	}

	if let Some(rate_limit_cfg) = effective_rate_limit {
		let client_ip = Some(peer_ip);
		let user_id = None;
		runtime
			.rate_limiter
			.check(rate_limit_cfg, route.id.as_str(), client_ip, user_id, &ctx.headers)?;
	}

	filters::run_phase(&all_filters, FilterAction::PostRouting, &mut ctx)?;

	let service = config
		.service(route.service_definition_id.as_str())
		.ok_or_else(|| GatewayError::NoHealthyNode(route.service_definition_id.to_string()))?;
	access_log.service_id = Some(service.id.to_string());
	access_log.service_name = Some(service.name.to_string());

	let rewritten_uri = engine::rewrite_request_path(route, route.path.as_str(), &ctx.uri);
	let mut forward_headers = ctx.headers.clone();
	engine::set_client_headers(&mut forward_headers, peer_ip);

	let mut builder = Request::builder().method(method.clone()).uri(rewritten_uri);
	for (k, v) in forward_headers.iter() {
		builder = builder.header(k.clone(), v.clone());
	}
	let forward_body = ReqBody::new(ctx.body.clone().unwrap_or_default());
	let forward_req = builder
		.body(forward_body)
		.map_err(|e| GatewayError::UpstreamFailure(e.to_string()))?;

	let (attempts, response) = engine::forward(
		&runtime.client,
		&runtime.resolver,
		route,
		service,
		config.instance.tenant_id.as_str(),
		&TraceId::default(),
		peer_ip,
		host,
		forward_req,
	)
	.await;
	let attempted = !attempts.is_empty();
	backend_traces.extend(attempts.into_iter().map(|a| a.trace));

	let Some(upstream_response) = response else {
		return Err(if attempted {
			GatewayError::UpstreamFailure(format!("all attempts to {} failed", service.id))
		} else {
			GatewayError::NoHealthyNode(service.id.to_string())
		});
	};

	let status = upstream_response.status();
	access_log.backend_status_code = status.as_u16();
	let (parts, incoming) = upstream_response.into_parts();
	let response_body = http_body_util::BodyExt::collect(incoming)
		.await
		.map(|c| c.to_bytes())
		.unwrap_or_default();
	access_log.response_size = response_body.len();
	access_log.response_headers = gateway_log::snapshot::capture_headers(
		&config.log_config,
		parts.headers.iter().map(|(k, v)| (k.as_str(), v.to_str().unwrap_or_default())),
	);
	access_log.response_body = gateway_log::snapshot::capture_body(&config.log_config, config.log_config.record_response_body, &String::from_utf8_lossy(&response_body));

	let mut response_ctx = FilterContext::new(method.as_str(), ctx.uri.clone(), parts.headers.clone());
	response_ctx.body = Some(response_body);
	filters::run_phase(&all_filters, FilterAction::PreResponse, &mut response_ctx)?;

	Ok(build_response(parts.status, response_ctx.headers, response_ctx.body.unwrap_or_default()))
}

fn build_response(status: StatusCode, headers: HeaderMap, body: Bytes) -> Response<OutBody> {
	let mut response = Response::new(OutBody::new(body));
	*response.status_mut() = status;
	*response.headers_mut() = headers;
	response
}

fn error_response(error: &GatewayError, config: &GatewayConfig) -> Response<OutBody> {
	let status = if matches!(error, GatewayError::RouteNotFound) {
		StatusCode::from_u16(config.router.not_found_status_code).unwrap_or(StatusCode::NOT_FOUND)
	} else {
		error.default_status()
	};
	let message = if matches!(error, GatewayError::RouteNotFound) {
		config.router.not_found_message.to_string()
	} else {
		error.to_string()
	};
	build_response(status, HeaderMap::new(), Bytes::from(message))
}

fn request_host(headers: &HeaderMap, uri: &Uri) -> String {
	header_str(headers, http::header::HOST).or_else(|| uri.host().map(String::from)).unwrap_or_default()
}

fn header_str(headers: &HeaderMap, name: http::HeaderName) -> Option<String> {
	headers.get(name).and_then(|v| v.to_str().ok()).map(String::from)
}

fn query_pairs(raw: &str) -> std::collections::HashMap<String, String> {
	raw
		.split('&')
		.filter(|p| !p.is_empty())
		.filter_map(|pair| {
			let mut it = pair.splitn(2, '=');
			let k = it.next()?.to_string();
			let v = it.next().unwrap_or("").to_string();
			Some((k, v))
		})
		.collect()
}

async fn split_body(req: Request<ReqBody>) -> (Result<(), String>, Bytes) {
	let body = req.into_body();
	match engine::buffer_body(body).await {
		Ok(bytes) => (Ok(()), bytes),
		Err(_) => (Err("failed to read request body".to_string()), Bytes::new()),
	}
}
