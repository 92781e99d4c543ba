use std::collections::HashMap;

use gateway_core::model::{Filter, FilterAction};
use gateway_core::prelude::*;
use gateway_core::GatewayError;
use http::{HeaderMap, HeaderName, HeaderValue, Uri};
use minijinja::Environment;
use serde::Deserialize;

/// Mutable view a filter is allowed to touch: headers/query/path/body.
/// Filters must not read the raw upstream socket.
pub struct FilterContext {
	pub method: String,
	pub uri: Uri,
	pub headers: HeaderMap<HeaderValue>,
	pub query: HashMap<String, String>,
	pub body: Option<Bytes>,
	pub client_ip: Option<String>,
	/// Set by a filter that wants to short-circuit with a final response.
	pub response_override: Option<(u16, HeaderMap<HeaderValue>, Bytes)>,
}

impl FilterContext {
	pub fn new(method: &str, uri: Uri, headers: HeaderMap<HeaderValue>) -> Self {
		let query = uri
			.query()
			.map(parse_query)
			.unwrap_or_default();
		Self {
			method: method.to_string(),
			uri,
			headers,
			query,
			body: None,
			client_ip: None,
			response_override: None,
		}
	}

	pub fn rebuild_uri(&mut self) -> Result<(), GatewayError> {
		let path = self.uri.path().to_string();
		let mut parts = self.uri.clone().into_parts();
		let query = encode_query(&self.query);
		let path_and_query = if query.is_empty() {
			path
		} else {
			format!("{path}?{query}")
		};
		parts.path_and_query = Some(
			path_and_query
				.try_into()
				.map_err(|_| filter_failed("url", "invalid rewritten path"))?,
		);
		self.uri = Uri::from_parts(parts).map_err(|_| filter_failed("url", "invalid rewritten uri"))?;
		Ok(())
	}
}

fn parse_query(raw: &str) -> HashMap<String, String> {
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

fn encode_query(query: &HashMap<String, String>) -> String {
	let mut pairs: Vec<_> = query.iter().collect();
	pairs.sort_by(|a, b| a.0.cmp(b.0));
	pairs
		.into_iter()
		.map(|(k, v)| format!("{k}={v}"))
		.collect::<Vec<_>>()
		.join("&")
}

fn filter_failed(filter: &str, message: &str) -> GatewayError {
	GatewayError::FilterFailed {
		filter: filter.to_string(),
		message: message.to_string(),
	}
}

/// Runs every enabled filter in `filters` whose `action` matches `phase`, in
/// the pre-sorted order already established by
/// [`gateway_core::model::sort_filters`]. Short-circuits on the first filter
/// that sets `response_override` or errors; subsequent filters in the same
/// phase still run if `run_always` is set.
pub fn run_phase(filters: &[Filter], phase: FilterAction, ctx: &mut FilterContext) -> Result<(), GatewayError> {
	let mut short_circuited = false;
	for filter in filters.iter().filter(|f| f.enabled && f.action == phase) {
		if short_circuited && !filter.run_always {
			continue;
		}
		match apply_filter(filter, ctx) {
			Ok(()) => {},
			Err(e) => {
				short_circuited = true;
				if !filter.run_always {
					return Err(e);
				}
			},
		}
		if ctx.response_override.is_some() {
			short_circuited = true;
		}
	}
	Ok(())
}

fn apply_filter(filter: &Filter, ctx: &mut FilterContext) -> Result<(), GatewayError> {
	match filter.filter_type.as_str() {
		"header" => apply_header_filter(filter, ctx),
		"query" => apply_query_filter(filter, ctx),
		"url-rewrite" | "url" => apply_url_filter(filter, ctx),
		"body-transform" | "body" => apply_body_filter(filter, ctx),
		other => Err(filter_failed(other, "unknown filter type")),
	}
}

#[derive(Deserialize, Default)]
struct HeaderOp {
	#[serde(default)]
	add: HashMap<String, String>,
	#[serde(default)]
	set: HashMap<String, String>,
	#[serde(default)]
	remove: Vec<String>,
	/// Header value templates rendered with minijinja (e.g. `{{ request_header_x_foo }}`).
	#[serde(default)]
	templates: HashMap<String, String>,
}

fn apply_header_filter(filter: &Filter, ctx: &mut FilterContext) -> Result<(), GatewayError> {
	let op: HeaderOp = config_as(filter)?;
	for (k, v) in &op.add {
		let name = header_name(filter, k)?;
		let value = header_value(filter, v)?;
		ctx.headers.append(name, value);
	}
	for (k, v) in &op.set {
		let name = header_name(filter, k)?;
		let value = header_value(filter, v)?;
		ctx.headers.insert(name, value);
	}
	for k in &op.remove {
		if let Ok(name) = HeaderName::from_bytes(k.as_bytes()) {
			ctx.headers.remove(name);
		}
	}
	if !op.templates.is_empty() {
		render_templates(filter, &op.templates, ctx)?;
	}
	Ok(())
}

fn render_templates(filter: &Filter, templates: &HashMap<String, String>, ctx: &mut FilterContext) -> Result<(), GatewayError> {
	let mut env = Environment::new();
	let existing: HashMap<String, String> = ctx
		.headers
		.iter()
		.map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
		.collect();
	for (name, template_src) in templates {
		env
			.add_template_owned(name.clone(), template_src.clone())
			.map_err(|e| filter_failed(&filter.filter_type, &e.to_string()))?;
	}
	for (name, _) in templates {
		let tmpl = env
			.get_template(name)
			.map_err(|e| filter_failed(&filter.filter_type, &e.to_string()))?;
		let rendered = tmpl
			.render(minijinja::context! { headers => &existing })
			.map_err(|e| filter_failed(&filter.filter_type, &e.to_string()))?;
		let header_name = header_name(filter, name)?;
		let value = header_value(filter, &rendered)?;
		ctx.headers.insert(header_name, value);
	}
	Ok(())
}

fn header_name(filter: &Filter, raw: &str) -> Result<HeaderName, GatewayError> {
	HeaderName::from_bytes(raw.as_bytes()).map_err(|_| filter_failed(&filter.filter_type, "invalid header name"))
}

fn header_value(filter: &Filter, raw: &str) -> Result<HeaderValue, GatewayError> {
	HeaderValue::from_str(raw).map_err(|_| filter_failed(&filter.filter_type, "invalid header value"))
}

#[derive(Deserialize, Default)]
struct QueryOp {
	#[serde(default)]
	add: HashMap<String, String>,
	#[serde(default)]
	remove: Vec<String>,
}

fn apply_query_filter(filter: &Filter, ctx: &mut FilterContext) -> Result<(), GatewayError> {
	let op: QueryOp = config_as(filter)?;
	for (k, v) in op.add {
		ctx.query.insert(k, v);
	}
	for k in op.remove {
		ctx.query.remove(&k);
	}
	ctx.rebuild_uri()
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UrlOp {
	/// Absolute replacement path, e.g. `/v2/health`.
	rewrite_path: Option<String>,
	/// Strip this literal prefix from the path before forwarding.
	strip_prefix: Option<String>,
}

fn apply_url_filter(filter: &Filter, ctx: &mut FilterContext) -> Result<(), GatewayError> {
	let op: UrlOp = config_as(filter)?;
	let mut parts = ctx.uri.clone().into_parts();
	let original = ctx.uri.path().to_string();
	let stripped = op.strip_prefix.as_deref().and_then(|prefix| original.strip_prefix(prefix));

	let path = match (&op.rewrite_path, stripped) {
		(Some(rewrite), Some(rest)) => format!("{rewrite}{rest}"),
		(Some(rewrite), None) => rewrite.clone(),
		(None, Some(rest)) if rest.is_empty() => "/".to_string(),
		(None, Some(rest)) => rest.to_string(),
		(None, None) => original,
	};
	let query = encode_query(&ctx.query);
	let path_and_query = if query.is_empty() { path } else { format!("{path}?{query}") };
	parts.path_and_query = Some(
		path_and_query
			.try_into()
			.map_err(|_| filter_failed(&filter.filter_type, "invalid rewritten path"))?,
	);
	ctx.uri = Uri::from_parts(parts).map_err(|_| filter_failed(&filter.filter_type, "invalid rewritten uri"))?;
	Ok(())
}

#[derive(Deserialize, Default)]
struct BodyOp {
	/// Fixed replacement body, used mainly for synthetic short-circuit responses.
	replace: Option<String>,
}

fn apply_body_filter(filter: &Filter, ctx: &mut FilterContext) -> Result<(), GatewayError> {
	let op: BodyOp = config_as(filter)?;
	if let Some(replacement) = op.replace {
		ctx.body = Some(Bytes::from(replacement));
	}
	Ok(())
}

fn config_as<T: for<'de> Deserialize<'de> + Default>(filter: &Filter) -> Result<T, GatewayError> {
	if filter.config.is_empty() {
		return Ok(T::default());
	}
	let value = serde_json::to_value(&filter.config).map_err(|e| filter_failed(&filter.filter_type, &e.to_string()))?;
	serde_json::from_value(value).map_err(|e| filter_failed(&filter.filter_type, &e.to_string()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn filter(filter_type: &str, action: FilterAction, config: HashMap<String, serde_json::Value>) -> Filter {
		Filter {
			filter_type: filter_type.into(),
			enabled: true,
			action,
			order: 0,
			insertion_order: 0,
			run_always: false,
			config,
		}
	}

	fn ctx() -> FilterContext {
		FilterContext::new("GET", Uri::from_static("http://example.com/foo?x=1"), HeaderMap::new())
	}

	#[test]
	fn header_add_and_remove() {
		let mut c = ctx();
		c.headers.insert("x-old", HeaderValue::from_static("v"));
		let cfg: HashMap<String, serde_json::Value> = [
			("add".to_string(), json!({"x-new": "hello"})),
			("remove".to_string(), json!(["x-old"])),
		]
		.into_iter()
		.collect();
		let f = filter("header", FilterAction::PreRouting, cfg);
		run_phase(std::slice::from_ref(&f), FilterAction::PreRouting, &mut c).unwrap();
		assert_eq!(c.headers.get("x-new").unwrap(), "hello");
		assert!(c.headers.get("x-old").is_none());
	}

	#[test]
	fn query_add_rebuilds_uri() {
		let mut c = ctx();
		let cfg: HashMap<String, serde_json::Value> = [("add".to_string(), json!({"y": "2"}))].into_iter().collect();
		let f = filter("query", FilterAction::PreRouting, cfg);
		run_phase(std::slice::from_ref(&f), FilterAction::PreRouting, &mut c).unwrap();
		assert!(c.uri.query().unwrap().contains("y=2"));
	}

	#[test]
	fn url_strip_prefix() {
		let mut c = FilterContext::new("GET", Uri::from_static("http://example.com/api/v1/users"), HeaderMap::new());
		let cfg: HashMap<String, serde_json::Value> = [("stripPrefix".to_string(), json!("/api/v1"))]
			.into_iter()
			.collect();
		let cfg = Filter::flatten_config(json!({"urlConfig": cfg}));
		let f = filter("url", FilterAction::PreRouting, cfg);
		run_phase(std::slice::from_ref(&f), FilterAction::PreRouting, &mut c).unwrap();
		assert_eq!(c.uri.path(), "/users");
	}

	#[test]
	fn url_strip_prefix_and_rewrite_path_combine() {
		let mut c = FilterContext::new("GET", Uri::from_static("http://example.com/api/v1/users"), HeaderMap::new());
		let cfg: HashMap<String, serde_json::Value> =
			[("stripPrefix".to_string(), json!("/api/v1")), ("rewritePath".to_string(), json!("/v1"))]
				.into_iter()
				.collect();
		let cfg = Filter::flatten_config(json!({"urlConfig": cfg}));
		let f = filter("url", FilterAction::PreRouting, cfg);
		run_phase(std::slice::from_ref(&f), FilterAction::PreRouting, &mut c).unwrap();
		assert_eq!(c.uri.path(), "/v1/users");
	}

	#[test]
	fn short_circuit_skips_non_run_always_filters() {
		let mut c = ctx();
		let failing = filter("bogus-type", FilterAction::PreRouting, HashMap::new());
		let mut skipped = filter("query", FilterAction::PreRouting, HashMap::new());
		skipped.order = 1;
		let err = run_phase(&[failing, skipped], FilterAction::PreRouting, &mut c);
		assert!(err.is_err());
	}
}
