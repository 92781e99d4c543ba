use gateway_core::model::CorsConfig;
use http::{HeaderMap, HeaderValue, Method};

/// A computed set of `Access-Control-*` response headers, or a full 204
/// preflight short-circuit.
pub enum CorsOutcome {
	/// Not a CORS request (no `Origin` header); nothing to do.
	NotApplicable,
	/// Attach these headers to the eventual upstream response.
	Attach(HeaderMap),
	/// Respond immediately with 204 and these headers; no upstream call.
	Preflight(HeaderMap),
}

pub fn evaluate(config: &CorsConfig, method: &Method, headers: &HeaderMap) -> CorsOutcome {
	let Some(origin) = headers.get(http::header::ORIGIN).and_then(|v| v.to_str().ok()) else {
		return CorsOutcome::NotApplicable;
	};
	let allowed_origin = resolve_allowed_origin(config, origin);
	let Some(allowed_origin) = allowed_origin else {
		return CorsOutcome::NotApplicable;
	};

	let mut out = HeaderMap::new();
	insert(&mut out, "access-control-allow-origin", &allowed_origin);
	if config.allow_credentials && allowed_origin != "*" {
		insert(&mut out, "access-control-allow-credentials", "true");
	}
	if !config.expose_headers.is_empty() {
		insert(&mut out, "access-control-expose-headers", &config.expose_headers.join(", "));
	}

	if method == Method::OPTIONS {
		if !config.allow_methods.is_empty() {
			insert(&mut out, "access-control-allow-methods", &config.allow_methods.join(", "));
		}
		if !config.allow_headers.is_empty() {
			insert(&mut out, "access-control-allow-headers", &config.allow_headers.join(", "));
		}
		insert(&mut out, "access-control-max-age", &config.max_age.to_string());
		CorsOutcome::Preflight(out)
	} else {
		CorsOutcome::Attach(out)
	}
}

/// Origin `*` is incompatible with `allowCredentials=true`: the wildcard is
/// dropped and the exact origin is echoed instead.
fn resolve_allowed_origin(config: &CorsConfig, origin: &str) -> Option<String> {
	let wildcard = config.allow_origins.iter().any(|o| o == "*");
	let exact = config.allow_origins.iter().any(|o| o == origin);
	if exact {
		return Some(origin.to_string());
	}
	if wildcard {
		return Some(if config.allow_credentials { origin.to_string() } else { "*".to_string() });
	}
	None
}

fn insert(headers: &mut HeaderMap, name: &'static str, value: &str) {
	if let Ok(v) = HeaderValue::from_str(value) {
		headers.insert(name, v);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn config(origins: Vec<&str>, allow_credentials: bool) -> CorsConfig {
		CorsConfig {
			allow_origins: origins.into_iter().map(String::from).collect(),
			allow_methods: vec!["GET".into(), "POST".into()],
			allow_headers: vec!["content-type".into()],
			expose_headers: vec![],
			allow_credentials,
			max_age: 600,
		}
	}

	#[test]
	fn no_origin_header_is_not_applicable() {
		let outcome = evaluate(&config(vec!["*"], false), &Method::GET, &HeaderMap::new());
		assert!(matches!(outcome, CorsOutcome::NotApplicable));
	}

	#[test]
	fn wildcard_downgrades_when_credentials_allowed() {
		let mut headers = HeaderMap::new();
		headers.insert(http::header::ORIGIN, "https://app.example.com".parse().unwrap());
		let outcome = evaluate(&config(vec!["*"], true), &Method::GET, &headers);
		let CorsOutcome::Attach(out) = outcome else { panic!("expected attach") };
		assert_eq!(out.get("access-control-allow-origin").unwrap(), "https://app.example.com");
		assert_eq!(out.get("access-control-allow-credentials").unwrap(), "true");
	}

	#[test]
	fn wildcard_stays_wildcard_without_credentials() {
		let mut headers = HeaderMap::new();
		headers.insert(http::header::ORIGIN, "https://app.example.com".parse().unwrap());
		let outcome = evaluate(&config(vec!["*"], false), &Method::GET, &headers);
		let CorsOutcome::Attach(out) = outcome else { panic!("expected attach") };
		assert_eq!(out.get("access-control-allow-origin").unwrap(), "*");
	}

	#[test]
	fn preflight_returns_204_shaped_headers() {
		let mut headers = HeaderMap::new();
		headers.insert(http::header::ORIGIN, "https://app.example.com".parse().unwrap());
		let outcome = evaluate(&config(vec!["https://app.example.com"], false), &Method::OPTIONS, &headers);
		assert!(matches!(outcome, CorsOutcome::Preflight(_)));
	}

	#[test]
	fn origin_not_in_allow_list_is_not_applicable() {
		let mut headers = HeaderMap::new();
		headers.insert(http::header::ORIGIN, "https://evil.example.com".parse().unwrap());
		let outcome = evaluate(&config(vec!["https://app.example.com"], false), &Method::GET, &headers);
		assert!(matches!(outcome, CorsOutcome::NotApplicable));
	}
}
