use std::net::IpAddr;

use gateway_core::model::SecurityConfig;
use gateway_core::GatewayError;
use http::HeaderMap;

/// Resolves the effective client IP, honoring `trustXForwardedFor`/`trustXRealIP`
/// (first comma-separated value), falling back to the socket peer address
///.
pub fn effective_client_ip(ip_access: Option<&gateway_core::model::IpAccess>, headers: &HeaderMap, peer: IpAddr) -> IpAddr {
	let Some(ip_access) = ip_access else {
		return peer;
	};
	if ip_access.trust_x_forwarded_for {
		if let Some(first) = header_first_value(headers, "x-forwarded-for") {
			if let Ok(ip) = first.parse() {
				return ip;
			}
		}
	}
	if ip_access.trust_x_real_ip {
		if let Some(v) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
			if let Ok(ip) = v.trim().parse() {
				return ip;
			}
		}
	}
	peer
}

fn header_first_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
	headers
		.get(name)
		.and_then(|v| v.to_str().ok())
		.map(|v| v.split(',').next().unwrap_or(v).trim())
}

/// Runs the IP → UserAgent → Domain → API checks in order. Each
/// disabled (`None`) check passes. Returns `AccessDenied` on the first
/// failing check.
pub fn check(config: &SecurityConfig, client_ip: IpAddr, user_agent: Option<&str>, host: &str, path: &str, method: &str) -> Result<(), GatewayError> {
	if let Some(ip_access) = &config.ip_access {
		if !ip_access.check(client_ip) {
			return Err(GatewayError::AccessDenied(format!("client ip {client_ip} rejected")));
		}
	}
	if let Some(ua_access) = &config.user_agent_access {
		if !ua_access.check(user_agent) {
			return Err(GatewayError::AccessDenied("user agent rejected".to_string()));
		}
	}
	if let Some(domain_access) = &config.domain_access {
		if !domain_access.check(host) {
			return Err(GatewayError::AccessDenied(format!("host {host} rejected")));
		}
	}
	if let Some(api_access) = &config.api_access {
		if !api_access.check(path, method) {
			return Err(GatewayError::AccessDenied(format!("{method} {path} rejected")));
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use gateway_core::model::IpAccess;

	#[test]
	fn effective_ip_prefers_forwarded_for_first_value() {
		let ip_access = IpAccess {
			trust_x_forwarded_for: true,
			..Default::default()
		};
		let mut headers = HeaderMap::new();
		headers.insert("x-forwarded-for", "203.0.113.1, 10.0.0.1".parse().unwrap());
		let peer: IpAddr = "127.0.0.1".parse().unwrap();
		let resolved = effective_client_ip(Some(&ip_access), &headers, peer);
		assert_eq!(resolved, "203.0.113.1".parse::<IpAddr>().unwrap());
	}

	#[test]
	fn effective_ip_falls_back_to_peer_when_untrusted() {
		let ip_access = IpAccess::default();
		let mut headers = HeaderMap::new();
		headers.insert("x-forwarded-for", "203.0.113.1".parse().unwrap());
		let peer: IpAddr = "127.0.0.1".parse().unwrap();
		assert_eq!(effective_client_ip(Some(&ip_access), &headers, peer), peer);
	}

	#[test]
	fn check_denies_on_first_failing_dimension() {
		let config = SecurityConfig {
			domain_access: Some(gateway_core::model::DomainAccess {
				default_policy: gateway_core::model::AccessPolicy::Deny,
				..Default::default()
			}),
			..Default::default()
		};
		let err = check(&config, "127.0.0.1".parse().unwrap(), None, "blocked.example", "/", "GET");
		assert!(matches!(err, Err(GatewayError::AccessDenied(_))));
	}
}
