use arcstr::ArcStr;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::model::security::{AuthConfig, CorsConfig, RateLimitConfig, SecurityConfig};

/// TLS material either inline (with optional password) or by file path.
/// Invariant: exactly one of the two variants is populated when
/// TLS is enabled — the loader enforces this before a [`GatewayInstance`] is
/// ever constructed.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "source")]
pub enum TlsMaterial {
	FilePath {
		cert_file_path: PathBuf,
		key_file_path: PathBuf,
	},
	Inline {
		cert_content: String,
		key_content: String,
		password: Option<String>,
	},
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
	Healthy,
	Degraded,
	Down,
	Unknown,
}

impl Default for HealthStatus {
	fn default() -> Self {
		HealthStatus::Unknown
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayInstance {
	pub id: ArcStr,
	pub tenant_id: ArcStr,
	pub bind_address: ArcStr,
	pub http_port: Option<u16>,
	pub https_port: Option<u16>,
	pub tls: Option<TlsMaterial>,
	pub read_timeout_ms: u64,
	pub write_timeout_ms: u64,
	pub idle_timeout_ms: u64,
	pub graceful_shutdown_timeout_ms: u64,
	pub max_connections: u32,
	pub max_workers: u32,
	pub keep_alive: bool,
	pub cipher_policy: Option<String>,
	pub tls_version_policy: Option<String>,
	pub log_config_id: Option<ArcStr>,
	pub health_status: HealthStatus,
	/// Instance-wide default, overridden per-route when a [`Route`](crate::model::route::Route)
	/// carries its own `security`.
	pub security: Option<SecurityConfig>,
	pub auth: Option<AuthConfig>,
	pub cors: Option<CorsConfig>,
	pub rate_limit: Option<RateLimitConfig>,
}

impl GatewayInstance {
	/// `bindAddress:httpsPort` if TLS else `bindAddress:httpPort` else
	/// `bindAddress:8080`.
	pub fn listen_address(&self) -> String {
		if self.tls.is_some() {
			if let Some(port) = self.https_port {
				return format!("{}:{}", self.bind_address, port);
			}
		}
		if let Some(port) = self.http_port {
			return format!("{}:{}", self.bind_address, port);
		}
		format!("{}:8080", self.bind_address)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn instance(tls: bool, https_port: Option<u16>, http_port: Option<u16>) -> GatewayInstance {
		GatewayInstance {
			id: "i1".into(),
			tenant_id: "t1".into(),
			bind_address: "0.0.0.0".into(),
			http_port,
			https_port,
			tls: tls.then(|| TlsMaterial::Inline {
				cert_content: String::new(),
				key_content: String::new(),
				password: None,
			}),
			read_timeout_ms: 0,
			write_timeout_ms: 0,
			idle_timeout_ms: 0,
			graceful_shutdown_timeout_ms: 0,
			max_connections: 0,
			max_workers: 0,
			keep_alive: true,
			cipher_policy: None,
			tls_version_policy: None,
			log_config_id: None,
			health_status: HealthStatus::Unknown,
			security: None,
			auth: None,
			cors: None,
			rate_limit: None,
		}
	}

	#[test]
	fn listen_address_prefers_https_when_tls() {
		assert_eq!(instance(true, Some(8443), Some(8080)).listen_address(), "0.0.0.0:8443");
	}

	#[test]
	fn listen_address_falls_back_to_http() {
		assert_eq!(instance(false, Some(8443), Some(8080)).listen_address(), "0.0.0.0:8080");
	}

	#[test]
	fn listen_address_defaults_to_8080() {
		assert_eq!(instance(false, None, None).listen_address(), "0.0.0.0:8080");
	}
}
