pub mod common;
pub mod instance;
pub mod log;
pub mod route;
pub mod security;
pub mod service;

pub use common::{AccessPolicy, ActiveFlag, Audit, parse_array};
pub use instance::{GatewayInstance, HealthStatus, TlsMaterial};
pub use log::{AccessLog, AlertConfig, BackendTraceLog, LogConfig, LogFormat, OutputTarget, RotationPattern, StatusClass};
pub use route::{AssertionGroup, AssertionOperator, AssertionType, Filter, FilterAction, MatchType, Route, RouteAssertion, RouterConfig, sort_filters};
pub use security::{ApiAccess, AuthConfig, AuthMode, AuthStrategy, CorsConfig, DomainAccess, IpAccess, KeyStrategy, RateLimitAlgorithm, RateLimitConfig, SecurityConfig, UaPattern, UserAgentAccess};
pub use service::{HealthCheckConfig, InstanceStatus, LoadBalanceStrategy, NodeConfig, ProxyConfig, ProxyType, ServiceConfig};

use arcstr::ArcStr;

/// The immutable, versioned composite produced by the config loader and
/// read by every other component. One snapshot == one `(tenantId,
/// instanceId)` load.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
	pub instance: GatewayInstance,
	pub router: RouterConfig,
	pub routes: Vec<Route>,
	pub global_filters: Vec<Filter>,
	pub proxy: Option<ProxyConfig>,
	pub log_config: LogConfig,
	pub loaded_at: chrono::DateTime<chrono::Utc>,
}

impl GatewayConfig {
	pub fn service(&self, id: &str) -> Option<&ServiceConfig> {
		self
			.proxy
			.as_ref()
			.and_then(|p| p.services.iter().find(|s| s.id.as_str() == id))
	}

	pub fn route(&self, id: &ArcStr) -> Option<&Route> {
		self.routes.iter().find(|r| &r.id == id)
	}
}
