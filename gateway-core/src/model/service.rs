use arcstr::ArcStr;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::AtomicU64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProxyType {
	Http,
	Tcp,
	Udp,
	WebSocket,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
	pub proxy_type: ProxyType,
	pub config: HashMap<String, serde_json::Value>,
	pub services: Vec<ServiceConfig>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum LoadBalanceStrategy {
	RoundRobin,
	WeightedRoundRobin,
	Random,
	LeastConn,
	IpHash,
	ConsistentHash,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckConfig {
	pub enabled: bool,
	pub path: ArcStr,
	pub method: ArcStr,
	pub interval_seconds: u64,
	pub timeout_ms: u64,
	pub healthy_threshold: u32,
	pub unhealthy_threshold: u32,
	pub expected_status_codes: Vec<u16>,
	pub headers: HashMap<String, String>,
}

impl Default for HealthCheckConfig {
	fn default() -> Self {
		Self {
			enabled: false,
			path: ArcStr::from("/"),
			method: ArcStr::from("GET"),
			interval_seconds: 10,
			timeout_ms: 2000,
			healthy_threshold: 2,
			unhealthy_threshold: 3,
			expected_status_codes: vec![200],
			headers: HashMap::new(),
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
	pub id: ArcStr,
	pub name: ArcStr,
	pub load_balance_strategy: LoadBalanceStrategy,
	pub discovery_type: ArcStr,
	pub discovery_config: HashMap<String, serde_json::Value>,
	pub session_affinity: bool,
	pub sticky_session: bool,
	pub max_retries: u32,
	pub retry_timeout_ms: u64,
	pub circuit_breaker_enabled: bool,
	pub health_check: HealthCheckConfig,
	pub nodes: Vec<NodeConfig>,
	/// Round-robin cursor; `Default` because the snapshot is rebuilt wholesale
	/// on every reload and there is no meaningful "previous" counter to carry.
	#[serde(skip, default)]
	pub round_robin_cursor: std::sync::Arc<AtomicU64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstanceStatus {
	Up,
	Down,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
	pub id: ArcStr,
	pub url: ArcStr,
	pub host: ArcStr,
	pub port: u16,
	pub protocol: ArcStr,
	pub weight: u32,
	pub healthy: bool,
	pub enabled: bool,
	pub metadata: HashMap<String, String>,
	pub last_beat_time: chrono::DateTime<chrono::Utc>,
	pub ephemeral: bool,
	pub instance_status: InstanceStatus,
	/// In-flight request count, used by the `LeastConn` strategy.
	#[serde(skip, default)]
	pub in_flight: std::sync::Arc<AtomicU64>,
}

impl NodeConfig {
	pub fn is_available(&self) -> bool {
		self.enabled && self.healthy && self.instance_status == InstanceStatus::Up
	}

	pub fn base_url(&self) -> String {
		format!("{}://{}:{}", self.protocol, self.host, self.port)
	}
}
