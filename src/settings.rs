//! Declarative boot settings: which tenant/instance pairs this process
//! serves, where the store lives, and where metrics are exposed. There is
//! no admin API for registering instances dynamically, so the set of
//! instances to start is named up front in a config file instead.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRef {
	pub tenant_id: String,
	pub instance_id: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
	pub database_url: String,
	#[serde(default = "default_max_db_connections")]
	pub max_db_connections: u32,
	#[serde(default = "default_metrics_addr")]
	pub metrics_addr: SocketAddr,
	/// How often a running instance re-fetches its config and swaps the
	/// snapshot. The admin API that would push reload
	/// notifications is out of scope, so this is a poll.
	#[serde(default = "default_reload_interval_secs")]
	pub reload_interval_secs: u64,
	pub instances: Vec<InstanceRef>,
}

fn default_max_db_connections() -> u32 {
	10
}

fn default_metrics_addr() -> SocketAddr {
	"0.0.0.0:19000".parse().unwrap()
}

fn default_reload_interval_secs() -> u64 {
	30
}

impl Settings {
	pub async fn load(path: &Path) -> anyhow::Result<Self> {
		let raw = tokio::fs::read_to_string(path).await?;
		Ok(serde_yaml::from_str(&raw)?)
	}

	pub fn reload_interval(&self) -> Duration {
		Duration::from_secs(self.reload_interval_secs.max(1))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_minimal_settings() {
		let yaml = r#"
databaseUrl: postgres://localhost/gateway
instances:
  - tenantId: tenant-a
    instanceId: inst-1
"#;
		let settings: Settings = serde_yaml::from_str(yaml).unwrap();
		assert_eq!(settings.instances.len(), 1);
		assert_eq!(settings.max_db_connections, 10);
		assert_eq!(settings.metrics_addr, "0.0.0.0:19000".parse::<SocketAddr>().unwrap());
	}
}
