use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use gateway_core::model::{LoadBalanceStrategy, NodeConfig, ServiceConfig};
use parking_lot::Mutex;
use rand::Rng;

const CONSISTENT_HASH_VNODES: u32 = 160;

/// Holds the mutable state load balancing needs beyond what the immutable
/// config snapshot carries: Nginx-style smooth-weighted-round-robin
/// counters, keyed by service id. `RoundRobin` and `LeastConn`
/// instead use the atomics already embedded in
/// [`ServiceConfig::round_robin_cursor`] / [`NodeConfig::in_flight`], since
/// those survive exactly as long as the snapshot they belong to.
#[derive(Default)]
pub struct Resolver {
	smooth_weighted: flurry::HashMap<String, Arc<Mutex<HashMap<String, i64>>>>,
}

impl Resolver {
	pub fn new() -> Self {
		Self::default()
	}

	/// Picks a healthy node from `service` per its configured strategy.
	/// `client_ip` feeds `IpHash`; `hash_key` (e.g. a header value or path)
	/// feeds `ConsistentHash`.
	pub fn select<'a>(&self, service: &'a ServiceConfig, client_ip: Option<IpAddr>, hash_key: Option<&str>) -> Option<&'a NodeConfig> {
		let healthy: Vec<&NodeConfig> = service.nodes.iter().filter(|n| available(n, &service.health_check)).collect();
		if healthy.is_empty() {
			return None;
		}
		match service.load_balance_strategy {
			LoadBalanceStrategy::RoundRobin => {
				let idx = service.round_robin_cursor.fetch_add(1, Ordering::Relaxed) as usize % healthy.len();
				Some(healthy[idx])
			},
			LoadBalanceStrategy::WeightedRoundRobin => self.smooth_weighted_pick(&service.id, &healthy),
			LoadBalanceStrategy::Random => {
				let idx = rand::rng().random_range(0..healthy.len());
				Some(healthy[idx])
			},
			LoadBalanceStrategy::LeastConn => healthy
				.into_iter()
				.min_by_key(|n| (n.in_flight.load(Ordering::Relaxed), std::cmp::Reverse(n.weight)))
				,
			LoadBalanceStrategy::IpHash => {
				let ip = client_ip?;
				let hash = fnv1a(ip.to_string().as_bytes());
				Some(healthy[(hash as usize) % healthy.len()])
			},
			LoadBalanceStrategy::ConsistentHash => consistent_hash_pick(&healthy, hash_key.unwrap_or_default()),
		}
	}

	/// Nginx's smooth weighted round robin: each node accrues `weight` every
	/// tick; the node with the highest running total is chosen and then
	/// debited by the sum of all weights.
	fn smooth_weighted_pick<'a>(&self, service_id: &str, healthy: &[&'a NodeConfig]) -> Option<&'a NodeConfig> {
		let guard = self.smooth_weighted.guard();
		let state = match self.smooth_weighted.get(service_id, &guard) {
			Some(existing) => existing.clone(),
			None => {
				let fresh = Arc::new(Mutex::new(HashMap::new()));
				match self.smooth_weighted.try_insert(service_id.to_string(), fresh.clone(), &guard) {
					Ok(_) => fresh,
					Err(e) => e.current.clone(),
				}
			},
		};
		let mut current_weights = state.lock();
		let total_weight: i64 = healthy.iter().map(|n| n.weight as i64).sum();
		if total_weight == 0 {
			return healthy.first().copied();
		}
		let mut best: Option<(&&NodeConfig, i64)> = None;
		for node in healthy {
			let entry = current_weights.entry(node.id.to_string()).or_insert(0);
			*entry += node.weight as i64;
			if best.map(|(_, w)| *entry > w).unwrap_or(true) {
				best = Some((node, *entry));
			}
		}
		let (chosen, _) = best?;
		if let Some(entry) = current_weights.get_mut(chosen.id.as_str()) {
			*entry -= total_weight;
		}
		Some(*chosen)
	}
}

/// Evaluated fresh on every selection rather than mutated by a background
/// sweeper: the config snapshot is immutable, so "eviction" of a stale or
/// `healthy=false` node is just exclusion from this filter.
/// Ephemeral nodes past `2 × healthCheckIntervalSeconds` since their last
/// heartbeat are treated as evicted (excluded); persistent ones are kept
/// in the node list but still excluded from selection.
fn available(node: &NodeConfig, health_check: &gateway_core::model::HealthCheckConfig) -> bool {
	if !node.is_available() {
		return false;
	}
	let interval = health_check.interval_seconds.max(1);
	let staleness = chrono::Utc::now().signed_duration_since(node.last_beat_time);
	staleness <= chrono::Duration::seconds((interval * 2) as i64)
}

fn fnv1a(bytes: &[u8]) -> u64 {
	const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
	const PRIME: u64 = 0x100000001b3;
	let mut hash = OFFSET_BASIS;
	for byte in bytes {
		hash ^= *byte as u64;
		hash = hash.wrapping_mul(PRIME);
	}
	hash
}

fn consistent_hash_pick<'a>(healthy: &[&'a NodeConfig], key: &str) -> Option<&'a NodeConfig> {
	if healthy.is_empty() {
		return None;
	}
	let mut ring: Vec<(u64, usize)> = Vec::with_capacity(healthy.len() * CONSISTENT_HASH_VNODES as usize);
	for (idx, node) in healthy.iter().enumerate() {
		for vnode in 0..CONSISTENT_HASH_VNODES {
			let label = format!("{}-{vnode}", node.id);
			ring.push((fnv1a(label.as_bytes()), idx));
		}
	}
	ring.sort_by_key(|(hash, _)| *hash);
	let key_hash = fnv1a(key.as_bytes());
	let pos = ring.partition_point(|(hash, _)| *hash < key_hash);
	let (_, idx) = ring[pos % ring.len()];
	Some(healthy[idx])
}

#[cfg(test)]
mod tests {
	use super::*;
	use gateway_core::model::{HealthCheckConfig, InstanceStatus};
	use std::sync::atomic::AtomicU64;

	fn node(id: &str, weight: u32) -> NodeConfig {
		NodeConfig {
			id: id.into(),
			url: format!("http://{id}").into(),
			host: id.into(),
			port: 80,
			protocol: "http".into(),
			weight,
			healthy: true,
			enabled: true,
			metadata: HashMap::new(),
			last_beat_time: chrono::Utc::now(),
			ephemeral: false,
			instance_status: InstanceStatus::Up,
			in_flight: Arc::new(AtomicU64::new(0)),
		}
	}

	fn service(strategy: LoadBalanceStrategy, nodes: Vec<NodeConfig>) -> ServiceConfig {
		ServiceConfig {
			id: "svc-1".into(),
			name: "svc".into(),
			load_balance_strategy: strategy,
			discovery_type: "static".into(),
			discovery_config: HashMap::new(),
			session_affinity: false,
			sticky_session: false,
			max_retries: 0,
			retry_timeout_ms: 0,
			circuit_breaker_enabled: false,
			health_check: HealthCheckConfig::default(),
			nodes,
			round_robin_cursor: Arc::new(AtomicU64::new(0)),
		}
	}

	#[test]
	fn round_robin_cycles_through_nodes() {
		let svc = service(LoadBalanceStrategy::RoundRobin, vec![node("a", 1), node("b", 1)]);
		let resolver = Resolver::new();
		let first = resolver.select(&svc, None, None).unwrap().id.clone();
		let second = resolver.select(&svc, None, None).unwrap().id.clone();
		assert_ne!(first, second);
	}

	#[test]
	fn least_conn_prefers_idle_node() {
		let busy = node("busy", 1);
		busy.in_flight.store(5, Ordering::Relaxed);
		let idle = node("idle", 1);
		let svc = service(LoadBalanceStrategy::LeastConn, vec![busy, idle]);
		let resolver = Resolver::new();
		let chosen = resolver.select(&svc, None, None).unwrap();
		assert_eq!(chosen.id.as_str(), "idle");
	}

	#[test]
	fn ip_hash_is_deterministic_for_same_ip() {
		let svc = service(LoadBalanceStrategy::IpHash, vec![node("a", 1), node("b", 1), node("c", 1)]);
		let resolver = Resolver::new();
		let ip: IpAddr = "10.0.0.7".parse().unwrap();
		let a = resolver.select(&svc, Some(ip), None).unwrap().id.clone();
		let b = resolver.select(&svc, Some(ip), None).unwrap().id.clone();
		assert_eq!(a, b);
	}

	#[test]
	fn consistent_hash_is_deterministic_for_same_key() {
		let svc = service(LoadBalanceStrategy::ConsistentHash, vec![node("a", 1), node("b", 1)]);
		let resolver = Resolver::new();
		let a = resolver.select(&svc, None, Some("/users/42")).unwrap().id.clone();
		let b = resolver.select(&svc, None, Some("/users/42")).unwrap().id.clone();
		assert_eq!(a, b);
	}

	#[test]
	fn unavailable_nodes_are_excluded() {
		let mut down = node("down", 1);
		down.healthy = false;
		let svc = service(LoadBalanceStrategy::RoundRobin, vec![down, node("up", 1)]);
		let resolver = Resolver::new();
		let chosen = resolver.select(&svc, None, None).unwrap();
		assert_eq!(chosen.id.as_str(), "up");
	}
}
