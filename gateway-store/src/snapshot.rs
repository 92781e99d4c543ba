use std::sync::Arc;

use arc_swap::ArcSwap;
use gateway_core::model::GatewayConfig;

/// The atomically-swapped pointer described in "Shared access to the
/// snapshot": readers `load()` a cheap `Arc` clone and keep it for the
/// lifetime of one request; `Reload` calls `store()` with a freshly loaded
/// config and in-flight readers are unaffected.
#[derive(Clone)]
pub struct ConfigSnapshot(Arc<ArcSwap<GatewayConfig>>);

impl ConfigSnapshot {
	pub fn new(initial: GatewayConfig) -> Self {
		Self(Arc::new(ArcSwap::from_pointee(initial)))
	}

	pub fn load(&self) -> Arc<GatewayConfig> {
		self.0.load_full()
	}

	pub fn store(&self, updated: GatewayConfig) {
		self.0.store(Arc::new(updated));
	}
}
