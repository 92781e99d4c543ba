use rand::RngCore;

/// 32-char random hex identifier correlating one client request end to end.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TraceId(String);

/// Correlates one forwarded backend attempt to its owning [`TraceId`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct BackendTraceId(String);

fn random_hex32() -> String {
	let mut bytes = [0u8; 16];
	rand::rng().fill_bytes(&mut bytes);
	hex::encode(bytes)
}

impl TraceId {
	pub fn new() -> Self {
		Self(random_hex32())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl Default for TraceId {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Display for TraceId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.0)
	}
}

impl BackendTraceId {
	pub fn new() -> Self {
		Self(random_hex32())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl Default for BackendTraceId {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Display for BackendTraceId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn trace_ids_are_32_hex_chars() {
		let id = TraceId::new();
		assert_eq!(id.as_str().len(), 32);
		assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
	}

	#[test]
	fn trace_ids_are_unique() {
		assert_ne!(TraceId::new(), TraceId::new());
	}
}
