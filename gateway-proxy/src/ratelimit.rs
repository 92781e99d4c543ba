use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use gateway_core::model::{KeyStrategy, RateLimitAlgorithm, RateLimitConfig};
use gateway_core::GatewayError;
use http::HeaderMap;
use parking_lot::Mutex;

#[derive(Debug)]
enum BucketState {
	Token { tokens: f64, last_refill: Instant },
	Leaky { level: f64, last_leak: Instant },
	Sliding { current: u64, previous: u64, window_start: Instant },
}

/// Per-key rate-limiter state, sharded by the derived key so unrelated
/// clients/routes never contend on the same lock.
pub struct RateLimiter {
	buckets: flurry::HashMap<String, Arc<Mutex<BucketState>>>,
}

impl Default for RateLimiter {
	fn default() -> Self {
		Self::new()
	}
}

impl RateLimiter {
	pub fn new() -> Self {
		Self { buckets: flurry::HashMap::new() }
	}

	/// Derives the bucket key per `config.keyStrategy`, then evaluates the
	/// configured algorithm against that bucket's shared state.
	pub fn check(
		&self,
		config: &RateLimitConfig,
		route_id: &str,
		client_ip: Option<IpAddr>,
		user_id: Option<&str>,
		headers: &HeaderMap,
	) -> Result<(), GatewayError> {
		let key = derive_key(&config.key_strategy, route_id, client_ip, user_id, headers);
		let bucket = self.bucket_for(&key, config.algorithm, config.burst);
		let mut state = bucket.lock();
		let allowed = match (&mut *state, config.algorithm) {
			(BucketState::Token { tokens, last_refill }, RateLimitAlgorithm::TokenBucket) => {
				refill_token_bucket(tokens, last_refill, config.rate, config.burst as f64);
				if *tokens >= 1.0 {
					*tokens -= 1.0;
					true
				} else {
					false
				}
			},
			(BucketState::Leaky { level, last_leak }, RateLimitAlgorithm::LeakyBucket) => {
				leak(level, last_leak, config.rate);
				if *level < config.burst as f64 {
					*level += 1.0;
					true
				} else {
					false
				}
			},
			(BucketState::Sliding { current, previous, window_start }, RateLimitAlgorithm::SlidingWindow) => {
				slide_window(current, previous, window_start, config.time_window_seconds);
				let limit = config.rate * config.time_window_seconds as f64;
				let elapsed = window_start.elapsed().as_secs_f64();
				let window_len = (config.time_window_seconds.max(1)) as f64;
				let weight = 1.0 - (elapsed / window_len).min(1.0);
				let estimate = (*previous as f64) * weight + (*current as f64);
				if estimate < limit {
					*current += 1;
					true
				} else {
					false
				}
			},
			_ => true,
		};
		if allowed {
			Ok(())
		} else {
			Err(GatewayError::RateLimited)
		}
	}

	fn bucket_for(&self, key: &str, algorithm: RateLimitAlgorithm, burst: u64) -> Arc<Mutex<BucketState>> {
		let guard = self.buckets.guard();
		if let Some(existing) = self.buckets.get(key, &guard) {
			return existing.clone();
		}
		let fresh = Arc::new(Mutex::new(initial_state(algorithm, burst)));
		match self.buckets.try_insert(key.to_string(), fresh.clone(), &guard) {
			Ok(_) => fresh,
			Err(e) => e.current.clone(),
		}
	}
}

/// A brand-new `TokenBucket` starts full (`tokens: burst`) so the first
/// burst of requests against a never-seen key is admitted immediately,
/// rather than having to wait for the refill rate to fill an empty bucket.
fn initial_state(algorithm: RateLimitAlgorithm, burst: u64) -> BucketState {
	let now = Instant::now();
	match algorithm {
		RateLimitAlgorithm::TokenBucket => BucketState::Token { tokens: burst as f64, last_refill: now },
		RateLimitAlgorithm::LeakyBucket => BucketState::Leaky { level: 0.0, last_leak: now },
		RateLimitAlgorithm::SlidingWindow => BucketState::Sliding { current: 0, previous: 0, window_start: now },
	}
}

fn refill_token_bucket(tokens: &mut f64, last_refill: &mut Instant, rate: f64, burst: f64) {
	let now = Instant::now();
	let elapsed = now.duration_since(*last_refill).as_secs_f64();
	*tokens = (*tokens + elapsed * rate).min(burst);
	*last_refill = now;
}

fn leak(level: &mut f64, last_leak: &mut Instant, rate: f64) {
	let now = Instant::now();
	let elapsed = now.duration_since(*last_leak).as_secs_f64();
	*level = (*level - elapsed * rate).max(0.0);
	*last_leak = now;
}

fn slide_window(current: &mut u64, previous: &mut u64, window_start: &mut Instant, window_seconds: u64) {
	let window = std::time::Duration::from_secs(window_seconds.max(1));
	let now = Instant::now();
	if now.duration_since(*window_start) >= window {
		*previous = *current;
		*current = 0;
		*window_start = now;
	}
}

fn derive_key(strategy: &KeyStrategy, route_id: &str, client_ip: Option<IpAddr>, user_id: Option<&str>, headers: &HeaderMap) -> String {
	match strategy {
		KeyStrategy::ClientIp => format!("ip:{}", client_ip.map(|ip| ip.to_string()).unwrap_or_default()),
		KeyStrategy::UserId => format!("user:{}", user_id.unwrap_or("anonymous")),
		KeyStrategy::RouteId => format!("route:{route_id}"),
		KeyStrategy::RouteIdClientIp => format!("route:{route_id}:ip:{}", client_ip.map(|ip| ip.to_string()).unwrap_or_default()),
		KeyStrategy::Header { name } => {
			let value = headers.get(name.as_str()).and_then(|v| v.to_str().ok()).unwrap_or("");
			format!("header:{name}:{value}")
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn config(algorithm: RateLimitAlgorithm, rate: f64, burst: u64) -> RateLimitConfig {
		RateLimitConfig {
			algorithm,
			rate,
			burst,
			time_window_seconds: 1,
			key_strategy: KeyStrategy::ClientIp,
			rejection_status_code: 429,
			rejection_message: "too many requests".into(),
			custom: Default::default(),
		}
	}

	#[test]
	fn token_bucket_rejects_once_exhausted() {
		let limiter = RateLimiter::new();
		let cfg = config(RateLimitAlgorithm::TokenBucket, 0.0, 1);
		let ip = Some("1.1.1.1".parse().unwrap());
		assert!(limiter.check(&cfg, "r1", ip, None, &HeaderMap::new()).is_ok());
		assert!(limiter.check(&cfg, "r1", ip, None, &HeaderMap::new()).is_err());
	}

	#[test]
	fn token_bucket_fresh_key_admits_full_burst() {
		let limiter = RateLimiter::new();
		let cfg = config(RateLimitAlgorithm::TokenBucket, 0.0, 2);
		let ip = Some("4.4.4.4".parse().unwrap());
		assert!(limiter.check(&cfg, "r1", ip, None, &HeaderMap::new()).is_ok());
		assert!(limiter.check(&cfg, "r1", ip, None, &HeaderMap::new()).is_ok());
		assert!(limiter.check(&cfg, "r1", ip, None, &HeaderMap::new()).is_err());
		assert!(limiter.check(&cfg, "r1", ip, None, &HeaderMap::new()).is_err());
	}

	#[test]
	fn distinct_keys_get_distinct_buckets() {
		let limiter = RateLimiter::new();
		let cfg = config(RateLimitAlgorithm::TokenBucket, 0.0, 1);
		let a = Some("1.1.1.1".parse().unwrap());
		let b = Some("2.2.2.2".parse().unwrap());
		assert!(limiter.check(&cfg, "r1", a, None, &HeaderMap::new()).is_ok());
		assert!(limiter.check(&cfg, "r1", b, None, &HeaderMap::new()).is_ok());
	}

	#[test]
	fn leaky_bucket_rejects_on_overflow() {
		let limiter = RateLimiter::new();
		let cfg = config(RateLimitAlgorithm::LeakyBucket, 0.0, 1);
		let ip = Some("3.3.3.3".parse().unwrap());
		assert!(limiter.check(&cfg, "r1", ip, None, &HeaderMap::new()).is_ok());
		assert!(limiter.check(&cfg, "r1", ip, None, &HeaderMap::new()).is_err());
	}
}
