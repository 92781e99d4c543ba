use base64::Engine;
use gateway_core::model::{AuthConfig, AuthMode, AuthStrategy};
use gateway_core::GatewayError;
use http::HeaderMap;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Deserialize, Default)]
struct JwtParams {
	#[serde(default)]
	secret: Option<String>,
	#[serde(default = "default_algorithm")]
	algorithm: String,
}

fn default_algorithm() -> String {
	"HS256".to_string()
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ApiKeyParams {
	#[serde(default = "default_api_key_header")]
	header_name: String,
	#[serde(default)]
	valid_keys: Vec<String>,
}

fn default_api_key_header() -> String {
	"x-api-key".to_string()
}

#[derive(Deserialize, Default)]
struct BasicParams {
	#[serde(default)]
	credentials: HashMap<String, String>,
}

/// Authenticates a request against `config.strategy`. `NoAuth`
/// and `Disabled` always pass; excluded paths are skipped before the
/// strategy runs at all.
pub fn authenticate(config: &AuthConfig, path: &str, headers: &HeaderMap) -> Result<(), GatewayError> {
	if config.mode == AuthMode::Disabled || config.strategy == AuthStrategy::NoAuth {
		return Ok(());
	}
	if config.path_excluded(path) {
		return Ok(());
	}
	let result = match config.strategy {
		AuthStrategy::NoAuth => Ok(()),
		AuthStrategy::Jwt => authenticate_jwt(config, headers),
		AuthStrategy::ApiKey => authenticate_api_key(config, headers),
		AuthStrategy::OAuth2 => authenticate_bearer_opaque(headers),
		AuthStrategy::Basic => authenticate_basic(config, headers),
	};
	match result {
		Ok(()) => Ok(()),
		Err(()) if config.mode == AuthMode::Optional => Ok(()),
		Err(()) => Err(GatewayError::AuthFailed(format!("{:?} strategy rejected the request", config.strategy))),
	}
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
	headers
		.get(http::header::AUTHORIZATION)
		.and_then(|v| v.to_str().ok())
		.and_then(|v| v.strip_prefix("Bearer "))
}

fn authenticate_jwt(config: &AuthConfig, headers: &HeaderMap) -> Result<(), ()> {
	let token = bearer_token(headers).ok_or(())?;
	let params: JwtParams = params(config);
	let secret = params.secret.ok_or(())?;
	let secret = SecretString::from(secret);
	let algorithm: Algorithm = params.algorithm.parse().map_err(|_| ())?;
	let key = DecodingKey::from_secret(secret.expose_secret().as_bytes());
	let validation = Validation::new(algorithm);
	jsonwebtoken::decode::<HashMap<String, serde_json::Value>>(token, &key, &validation)
		.map(|_| ())
		.map_err(|_| ())
}

fn authenticate_api_key(config: &AuthConfig, headers: &HeaderMap) -> Result<(), ()> {
	let params: ApiKeyParams = params(config);
	let provided = headers
		.get(params.header_name.as_str())
		.and_then(|v| v.to_str().ok())
		.ok_or(())?;
	if params.valid_keys.iter().any(|k| k == provided) {
		Ok(())
	} else {
		Err(())
	}
}

/// OAuth2 here means "accept any well-formed bearer token and defer the
/// introspection call to upstream" (spec leaves token-validation internals
/// unspecified for this strategy) — we only check presence.
fn authenticate_bearer_opaque(headers: &HeaderMap) -> Result<(), ()> {
	bearer_token(headers).map(|_| ()).ok_or(())
}

fn authenticate_basic(config: &AuthConfig, headers: &HeaderMap) -> Result<(), ()> {
	let raw = headers
		.get(http::header::AUTHORIZATION)
		.and_then(|v| v.to_str().ok())
		.and_then(|v| v.strip_prefix("Basic "))
		.ok_or(())?;
	let decoded = base64::engine::general_purpose::STANDARD.decode(raw).map_err(|_| ())?;
	let decoded = String::from_utf8(decoded).map_err(|_| ())?;
	let (user, pass) = decoded.split_once(':').ok_or(())?;
	let params: BasicParams = params(config);
	match params.credentials.get(user) {
		Some(expected) if expected == pass => Ok(()),
		_ => Err(()),
	}
}

fn params<T: for<'de> Deserialize<'de> + Default>(config: &AuthConfig) -> T {
	serde_json::to_value(&config.config)
		.ok()
		.and_then(|v| serde_json::from_value(v).ok())
		.unwrap_or_default()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn config_with(strategy: AuthStrategy, mode: AuthMode, params: serde_json::Value) -> AuthConfig {
		let config: HashMap<String, serde_json::Value> = match params {
			serde_json::Value::Object(m) => m.into_iter().collect(),
			_ => HashMap::new(),
		};
		AuthConfig {
			strategy,
			mode,
			config,
			..Default::default()
		}
	}

	#[test]
	fn no_auth_always_passes() {
		let cfg = AuthConfig::default();
		assert!(authenticate(&cfg, "/", &HeaderMap::new()).is_ok());
	}

	#[test]
	fn excluded_path_skips_auth() {
		let mut cfg = config_with(AuthStrategy::ApiKey, AuthMode::Required, serde_json::json!({}));
		cfg.excluded_paths = vec!["/public/*".into()];
		assert!(authenticate(&cfg, "/public/health", &HeaderMap::new()).is_ok());
	}

	#[test]
	fn api_key_rejects_missing_header() {
		let cfg = config_with(
			AuthStrategy::ApiKey,
			AuthMode::Required,
			serde_json::json!({"headerName": "x-api-key", "validKeys": ["secret"]}),
		);
		let err = authenticate(&cfg, "/", &HeaderMap::new());
		assert!(matches!(err, Err(GatewayError::AuthFailed(_))));
	}

	#[test]
	fn api_key_accepts_valid_key() {
		let cfg = config_with(
			AuthStrategy::ApiKey,
			AuthMode::Required,
			serde_json::json!({"headerName": "x-api-key", "validKeys": ["secret"]}),
		);
		let mut headers = HeaderMap::new();
		headers.insert("x-api-key", "secret".parse().unwrap());
		assert!(authenticate(&cfg, "/", &headers).is_ok());
	}

	#[test]
	fn optional_mode_tolerates_failure() {
		let cfg = config_with(
			AuthStrategy::ApiKey,
			AuthMode::Optional,
			serde_json::json!({"headerName": "x-api-key", "validKeys": ["secret"]}),
		);
		assert!(authenticate(&cfg, "/", &HeaderMap::new()).is_ok());
	}

	#[test]
	fn basic_auth_accepts_matching_credentials() {
		let cfg = config_with(
			AuthStrategy::Basic,
			AuthMode::Required,
			serde_json::json!({"credentials": {"alice": "wonderland"}}),
		);
		let mut headers = HeaderMap::new();
		let encoded = base64::engine::general_purpose::STANDARD.encode("alice:wonderland");
		headers.insert(http::header::AUTHORIZATION, format!("Basic {encoded}").parse().unwrap());
		assert!(authenticate(&cfg, "/", &headers).is_ok());
	}
}
