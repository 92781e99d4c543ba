//! `LoadGatewayConfig(tenantId, instanceId)`.
//!
//! Every query here is tenant-scoped by a leading `tenant_id = $1` predicate
//! and filtered to `active_flag = 'Y'`; "highest priority row" selection is
//! `ORDER BY config_priority ASC, add_time ASC LIMIT 1` pushed into SQL
//! rather than pulled client-side, matching the `karateway` config-loader
//! pattern this crate is grounded on.

use std::path::PathBuf;

use gateway_core::model::{Filter, GatewayConfig, GatewayInstance, HealthStatus, SecurityConfig, TlsMaterial};
use sqlx::PgPool;

use crate::convert;
use crate::error::StoreError;
use crate::rows::*;
use crate::tls::materialize_cert;

pub struct ConfigLoader {
	pool: PgPool,
	cert_dir: PathBuf,
}

impl ConfigLoader {
	pub fn new(pool: PgPool) -> Self {
		Self::with_cert_dir(pool, PathBuf::from("tmp/gateway-certs"))
	}

	pub fn with_cert_dir(pool: PgPool, cert_dir: PathBuf) -> Self {
		Self { pool, cert_dir }
	}

	pub async fn load(&self, tenant_id: &str, instance_id: &str) -> Result<GatewayConfig, StoreError> {
		// Step 1: active instance, or fail.
		let instance_row = sqlx::query_as::<_, InstanceRow>(
			"SELECT * FROM hub_gw_instance WHERE tenant_id = $1 AND id = $2 AND active_flag = 'Y'",
		)
		.bind(tenant_id)
		.bind(instance_id)
		.fetch_optional(&self.pool)
		.await?
		.ok_or_else(|| StoreError::InstanceNotFound {
			tenant_id: tenant_id.to_string(),
			instance_id: instance_id.to_string(),
		})?;

		// Step 2: TLS material, materialized to disk if DB-stored.
		let tls = self.load_tls(tenant_id, instance_id, &instance_row).await?;

		// Instance-wide security/auth/cors/rate-limit defaults, keyed by the
		// instance's own id the same way a route is keyed by its own id.
		let security = self.load_security(tenant_id, instance_id).await?;
		let auth = self.load_auth(tenant_id, instance_id).await?;
		let cors = self.load_cors(tenant_id, instance_id).await?;
		let rate_limit = self.load_rate_limit(tenant_id, instance_id).await?;

		let instance = GatewayInstance {
			id: instance_row.id.clone().into(),
			tenant_id: tenant_id.into(),
			bind_address: instance_row.bind_address.into(),
			http_port: instance_row.http_port.map(|p| p as u16),
			https_port: instance_row.https_port.map(|p| p as u16),
			tls,
			read_timeout_ms: instance_row.read_timeout_ms.max(0) as u64,
			write_timeout_ms: instance_row.write_timeout_ms.max(0) as u64,
			idle_timeout_ms: instance_row.idle_timeout_ms.max(0) as u64,
			graceful_shutdown_timeout_ms: instance_row.graceful_shutdown_timeout_ms.max(0) as u64,
			max_connections: instance_row.max_connections.max(0) as u32,
			max_workers: instance_row.max_workers.max(0) as u32,
			keep_alive: instance_row.keep_alive,
			cipher_policy: instance_row.cipher_policy.clone(),
			tls_version_policy: instance_row.tls_version_policy.clone(),
			log_config_id: instance_row.log_config_id.clone().map(Into::into),
			health_status: HealthStatus::Unknown,
			security,
			auth,
			cors,
			rate_limit,
		};

		// Step 3: highest-priority router config, or the process default.
		let router_row = sqlx::query_as::<_, RouterConfigRow>(
			"SELECT * FROM hub_gw_router_config WHERE tenant_id = $1 AND gateway_instance_id = $2 \
			 AND active_flag = 'Y' ORDER BY default_priority ASC, add_time ASC LIMIT 1",
		)
		.bind(tenant_id)
		.bind(instance_id)
		.fetch_optional(&self.pool)
		.await?;
		let router = convert::router_config(router_row);

		// Step 4-6: routes, each with its assertion group and filters.
		let route_rows = sqlx::query_as::<_, RouteRow>(
			"SELECT * FROM hub_gw_route_config WHERE tenant_id = $1 AND gateway_instance_id = $2 \
			 AND active_flag = 'Y' ORDER BY priority ASC, add_time ASC",
		)
		.bind(tenant_id)
		.bind(instance_id)
		.fetch_all(&self.pool)
		.await?;

		let mut routes = Vec::with_capacity(route_rows.len());
		for route_row in route_rows {
			let assertions = sqlx::query_as::<_, RouteAssertionRow>(
				"SELECT * FROM hub_gw_route_assertion WHERE route_config_id = $1 ORDER BY assertion_order ASC",
			)
			.bind(&route_row.id)
			.fetch_all(&self.pool)
			.await?;

			let filters = self.load_filters(tenant_id, Some(&route_row.id)).await?;
			let security = self.load_security(tenant_id, &route_row.id).await?;
			let auth = self.load_auth(tenant_id, &route_row.id).await?;
			let cors = self.load_cors(tenant_id, &route_row.id).await?;
			let rate_limit = self.load_rate_limit(tenant_id, &route_row.id).await?;

			routes.push(convert::route(route_row, assertions, filters, security, auth, cors, rate_limit));
		}

		let global_filters = self.load_filters(tenant_id, None).await?;

		// Step 7: proxy + services + nodes.
		let proxy = self.load_proxy(tenant_id, instance_id).await?;

		// Step 9: mandatory log config.
		let log_config_id = instance_row
			.log_config_id
			.clone()
			.filter(|id| !id.is_empty())
			.ok_or_else(|| StoreError::LogConfigMissing("<none referenced>".into()))?;
		let log_row = sqlx::query_as::<_, LogConfigRow>(
			"SELECT * FROM hub_gw_log_config WHERE tenant_id = $1 AND id = $2 AND active_flag = 'Y'",
		)
		.bind(tenant_id)
		.bind(&log_config_id)
		.fetch_optional(&self.pool)
		.await?
		.ok_or(StoreError::LogConfigMissing(log_config_id))?;
		let log_config = convert::log_config(log_row)?;

		Ok(GatewayConfig {
			instance,
			router,
			routes,
			global_filters,
			proxy,
			log_config,
			loaded_at: chrono::Utc::now(),
		})
	}

	async fn load_tls(
		&self,
		tenant_id: &str,
		instance_id: &str,
		row: &InstanceRow,
	) -> Result<Option<TlsMaterial>, StoreError> {
		if !row.tls_enabled {
			return Ok(None);
		}
		match (
			&row.cert_file_path,
			&row.key_file_path,
			&row.cert_content,
			&row.key_content,
		) {
			(Some(cert), Some(key), None, None) => Ok(Some(TlsMaterial::FilePath {
				cert_file_path: cert.into(),
				key_file_path: key.into(),
			})),
			(None, None, Some(cert), Some(key)) => {
				let (cert_path, key_path) =
					materialize_cert(&self.cert_dir, tenant_id, instance_id, cert, key).await?;
				Ok(Some(TlsMaterial::FilePath {
					cert_file_path: cert_path,
					key_file_path: key_path,
				}))
			},
			(None, None, None, None) => Ok(None),
			_ => Err(StoreError::InvalidTlsMaterial),
		}
	}

	async fn load_filters(&self, tenant_id: &str, route_id: Option<&str>) -> Result<Vec<Filter>, StoreError> {
		let rows = match route_id {
			Some(route_id) => {
				sqlx::query_as::<_, FilterConfigRow>(
					"SELECT * FROM hub_gw_filter_config WHERE tenant_id = $1 AND route_config_id = $2 \
					 AND enabled = true ORDER BY filter_order ASC, add_time ASC",
				)
				.bind(tenant_id)
				.bind(route_id)
				.fetch_all(&self.pool)
				.await?
			},
			None => {
				sqlx::query_as::<_, FilterConfigRow>(
					"SELECT * FROM hub_gw_filter_config WHERE tenant_id = $1 AND route_config_id IS NULL \
					 AND enabled = true ORDER BY filter_order ASC, add_time ASC",
				)
				.bind(tenant_id)
				.fetch_all(&self.pool)
				.await?
			},
		};
		Ok(
			rows
				.into_iter()
				.enumerate()
				.map(|(i, row)| convert::filter(row, i as u64))
				.collect(),
		)
	}

	async fn load_security(&self, tenant_id: &str, security_config_id: &str) -> Result<Option<SecurityConfig>, StoreError> {
		let ip_rows = sqlx::query_as::<_, IpAccessConfigRow>(
			"SELECT * FROM hub_gw_ip_access_config WHERE tenant_id = $1 AND security_config_id = $2 \
			 AND active_flag = 'Y' ORDER BY ip_access_config_id ASC",
		)
		.bind(tenant_id)
		.bind(security_config_id)
		.fetch_all(&self.pool)
		.await?;
		let ip_access = ip_rows
			.into_iter()
			.map(convert::ip_access)
			.collect::<Result<Vec<_>, _>>()?;
		let ip_access = gateway_core::model::IpAccess::merge(&ip_access);

		let ua_rows = sqlx::query_as::<_, UaAccessConfigRow>(
			"SELECT * FROM hub_gw_ua_access_config WHERE tenant_id = $1 AND security_config_id = $2 \
			 AND active_flag = 'Y'",
		)
		.bind(tenant_id)
		.bind(security_config_id)
		.fetch_all(&self.pool)
		.await?;
		let user_agent_access =
			gateway_core::model::UserAgentAccess::merge(&ua_rows.into_iter().map(convert::ua_access).collect::<Vec<_>>());

		let api_rows = sqlx::query_as::<_, ApiAccessConfigRow>(
			"SELECT * FROM hub_gw_api_access_config WHERE tenant_id = $1 AND security_config_id = $2 \
			 AND active_flag = 'Y'",
		)
		.bind(tenant_id)
		.bind(security_config_id)
		.fetch_all(&self.pool)
		.await?;
		let api_access =
			gateway_core::model::ApiAccess::merge(&api_rows.into_iter().map(convert::api_access).collect::<Vec<_>>());

		let domain_rows = sqlx::query_as::<_, DomainAccessConfigRow>(
			"SELECT * FROM hub_gw_domain_access_config WHERE tenant_id = $1 AND security_config_id = $2 \
			 AND active_flag = 'Y'",
		)
		.bind(tenant_id)
		.bind(security_config_id)
		.fetch_all(&self.pool)
		.await?;
		let domain_access = gateway_core::model::DomainAccess::merge(
			&domain_rows.into_iter().map(convert::domain_access).collect::<Vec<_>>(),
		);

		if ip_access.is_none() && user_agent_access.is_none() && api_access.is_none() && domain_access.is_none() {
			return Ok(None);
		}
		Ok(Some(SecurityConfig {
			ip_access,
			user_agent_access,
			api_access,
			domain_access,
		}))
	}

	async fn load_auth(&self, tenant_id: &str, security_config_id: &str) -> Result<Option<gateway_core::model::AuthConfig>, StoreError> {
		let row = sqlx::query_as::<_, AuthConfigRow>(
			"SELECT * FROM hub_gw_auth_config WHERE tenant_id = $1 AND security_config_id = $2 \
			 AND active_flag = 'Y' ORDER BY add_time ASC LIMIT 1",
		)
		.bind(tenant_id)
		.bind(security_config_id)
		.fetch_optional(&self.pool)
		.await?;
		Ok(row.map(convert::auth_config))
	}

	async fn load_cors(&self, tenant_id: &str, security_config_id: &str) -> Result<Option<gateway_core::model::CorsConfig>, StoreError> {
		let row = sqlx::query_as::<_, CorsConfigRow>(
			"SELECT * FROM hub_gw_cors_config WHERE tenant_id = $1 AND security_config_id = $2 \
			 AND active_flag = 'Y' ORDER BY add_time ASC LIMIT 1",
		)
		.bind(tenant_id)
		.bind(security_config_id)
		.fetch_optional(&self.pool)
		.await?;
		Ok(row.map(convert::cors_config))
	}

	/// Absent row is treated as a non-error "no override" (Open
	/// Question: the source's route-level path returns `RecordNotFound` as an
	/// error; we follow the instance-level path's behavior uniformly).
	async fn load_rate_limit(&self, tenant_id: &str, security_config_id: &str) -> Result<Option<gateway_core::model::RateLimitConfig>, StoreError> {
		let row = sqlx::query_as::<_, RateLimitConfigRow>(
			"SELECT * FROM hub_gw_rate_limit_config WHERE tenant_id = $1 AND security_config_id = $2 \
			 AND active_flag = 'Y' ORDER BY add_time ASC LIMIT 1",
		)
		.bind(tenant_id)
		.bind(security_config_id)
		.fetch_optional(&self.pool)
		.await?;
		Ok(row.map(convert::rate_limit_config))
	}

	async fn load_proxy(&self, tenant_id: &str, instance_id: &str) -> Result<Option<gateway_core::model::ProxyConfig>, StoreError> {
		let Some(proxy_row) = sqlx::query_as::<_, ProxyConfigRow>(
			"SELECT * FROM hub_gw_proxy_config WHERE tenant_id = $1 AND gateway_instance_id = $2 \
			 AND active_flag = 'Y' ORDER BY add_time ASC LIMIT 1",
		)
		.bind(tenant_id)
		.bind(instance_id)
		.fetch_optional(&self.pool)
		.await?
		else {
			return Ok(None);
		};

		let service_rows = sqlx::query_as::<_, ServiceDefinitionRow>(
			"SELECT * FROM hub_gw_service_definition WHERE tenant_id = $1 AND proxy_config_id = $2 \
			 AND active_flag = 'Y'",
		)
		.bind(tenant_id)
		.bind(&proxy_row.id)
		.fetch_all(&self.pool)
		.await?;

		let mut services = Vec::with_capacity(service_rows.len());
		for service_row in service_rows {
			let node_rows = sqlx::query_as::<_, ServiceNodeRow>(
				"SELECT * FROM hub_gw_service_node WHERE tenant_id = $1 AND service_definition_id = $2 \
				 AND active_flag = 'Y' ORDER BY weight DESC",
			)
			.bind(tenant_id)
			.bind(&service_row.id)
			.fetch_all(&self.pool)
			.await?;
			services.push(convert::service(service_row, node_rows));
		}

		Ok(Some(convert::proxy(proxy_row, services)))
	}
}
