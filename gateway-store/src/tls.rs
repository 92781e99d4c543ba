use std::path::{Path, PathBuf};

use crate::error::StoreError;

/// Writes DB-stored cert/key PEM content to
/// `tmp/gateway-certs/<tenant>/<instance>/{cert,key}.pem`, directory mode
/// `0700`, file mode `0600` (`GatewayInstance` invariant).
pub async fn materialize_cert(
	base_dir: &Path,
	tenant_id: &str,
	instance_id: &str,
	cert_pem: &str,
	key_pem: &str,
) -> Result<(PathBuf, PathBuf), StoreError> {
	let dir = base_dir.join(tenant_id).join(instance_id);
	tokio::fs::create_dir_all(&dir).await?;
	set_permissions(&dir, 0o700).await?;

	let cert_path = dir.join("cert.pem");
	let key_path = dir.join("key.pem");
	tokio::fs::write(&cert_path, cert_pem).await?;
	tokio::fs::write(&key_path, key_pem).await?;
	set_permissions(&cert_path, 0o600).await?;
	set_permissions(&key_path, 0o600).await?;

	Ok((cert_path, key_path))
}

#[cfg(unix)]
async fn set_permissions(path: &Path, mode: u32) -> Result<(), StoreError> {
	use std::os::unix::fs::PermissionsExt;
	let perms = std::fs::Permissions::from_mode(mode);
	tokio::fs::set_permissions(path, perms).await?;
	Ok(())
}

#[cfg(not(unix))]
async fn set_permissions(_path: &Path, _mode: u32) -> Result<(), StoreError> {
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn materializes_cert_and_key_under_tenant_instance() {
		let dir = std::env::temp_dir().join(format!("gw-cert-test-{}", std::process::id()));
		let (cert, key) = materialize_cert(&dir, "tenant-a", "inst-1", "CERT", "KEY")
			.await
			.unwrap();
		assert_eq!(tokio::fs::read_to_string(&cert).await.unwrap(), "CERT");
		assert_eq!(tokio::fs::read_to_string(&key).await.unwrap(), "KEY");
		let _ = tokio::fs::remove_dir_all(&dir).await;
	}
}
