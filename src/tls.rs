//! Builds a `rustls::ServerConfig`/`TlsAcceptor` from a `TlsMaterial` value.

use std::io::Cursor;
use std::sync::Arc;

use gateway_core::model::TlsMaterial;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

#[derive(thiserror::Error, Debug)]
pub enum TlsSetupError {
	#[error("failed to read TLS material: {0}")]
	Io(#[from] std::io::Error),
	#[error("no certificates found in cert material")]
	NoCertificates,
	#[error("no private key found in key material")]
	NoPrivateKey,
	#[error("encrypted private keys are not supported")]
	EncryptedKey,
	#[error("invalid TLS configuration: {0}")]
	Rustls(#[from] rustls::Error),
}

pub async fn build_acceptor(tls: &TlsMaterial) -> Result<TlsAcceptor, TlsSetupError> {
	let (cert_bytes, key_bytes, password) = match tls {
		TlsMaterial::FilePath { cert_file_path, key_file_path } => {
			(tokio::fs::read(cert_file_path).await?, tokio::fs::read(key_file_path).await?, None)
		},
		TlsMaterial::Inline { cert_content, key_content, password } => {
			(cert_content.clone().into_bytes(), key_content.clone().into_bytes(), password.clone())
		},
	};
	// Password-protected PKCS#8/PKCS#1 keys aren't something rustls-pemfile
	// can decrypt; DB-stored material with a password would need to be
	// materialized and decrypted upstream before reaching this point.
	if password.is_some() {
		return Err(TlsSetupError::EncryptedKey);
	}

	let mut cert_reader = std::io::BufReader::new(Cursor::new(&cert_bytes));
	let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut cert_reader).collect::<Result<_, _>>()?;
	if certs.is_empty() {
		return Err(TlsSetupError::NoCertificates);
	}
	let mut key_reader = std::io::BufReader::new(Cursor::new(&key_bytes));
	let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut key_reader)?.ok_or(TlsSetupError::NoPrivateKey)?;

	let config = ServerConfig::builder().with_no_client_auth().with_single_cert(certs, key)?;
	Ok(TlsAcceptor::from(Arc::new(config)))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn rejects_password_protected_inline_material() {
		let tls = TlsMaterial::Inline { cert_content: String::new(), key_content: String::new(), password: Some("secret".into()) };
		let err = build_acceptor(&tls).await.unwrap_err();
		assert!(matches!(err, TlsSetupError::EncryptedKey));
	}

	#[tokio::test]
	async fn rejects_empty_cert_material() {
		let tls = TlsMaterial::Inline { cert_content: String::new(), key_content: String::new(), password: None };
		let err = build_acceptor(&tls).await.unwrap_err();
		assert!(matches!(err, TlsSetupError::NoCertificates));
	}
}
