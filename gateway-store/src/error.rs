#[derive(thiserror::Error, Debug)]
pub enum StoreError {
	#[error("gateway instance {tenant_id}/{instance_id} not found or inactive")]
	InstanceNotFound { tenant_id: String, instance_id: String },

	#[error("log config {0} referenced by instance but missing or inactive")]
	LogConfigMissing(String),

	#[error("instance has TLS enabled but neither file-path nor inline cert material is set")]
	InvalidTlsMaterial,

	#[error("database error: {0}")]
	Db(#[from] sqlx::Error),

	#[error("io error materializing TLS assets: {0}")]
	Io(#[from] std::io::Error),

	#[error("malformed config JSON in column {column}: {source}")]
	MalformedJson {
		column: String,
		#[source]
		source: serde_json::Error,
	},
}
