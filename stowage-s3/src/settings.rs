//! Storage connection settings

use crate::storage::{StorageError, DEFAULT_REGION};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

/// Environment prefix, e.g. `MINIO_ENDPOINT`, `MINIO_DEFAULT_BUCKET`
pub const ENV_PREFIX: &str = "MINIO";

/// Connection settings for an S3-compatible endpoint
#[derive(Clone, Deserialize)]
pub struct StorageSettings {
    /// Host with optional port and scheme, e.g. `localhost:9000`
    pub endpoint: String,

    pub access_key: String,

    pub secret_key: String,

    #[serde(default)]
    pub session_token: Option<String>,

    /// Use TLS when the endpoint names no scheme
    #[serde(default = "default_true")]
    pub secure: bool,

    #[serde(default)]
    pub region: Option<String>,

    #[serde(default)]
    pub default_bucket: Option<String>,
}

fn default_true() -> bool {
    true
}

impl StorageSettings {
    pub fn new(
        endpoint: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            session_token: None,
            secure: true,
            region: None,
            default_bucket: None,
        }
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    pub fn with_default_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.default_bucket = Some(bucket.into());
        self
    }

    /// Layer the `MINIO_*` environment over an existing builder and deserialize
    pub fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, config::ConfigError> {
        let config = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        config.try_deserialize::<StorageSettings>()
    }

    /// Endpoint as a URL, adding a scheme from `secure` when none is given
    pub fn endpoint_url(&self) -> Result<Url, StorageError> {
        let raw = if self.endpoint.contains("://") {
            self.endpoint.clone()
        } else {
            let scheme = if self.secure { "https" } else { "http" };
            format!("{scheme}://{}", self.endpoint)
        };
        Url::parse(&raw)
            .map_err(|e| StorageError::InvalidArgument(format!("invalid endpoint '{}': {e}", self.endpoint)))
    }

    pub fn region_or_default(&self) -> &str {
        self.region.as_deref().unwrap_or(DEFAULT_REGION)
    }

    /// Identity of the configuration, used to share one client per settings.
    ///
    /// Credentials enter only as a SHA-256 digest.
    pub fn cache_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret_key.as_bytes());
        hasher.update(b"\x00");
        if let Some(token) = &self.session_token {
            hasher.update(b"\x01");
            hasher.update(token.as_bytes());
        }
        let credentials = hex::encode(hasher.finalize());

        format!(
            "{}|{}|{}|{}|{}|{}",
            self.endpoint,
            self.secure,
            self.access_key,
            self.region_or_default(),
            self.default_bucket.as_deref().unwrap_or_default(),
            credentials
        )
    }
}

impl fmt::Debug for StorageSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageSettings")
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .field("secure", &self.secure)
            .field("region", &self.region)
            .field("default_bucket", &self.default_bucket)
            .finish()
    }
}
