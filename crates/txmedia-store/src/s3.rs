//! S3-compatible store configuration and URL derivation
//!
//! Only the configuration surface and `locate` addressing live here; the
//! data plane rides on whatever S3 SDK the deployment wires in behind the
//! [`Store`] trait.

use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;
use txmedia_core::ConfigurationError;

use crate::error::{StoreError, StoreResult};
use crate::store::Store;

/// Canned ACL applied to uploaded objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CannedAcl {
    #[default]
    PublicRead,
    Private,
}

impl CannedAcl {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PublicRead => "public-read",
            Self::Private => "private",
        }
    }
}

/// S3-compatible backend configuration.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible services; `None` targets AWS.
    pub endpoint: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// CDN base URL; when set, `locate` prefers it over the bucket URL.
    pub cdn_url: Option<String>,
    pub acl: CannedAcl,
    /// Server-side AES-256 encryption.
    pub encryption: bool,
    /// Storage-class hint, e.g. "STANDARD" or "REDUCED_REDUNDANCY".
    pub storage_class: String,
}

impl S3Config {
    pub fn new(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: region.into(),
            endpoint: None,
            access_key_id: String::new(),
            secret_access_key: String::new(),
            cdn_url: None,
            acl: CannedAcl::default(),
            encryption: false,
            storage_class: "STANDARD".to_string(),
        }
    }

    pub fn credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.access_key_id = access_key_id.into();
        self.secret_access_key = secret_access_key.into();
        self
    }

    pub fn cdn_url(mut self, cdn_url: impl Into<String>) -> Self {
        self.cdn_url = Some(cdn_url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn acl(mut self, acl: CannedAcl) -> Self {
        self.acl = acl;
        self
    }

    pub fn encrypted(mut self) -> Self {
        self.encryption = true;
        self
    }
}

/// S3-compatible object store.
#[derive(Debug)]
pub struct S3Store {
    config: S3Config,
}

impl S3Store {
    /// Validate the configuration and build the store.
    ///
    /// Credentials are checked here so a misconfigured backend fails at
    /// registry setup, not at the first attach.
    pub fn new(config: S3Config) -> Result<Self, ConfigurationError> {
        if config.access_key_id.is_empty() {
            return Err(ConfigurationError::MissingCredential("access_key_id"));
        }
        if config.secret_access_key.is_empty() {
            return Err(ConfigurationError::MissingCredential("secret_access_key"));
        }

        info!(bucket = %config.bucket, region = %config.region, "s3 store configured");
        Ok(Self { config })
    }

    pub fn config(&self) -> &S3Config {
        &self.config
    }

    fn base_url(&self) -> String {
        if let Some(endpoint) = &self.config.endpoint {
            format!("{}/{}", endpoint.trim_end_matches('/'), self.config.bucket)
        } else {
            format!(
                "https://{}.s3.{}.amazonaws.com",
                self.config.bucket, self.config.region
            )
        }
    }
}

#[async_trait]
impl Store for S3Store {
    async fn put(&self, _filename: &str, _data: Bytes) -> StoreResult<u64> {
        Err(StoreError::Backend(
            "s3 data plane not wired; bind an SDK-backed Store for this name".to_string(),
        ))
    }

    async fn open(&self, _filename: &str) -> StoreResult<Bytes> {
        Err(StoreError::Backend(
            "s3 data plane not wired; bind an SDK-backed Store for this name".to_string(),
        ))
    }

    async fn delete(&self, _filename: &str) -> StoreResult<()> {
        Err(StoreError::Backend(
            "s3 data plane not wired; bind an SDK-backed Store for this name".to_string(),
        ))
    }

    fn locate(&self, path: &str) -> String {
        if path.is_empty() {
            return String::new();
        }
        let base = match &self.config.cdn_url {
            Some(cdn) => cdn.clone(),
            None => self.base_url(),
        };
        format!("{}/{}", base, path)
    }

    fn name(&self) -> &str {
        "s3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> S3Config {
        S3Config::new("media-bucket", "eu-west-1").credentials("AKIA", "secret")
    }

    #[test]
    fn test_missing_credentials() {
        let err = S3Store::new(S3Config::new("b", "r")).unwrap_err();
        assert_eq!(err, ConfigurationError::MissingCredential("access_key_id"));

        let err = S3Store::new(S3Config::new("b", "r").credentials("AKIA", "")).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::MissingCredential("secret_access_key")
        );
    }

    #[test]
    fn test_locate_bucket_url() {
        let store = S3Store::new(configured()).unwrap();
        assert_eq!(
            store.locate("a/b.png"),
            "https://media-bucket.s3.eu-west-1.amazonaws.com/a/b.png"
        );
        assert_eq!(store.locate(""), "");
    }

    #[test]
    fn test_locate_custom_endpoint() {
        let mut config = configured();
        config.endpoint = Some("https://minio.internal:9000".to_string());
        let store = S3Store::new(config).unwrap();
        assert_eq!(
            store.locate("k.bin"),
            "https://minio.internal:9000/media-bucket/k.bin"
        );
    }

    #[test]
    fn test_locate_prefers_cdn() {
        let store = S3Store::new(configured().cdn_url("https://cdn.example.com/")).unwrap();
        assert_eq!(store.locate("k.png"), "https://cdn.example.com/k.png");
    }

    #[test]
    fn test_acl_and_flags() {
        let config = configured().acl(CannedAcl::Private).encrypted();
        assert_eq!(config.acl.as_str(), "private");
        assert!(config.encryption);
        assert_eq!(config.storage_class, "STANDARD");
    }
}
