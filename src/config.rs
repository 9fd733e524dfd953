//! Config loader: the JSON file naming the object-store endpoint and
//! credentials, mirroring the config-struct-plus-`serde_json::from_str`
//! pattern this crate family uses for every JSON-configured connector.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// `s3bucket` carries both the endpoint and the bucket name in one URL:
/// everything up to the last `/` is the endpoint, the final path component
/// is the bucket. This mirrors the original deployment's single
/// `s3bucket` setting rather than splitting it into two config keys.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub s3bucket: String,
    pub s3bucket_auth_key: String,
    pub s3bucket_auth_secret: String,
}

impl Config {
    /// Reads and parses the config file at `path`. Any I/O or JSON error is
    /// reported as `Error::Config` carrying the path, never a panic.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Other(format!("failed to read config file {}: {e}", path.display()))
        })?;
        serde_json::from_str(&text).map_err(|e| Error::Config {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Splits `s3bucket` into `(endpoint, bucket)`, as the original
    /// deployment's `tmp = s3bucket.split('/'); bucket = tmp[-1]; endpoint =
    /// '/'.join(tmp[:-1])` does.
    pub fn split_s3_bucket(&self) -> (String, String) {
        match self.s3bucket.rsplit_once('/') {
            Some((endpoint, bucket)) => (endpoint.to_string(), bucket.to_string()),
            None => (String::new(), self.s3bucket.clone()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn splits_endpoint_and_bucket() {
        let config = Config {
            s3bucket: "https://s3.example.com/my-bucket".to_string(),
            s3bucket_auth_key: "k".to_string(),
            s3bucket_auth_secret: "s".to_string(),
        };
        let (endpoint, bucket) = config.split_s3_bucket();
        assert_eq!(endpoint, "https://s3.example.com");
        assert_eq!(bucket, "my-bucket");
    }

    #[test]
    fn load_reports_error_on_missing_file() {
        assert!(Config::load(Path::new("/nonexistent/config.json")).is_err());
    }

    #[test]
    fn load_reports_typed_error_on_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn load_parses_valid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"s3bucket": "https://s3.example.com/my-bucket", "s3bucket_auth_key": "k", "s3bucket_auth_secret": "s"}"#,
        )
        .unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.s3bucket_auth_key, "k");
    }
}
