//! Object Log Store: a thin wrapper over an object store rooted at a
//! per-database prefix, exposing only what the Replication Engine needs —
//! conditional create and plain get.

use crate::config::Config;
use crate::{Error, Result};
use opendal::layers::RetryLayer;
use opendal::options::WriteOptions;
use opendal::services::{Fs, Memory, S3};
use opendal::{ErrorKind, Operator};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub struct ObjectLogStore {
    store: Operator,
}

impl ObjectLogStore {
    /// Builds the object store client from a loaded `Config`. Retries
    /// transient transport errors with the layer's own backoff; `commit`
    /// and `sync` only ever see `SegmentExists` or a terminal `TransientIo`.
    pub fn open(config: &Config) -> Result<Self> {
        let (endpoint, bucket) = config.split_s3_bucket();

        let mut builder = S3::default()
            .bucket(&bucket)
            .access_key_id(&config.s3bucket_auth_key)
            .secret_access_key(&config.s3bucket_auth_secret);
        if !endpoint.is_empty() {
            builder = builder.endpoint(&endpoint);
        }

        let store = Operator::new(builder)
            .map_err(Error::TransientIo)?
            .layer(RetryLayer::new())
            .finish();

        Ok(Self { store })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Self {
        let store = Operator::new(Memory::default()).unwrap().finish();
        Self { store }
    }

    #[cfg(test)]
    pub fn open_fs(root: &str) -> Result<Self> {
        let store = Operator::new(Fs::default().root(root))
            .map_err(Error::TransientIo)?
            .finish();
        Ok(Self { store })
    }

    pub fn segment_key(db: &str, lsn: u64) -> String {
        format!("SQLiteDB/{db}/logs/{lsn}")
    }

    /// Fetches the object at `key`, returning `None` if it does not exist.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::time::timeout(DEFAULT_TIMEOUT, self.store.read(key)).await {
            Ok(Ok(buffer)) => Ok(Some(buffer.to_vec())),
            Ok(Err(err)) if err.kind() == ErrorKind::NotFound => Ok(None),
            Ok(Err(err)) => Err(Error::TransientIo(err)),
            Err(_) => Err(Error::Other(format!("timed out reading {key}"))),
        }
    }

    /// Atomically creates `key` with `bytes`, never overwriting an existing
    /// object. A losing writer gets `Error::SegmentExists` with no further
    /// observable effect on the object store.
    pub async fn put_new(&self, key: &str, bytes: Vec<u8>, lsn: u64) -> Result<()> {
        let write = self.store.write_options(
            key,
            bytes,
            WriteOptions {
                if_not_exists: true,
                ..WriteOptions::default()
            },
        );

        match tokio::time::timeout(DEFAULT_TIMEOUT, write).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) if err.kind() == ErrorKind::ConditionNotMatch => {
                Err(Error::SegmentExists { lsn, key: key.to_string() })
            }
            Ok(Err(err)) => Err(Error::TransientIo(err)),
            Err(_) => Err(Error::Other(format!("timed out writing {key}"))),
        }
    }
}
