//! S3 upload target

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use mongo_backup_core::{BackupError, Result};

use crate::{autorename_candidate, ConflictPolicy, ObjectStore, MAX_AUTORENAME_ATTEMPTS};

/// Uploads archives as objects under `s3://bucket/prefix`
///
/// Creating an S3 client is relatively expensive, so one store should be
/// reused for every upload of a run.
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
}

/// Object key for `name` below `prefix`.
fn object_key(prefix: &str, name: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        format!("{prefix}{name}")
    } else {
        format!("{prefix}/{name}")
    }
}

impl S3Store {
    pub fn new(client: aws_sdk_s3::Client, bucket: String, prefix: String) -> Self {
        Self {
            client,
            bucket,
            prefix,
        }
    }

    /// Create a store using the default AWS credential and region chain
    pub async fn from_env(bucket: String, prefix: String) -> Self {
        let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Self::new(aws_sdk_s3::Client::new(&sdk_config), bucket, prefix)
    }

    fn remote_error(&self, key: &str, reason: impl ToString) -> BackupError {
        BackupError::Remote {
            target: format!("s3://{}/{}", self.bucket, key),
            reason: reason.to_string(),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                let not_found = err
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false);
                if not_found {
                    Ok(false)
                } else {
                    Err(self.remote_error(key, DisplayErrorContext(&err)))
                }
            }
        }
    }

    /// Pick the key the object will be written to under `policy`.
    async fn resolve_key(&self, remote_name: &str, policy: ConflictPolicy) -> Result<String> {
        let key = object_key(&self.prefix, remote_name);
        match policy {
            ConflictPolicy::Overwrite => Ok(key),
            ConflictPolicy::Fail => {
                if self.exists(&key).await? {
                    Err(self.remote_error(&key, "object already exists"))
                } else {
                    Ok(key)
                }
            }
            ConflictPolicy::Autorename => {
                for attempt in 0..MAX_AUTORENAME_ATTEMPTS {
                    let candidate =
                        object_key(&self.prefix, &autorename_candidate(remote_name, attempt));
                    if !self.exists(&candidate).await? {
                        return Ok(candidate);
                    }
                }
                Err(self.remote_error(&key, "no free name left for autorename"))
            }
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn upload(
        &self,
        local: &Path,
        remote_name: &str,
        policy: ConflictPolicy,
    ) -> Result<String> {
        let key = self.resolve_key(remote_name, policy).await?;
        let body = ByteStream::from_path(local)
            .await
            .map_err(|e| BackupError::io(local, std::io::Error::other(e)))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body)
            .send()
            .await
            .map_err(|e| self.remote_error(&key, DisplayErrorContext(&e)))?;

        let target = format!("s3://{}/{}", self.bucket, key);
        tracing::info!("Uploaded {} to {}", local.display(), target);
        Ok(target)
    }

    fn display_name(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_joins_prefix() {
        assert_eq!(object_key("", "a.tar.zst"), "a.tar.zst");
        assert_eq!(object_key("nightly/", "a.tar.zst"), "nightly/a.tar.zst");
        assert_eq!(object_key("nightly", "a.tar.zst"), "nightly/a.tar.zst");
    }

    // Integration tests for S3 operations would require AWS credentials
    // or mocking, which is beyond the scope of unit tests
}
