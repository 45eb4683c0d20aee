use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use s3::{creds::Credentials, error::S3Error, Bucket, Region};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{parse_compression, parse_options, Backend, BackendError, BackendTools, InvalidOptions};
use crate::core::archive::{bundle_file_name, create_bundle, extract_bundle, Compression};

pub const KIND: &str = "s3";
const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawS3Options {
    bucket: Option<String>,
    region: Option<String>,
    endpoint: Option<String>,
    prefix: Option<String>,
    object_acl: Option<String>,
    #[serde(default)]
    path_style: bool,
    compression: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Options {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible stores (MinIO, Ceph, ...).
    pub endpoint: Option<String>,
    pub prefix: String,
    pub object_acl: Option<String>,
    pub path_style: bool,
    pub compression: Compression,
}

impl S3Options {
    pub fn object_key(&self, hash: &str) -> String {
        format!("{}{}", self.prefix, bundle_file_name(hash, self.compression))
    }

    fn region(&self) -> anyhow::Result<Region> {
        match &self.endpoint {
            Some(endpoint) => Ok(Region::Custom {
                region: self.region.clone(),
                endpoint: endpoint.clone(),
            }),
            None => self
                .region
                .parse::<Region>()
                .map_err(|err| anyhow!("invalid region `{}`: {err}", self.region)),
        }
    }
}

pub fn validate_options(raw: &Value) -> Result<S3Options, InvalidOptions> {
    let raw: RawS3Options = parse_options(raw)?;
    let bucket = raw
        .bucket
        .filter(|bucket| !bucket.trim().is_empty())
        .ok_or_else(|| InvalidOptions::new("`bucket` is required"))?;
    if let Some(endpoint) = &raw.endpoint {
        let parsed = url::Url::parse(endpoint)
            .map_err(|err| InvalidOptions::new(format!("`endpoint` is not a valid URL: {err}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(InvalidOptions::new("`endpoint` must be an http(s) URL"));
        }
    }
    let prefix = match raw.prefix {
        Some(prefix) if !prefix.is_empty() && !prefix.ends_with('/') => format!("{prefix}/"),
        Some(prefix) => prefix,
        None => String::new(),
    };
    Ok(S3Options {
        bucket,
        region: raw.region.unwrap_or_else(|| DEFAULT_REGION.to_string()),
        endpoint: raw.endpoint,
        prefix,
        object_acl: raw.object_acl,
        path_style: raw.path_style,
        compression: parse_compression(raw.compression.as_deref())?,
    })
}

pub(crate) fn create(raw: &Value) -> Result<Arc<dyn Backend>, InvalidOptions> {
    Ok(Arc::new(S3Backend::new(validate_options(raw)?)))
}

/// Bundles stored as objects in an S3 bucket.
///
/// Credentials are resolved from the usual AWS environment variables and
/// profile files when a request is made, not when the config is loaded.
#[derive(Debug)]
pub struct S3Backend {
    options: S3Options,
}

impl S3Backend {
    pub fn new(options: S3Options) -> Self {
        Self { options }
    }

    fn bucket(&self) -> anyhow::Result<Box<Bucket>> {
        let credentials = Credentials::default().context("loading AWS credentials")?;
        let mut bucket = Bucket::new(&self.options.bucket, self.options.region()?, credentials)
            .with_context(|| format!("configuring bucket {}", self.options.bucket))?;
        if self.options.path_style {
            bucket = bucket.with_path_style();
        }
        if let Some(acl) = &self.options.object_acl {
            bucket.add_header("x-amz-acl", acl);
        }
        Ok(bucket)
    }

    async fn exists(&self, bucket: &Bucket, key: &str) -> anyhow::Result<bool> {
        match bucket.head_object(key).await {
            Ok((_, 404)) => Ok(false),
            Ok((_, code)) if (200..300).contains(&code) => Ok(true),
            Ok((_, code)) => Err(anyhow!("HEAD {key} returned {code}")),
            Err(S3Error::HttpFailWithBody(404, _)) => Ok(false),
            Err(err) => Err(anyhow::Error::new(err).context(format!("HEAD {key}"))),
        }
    }
}

#[async_trait]
impl Backend for S3Backend {
    fn kind(&self) -> &'static str {
        KIND
    }

    async fn pull(&self, hash: &str, tools: &BackendTools<'_>) -> Result<(), BackendError> {
        let bucket = self.bucket()?;
        let key = self.options.object_key(hash);
        debug!(bucket = %self.options.bucket, %key, "fetching object");
        let reporter = tools
            .progress
            .spinner(format!("[{}] downloading {key}", tools.alias));
        let response = match bucket.get_object(&key).await {
            Ok(response) => response,
            Err(S3Error::HttpFailWithBody(404, _)) => return Err(BackendError::not_found(hash)),
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context(format!("GET s3://{}/{key}", self.options.bucket))
                    .into())
            }
        };
        match response.status_code() {
            404 => return Err(BackendError::not_found(hash)),
            code if !(200..300).contains(&code) => {
                return Err(anyhow!("GET s3://{}/{key} returned {code}", self.options.bucket).into())
            }
            _ => {}
        }

        let archive = tools
            .cache_dir
            .join(bundle_file_name(hash, self.options.compression));
        tokio::fs::write(&archive, response.bytes())
            .await
            .with_context(|| format!("writing {}", archive.display()))?;
        extract_bundle(&archive, tools.project_dir, self.options.compression).await?;
        reporter.finish(format!("[{}] pulled {hash}", tools.alias));
        Ok(())
    }

    async fn push(&self, hash: &str, tools: &BackendTools<'_>) -> Result<(), BackendError> {
        let bucket = self.bucket()?;
        let key = self.options.object_key(hash);
        if self.exists(&bucket, &key).await? {
            return Err(BackendError::already_exists(hash));
        }

        let archive = tools
            .cache_dir
            .join(bundle_file_name(hash, self.options.compression));
        let reporter = tools
            .progress
            .spinner(format!("[{}] uploading {key}", tools.alias));
        create_bundle(tools.project_dir, &archive, self.options.compression).await?;
        let body = tokio::fs::read(&archive)
            .await
            .with_context(|| format!("reading {}", archive.display()))?;
        let response = bucket
            .put_object_with_content_type(&key, &body, "application/octet-stream")
            .await
            .with_context(|| format!("PUT s3://{}/{key}", self.options.bucket))?;
        let code = response.status_code();
        if !(200..300).contains(&code) {
            return Err(anyhow!("PUT s3://{}/{key} returned {code}", self.options.bucket).into());
        }
        reporter.finish(format!("[{}] pushed {hash}", tools.alias));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bucket_is_required() {
        let err = validate_options(&json!({"region": "eu-west-1"})).unwrap_err();
        assert!(err.0.contains("bucket"));
    }

    #[test]
    fn defaults_apply() {
        let options = validate_options(&json!({"bucket": "bundles"})).unwrap();
        assert_eq!(options.region, "us-east-1");
        assert_eq!(options.prefix, "");
        assert!(!options.path_style);
        assert_eq!(options.object_key("abc"), "abc.tar.gz");
    }

    #[test]
    fn prefix_gets_trailing_slash() {
        let options = validate_options(&json!({
            "bucket": "bundles",
            "prefix": "ci/veendor",
            "compression": "bzip2",
        }))
        .unwrap();
        assert_eq!(options.object_key("abc"), "ci/veendor/abc.tar.bz2");
    }

    #[test]
    fn custom_endpoint_must_be_a_url() {
        assert!(validate_options(&json!({"bucket": "b", "endpoint": "minio:9000"})).is_err());
        let options = validate_options(&json!({
            "bucket": "b",
            "endpoint": "http://localhost:9000",
            "pathStyle": true,
        }))
        .unwrap();
        assert!(matches!(options.region().unwrap(), Region::Custom { .. }));
    }
}
