//! Read-only backend that downloads bundles from a URL template.

use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::{parse_compression, parse_options, Backend, BackendError, BackendTools, InvalidOptions};
use crate::core::archive::{bundle_file_name, extract_bundle, Compression};

pub const KIND: &str = "http";
const HASH_PLACEHOLDER: &str = "{hash}";
const VEENDOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawHttpOptions {
    resolve_url: Option<String>,
    compression: Option<String>,
    #[serde(default)]
    strict: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpOptions {
    /// URL containing `{hash}`, replaced with the fingerprint on pull.
    pub resolve_url: String,
    pub compression: Compression,
    /// Treat transport failures and unexpected statuses as fatal instead of
    /// as a missing bundle.
    pub strict: bool,
}

impl HttpOptions {
    pub fn url_for(&self, hash: &str) -> String {
        self.resolve_url.replace(HASH_PLACEHOLDER, hash)
    }
}

pub fn validate_options(raw: &Value) -> Result<HttpOptions, InvalidOptions> {
    let raw: RawHttpOptions = parse_options(raw)?;
    let resolve_url = raw
        .resolve_url
        .ok_or_else(|| InvalidOptions::new("`resolveUrl` is required"))?;
    if !resolve_url.contains(HASH_PLACEHOLDER) {
        return Err(InvalidOptions::new(format!(
            "`resolveUrl` must contain `{HASH_PLACEHOLDER}`"
        )));
    }
    let probe = resolve_url.replace(HASH_PLACEHOLDER, "0");
    url::Url::parse(&probe)
        .map_err(|err| InvalidOptions::new(format!("`resolveUrl` is not a valid URL: {err}")))?;
    Ok(HttpOptions {
        resolve_url,
        compression: parse_compression(raw.compression.as_deref())?,
        strict: raw.strict,
    })
}

pub(crate) fn create(raw: &Value) -> Result<Arc<dyn Backend>, InvalidOptions> {
    let options = validate_options(raw)?;
    let client = Client::builder()
        .user_agent(format!("veendor/{VEENDOR_VERSION}"))
        .connect_timeout(Duration::from_secs(30))
        .build()
        .map_err(|err| InvalidOptions::new(format!("failed to build HTTP client: {err}")))?;
    Ok(Arc::new(HttpBackend { options, client }))
}

#[derive(Debug)]
pub struct HttpBackend {
    options: HttpOptions,
    client: Client,
}

impl HttpBackend {
    /// Non-strict mode reports soft failures as a missing bundle.
    fn soft_failure(&self, hash: &str, err: anyhow::Error) -> BackendError {
        if self.options.strict {
            BackendError::Other(err)
        } else {
            warn!(error = %err, "treating download failure as missing bundle");
            BackendError::not_found(hash)
        }
    }
}

#[async_trait]
impl Backend for HttpBackend {
    fn kind(&self) -> &'static str {
        KIND
    }

    async fn pull(&self, hash: &str, tools: &BackendTools<'_>) -> Result<(), BackendError> {
        let url = self.options.url_for(hash);
        debug!(%url, "requesting bundle");
        let mut response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(err) => {
                return Err(self.soft_failure(hash, anyhow!("GET {url} failed: {err}")));
            }
        };
        if response.status() == StatusCode::NOT_FOUND {
            return Err(BackendError::not_found(hash));
        }
        if !response.status().is_success() {
            let status = response.status();
            return Err(self.soft_failure(hash, anyhow!("GET {url} returned {status}")));
        }

        let archive = tools
            .cache_dir
            .join(bundle_file_name(hash, self.options.compression));
        let mut file = tokio::fs::File::create(&archive)
            .await
            .with_context(|| format!("creating {}", archive.display()))?;
        let reporter = tools.progress.bytes(
            format!("[{}] downloading {hash}", tools.alias),
            response.content_length(),
        );
        loop {
            let chunk = match response.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(err) => {
                    return Err(self.soft_failure(hash, anyhow!("reading {url} failed: {err}")));
                }
            };
            file.write_all(&chunk)
                .await
                .with_context(|| format!("writing {}", archive.display()))?;
            reporter.increment(chunk.len() as u64);
        }
        file.flush()
            .await
            .with_context(|| format!("writing {}", archive.display()))?;
        drop(file);

        extract_bundle(&archive, tools.project_dir, self.options.compression).await?;
        reporter.finish(format!("[{}] pulled {hash}", tools.alias));
        Ok(())
    }

    async fn push(&self, _hash: &str, _tools: &BackendTools<'_>) -> Result<(), BackendError> {
        Err(BackendError::Other(anyhow!(
            "the http backend is read-only; set `push: false` or `pushMayFail: true`"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolve_url_requires_placeholder() {
        let err = validate_options(&json!({"resolveUrl": "https://cdn.example.com/bundle.tgz"}))
            .unwrap_err();
        assert!(err.0.contains("{hash}"));
    }

    #[test]
    fn resolve_url_must_parse() {
        assert!(validate_options(&json!({"resolveUrl": "not a url {hash}"})).is_err());
    }

    #[test]
    fn url_substitutes_every_placeholder() {
        let options = validate_options(&json!({
            "resolveUrl": "https://cdn.example.com/{hash}/{hash}.tar.xz",
            "compression": "xz",
            "strict": true,
        }))
        .unwrap();
        assert_eq!(
            options.url_for("abc"),
            "https://cdn.example.com/abc/abc.tar.xz"
        );
        assert_eq!(options.compression, Compression::Xz);
        assert!(options.strict);
    }

    #[test]
    fn strict_defaults_to_false() {
        let options =
            validate_options(&json!({"resolveUrl": "http://localhost/{hash}.tar.gz"})).unwrap();
        assert!(!options.strict);
    }

    #[tokio::test]
    async fn push_is_refused() {
        let backend = create(&json!({"resolveUrl": "http://localhost/{hash}"})).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let progress = crate::core::tooling::progress::Progress::silent();
        let tools = BackendTools {
            alias: "cdn",
            project_dir: dir.path(),
            cache_dir: dir.path(),
            progress: &progress,
        };
        let err = backend.push("abc", &tools).await.unwrap_err();
        assert!(matches!(err, BackendError::Other(_)));
    }
}
