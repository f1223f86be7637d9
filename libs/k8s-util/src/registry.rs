use crate::error::{Error, Result};
use crate::image::ImageReference;

use std::collections::BTreeSet;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::debug;

pub const MANIFEST_V2_CONTENT_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";
const DOCKER_CONTENT_DIGEST: &str = "Docker-Content-Digest";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize, Default)]
struct ManifestConfig {
    #[serde(default)]
    digest: String,
}

#[derive(Deserialize)]
struct Manifest {
    #[serde(default)]
    config: ManifestConfig,
}

/// Resolves a mutable image tag to an immutable digest.
pub trait TagResolver: Send + Sync {
    fn resolve<'a>(&'a self, image: &'a ImageReference) -> BoxFuture<'a, Result<String>>;
}

/// Docker registry v2 client used to resolve tags through the manifest endpoint.
#[derive(Clone)]
pub struct RegistryClient {
    client: reqwest::Client,
    plain_http_registries: BTreeSet<String>,
}

impl RegistryClient {
    pub fn new(plain_http_registries: impl IntoIterator<Item = String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::HttpError("failed to build HTTP client".to_string(), e))?;

        Ok(Self {
            client,
            plain_http_registries: plain_http_registries.into_iter().collect(),
        })
    }

    pub fn manifest_url(&self, image: &ImageReference) -> String {
        let scheme = if self.plain_http_registries.contains(&image.registry) {
            "http"
        } else {
            "https"
        };
        format!(
            "{scheme}://{}/v2/{}/manifests/{}",
            image.registry, image.repository, image.tag
        )
    }

    pub async fn resolve_digest(&self, image: &ImageReference) -> Result<String> {
        let url = self.manifest_url(image);
        debug!(msg = "requesting manifest", %url);

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, MANIFEST_V2_CONTENT_TYPE)
            .send()
            .await
            .map_err(|e| Error::HttpError(format!("Error requesting manifest ({url})"), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus(
                format!("Error requesting manifest ({url})"),
                status,
            ));
        }

        let header_digest = response
            .headers()
            .get(DOCKER_CONTENT_DIGEST)
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::HttpError(format!("Error requesting manifest ({url})"), e))?;

        if let Some(digest) = header_digest {
            return Ok(digest);
        }

        let manifest: Manifest = serde_json::from_slice(&bytes).map_err(|e| {
            Error::SerializationError(format!("Error decoding manifest ({url})"), e)
        })?;

        if manifest.config.digest.is_empty() {
            return Err(Error::MissingData(format!(
                "Manifest ({url}) does not contain a digest"
            )));
        }

        Ok(manifest.config.digest)
    }
}

impl TagResolver for RegistryClient {
    fn resolve<'a>(&'a self, image: &'a ImageReference) -> BoxFuture<'a, Result<String>> {
        self.resolve_digest(image).boxed()
    }
}
