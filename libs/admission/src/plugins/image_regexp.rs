//! Rewrites container images with configurable regular expressions and optionally pins
//! the resulting tag to the digest served by the image registry.

use crate::attributes::{Attributes, Operation};
use crate::config::decode_plugin_config;
use crate::error::{Error, Result};
use crate::plugin::Plugin;

use podgate_k8s_util::image::ImageReference;
use podgate_k8s_util::registry::{RegistryClient, TagResolver};

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use k8s_openapi::api::core::v1::{Container, PodSpec};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

pub const PLUGIN_NAME: &str = "ImageRegexp";

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRegexpRule {
    pub regexp: String,
    #[serde(default)]
    pub replacement: String,
    #[serde(default)]
    pub resolve_tag: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRegexpConfig {
    #[serde(default)]
    pub image_regexp: Vec<ImageRegexpRule>,
    /// Registries queried over plain HTTP instead of HTTPS when resolving tags.
    #[serde(default)]
    pub plain_http_registries: Vec<String>,
}

struct CompiledRule {
    regexp: Regex,
    rule: ImageRegexpRule,
}

pub struct ImageRegexp {
    rules: Vec<CompiledRule>,
    resolver: Arc<dyn TagResolver>,
}

pub fn factory(config: Option<Value>) -> Result<Box<dyn Plugin>> {
    let config: ImageRegexpConfig = decode_plugin_config(PLUGIN_NAME, config)?;
    let resolver = RegistryClient::new(config.plain_http_registries.clone()).map_err(|e| {
        Error::RegistryError("Error building registry client".to_string(), e)
    })?;
    Ok(Box::new(ImageRegexp::new(config, Arc::new(resolver))?))
}

impl ImageRegexp {
    pub fn new(config: ImageRegexpConfig, resolver: Arc<dyn TagResolver>) -> Result<Self> {
        let rules = config
            .image_regexp
            .into_iter()
            .map(|rule| {
                let regexp = Regex::new(&rule.regexp).map_err(|e| {
                    Error::RegexError(format!("Error compiling regexp for {}", rule.regexp), e)
                })?;
                debug!(
                    msg = "compiled image rule",
                    regexp = %rule.regexp,
                    replacement = %rule.replacement,
                    resolve_tag = rule.resolve_tag
                );
                Ok(CompiledRule { regexp, rule })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { rules, resolver })
    }

    async fn rewrite_image(&self, image: &mut String) -> Result<()> {
        for CompiledRule { regexp, rule } in &self.rules {
            if !regexp.is_match(image) {
                continue;
            }

            if !rule.replacement.is_empty() {
                let updated = regexp
                    .replace_all(image, rule.replacement.as_str())
                    .into_owned();
                info!(msg = "updated image", from = %image, to = %updated);
                *image = updated;
            }

            if rule.resolve_tag && image.contains('@') {
                debug!(msg = "image already pinned to a digest", %image);
            } else if rule.resolve_tag {
                let reference = ImageReference::parse(image).map_err(|_| {
                    Error::Forbidden(format!("Docker image name regexp failed for '{image}'"))
                })?;
                let digest = self.resolver.resolve(&reference).await.map_err(|e| {
                    Error::Forbidden(format!(
                        "Failed to resolve docker tag for image '{image}': {e}"
                    ))
                })?;
                let resolved = reference.with_digest(&digest);
                info!(msg = "resolved image tag", image = %image, %digest, to = %resolved);
                *image = resolved;
            }
        }
        Ok(())
    }

    async fn handle_container(&self, kind: &str, container: &mut Container) -> Result<()> {
        let Some(image) = container.image.as_mut() else {
            return Ok(());
        };
        self.rewrite_image(image).await.map_err(|e| {
            Error::Forbidden(format!("Error handling {kind} '{}': {e}", container.name))
        })
    }

    async fn handle_pod_spec(&self, spec: &mut PodSpec) -> Result<()> {
        for container in spec.init_containers.iter_mut().flatten() {
            self.handle_container("InitContainer", container).await?;
        }
        for container in spec.containers.iter_mut() {
            self.handle_container("Container", container).await?;
        }
        Ok(())
    }
}

impl Plugin for ImageRegexp {
    fn name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn handles(&self, operation: Operation) -> bool {
        matches!(operation, Operation::Create | Operation::Update)
    }

    fn admit<'a>(&'a self, attributes: &'a mut Attributes) -> BoxFuture<'a, Result<()>> {
        async move {
            if self.rules.is_empty() || attributes.is_subresource() {
                return Ok(());
            }
            let name = attributes.object.name().to_string();
            let Some(spec) = attributes.object.pod_spec_mut() else {
                return Ok(());
            };
            self.handle_pod_spec(spec)
                .await
                .map_err(|e| Error::Forbidden(format!("Error handling '{name}': {e}")))
        }
        .boxed()
    }
}
