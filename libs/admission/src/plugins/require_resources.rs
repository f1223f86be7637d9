//! Rejects Pods whose containers declare neither resource requests nor limits.

use crate::attributes::{Attributes, Operation};
use crate::config::decode_plugin_config;
use crate::error::{Error, Result};
use crate::plugin::Plugin;

use futures::FutureExt;
use futures::future::BoxFuture;
use k8s_openapi::api::core::v1::{Container, Pod};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

pub const PLUGIN_NAME: &str = "RequireResources";
pub const DEFAULT_BEST_EFFORT_ANNOTATION: &str = "hubspot.com/allow-best-effort";

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequireResourcesConfig {
    /// Pods carrying this annotation, with any value, may run without resources.
    #[serde(default = "default_best_effort_annotation")]
    pub best_effort_annotation: String,
}

fn default_best_effort_annotation() -> String {
    DEFAULT_BEST_EFFORT_ANNOTATION.to_string()
}

impl Default for RequireResourcesConfig {
    fn default() -> Self {
        Self {
            best_effort_annotation: default_best_effort_annotation(),
        }
    }
}

pub struct RequireResources {
    config: RequireResourcesConfig,
}

pub fn factory(config: Option<Value>) -> Result<Box<dyn Plugin>> {
    let config = decode_plugin_config(PLUGIN_NAME, config)?;
    Ok(Box::new(RequireResources::new(config)))
}

fn has_empty_resources(container: &Container) -> bool {
    container.resources.as_ref().is_none_or(|r| {
        r.requests.as_ref().is_none_or(|m| m.is_empty())
            && r.limits.as_ref().is_none_or(|m| m.is_empty())
    })
}

impl RequireResources {
    pub fn new(config: RequireResourcesConfig) -> Self {
        Self { config }
    }

    fn validate(&self, pod: &Pod) -> Result<()> {
        let allow_best_effort = pod
            .metadata
            .annotations
            .as_ref()
            .is_some_and(|a| a.contains_key(&self.config.best_effort_annotation));
        if allow_best_effort {
            debug!(
                msg = "best effort pod allowed by annotation",
                annotation = %self.config.best_effort_annotation
            );
            return Ok(());
        }

        let Some(spec) = pod.spec.as_ref() else {
            return Ok(());
        };

        if let Some(container) = spec
            .init_containers
            .iter()
            .flatten()
            .find(|c| has_empty_resources(c))
        {
            return Err(Error::BadRequest(format!(
                "Init container '{}' must have resources set.",
                container.name
            )));
        }

        if let Some(container) = spec.containers.iter().find(|c| has_empty_resources(c)) {
            return Err(Error::BadRequest(format!(
                "Container '{}' must have resources set.",
                container.name
            )));
        }

        Ok(())
    }
}

impl Plugin for RequireResources {
    fn name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn handles(&self, operation: Operation) -> bool {
        matches!(operation, Operation::Create | Operation::Update)
    }

    fn admit<'a>(&'a self, attributes: &'a mut Attributes) -> BoxFuture<'a, Result<()>> {
        let result = if attributes.is_pod() {
            match attributes.object.as_pod_mut() {
                Some(pod) => self.validate(pod),
                None => Err(Error::BadRequest(
                    "Resource was marked with kind Pod but was unable to be converted".to_string(),
                )),
            }
        } else {
            Ok(())
        };
        futures::future::ready(result).boxed()
    }
}
