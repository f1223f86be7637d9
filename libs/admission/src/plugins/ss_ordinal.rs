//! Labels StatefulSet pods with their ordinal, taken from the pod name.

use crate::attributes::{Attributes, Operation};
use crate::config::decode_plugin_config;
use crate::error::{Error, Result};
use crate::plugin::Plugin;

use futures::FutureExt;
use futures::future::BoxFuture;
use k8s_openapi::api::core::v1::Pod;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

pub const PLUGIN_NAME: &str = "SSOrdinal";
pub const DEFAULT_ORDINAL_LABEL: &str = "hubspot.com/ss-ordinal";
const STATEFUL_SET_KIND: &str = "StatefulSet";

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SSOrdinalConfig {
    #[serde(default = "default_ordinal_label")]
    pub ordinal_label: String,
}

fn default_ordinal_label() -> String {
    DEFAULT_ORDINAL_LABEL.to_string()
}

impl Default for SSOrdinalConfig {
    fn default() -> Self {
        Self {
            ordinal_label: default_ordinal_label(),
        }
    }
}

pub struct SSOrdinal {
    config: SSOrdinalConfig,
}

pub fn factory(config: Option<Value>) -> Result<Box<dyn Plugin>> {
    let config = decode_plugin_config(PLUGIN_NAME, config)?;
    Ok(Box::new(SSOrdinal::new(config)))
}

/// Suffix of `pod_name` after `<owner>-`, if any.
fn ordinal<'a>(pod_name: &'a str, owner: &str) -> Option<&'a str> {
    pod_name
        .strip_prefix(owner)
        .and_then(|rest| rest.strip_prefix('-'))
        .filter(|suffix| !suffix.is_empty())
}

impl SSOrdinal {
    pub fn new(config: SSOrdinalConfig) -> Self {
        Self { config }
    }

    fn label(&self, pod: &mut Pod) {
        let Some(name) = pod.metadata.name.as_deref() else {
            return;
        };

        let ordinals: Vec<String> = pod
            .metadata
            .owner_references
            .iter()
            .flatten()
            .filter(|owner| owner.kind == STATEFUL_SET_KIND)
            .filter_map(|owner| ordinal(name, &owner.name))
            .map(str::to_string)
            .collect();

        for value in ordinals {
            debug!(
                msg = "setting ordinal label",
                pod = name,
                label = %self.config.ordinal_label,
                %value
            );
            pod.metadata
                .labels
                .get_or_insert_with(Default::default)
                .insert(self.config.ordinal_label.clone(), value);
        }
    }
}

impl Plugin for SSOrdinal {
    fn name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn handles(&self, operation: Operation) -> bool {
        operation == Operation::Create
    }

    fn admit<'a>(&'a self, attributes: &'a mut Attributes) -> BoxFuture<'a, Result<()>> {
        let result = if attributes.is_pod() {
            match attributes.object.as_pod_mut() {
                Some(pod) => {
                    self.label(pod);
                    Ok(())
                }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::GroupVersionResource;
    use crate::object::AdmissionObject;

    use std::collections::BTreeMap;

    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
    use serde_json::json;

    fn owner(kind: &str, name: &str) -> OwnerReference {
        OwnerReference {
            api_version: "apps/v1".to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            uid: "d9607e19-f88f-11e6-a518-42010a800195".to_string(),
            ..OwnerReference::default()
        }
    }

    fn attributes(
        name: &str,
        labels: Option<BTreeMap<String, String>>,
        owners: Vec<OwnerReference>,
    ) -> Attributes {
        Attributes::new(
            GroupVersionResource::new("", "v1", "pods"),
            Operation::Create,
            AdmissionObject::Pod(Box::new(Pod {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    labels,
                    owner_references: Some(owners),
                    ..ObjectMeta::default()
                },
                ..Pod::default()
            })),
        )
    }

    fn labels(attributes: &mut Attributes) -> Option<BTreeMap<String, String>> {
        attributes
            .object
            .as_pod_mut()
            .and_then(|pod| pod.metadata.labels.clone())
    }

    #[test]
    fn test_ordinal() {
        assert_eq!(ordinal("web-0", "web"), Some("0"));
        assert_eq!(ordinal("web-api-12", "web-api"), Some("12"));
        assert_eq!(ordinal("web-api-12", "web"), Some("api-12"));
        assert_eq!(ordinal("web", "web"), None);
        assert_eq!(ordinal("web-", "web"), None);
        assert_eq!(ordinal("webby-0", "web"), None);
        assert_eq!(ordinal("db-0", "web"), None);
    }

    #[tokio::test]
    async fn test_sets_label_and_keeps_existing() {
        let plugin = SSOrdinal::new(SSOrdinalConfig::default());
        let existing = BTreeMap::from([("app".to_string(), "web".to_string())]);
        let mut attrs = attributes("web-3", Some(existing), vec![owner("StatefulSet", "web")]);

        plugin.admit(&mut attrs).await.unwrap();

        assert_eq!(
            labels(&mut attrs),
            Some(BTreeMap::from([
                ("app".to_string(), "web".to_string()),
                (DEFAULT_ORDINAL_LABEL.to_string(), "3".to_string()),
            ]))
        );
    }

    #[tokio::test]
    async fn test_creates_labels() {
        let plugin = factory(Some(json!({"ordinalLabel": "example.com/ordinal"}))).unwrap();
        let mut attrs = attributes("kafka-11", None, vec![owner("StatefulSet", "kafka")]);

        plugin.admit(&mut attrs).await.unwrap();

        assert_eq!(
            labels(&mut attrs),
            Some(BTreeMap::from([(
                "example.com/ordinal".to_string(),
                "11".to_string()
            )]))
        );
    }

    #[tokio::test]
    async fn test_ignores_other_owners() {
        let plugin = SSOrdinal::new(SSOrdinalConfig::default());
        let mut attrs = attributes(
            "web-7d9f8-x2x4z",
            None,
            vec![owner("ReplicaSet", "web-7d9f8"), owner("StatefulSet", "db")],
        );

        plugin.admit(&mut attrs).await.unwrap();

        assert_eq!(labels(&mut attrs), None);
    }

    #[tokio::test]
    async fn test_pod_named_like_owner() {
        let plugin = SSOrdinal::new(SSOrdinalConfig::default());
        let mut attrs = attributes("web", None, vec![owner("StatefulSet", "web")]);

        plugin.admit(&mut attrs).await.unwrap();

        assert_eq!(labels(&mut attrs), None);
    }

    #[test]
    fn test_handles_create_only() {
        let plugin = SSOrdinal::new(SSOrdinalConfig::default());
        assert!(plugin.handles(Operation::Create));
        assert!(!plugin.handles(Operation::Update));
    }
}
