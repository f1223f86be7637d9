//! Copies the legacy hostname/subdomain annotations onto the pod spec fields.

use crate::attributes::{Attributes, Operation};
use crate::error::{Error, Result};
use crate::plugin::Plugin;

use futures::FutureExt;
use futures::future::BoxFuture;
use k8s_openapi::api::core::v1::Pod;
use serde_json::Value;
use tracing::debug;

pub const PLUGIN_NAME: &str = "SSFixup";
pub const POD_HOSTNAME_ANNOTATION: &str = "pod.beta.kubernetes.io/hostname";
pub const POD_SUBDOMAIN_ANNOTATION: &str = "pod.beta.kubernetes.io/subdomain";

#[derive(Default)]
pub struct SSFixup;

pub fn factory(_config: Option<Value>) -> Result<Box<dyn Plugin>> {
    Ok(Box::new(SSFixup))
}

fn copy_annotation(pod_name: &str, annotation: Option<&String>, field: &mut Option<String>) {
    let Some(value) = annotation else {
        return;
    };
    if field.as_deref().is_none_or(str::is_empty) {
        debug!(msg = "copying annotation to pod spec", pod = pod_name, %value);
        *field = Some(value.clone());
    }
}

impl SSFixup {
    fn fixup(pod: &mut Pod) {
        let name = pod.metadata.name.as_deref().unwrap_or_default();
        let annotations = pod.metadata.annotations.as_ref();
        let Some(spec) = pod.spec.as_mut() else {
            return;
        };

        copy_annotation(
            name,
            annotations.and_then(|a| a.get(POD_HOSTNAME_ANNOTATION)),
            &mut spec.hostname,
        );
        copy_annotation(
            name,
            annotations.and_then(|a| a.get(POD_SUBDOMAIN_ANNOTATION)),
            &mut spec.subdomain,
        );
    }
}

impl Plugin for SSFixup {
    fn name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn handles(&self, operation: Operation) -> bool {
        matches!(operation, Operation::Create | Operation::Update)
    }

    fn admit<'a>(&'a self, attributes: &'a mut Attributes) -> BoxFuture<'a, Result<()>> {
        let result = if attributes.is_pod() {
            match attributes.object.as_pod_mut() {
                Some(pod) => {
                    Self::fixup(pod);
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
