use crate::object::AdmissionObject;

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Create,
    Update,
    Delete,
    Connect,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Create => "CREATE",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
            Operation::Connect => "CONNECT",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct GroupVersionResource {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    pub resource: String,
}

impl GroupVersionResource {
    pub fn new(group: &str, version: &str, resource: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            resource: resource.to_string(),
        }
    }
}

/// Everything a plugin gets to see about a single admission request.
pub struct Attributes {
    pub name: String,
    pub namespace: Option<String>,
    pub resource: GroupVersionResource,
    pub sub_resource: Option<String>,
    pub operation: Operation,
    pub object: AdmissionObject,
}

impl Attributes {
    pub fn new(
        resource: GroupVersionResource,
        operation: Operation,
        object: AdmissionObject,
    ) -> Self {
        Self {
            name: object.name().to_string(),
            namespace: None,
            resource,
            sub_resource: None,
            operation,
            object,
        }
    }

    pub fn with_sub_resource(mut self, sub_resource: impl Into<String>) -> Self {
        self.sub_resource = Some(sub_resource.into());
        self
    }

    pub fn is_subresource(&self) -> bool {
        self.sub_resource.as_deref().is_some_and(|s| !s.is_empty())
    }

    pub fn resource_name(&self) -> &str {
        &self.resource.resource
    }

    /// Pods addressed directly, not through a subresource such as `status` or `binding`.
    pub fn is_pod(&self) -> bool {
        !self.is_subresource() && self.resource_name() == "pods"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use k8s_openapi::api::core::v1::Pod;

    fn pod_attributes() -> Attributes {
        Attributes::new(
            GroupVersionResource::new("", "v1", "pods"),
            Operation::Create,
            AdmissionObject::Pod(Box::default()),
        )
    }

    #[test]
    fn test_operation_wire_format() {
        assert_eq!(
            serde_json::from_str::<Operation>("\"CONNECT\"").unwrap(),
            Operation::Connect
        );
        assert_eq!(serde_json::to_string(&Operation::Update).unwrap(), "\"UPDATE\"");
        assert_eq!(Operation::Delete.to_string(), "DELETE");
    }

    #[test]
    fn test_is_pod() {
        assert!(pod_attributes().is_pod());
        assert!(!pod_attributes().with_sub_resource("status").is_pod());
        assert!(pod_attributes().with_sub_resource("").is_pod());

        let deployment = Attributes::new(
            GroupVersionResource::new("apps", "v1", "deployments"),
            Operation::Create,
            AdmissionObject::Pod(Box::new(Pod::default())),
        );
        assert!(!deployment.is_pod());
    }
}
