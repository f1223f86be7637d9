use crate::error::{Error, Result};

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Object carried by an admission request, decoded according to its resource.
#[derive(Clone, Debug, PartialEq)]
pub enum AdmissionObject {
    Pod(Box<Pod>),
    ReplicaSet(Box<ReplicaSet>),
    Deployment(Box<Deployment>),
    DaemonSet(Box<DaemonSet>),
    StatefulSet(Box<StatefulSet>),
    Job(Box<Job>),
    CronJob(Box<CronJob>),
    Other(Value),
}

fn decode_boxed<T: DeserializeOwned>(resource: &str, value: Value) -> Result<Box<T>> {
    serde_json::from_value(value).map(Box::new).map_err(|e| {
        tracing::debug!(msg = "failed to convert object", resource, %e);
        Error::BadRequest(format!(
            "Resource type '{resource}' was unable to be converted"
        ))
    })
}

impl AdmissionObject {
    pub fn decode(resource: &str, value: Value) -> Result<Self> {
        let object = match resource {
            "pods" => Self::Pod(decode_boxed(resource, value)?),
            "replicasets" => Self::ReplicaSet(decode_boxed(resource, value)?),
            "deployments" => Self::Deployment(decode_boxed(resource, value)?),
            "daemonsets" => Self::DaemonSet(decode_boxed(resource, value)?),
            "statefulsets" => Self::StatefulSet(decode_boxed(resource, value)?),
            "jobs" => Self::Job(decode_boxed(resource, value)?),
            "cronjobs" => Self::CronJob(decode_boxed(resource, value)?),
            _ => Self::Other(value),
        };
        Ok(object)
    }

    pub fn metadata(&self) -> Option<&ObjectMeta> {
        match self {
            Self::Pod(o) => Some(&o.metadata),
            Self::ReplicaSet(o) => Some(&o.metadata),
            Self::Deployment(o) => Some(&o.metadata),
            Self::DaemonSet(o) => Some(&o.metadata),
            Self::StatefulSet(o) => Some(&o.metadata),
            Self::Job(o) => Some(&o.metadata),
            Self::CronJob(o) => Some(&o.metadata),
            Self::Other(_) => None,
        }
    }

    pub fn name(&self) -> &str {
        self.metadata()
            .and_then(|m| m.name.as_deref().or(m.generate_name.as_deref()))
            .unwrap_or_default()
    }

    pub fn as_pod_mut(&mut self) -> Option<&mut Pod> {
        match self {
            Self::Pod(pod) => Some(pod.as_mut()),
            _ => None,
        }
    }

    /// Pod spec embedded in the object, directly for Pods or through the pod template
    /// of a workload.
    pub fn pod_spec_mut(&mut self) -> Option<&mut PodSpec> {
        match self {
            Self::Pod(o) => o.spec.as_mut(),
            Self::ReplicaSet(o) => o
                .spec
                .as_mut()
                .and_then(|s| s.template.as_mut())
                .and_then(|t| t.spec.as_mut()),
            Self::Deployment(o) => o.spec.as_mut().and_then(|s| s.template.spec.as_mut()),
            Self::DaemonSet(o) => o.spec.as_mut().and_then(|s| s.template.spec.as_mut()),
            Self::StatefulSet(o) => o.spec.as_mut().and_then(|s| s.template.spec.as_mut()),
            Self::Job(o) => o.spec.as_mut().and_then(|s| s.template.spec.as_mut()),
            Self::CronJob(o) => o
                .spec
                .as_mut()
                .and_then(|s| s.job_template.spec.as_mut())
                .and_then(|s| s.template.spec.as_mut()),
            Self::Other(_) => None,
        }
    }

    pub fn to_value(&self) -> Result<Value> {
        let value = match self {
            Self::Pod(o) => serde_json::to_value(o),
            Self::ReplicaSet(o) => serde_json::to_value(o),
            Self::Deployment(o) => serde_json::to_value(o),
            Self::DaemonSet(o) => serde_json::to_value(o),
            Self::StatefulSet(o) => serde_json::to_value(o),
            Self::Job(o) => serde_json::to_value(o),
            Self::CronJob(o) => serde_json::to_value(o),
            Self::Other(value) => Ok(value.clone()),
        };
        value.map_err(|e| Error::SerializationError("failed to serialize object".to_string(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn pod_template(image: &str) -> Value {
        json!({
            "metadata": {"labels": {"app": "web"}},
            "spec": {"containers": [{"name": "app", "image": image}]}
        })
    }

    #[test]
    fn test_decode_pod() {
        let mut object = AdmissionObject::decode(
            "pods",
            json!({
                "apiVersion": "v1",
                "kind": "Pod",
                "metadata": {"name": "web-0"},
                "spec": {"containers": [{"name": "app", "image": "nginx"}]}
            }),
        )
        .unwrap();
        assert_eq!(object.name(), "web-0");
        assert!(object.as_pod_mut().is_some());
        assert_eq!(object.pod_spec_mut().unwrap().containers[0].name, "app");
    }

    #[test]
    fn test_decode_workload_templates() {
        let workloads = [
            ("replicasets", "ReplicaSet"),
            ("deployments", "Deployment"),
            ("daemonsets", "DaemonSet"),
            ("statefulsets", "StatefulSet"),
            ("jobs", "Job"),
        ];
        for (resource, kind) in workloads {
            let mut object = AdmissionObject::decode(
                resource,
                json!({
                    "apiVersion": if resource == "jobs" { "batch/v1" } else { "apps/v1" },
                    "kind": kind,
                    "metadata": {"name": "web"},
                    "spec": {
                        "selector": {"matchLabels": {"app": "web"}},
                        "serviceName": "web",
                        "template": pod_template("nginx:1.27")
                    }
                }),
            )
            .unwrap();
            assert!(object.as_pod_mut().is_none(), "{resource}");
            let spec = object.pod_spec_mut().unwrap();
            assert_eq!(spec.containers[0].image.as_deref(), Some("nginx:1.27"));
        }
    }

    #[test]
    fn test_decode_cronjob() {
        let mut object = AdmissionObject::decode(
            "cronjobs",
            json!({
                "apiVersion": "batch/v1",
                "kind": "CronJob",
                "metadata": {"name": "backup"},
                "spec": {
                    "schedule": "0 * * * *",
                    "jobTemplate": {"spec": {"template": pod_template("backup:v2")}}
                }
            }),
        )
        .unwrap();
        let spec = object.pod_spec_mut().unwrap();
        assert_eq!(spec.containers[0].image.as_deref(), Some("backup:v2"));
    }

    #[test]
    fn test_decode_other_resource() {
        let value = json!({"metadata": {"name": "cfg"}, "data": {"a": "b"}});
        let mut object = AdmissionObject::decode("configmaps", value.clone()).unwrap();
        assert!(object.pod_spec_mut().is_none());
        assert_eq!(object.name(), "");
        assert_eq!(object.to_value().unwrap(), value);
    }

    #[test]
    fn test_decode_failure_is_bad_request() {
        let err = AdmissionObject::decode("pods", json!({"spec": {"containers": "nope"}}))
            .unwrap_err();
        assert_eq!(err.code(), 400);
        assert_eq!(
            err.to_string(),
            "Resource type 'pods' was unable to be converted"
        );
    }

    #[test]
    fn test_replicaset_without_template() {
        let mut object = AdmissionObject::decode(
            "replicasets",
            json!({"metadata": {"name": "rs"}, "spec": {"selector": {}}}),
        )
        .unwrap();
        assert!(object.pod_spec_mut().is_none());
    }
}
