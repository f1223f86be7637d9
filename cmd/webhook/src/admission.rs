use podgate_admission::{Error, GroupVersionResource, Operation};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

const API_VERSION: &str = "admission.k8s.io/v1";
const KIND: &str = "AdmissionReview";
const JSON_PATCH: &str = "JSONPatch";

#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReview<T> {
    pub api_version: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<AdmissionRequest<T>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<AdmissionResponse>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct GroupVersionKind {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub kind: String,
}

#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest<T> {
    pub uid: String,
    #[serde(default)]
    pub kind: GroupVersionKind,
    pub resource: GroupVersionResource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_resource: Option<String>,
    pub operation: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    pub uid: String,
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    /// Base64 encoded JSON patch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch_type: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Status {
    pub code: u16,
    pub message: String,
    pub reason: String,
}

impl AdmissionResponse {
    pub fn allow(uid: String) -> Self {
        Self {
            uid,
            allowed: true,
            status: None,
            patch: None,
            patch_type: None,
        }
    }

    pub fn deny(uid: String, code: u16, reason: &str, message: impl Into<String>) -> Self {
        Self {
            uid,
            allowed: false,
            status: Some(Status {
                code,
                message: message.into(),
                reason: reason.to_string(),
            }),
            patch: None,
            patch_type: None,
        }
    }

    pub fn from_error(uid: String, error: &Error) -> Self {
        Self::deny(uid, error.code(), error.reason(), error.to_string())
    }

    pub fn with_patch(mut self, patch: &json_patch::Patch) -> Result<Self, serde_json::Error> {
        let bytes = serde_json::to_vec(patch)?;
        self.patch = Some(STANDARD.encode(bytes));
        self.patch_type = Some(JSON_PATCH.to_string());
        Ok(self)
    }
}

impl<T> AdmissionReview<T> {
    pub fn response(self, response: AdmissionResponse) -> AdmissionReview<()> {
        AdmissionReview {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            request: None,
            response: Some(response),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let review: AdmissionReview<serde_json::Value> = serde_json::from_value(json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
                "kind": {"group": "", "version": "v1", "kind": "Pod"},
                "resource": {"group": "", "version": "v1", "resource": "pods"},
                "subResource": "status",
                "operation": "UPDATE",
                "namespace": "default",
                "object": {"metadata": {"name": "web-0"}},
                "dryRun": true
            }
        }))
        .unwrap();

        let request = review.request.unwrap();
        assert_eq!(request.operation, Operation::Update);
        assert_eq!(request.resource.resource, "pods");
        assert_eq!(request.sub_resource.as_deref(), Some("status"));
        assert_eq!(request.kind.kind, "Pod");
        assert_eq!(request.name, None);
        assert_eq!(request.dry_run, Some(true));
    }

    #[test]
    fn test_response_wire_format() {
        let patch: json_patch::Patch = serde_json::from_value(json!([
            {"op": "add", "path": "/spec/hostname", "value": "web-0"}
        ]))
        .unwrap();
        let response = AdmissionResponse::allow("uid-1".to_string())
            .with_patch(&patch)
            .unwrap();
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["patchType"], "JSONPatch");
        let decoded = STANDARD.decode(value["patch"].as_str().unwrap()).unwrap();
        assert_eq!(
            serde_json::from_slice::<serde_json::Value>(&decoded).unwrap(),
            json!([{"op": "add", "path": "/spec/hostname", "value": "web-0"}])
        );
        assert!(value.get("status").is_none());
    }

    #[test]
    fn test_deny_from_error() {
        let error = Error::BadRequest("Container 'app' must have resources set.".to_string());
        let value =
            serde_json::to_value(AdmissionResponse::from_error("uid-2".to_string(), &error))
                .unwrap();
        assert_eq!(
            value,
            json!({
                "uid": "uid-2",
                "allowed": false,
                "status": {
                    "code": 400,
                    "message": "Container 'app' must have resources set.",
                    "reason": "BadRequest"
                }
            })
        );
    }
}
