use crate::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use crate::state::WebhookState;

use podgate_admission::{AdmissionObject, Attributes, Chain, Error};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{Router, get, post};
use serde_json::Value;
use tracing::{debug, error, info};

async fn livez() -> &'static str {
    "healthy"
}

async fn readyz(State(state): State<WebhookState>) -> impl IntoResponse {
    if state.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/livez", get(livez))
        .route("/readyz", get(readyz))
        .route("/mutate", post(mutate))
        .with_state(state)
}

/// Run the admission chain over a single request and build the response, including a
/// JSON patch when plugins changed the object.
pub async fn admit(chain: &Chain, request: &AdmissionRequest<Value>) -> AdmissionResponse {
    let uid = request.uid.clone();
    let resource = &request.resource.resource;
    let dry_run = request.dry_run.unwrap_or_default();

    let Some(object) = request.object.clone() else {
        debug!(
            msg = "request without object, nothing to admit",
            %uid,
            operation = %request.operation,
            %resource
        );
        return AdmissionResponse::allow(uid);
    };

    let object = match AdmissionObject::decode(resource, object) {
        Ok(object) => object,
        Err(err) => return AdmissionResponse::from_error(uid, &err),
    };

    let original = match object.to_value() {
        Ok(value) => value,
        Err(err) => return AdmissionResponse::from_error(uid, &err),
    };

    let mut attributes = Attributes {
        name: request
            .name
            .clone()
            .unwrap_or_else(|| object.name().to_string()),
        namespace: request.namespace.clone(),
        resource: request.resource.clone(),
        sub_resource: request.sub_resource.clone(),
        operation: request.operation,
        object,
    };

    if let Err(err) = chain.admit(&mut attributes).await {
        info!(
            msg = "admission denied",
            %uid,
            operation = %attributes.operation,
            %resource,
            namespace = attributes.namespace.as_deref().unwrap_or_default(),
            name = %attributes.name,
            dry_run,
            %err
        );
        return AdmissionResponse::from_error(uid, &err);
    }

    let mutated = match attributes.object.to_value() {
        Ok(value) => value,
        Err(err) => return AdmissionResponse::from_error(uid, &err),
    };

    let patch = json_patch::diff(&original, &mutated);
    if patch.0.is_empty() {
        debug!(
            msg = "admission allowed without changes",
            %uid,
            %resource,
            name = %attributes.name,
            dry_run
        );
        return AdmissionResponse::allow(uid);
    }

    debug!(
        msg = "admission allowed with patch",
        %uid,
        %resource,
        name = %attributes.name,
        dry_run,
        operations = patch.0.len()
    );
    AdmissionResponse::allow(uid.clone())
        .with_patch(&patch)
        .unwrap_or_else(|e| {
            AdmissionResponse::from_error(
                uid,
                &Error::SerializationError("failed to serialize patch".to_string(), e),
            )
        })
}

pub async fn mutate(
    State(state): State<WebhookState>,
    Json(review): Json<AdmissionReview<Value>>,
) -> Json<AdmissionReview<()>> {
    let response = match review.request.as_ref() {
        Some(request) => admit(&state.chain, request).await,
        None => {
            error!("Missing request in admission review");
            AdmissionResponse::deny(
                "unknown".to_string(),
                400,
                "BadRequest",
                "Invalid admission review: missing request",
            )
        }
    };
    Json(review.response(response))
}
