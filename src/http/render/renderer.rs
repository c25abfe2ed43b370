use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use tracing::warn;

use crate::model::FleetError;

pub type ApiResult = Result<Response, ApiError>;

/// Wraps a domain error so handlers can use `?`.
#[derive(Debug)]
pub struct ApiError(pub FleetError);

impl<E: Into<FleetError>> From<E> for ApiError {
    fn from(err: E) -> Self {
        ApiError(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error(&self.0)
    }
}

pub fn status_of(err: &FleetError) -> StatusCode {
    match err {
        FleetError::Validation(_) => StatusCode::BAD_REQUEST,
        FleetError::Conflict(_) | FleetError::ResourceExhausted { .. } => StatusCode::CONFLICT,
        FleetError::NotFound(_) => StatusCode::NOT_FOUND,
        FleetError::Busy(_) => StatusCode::SERVICE_UNAVAILABLE,
        FleetError::UnreachablePeer { .. } => StatusCode::BAD_GATEWAY,
        FleetError::Signature(_) => StatusCode::UNAUTHORIZED,
        FleetError::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// `{"status":"success","data":...}`
pub fn ok<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(json!({ "status": "success", "data": data }))).into_response()
}

/// `{"status":"error","kind":...,"message":...}`
pub fn error(err: &FleetError) -> Response {
    let status = status_of(err);
    if status.is_server_error() {
        warn!(component = "api", event = "request_failed", kind = err.kind(), error = %err, "request failed");
    }
    (
        status,
        Json(json!({ "status": "error", "kind": err.kind(), "message": err.to_string() })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Operation, ValidationError};
    use http_body_util::BodyExt;

    async fn body(resp: Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn errors_render_with_kind_and_status() {
        let resp = error(&ValidationError::new("name", "too long").into());
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body(resp).await;
        assert_eq!(json["status"], "error");
        assert_eq!(json["kind"], "validation");
        assert_eq!(json["message"], "invalid name: too long");

        assert_eq!(status_of(&FleetError::Busy(Operation::Install)), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_of(&FleetError::NotFound("x".into())), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn success_wraps_data() {
        let json = body(ok(vec![1, 2])).await;
        assert_eq!(json, serde_json::json!({"status": "success", "data": [1, 2]}));
    }
}
