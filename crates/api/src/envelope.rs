//! Response envelope and status mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use shelf_core::{Error, Row, StoreRecord};

/// Successful envelope: `success: true` plus the payload's fields
pub fn success(payload: Value) -> Json<Value> {
    let mut body = json!({"success": true});
    if let (Some(body_map), Value::Object(payload)) = (body.as_object_mut(), payload) {
        for (key, value) in payload {
            body_map.insert(key, value);
        }
    }
    Json(body)
}

/// Failure envelope: `success: false` plus the reason
pub fn failure_body(err: &Error) -> Value {
    json!({"success": false, "reason": err.to_string()})
}

/// Status code for each failure class
///
/// The engine stays status-agnostic; this mapping is the routing layer's
/// whole opinion on the matter.
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::StoreNotFound(_) | Error::RowNotFound(_) => StatusCode::NOT_FOUND,
        Error::AlreadyExists(_) | Error::UnresolvedConflict(_) => StatusCode::CONFLICT,
        Error::Validation(_) | Error::InvalidSchema(_) | Error::InvalidToken(_) => {
            StatusCode::BAD_REQUEST
        }
        Error::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::Canceled(_) | Error::Serialization(_) | Error::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Engine failure as an HTTP response
#[derive(Debug)]
pub struct ApiFailure(pub Error);

impl From<Error> for ApiFailure {
    fn from(err: Error) -> Self {
        ApiFailure(err)
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(code = self.0.code(), error = %self.0, "request failed");
        }
        (status, Json(failure_body(&self.0))).into_response()
    }
}

/// Store record payload fragment
pub fn store_payload(record: &StoreRecord) -> Value {
    serde_json::to_value(record).unwrap_or(Value::Null)
}

/// Row payload fragment
pub fn row_payload(row: &Row) -> Value {
    serde_json::to_value(row).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_core::{RowId, StoreId, ValidationError};

    #[test]
    fn test_success_merges_payload() {
        let body = success(json!({"store": {"x": 1}})).0;
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["store"]["x"], json!(1));
    }

    #[test]
    fn test_failure_carries_reason() {
        let err = Error::RowNotFound(RowId::new("r9"));
        let body = failure_body(&err);
        assert_eq!(body["success"], json!(false));
        assert!(body["reason"].as_str().unwrap().contains("r9"));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&Error::StoreNotFound(StoreId::new("s"))),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&Error::AlreadyExists(StoreId::new("s"))),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&Error::Validation(ValidationError::MissingField {
                field: "f".into()
            })),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&Error::UnresolvedConflict(RowId::new("r"))),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&Error::BackendUnavailable("down".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
