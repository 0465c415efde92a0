//! Plan endpoints.
//!
//! Each handler translates HTTP into one [`PlanController`] call and the
//! outcome back into a response. `ETag` headers carry the fingerprint in
//! quoted form; `If-Match` and `If-None-Match` are accepted quoted or bare.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, ETAG, IF_MATCH, IF_NONE_MATCH};
use http::{HeaderMap, HeaderValue, Response, StatusCode};
use http_body_util::Full;
use planvault_core::{
    ErrorDetail, ErrorEnvelope, ETag, PlanController, PlanError, PlanResult, ReadOutcome,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::router::Operation;

/// Header carrying the request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Type alias for HTTP response body.
pub type ResponseBody = Full<Bytes>;

/// Type alias for the HTTP response.
pub type HttpResponse = Response<ResponseBody>;

/// Runs a plan operation.
///
/// `object_id` is the path parameter for item routes. An empty or
/// unparseable body is passed on as absent; the controller rejects it at
/// the point its gate order demands.
pub async fn dispatch(
    controller: &PlanController,
    operation: Operation,
    object_id: Option<&str>,
    headers: &HeaderMap,
    body: &Bytes,
) -> PlanResult<HttpResponse> {
    let id = object_id.unwrap_or_default();
    match operation {
        Operation::CreatePlan => create_plan(controller, decode_body(body)).await,
        Operation::GetPlan => get_plan(controller, id, header_str(headers, &IF_NONE_MATCH)).await,
        Operation::ReplacePlan => {
            let versioned = controller
                .replace(id, decode_body(body), header_str(headers, &IF_MATCH))
                .await?;
            Ok(json_response(StatusCode::OK, &versioned.body, Some(&versioned.etag)))
        }
        Operation::PatchPlan => {
            let versioned = controller
                .merge(id, decode_body(body), header_str(headers, &IF_MATCH))
                .await?;
            Ok(json_response(StatusCode::OK, &versioned.body, Some(&versioned.etag)))
        }
        Operation::DeletePlan => {
            controller.delete(id, header_str(headers, &IF_MATCH)).await?;
            let body = json!({"message": "Plan deleted successfully", "objectId": id});
            Ok(json_response(StatusCode::OK, &body, None))
        }
        Operation::Health | Operation::Ready | Operation::Metrics => Err(PlanError::Unexpected {
            message: format!("{operation} is not a plan operation"),
            source: None,
        }),
    }
}

async fn create_plan(controller: &PlanController, body: Option<Value>) -> PlanResult<HttpResponse> {
    let created = controller.create(body).await?;
    let body = json!({"message": "Plan created successfully", "objectId": created.object_id});
    Ok(json_response(StatusCode::OK, &body, Some(&created.etag)))
}

async fn get_plan(
    controller: &PlanController,
    object_id: &str,
    if_none_match: Option<&str>,
) -> PlanResult<HttpResponse> {
    match controller.read(object_id, if_none_match).await? {
        ReadOutcome::NotModified(etag) => Ok(not_modified(&etag)),
        ReadOutcome::Current(versioned) => {
            Ok(json_response(StatusCode::OK, &versioned.body, Some(&versioned.etag)))
        }
    }
}

fn decode_body(body: &Bytes) -> Option<Value> {
    if body.is_empty() {
        return None;
    }
    match serde_json::from_slice(body) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(error = %e, "request body is not JSON");
            None
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &http::header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn etag_header(etag: &ETag) -> Option<HeaderValue> {
    HeaderValue::from_str(&etag.header_value()).ok()
}

/// A JSON response, with an `ETag` header when given one.
pub fn json_response<T: Serialize + ?Sized>(
    status: StatusCode,
    body: &T,
    etag: Option<&ETag>,
) -> HttpResponse {
    let bytes = serde_json::to_vec(body).unwrap_or_default();
    let mut response = Response::new(Full::new(Bytes::from(bytes)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(value) = etag.and_then(etag_header) {
        response.headers_mut().insert(ETAG, value);
    }
    response
}

fn not_modified(etag: &ETag) -> HttpResponse {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::NOT_MODIFIED;
    if let Some(value) = etag_header(etag) {
        response.headers_mut().insert(ETAG, value);
    }
    response
}

/// Renders a lifecycle failure, adding the current `ETag` on 412.
pub fn plan_error_response(error: &PlanError, request_id: Option<&str>) -> HttpResponse {
    json_response(
        error.status_code(),
        &error.to_envelope(request_id),
        error.current_etag(),
    )
}

/// Renders a failure raised outside the controller.
pub fn error_response(
    status: StatusCode,
    code: &str,
    message: impl Into<String>,
    request_id: Option<&str>,
) -> HttpResponse {
    let envelope = ErrorEnvelope {
        error: ErrorDetail {
            code: code.to_string(),
            message: message.into(),
            object_id: None,
            current_etag: None,
            details: None,
        },
        request_id: request_id.map(ToString::to_string),
    };
    json_response(status, &envelope, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use planvault_core::fixtures::{memory_controller, sample_plan};

    async fn body_json(response: HttpResponse) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn etag_of(response: &HttpResponse) -> String {
        response.headers()[ETAG].to_str().unwrap().to_string()
    }

    fn with_header(name: http::header::HeaderName, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    fn plan_bytes(id: &str) -> Bytes {
        Bytes::from(serde_json::to_vec(&sample_plan(id)).unwrap())
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (controller, _) = memory_controller();
        let headers = HeaderMap::new();

        let created = dispatch(&controller, Operation::CreatePlan, None, &headers, &plan_bytes("p1"))
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::OK);
        let etag = etag_of(&created);
        assert!(etag.starts_with('"') && etag.ends_with('"'));
        assert_eq!(
            body_json(created).await,
            json!({"message": "Plan created successfully", "objectId": "p1"})
        );

        let got = dispatch(&controller, Operation::GetPlan, Some("p1"), &headers, &Bytes::new())
            .await
            .unwrap();
        assert_eq!(etag_of(&got), etag);
        assert_eq!(body_json(got).await, sample_plan("p1"));
    }

    #[tokio::test]
    async fn test_get_not_modified() {
        let (controller, _) = memory_controller();
        let created = dispatch(
            &controller,
            Operation::CreatePlan,
            None,
            &HeaderMap::new(),
            &plan_bytes("p1"),
        )
        .await
        .unwrap();
        let etag = etag_of(&created);

        let response = dispatch(
            &controller,
            Operation::GetPlan,
            Some("p1"),
            &with_header(IF_NONE_MATCH, &etag),
            &Bytes::new(),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(etag_of(&response), etag);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_input() {
        let (controller, _) = memory_controller();
        let err = dispatch(
            &controller,
            Operation::CreatePlan,
            None,
            &HeaderMap::new(),
            &Bytes::from_static(b"{not json"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_put_on_missing_plan_is_not_found_before_body_checks() {
        let (controller, _) = memory_controller();
        let err = dispatch(
            &controller,
            Operation::ReplacePlan,
            Some("ghost"),
            &HeaderMap::new(),
            &Bytes::from_static(b"garbage"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_precondition_failure_carries_etag_header() {
        let (controller, _) = memory_controller();
        let created = controller.create(Some(sample_plan("p1"))).await.unwrap();

        let err = dispatch(
            &controller,
            Operation::DeletePlan,
            Some("p1"),
            &with_header(IF_MATCH, "\"stale\""),
            &Bytes::new(),
        )
        .await
        .unwrap_err();

        let response = plan_error_response(&err, Some("req-1"));
        assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);
        assert_eq!(etag_of(&response), created.etag.header_value());
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "PRECONDITION_FAILED");
        assert_eq!(body["error"]["current_etag"], created.etag.as_str());
        assert_eq!(body["request_id"], "req-1");
    }

    #[tokio::test]
    async fn test_delete() {
        let (controller, publisher) = memory_controller();
        let created = controller.create(Some(sample_plan("p1"))).await.unwrap();

        let response = dispatch(
            &controller,
            Operation::DeletePlan,
            Some("p1"),
            &with_header(IF_MATCH, created.etag.as_str()),
            &Bytes::new(),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"message": "Plan deleted successfully", "objectId": "p1"})
        );
        assert_eq!(publisher.intents().len(), 2);
    }

    #[tokio::test]
    async fn test_error_response_shape() {
        let response = error_response(StatusCode::NOT_FOUND, "ROUTE_NOT_FOUND", "no route", None);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get(ETAG).is_none());
        let body = body_json(response).await;
        assert_eq!(body, json!({"error": {"code": "ROUTE_NOT_FOUND", "message": "no route"}}));
    }
}
