//! Per-request trace id and access logging.

use std::time::Instant;

use axum::BoxError;
use axum::body::{Body, HttpBody};
use axum::extract::Request;
use axum::http::{HeaderMap, HeaderValue, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::error::ServerError;

pub static X_TRACE_ID: &str = "x-trace-id";

/// JSON bodies whose exact size is at most this are buffered and logged.
const MAX_LOGGED_BODY: usize = 1024;

/// Attach an `x-trace-id` to the request and response and log both ends.
///
/// An incoming UUID trace id is reused; anything else is replaced.  Only
/// small JSON bodies of known size are buffered; everything else, streaming
/// responses included, passes through untouched so the extractors' own
/// limits still apply.
pub async fn trace_middleware(req: Request, next: Next) -> Response {
    let start_time = Instant::now();

    let trace_id = req
        .headers()
        .get(X_TRACE_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);
    let trace_header = HeaderValue::from_str(&trace_id.to_string())
        .unwrap_or_else(|_| HeaderValue::from_static("invalid"));

    let span = info_span!(
        "http_request",
        trace_id = %trace_id,
        method = %req.method(),
        path = %req.uri().path(),
    );

    async move {
        info!("→ request started");
        let (parts, body) = req.into_parts();
        let response = match log_body("request", &parts.headers, body).await {
            Ok(body) => {
                let mut req = Request::from_parts(parts, body);
                req.headers_mut().insert(X_TRACE_ID, trace_header.clone());
                let (parts, body) = next.run(req).await.into_parts();
                match log_body("response", &parts.headers, body).await {
                    Ok(body) => Response::from_parts(parts, body),
                    Err(e) => {
                        ServerError::Internal(format!("failed to read response body: {e}"))
                            .into_response()
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to read request body");
                unreadable_request(e).into_response()
            }
        };
        finish(response, trace_header, start_time)
    }
    .instrument(span)
    .await
}

fn finish(mut response: Response, trace_header: HeaderValue, start_time: Instant) -> Response {
    response.headers_mut().insert(X_TRACE_ID, trace_header);
    info!(
        status = response.status().as_u16(),
        latency_ms = start_time.elapsed().as_millis(),
        "← response finished"
    );
    response
}

fn unreadable_request(e: BoxError) -> ServerError {
    if e.is::<LengthLimitError>() {
        ServerError::PayloadTooLarge(format!(
            "request body is longer than its declared size of at most {MAX_LOGGED_BODY} bytes"
        ))
    } else {
        ServerError::BadRequest(format!("failed to read request body: {e}"))
    }
}

fn content_type(headers: &HeaderMap) -> &str {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

/// Log `body` and hand it back.  A small JSON body is collected through a
/// [`Limited`] reader and replayed; any other body is returned as it came.
async fn log_body(direction: &str, headers: &HeaderMap, body: Body) -> Result<Body, BoxError> {
    let content_type = content_type(headers);
    match body.size_hint().exact() {
        Some(size) if content_type.contains("application/json") && size <= MAX_LOGGED_BODY as u64 => {
            let bytes = Limited::new(body, MAX_LOGGED_BODY)
                .collect()
                .await?
                .to_bytes();
            match std::str::from_utf8(&bytes) {
                Ok(text) => info!(direction, body = text, "body"),
                Err(_) => info!(direction, size, "body is not utf-8"),
            }
            Ok(Body::from(bytes))
        }
        Some(0) | None => Ok(body),
        Some(size) => {
            info!(direction, content_type, size, "body skipped");
            Ok(body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::http::StatusCode;

    fn headers(content_type: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers
    }

    #[tokio::test]
    async fn small_json_body_is_replayed() {
        let body = log_body("request", &headers("application/json"), Body::from("{\"a\":1}"))
            .await
            .expect("readable body");
        assert_eq!(body.size_hint().exact(), Some(7));
        let bytes = body.collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"{\"a\":1}");
    }

    #[tokio::test]
    async fn large_body_passes_through_unbuffered() {
        let payload = vec![b'x'; MAX_LOGGED_BODY * 4];
        let body = log_body("request", &headers("application/json"), Body::from(payload.clone()))
            .await
            .expect("untouched body");
        let bytes = body.collect().await.unwrap().to_bytes();
        assert_eq!(bytes.len(), payload.len());
    }

    #[tokio::test]
    async fn unsized_body_keeps_its_read_error() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"{")),
            Err(std::io::Error::other("connection reset")),
        ];
        let body = log_body(
            "request",
            &headers("application/json"),
            Body::from_stream(futures::stream::iter(chunks)),
        )
        .await
        .expect("streamed bodies are not read here");
        assert!(body.collect().await.is_err());
    }

    #[tokio::test]
    async fn overlong_body_maps_to_413() {
        let err = Limited::new(Body::from(vec![0u8; 16]), 4)
            .collect()
            .await
            .expect_err("limit exceeded");
        let response = unreadable_request(err).into_response();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn broken_body_maps_to_400() {
        let err: BoxError = Box::new(std::io::Error::other("connection reset"));
        let response = unreadable_request(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
