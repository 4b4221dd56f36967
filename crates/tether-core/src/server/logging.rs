//! Request logging with request IDs and timing.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderMap, HeaderValue};
use hyper::{Request, Response};
use tracing::{Instrument, debug, info, warn};
use uuid::Uuid;

use super::AppState;
use super::routes;

/// Header name for request ID
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Returns the inbound request ID, or a fresh UUID if there is none.
pub(crate) fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map_or_else(|| Uuid::new_v4().to_string(), ToString::to_string)
}

/// Serves one request inside a `request` span, echoing the request ID and
/// logging status and duration on completion.
pub(crate) async fn handle(
    request: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let request_id = request_id(request.headers());
    let method = request.method().clone();
    let uri = request.uri().path().to_string();
    let start_time = Instant::now();

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        uri = %uri
    );

    async move {
        info!("Received request");
        for (name, value) in request.headers() {
            debug!(header = %name, value = %value.to_str().unwrap_or("<?>"), "Request header");
        }

        let mut response = routes::route(request, &state).await;
        routes::apply_cors(response.headers_mut());
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }

        let status = response.status().as_u16();
        let duration_ms = start_time.elapsed().as_millis();
        if response.status().is_server_error() {
            warn!(status, duration_ms, "Request failed");
        } else {
            info!(status, duration_ms, "Request completed");
        }

        Ok(response)
    }
    .instrument(span)
    .await
}
