//! HTTP route handlers.

use http_body_util::{BodyExt, Full, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE,
    HeaderMap, HeaderValue,
};
use hyper::{Method, Request, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tether_abstraction::{ChatBackend, Prompt};
use tether_models::{BackendLoader, list_backends};
use tracing::{info, warn};

use super::AppState;
use crate::cache::{CacheError, ChatRequest};

/// Largest request body accepted, in bytes.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

const KNOWN_PATHS: [&str; 4] = ["/chat", "/testlocalchat", "/get_existing_models", "/health"];

/// Body of `POST /testlocalchat`.
#[derive(Debug, Deserialize)]
struct LocalChatRequest {
    message: Prompt,
    model: String,
}

/// Dispatches a request to its handler.
pub(crate) async fn route(request: Request<Incoming>, state: &AppState) -> Response<Full<Bytes>> {
    let path = request.uri().path().to_string();
    match (request.method(), path.as_str()) {
        (&Method::OPTIONS, _) => empty(StatusCode::NO_CONTENT),
        (&Method::POST, "/chat") => chat(request, state).await,
        (&Method::POST, "/testlocalchat") => test_local_chat(request, state).await,
        (&Method::GET, "/get_existing_models") => existing_models(state),
        (&Method::GET, "/health") => health(state).await,
        (_, path) if KNOWN_PATHS.contains(&path) => {
            error_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
        }
        _ => error_response(StatusCode::NOT_FOUND, "Not found"),
    }
}

/// Adds permissive CORS headers.
pub(crate) fn apply_cors(headers: &mut HeaderMap) {
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("GET, POST, OPTIONS"));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("content-type, x-request-id"));
}

async fn chat(request: Request<Incoming>, state: &AppState) -> Response<Full<Bytes>> {
    let chat_request: ChatRequest = match read_json(request).await {
        Ok(chat_request) => chat_request,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, &message),
    };
    if chat_request.process_id.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "process_id must not be empty");
    }

    match state.cache().chat(chat_request).await {
        Ok(answer) => json_response(StatusCode::OK, &json!({ "answer": answer })),
        Err(e) => error_response(status_for(&e), &e.client_message()),
    }
}

async fn test_local_chat(request: Request<Incoming>, state: &AppState) -> Response<Full<Bytes>> {
    let Ok(LocalChatRequest { message, model }) = read_json::<LocalChatRequest>(request).await else {
        return trigger_response(StatusCode::BAD_REQUEST, "Invalid request data", false);
    };
    let name = strip_extension(&model);

    let backend = match state.loader().resolve(name) {
        Ok(backend) => backend,
        Err(e) => {
            let e = CacheError::resolution(name, e);
            return trigger_response(status_for(&e), &e.client_message(), false);
        }
    };

    match backend.chat(&message.into_history()).await {
        Ok(answer) if answer.trim().is_empty() => {
            trigger_response(StatusCode::BAD_REQUEST, "No message provided", false)
        }
        Ok(answer) => {
            info!(backend = %name, "Local chat answered");
            trigger_response(StatusCode::OK, &answer, true)
        }
        Err(e) => {
            warn!(backend = %name, error = %e, "Local chat failed");
            trigger_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string(), false)
        }
    }
}

fn existing_models(state: &AppState) -> Response<Full<Bytes>> {
    match list_backends(state.backends_dir()) {
        Ok(listings) => {
            let pairs: Vec<(String, String)> = listings.into_iter().map(|l| l.into_pair()).collect();
            json_response(StatusCode::OK, &json!({ "message": pairs, "trigger": true }))
        }
        Err(e) => {
            warn!(dir = %state.backends_dir().display(), error = %e, "Failed to list backends");
            trigger_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string(), false)
        }
    }
}

async fn health(state: &AppState) -> Response<Full<Bytes>> {
    let stats = state.cache().stats().await;
    json_response(StatusCode::OK, &json!({ "status": "ok", "cache": stats }))
}

/// HTTP status for a cache error.
pub(crate) const fn status_for(error: &CacheError) -> StatusCode {
    match error {
        CacheError::BackendNotFound(_) => StatusCode::NOT_FOUND,
        CacheError::BackendInvalid { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        CacheError::BackendExecution { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Drops the manifest extension from a backend file name. Other dots are
/// part of the name.
pub(crate) fn strip_extension(model: &str) -> &str {
    model.strip_suffix(".toml").unwrap_or(model)
}

async fn read_json<T: DeserializeOwned>(request: Request<Incoming>) -> Result<T, String> {
    let bytes = Limited::new(request.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| format!("Failed to read request body: {}", e))?
        .to_bytes();
    serde_json::from_slice(&bytes).map_err(|e| format!("Invalid request body: {}", e))
}

fn json_response(status: StatusCode, body: &Value) -> Response<Full<Bytes>> {
    let bytes = serde_json::to_vec(body).unwrap_or_default();
    let mut response = Response::new(Full::new(Bytes::from(bytes)));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, &json!({ "error": message }))
}

fn trigger_response(status: StatusCode, message: &str, trigger: bool) -> Response<Full<Bytes>> {
    json_response(status, &json!({ "message": message, "trigger": trigger }))
}

fn empty(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}
