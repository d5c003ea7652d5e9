//! JSON response composition.
//!
//! # Responsibilities
//! - Turn a handler's return value into an immutable JSON response
//! - Carry a status code and extra headers alongside the body
//! - Compose post-processing stages explicitly, in registration order
//!
//! # Design Decisions
//! - Handlers stay ordinary async functions; wrapping is a plain call
//! - A handler's `HttpError` passes through untouched
//! - `JsonResponse` has no setters; `with_*` methods return a new value

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use axum::{
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;

use crate::error::{error_code, HttpError};

/// A serialized JSON body with its status and headers.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl JsonResponse {
    pub fn new<T: Serialize + ?Sized>(content: &T, status: StatusCode, headers: HeaderMap) -> Result<Self, HttpError> {
        let body = serde_json::to_value(content).map_err(|e| {
            HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, "Cannot serialize response.", e.to_string())
                .with_code(error_code("JSON", "ESERIALIZE"))
                .with_source(e)
        })?;
        Ok(Self { status, headers, body })
    }

    /// 200 response without extra headers.
    pub fn ok<T: Serialize + ?Sized>(content: &T) -> Result<Self, HttpError> {
        Self::new(content, StatusCode::OK, HeaderMap::new())
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn with_status(self, status: StatusCode) -> Self {
        Self { status, ..self }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

impl IntoResponse for JsonResponse {
    fn into_response(self) -> Response {
        let bytes = match serde_json::to_vec(&self.body) {
            Ok(bytes) => bytes,
            Err(e) => {
                return HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, "Cannot serialize response.", e.to_string())
                    .with_code(error_code("JSON", "ESERIALIZE"))
                    .into_response();
            }
        };

        let mut response = (self.status, bytes).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        for (name, value) in &self.headers {
            response.headers_mut().insert(name.clone(), value.clone());
        }
        response
    }
}

/// Wraps handler results in [`JsonResponse`]s with a fixed status and header set.
#[derive(Debug, Clone)]
pub struct JsonResponder {
    status: StatusCode,
    headers: HeaderMap,
}

impl Default for JsonResponder {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}

impl JsonResponder {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
        }
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn respond<T: Serialize + ?Sized>(&self, content: &T) -> Result<JsonResponse, HttpError> {
        JsonResponse::new(content, self.status, self.headers.clone())
    }

    /// Await `handler` and wrap what it returns.
    pub async fn call<F, Fut, T>(&self, handler: F) -> Result<JsonResponse, HttpError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, HttpError>>,
        T: Serialize,
    {
        let content = handler().await?;
        self.respond(&content)
    }
}

type Stage = Arc<dyn Fn(JsonResponse) -> JsonResponse + Send + Sync>;

/// A responder followed by registered stages, applied in order.
#[derive(Clone, Default)]
pub struct ResponsePipeline {
    responder: JsonResponder,
    stages: Vec<Stage>,
}

impl fmt::Debug for ResponsePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponsePipeline")
            .field("responder", &self.responder)
            .field("stages", &self.stages.len())
            .finish()
    }
}

impl ResponsePipeline {
    pub fn new(responder: JsonResponder) -> Self {
        Self {
            responder,
            stages: Vec::new(),
        }
    }

    /// Register a stage run after every response is built.
    pub fn stage<F>(mut self, stage: F) -> Self
    where
        F: Fn(JsonResponse) -> JsonResponse + Send + Sync + 'static,
    {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn respond<T: Serialize + ?Sized>(&self, content: &T) -> Result<JsonResponse, HttpError> {
        let response = self.responder.respond(content)?;
        Ok(self.stages.iter().fold(response, |response, stage| stage(response)))
    }

    pub async fn call<F, Fut, T>(&self, handler: F) -> Result<JsonResponse, HttpError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, HttpError>>,
        T: Serialize,
    {
        let content = handler().await?;
        self.respond(&content)
    }
}
