//! Request handlers and the per-request context they receive.

use crate::config::SoapVersion;
use crate::error::HandlerError;
use async_trait::async_trait;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

/// Per-request context handed to a handler.
///
/// Gives read access to the HTTP request head and the negotiated protocol
/// details, and lets the handler add headers to the HTTP response.
#[derive(Debug)]
pub struct Context {
    request: Parts,
    version: SoapVersion,
    action: String,
    operation: String,
    response_headers: Arc<Mutex<HeaderMap>>,
}

impl Context {
    pub(crate) fn new(
        request: Parts,
        version: SoapVersion,
        action: String,
        operation: String,
        response_headers: Arc<Mutex<HeaderMap>>,
    ) -> Self {
        Self {
            request,
            version,
            action,
            operation,
            response_headers,
        }
    }

    /// The HTTP request head.
    pub fn request(&self) -> &Parts {
        &self.request
    }

    pub fn method(&self) -> &Method {
        &self.request.method
    }

    pub fn uri(&self) -> &Uri {
        &self.request.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.request.headers
    }

    /// SOAP version of the request (and of the response).
    pub fn version(&self) -> SoapVersion {
        self.version
    }

    /// Action identifier the request was routed by.
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Local name of the body element the request was routed by.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Set a header on the HTTP response. Replaces any previous value.
    pub fn set_response_header(&self, name: HeaderName, value: HeaderValue) {
        self.response_headers.lock().insert(name, value);
    }
}

/// A typed SOAP operation handler.
///
/// `H` is the header type and `B` the body type; both are decoded before the
/// handler runs. Implemented for async closures of the shape
/// `|ctx: Context, header: H, body: B| async move { ... }`.
#[async_trait]
pub trait Handler<H, B>: Send + Sync + 'static {
    /// Response body content.
    type Output: Serialize + Send + 'static;

    async fn call(&self, ctx: Context, header: H, body: B) -> Result<Self::Output, HandlerError>;
}

#[async_trait]
impl<F, Fut, H, B, R> Handler<H, B> for F
where
    F: Fn(Context, H, B) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, HandlerError>> + Send,
    H: Send + 'static,
    B: Send + 'static,
    R: Serialize + Send + 'static,
{
    type Output = R;

    async fn call(&self, ctx: Context, header: H, body: B) -> Result<R, HandlerError> {
        (self)(ctx, header, body).await
    }
}
