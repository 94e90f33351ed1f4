//! SOAP request dispatcher.
//!
//! Runs one request through negotiation, envelope peek, route resolution,
//! typed decode, handler invocation and response encoding. Every failure is
//! answered with a fault envelope; nothing propagates to the HTTP layer.

use crate::config::{SettingsConfig, SoapVersion};
use crate::envelope::write_envelope;
use crate::error::DispatchError;
use crate::handler::Context;
use crate::negotiate::{negotiate, Negotiated};
use crate::parser::EnvelopeView;
use crate::registry::RouteRegistry;
use axum::body::Bytes;
use axum::http::header::CONTENT_TYPE;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, Response};
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

const DEBUG_ACTION_HEADER: HeaderName = HeaderName::from_static("x-soap-action");
const DEBUG_OPERATION_HEADER: HeaderName = HeaderName::from_static("x-soap-operation");

/// Dispatcher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchMetrics {
    /// Requests received
    pub requests_processed: u64,
    /// Requests answered with a fault
    pub requests_faulted: u64,
    /// Handler panics caught
    pub handler_panics: u64,
}

/// Routes SOAP requests to registered handlers.
pub struct Dispatcher {
    registry: Arc<RouteRegistry>,
    settings: SettingsConfig,
    requests_processed: AtomicU64,
    requests_faulted: AtomicU64,
    handler_panics: AtomicU64,
}

/// Successful dispatch: the encoded envelope plus handler-set headers.
struct Reply {
    xml: String,
    headers: HeaderMap,
    operation: String,
}

impl Dispatcher {
    /// Create a dispatcher over `registry` with default settings.
    pub fn new(registry: impl Into<Arc<RouteRegistry>>) -> Self {
        Self::with_settings(registry, SettingsConfig::default())
    }

    pub fn with_settings(registry: impl Into<Arc<RouteRegistry>>, settings: SettingsConfig) -> Self {
        Self {
            registry: registry.into(),
            settings,
            requests_processed: AtomicU64::new(0),
            requests_faulted: AtomicU64::new(0),
            handler_panics: AtomicU64::new(0),
        }
    }

    /// Restrict the accepted SOAP versions. Faults raised before negotiation
    /// use the first listed version.
    ///
    /// An empty list is ignored.
    pub fn with_versions(mut self, versions: &[SoapVersion]) -> Self {
        if !versions.is_empty() {
            self.settings.allowed_versions = versions.to_vec();
            self.settings.fallback_version = None;
        }
        self
    }

    pub fn registry(&self) -> &RouteRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &SettingsConfig {
        &self.settings
    }

    pub fn metrics(&self) -> DispatchMetrics {
        DispatchMetrics {
            requests_processed: self.requests_processed.load(Ordering::Relaxed),
            requests_faulted: self.requests_faulted.load(Ordering::Relaxed),
            handler_panics: self.handler_panics.load(Ordering::Relaxed),
        }
    }

    /// Dispatch one request. Always returns `200 OK` with a SOAP envelope;
    /// failures are reported as a fault in the body.
    pub async fn dispatch(&self, request: Request<Bytes>) -> Response<Bytes> {
        self.requests_processed.fetch_add(1, Ordering::Relaxed);
        let (parts, body) = request.into_parts();

        debug!(
            method = %parts.method,
            path = %parts.uri.path(),
            body_size = body.len(),
            "Processing SOAP request"
        );

        let negotiated = match negotiate(&parts.headers, &self.settings.allowed_versions) {
            Ok(negotiated) => negotiated,
            Err(err) => return self.fault_response(self.settings.fault_version(), None, err),
        };

        let version = negotiated.version;
        let action = negotiated.action.clone();
        match self.process(parts, &body, negotiated).await {
            Ok(reply) => {
                debug!(
                    action = %action,
                    operation = %reply.operation,
                    version = %version,
                    "SOAP request handled"
                );
                let mut response = xml_response(version, reply.xml);
                response.headers_mut().extend(reply.headers);
                if self.settings.debug_headers {
                    add_debug_headers(response.headers_mut(), &action, &reply.operation);
                }
                response
            }
            Err(err) => self.fault_response(version, Some(&action), err),
        }
    }

    /// Answer a request that failed before reaching [`dispatch`](Self::dispatch),
    /// e.g. while its body was being read. The fault uses the request's SOAP
    /// version when it can be negotiated.
    pub fn reject(&self, headers: &HeaderMap, err: DispatchError) -> Response<Bytes> {
        self.requests_processed.fetch_add(1, Ordering::Relaxed);
        let version = negotiate(headers, &self.settings.allowed_versions)
            .map(|negotiated| negotiated.version)
            .unwrap_or_else(|_| self.settings.fault_version());
        self.fault_response(version, None, err)
    }

    async fn process(
        &self,
        parts: Parts,
        body: &Bytes,
        negotiated: Negotiated,
    ) -> Result<Reply, DispatchError> {
        if body.len() > self.settings.max_body_size {
            return Err(DispatchError::BodyTooLarge {
                size: body.len(),
                limit: self.settings.max_body_size,
            });
        }

        let view = EnvelopeView::parse(body).map_err(DispatchError::MalformedEnvelope)?;
        if view.version() != negotiated.version {
            return Err(DispatchError::VersionMismatch {
                expected: negotiated.version,
                actual: view.version(),
            });
        }

        let operation = view.body_element().local_name.clone();
        let route = self
            .registry
            .resolve(&negotiated.action, &operation)
            .ok_or_else(|| DispatchError::NoRoute(operation.clone()))?;

        debug!(
            route = %route.key(),
            has_header = view.has_header(),
            "Resolved SOAP route"
        );

        let response_headers = Arc::new(Mutex::new(HeaderMap::new()));
        let ctx = Context::new(
            parts,
            negotiated.version,
            negotiated.action,
            operation.clone(),
            Arc::clone(&response_headers),
        );
        let invocation = async { route.prepare(&view, ctx)?.await };

        let xml = match AssertUnwindSafe(invocation).catch_unwind().await {
            Ok(result) => result?,
            Err(payload) => {
                self.handler_panics.fetch_add(1, Ordering::Relaxed);
                return Err(DispatchError::HandlerPanic(panic_message(payload.as_ref())));
            }
        };

        let headers = std::mem::take(&mut *response_headers.lock());
        Ok(Reply {
            xml,
            headers,
            operation,
        })
    }

    fn fault_response(
        &self,
        version: SoapVersion,
        action: Option<&str>,
        err: DispatchError,
    ) -> Response<Bytes> {
        self.requests_faulted.fetch_add(1, Ordering::Relaxed);
        warn!(
            code = %err.kind(),
            action = ?action,
            version = %version,
            error = %err,
            "SOAP request failed"
        );

        let xml = write_envelope(version, None, &err.to_fault().to_xml(version));
        xml_response(version, xml)
    }
}

fn xml_response(version: SoapVersion, xml: String) -> Response<Bytes> {
    let mut response = Response::new(Bytes::from(xml));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(version.content_type()));
    response
}

fn add_debug_headers(headers: &mut HeaderMap, action: &str, operation: &str) {
    if let Ok(value) = HeaderValue::from_str(action) {
        headers.insert(DEBUG_ACTION_HEADER, value);
    }
    if let Ok(value) = HeaderValue::from_str(operation) {
        headers.insert(DEBUG_OPERATION_HEADER, value);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
