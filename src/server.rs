//! HTTP adapter: serves a [`Dispatcher`] over axum.
//!
//! Every POST is handed to the dispatcher whatever its path; registration
//! paths are not used for routing. Other methods get `405 Method Not
//! Allowed`.

use crate::config::SoapServerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{DispatchError, SoapError};
use crate::registry::RouteRegistry;
use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::header::ALLOW;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// A SOAP endpoint ready to be served.
#[derive(Clone)]
pub struct SoapServer {
    dispatcher: Arc<Dispatcher>,
    listen_address: String,
}

impl SoapServer {
    /// Build a server from configuration and a fully populated registry.
    pub fn new(config: SoapServerConfig, registry: RouteRegistry) -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher::with_settings(registry, config.settings)),
            listen_address: config.server.listen_address,
        }
    }

    /// Wrap an existing dispatcher.
    pub fn from_dispatcher(dispatcher: Arc<Dispatcher>, listen_address: impl Into<String>) -> Self {
        Self {
            dispatcher,
            listen_address: listen_address.into(),
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// The axum router for this server.
    pub fn router(&self) -> Router {
        Router::new()
            .fallback(serve_soap)
            .with_state(Arc::clone(&self.dispatcher))
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> Result<(), SoapError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(&self.listen_address).await?;
        info!(
            address = %listener.local_addr()?,
            routes = self.dispatcher.registry().len(),
            "SOAP server listening"
        );
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), SoapError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("SOAP server stopped");
        Ok(())
    }
}

async fn serve_soap(State(dispatcher): State<Arc<Dispatcher>>, request: Request) -> Response {
    if request.method() != Method::POST {
        let mut response = StatusCode::METHOD_NOT_ALLOWED.into_response();
        response
            .headers_mut()
            .insert(ALLOW, HeaderValue::from_static("POST"));
        return response;
    }

    let (parts, body) = request.into_parts();
    let body = match read_body(body, dispatcher.settings().max_body_size).await {
        Ok(bytes) => bytes,
        Err(err) => return into_axum(dispatcher.reject(&parts.headers, err)),
    };

    let response = dispatcher
        .dispatch(axum::http::Request::from_parts(parts, body))
        .await;
    into_axum(response)
}

/// Collect the request body, stopping once it exceeds `limit` bytes.
async fn read_body(body: Body, limit: usize) -> Result<Bytes, DispatchError> {
    let mut stream = body.into_data_stream();
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| DispatchError::BodyRead(e.to_string()))?;
        let size = buf.len() + chunk.len();
        if size > limit {
            return Err(DispatchError::BodyTooLarge { size, limit });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buf))
}

fn into_axum(response: axum::http::Response<Bytes>) -> Response {
    let (parts, body) = response.into_parts();
    Response::from_parts(parts, Body::from(body))
}
