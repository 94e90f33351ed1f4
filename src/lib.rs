//! SOAP request dispatcher for Zentinel services.
//!
//! Accepts HTTP requests carrying SOAP 1.1 or 1.2 envelopes, routes each one
//! by `(SOAPAction, body element name)` to a typed handler, and answers with
//! the handler's result or a SOAP Fault.
//!
//! # Features
//!
//! - SOAP version negotiation from `Content-Type` / `SOAPAction`
//! - Two-pass decode: a streaming peek picks the route, then the header and
//!   body are decoded into the route's types
//! - Handler errors and panics reported as SOAP Faults
//! - axum adapter for serving over HTTP
//!
//! # Example
//!
//! ```ignore
//! use zentinel_soap_dispatch::{Context, HandlerError, RouteRegistry, SoapServer, SoapServerConfig};
//!
//! let mut registry = RouteRegistry::new();
//! registry.register(
//!     "/users",
//!     "urn:GetUser",
//!     "GetUser",
//!     |_ctx: Context, _header: AuthHeader, body: GetUser| async move {
//!         Ok::<_, HandlerError>(GetUserResponse { id: body.id })
//!     },
//! )?;
//!
//! SoapServer::new(SoapServerConfig::default(), registry)
//!     .run(shutdown_signal())
//!     .await?;
//! ```

pub mod config;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod fault;
pub mod handler;
pub mod negotiate;
pub mod parser;
pub mod registry;
pub mod server;

pub use config::{SoapServerConfig, SoapVersion};
pub use dispatcher::{DispatchMetrics, Dispatcher};
pub use envelope::{Body, EmptyHeader, Envelope};
pub use error::{DispatchError, EnvelopeError, HandlerError, SoapError};
pub use fault::{Fault, FaultCode};
pub use handler::{Context, Handler};
pub use parser::EnvelopeView;
pub use registry::{Route, RouteKey, RouteRegistry};
pub use server::SoapServer;
