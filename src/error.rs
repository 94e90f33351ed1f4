//! Error types for the SOAP dispatcher.

use crate::config::SoapVersion;
use crate::fault::{Fault, FaultCode};
use thiserror::Error;

/// Error returned by request handlers.
///
/// Any error type works; its `Display` output becomes the fault string. A
/// [`Fault`] returned here is sent to the client unchanged.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Crate-level errors (setup, configuration, IO).
#[derive(Error, Debug)]
pub enum SoapError {
    #[error("route already registered for action {action:?} and body element {element:?}")]
    DuplicateRoute { action: String, element: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while reading or writing an envelope.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("XML parse error: {0}")]
    Xml(String),

    #[error("DOCTYPE declarations are not allowed")]
    DoctypeNotAllowed,

    #[error("root element is not a SOAP Envelope")]
    MissingEnvelope,

    #[error("unrecognized envelope namespace {0:?}")]
    UnknownNamespace(String),

    #[error("envelope has no Body")]
    MissingBody,

    #[error("envelope has more than one Body")]
    MultipleBodies,

    #[error("Body contains no element")]
    EmptyBody,

    #[error("unexpected end of document")]
    UnexpectedEof,

    #[error("{0}")]
    Decode(String),

    #[error("{0}")]
    Encode(String),
}

/// Everything that can go wrong while dispatching one request.
///
/// Each variant is turned into a fault envelope by the dispatcher; none of
/// them escape to the HTTP layer.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("unsupported content type: \"{0}\"")]
    UnsupportedContentType(String),

    #[error("failed to read request body: {0}")]
    BodyRead(String),

    #[error("request body too large: {size} bytes exceeds maximum {limit}")]
    BodyTooLarge { size: usize, limit: usize },

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(EnvelopeError),

    #[error("envelope version mismatch: expected {expected} envelope, got {actual}")]
    VersionMismatch {
        expected: SoapVersion,
        actual: SoapVersion,
    },

    #[error("no action handler for content type: \"{0}\"")]
    NoRoute(String),

    #[error("invalid request payload: {0}")]
    InvalidPayload(EnvelopeError),

    #[error("{0}")]
    Handler(HandlerError),

    #[error("handler panicked: {0}")]
    HandlerPanic(String),

    #[error("failed to encode response: {0}")]
    Encode(EnvelopeError),
}

impl DispatchError {
    /// Stable string code for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedContentType(_) => "UNSUPPORTED_CONTENT_TYPE",
            Self::BodyRead(_) => "BODY_READ",
            Self::BodyTooLarge { .. } => "BODY_TOO_LARGE",
            Self::MalformedEnvelope(_) => "MALFORMED_ENVELOPE",
            Self::VersionMismatch { .. } => "VERSION_MISMATCH",
            Self::NoRoute(_) => "NO_ROUTE",
            Self::InvalidPayload(_) => "INVALID_PAYLOAD",
            Self::Handler(_) => "HANDLER_ERROR",
            Self::HandlerPanic(_) => "HANDLER_PANIC",
            Self::Encode(_) => "ENCODE_ERROR",
        }
    }

    /// Fault code reported to the client.
    pub fn fault_code(&self) -> FaultCode {
        match self {
            Self::VersionMismatch { .. } => FaultCode::VersionMismatch,
            Self::UnsupportedContentType(_)
            | Self::BodyRead(_)
            | Self::BodyTooLarge { .. }
            | Self::MalformedEnvelope(_)
            | Self::NoRoute(_)
            | Self::InvalidPayload(_) => FaultCode::Client,
            Self::Handler(_) | Self::HandlerPanic(_) | Self::Encode(_) => FaultCode::Server,
        }
    }

    /// Convert into the fault sent back to the client.
    pub fn to_fault(&self) -> Fault {
        if let Self::Handler(err) = self {
            if let Some(fault) = err.downcast_ref::<Fault>() {
                return fault.clone();
            }
        }
        Fault::new(self.fault_code(), self.to_string())
    }
}
