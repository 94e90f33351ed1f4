//! Typed SOAP envelope.
//!
//! `Envelope<H, B>` is the decoded form of a message whose header and body
//! types were picked by a route. The body holds either content or a fault,
//! never both.

use crate::config::SoapVersion;
use crate::error::EnvelopeError;
use crate::fault::Fault;
use crate::parser::EnvelopeView;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Envelope with a typed header and body.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<H, B> {
    pub header: Option<H>,
    pub body: Body<B>,
}

/// Body slot: decoded payload or fault.
#[derive(Debug, Clone, PartialEq)]
pub enum Body<B> {
    Content(B),
    Fault(Fault),
}

impl<B> Body<B> {
    pub fn content(&self) -> Option<&B> {
        match self {
            Self::Content(content) => Some(content),
            Self::Fault(_) => None,
        }
    }

    pub fn fault(&self) -> Option<&Fault> {
        match self {
            Self::Content(_) => None,
            Self::Fault(fault) => Some(fault),
        }
    }

    pub fn into_result(self) -> Result<B, Fault> {
        match self {
            Self::Content(content) => Ok(content),
            Self::Fault(fault) => Err(fault),
        }
    }
}

/// Header type for messages that carry no header blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyHeader {}

impl<H, B> Envelope<H, B> {
    /// Envelope carrying `content`.
    pub fn new(content: B) -> Self {
        Self {
            header: None,
            body: Body::Content(content),
        }
    }

    /// Envelope carrying `fault`.
    pub fn fault(fault: Fault) -> Self {
        Self {
            header: None,
            body: Body::Fault(fault),
        }
    }

    pub fn with_header(mut self, header: H) -> Self {
        self.header = Some(header);
        self
    }
}

impl<H: Serialize, B: Serialize> Envelope<H, B> {
    /// Encode as a complete XML document in `version`'s namespace.
    ///
    /// The header is written as a `Header` element whose children are the
    /// fields of `H`; the body content element is named after `B`'s serde
    /// name (use `#[serde(rename = "...")]` to control it).
    pub fn encode(&self, version: SoapVersion) -> Result<String, EnvelopeError> {
        let header = match &self.header {
            Some(header) => {
                let xml = quick_xml::se::to_string_with_root("Header", header)
                    .map_err(|e| EnvelopeError::Encode(format!("header: {}", e)))?;
                Some(xml.replacen(
                    "<Header",
                    &format!("<Header xmlns=\"{}\"", version.namespace()),
                    1,
                ))
            }
            None => None,
        };

        let body = match &self.body {
            Body::Content(content) => quick_xml::se::to_string(content)
                .map_err(|e| EnvelopeError::Encode(format!("body: {}", e)))?,
            Body::Fault(fault) => fault.to_xml(version),
        };

        Ok(write_envelope(version, header.as_deref(), &body))
    }
}

impl<H: DeserializeOwned, B: DeserializeOwned> Envelope<H, B> {
    /// Decode a complete document. A `Fault` body element in the envelope
    /// namespace becomes `Body::Fault`; anything else is decoded as `B`.
    pub fn decode(data: &[u8]) -> Result<Self, EnvelopeError> {
        EnvelopeView::parse(data)?.decode()
    }
}

impl EnvelopeView<'_> {
    /// Decode both slots into the given types.
    pub fn decode<H: DeserializeOwned, B: DeserializeOwned>(
        &self,
    ) -> Result<Envelope<H, B>, EnvelopeError> {
        let header = self.decode_header()?;
        let body = match self.fault()? {
            Some(fault) => Body::Fault(fault),
            None => Body::Content(self.decode_body()?),
        };
        Ok(Envelope { header, body })
    }
}

/// Wrap already-serialized header and body XML in a `soap:Envelope`.
pub(crate) fn write_envelope(version: SoapVersion, header: Option<&str>, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="{}">{}<soap:Body>{}</soap:Body></soap:Envelope>"#,
        version.namespace(),
        header.unwrap_or_default(),
        body
    )
}
