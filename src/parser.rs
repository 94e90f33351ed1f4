//! Streaming SOAP envelope reader.
//!
//! The first pass over a request only records where things are: the envelope
//! version, the span of the `Header` element and the name and span of the
//! first element inside `Body`. Nothing is materialized until a route has been
//! chosen and the typed decoders run over those spans.
//!
//! Uses quick-xml, which never expands external entities; DOCTYPE
//! declarations are rejected outright since SOAP forbids them.

use crate::config::SoapVersion;
use crate::error::EnvelopeError;
use crate::fault::Fault;
use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;
use serde::de::DeserializeOwned;
use std::ops::Range;

/// SOAP namespace URIs.
pub const SOAP_11_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP_12_NS: &str = "http://www.w3.org/2003/05/soap-envelope";

/// The first element inside `Body`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyElement {
    /// Element local name (the routing key half)
    pub local_name: String,
    /// Resolved namespace URI
    pub namespace: Option<String>,
    span: Range<usize>,
}

/// Location of the `Header` element.
#[derive(Debug, Clone, PartialEq, Eq)]
struct HeaderSpan {
    span: Range<usize>,
    /// Number of direct child elements
    blocks: usize,
}

/// A peeked envelope borrowing the request bytes.
#[derive(Debug, Clone)]
pub struct EnvelopeView<'a> {
    xml: &'a str,
    version: SoapVersion,
    header: Option<HeaderSpan>,
    body: BodyElement,
}

impl<'a> EnvelopeView<'a> {
    /// Parse raw bytes far enough to route the message.
    pub fn parse(data: &'a [u8]) -> Result<Self, EnvelopeError> {
        let xml = std::str::from_utf8(data)
            .map_err(|e| EnvelopeError::Xml(format!("Invalid UTF-8: {}", e)))?;

        let mut reader = NsReader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut version: Option<SoapVersion> = None;
        let mut header: Option<HeaderSpan> = None;
        let mut body: Option<BodyElement> = None;
        let mut body_count = 0usize;

        let mut depth = 0usize;
        let mut closed = false;
        // Section of the envelope currently open at depth 2.
        let mut section = Section::None;
        let mut section_start = 0usize;
        let mut header_blocks = 0usize;
        let mut element_start = 0usize;
        let mut pending: Option<(String, Option<String>)> = None;

        loop {
            let before = reader.buffer_position() as usize;
            let (ns, event) = reader
                .read_resolved_event()
                .map_err(|e| EnvelopeError::Xml(e.to_string()))?;
            let ns = resolved(ns);

            match event {
                Event::DocType(_) => return Err(EnvelopeError::DoctypeNotAllowed),

                Event::Start(ref e) | Event::Empty(ref e) => {
                    let is_empty = matches!(event, Event::Empty(_));
                    let local_name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    depth += 1;

                    match depth {
                        1 => {
                            if closed || local_name != "Envelope" {
                                return Err(EnvelopeError::MissingEnvelope);
                            }
                            let ns_uri = ns.unwrap_or_default();
                            version = Some(
                                SoapVersion::from_namespace(&ns_uri)
                                    .ok_or(EnvelopeError::UnknownNamespace(ns_uri))?,
                            );
                        }
                        2 => {
                            let in_envelope_ns = version
                                .map(|v| ns.as_deref().map_or(true, |n| n == v.namespace()))
                                .unwrap_or(false);
                            section = match local_name.as_str() {
                                "Header" if in_envelope_ns && header.is_none() && body.is_none() => {
                                    Section::Header
                                }
                                "Body" if in_envelope_ns => {
                                    body_count += 1;
                                    if body_count > 1 {
                                        return Err(EnvelopeError::MultipleBodies);
                                    }
                                    Section::Body
                                }
                                _ => Section::Other,
                            };
                            section_start = before;
                            header_blocks = 0;
                            if is_empty {
                                finish_section(
                                    section,
                                    section_start..reader.buffer_position() as usize,
                                    header_blocks,
                                    &mut header,
                                );
                            }
                        }
                        3 => match section {
                            Section::Header => header_blocks += 1,
                            Section::Body if body.is_none() && pending.is_none() => {
                                if is_empty {
                                    body = Some(BodyElement {
                                        local_name,
                                        namespace: ns,
                                        span: before..reader.buffer_position() as usize,
                                    });
                                } else {
                                    element_start = before;
                                    pending = Some((local_name, ns));
                                }
                            }
                            _ => {}
                        },
                        _ => {}
                    }

                    if is_empty {
                        depth -= 1;
                        if depth == 0 {
                            closed = true;
                        }
                    }
                }

                Event::End(_) => {
                    let end = reader.buffer_position() as usize;
                    match depth {
                        3 => {
                            if let Some((local_name, namespace)) = pending.take() {
                                body = Some(BodyElement {
                                    local_name,
                                    namespace,
                                    span: element_start..end,
                                });
                            }
                        }
                        2 => {
                            finish_section(section, section_start..end, header_blocks, &mut header);
                            section = Section::None;
                        }
                        1 => closed = true,
                        _ => {}
                    }
                    depth = depth.saturating_sub(1);
                }

                Event::Eof => break,

                _ => {}
            }
        }

        if depth != 0 {
            return Err(EnvelopeError::UnexpectedEof);
        }
        let version = version.ok_or(EnvelopeError::MissingEnvelope)?;
        if body_count == 0 {
            return Err(EnvelopeError::MissingBody);
        }
        let body = body.ok_or(EnvelopeError::EmptyBody)?;

        Ok(Self {
            xml,
            version,
            header,
            body,
        })
    }

    /// SOAP version declared by the envelope namespace.
    pub fn version(&self) -> SoapVersion {
        self.version
    }

    /// First element inside `Body`.
    pub fn body_element(&self) -> &BodyElement {
        &self.body
    }

    /// Whether a `Header` with at least one header block is present.
    pub fn has_header(&self) -> bool {
        self.header.as_ref().map_or(false, |h| h.blocks > 0)
    }

    /// Raw XML of the body element.
    pub fn body_xml(&self) -> &'a str {
        &self.xml[self.body.span.clone()]
    }

    /// Raw XML of the `Header` element, if present.
    pub fn header_xml(&self) -> Option<&'a str> {
        self.header.as_ref().map(|h| &self.xml[h.span.clone()])
    }

    /// Decode the header into `H`. Fields of `H` map to the header blocks
    /// (children of `Header`). Absent or empty headers yield `None`.
    pub fn decode_header<H: DeserializeOwned>(&self) -> Result<Option<H>, EnvelopeError> {
        match &self.header {
            Some(h) if h.blocks > 0 => quick_xml::de::from_str(&self.xml[h.span.clone()])
                .map(Some)
                .map_err(|e| EnvelopeError::Decode(format!("header: {}", e))),
            _ => Ok(None),
        }
    }

    /// Decode the body element into `B`. The element name itself is not
    /// checked; routing already did that.
    pub fn decode_body<B: DeserializeOwned>(&self) -> Result<B, EnvelopeError> {
        quick_xml::de::from_str(self.body_xml())
            .map_err(|e| EnvelopeError::Decode(format!("body element {:?}: {}", self.body.local_name, e)))
    }

    /// The fault carried in the body, if the body element is a `Fault` in the
    /// envelope namespace.
    pub fn fault(&self) -> Result<Option<Fault>, EnvelopeError> {
        if !self.is_fault() {
            return Ok(None);
        }
        Fault::from_xml(self.body_xml()).map(Some)
    }

    pub fn is_fault(&self) -> bool {
        self.body.local_name == "Fault"
            && self
                .body
                .namespace
                .as_deref()
                .map_or(false, |ns| ns == self.version.namespace())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Header,
    Body,
    Other,
}

fn finish_section(
    section: Section,
    span: Range<usize>,
    blocks: usize,
    header: &mut Option<HeaderSpan>,
) {
    if section == Section::Header {
        *header = Some(HeaderSpan { span, blocks });
    }
}

fn resolved(ns: ResolveResult<'_>) -> Option<String> {
    match ns {
        ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.into_inner()).into_owned()),
        _ => None,
    }
}

/// Extract SOAPAction from HTTP header value (removes quotes).
pub fn parse_soap_action(header_value: &str) -> String {
    header_value.trim().trim_matches('"').to_string()
}
