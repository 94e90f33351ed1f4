//! SOAP Fault model, rendering and parsing for both SOAP versions.

use crate::config::SoapVersion;
use crate::error::EnvelopeError;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

/// Fault code, named after the SOAP 1.1 vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultCode {
    /// Envelope namespace did not match the expected version
    VersionMismatch,
    /// A mandatory header block was not understood
    MustUnderstand,
    /// The request was at fault (`Sender` in SOAP 1.2)
    Client,
    /// The server failed to process a valid request (`Receiver` in SOAP 1.2)
    Server,
    /// Application-defined code, written as given
    Custom(String),
}

impl FaultCode {
    /// Wire value for the given version, qualified with the `soap` prefix.
    pub fn qualified(&self, version: SoapVersion) -> String {
        let local = match (self, version) {
            (Self::VersionMismatch, _) => "VersionMismatch",
            (Self::MustUnderstand, _) => "MustUnderstand",
            (Self::Client, SoapVersion::Soap11) => "Client",
            (Self::Client, SoapVersion::Soap12) => "Sender",
            (Self::Server, SoapVersion::Soap11) => "Server",
            (Self::Server, SoapVersion::Soap12) => "Receiver",
            (Self::Custom(code), _) => return code.clone(),
        };
        format!("soap:{}", local)
    }

    /// Parse a wire value of either version. Prefixes are ignored for the
    /// standard codes.
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        let local = value.rsplit(':').next().unwrap_or(value);
        match local {
            "VersionMismatch" => Self::VersionMismatch,
            "MustUnderstand" => Self::MustUnderstand,
            "Client" | "Sender" => Self::Client,
            "Server" | "Receiver" => Self::Server,
            _ => Self::Custom(value.to_string()),
        }
    }
}

/// A SOAP Fault.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{string}")]
pub struct Fault {
    /// Fault code
    pub code: FaultCode,
    /// Human-readable message (`faultstring` / `Reason/Text`)
    pub string: String,
    /// Faulting node (`faultactor` / `Role`)
    pub actor: Option<String>,
    /// Raw XML placed inside the detail element
    pub detail: Option<String>,
}

impl Fault {
    pub fn new(code: FaultCode, string: impl Into<String>) -> Self {
        Self {
            code,
            string: string.into(),
            actor: None,
            detail: None,
        }
    }

    /// Fault blaming the client.
    pub fn client(string: impl Into<String>) -> Self {
        Self::new(FaultCode::Client, string)
    }

    /// Fault blaming the server.
    pub fn server(string: impl Into<String>) -> Self {
        Self::new(FaultCode::Server, string)
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Attach detail content. The value is inserted verbatim and must be
    /// well-formed XML (or escaped text).
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Render the `soap:Fault` element. The enclosing envelope must bind the
    /// `soap` prefix to the version's namespace.
    pub fn to_xml(&self, version: SoapVersion) -> String {
        match version {
            SoapVersion::Soap11 => self.soap_11_xml(),
            SoapVersion::Soap12 => self.soap_12_xml(),
        }
    }

    fn soap_11_xml(&self) -> String {
        let mut xml = format!(
            "<soap:Fault><faultcode>{}</faultcode><faultstring>{}</faultstring>",
            escape(&self.code.qualified(SoapVersion::Soap11)),
            escape(&self.string)
        );
        if let Some(actor) = &self.actor {
            xml.push_str(&format!("<faultactor>{}</faultactor>", escape(actor)));
        }
        if let Some(detail) = &self.detail {
            xml.push_str(&format!("<detail>{}</detail>", detail));
        }
        xml.push_str("</soap:Fault>");
        xml
    }

    fn soap_12_xml(&self) -> String {
        let mut xml = format!(
            "<soap:Fault><soap:Code><soap:Value>{}</soap:Value></soap:Code>\
             <soap:Reason><soap:Text xml:lang=\"en\">{}</soap:Text></soap:Reason>",
            escape(&self.code.qualified(SoapVersion::Soap12)),
            escape(&self.string)
        );
        if let Some(actor) = &self.actor {
            xml.push_str(&format!("<soap:Role>{}</soap:Role>", escape(actor)));
        }
        if let Some(detail) = &self.detail {
            xml.push_str(&format!("<soap:Detail>{}</soap:Detail>", detail));
        }
        xml.push_str("</soap:Fault>");
        xml
    }

    /// Parse a `Fault` element of either version.
    pub fn from_xml(fragment: &str) -> Result<Self, EnvelopeError> {
        let mut reader = Reader::from_str(fragment);
        reader.config_mut().trim_text(true);

        let mut path: Vec<String> = Vec::new();
        let mut code: Option<String> = None;
        let mut string: Option<String> = None;
        let mut actor: Option<String> = None;
        let mut detail: Option<String> = None;
        let mut detail_start: Option<usize> = None;

        loop {
            let before = reader.buffer_position() as usize;
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    if path.len() == 1 && name.eq_ignore_ascii_case("detail") {
                        detail_start = Some(reader.buffer_position() as usize);
                    }
                    path.push(name);
                }
                Ok(Event::End(_)) => {
                    if path.len() == 2 && path[1].eq_ignore_ascii_case("detail") {
                        if let Some(start) = detail_start.take() {
                            detail = Some(fragment[start..before].trim().to_string());
                        }
                    }
                    path.pop();
                }
                Ok(Event::Text(e)) => {
                    let text = e
                        .unescape()
                        .map_err(|e| EnvelopeError::Xml(e.to_string()))?
                        .into_owned();
                    capture(&path, text, &mut code, &mut string, &mut actor);
                }
                Ok(Event::CData(e)) => {
                    let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                    capture(&path, text, &mut code, &mut string, &mut actor);
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(EnvelopeError::Xml(e.to_string())),
                _ => {}
            }
        }

        if !path.is_empty() {
            return Err(EnvelopeError::UnexpectedEof);
        }

        Ok(Self {
            code: FaultCode::parse(code.as_deref().unwrap_or_default()),
            string: string.unwrap_or_default(),
            actor,
            detail,
        })
    }
}

/// Store text found at a known fault path. Only the first occurrence counts,
/// so nested `Subcode/Value` never overrides the top-level code.
fn capture(
    path: &[String],
    text: String,
    code: &mut Option<String>,
    string: &mut Option<String>,
    actor: &mut Option<String>,
) {
    let names: Vec<&str> = path.iter().skip(1).map(String::as_str).collect();
    let slot = match names.as_slice() {
        ["faultcode"] | ["Code", "Value"] => code,
        ["faultstring"] | ["Reason", "Text"] => string,
        ["faultactor"] | ["Role"] => actor,
        _ => return,
    };
    if slot.is_none() {
        *slot = Some(text);
    }
}
