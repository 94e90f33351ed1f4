//! SOAP version and action negotiation from HTTP headers.
//!
//! SOAP 1.1 requests use `text/xml` and carry the action in the `SOAPAction`
//! header. SOAP 1.2 requests use `application/soap+xml` and carry it as the
//! `action` parameter of the content type.

use crate::config::SoapVersion;
use crate::error::DispatchError;
use crate::parser::parse_soap_action;
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderMap;

/// Name of the SOAP 1.1 action header.
pub const SOAP_ACTION_HEADER: &str = "SOAPAction";

/// Media type of SOAP 1.1 requests.
pub const SOAP_11_MEDIA_TYPE: &str = "text/xml";

/// Media type of SOAP 1.2 requests.
pub const SOAP_12_MEDIA_TYPE: &str = "application/soap+xml";

/// Outcome of negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    pub version: SoapVersion,
    /// Action identifier; empty when the client sent none
    pub action: String,
}

/// Resolve version and action from request headers.
///
/// Only versions listed in `allowed` are accepted; anything else, including
/// a missing content type, is an unsupported content type.
pub fn negotiate(headers: &HeaderMap, allowed: &[SoapVersion]) -> Result<Negotiated, DispatchError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let (media_type, params) = split_content_type(content_type);
    let version = if media_type.eq_ignore_ascii_case(SOAP_11_MEDIA_TYPE) {
        SoapVersion::Soap11
    } else if media_type.eq_ignore_ascii_case(SOAP_12_MEDIA_TYPE) {
        SoapVersion::Soap12
    } else {
        return Err(DispatchError::UnsupportedContentType(content_type.to_string()));
    };

    if !allowed.contains(&version) {
        return Err(DispatchError::UnsupportedContentType(content_type.to_string()));
    }

    let header_action = || {
        headers
            .get(SOAP_ACTION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(parse_soap_action)
    };

    let action = match version {
        SoapVersion::Soap11 => header_action(),
        SoapVersion::Soap12 => params
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("action"))
            .map(|(_, value)| parse_soap_action(value))
            .or_else(header_action),
    }
    .unwrap_or_default();

    Ok(Negotiated { version, action })
}

/// Split `type/subtype; k=v; k2="v2"` into the media type and its parameters.
fn split_content_type(value: &str) -> (&str, Vec<(&str, &str)>) {
    let mut parts = value.split(';');
    let media_type = parts.next().unwrap_or_default().trim();
    let params = parts
        .filter_map(|param| {
            let (name, value) = param.split_once('=')?;
            Some((name.trim(), value.trim()))
        })
        .collect();
    (media_type, params)
}
