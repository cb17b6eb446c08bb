//! Gateway response parsing.
//!
//! The gateway answers either with an XML document of
//! `<FIELD KEY="...">value</FIELD>` elements or with a flat
//! `KEY=value&KEY=value` body. The format is not announced; it is sniffed from
//! the first non-whitespace byte.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;

use super::GatewayError;
use crate::domain::DeclineCategory;

pub const APPROVED_CODE: &str = "00";

const FIELD_TOKEN: &str = "AUTH_GUID";
const FIELD_RESPONSE_CODE: &str = "AUTH_RESP";
const FIELD_APPROVAL_CODE: &str = "AUTH_CODE";
const FIELD_RESPONSE_TEXT: &str = "AUTH_RESP_TEXT";

const ISSUER_UNAVAILABLE_CODES: &[&str] = &["19", "91", "92", "96"];
const HARD_DECLINE_CODES: &[&str] = &[
    "04", "07", "12", "14", "15", "41", "43", "54", "57", "62", "R2", "R3", "R4",
];

/// Normalized result of one gateway exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayResponse {
    pub approved: bool,
    pub category: DeclineCategory,
    pub response_code: String,
    pub response_text: Option<String>,
    pub approval_code: Option<String>,
    /// Token issued for this transaction (time-bounded for financial
    /// operations, durable for storage).
    pub token: Option<String>,
    /// Every field as returned, for audit.
    pub fields: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyFormat {
    Xml,
    KeyValue,
}

fn sniff(body: &str) -> Option<BodyFormat> {
    match body.bytes().find(|b| !b.is_ascii_whitespace())? {
        b'<' => Some(BodyFormat::Xml),
        _ => Some(BodyFormat::KeyValue),
    }
}

pub fn classify(code: &str) -> DeclineCategory {
    if code == APPROVED_CODE {
        DeclineCategory::Approved
    } else if ISSUER_UNAVAILABLE_CODES.contains(&code) {
        DeclineCategory::IssuerUnavailable
    } else if HARD_DECLINE_CODES.contains(&code) {
        DeclineCategory::HardDecline
    } else {
        DeclineCategory::SoftDecline
    }
}

pub fn parse_response(body: &str) -> Result<GatewayResponse, GatewayError> {
    let fields = match sniff(body) {
        None => return Err(GatewayError::Malformed("empty response body".to_string())),
        Some(BodyFormat::Xml) => parse_xml_fields(body)?,
        Some(BodyFormat::KeyValue) => parse_key_value_fields(body),
    };

    let response_code = fields
        .get(FIELD_RESPONSE_CODE)
        .map(|code| code.trim().to_string())
        .filter(|code| !code.is_empty())
        .ok_or_else(|| {
            GatewayError::Malformed(format!("response is missing {}", FIELD_RESPONSE_CODE))
        })?;

    let non_empty = |key: &str| {
        fields
            .get(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    let token = non_empty(FIELD_TOKEN);
    let approval_code = non_empty(FIELD_APPROVAL_CODE);
    let response_text = non_empty(FIELD_RESPONSE_TEXT);

    let category = classify(&response_code);
    Ok(GatewayResponse {
        approved: category == DeclineCategory::Approved,
        category,
        response_code,
        response_text,
        approval_code,
        token,
        fields,
    })
}

fn parse_key_value_fields(body: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(body.trim().as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn parse_xml_fields(body: &str) -> Result<HashMap<String, String>, GatewayError> {
    let mut reader = Reader::from_str(body);
    reader.trim_text(true);

    let mut fields = HashMap::new();
    let mut current_key: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"FIELD" => {
                let key = field_key(&e)?;
                fields.insert(key.clone(), String::new());
                current_key = Some(key);
            }
            Ok(Event::Empty(e)) if e.name().as_ref() == b"FIELD" => {
                fields.insert(field_key(&e)?, String::new());
            }
            Ok(Event::Text(text)) => {
                if let Some(key) = &current_key {
                    let value = text
                        .unescape()
                        .map_err(|e| GatewayError::Malformed(format!("bad field value: {}", e)))?;
                    fields.insert(key.clone(), value.into_owned());
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"FIELD" => current_key = None,
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(GatewayError::Malformed(format!(
                    "invalid XML at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
    }

    if current_key.is_some() {
        return Err(GatewayError::Malformed("unterminated FIELD element".to_string()));
    }

    Ok(fields)
}

fn field_key(element: &quick_xml::events::BytesStart<'_>) -> Result<String, GatewayError> {
    let attr = element
        .try_get_attribute("KEY")
        .map_err(|e| GatewayError::Malformed(format!("bad FIELD attribute: {}", e)))?
        .ok_or_else(|| GatewayError::Malformed("FIELD element without KEY".to_string()))?;
    let key = attr
        .unescape_value()
        .map_err(|e| GatewayError::Malformed(format!("bad FIELD key: {}", e)))?;
    Ok(key.into_owned())
}
