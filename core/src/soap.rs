//! SOAP 1.1 envelope codec.
//!
//! # Design
//! Outgoing parameters are an ordered tree of `Param` values, because the
//! service's document/literal schema is sequence-based: field order matters
//! and every declared field must be present even when empty. Incoming
//! envelopes are read into a `serde_json::Value` tree keyed by local element
//! name, so callers receive results shaped exactly as the service sent them:
//! leaf elements become strings, elements with children become objects, and
//! repeated siblings collapse into an array.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::field::Field;

pub const ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SERVICE_NS: &str = "http://www.e-boekhouden.nl/soap";

/// Named parameters in wire order.
pub type Params = Vec<(&'static str, Param)>;

/// One outgoing parameter: a text leaf or a nested group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Text(String),
    Group(Params),
}

impl Param {
    pub fn text(value: impl Into<String>) -> Self {
        Param::Text(value.into())
    }

    pub fn int(value: i64) -> Self {
        Param::Text(value.to_string())
    }
}

impl From<&Field> for Param {
    fn from(field: &Field) -> Self {
        Param::Text(field.as_str().to_string())
    }
}

fn xml_error(err: impl std::fmt::Display) -> Error {
    Error::Xml(err.to_string())
}

/// Write a complete request envelope for `operation`.
pub fn write_envelope(operation: &str, params: &[(&str, Param)]) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(xml_error)?;

    let mut envelope = BytesStart::new("soap:Envelope");
    envelope.push_attribute(("xmlns:soap", ENVELOPE_NS));
    writer.write_event(Event::Start(envelope)).map_err(xml_error)?;
    writer
        .write_event(Event::Start(BytesStart::new("soap:Body")))
        .map_err(xml_error)?;

    let mut call = BytesStart::new(operation);
    call.push_attribute(("xmlns", SERVICE_NS));
    writer.write_event(Event::Start(call)).map_err(xml_error)?;
    write_params(&mut writer, params)?;
    writer
        .write_event(Event::End(BytesEnd::new(operation)))
        .map_err(xml_error)?;

    writer
        .write_event(Event::End(BytesEnd::new("soap:Body")))
        .map_err(xml_error)?;
    writer
        .write_event(Event::End(BytesEnd::new("soap:Envelope")))
        .map_err(xml_error)?;

    String::from_utf8(writer.into_inner()).map_err(xml_error)
}

fn write_params(writer: &mut Writer<Vec<u8>>, params: &[(&str, Param)]) -> Result<()> {
    for (name, param) in params {
        writer
            .write_event(Event::Start(BytesStart::new(*name)))
            .map_err(xml_error)?;
        match param {
            Param::Text(text) if text.is_empty() => {}
            Param::Text(text) => writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(xml_error)?,
            Param::Group(children) => write_params(writer, children)?,
        }
        writer
            .write_event(Event::End(BytesEnd::new(*name)))
            .map_err(xml_error)?;
    }
    Ok(())
}

struct Frame {
    name: String,
    children: Map<String, Value>,
    text: String,
}

impl Frame {
    fn new(name: String) -> Self {
        Self {
            name,
            children: Map::new(),
            text: String::new(),
        }
    }

    fn into_value(self) -> Value {
        if self.children.is_empty() {
            Value::String(self.text)
        } else {
            Value::Object(self.children)
        }
    }
}

fn insert_child(map: &mut Map<String, Value>, name: String, value: Value) {
    match map.get_mut(&name) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            map.insert(name, value);
        }
    }
}

/// Read an XML document into a tree keyed by local element names.
///
/// The returned object has a single key, the document element. Leaf text is
/// kept exactly as sent; text beside child elements is layout and dropped.
pub fn read_document(xml: &str) -> Result<Value> {
    let mut reader = Reader::from_str(xml);

    let mut stack = vec![Frame::new(String::new())];
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(start) => {
                let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
                stack.push(Frame::new(name));
            }
            Event::Empty(start) => {
                let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
                if let Some(parent) = stack.last_mut() {
                    insert_child(&mut parent.children, name, Value::String(String::new()));
                }
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(xml_error)?;
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::End(_) => {
                let mut frame = match stack.pop() {
                    Some(frame) if !stack.is_empty() => frame,
                    _ => return Err(Error::Xml("unbalanced closing tag".to_string())),
                };
                let name = std::mem::take(&mut frame.name);
                if let Some(parent) = stack.last_mut() {
                    insert_child(&mut parent.children, name, frame.into_value());
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    match stack.pop() {
        Some(root) if stack.is_empty() && !root.children.is_empty() => {
            Ok(Value::Object(root.children))
        }
        _ => Err(Error::Xml("unexpected end of document".to_string())),
    }
}
