//! Stateless SOAP request builder and response parser.
//!
//! # Design
//! `SoapClient` holds only the endpoint URL and carries no mutable state
//! between calls. `build_request` turns an operation name and its parameters
//! into an `HttpRequest`; `parse_response` turns the matching `HttpResponse`
//! into the operation's result tree. The caller executes the HTTP round trip
//! in between, keeping this layer deterministic and free of I/O.
//!
//! Fault detection is identical for every operation: the response element
//! `<Op>Response` must contain `<Op>Result`, and a non-empty
//! `<Op>Result/ErrorMsg/LastErrorCode` is a remote fault.

use serde_json::Value;

use crate::error::{Error, RemoteFault, Result};
use crate::http::{HttpRequest, HttpResponse};
use crate::soap::{self, Param, SERVICE_NS};

/// Production endpoint of the e-Boekhouden SOAP API.
pub const DEFAULT_ENDPOINT: &str = "https://soap.e-boekhouden.nl/soap.asmx";

/// Synchronous, stateless builder/parser for the SOAP API.
#[derive(Debug, Clone)]
pub struct SoapClient {
    endpoint: String,
}

impl SoapClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn build_request(&self, operation: &str, params: &[(&str, Param)]) -> Result<HttpRequest> {
        let body = soap::write_envelope(operation, params)?;
        Ok(HttpRequest {
            url: self.endpoint.clone(),
            headers: vec![
                ("content-type".to_string(), "text/xml; charset=utf-8".to_string()),
                ("soapaction".to_string(), format!("\"{SERVICE_NS}/{operation}\"")),
            ],
            body,
        })
    }

    /// Parse a response into the `<Op>Result` tree, raising embedded faults.
    pub fn parse_response(&self, operation: &str, response: HttpResponse) -> Result<Value> {
        let tree = self.parse_envelope(operation, response)?;
        check_fault(operation, &tree)?;

        let key = result_key(operation);
        match tree {
            Value::Object(mut map) => map
                .remove(&key)
                .ok_or_else(|| Error::MalformedResponse(format!("missing {key}"))),
            _ => Err(Error::MalformedResponse(format!("missing {key}"))),
        }
    }

    /// Parse a response into the `<Op>Response` tree without checking for
    /// an embedded fault.
    pub fn parse_envelope(&self, operation: &str, response: HttpResponse) -> Result<Value> {
        let document = soap::read_document(&response.body);
        let mut document = match (response.status, document) {
            (200, Ok(document)) => document,
            (200, Err(err)) => return Err(err),
            (status, Ok(document)) => {
                soap_fault(&document)?;
                return Err(Error::Http {
                    status,
                    body: response.body,
                });
            }
            (status, Err(_)) => {
                return Err(Error::Http {
                    status,
                    body: response.body,
                })
            }
        };

        soap_fault(&document)?;

        let key = format!("{operation}Response");
        document
            .pointer_mut(&format!("/Envelope/Body/{key}"))
            .map(Value::take)
            .ok_or_else(|| Error::MalformedResponse(format!("missing {key}")))
    }
}

fn result_key(operation: &str) -> String {
    format!("{operation}Result")
}

/// Raise `Error::Soap` if the document body carries a SOAP `Fault`.
fn soap_fault(document: &Value) -> Result<()> {
    let Some(fault) = document.pointer("/Envelope/Body/Fault") else {
        return Ok(());
    };
    let field = |name: &str| {
        fault
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    Err(Error::Soap {
        code: field("faultcode"),
        reason: field("faultstring"),
    })
}

/// Raise a `RemoteFault` if `<Op>Result/ErrorMsg/LastErrorCode` is non-empty.
pub fn check_fault(operation: &str, response: &Value) -> std::result::Result<(), RemoteFault> {
    let path = format!("/{}/ErrorMsg", result_key(operation));
    let Some(error) = response.pointer(&path) else {
        return Ok(());
    };
    let text = |name: &str| match error.get(name) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    };

    let code = text("LastErrorCode");
    if code.is_empty() {
        return Ok(());
    }
    Err(RemoteFault {
        code,
        description: text("LastErrorDescription"),
        last_request: None,
    })
}
