//! HTTP transport types for the host-does-IO pattern.
//!
//! # Design
//! These types describe SOAP-over-HTTP exchanges as plain data. `SoapClient`
//! builds `HttpRequest` values and parses `HttpResponse` values without
//! touching the network; a `Transport` performs the actual round trip. SOAP
//! 1.1 always POSTs, so the request carries no method.

/// An HTTP POST described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpRequest {
    /// Look up a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// An HTTP response described as plain data.
///
/// Constructed by the transport after executing an `HttpRequest`, then passed
/// to `SoapClient::parse_response`.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}
