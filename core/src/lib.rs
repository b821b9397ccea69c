//! Session client for the e-Boekhouden SOAP accounting API.
//!
//! # Overview
//! Opens a session with the remote service, sends validated queries and
//! mutations under that session, and raises the error descriptor the service
//! embeds in otherwise successful responses.
//!
//! # Design
//! - `field::Field` is the single validated value type; a `FieldKind` picks
//!   its rule (length ceiling, integer range, date, fixed set, free text).
//! - `SoapClient` is stateless and I/O-free: `build_request` produces an
//!   `HttpRequest`, `parse_response` consumes an `HttpResponse`.
//! - `Session` drives a `Transport` through one generic call routine and
//!   closes the session on every exit path.
//! - Results are returned as `serde_json::Value` trees shaped exactly like
//!   the service's XML.

pub mod client;
pub mod config;
pub mod error;
pub mod field;
pub mod http;
pub mod session;
pub mod soap;
pub mod transport;
pub mod types;

pub use client::SoapClient;
pub use config::SessionConfig;
pub use error::{Error, RemoteFault, Result, ValidationError, Violation};
pub use field::{Field, FieldKind, Input, Rule};
pub use http::{HttpRequest, HttpResponse};
pub use session::{OpenItems, Session};
pub use transport::{Transport, UreqTransport};
pub use types::{LedgerAccount, Mutation, MutationKind, MutationLine, Relation, RelationKind, VatMode};
