//! Authenticated session with the e-Boekhouden SOAP API.
//!
//! # Design
//! A `Session` only exists in the open state: `open` performs the
//! `OpenSession` exchange and fails without leaving a value behind, and the
//! `CloseSession` exchange runs exactly once, from `close`, from the end of
//! `scoped`, or from `Drop` on any other exit path. Close failures are
//! logged and swallowed because the server expires sessions on its own.
//!
//! Every operation goes through `call`: its parameter builder validates the
//! caller's input into `Field`s (returning before any I/O on failure), the
//! session prepends `SessionID` and `SecurityCode2`, the request is sent
//! through the `Transport`, and `SoapClient::parse_response` applies the
//! uniform fault check before the `<Op>Result` tree is returned verbatim.
//! Operations differ only in their operation name and parameter builder.
//!
//! Operations take `&mut self`; one session serves one call at a time.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::client::{check_fault, SoapClient};
use crate::config::SessionConfig;
use crate::error::{Error, Result, ValidationError};
use crate::field::{Field, FieldKind, Input, Rule};
use crate::soap::{Param, Params};
use crate::transport::{Transport, UreqTransport};
use crate::types::{LedgerAccount, Mutation, Relation};

/// Lower bound used when a mutation query is not constrained by date.
pub const EARLIEST_DATE: &str = "1980-01-01";
/// Upper bound used when a mutation query is not constrained by date.
pub const LATEST_DATE: &str = "2049-12-31";

const CLOSE_SESSION: &str = "CloseSession";

/// Which side of the open-items ledger to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenItems {
    Debtors,
    Creditors,
}

impl OpenItems {
    fn wire(self) -> &'static str {
        match self {
            OpenItems::Debtors => "Debiteuren",
            OpenItems::Creditors => "Crediteuren",
        }
    }
}

/// Build, send, and parse one SOAP exchange.
fn exchange<T: Transport>(
    client: &SoapClient,
    transport: &mut T,
    capture: Option<&mut Option<String>>,
    operation: &str,
    params: &[(&str, Param)],
) -> Result<Value> {
    let request = client.build_request(operation, params)?;
    let captured = capture.map(|slot| {
        *slot = Some(request.body.clone());
        request.body.clone()
    });

    debug!(operation, bytes = request.body.len(), "dispatching SOAP call");
    let response = transport.send(&request)?;

    client
        .parse_response(operation, response)
        .map_err(|err| match err {
            Error::Fault(mut fault) => {
                warn!(operation, code = %fault.code, "remote fault");
                fault.last_request = captured;
                Error::Fault(fault)
            }
            other => other,
        })
}

/// Fields of the `GetMutaties` filter; unset fields are sent empty.
struct MutationFilter {
    number: i64,
    range_start: String,
    range_end: String,
    invoice_number: String,
    date_from: String,
    date_to: String,
}

impl Default for MutationFilter {
    fn default() -> Self {
        Self {
            number: 0,
            range_start: String::new(),
            range_end: String::new(),
            invoice_number: String::new(),
            date_from: EARLIEST_DATE.to_string(),
            date_to: LATEST_DATE.to_string(),
        }
    }
}

impl MutationFilter {
    fn into_params(self) -> Params {
        vec![(
            "cFilter",
            Param::Group(vec![
                ("MutatieNr", Param::int(self.number)),
                ("MutatieNrVan", Param::Text(self.range_start)),
                ("MutatieNrTm", Param::Text(self.range_end)),
                ("Factuurnummer", Param::Text(self.invoice_number)),
                ("DatumVan", Param::Text(self.date_from)),
                ("DatumTm", Param::Text(self.date_to)),
            ]),
        )]
    }
}

fn relation_filter(search: &str, code: &str, id: String) -> Params {
    vec![(
        "cFilter",
        Param::Group(vec![
            ("Trefwoord", Param::text(search)),
            ("Code", Param::text(code)),
            ("ID", Param::Text(id)),
        ]),
    )]
}

/// An open session. Dropping it closes the session.
pub struct Session<T: Transport> {
    client: SoapClient,
    transport: T,
    session_id: String,
    security_code_2: String,
    debug: bool,
    search_limit: Option<usize>,
    last_request: Option<String>,
    closed: bool,
}

impl Session<UreqTransport> {
    /// Open a session over HTTP using the configured timeout.
    pub fn connect(config: &SessionConfig) -> Result<Self> {
        Self::open(config, UreqTransport::new(config.timeout()))
    }
}

impl<T: Transport> Session<T> {
    /// Perform the `OpenSession` exchange.
    pub fn open(config: &SessionConfig, mut transport: T) -> Result<Self> {
        let client = SoapClient::new(&config.endpoint);
        let params = vec![
            ("Username", Param::text(&config.username)),
            ("SecurityCode1", Param::text(&config.security_code_1)),
            ("SecurityCode2", Param::text(&config.security_code_2)),
        ];

        let mut last_request = None;
        let capture = config.debug.then_some(&mut last_request);
        let result = exchange(&client, &mut transport, capture, "OpenSession", &params)?;

        let session_id = result
            .get("SessionID")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::MalformedResponse("missing SessionID".to_string()))?
            .to_string();

        info!(endpoint = client.endpoint(), username = %config.username, "session opened");
        Ok(Self {
            client,
            transport,
            session_id,
            security_code_2: config.security_code_2.clone(),
            debug: config.debug,
            search_limit: config.search_limit,
            last_request,
            closed: false,
        })
    }

    /// Open a session, run `f`, and close the session on every exit path.
    pub fn scoped<R>(
        config: &SessionConfig,
        transport: T,
        f: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        let mut session = Self::open(config, transport)?;
        let outcome = f(&mut session);
        session.close();
        outcome
    }

    /// Close the session. Failures are logged, never returned.
    pub fn close(mut self) {
        self.release();
    }

    /// The raw envelope of the most recent request, kept in debug mode.
    pub fn last_request(&self) -> Option<&str> {
        self.last_request.as_deref()
    }

    pub fn debug_info(&self) -> String {
        format!("Last SOAP request: {}", self.last_request().unwrap_or_default())
    }

    fn call<F>(&mut self, operation: &'static str, build: F) -> Result<Value>
    where
        F: FnOnce() -> std::result::Result<Params, ValidationError>,
    {
        let payload = build()?;

        let mut params: Params = Vec::with_capacity(payload.len() + 2);
        params.push(("SessionID", Param::text(&self.session_id)));
        params.push(("SecurityCode2", Param::text(&self.security_code_2)));
        params.extend(payload);

        let capture = self.debug.then_some(&mut self.last_request);
        exchange(&self.client, &mut self.transport, capture, operation, &params)
    }

    fn release(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        match self.close_exchange() {
            Ok(()) => info!("session closed"),
            Err(err) => warn!(error = %err, "closing session failed, ignoring"),
        }
    }

    fn close_exchange(&mut self) -> Result<()> {
        let params = vec![("SessionID", Param::text(&self.session_id))];
        let request = self.client.build_request(CLOSE_SESSION, &params)?;
        let response = self.transport.send(&request)?;
        let tree = self.client.parse_envelope(CLOSE_SESSION, response)?;
        check_fault(CLOSE_SESSION, &tree)?;
        Ok(())
    }

    pub fn add_ledger_account(&mut self, account: &LedgerAccount) -> Result<Value> {
        self.call("AddGrootboekrekening", || Ok(vec![("oGb", account.to_param()?)]))
    }

    pub fn update_ledger_account(&mut self, account: &LedgerAccount) -> Result<Value> {
        self.call("UpdateGrootboekrekening", || Ok(vec![("oGb", account.to_param()?)]))
    }

    pub fn add_mutation(&mut self, mutation: &Mutation) -> Result<Value> {
        self.call("AddMutatie", || Ok(vec![("oMut", mutation.to_param()?)]))
    }

    pub fn add_relation(&mut self, relation: &Relation) -> Result<Value> {
        self.call("AddRelatie", || Ok(vec![("oRel", relation.to_param()?)]))
    }

    pub fn update_relation(&mut self, relation: &Relation) -> Result<Value> {
        self.call("UpdateRelatie", || Ok(vec![("oRel", relation.to_param()?)]))
    }

    /// Invoices dated within `date_from..=date_to`, optionally narrowed by
    /// invoice number and relation code.
    pub fn get_invoices(
        &mut self,
        date_from: &str,
        date_to: &str,
        invoice_number: Option<&str>,
        relation_code: Option<&str>,
    ) -> Result<Value> {
        self.call("GetFacturen", || {
            let date_from = Field::new(FieldKind::Date, date_from)?;
            let date_to = Field::new(FieldKind::Date, date_to)?;
            let invoice_number = Field::new(FieldKind::InvoiceNumber, invoice_number)?;
            let relation_code = Field::new(FieldKind::RelationCode, relation_code)?;
            Ok(vec![(
                "cFilter",
                Param::Group(vec![
                    ("Factuurnummer", Param::from(&invoice_number)),
                    ("Relatiecode", Param::from(&relation_code)),
                    ("DatumVan", Param::from(&date_from)),
                    ("DatumTm", Param::from(&date_to)),
                ]),
            )])
        })
    }

    pub fn get_ledger_accounts<'a>(
        &mut self,
        id: impl Into<Input<'a>>,
        code: Option<&str>,
        category: Option<&str>,
    ) -> Result<Value> {
        let id = id.into();
        self.call("GetGrootboekrekeningen", || {
            let id = Field::new(FieldKind::LedgerAccountId, id)?;
            let code = Field::new(FieldKind::LedgerAccountCode, code)?;
            let category = Field::new(FieldKind::LedgerAccountCategory, category)?;
            Ok(vec![(
                "cFilter",
                Param::Group(vec![
                    ("ID", Param::int(id.to_int())),
                    ("Code", Param::from(&code)),
                    ("Categorie", Param::from(&category)),
                ]),
            )])
        })
    }

    pub fn get_mutations_by_period(&mut self, date_from: &str, date_to: &str) -> Result<Value> {
        self.call("GetMutaties", || {
            let date_from = Field::new(FieldKind::Date, date_from)?;
            let date_to = Field::new(FieldKind::Date, date_to)?;
            Ok(MutationFilter {
                date_from: date_from.to_string(),
                date_to: date_to.to_string(),
                ..MutationFilter::default()
            }
            .into_params())
        })
    }

    pub fn get_mutations_by_id<'a>(&mut self, mutation_id: impl Into<Input<'a>>) -> Result<Value> {
        let mutation_id = mutation_id.into();
        self.call("GetMutaties", || {
            let mutation_id = Field::new(FieldKind::MutationId, mutation_id)?;
            Ok(MutationFilter {
                number: mutation_id.to_int(),
                ..MutationFilter::default()
            }
            .into_params())
        })
    }

    pub fn get_mutations_in_range<'a, 'b>(
        &mut self,
        start: impl Into<Input<'a>>,
        end: impl Into<Input<'b>>,
    ) -> Result<Value> {
        let (start, end) = (start.into(), end.into());
        self.call("GetMutaties", || {
            let start = Field::new(FieldKind::MutationId, start)?;
            let end = Field::new(FieldKind::MutationId, end)?;
            Ok(MutationFilter {
                range_start: start.to_int().to_string(),
                range_end: end.to_int().to_string(),
                ..MutationFilter::default()
            }
            .into_params())
        })
    }

    pub fn get_mutations_by_invoice_number(&mut self, invoice_number: &str) -> Result<Value> {
        self.call("GetMutaties", || {
            let invoice_number = Field::new(FieldKind::InvoiceNumber, invoice_number)?;
            Ok(MutationFilter {
                invoice_number: invoice_number.to_string(),
                ..MutationFilter::default()
            }
            .into_params())
        })
    }

    pub fn get_open_items(&mut self, side: OpenItems) -> Result<Value> {
        self.call("GetOpenPosten", || Ok(vec![("OpSoort", Param::text(side.wire()))]))
    }

    pub fn get_open_items_debtors(&mut self) -> Result<Value> {
        self.get_open_items(OpenItems::Debtors)
    }

    pub fn get_open_items_creditors(&mut self) -> Result<Value> {
        self.get_open_items(OpenItems::Creditors)
    }

    pub fn get_all_relations(&mut self) -> Result<Value> {
        self.call("GetRelaties", || Ok(relation_filter("", "", String::new())))
    }

    pub fn get_relation_by_id<'a>(&mut self, relation_id: impl Into<Input<'a>>) -> Result<Value> {
        let relation_id = relation_id.into();
        self.call("GetRelaties", || {
            let relation_id = Field::new(FieldKind::RelationId, relation_id)?;
            Ok(relation_filter("", "", relation_id.to_int().to_string()))
        })
    }

    pub fn get_relation_by_code(&mut self, code: &str) -> Result<Value> {
        self.call("GetRelaties", || {
            let code = Field::new(FieldKind::RelationCode, code)?;
            Ok(relation_filter("", code.as_str(), String::new()))
        })
    }

    pub fn get_relations_by_search(&mut self, search: &str) -> Result<Value> {
        let rule = self.search_limit.map_or(Rule::FreeText, Rule::MaxLength);
        self.call("GetRelaties", || {
            let search = Field::with_rule(FieldKind::RelationSearch, rule, search)?;
            Ok(relation_filter(search.as_str(), "", String::new()))
        })
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        self.release();
    }
}
