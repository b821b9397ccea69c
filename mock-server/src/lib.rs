use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use quick_xml::{escape::escape, events::Event, Reader};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;
use uuid::Uuid;

pub const SERVICE_NS: &str = "http://www.e-boekhouden.nl/soap";

/// Credentials the mock accepts in `OpenSession`.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub username: String,
    pub security_code_1: String,
    pub security_code_2: String,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            username: "demo".to_string(),
            security_code_1: "code-1".to_string(),
            security_code_2: "code-2".to_string(),
        }
    }
}

/// Leaf fields of a stored entity, in wire order.
pub type Record = Vec<(String, String)>;

#[derive(Default)]
pub struct Store {
    credentials: Credentials,
    sessions: HashSet<String>,
    ledger_accounts: Vec<Record>,
    relations: Vec<Record>,
    mutations: Vec<Record>,
    next_id: i64,
}

pub type Db = Arc<RwLock<Store>>;

/// A parsed request: the operation and its leaf parameters by path,
/// e.g. `cFilter/MutatieNr`.
#[derive(Debug, Default)]
pub struct Call {
    pub operation: String,
    pub params: Vec<(String, String)>,
}

impl Call {
    pub fn param(&self, path: &str) -> &str {
        self.params
            .iter()
            .find(|(key, _)| key == path)
            .map(|(_, value)| value.as_str())
            .unwrap_or("")
    }

    /// Direct leaf children of `group`, e.g. every `oRel/*` field.
    fn group(&self, group: &str) -> Record {
        let prefix = format!("{group}/");
        self.params
            .iter()
            .filter_map(|(key, value)| {
                let name = key.strip_prefix(&prefix)?;
                (!name.contains('/')).then(|| (name.to_string(), value.clone()))
            })
            .collect()
    }
}

struct Frame {
    name: String,
    text: String,
    has_children: bool,
}

/// Parse a SOAP request envelope. The operation is the first element inside
/// `Body`.
pub fn parse_call(xml: &str) -> Result<Call, String> {
    let mut reader = Reader::from_str(xml);

    let mut call = Call::default();
    let mut stack: Vec<Frame> = Vec::new();

    let leaf_path = |stack: &[Frame], name: &str| {
        let mut parts: Vec<&str> = stack.iter().skip(3).map(|f| f.name.as_str()).collect();
        parts.push(name);
        parts.join("/")
    };

    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(start) => {
                if let Some(parent) = stack.last_mut() {
                    parent.has_children = true;
                }
                let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
                if stack.len() == 2 && call.operation.is_empty() {
                    call.operation = name.clone();
                }
                stack.push(Frame {
                    name,
                    text: String::new(),
                    has_children: false,
                });
            }
            Event::Empty(start) => {
                if let Some(parent) = stack.last_mut() {
                    parent.has_children = true;
                }
                let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
                if stack.len() >= 3 {
                    call.params.push((leaf_path(stack.as_slice(), &name), String::new()));
                } else if stack.len() == 2 && call.operation.is_empty() {
                    call.operation = name;
                }
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(|e| e.to_string())?;
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&text);
                }
            }
            Event::End(_) => {
                let frame = stack.pop().ok_or("unbalanced closing tag")?;
                if stack.len() >= 3 && !frame.has_children {
                    call.params.push((leaf_path(stack.as_slice(), &frame.name), frame.text));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() || call.operation.is_empty() {
        return Err("no operation in envelope".to_string());
    }
    Ok(call)
}

fn error_msg(code: &str, description: &str) -> String {
    format!(
        "<ErrorMsg><LastErrorCode>{}</LastErrorCode><LastErrorDescription>{}</LastErrorDescription></ErrorMsg>",
        escape(code),
        escape(description)
    )
}

fn ok_msg() -> String {
    error_msg("", "")
}

fn render(tag: &str, record: &Record) -> String {
    let mut out = format!("<{tag}>");
    for (name, value) in record {
        out.push_str(&format!("<{name}>{}</{name}>", escape(value.as_str())));
    }
    out.push_str(&format!("</{tag}>"));
    out
}

fn render_list(list_tag: &str, item_tag: &str, records: &[&Record]) -> String {
    let items: String = records.iter().map(|r| render(item_tag, r)).collect();
    format!("<{list_tag}>{items}</{list_tag}>")
}

fn field<'r>(record: &'r Record, name: &str) -> &'r str {
    record
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
        .unwrap_or("")
}

fn set_field(record: &mut Record, name: &str, value: String) {
    match record.iter_mut().find(|(key, _)| key == name) {
        Some((_, existing)) => *existing = value,
        None => record.push((name.to_string(), value)),
    }
}

fn soap_envelope(inner: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?><soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body>{inner}</soap:Body></soap:Envelope>"#
    )
}

fn xml_response(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, "text/xml; charset=utf-8")], body).into_response()
}

fn soap_fault(code: &str, reason: &str) -> Response {
    let fault = format!(
        "<soap:Fault><faultcode>{code}</faultcode><faultstring>{}</faultstring></soap:Fault>",
        escape(reason)
    );
    xml_response(StatusCode::INTERNAL_SERVER_ERROR, soap_envelope(&fault))
}

fn result(operation: &str, inner: &str) -> Response {
    let body = format!(
        r#"<{operation}Response xmlns="{SERVICE_NS}"><{operation}Result>{inner}</{operation}Result></{operation}Response>"#
    );
    xml_response(StatusCode::OK, soap_envelope(&body))
}

pub fn store(credentials: Credentials) -> Db {
    Arc::new(RwLock::new(Store {
        credentials,
        next_id: 1,
        ..Store::default()
    }))
}

pub fn router(db: Db) -> Router {
    Router::new().route("/soap.asmx", post(soap)).with_state(db)
}

pub fn app(credentials: Credentials) -> Router {
    router(store(credentials))
}

pub async fn run(listener: TcpListener, credentials: Credentials) -> Result<(), std::io::Error> {
    axum::serve(listener, app(credentials)).await
}

async fn soap(State(db): State<Db>, body: String) -> Response {
    let call = match parse_call(&body) {
        Ok(call) => call,
        Err(reason) => {
            debug!(%reason, "unreadable request");
            return soap_fault("soap:Client", "Server was unable to read request.");
        }
    };
    debug!(operation = %call.operation, "handling call");

    let mut store = db.write().await;
    let operation = call.operation.as_str();

    if operation == "OpenSession" {
        let creds = &store.credentials;
        if call.param("Username") != creds.username
            || call.param("SecurityCode1") != creds.security_code_1
            || call.param("SecurityCode2") != creds.security_code_2
        {
            return result(operation, &error_msg("E0001", "Ongeldige inloggegevens"));
        }
        let session_id = Uuid::new_v4().to_string();
        store.sessions.insert(session_id.clone());
        return result(operation, &format!("{}<SessionID>{session_id}</SessionID>", ok_msg()));
    }

    if operation == "CloseSession" {
        store.sessions.remove(call.param("SessionID"));
        return xml_response(
            StatusCode::OK,
            soap_envelope(&format!(r#"<CloseSessionResponse xmlns="{SERVICE_NS}"/>"#)),
        );
    }

    if !store.sessions.contains(call.param("SessionID"))
        || call.param("SecurityCode2") != store.credentials.security_code_2
    {
        return result(operation, &error_msg("E0002", "Sessie ongeldig of verlopen"));
    }

    match operation {
        "AddGrootboekrekening" => {
            let record = call.group("oGb");
            let code = field(&record, "Code");
            if store.ledger_accounts.iter().any(|r| field(r, "Code") == code) {
                return result(operation, &error_msg("E0003", "Grootboekcode bestaat al"));
            }
            let id = store.allocate(record, "ID", Entity::LedgerAccount);
            result(operation, &format!("{}<Gb_ID>{id}</Gb_ID>", ok_msg()))
        }
        "UpdateGrootboekrekening" => update(&mut store, operation, call.group("oGb"), Entity::LedgerAccount),
        "AddRelatie" => {
            let record = call.group("oRel");
            let code = field(&record, "Code");
            if store.relations.iter().any(|r| field(r, "Code") == code) {
                return result(operation, &error_msg("E0005", "Relatiecode bestaat al"));
            }
            let id = store.allocate(record, "ID", Entity::Relation);
            result(operation, &format!("{}<Rel_ID>{id}</Rel_ID>", ok_msg()))
        }
        "UpdateRelatie" => update(&mut store, operation, call.group("oRel"), Entity::Relation),
        "AddMutatie" => {
            let id = store.allocate(call.group("oMut"), "MutatieNr", Entity::Mutation);
            result(operation, &format!("{}<Mutatie_handle>{id}</Mutatie_handle>", ok_msg()))
        }
        "GetMutaties" => {
            let found: Vec<&Record> = store.mutations.iter().filter(|m| mutation_matches(&call, m)).collect();
            result(operation, &format!("{}{}", ok_msg(), render_list("Mutaties", "cMutatie", &found)))
        }
        "GetRelaties" => {
            let found: Vec<&Record> = store.relations.iter().filter(|r| relation_matches(&call, r)).collect();
            result(operation, &format!("{}{}", ok_msg(), render_list("Relaties", "cRelatie", &found)))
        }
        "GetGrootboekrekeningen" => {
            let id = call.param("cFilter/ID");
            let code = call.param("cFilter/Code");
            let category = call.param("cFilter/Categorie");
            let found: Vec<&Record> = store
                .ledger_accounts
                .iter()
                .filter(|r| id.is_empty() || id == "0" || field(r, "ID") == id)
                .filter(|r| code.is_empty() || field(r, "Code") == code)
                .filter(|r| category.is_empty() || field(r, "Categorie") == category)
                .collect();
            result(
                operation,
                &format!("{}{}", ok_msg(), render_list("Rekeningen", "cGrootboekrekening", &found)),
            )
        }
        "GetFacturen" => {
            let invoices: Vec<Record> = store
                .mutations
                .iter()
                .filter(|m| field(m, "Soort") == "FactuurVerstuurd")
                .filter(|m| within(field(m, "Datum"), call.param("cFilter/DatumVan"), call.param("cFilter/DatumTm")))
                .filter(|m| matches_if_set(call.param("cFilter/Factuurnummer"), field(m, "Factuurnummer")))
                .filter(|m| matches_if_set(call.param("cFilter/Relatiecode"), field(m, "RelatieCode")))
                .map(|m| {
                    vec![
                        ("Factuurnummer".to_string(), field(m, "Factuurnummer").to_string()),
                        ("Relatiecode".to_string(), field(m, "RelatieCode").to_string()),
                        ("Datum".to_string(), field(m, "Datum").to_string()),
                    ]
                })
                .collect();
            let refs: Vec<&Record> = invoices.iter().collect();
            result(operation, &format!("{}{}", ok_msg(), render_list("Facturen", "cFactuurList", &refs)))
        }
        "GetOpenPosten" => {
            let kind = match call.param("OpSoort") {
                "Debiteuren" => "FactuurVerstuurd",
                "Crediteuren" => "FactuurOntvangen",
                _ => return result(operation, &error_msg("E0006", "Onbekende OpSoort")),
            };
            let items: Vec<Record> = store
                .mutations
                .iter()
                .filter(|m| field(m, "Soort") == kind)
                .map(|m| {
                    vec![
                        ("MutDatum".to_string(), field(m, "Datum").to_string()),
                        ("MutFactuur".to_string(), field(m, "Factuurnummer").to_string()),
                        ("RelCode".to_string(), field(m, "RelatieCode").to_string()),
                    ]
                })
                .collect();
            let refs: Vec<&Record> = items.iter().collect();
            result(operation, &format!("{}{}", ok_msg(), render_list("Opposten", "cOpenPost", &refs)))
        }
        _ => soap_fault("soap:Client", &format!("Unknown operation {operation}")),
    }
}

#[derive(Clone, Copy)]
enum Entity {
    LedgerAccount,
    Relation,
    Mutation,
}

impl Store {
    fn records(&mut self, entity: Entity) -> &mut Vec<Record> {
        match entity {
            Entity::LedgerAccount => &mut self.ledger_accounts,
            Entity::Relation => &mut self.relations,
            Entity::Mutation => &mut self.mutations,
        }
    }

    /// Store `record` under a fresh id written to its `id_field`.
    fn allocate(&mut self, mut record: Record, id_field: &str, entity: Entity) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        set_field(&mut record, id_field, id.to_string());
        self.records(entity).push(record);
        id
    }
}

fn update(store: &mut Store, operation: &str, record: Record, entity: Entity) -> Response {
    let id = field(&record, "ID").to_string();
    match store.records(entity).iter_mut().find(|r| field(r, "ID") == id) {
        Some(existing) => {
            *existing = record;
            result(operation, &ok_msg())
        }
        None => result(operation, &error_msg("E0004", "Record niet gevonden")),
    }
}

fn matches_if_set(filter: &str, value: &str) -> bool {
    filter.is_empty() || filter == value
}

/// ISO dates compare correctly as strings.
fn within(date: &str, from: &str, to: &str) -> bool {
    (from.is_empty() || date >= from) && (to.is_empty() || date <= to)
}

fn mutation_matches(call: &Call, mutation: &Record) -> bool {
    let number: i64 = field(mutation, "MutatieNr").parse().unwrap_or(0);
    let filter_number = call.param("cFilter/MutatieNr");
    if !filter_number.is_empty() && filter_number != "0" && filter_number != number.to_string() {
        return false;
    }
    let from: Option<i64> = call.param("cFilter/MutatieNrVan").parse().ok();
    let to: Option<i64> = call.param("cFilter/MutatieNrTm").parse().ok();
    if from.is_some_and(|from| number < from) || to.is_some_and(|to| number > to) {
        return false;
    }
    matches_if_set(call.param("cFilter/Factuurnummer"), field(mutation, "Factuurnummer"))
        && within(
            field(mutation, "Datum"),
            call.param("cFilter/DatumVan"),
            call.param("cFilter/DatumTm"),
        )
}

fn relation_matches(call: &Call, relation: &Record) -> bool {
    let id = call.param("cFilter/ID");
    let code = call.param("cFilter/Code");
    let search = call.param("cFilter/Trefwoord").to_lowercase();
    (id.is_empty() || id == "0" || field(relation, "ID") == id)
        && matches_if_set(code, field(relation, "Code"))
        && (search.is_empty()
            || ["Code", "Bedrijf", "Contactpersoon", "Plaats"]
                .iter()
                .any(|name| field(relation, name).to_lowercase().contains(&search)))
}

/// Count the stored entities, for tests.
pub async fn counts(db: &Db) -> HashMap<&'static str, usize> {
    let store = db.read().await;
    HashMap::from([
        ("sessions", store.sessions.len()),
        ("ledger_accounts", store.ledger_accounts.len()),
        ("relations", store.relations.len()),
        ("mutations", store.mutations.len()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUEST: &str = r#"<?xml version="1.0" encoding="utf-8"?><soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><GetMutaties xmlns="http://www.e-boekhouden.nl/soap"><SessionID>s</SessionID><SecurityCode2>c</SecurityCode2><cFilter><MutatieNr>0</MutatieNr><MutatieNrVan></MutatieNrVan><Factuurnummer/><DatumVan>2020-01-01</DatumVan></cFilter></GetMutaties></soap:Body></soap:Envelope>"#;

    #[test]
    fn parse_call_reads_operation_and_leaf_paths() {
        let call = parse_call(REQUEST).unwrap();
        assert_eq!(call.operation, "GetMutaties");
        assert_eq!(call.param("SessionID"), "s");
        assert_eq!(call.param("cFilter/MutatieNr"), "0");
        assert_eq!(call.param("cFilter/DatumVan"), "2020-01-01");
        assert_eq!(call.param("cFilter/Missing"), "");
        assert!(call.params.iter().any(|(k, v)| k == "cFilter/MutatieNrVan" && v.is_empty()));
        assert!(call.params.iter().any(|(k, v)| k == "cFilter/Factuurnummer" && v.is_empty()));
    }

    #[test]
    fn leaf_values_are_kept_verbatim() {
        let xml = "<Envelope>\n <Body>\n  <AddRelatie>\n   <oRel><Notitie>  two spaces  </Notitie></oRel>\n  </AddRelatie>\n </Body>\n</Envelope>";
        let call = parse_call(xml).unwrap();
        assert_eq!(call.operation, "AddRelatie");
        assert_eq!(call.params, vec![("oRel/Notitie".to_string(), "  two spaces  ".to_string())]);
    }

    #[test]
    fn group_returns_direct_children_only() {
        let xml = r#"<Envelope><Body><AddMutatie><oMut><Soort>Memoriaal</Soort><MutatieRegels><cMutatieRegel><BTWCode>GEEN</BTWCode></cMutatieRegel></MutatieRegels></oMut></AddMutatie></Body></Envelope>"#;
        let call = parse_call(xml).unwrap();
        assert_eq!(call.group("oMut"), vec![("Soort".to_string(), "Memoriaal".to_string())]);
    }

    #[test]
    fn parse_call_rejects_envelope_without_operation() {
        assert!(parse_call("<Envelope><Body></Body></Envelope>").is_err());
        assert!(parse_call("not xml at all <").is_err());
    }

    #[test]
    fn dates_compare_within_bounds() {
        assert!(within("2020-06-01", "2020-01-01", "2020-12-31"));
        assert!(!within("2021-01-01", "2020-01-01", "2020-12-31"));
        assert!(within("2021-01-01", "", ""));
    }

    #[test]
    fn error_msg_escapes_description() {
        assert_eq!(
            error_msg("E1", "a < b"),
            "<ErrorMsg><LastErrorCode>E1</LastErrorCode><LastErrorDescription>a &lt; b</LastErrorDescription></ErrorMsg>"
        );
    }
}
