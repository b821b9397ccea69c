use axum::http::{self, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use mock_server::{counts, router, store, Credentials, Db};
use tower::ServiceExt;

fn envelope(operation: &str, inner: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?><soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><{operation} xmlns="http://www.e-boekhouden.nl/soap">{inner}</{operation}></soap:Body></soap:Envelope>"#
    )
}

fn soap_request(body: String) -> Request<String> {
    Request::builder()
        .method("POST")
        .uri("/soap.asmx")
        .header(http::header::CONTENT_TYPE, "text/xml; charset=utf-8")
        .body(body)
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes: bytes::Bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn send(app: &Router, operation: &str, inner: &str) -> (StatusCode, String) {
    let resp = app
        .clone()
        .oneshot(soap_request(envelope(operation, inner)))
        .await
        .unwrap();
    let status = resp.status();
    (status, body_text(resp).await)
}

/// Text of the first `<tag>` element in `xml`.
fn element<'x>(xml: &'x str, tag: &str) -> &'x str {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open).map(|i| i + open.len()).unwrap_or_else(|| panic!("no <{tag}> in {xml}"));
    let end = xml[start..].find(&close).unwrap() + start;
    &xml[start..end]
}

fn setup() -> (Db, Router) {
    let db = store(Credentials::default());
    let app = router(db.clone());
    (db, app)
}

async fn open(app: &Router) -> String {
    let (status, body) = send(
        app,
        "OpenSession",
        "<Username>demo</Username><SecurityCode1>code-1</SecurityCode1><SecurityCode2>code-2</SecurityCode2>",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    element(&body, "SessionID").to_string()
}

fn auth(session_id: &str) -> String {
    format!("<SessionID>{session_id}</SessionID><SecurityCode2>code-2</SecurityCode2>")
}

// --- sessions ---

#[tokio::test]
async fn open_session_returns_session_id() {
    let (db, app) = setup();
    let session_id = open(&app).await;
    assert!(!session_id.is_empty());
    assert_eq!(counts(&db).await["sessions"], 1);
}

#[tokio::test]
async fn open_session_with_bad_credentials_reports_error() {
    let (_, app) = setup();
    let (status, body) = send(
        &app,
        "OpenSession",
        "<Username>demo</Username><SecurityCode1>wrong</SecurityCode1><SecurityCode2>code-2</SecurityCode2>",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(element(&body, "LastErrorCode"), "E0001");
    assert!(!body.contains("<SessionID>"));
}

#[tokio::test]
async fn call_with_unknown_session_reports_error() {
    let (_, app) = setup();
    let (_, body) = send(&app, "GetRelaties", &auth("nope")).await;
    assert!(body.contains("<GetRelatiesResult>"));
    assert_eq!(element(&body, "LastErrorCode"), "E0002");
}

#[tokio::test]
async fn close_session_forgets_the_session() {
    let (db, app) = setup();
    let session_id = open(&app).await;
    let (status, body) = send(&app, "CloseSession", &format!("<SessionID>{session_id}</SessionID>")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("CloseSessionResponse"));
    assert_eq!(counts(&db).await["sessions"], 0);

    let (_, body) = send(&app, "GetRelaties", &auth(&session_id)).await;
    assert_eq!(element(&body, "LastErrorCode"), "E0002");
}

// --- faults ---

#[tokio::test]
async fn unreadable_envelope_returns_soap_fault() {
    let (_, app) = setup();
    let resp = app.oneshot(soap_request("<broken".to_string())).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_text(resp).await;
    assert_eq!(element(&body, "faultcode"), "soap:Client");
}

#[tokio::test]
async fn unknown_operation_returns_soap_fault() {
    let (_, app) = setup();
    let session_id = open(&app).await;
    let (status, body) = send(&app, "DeleteEverything", &auth(&session_id)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains("Unknown operation DeleteEverything"));
}

// --- relations ---

#[tokio::test]
async fn add_relation_then_find_by_code_and_search() {
    let (db, app) = setup();
    let session_id = open(&app).await;

    let relation = "<oRel><ID>0</ID><Code>JANSEN</Code><Bedrijf>Jansen BV</Bedrijf><Plaats>Utrecht</Plaats><BP>B</BP></oRel>";
    let (_, body) = send(&app, "AddRelatie", &format!("{}{relation}", auth(&session_id))).await;
    assert_eq!(element(&body, "LastErrorCode"), "");
    assert_eq!(element(&body, "Rel_ID"), "1");
    assert_eq!(counts(&db).await["relations"], 1);

    let filter = "<cFilter><Trefwoord></Trefwoord><Code>JANSEN</Code><ID></ID></cFilter>";
    let (_, body) = send(&app, "GetRelaties", &format!("{}{filter}", auth(&session_id))).await;
    assert_eq!(element(&body, "Bedrijf"), "Jansen BV");

    let filter = "<cFilter><Trefwoord>utrecht</Trefwoord><Code></Code><ID></ID></cFilter>";
    let (_, body) = send(&app, "GetRelaties", &format!("{}{filter}", auth(&session_id))).await;
    assert_eq!(element(&body, "ID"), "1");

    let filter = "<cFilter><Trefwoord></Trefwoord><Code>OTHER</Code><ID></ID></cFilter>";
    let (_, body) = send(&app, "GetRelaties", &format!("{}{filter}", auth(&session_id))).await;
    assert!(!body.contains("<cRelatie>"));
}

#[tokio::test]
async fn duplicate_relation_code_is_rejected() {
    let (_, app) = setup();
    let session_id = open(&app).await;
    let relation = format!("{}<oRel><ID>0</ID><Code>JANSEN</Code></oRel>", auth(&session_id));

    send(&app, "AddRelatie", &relation).await;
    let (_, body) = send(&app, "AddRelatie", &relation).await;
    assert_eq!(element(&body, "LastErrorCode"), "E0005");
}

#[tokio::test]
async fn update_of_unknown_relation_is_rejected() {
    let (_, app) = setup();
    let session_id = open(&app).await;
    let relation = format!("{}<oRel><ID>99</ID><Code>X</Code></oRel>", auth(&session_id));
    let (_, body) = send(&app, "UpdateRelatie", &relation).await;
    assert_eq!(element(&body, "LastErrorCode"), "E0004");
}

// --- mutations ---

#[tokio::test]
async fn mutations_filter_by_number_and_date() {
    let (_, app) = setup();
    let session_id = open(&app).await;

    for (date, invoice) in [("2020-02-01", "F1"), ("2021-02-01", "F2")] {
        let mutation = format!(
            "{}<oMut><MutatieNr>0</MutatieNr><Soort>FactuurVerstuurd</Soort><Datum>{date}</Datum>\
             <RelatieCode>JANSEN</RelatieCode><Factuurnummer>{invoice}</Factuurnummer></oMut>",
            auth(&session_id)
        );
        let (_, body) = send(&app, "AddMutatie", &mutation).await;
        assert_eq!(element(&body, "LastErrorCode"), "");
    }

    let by_period = format!(
        "{}<cFilter><MutatieNr>0</MutatieNr><MutatieNrVan></MutatieNrVan><MutatieNrTm></MutatieNrTm>\
         <Factuurnummer></Factuurnummer><DatumVan>2020-01-01</DatumVan><DatumTm>2020-12-31</DatumTm></cFilter>",
        auth(&session_id)
    );
    let (_, body) = send(&app, "GetMutaties", &by_period).await;
    assert_eq!(body.matches("<cMutatie>").count(), 1);
    assert_eq!(element(&body, "Factuurnummer"), "F1");

    let by_number = format!(
        "{}<cFilter><MutatieNr>2</MutatieNr><MutatieNrVan></MutatieNrVan><MutatieNrTm></MutatieNrTm>\
         <Factuurnummer></Factuurnummer><DatumVan>1980-01-01</DatumVan><DatumTm>2049-12-31</DatumTm></cFilter>",
        auth(&session_id)
    );
    let (_, body) = send(&app, "GetMutaties", &by_number).await;
    assert_eq!(element(&body, "Factuurnummer"), "F2");

    let (_, body) = send(&app, "GetOpenPosten", &format!("{}<OpSoort>Debiteuren</OpSoort>", auth(&session_id))).await;
    assert_eq!(body.matches("<cOpenPost>").count(), 2);

    let (_, body) = send(&app, "GetOpenPosten", &format!("{}<OpSoort>Crediteuren</OpSoort>", auth(&session_id))).await;
    assert!(!body.contains("<cOpenPost>"));
}

// --- ledger accounts ---

#[tokio::test]
async fn ledger_accounts_filter_by_category() {
    let (_, app) = setup();
    let session_id = open(&app).await;

    for (code, category) in [("1000", "BAL"), ("8000", "VW")] {
        let account = format!(
            "{}<oGb><ID>0</ID><Code>{code}</Code><Omschrijving>x</Omschrijving><Categorie>{category}</Categorie><Groep></Groep></oGb>",
            auth(&session_id)
        );
        let (_, body) = send(&app, "AddGrootboekrekening", &account).await;
        assert_eq!(element(&body, "LastErrorCode"), "");
    }

    let filter = format!("{}<cFilter><ID>0</ID><Code></Code><Categorie>VW</Categorie></cFilter>", auth(&session_id));
    let (_, body) = send(&app, "GetGrootboekrekeningen", &filter).await;
    assert_eq!(body.matches("<cGrootboekrekening>").count(), 1);
    assert_eq!(element(&body, "Code"), "8000");
}
