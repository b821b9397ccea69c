//! Payload records for the add and update operations.
//!
//! # Design
//! Callers describe ledger accounts, relations and mutations with plain
//! English-named records (serde-friendly, so they can be loaded from JSON).
//! `to_param` validates the fields that have a `FieldKind` and renders the
//! complete parameter group the service schema expects, in wire order, with
//! every declared element present.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::field::{Field, FieldKind};
use crate::soap::Param;

/// Render integer cents as `units.cc`.
fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

fn field(kind: FieldKind, value: &str) -> Result<Param, ValidationError> {
    Ok(Param::from(&Field::new(kind, value)?))
}

fn id(kind: FieldKind, value: Option<i64>) -> Result<Param, ValidationError> {
    Ok(Param::int(Field::new(kind, value)?.to_int()))
}

/// A general ledger account (`cGrootboekrekening`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAccount {
    #[serde(default)]
    pub id: Option<i64>,
    pub code: String,
    pub description: String,
    pub category: String,
    #[serde(default)]
    pub group: String,
}

impl LedgerAccount {
    pub fn to_param(&self) -> Result<Param, ValidationError> {
        Ok(Param::Group(vec![
            ("ID", id(FieldKind::LedgerAccountId, self.id)?),
            ("Code", field(FieldKind::LedgerAccountCode, &self.code)?),
            ("Omschrijving", Param::text(&self.description)),
            ("Categorie", field(FieldKind::LedgerAccountCategory, &self.category)?),
            ("Groep", Param::text(&self.group)),
        ]))
    }
}

/// Whether a relation is a business or a private person.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    #[default]
    Business,
    Private,
}

impl RelationKind {
    fn wire(self) -> &'static str {
        match self {
            RelationKind::Business => "B",
            RelationKind::Private => "P",
        }
    }
}

/// A customer or supplier (`cRelatie`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Relation {
    pub id: Option<i64>,
    /// Date the relation was added, `YYYY-MM-DD`.
    pub added: String,
    pub code: String,
    pub company: String,
    pub contact: String,
    pub gender: String,
    pub address: String,
    pub postcode: String,
    pub city: String,
    pub country: String,
    pub phone: String,
    pub mobile: String,
    pub email: String,
    pub website: String,
    pub note: String,
    pub kind: RelationKind,
}

impl Relation {
    pub fn to_param(&self) -> Result<Param, ValidationError> {
        Ok(Param::Group(vec![
            ("ID", id(FieldKind::RelationId, self.id)?),
            ("AddDatum", field(FieldKind::Date, &self.added)?),
            ("Code", field(FieldKind::RelationCode, &self.code)?),
            ("Bedrijf", Param::text(&self.company)),
            ("Contactpersoon", Param::text(&self.contact)),
            ("Geslacht", Param::text(&self.gender)),
            ("Adres", Param::text(&self.address)),
            ("Postcode", Param::text(&self.postcode)),
            ("Plaats", Param::text(&self.city)),
            ("Land", Param::text(&self.country)),
            ("Telefoon", Param::text(&self.phone)),
            ("GSM", Param::text(&self.mobile)),
            ("Email", Param::text(&self.email)),
            ("Site", Param::text(&self.website)),
            ("Notitie", Param::text(&self.note)),
            ("BP", Param::text(self.kind.wire())),
        ]))
    }
}

/// The kind of bookkeeping entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    InvoiceReceived,
    InvoiceSent,
    InvoicePaymentReceived,
    InvoicePaymentSent,
    MoneyReceived,
    MoneySpent,
    Memorial,
}

impl MutationKind {
    fn wire(self) -> &'static str {
        match self {
            MutationKind::InvoiceReceived => "FactuurOntvangen",
            MutationKind::InvoiceSent => "FactuurVerstuurd",
            MutationKind::InvoicePaymentReceived => "FactuurbetalingOntvangen",
            MutationKind::InvoicePaymentSent => "FactuurbetalingVerstuurd",
            MutationKind::MoneyReceived => "GeldOntvangen",
            MutationKind::MoneySpent => "GeldUitgegeven",
            MutationKind::Memorial => "Memoriaal",
        }
    }
}

/// Whether line amounts are entered including or excluding VAT.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VatMode {
    Including,
    #[default]
    Excluding,
}

impl VatMode {
    fn wire(self) -> &'static str {
        match self {
            VatMode::Including => "IN",
            VatMode::Excluding => "EX",
        }
    }
}

/// One line of a mutation (`cMutatieRegel`). Amounts are in cents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationLine {
    pub amount: i64,
    pub amount_excl_vat: i64,
    pub vat_amount: i64,
    pub amount_incl_vat: i64,
    pub vat_code: String,
    pub vat_percentage: u32,
    pub counter_account: String,
    pub cost_center_id: i64,
    pub invoice_number: String,
}

impl MutationLine {
    fn to_param(&self) -> Result<Param, ValidationError> {
        Ok(Param::Group(vec![
            ("BedragInvoer", Param::text(format_cents(self.amount))),
            ("BedragExclBTW", Param::text(format_cents(self.amount_excl_vat))),
            ("BedragBTW", Param::text(format_cents(self.vat_amount))),
            ("BedragInclBTW", Param::text(format_cents(self.amount_incl_vat))),
            ("BTWCode", Param::text(&self.vat_code)),
            ("BTWPercentage", Param::int(i64::from(self.vat_percentage))),
            ("TegenrekeningCode", field(FieldKind::LedgerAccountCode, &self.counter_account)?),
            ("KostenplaatsID", Param::int(self.cost_center_id)),
            ("Factuurnummer", field(FieldKind::InvoiceNumber, &self.invoice_number)?),
        ]))
    }
}

/// A bookkeeping entry (`cMutatie`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    #[serde(default)]
    pub number: Option<i64>,
    pub kind: MutationKind,
    /// Booking date, `YYYY-MM-DD`.
    pub date: String,
    /// Ledger account code the mutation is booked on.
    pub account: String,
    #[serde(default)]
    pub relation_code: String,
    #[serde(default)]
    pub invoice_number: String,
    #[serde(default)]
    pub document: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub payment_term: String,
    #[serde(default)]
    pub payment_reference: String,
    #[serde(default)]
    pub vat: VatMode,
    #[serde(default)]
    pub lines: Vec<MutationLine>,
}

impl Mutation {
    pub fn to_param(&self) -> Result<Param, ValidationError> {
        let lines = self
            .lines
            .iter()
            .map(|line| Ok(("cMutatieRegel", line.to_param()?)))
            .collect::<Result<Vec<_>, ValidationError>>()?;

        Ok(Param::Group(vec![
            ("MutatieNr", id(FieldKind::MutationId, self.number)?),
            ("Soort", Param::text(self.kind.wire())),
            ("Datum", field(FieldKind::Date, &self.date)?),
            ("Rekening", field(FieldKind::LedgerAccountCode, &self.account)?),
            ("RelatieCode", field(FieldKind::RelationCode, &self.relation_code)?),
            ("Factuurnummer", field(FieldKind::InvoiceNumber, &self.invoice_number)?),
            ("Boekstuk", Param::text(&self.document)),
            ("Omschrijving", Param::text(&self.description)),
            ("Betalingstermijn", Param::text(&self.payment_term)),
            ("Betalingskenmerk", Param::text(&self.payment_reference)),
            ("InExBTW", Param::text(self.vat.wire())),
            ("MutatieRegels", Param::Group(lines)),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(param: Param) -> Vec<(&'static str, Param)> {
        match param {
            Param::Group(children) => children,
            Param::Text(text) => panic!("expected group, got {text:?}"),
        }
    }

    fn names(children: &[(&'static str, Param)]) -> Vec<&'static str> {
        children.iter().map(|(name, _)| *name).collect()
    }

    #[test]
    fn cents_render_with_two_decimals() {
        assert_eq!(format_cents(0), "0.00");
        assert_eq!(format_cents(1250), "12.50");
        assert_eq!(format_cents(-5), "-0.05");
        assert_eq!(format_cents(-123456), "-1234.56");
    }

    #[test]
    fn ledger_account_renders_every_field() {
        let account = LedgerAccount {
            id: None,
            code: "8000".to_string(),
            description: "Omzet".to_string(),
            category: "VW".to_string(),
            group: String::new(),
        };
        let children = group(account.to_param().unwrap());
        assert_eq!(names(&children), ["ID", "Code", "Omschrijving", "Categorie", "Groep"]);
        assert_eq!(children[0].1, Param::text("0"));
        assert_eq!(children[3].1, Param::text("VW"));
    }

    #[test]
    fn ledger_account_with_unknown_category_is_rejected() {
        let account = LedgerAccount {
            code: "8000".to_string(),
            category: "OMZET".to_string(),
            ..LedgerAccount::default()
        };
        assert_eq!(account.to_param().unwrap_err().code, 109);
    }

    #[test]
    fn relation_renders_business_flag_and_validates_code() {
        let relation = Relation {
            code: "JANSEN".to_string(),
            company: "Jansen BV".to_string(),
            ..Relation::default()
        };
        let children = group(relation.to_param().unwrap());
        assert_eq!(children.len(), 16);
        assert_eq!(children.last().unwrap(), &("BP", Param::text("B")));

        let too_long = Relation {
            code: "R".repeat(16),
            ..Relation::default()
        };
        assert_eq!(too_long.to_param().unwrap_err().code, 105);
    }

    #[test]
    fn mutation_renders_lines_in_order() {
        let mutation = Mutation {
            number: None,
            kind: MutationKind::InvoiceSent,
            date: "2020-03-01".to_string(),
            account: "1300".to_string(),
            relation_code: "JANSEN".to_string(),
            invoice_number: "F2020-001".to_string(),
            document: String::new(),
            description: "Advies".to_string(),
            payment_term: "30".to_string(),
            payment_reference: String::new(),
            vat: VatMode::Excluding,
            lines: vec![
                MutationLine {
                    amount: 10000,
                    vat_code: "HOOG_VERK_21".to_string(),
                    vat_percentage: 21,
                    counter_account: "8000".to_string(),
                    ..MutationLine::default()
                },
                MutationLine {
                    amount: 2500,
                    counter_account: "8010".to_string(),
                    ..MutationLine::default()
                },
            ],
        };
        let children = group(mutation.to_param().unwrap());
        assert_eq!(children[1].1, Param::text("FactuurVerstuurd"));
        assert_eq!(children[10].1, Param::text("EX"));

        let lines = match &children[11] {
            ("MutatieRegels", Param::Group(lines)) => lines,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(names(lines), ["cMutatieRegel", "cMutatieRegel"]);
        let first = group(lines[0].1.clone());
        assert_eq!(first[0].1, Param::text("100.00"));
        assert_eq!(first[5].1, Param::text("21"));
    }

    #[test]
    fn mutation_with_bad_date_is_rejected() {
        let mutation: Mutation = serde_json::from_value(serde_json::json!({
            "kind": "memorial",
            "date": "01-03-2020",
            "account": "1000"
        }))
        .unwrap();
        assert_eq!(mutation.to_param().unwrap_err().code, 101);
    }
}
