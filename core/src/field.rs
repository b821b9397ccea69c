//! Validated request fields.
//!
//! # Design
//! Every filter or payload value sent to the service passes through a
//! `Field`. A `FieldKind` names the semantic field and selects its `Rule`
//! from a fixed table, so adding a field means adding a table row rather
//! than a new type. Absent and empty input is valid for every kind and
//! renders as the empty string; only non-empty input is checked.

use std::borrow::Cow;
use std::fmt;

use chrono::NaiveDate;

use crate::error::{ValidationError, Violation};

/// Date format used by every date field on the wire.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Ledger categories accepted by `FieldKind::LedgerAccountCategory`.
pub const LEDGER_CATEGORIES: &[&str] = &[
    "BAL", "VW", "AF", "AF6", "AF19", "AFOVERIG", "BTWRC", "VOOR", "DEB", "CRED", "FIN",
];

/// An untyped caller input: nothing, some text, or an integer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input<'a> {
    Absent,
    Text(Cow<'a, str>),
    Int(i64),
}

impl<'a> From<&'a str> for Input<'a> {
    fn from(value: &'a str) -> Self {
        Input::Text(Cow::Borrowed(value))
    }
}

impl<'a> From<&'a String> for Input<'a> {
    fn from(value: &'a String) -> Self {
        Input::Text(Cow::Borrowed(value.as_str()))
    }
}

impl From<String> for Input<'_> {
    fn from(value: String) -> Self {
        Input::Text(Cow::Owned(value))
    }
}

impl From<i64> for Input<'_> {
    fn from(value: i64) -> Self {
        Input::Int(value)
    }
}

impl From<i32> for Input<'_> {
    fn from(value: i32) -> Self {
        Input::Int(i64::from(value))
    }
}

impl From<u32> for Input<'_> {
    fn from(value: u32) -> Self {
        Input::Int(i64::from(value))
    }
}

impl From<NaiveDate> for Input<'_> {
    fn from(value: NaiveDate) -> Self {
        Input::Text(Cow::Owned(value.format(DATE_FORMAT).to_string()))
    }
}

impl<'a, T: Into<Input<'a>>> From<Option<T>> for Input<'a> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Input::Absent, Into::into)
    }
}

/// The validation applied to a non-empty field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// At most `n` characters.
    MaxLength(usize),
    /// An integer within the inclusive range.
    Integer { min: i64, max: i64 },
    /// A calendar date in `DATE_FORMAT`.
    Date,
    /// One of a fixed set of values.
    OneOf(&'static [&'static str]),
    /// Passed through unchanged.
    FreeText,
}

/// The semantic fields sent to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Date,
    MutationId,
    RelationId,
    InvoiceNumber,
    RelationCode,
    RelationSearch,
    LedgerAccountId,
    LedgerAccountCode,
    LedgerAccountCategory,
}

const ID_RANGE: Rule = Rule::Integer { min: 0, max: i64::MAX };

impl FieldKind {
    pub fn name(self) -> &'static str {
        match self {
            FieldKind::Date => "Date",
            FieldKind::MutationId => "MutationId",
            FieldKind::RelationId => "RelationId",
            FieldKind::InvoiceNumber => "InvoiceNumber",
            FieldKind::RelationCode => "RelationCode",
            FieldKind::RelationSearch => "RelationSearch",
            FieldKind::LedgerAccountId => "LedgerAccountId",
            FieldKind::LedgerAccountCode => "LedgerAccountCode",
            FieldKind::LedgerAccountCategory => "LedgerAccountCategory",
        }
    }

    pub fn rule(self) -> Rule {
        match self {
            FieldKind::Date => Rule::Date,
            FieldKind::MutationId | FieldKind::RelationId | FieldKind::LedgerAccountId => ID_RANGE,
            FieldKind::InvoiceNumber => Rule::MaxLength(50),
            FieldKind::RelationCode => Rule::MaxLength(15),
            FieldKind::RelationSearch => Rule::FreeText,
            FieldKind::LedgerAccountCode => Rule::MaxLength(10),
            FieldKind::LedgerAccountCategory => Rule::OneOf(LEDGER_CATEGORIES),
        }
    }

    /// Stable error code reported when this field fails validation.
    pub fn code(self) -> u16 {
        match self {
            FieldKind::Date => 101,
            FieldKind::MutationId => 102,
            FieldKind::RelationId => 103,
            FieldKind::InvoiceNumber => 104,
            FieldKind::RelationCode => 105,
            FieldKind::RelationSearch => 106,
            FieldKind::LedgerAccountId => 107,
            FieldKind::LedgerAccountCode => 108,
            FieldKind::LedgerAccountCategory => 109,
        }
    }
}

/// An immutable, already-validated field value.
///
/// `as_str` yields the canonical text sent on the wire; empty fields yield
/// `""`. Numeric fields also expose `to_int`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    kind: FieldKind,
    rule: Rule,
    text: String,
    int: Option<i64>,
}

impl Field {
    pub fn new<'a>(kind: FieldKind, input: impl Into<Input<'a>>) -> Result<Self, ValidationError> {
        Self::with_rule(kind, kind.rule(), input)
    }

    /// Validate `input` against `rule` instead of the kind's default rule.
    pub fn with_rule<'a>(
        kind: FieldKind,
        rule: Rule,
        input: impl Into<Input<'a>>,
    ) -> Result<Self, ValidationError> {
        let reject = |violation| ValidationError {
            field: kind.name(),
            violation,
            code: kind.code(),
        };

        let raw: Cow<'_, str> = match input.into() {
            Input::Absent => Cow::Borrowed(""),
            Input::Text(text) => text,
            Input::Int(value) => Cow::Owned(value.to_string()),
        };

        if raw.is_empty() {
            return Ok(Self {
                kind,
                rule,
                text: String::new(),
                int: None,
            });
        }

        let mut int = None;
        let text = match rule {
            Rule::MaxLength(max) => {
                let actual = raw.chars().count();
                if actual > max {
                    return Err(reject(Violation::TooLong { max, actual }));
                }
                raw.into_owned()
            }
            Rule::Integer { min, max } => {
                let trimmed = raw.trim();
                let value: i64 = trimmed
                    .parse()
                    .map_err(|_| reject(Violation::NotAnInteger(trimmed.to_string())))?;
                if value < min || value > max {
                    return Err(reject(Violation::OutOfRange { min, max, value }));
                }
                int = Some(value);
                value.to_string()
            }
            Rule::Date => {
                let date = NaiveDate::parse_from_str(&raw, DATE_FORMAT)
                    .map_err(|_| reject(Violation::InvalidDate(raw.to_string())))?;
                date.format(DATE_FORMAT).to_string()
            }
            Rule::OneOf(allowed) => {
                if !allowed.iter().any(|candidate| *candidate == raw.as_ref()) {
                    return Err(reject(Violation::NotAllowed(raw.to_string())));
                }
                raw.into_owned()
            }
            Rule::FreeText => raw.into_owned(),
        };

        Ok(Self {
            kind,
            rule,
            text,
            int,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The integer form of a numeric field; `0` when the field is empty.
    ///
    /// # Panics
    /// Panics when the field was not validated with an integer rule.
    pub fn to_int(&self) -> i64 {
        match self.rule {
            Rule::Integer { .. } => self.int.unwrap_or(0),
            _ => panic!("{} is not a numeric field", self.kind.name()),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
