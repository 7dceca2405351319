//! Financial facts: ledger entries and bill headers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::store::Keyed;

/// What a ledger entry records; the type decides which fields exist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerKind {
    /// Money in for a service, optionally traced to a ticket or a bill
    #[serde(rename_all = "camelCase")]
    Income {
        service_id: String,
        service_name: String,
        #[serde(default)]
        ticket_id: Option<String>,
        #[serde(default)]
        bill_id: Option<String>,
    },
    /// Money out, with the reason it was spent
    Expense { reason: String },
}

impl LedgerKind {
    pub fn is_income(&self) -> bool {
        matches!(self, LedgerKind::Income { .. })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            LedgerKind::Income { .. } => "INCOME",
            LedgerKind::Expense { .. } => "EXPENSE",
        }
    }
}

/// `ledger/{id}`: one immutable financial fact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    #[serde(skip)]
    pub id: String,
    #[serde(flatten)]
    pub kind: LedgerKind,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub date: DateTime<Utc>,
    pub amount: Decimal,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

impl LedgerEntry {
    pub fn service_name(&self) -> Option<&str> {
        match &self.kind {
            LedgerKind::Income { service_name, .. } => Some(service_name),
            LedgerKind::Expense { .. } => None,
        }
    }

    pub fn bill_id(&self) -> Option<&str> {
        match &self.kind {
            LedgerKind::Income { bill_id, .. } => bill_id.as_deref(),
            LedgerKind::Expense { .. } => None,
        }
    }
}

impl Keyed for LedgerEntry {
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

/// `bills/{id}`: header over the INCOME entries created together
///
/// `total_amount` and `item_count` are a snapshot taken at creation and are
/// never recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    #[serde(skip)]
    pub id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub date: DateTime<Utc>,
    pub total_amount: Decimal,
    pub item_count: u32,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Keyed for Bill {
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}
