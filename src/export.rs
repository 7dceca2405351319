//! Customer-facing bill built from INCOME ledger entries.
//!
//! Entries are grouped by service id and display name: each group becomes a
//! line with the number of entries and their summed amount. EXPENSE entries
//! are ignored. Output is CSV or a plain-text page under the salon
//! letterhead.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::config::SalonInfo;
use crate::error::SalonError;
use crate::model::{LedgerEntry, LedgerKind};
use crate::time::LocalTime;

/// Display name for entries without one
pub const FALLBACK_LINE_NAME: &str = "Income";

const TEXT_WIDTH: usize = 48;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillDocumentLine {
    pub name: String,
    pub quantity: u32,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillDocument {
    pub title: String,
    pub issued_at: DateTime<Utc>,
    /// INCOME entries the bill was built from
    pub item_count: usize,
    /// Sorted by name
    pub lines: Vec<BillDocumentLine>,
    pub total: Decimal,
}

impl BillDocument {
    /// Fails when `entries` holds no INCOME entry
    pub fn from_entries(entries: &[LedgerEntry], issued_at: DateTime<Utc>) -> Result<Self, SalonError> {
        let mut groups: BTreeMap<(String, String), BillDocumentLine> = BTreeMap::new();
        let mut item_count = 0;

        for entry in entries {
            let LedgerKind::Income {
                service_id,
                service_name,
                ..
            } = &entry.kind
            else {
                continue;
            };
            item_count += 1;

            let name = match service_name.trim() {
                "" => FALLBACK_LINE_NAME.to_string(),
                trimmed => trimmed.to_string(),
            };
            groups
                .entry((service_id.clone(), name.clone()))
                .and_modify(|line| {
                    line.quantity += 1;
                    line.amount += entry.amount;
                })
                .or_insert(BillDocumentLine {
                    name,
                    quantity: 1,
                    amount: entry.amount,
                });
        }

        if item_count == 0 {
            return Err(SalonError::validation("No income entries selected."));
        }

        let mut lines: Vec<_> = groups.into_values().collect();
        lines.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        let total = lines.iter().map(|line| line.amount).sum();

        Ok(Self {
            title: "Bill".to_string(),
            issued_at,
            item_count,
            lines,
            total,
        })
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// `bill-2024-03-10`, dated in the salon's local time
    pub fn file_stem(&self, clock: &LocalTime) -> String {
        format!(
            "bill-{}",
            self.issued_at.with_timezone(&clock.offset()).format("%Y-%m-%d")
        )
    }

    /// `service,quantity,amount` rows followed by a total row
    pub fn to_csv(&self) -> Result<String, csv::Error> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["service", "quantity", "amount"])?;
        for line in &self.lines {
            writer.write_record([
                line.name.clone(),
                line.quantity.to_string(),
                line.amount.to_string(),
            ])?;
        }
        writer.write_record([
            "Total".to_string(),
            self.item_count.to_string(),
            self.total.to_string(),
        ])?;

        let bytes = writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))?;
        String::from_utf8(bytes).map_err(|e| {
            csv::Error::from(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })
    }

    /// Plain-text bill; amounts are rounded to whole units
    pub fn render_text(&self, salon: &SalonInfo, clock: &LocalTime) -> String {
        let issued = self
            .issued_at
            .with_timezone(&clock.offset())
            .format("%Y-%m-%d %H:%M")
            .to_string();
        let contact = [&salon.phone, &salon.email, &salon.website]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" | ");
        let rule = "-".repeat(TEXT_WIDTH);

        let mut out = String::new();
        let _ = writeln!(out, "{}", two_columns(&salon.name, &self.title));
        let _ = writeln!(out, "{}", two_columns(&contact, &issued));
        let address = salon.address.as_deref().unwrap_or_default();
        let _ = writeln!(out, "{}", two_columns(address, &format!("Items: {}", self.item_count)));
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "{:<30}{:>6}{:>12}", "Service", "Qty", "Amount");
        for line in &self.lines {
            let _ = writeln!(
                out,
                "{:<30}{:>6}{:>12}",
                line.name,
                line.quantity,
                line.amount.round_dp(0)
            );
        }
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "{:>36}{:>12}", "Total", self.total.round_dp(0));
        out
    }
}

fn two_columns(left: &str, right: &str) -> String {
    let pad = TEXT_WIDTH.saturating_sub(left.chars().count() + right.chars().count()).max(1);
    format!("{left}{}{right}", " ".repeat(pad))
        .trim_end()
        .to_string()
}
