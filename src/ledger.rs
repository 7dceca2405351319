//! Service completion, bills and the income/expense ledger.
//!
//! Ledger entries are facts: creation is never deduplicated, so calling a
//! creating operation twice records the money twice.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::error::SalonError;
use crate::ids::new_doc_id;
use crate::model::{Bill, LedgerEntry, LedgerKind};
use crate::store::{commit_batch, paths, to_document, DocumentStore, WriteBatch};

const CREATED_AT: &str = "createdAt";
const UPDATED_AT: &str = "updatedAt";
const COMPLETED_AT: &str = "completedAt";

/// Largest number of units one bill line may carry
pub const MAX_LINE_QUANTITY: u32 = 99;

/// Parse a form amount such as `"3500"` or `" 120.50 "`
pub fn parse_amount(text: &str) -> Result<Decimal, SalonError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(SalonError::validation("Amount is required."));
    }
    Decimal::from_str(trimmed)
        .map_err(|_| SalonError::validation(format!("Amount must be a number, got \"{trimmed}\".")))
}

/// Marks one service item of a ticket as done and records its income
#[derive(Debug, Clone, PartialEq)]
pub struct CompleteService {
    pub ticket_id: String,
    pub service_id: String,
    pub service_name: String,
    pub amount: Decimal,
    /// Ledger date; now when absent
    pub date: Option<DateTime<Utc>>,
}

/// One line of a bill: `quantity` units of a service at `unit_amount` each
#[derive(Debug, Clone, PartialEq)]
pub struct BillLine {
    pub service_id: String,
    pub service_name: String,
    pub unit_amount: Decimal,
    pub quantity: f64,
}

impl BillLine {
    pub fn new(
        service_id: impl Into<String>,
        service_name: impl Into<String>,
        unit_amount: Decimal,
        quantity: f64,
    ) -> Self {
        Self {
            service_id: service_id.into(),
            service_name: service_name.into(),
            unit_amount,
            quantity,
        }
    }

    /// Whole units to bill, or `None` when the line must be dropped
    fn units(&self) -> Option<u32> {
        if self.service_id.trim().is_empty() || self.service_name.trim().is_empty() {
            return None;
        }
        if self.unit_amount <= Decimal::ZERO {
            return None;
        }
        if !self.quantity.is_finite() || self.quantity <= 0.0 {
            return None;
        }
        let floored = self.quantity.floor().min(f64::from(MAX_LINE_QUANTITY));
        Some((floored as u32).clamp(1, MAX_LINE_QUANTITY))
    }
}

/// A bill header plus the income entries written with it
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedBill {
    pub bill: Bill,
    pub entries: Vec<LedgerEntry>,
}

impl CreatedBill {
    pub fn bill_id(&self) -> &str {
        &self.bill.id
    }
}

/// Replacement content for an existing ledger entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryEdit {
    /// Provenance (`ticketId`, `billId`) of an income entry is kept as stored
    Income {
        service_id: String,
        service_name: String,
    },
    Expense {
        reason: String,
    },
}

pub struct LedgerWriter<'a> {
    store: &'a dyn DocumentStore,
}

impl<'a> LedgerWriter<'a> {
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store }
    }

    /// Complete a service item and record its income in one batch
    ///
    /// The appointment record is marked completed only when it exists. The
    /// service item and the ticket must exist; otherwise nothing is written.
    ///
    /// The appointment check is a read taken before the batch. If the record
    /// is deleted before the commit, the whole call fails with
    /// [`SalonError::NotFound`] and nothing is written; calling again succeeds.
    pub fn complete_service(&self, input: &CompleteService) -> Result<LedgerEntry, SalonError> {
        if input.amount < Decimal::ZERO {
            return Err(SalonError::validation("Amount must be a number (0 or more)."));
        }
        let ticket_id = input.ticket_id.trim();
        let service_id = input.service_id.trim();
        if ticket_id.is_empty() || service_id.is_empty() {
            return Err(SalonError::validation("Ticket and service are required."));
        }

        let mut batch = WriteBatch::new();
        batch
            .update(
                paths::service_item(ticket_id, service_id),
                fields([("isCompleted", Value::Bool(true))]),
            )
            .stamp(&[COMPLETED_AT, UPDATED_AT]);

        let appointment = paths::appointment(ticket_id, service_id);
        if self.store.get(&appointment)?.is_some() {
            batch
                .update(appointment, fields([("isCompleted", Value::Bool(true))]))
                .stamp(&[UPDATED_AT]);
        }

        batch
            .update(paths::ticket(ticket_id), Map::new())
            .stamp(&[UPDATED_AT]);

        let entry = LedgerEntry {
            id: new_doc_id(),
            kind: LedgerKind::Income {
                service_id: service_id.to_string(),
                service_name: input.service_name.trim().to_string(),
                ticket_id: Some(ticket_id.to_string()),
                bill_id: None,
            },
            date: input.date.unwrap_or_else(Utc::now),
            amount: input.amount,
            created_at: None,
        };
        batch
            .set(paths::ledger_entry(&entry.id), to_document(&entry)?)
            .stamp(&[CREATED_AT]);

        commit_batch(self.store, batch, "ledger.complete_service")?;
        log::debug!(
            "completed {service_id} on ticket {ticket_id}, income {} recorded as {}",
            entry.amount,
            entry.id
        );
        Ok(entry)
    }

    /// One bill header and one income entry per billed unit, in one batch
    pub fn create_bill_and_income_entries(
        &self,
        date: DateTime<Utc>,
        lines: &[BillLine],
    ) -> Result<CreatedBill, SalonError> {
        let accepted: Vec<(&BillLine, u32)> = lines
            .iter()
            .filter_map(|line| line.units().map(|units| (line, units)))
            .collect();
        if accepted.is_empty() {
            return Err(SalonError::validation(
                "Add at least 1 service with a valid quantity and amount.",
            ));
        }
        if accepted.len() < lines.len() {
            log::warn!("bill: dropped {} invalid line(s)", lines.len() - accepted.len());
        }

        let item_count: u32 = accepted.iter().map(|(_, units)| units).sum();
        let total_amount = accepted
            .iter()
            .try_fold(Decimal::ZERO, |total, (line, units)| {
                line.unit_amount
                    .checked_mul(Decimal::from(*units))
                    .and_then(|subtotal| total.checked_add(subtotal))
            })
            .ok_or_else(|| SalonError::validation("Bill total is too large."))?;

        let max = self.store.max_batch_ops();
        let writes = item_count as usize + 1;
        if writes > max {
            return Err(SalonError::validation(format!(
                "Bill has {item_count} items; at most {} fit in one bill.",
                max.saturating_sub(1)
            )));
        }

        let bill = Bill {
            id: new_doc_id(),
            date,
            total_amount,
            item_count,
            created_at: None,
            updated_at: None,
        };
        let mut batch = WriteBatch::new();
        batch
            .set(paths::bill(&bill.id), to_document(&bill)?)
            .stamp(&[CREATED_AT, UPDATED_AT]);

        let mut entries = Vec::with_capacity(item_count as usize);
        for (line, units) in accepted {
            for _ in 0..units {
                let entry = LedgerEntry {
                    id: new_doc_id(),
                    kind: LedgerKind::Income {
                        service_id: line.service_id.trim().to_string(),
                        service_name: line.service_name.trim().to_string(),
                        ticket_id: None,
                        bill_id: Some(bill.id.clone()),
                    },
                    date,
                    amount: line.unit_amount,
                    created_at: None,
                };
                batch
                    .set(paths::ledger_entry(&entry.id), to_document(&entry)?)
                    .stamp(&[CREATED_AT]);
                entries.push(entry);
            }
        }

        commit_batch(self.store, batch, "ledger.create_bill")?;
        log::debug!("bill {} recorded: {item_count} item(s), total {total_amount}", bill.id);
        Ok(CreatedBill { bill, entries })
    }

    /// Income not tied to a ticket or bill
    pub fn add_manual_income(
        &self,
        service_id: &str,
        service_name: &str,
        date: DateTime<Utc>,
        amount: Decimal,
    ) -> Result<LedgerEntry, SalonError> {
        let (service_id, service_name) = (service_id.trim(), service_name.trim());
        if service_id.is_empty() || service_name.is_empty() {
            return Err(SalonError::validation("Service is required for income."));
        }
        require_positive(amount)?;
        self.append(
            LedgerKind::Income {
                service_id: service_id.to_string(),
                service_name: service_name.to_string(),
                ticket_id: None,
                bill_id: None,
            },
            date,
            amount,
            "ledger.add_income",
        )
    }

    pub fn add_expense(
        &self,
        reason: &str,
        date: DateTime<Utc>,
        amount: Decimal,
    ) -> Result<LedgerEntry, SalonError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(SalonError::validation("Reason is required."));
        }
        require_positive(amount)?;
        self.append(
            LedgerKind::Expense {
                reason: reason.to_string(),
            },
            date,
            amount,
            "ledger.add_expense",
        )
    }

    fn append(
        &self,
        kind: LedgerKind,
        date: DateTime<Utc>,
        amount: Decimal,
        label: &str,
    ) -> Result<LedgerEntry, SalonError> {
        let entry = LedgerEntry {
            id: new_doc_id(),
            kind,
            date,
            amount,
            created_at: None,
        };
        let mut batch = WriteBatch::new();
        batch
            .set(paths::ledger_entry(&entry.id), to_document(&entry)?)
            .stamp(&[CREATED_AT]);
        commit_batch(self.store, batch, label)?;
        Ok(entry)
    }

    /// Overwrite an entry's type, date, amount and type-specific fields
    ///
    /// The field group of the other type is nulled. Fails with
    /// [`SalonError::NotFound`] when the entry does not exist.
    pub fn update_ledger_entry(
        &self,
        entry_id: &str,
        edit: &EntryEdit,
        date: DateTime<Utc>,
        amount: Decimal,
    ) -> Result<(), SalonError> {
        if amount < Decimal::ZERO {
            return Err(SalonError::validation("Amount must be a number (0 or more)."));
        }

        let mut patch = fields([
            ("amount", Value::String(amount.to_string())),
            ("date", Value::from(date.timestamp_millis())),
        ]);
        match edit {
            EntryEdit::Income {
                service_id,
                service_name,
            } => {
                let (service_id, service_name) = (service_id.trim(), service_name.trim());
                if service_id.is_empty() || service_name.is_empty() {
                    return Err(SalonError::validation("Service is required for income."));
                }
                patch.extend(fields([
                    ("type", Value::from("INCOME")),
                    ("serviceId", Value::from(service_id)),
                    ("serviceName", Value::from(service_name)),
                    ("reason", Value::Null),
                ]));
            }
            EntryEdit::Expense { reason } => {
                let reason = reason.trim();
                if reason.is_empty() {
                    return Err(SalonError::validation("Reason is required for expense."));
                }
                patch.extend(fields([
                    ("type", Value::from("EXPENSE")),
                    ("reason", Value::from(reason)),
                    ("serviceId", Value::Null),
                    ("serviceName", Value::Null),
                    ("ticketId", Value::Null),
                    ("billId", Value::Null),
                ]));
            }
        }

        let mut batch = WriteBatch::new();
        batch.update(paths::ledger_entry(entry_id), patch);
        commit_batch(self.store, batch, "ledger.update_entry")?;
        Ok(())
    }

    /// Hard delete; deleting a missing entry is a no-op
    pub fn delete_ledger_entry(&self, entry_id: &str) -> Result<(), SalonError> {
        let mut batch = WriteBatch::new();
        batch.delete(paths::ledger_entry(entry_id));
        commit_batch(self.store, batch, "ledger.delete_entry")?;
        Ok(())
    }
}

fn require_positive(amount: Decimal) -> Result<(), SalonError> {
    if amount <= Decimal::ZERO {
        return Err(SalonError::validation("Amount must be a positive number."));
    }
    Ok(())
}

fn fields<const N: usize>(pairs: [(&str, Value); N]) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}
