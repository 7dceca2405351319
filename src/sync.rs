//! Appointment index effects of a ticket's service items.
//!
//! An appointment document exists for `(ticket, service)` exactly while that
//! service item has an appointment time. Given the desired items, this module
//! plans the upserts and deletes that make the index agree and folds them
//! into a write batch. Nothing here reads the store: both effects are
//! idempotent, so replaying them is always safe.

use crate::model::{Appointment, NextAppointment, TicketServiceItem};
use crate::store::{paths, to_document, DocPath, StoreError, WriteBatch};

/// Field stamped with the commit time on every index upsert
pub const UPDATED_AT: &str = "updatedAt";

#[derive(Debug, Clone, PartialEq)]
pub enum IndexEffect {
    /// Write the full mirrored field set
    Upsert(Appointment),
    /// Remove the record; a no-op when it does not exist
    Remove { ticket_id: String, service_id: String },
}

impl IndexEffect {
    pub fn path(&self) -> DocPath {
        match self {
            IndexEffect::Upsert(appointment) => {
                paths::appointment(&appointment.ticket_id, &appointment.service_id)
            }
            IndexEffect::Remove {
                ticket_id,
                service_id,
            } => paths::appointment(ticket_id, service_id),
        }
    }
}

/// How many index writes of each kind went into a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexCounts {
    pub upserted: usize,
    pub deleted: usize,
}

impl IndexCounts {
    pub fn total(&self) -> usize {
        self.upserted + self.deleted
    }
}

impl std::ops::AddAssign for IndexCounts {
    fn add_assign(&mut self, other: Self) {
        self.upserted += other.upserted;
        self.deleted += other.deleted;
    }
}

/// One effect per item, in input order
pub fn plan_index_effects(items: &[TicketServiceItem]) -> Vec<IndexEffect> {
    items.iter().map(plan_one).collect()
}

pub fn plan_one(item: &TicketServiceItem) -> IndexEffect {
    match Appointment::mirror(item) {
        Some(appointment) => IndexEffect::Upsert(appointment),
        None => IndexEffect::Remove {
            ticket_id: item.ticket_id.clone(),
            service_id: item.service_id.clone(),
        },
    }
}

/// Append `effects` to `batch`
pub fn apply_effects(
    batch: &mut WriteBatch,
    effects: impl IntoIterator<Item = IndexEffect>,
) -> Result<IndexCounts, StoreError> {
    let mut counts = IndexCounts::default();
    for effect in effects {
        let path = effect.path();
        match effect {
            IndexEffect::Upsert(appointment) => {
                batch
                    .merge(path, to_document(&appointment)?)
                    .stamp(&[UPDATED_AT]);
                counts.upserted += 1;
            }
            IndexEffect::Remove { .. } => {
                batch.delete(path);
                counts.deleted += 1;
            }
        }
    }
    Ok(counts)
}

/// Earliest scheduled item; ties go to the first in input order
pub fn next_appointment(items: &[TicketServiceItem]) -> Option<NextAppointment> {
    let mut best: Option<&TicketServiceItem> = None;
    for item in items {
        let Some(at) = item.appointment_date_time else {
            continue;
        };
        match best.and_then(|b| b.appointment_date_time) {
            Some(current) if current <= at => {}
            _ => best = Some(item),
        }
    }
    best.and_then(|item| {
        Some(NextAppointment {
            date_time: item.appointment_date_time?,
            service_name: item.service_name.clone(),
            confirmation_level: item.confirmation_level,
        })
    })
}
