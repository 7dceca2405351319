//! Read side: the point reads and range scans the views run.
//!
//! Reads are plain snapshots; nothing here subscribes to changes.

use chrono::{DateTime, Utc};

use crate::error::SalonError;
use crate::model::{Appointment, LedgerEntry, Ticket, TicketAction, TicketServiceItem};
use crate::store::{paths, Direction, DocumentStore, FilterOp, Query};

pub const DEFAULT_TICKET_LIMIT: usize = 200;
pub const DEFAULT_LEDGER_LIMIT: usize = 500;

/// A ticket with its children, as an editor loads it
#[derive(Debug, Clone, PartialEq)]
pub struct TicketAggregate {
    pub ticket: Ticket,
    /// Ordered by service name
    pub service_items: Vec<TicketServiceItem>,
    /// Ordered by due time
    pub actions: Vec<TicketAction>,
}

/// Most recently updated tickets first
pub fn list_tickets(store: &dyn DocumentStore, limit: Option<usize>) -> Result<Vec<Ticket>, SalonError> {
    let query = Query::collection(paths::TICKETS)
        .order_by("updatedAt", Direction::Desc)
        .limit(limit.unwrap_or(DEFAULT_TICKET_LIMIT));
    store
        .query(&query)?
        .iter()
        .map(|snap| snap.decode_keyed().map_err(SalonError::from))
        .collect()
}

/// Header, service items and actions of one ticket; `None` when it does not exist
pub fn load_ticket(store: &dyn DocumentStore, ticket_id: &str) -> Result<Option<TicketAggregate>, SalonError> {
    let Some(snap) = store.get(&paths::ticket(ticket_id))? else {
        return Ok(None);
    };
    let ticket: Ticket = snap.decode_keyed()?;

    let service_items = store
        .query(&Query::collection(paths::service_items(ticket_id)).order_by("serviceName", Direction::Asc))?
        .iter()
        .map(|snap| snap.decode::<TicketServiceItem>())
        .collect::<Result<Vec<_>, _>>()?;

    let actions = store
        .query(&Query::collection(paths::actions(ticket_id)).order_by("dueDateTime", Direction::Asc))?
        .iter()
        .map(|snap| snap.decode_keyed::<TicketAction>())
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(TicketAggregate {
        ticket,
        service_items,
        actions,
    }))
}

/// Appointments with `start <= appointmentDateTime < end`, earliest first
pub fn appointments_in_range(
    store: &dyn DocumentStore,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<Appointment>, SalonError> {
    if end <= start {
        return Ok(Vec::new());
    }
    let query = Query::collection(paths::APPOINTMENTS)
        .filter("appointmentDateTime", FilterOp::Gte, start.timestamp_millis())
        .filter("appointmentDateTime", FilterOp::Lt, end.timestamp_millis())
        .order_by("appointmentDateTime", Direction::Asc);
    store
        .query(&query)?
        .iter()
        .map(|snap| snap.decode_keyed().map_err(SalonError::from))
        .collect()
}

/// Ledger entries dated in `[start, end)`, newest first
pub fn ledger_entries_in_range(
    store: &dyn DocumentStore,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    limit: Option<usize>,
) -> Result<Vec<LedgerEntry>, SalonError> {
    if end <= start {
        return Ok(Vec::new());
    }
    let query = Query::collection(paths::LEDGER)
        .filter("date", FilterOp::Gte, start.timestamp_millis())
        .filter("date", FilterOp::Lt, end.timestamp_millis())
        .order_by("date", Direction::Desc)
        .limit(limit.unwrap_or(DEFAULT_LEDGER_LIMIT));
    store
        .query(&query)?
        .iter()
        .map(|snap| snap.decode_keyed().map_err(SalonError::from))
        .collect()
}
