//! Re-derive the appointment index from tickets and their service items.
//!
//! The only place the index is recomputed from scratch rather than patched.
//! Writes go through a batch that commits itself whenever it reaches the
//! flush threshold, so a run over many tickets becomes several commits. A
//! failure mid-run leaves the already committed batches in place; running
//! again finishes the job.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::RebuildConfig;
use crate::error::SalonError;
use crate::ids::appointment_id;
use crate::model::{ConfirmationLevel, TicketServiceItem};
use crate::store::{commit_batch, paths, DocumentStore, Query, Snapshot, WriteBatch};
use crate::sync::{self, IndexCounts};

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;
#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// Outcome of one rebuild run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildReport {
    pub tickets_scanned: usize,
    pub appointments_upserted: usize,
    pub appointments_deleted: usize,
    pub batches_committed: usize,
}

impl fmt::Display for RebuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tickets scanned: {}, appointments upserted: {}, appointments deleted: {}",
            self.tickets_scanned, self.appointments_upserted, self.appointments_deleted
        )
    }
}

/// Batch that commits once it holds `threshold` operations
struct FlushingBatch<'s> {
    store: &'s dyn DocumentStore,
    batch: WriteBatch,
    threshold: usize,
    commits: usize,
}

impl<'s> FlushingBatch<'s> {
    fn new(store: &'s dyn DocumentStore, threshold: usize) -> Self {
        Self {
            store,
            batch: WriteBatch::new(),
            threshold,
            commits: 0,
        }
    }

    fn batch(&mut self) -> &mut WriteBatch {
        &mut self.batch
    }

    fn flush_if_full(&mut self) -> Result<(), SalonError> {
        if self.batch.len() >= self.threshold {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SalonError> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.batch);
        commit_batch(self.store, batch, "rebuild.flush")?;
        self.commits += 1;
        Ok(())
    }
}

pub struct AppointmentRebuilder<'a> {
    store: &'a dyn DocumentStore,
    flush_threshold: usize,
    max_items_per_ticket: usize,
}

impl<'a> AppointmentRebuilder<'a> {
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self::from_config(store, &RebuildConfig::default())
    }

    pub fn from_config(store: &'a dyn DocumentStore, config: &RebuildConfig) -> Self {
        Self {
            store,
            flush_threshold: config.flush_threshold,
            max_items_per_ticket: config.max_items_per_ticket.max(1),
        }
    }

    /// Operations per batch; kept between 1 and one below the store ceiling
    pub fn with_flush_threshold(mut self, threshold: usize) -> Self {
        self.flush_threshold = threshold;
        self
    }

    pub fn with_max_items_per_ticket(mut self, max: usize) -> Self {
        self.max_items_per_ticket = max.max(1);
        self
    }

    fn effective_threshold(&self) -> usize {
        let ceiling = self.store.max_batch_ops().saturating_sub(1).max(1);
        self.flush_threshold.clamp(1, ceiling)
    }

    /// Scan up to `max_tickets` tickets and make their appointment records
    /// agree with their service items
    pub fn rebuild(&self, max_tickets: usize) -> Result<RebuildReport, SalonError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::rebuild_span(max_tickets).entered();

        let tickets = self
            .store
            .query(&Query::collection(paths::TICKETS).limit(max_tickets))?;
        let mut out = FlushingBatch::new(self.store, self.effective_threshold());
        let mut counts = IndexCounts::default();

        for ticket in &tickets {
            match self.rebuild_ticket(ticket, &mut out) {
                Ok(ticket_counts) => counts += ticket_counts,
                Err(e) => {
                    log::warn!(
                        "rebuild stopped at ticket {} after {} commit(s): {e}",
                        ticket.id(),
                        out.commits
                    );
                    return Err(e);
                }
            }
        }
        out.flush()?;

        let report = RebuildReport {
            tickets_scanned: tickets.len(),
            appointments_upserted: counts.upserted,
            appointments_deleted: counts.deleted,
            batches_committed: out.commits,
        };
        log::info!("{report} ({} batch(es))", report.batches_committed);
        #[cfg(feature = "metrics")]
        METRICS.record_rebuild(report.appointments_upserted, report.appointments_deleted);
        Ok(report)
    }

    fn rebuild_ticket(
        &self,
        ticket: &Snapshot,
        out: &mut FlushingBatch<'_>,
    ) -> Result<IndexCounts, SalonError> {
        let ticket_id = ticket.id();
        let item_docs = self.store.query(
            &Query::collection(paths::service_items(ticket_id)).limit(self.max_items_per_ticket),
        )?;

        let mut counts = IndexCounts::default();
        let mut present = HashSet::new();
        for doc in &item_docs {
            let item = item_with_fallback(ticket, doc);
            present.insert(appointment_id(ticket_id, &item.service_id));
            counts += sync::apply_effects(out.batch(), [sync::plan_one(&item)])?;
            out.flush_if_full()?;
        }

        if item_docs.len() >= self.max_items_per_ticket {
            log::warn!(
                "ticket {ticket_id} has at least {} service items; skipping stale index sweep",
                self.max_items_per_ticket
            );
            return Ok(counts);
        }

        let indexed = self.store.query(
            &Query::collection(paths::APPOINTMENTS).where_eq("ticketId", ticket_id),
        )?;
        // orphan status comes from the record's path; its body may be corrupt
        for record in indexed {
            if !present.contains(record.id()) {
                out.batch().delete(record.path.clone());
                counts.deleted += 1;
                out.flush_if_full()?;
            }
        }
        Ok(counts)
    }
}

fn text(doc: &Snapshot, field: &str) -> Option<String> {
    doc.get(field).and_then(Value::as_str).map(str::to_string)
}

/// Service item read leniently: missing fields fall back to the ticket's
/// copy, then to empty values
fn item_with_fallback(ticket: &Snapshot, doc: &Snapshot) -> TicketServiceItem {
    let inherited = |field: &str| text(doc, field).or_else(|| text(ticket, field));

    TicketServiceItem {
        ticket_id: ticket.id().to_string(),
        service_id: text(doc, "serviceId").unwrap_or_else(|| doc.id().to_string()),
        service_name: text(doc, "serviceName").unwrap_or_default(),
        price_text: text(doc, "priceText"),
        service_note: text(doc, "serviceNote"),
        appointment_date_time: doc
            .get("appointmentDateTime")
            .and_then(Value::as_i64)
            .and_then(DateTime::<Utc>::from_timestamp_millis),
        confirmation_level: doc
            .get("confirmationLevel")
            .cloned()
            .and_then(|v| serde_json::from_value::<ConfirmationLevel>(v).ok())
            .unwrap_or_default(),
        is_completed: doc
            .get("isCompleted")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        completed_at: None,
        assigned_employee_id: inherited("assignedEmployeeId").unwrap_or_default(),
        customer_phone: inherited("customerPhone").unwrap_or_default(),
        customer_name: inherited("customerName"),
        created_at: None,
        updated_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Appointment;
    use crate::store::memory::MemoryStore;
    use crate::store::{to_document, DocPath};
    use serde_json::json;

    fn put(store: &MemoryStore, path: DocPath, value: Value) {
        store.raw_put(path, to_document(&value).unwrap());
    }

    fn seed_ticket(store: &MemoryStore, id: &str) {
        put(
            store,
            paths::ticket(id),
            json!({
                "customerPhone": "0770000001",
                "customerName": "Customer One",
                "assignedEmployeeId": "emp_1",
                "status": "NEW_CALL",
            }),
        );
    }

    #[test]
    fn test_report_display() {
        let report = RebuildReport {
            tickets_scanned: 3,
            appointments_upserted: 2,
            appointments_deleted: 1,
            batches_committed: 1,
        };
        assert_eq!(
            report.to_string(),
            "Tickets scanned: 3, appointments upserted: 2, appointments deleted: 1"
        );
    }

    #[test]
    fn test_fallback_to_ticket_fields() {
        let store = MemoryStore::new();
        seed_ticket(&store, "t1");
        // legacy item: no serviceId, no customer copy
        put(
            &store,
            paths::service_item("t1", "svc_legacy"),
            json!({
                "serviceName": "Facial",
                "appointmentDateTime": 1_710_064_800_000i64,
                "confirmationLevel": "SOMETHING_ELSE",
            }),
        );

        let report = AppointmentRebuilder::new(&store).rebuild(10).unwrap();
        assert_eq!(report.appointments_upserted, 1);

        let appointment: Appointment = store
            .get(&paths::appointment("t1", "svc_legacy"))
            .unwrap()
            .unwrap()
            .decode_keyed()
            .unwrap();
        assert_eq!(appointment.customer_phone, "0770000001");
        assert_eq!(appointment.assigned_employee_id, "emp_1");
        assert_eq!(appointment.customer_name.as_deref(), Some("Customer One"));
        assert_eq!(appointment.confirmation_level, ConfirmationLevel::None);
        assert!(appointment.updated_at.is_some());
    }

    #[test]
    fn test_unscheduled_item_and_orphan_deleted() {
        let store = MemoryStore::new();
        seed_ticket(&store, "t1");
        put(
            &store,
            paths::service_item("t1", "svc_1"),
            json!({"serviceId": "svc_1", "serviceName": "Facial", "appointmentDateTime": null}),
        );
        put(
            &store,
            paths::appointment("t1", "svc_1"),
            json!({"ticketId": "t1", "serviceId": "svc_1"}),
        );
        put(
            &store,
            paths::appointment("t1", "svc_removed"),
            json!({"ticketId": "t1", "serviceId": "svc_removed"}),
        );

        let report = AppointmentRebuilder::new(&store).rebuild(10).unwrap();
        assert_eq!(report.appointments_upserted, 0);
        // one for the unscheduled item, one for the orphan
        assert_eq!(report.appointments_deleted, 2);
        assert!(store.ids_in(paths::APPOINTMENTS).is_empty());
    }

    #[test]
    fn test_flushes_at_threshold() {
        let store = MemoryStore::new();
        for t in 0..3 {
            let ticket_id = format!("t{t}");
            seed_ticket(&store, &ticket_id);
            for s in 0..4 {
                put(
                    &store,
                    paths::service_item(&ticket_id, &format!("svc_{s}")),
                    json!({"serviceName": "Facial", "appointmentDateTime": 1_710_064_800_000i64 + s}),
                );
            }
        }

        let report = AppointmentRebuilder::new(&store)
            .with_flush_threshold(5)
            .rebuild(10)
            .unwrap();
        assert_eq!(report.tickets_scanned, 3);
        assert_eq!(report.appointments_upserted, 12);
        assert_eq!(report.batches_committed, 3);
        assert_eq!(store.commit_count(), 3);
        assert_eq!(store.ids_in(paths::APPOINTMENTS).len(), 12);
    }

    #[test]
    fn test_threshold_clamped_below_store_ceiling() {
        let store = MemoryStore::with_max_batch_ops(4);
        seed_ticket(&store, "t1");
        for s in 0..6 {
            put(
                &store,
                paths::service_item("t1", &format!("svc_{s}")),
                json!({"serviceName": "Facial", "appointmentDateTime": 1_710_064_800_000i64}),
            );
        }
        let report = AppointmentRebuilder::new(&store).rebuild(10).unwrap();
        assert_eq!(report.appointments_upserted, 6);
        assert_eq!(report.batches_committed, 2);
    }

    #[test]
    fn test_max_tickets_bounds_scan() {
        let store = MemoryStore::new();
        for t in 0..5 {
            seed_ticket(&store, &format!("t{t}"));
        }
        let report = AppointmentRebuilder::new(&store).rebuild(2).unwrap();
        assert_eq!(report.tickets_scanned, 2);
        assert_eq!(report.batches_committed, 0);
    }

    #[test]
    fn test_corrupted_service_id_is_repaired_not_deleted() {
        let store = MemoryStore::new();
        seed_ticket(&store, "t1");
        put(
            &store,
            paths::service_item("t1", "svc_1"),
            json!({"serviceId": "svc_1", "serviceName": "Facial", "appointmentDateTime": 1_710_064_800_000i64}),
        );
        put(
            &store,
            paths::appointment("t1", "svc_1"),
            json!({"ticketId": "t1", "serviceId": "svc_WRONG", "serviceName": "Facial"}),
        );

        let report = AppointmentRebuilder::new(&store).rebuild(10).unwrap();
        assert_eq!(report.appointments_upserted, 1);
        assert_eq!(report.appointments_deleted, 0);

        let appointment: Appointment = store
            .get(&paths::appointment("t1", "svc_1"))
            .unwrap()
            .expect("record survives the rebuild")
            .decode_keyed()
            .unwrap();
        assert_eq!(appointment.service_id, "svc_1");
    }

    #[test]
    fn test_failure_surfaces_and_rerun_converges() {
        let store = MemoryStore::new();
        seed_ticket(&store, "t1");
        put(
            &store,
            paths::service_item("t1", "svc_1"),
            json!({"serviceName": "Facial", "appointmentDateTime": 1_710_064_800_000i64}),
        );

        store.fail_next_commit("quota exceeded");
        let err = AppointmentRebuilder::new(&store).rebuild(10).unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
        assert!(store.ids_in(paths::APPOINTMENTS).is_empty());

        let report = AppointmentRebuilder::new(&store).rebuild(10).unwrap();
        assert_eq!(report.appointments_upserted, 1);
        assert_eq!(store.ids_in(paths::APPOINTMENTS).len(), 1);
    }
}
