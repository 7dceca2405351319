//! End-to-end behavior of the writers and the rebuild job over the in-memory store.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::json;

use salonbook::export::BillDocument;
use salonbook::ledger::{BillLine, CompleteService};
use salonbook::model::{Appointment, ConfirmationLevel, LedgerKind, TicketHeader, TicketStatus};
use salonbook::queries::{self, TicketAggregate};
use salonbook::store::{paths, to_document};
use salonbook::tickets::{ActionDraft, ServiceItemDraft, TicketDraft};
use salonbook::{AppointmentRebuilder, DocumentStore, LedgerWriter, MemoryStore, TicketWriter};

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
}

fn header() -> TicketHeader {
    TicketHeader::new("0770000001", TicketStatus::AppointmentTentative, "emp_1")
        .with_customer_name("Customer One")
}

fn draft() -> TicketDraft {
    TicketDraft::new(header())
        .service(
            ServiceItemDraft::new("svc_hair", "Hair Style")
                .at(at(12, 15))
                .confirmation(ConfirmationLevel::PartiallyConfirmed),
        )
        .service(ServiceItemDraft::new("svc_facial", "Facial").at(at(10, 9)))
        .service(ServiceItemDraft::new("svc_brows", "Eyebrows"))
        .action(ActionDraft::new("Confirm by phone", at(9, 18)))
}

fn load(store: &MemoryStore, ticket_id: &str) -> TicketAggregate {
    queries::load_ticket(store, ticket_id).unwrap().unwrap()
}

/// Every item has an index record exactly when scheduled, and the record mirrors it
fn assert_index_matches_items(store: &MemoryStore, ticket_id: &str) {
    let aggregate = load(store, ticket_id);
    for item in &aggregate.service_items {
        let record = store
            .get(&paths::appointment(ticket_id, &item.service_id))
            .unwrap();
        match (item.appointment_date_time, record) {
            (Some(_), Some(snap)) => {
                let appointment: Appointment = snap.decode_keyed().unwrap();
                assert!(appointment.mirrors(item), "stale index record for {}", item.service_id);
            }
            (None, None) => {}
            (scheduled, record) => panic!(
                "index disagrees for {}: scheduled={scheduled:?}, record present={}",
                item.service_id,
                record.is_some()
            ),
        }
    }
    let item_ids: Vec<_> = aggregate.service_items.iter().map(|i| i.service_id.clone()).collect();
    for snap in store
        .query(&salonbook::store::Query::collection(paths::APPOINTMENTS).where_eq("ticketId", ticket_id))
        .unwrap()
    {
        let service_id = snap.get("serviceId").and_then(|v| v.as_str()).unwrap();
        assert!(item_ids.iter().any(|id| id == service_id), "orphan record {service_id}");
    }
}

#[test]
fn test_create_keeps_index_and_summary_consistent() {
    let store = MemoryStore::new();
    let writer = TicketWriter::new(&store);
    let written = writer.create(&draft()).unwrap();

    assert_eq!(written.index.upserted, 2);
    assert_eq!(written.index.deleted, 1);
    assert_eq!(store.commit_count(), 1);
    assert_index_matches_items(&store, &written.ticket_id);

    let aggregate = load(&store, &written.ticket_id);
    let next = aggregate.ticket.next_appointment().unwrap();
    assert_eq!(next.date_time, at(10, 9));
    assert_eq!(next.service_name, "Facial");
    assert_eq!(next.confirmation_level, ConfirmationLevel::None);
    assert_eq!(aggregate.actions.len(), 1);
}

#[test]
fn test_update_is_idempotent() {
    let store = MemoryStore::new();
    let writer = TicketWriter::new(&store);
    let ticket_id = writer.create(&draft()).unwrap().ticket_id;

    let revised = TicketDraft::new(header())
        .service(ServiceItemDraft::new("svc_hair", "Hair Style").at(at(11, 10)))
        .service(ServiceItemDraft::new("svc_brows", "Eyebrows").at(at(11, 12)));

    writer.update_from_store(&ticket_id, &revised).unwrap();
    let first = load(&store, &ticket_id);
    let docs_after_first = store.len();

    let again = writer.update_from_store(&ticket_id, &revised).unwrap();
    let second = load(&store, &ticket_id);

    assert!(again.service_items_removed.is_empty());
    assert_eq!(store.len(), docs_after_first);
    assert_eq!(first.ticket.header, second.ticket.header);
    assert_eq!(first.ticket.next_appointment(), second.ticket.next_appointment());
    let strip = |agg: &TicketAggregate| {
        agg.service_items
            .iter()
            .map(|i| (i.service_id.clone(), i.appointment_date_time, i.confirmation_level))
            .collect::<Vec<_>>()
    };
    assert_eq!(strip(&first), strip(&second));
    assert_index_matches_items(&store, &ticket_id);
}

#[test]
fn test_removed_children_are_deleted_with_their_index_records() {
    let store = MemoryStore::new();
    let writer = TicketWriter::new(&store);
    let created = writer.create(&draft()).unwrap();
    let ticket_id = created.ticket_id;

    let trimmed = TicketDraft::new(header())
        .service(ServiceItemDraft::new("svc_hair", "Hair Style").at(at(12, 15)));
    let written = writer.update_from_store(&ticket_id, &trimmed).unwrap();

    let mut removed = written.service_items_removed.clone();
    removed.sort();
    assert_eq!(removed, ["svc_brows", "svc_facial"]);
    assert_eq!(written.actions_removed, created.action_ids);
    assert!(store.get(&paths::appointment(&ticket_id, "svc_facial")).unwrap().is_none());
    assert!(store.ids_in(&paths::actions(&ticket_id)).is_empty());

    let aggregate = load(&store, &ticket_id);
    assert_eq!(aggregate.service_items.len(), 1);
    assert_eq!(aggregate.ticket.next_appointment().unwrap().service_name, "Hair Style");
    assert_index_matches_items(&store, &ticket_id);
}

#[test]
fn test_unscheduling_clears_summary() {
    let store = MemoryStore::new();
    let writer = TicketWriter::new(&store);
    let ticket_id = writer.create(&draft()).unwrap().ticket_id;

    let unscheduled = TicketDraft::new(header())
        .service(ServiceItemDraft::new("svc_hair", "Hair Style"))
        .service(ServiceItemDraft::new("svc_facial", "Facial").at(""));
    writer.update_from_store(&ticket_id, &unscheduled).unwrap();

    let aggregate = load(&store, &ticket_id);
    assert!(aggregate.ticket.next_appointment().is_none());
    assert!(aggregate.ticket.next_appointment_service_name.is_none());
    assert!(store.ids_in(paths::APPOINTMENTS).is_empty());
}

#[test]
fn test_failed_batch_leaves_store_unchanged() {
    let store = MemoryStore::new();
    let writer = TicketWriter::new(&store);
    let ticket_id = writer.create(&draft()).unwrap().ticket_id;
    let before = load(&store, &ticket_id);
    let docs_before = store.len();

    store.fail_next_commit("network down");
    let err = writer
        .update_from_store(&ticket_id, &TicketDraft::new(header()))
        .unwrap_err();
    assert!(!err.is_validation());

    assert_eq!(store.len(), docs_before);
    assert_eq!(load(&store, &ticket_id), before);
    assert_index_matches_items(&store, &ticket_id);
}

#[test]
fn test_delete_cascades_but_keeps_ledger() {
    let store = MemoryStore::new();
    let writer = TicketWriter::new(&store);
    let ticket_id = writer.create(&draft()).unwrap().ticket_id;

    LedgerWriter::new(&store)
        .complete_service(&CompleteService {
            ticket_id: ticket_id.clone(),
            service_id: "svc_facial".into(),
            service_name: "Facial".into(),
            amount: Decimal::from(1500),
            date: Some(at(10, 11)),
        })
        .unwrap();
    // a record whose item vanished earlier
    store.raw_put(
        paths::appointment(&ticket_id, "svc_gone"),
        to_document(&json!({"ticketId": ticket_id, "serviceId": "svc_gone"})).unwrap(),
    );

    let written = writer.delete(&ticket_id).unwrap();
    assert_eq!(written.index.deleted, 4);

    assert!(queries::load_ticket(&store, &ticket_id).unwrap().is_none());
    assert!(store.ids_in(&paths::service_items(&ticket_id)).is_empty());
    assert!(store.ids_in(&paths::actions(&ticket_id)).is_empty());
    assert!(store.ids_in(paths::APPOINTMENTS).is_empty());
    assert_eq!(store.ids_in(paths::LEDGER).len(), 1);

    // deleting again is a no-op
    writer.delete(&ticket_id).unwrap();
}

#[test]
fn test_completion_updates_item_index_and_ledger() {
    let store = MemoryStore::new();
    let ticket_id = TicketWriter::new(&store).create(&draft()).unwrap().ticket_id;
    let ledger = LedgerWriter::new(&store);

    let entry = ledger
        .complete_service(&CompleteService {
            ticket_id: ticket_id.clone(),
            service_id: "svc_hair".into(),
            service_name: "Hair Style".into(),
            amount: Decimal::ZERO,
            date: None,
        })
        .unwrap();
    assert_eq!(entry.amount, Decimal::ZERO);
    assert!(matches!(entry.kind, LedgerKind::Income { ticket_id: Some(ref t), .. } if *t == ticket_id));

    let aggregate = load(&store, &ticket_id);
    let hair = aggregate
        .service_items
        .iter()
        .find(|i| i.service_id == "svc_hair")
        .unwrap();
    assert!(hair.is_completed);
    assert!(hair.completed_at.is_some());
    assert_index_matches_items(&store, &ticket_id);

    let negative = ledger.complete_service(&CompleteService {
        ticket_id: ticket_id.clone(),
        service_id: "svc_facial".into(),
        service_name: "Facial".into(),
        amount: Decimal::from(-1),
        date: None,
    });
    assert!(negative.unwrap_err().is_validation());
    assert_eq!(store.ids_in(paths::LEDGER).len(), 1);
}

#[test]
fn test_bill_fan_out_and_export() {
    let store = MemoryStore::new();
    let ledger = LedgerWriter::new(&store);
    let created = ledger
        .create_bill_and_income_entries(
            at(10, 12),
            &[
                BillLine::new("s1", "Facial", Decimal::from(100), 3.0),
                BillLine::new("s2", "Pedicure", Decimal::from(250), 1.7),
                BillLine::new("s3", "Broken", Decimal::from(-5), 2.0),
            ],
        )
        .unwrap();

    assert_eq!(created.bill.item_count, 4);
    assert_eq!(created.bill.total_amount, Decimal::from(550));
    assert_eq!(created.entries.len(), 4);
    assert!(created
        .entries
        .iter()
        .all(|e| e.bill_id() == Some(created.bill_id())));
    assert_eq!(store.ids_in(paths::LEDGER).len(), 4);
    assert_eq!(store.ids_in(paths::BILLS), [created.bill_id().to_string()]);
    assert_eq!(store.commit_count(), 1);

    let stored = queries::ledger_entries_in_range(&store, at(10, 0), at(11, 0), None).unwrap();
    let document = BillDocument::from_entries(&stored, at(10, 13)).unwrap();
    assert_eq!(document.total, Decimal::from(550));
    let lines: Vec<_> = document.lines.iter().map(|l| (l.name.as_str(), l.quantity)).collect();
    assert_eq!(lines, [("Facial", 3), ("Pedicure", 1)]);
}

#[test]
fn test_rebuild_repairs_drift() {
    let store = MemoryStore::new();
    let writer = TicketWriter::new(&store);
    let first = writer.create(&draft()).unwrap().ticket_id;
    let second = writer
        .create(
            &TicketDraft::new(TicketHeader::new("0770000002", TicketStatus::NewCall, "emp_2"))
                .service(ServiceItemDraft::new("svc_nails", "Nails").at(at(14, 10))),
        )
        .unwrap()
        .ticket_id;

    // lost record, stale record, orphan record
    store.raw_delete(&paths::appointment(&first, "svc_hair"));
    store.raw_put(
        paths::appointment(&first, "svc_facial"),
        to_document(&json!({
            "ticketId": first,
            "serviceId": "svc_facial",
            "serviceName": "Old name",
            "appointmentDateTime": at(1, 1).timestamp_millis(),
            "confirmationLevel": "NONE",
            "isCompleted": false,
            "assignedEmployeeId": "emp_9",
            "customerPhone": "000",
        }))
        .unwrap(),
    );
    store.raw_put(
        paths::appointment(&second, "svc_removed"),
        to_document(&json!({"ticketId": second, "serviceId": "svc_removed"})).unwrap(),
    );

    let report = AppointmentRebuilder::new(&store).rebuild(200).unwrap();
    assert_eq!(report.tickets_scanned, 2);
    assert_eq!(report.appointments_upserted, 3);
    // the unscheduled eyebrows item plus the orphan
    assert_eq!(report.appointments_deleted, 2);
    assert_index_matches_items(&store, &first);
    assert_index_matches_items(&store, &second);

    let again = AppointmentRebuilder::new(&store).rebuild(200).unwrap();
    assert_eq!(again.appointments_upserted, 3);
    assert_eq!(again.appointments_deleted, 1);
    assert_eq!(store.ids_in(paths::APPOINTMENTS).len(), 3);
}

#[test]
fn test_rebuild_counts_sum_across_batches() {
    let store = MemoryStore::new();
    let writer = TicketWriter::new(&store);
    for n in 0..6 {
        writer
            .create(
                &TicketDraft::new(TicketHeader::new(format!("07700000{n:02}"), TicketStatus::NewCall, "emp_1"))
                    .service(ServiceItemDraft::new("svc_a", "Facial").at(at(10, 9)))
                    .service(ServiceItemDraft::new("svc_b", "Nails").at(at(10, 11)))
                    .service(ServiceItemDraft::new("svc_c", "Brows")),
            )
            .unwrap();
    }
    let commits_before = store.commit_count();

    let report = AppointmentRebuilder::new(&store)
        .with_flush_threshold(4)
        .rebuild(200)
        .unwrap();

    assert_eq!(report.tickets_scanned, 6);
    assert_eq!(report.appointments_upserted, 12);
    assert_eq!(report.appointments_deleted, 6);
    // 18 operations at 4 per batch
    assert_eq!(report.batches_committed, 5);
    assert_eq!(store.commit_count() - commits_before, 5);
    assert_eq!(store.ids_in(paths::APPOINTMENTS).len(), 12);
}
