//! Sample tickets for a fresh store.

use chrono::{DateTime, Duration, Utc};
use fake::faker::name::en::Name;
use fake::faker::phone_number::en::PhoneNumber;
use fake::Fake;
use rand::seq::SliceRandom;
use rand::Rng;
use rust_decimal::Decimal;

use salonbook::ledger::CompleteService;
use salonbook::model::{ConfirmationLevel, TicketHeader, TicketStatus};
use salonbook::tickets::{ActionDraft, ServiceItemDraft, TicketDraft};
use salonbook::{LedgerWriter, PgDocumentStore, SalonConfig, SalonError, TicketWriter};

/// `(service id, name, price)`
const CATALOG: &[(&str, &str, i64)] = &[
    ("svc_1", "Aroma Magic Gold facial", 3500),
    ("svc_2", "Aroma Magic Pearl Facial", 3700),
    ("svc_4", "Hydra Facial", 7000),
    ("svc_9", "Hair Style", 1000),
    ("svc_11", "Eyebrow Shaping", 200),
    ("svc_14", "Manicure", 1500),
    ("svc_15", "Pedicure", 1800),
    ("svc_26", "Leg wax - Half leg", 1800),
];

const EMPLOYEES: &[&str] = &["emp_1", "emp_2", "emp_3"];

const STATUSES: &[TicketStatus] = &[
    TicketStatus::NewCall,
    TicketStatus::PriceDiscussionPending,
    TicketStatus::AppointmentTentative,
    TicketStatus::AppointmentConfirmed,
];

#[derive(Debug, Default, Clone, Copy)]
pub struct SeedCounts {
    pub tickets: usize,
    pub appointments: usize,
    pub completions: usize,
}

impl std::ops::AddAssign for SeedCounts {
    fn add_assign(&mut self, other: Self) {
        self.tickets += other.tickets;
        self.appointments += other.appointments;
        self.completions += other.completions;
    }
}

/// `hour:00` UTC, `days` after `now`
fn slot(now: DateTime<Utc>, days: i64, hour: u32) -> DateTime<Utc> {
    let date = (now + Duration::days(days)).date_naive();
    date.and_hms_opt(hour, 0, 0).map_or(now, |naive| naive.and_utc())
}

fn sample_draft<R: Rng>(rng: &mut R, now: DateTime<Utc>) -> TicketDraft {
    let name: String = Name().fake_with_rng(rng);
    let phone: String = PhoneNumber().fake_with_rng(rng);
    let status = *STATUSES.choose(rng).unwrap_or(&TicketStatus::NewCall);
    let employee = EMPLOYEES.choose(rng).copied().unwrap_or("emp_1");

    let mut draft = TicketDraft::new(
        TicketHeader::new(phone, status, employee)
            .with_customer_name(name)
            .with_note("Sample ticket created by seeder."),
    );

    let services = rng.gen_range(1..=3);
    for &(id, service_name, price) in CATALOG.choose_multiple(rng, services) {
        let mut item = ServiceItemDraft::new(id, service_name).price(price.to_string());
        if rng.gen_bool(0.7) {
            let level = *[
                ConfirmationLevel::None,
                ConfirmationLevel::PartiallyConfirmed,
                ConfirmationLevel::FullyConfirmed,
            ]
            .choose(rng)
            .unwrap_or(&ConfirmationLevel::None);
            item = item
                .at(slot(now, rng.gen_range(0..14), rng.gen_range(9..18)))
                .confirmation(level);
        }
        draft = draft.service(item);
    }

    if rng.gen_bool(0.5) {
        draft = draft.action(ActionDraft::new(
            "Call back to confirm details",
            slot(now, rng.gen_range(0..3), 18),
        ));
    }
    draft
}

/// Create `count` sample tickets; roughly one in four gets its first service completed
pub fn seed_tickets(
    store: &PgDocumentStore,
    config: &SalonConfig,
    count: usize,
) -> Result<SeedCounts, SalonError> {
    let writer = TicketWriter::from_config(store, config)?;
    let ledger = LedgerWriter::new(store);
    let mut rng = rand::thread_rng();
    let now = Utc::now();
    let mut counts = SeedCounts::default();

    for _ in 0..count {
        let draft = sample_draft(&mut rng, now);
        let written = writer.create(&draft)?;
        counts.tickets += 1;
        counts.appointments += written.index.upserted;

        if rng.gen_bool(0.25) {
            if let Some(first) = draft.service_items.first() {
                let price = CATALOG
                    .iter()
                    .find(|(id, _, _)| *id == first.service_id)
                    .map_or(0, |(_, _, price)| *price);
                ledger.complete_service(&CompleteService {
                    ticket_id: written.ticket_id.clone(),
                    service_id: first.service_id.clone(),
                    service_name: first.service_name.clone(),
                    amount: Decimal::from(price),
                    date: None,
                })?;
                counts.completions += 1;
            }
        }
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sample_draft_is_valid() {
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let draft = sample_draft(&mut rng, Utc::now());
            assert!(!draft.service_items.is_empty());
            assert!(draft.service_items.len() <= 3);
            assert!(!draft.header.customer_phone.is_empty());
        }
    }

    #[test]
    fn test_slot_lands_on_the_hour() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 7, 42, 0).unwrap();
        assert_eq!(slot(now, 2, 15), Utc.with_ymd_and_hms(2024, 3, 12, 15, 0, 0).unwrap());
    }
}
