use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ticket::{ConfirmationLevel, TicketServiceItem};
use crate::ids::appointment_id;
use crate::store::Keyed;

/// `appointments/{ticketId}__{serviceId}`: calendar projection of one scheduled service item
///
/// Exists exactly while the service item it mirrors has an appointment time.
/// Never a source of truth for ticket or service data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    #[serde(skip)]
    pub id: String,
    pub ticket_id: String,
    pub service_id: String,
    pub service_name: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub appointment_date_time: DateTime<Utc>,
    #[serde(default)]
    pub confirmation_level: ConfirmationLevel,
    #[serde(default)]
    pub is_completed: bool,
    pub assigned_employee_id: String,
    pub customer_phone: String,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Appointment {
    /// Index record for `item`, or `None` when the item is not scheduled
    pub fn mirror(item: &TicketServiceItem) -> Option<Self> {
        let appointment_date_time = item.appointment_date_time?;
        Some(Self {
            id: appointment_id(&item.ticket_id, &item.service_id),
            ticket_id: item.ticket_id.clone(),
            service_id: item.service_id.clone(),
            service_name: item.service_name.clone(),
            appointment_date_time,
            confirmation_level: item.confirmation_level,
            is_completed: item.is_completed,
            assigned_employee_id: item.assigned_employee_id.clone(),
            customer_phone: item.customer_phone.clone(),
            customer_name: item.customer_name.clone(),
            updated_at: None,
        })
    }

    /// True when every mirrored field agrees with `item` (timestamps ignored)
    pub fn mirrors(&self, item: &TicketServiceItem) -> bool {
        match Self::mirror(item) {
            Some(expected) => Self { updated_at: None, ..self.clone() } == expected,
            None => false,
        }
    }
}

impl Keyed for Appointment {
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}
