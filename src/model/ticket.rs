//! Ticket aggregate: header, service items and follow-up actions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::Keyed;

/// Where a ticket is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    NewCall,
    PriceDiscussionPending,
    AppointmentTentative,
    AppointmentConfirmed,
    Completed,
    Cancelled,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 6] = [
        TicketStatus::NewCall,
        TicketStatus::PriceDiscussionPending,
        TicketStatus::AppointmentTentative,
        TicketStatus::AppointmentConfirmed,
        TicketStatus::Completed,
        TicketStatus::Cancelled,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TicketStatus::NewCall => "New call",
            TicketStatus::PriceDiscussionPending => "Price discussion",
            TicketStatus::AppointmentTentative => "Tentative",
            TicketStatus::AppointmentConfirmed => "Confirmed",
            TicketStatus::Completed => "Completed",
            TicketStatus::Cancelled => "Cancelled",
        }
    }
}

/// Customer's commitment to a scheduled service, ordered `None < Partially < Fully`
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfirmationLevel {
    #[default]
    None,
    PartiallyConfirmed,
    FullyConfirmed,
}

impl ConfirmationLevel {
    pub fn label(&self) -> &'static str {
        match self {
            ConfirmationLevel::None => "None",
            ConfirmationLevel::PartiallyConfirmed => "Partially confirmed",
            ConfirmationLevel::FullyConfirmed => "Fully confirmed",
        }
    }
}

/// Caller-editable ticket fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketHeader {
    pub customer_phone: String,
    #[serde(default)]
    pub customer_name: Option<String>,
    pub status: TicketStatus,
    pub assigned_employee_id: String,
    #[serde(default)]
    pub overall_note: Option<String>,
}

impl TicketHeader {
    pub fn new(
        customer_phone: impl Into<String>,
        status: TicketStatus,
        assigned_employee_id: impl Into<String>,
    ) -> Self {
        Self {
            customer_phone: customer_phone.into(),
            customer_name: None,
            status,
            assigned_employee_id: assigned_employee_id.into(),
            overall_note: None,
        }
    }

    pub fn with_customer_name(mut self, name: impl Into<String>) -> Self {
        self.customer_name = Some(name.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.overall_note = Some(note.into());
        self
    }
}

/// Denormalized summary of a ticket's earliest scheduled service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextAppointment {
    pub date_time: DateTime<Utc>,
    pub service_name: String,
    pub confirmation_level: ConfirmationLevel,
}

/// `tickets/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    #[serde(skip)]
    pub id: String,
    #[serde(flatten)]
    pub header: TicketHeader,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub next_appointment_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_appointment_service_name: Option<String>,
    #[serde(default)]
    pub next_appointment_confirmation_level: Option<ConfirmationLevel>,
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

impl Ticket {
    /// Header plus summary, ready to be written (timestamps left to the store)
    pub fn for_write(id: impl Into<String>, header: TicketHeader, next: Option<&NextAppointment>) -> Self {
        Self {
            id: id.into(),
            header,
            next_appointment_date_time: next.map(|n| n.date_time),
            next_appointment_service_name: next.map(|n| n.service_name.clone()),
            next_appointment_confirmation_level: next.map(|n| n.confirmation_level),
            created_at: None,
            updated_at: None,
        }
    }

    /// The stored summary, or `None` when the ticket has nothing scheduled
    pub fn next_appointment(&self) -> Option<NextAppointment> {
        let date_time = self.next_appointment_date_time?;
        Some(NextAppointment {
            date_time,
            service_name: self.next_appointment_service_name.clone().unwrap_or_default(),
            confirmation_level: self.next_appointment_confirmation_level.unwrap_or_default(),
        })
    }
}

impl Keyed for Ticket {
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

/// `tickets/{ticketId}/serviceItems/{serviceId}`
///
/// Keyed by service id: a ticket holds at most one item per service. The
/// employee and customer fields are copies of the parent's, kept for index
/// queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketServiceItem {
    pub ticket_id: String,
    pub service_id: String,
    pub service_name: String,
    #[serde(default)]
    pub price_text: Option<String>,
    #[serde(default)]
    pub service_note: Option<String>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub appointment_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub confirmation_level: ConfirmationLevel,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub completed_at: Option<DateTime<Utc>>,
    pub assigned_employee_id: String,
    pub customer_phone: String,
    #[serde(default)]
    pub customer_name: Option<String>,
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

/// `tickets/{ticketId}/actions/{actionId}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketAction {
    #[serde(skip)]
    pub id: String,
    pub description: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub due_date_time: DateTime<Utc>,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

impl Keyed for TicketAction {
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}
