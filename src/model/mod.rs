//! Stored document shapes.
//!
//! Field names are camelCase on the wire, timestamps are epoch milliseconds
//! and money is a decimal string. Server-stamped timestamps (`createdAt`,
//! `updatedAt`, `completedAt`) are `None` on values built for writing and are
//! skipped when serialized; the store fills them at commit time.

pub mod appointment;
pub mod ledger;
pub mod ticket;

pub use appointment::Appointment;
pub use ledger::{Bill, LedgerEntry, LedgerKind};
pub use ticket::{
    ConfirmationLevel, NextAppointment, Ticket, TicketAction, TicketHeader, TicketServiceItem,
    TicketStatus,
};
