//! # Salonbook
//!
//! Consistency layer for a small salon operations tracker: service tickets,
//! their scheduled service items, the derived appointment index and an
//! append-only income/expense ledger, all kept in a document store that only
//! offers atomic batches (no transactions over an arbitrary write set).
//!
//! The moving parts:
//!
//! - [`tickets::TicketWriter`] creates, updates and deletes a ticket aggregate
//!   in one atomic batch.
//! - [`sync`] derives the appointment index effects of a ticket's service items.
//! - [`ledger::LedgerWriter`] records completions, bills and manual entries.
//! - [`rebuild::AppointmentRebuilder`] re-derives the appointment index from
//!   source records in size-bounded batches.
//!
//! Every component receives its [`store::DocumentStore`] explicitly; there is
//! no process-wide store handle.

pub mod config;
pub mod error;
pub mod export;
pub mod ids;
pub mod ledger;
pub mod metrics;
pub mod model;
pub mod queries;
pub mod rebuild;
pub mod store;
pub mod sync;
pub mod tickets;
pub mod time;

pub use config::SalonConfig;
pub use error::SalonError;
pub use ledger::LedgerWriter;
pub use rebuild::{AppointmentRebuilder, RebuildReport};
pub use store::memory::MemoryStore;
pub use store::postgres::PgDocumentStore;
pub use store::{DocumentStore, StoreError, WriteBatch};
pub use tickets::TicketWriter;
