//! Ticket aggregate writes.
//!
//! [`TicketWriter`] turns a desired ticket state (header, service items,
//! actions) into one atomic batch: the header with its next-appointment
//! summary, child creates/updates/deletes diffed against the previously known
//! child ids, and the appointment index effects from [`crate::sync`].

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::{InvalidDuePolicy, SalonConfig};
use crate::error::SalonError;
use crate::ids::new_doc_id;
use crate::model::{ConfirmationLevel, Ticket, TicketAction, TicketHeader, TicketServiceItem};
use crate::store::{commit_batch, paths, to_document, DocumentStore, Query, WriteBatch};
use crate::sync::{self, IndexCounts};
use crate::time::{DateInput, LocalTime};

const CREATED_AT: &str = "createdAt";
const UPDATED_AT: &str = "updatedAt";

/// Desired state of one service item
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceItemDraft {
    pub service_id: String,
    pub service_name: String,
    pub price_text: Option<String>,
    pub service_note: Option<String>,
    /// Unparseable text counts as no appointment
    pub appointment: DateInput,
    pub confirmation_level: ConfirmationLevel,
    pub is_completed: bool,
    /// Kept only while `is_completed`; cleared otherwise
    pub completed_at: Option<DateTime<Utc>>,
}

impl ServiceItemDraft {
    pub fn new(service_id: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            service_name: service_name.into(),
            ..Self::default()
        }
    }

    pub fn at(mut self, appointment: impl Into<DateInput>) -> Self {
        self.appointment = appointment.into();
        self
    }

    pub fn confirmation(mut self, level: ConfirmationLevel) -> Self {
        self.confirmation_level = level;
        self
    }

    pub fn price(mut self, text: impl Into<String>) -> Self {
        self.price_text = Some(text.into());
        self
    }

    pub fn note(mut self, text: impl Into<String>) -> Self {
        self.service_note = Some(text.into());
        self
    }

    pub fn completed(mut self, completed_at: Option<DateTime<Utc>>) -> Self {
        self.is_completed = true;
        self.completed_at = completed_at;
        self
    }
}

/// Desired state of one follow-up action
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionDraft {
    /// Existing action id; `None` creates a new action
    pub id: Option<String>,
    pub description: String,
    pub due: DateInput,
    pub is_completed: bool,
}

impl ActionDraft {
    pub fn new(description: impl Into<String>, due: impl Into<DateInput>) -> Self {
        Self {
            id: None,
            description: description.into(),
            due: due.into(),
            is_completed: false,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn done(mut self) -> Self {
        self.is_completed = true;
        self
    }
}

/// Full desired state of a ticket aggregate
#[derive(Debug, Clone, PartialEq)]
pub struct TicketDraft {
    pub header: TicketHeader,
    pub service_items: Vec<ServiceItemDraft>,
    pub actions: Vec<ActionDraft>,
}

impl TicketDraft {
    pub fn new(header: TicketHeader) -> Self {
        Self {
            header,
            service_items: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn service(mut self, item: ServiceItemDraft) -> Self {
        self.service_items.push(item);
        self
    }

    pub fn action(mut self, action: ActionDraft) -> Self {
        self.actions.push(action);
        self
    }
}

/// Child ids a ticket had before an update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreviousChildren {
    pub service_item_ids: Vec<String>,
    pub action_ids: Vec<String>,
}

/// Result of diffing previous against desired ids
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdDiff {
    /// Desired but not previous, in desired order
    pub create: Vec<String>,
    /// In both, in desired order
    pub update: Vec<String>,
    /// Previous but not desired, in previous order
    pub delete: Vec<String>,
}

/// Split ids into create/update/delete sets; duplicates count once
pub fn diff_ids(previous: &[String], desired: &[String]) -> IdDiff {
    let previous_set: HashSet<&str> = previous.iter().map(String::as_str).collect();
    let desired_set: HashSet<&str> = desired.iter().map(String::as_str).collect();
    let mut diff = IdDiff::default();

    let mut seen = HashSet::new();
    for id in desired {
        if !seen.insert(id.as_str()) {
            continue;
        }
        if previous_set.contains(id.as_str()) {
            diff.update.push(id.clone());
        } else {
            diff.create.push(id.clone());
        }
    }

    let mut seen = HashSet::new();
    for id in previous {
        if seen.insert(id.as_str()) && !desired_set.contains(id.as_str()) {
            diff.delete.push(id.clone());
        }
    }
    diff
}

/// What one ticket mutation wrote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketWrite {
    pub ticket_id: String,
    /// Ids of every action persisted by the call, in draft order
    pub action_ids: Vec<String>,
    pub service_items_removed: Vec<String>,
    pub actions_removed: Vec<String>,
    /// Actions left out for lacking a valid due date
    pub actions_skipped: usize,
    pub index: IndexCounts,
}

/// Creates, updates and deletes ticket aggregates
pub struct TicketWriter<'a> {
    store: &'a dyn DocumentStore,
    clock: LocalTime,
    due_policy: InvalidDuePolicy,
}

struct PreparedAction {
    id: String,
    action: TicketAction,
}

impl<'a> TicketWriter<'a> {
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self {
            store,
            clock: LocalTime::utc(),
            due_policy: InvalidDuePolicy::default(),
        }
    }

    pub fn from_config(store: &'a dyn DocumentStore, config: &SalonConfig) -> Result<Self, SalonError> {
        Ok(Self {
            store,
            clock: config.schedule.local_time()?,
            due_policy: config.schedule.invalid_action_due,
        })
    }

    pub fn with_clock(mut self, clock: LocalTime) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_due_policy(mut self, policy: InvalidDuePolicy) -> Self {
        self.due_policy = policy;
        self
    }

    /// Persist a new ticket with all its children in one batch
    pub fn create(&self, draft: &TicketDraft) -> Result<TicketWrite, SalonError> {
        let ticket_id = new_doc_id();
        let header = normalize_header(&draft.header)?;
        let items = self.prepare_items(&ticket_id, &header, &draft.service_items)?;
        let (actions, skipped) = self.prepare_actions(&draft.actions)?;

        let mut batch = WriteBatch::new();
        let next = sync::next_appointment(&items);
        let ticket = Ticket::for_write(&ticket_id, header, next.as_ref());
        batch
            .set(paths::ticket(&ticket_id), to_document(&ticket)?)
            .stamp(&[CREATED_AT, UPDATED_AT]);

        for item in &items {
            batch
                .set(
                    paths::service_item(&ticket_id, &item.service_id),
                    to_document(item)?,
                )
                .stamp(&[CREATED_AT, UPDATED_AT]);
        }
        let index = sync::apply_effects(&mut batch, sync::plan_index_effects(&items))?;

        let mut action_ids = Vec::with_capacity(actions.len());
        for prepared in &actions {
            batch
                .set(
                    paths::action(&ticket_id, &prepared.id),
                    to_document(&prepared.action)?,
                )
                .stamp(&[CREATED_AT]);
            action_ids.push(prepared.id.clone());
        }

        self.commit(batch, "ticket.create")?;
        log::debug!(
            "created ticket {ticket_id}: {} service item(s), {} action(s)",
            items.len(),
            action_ids.len()
        );

        Ok(TicketWrite {
            ticket_id,
            action_ids,
            actions_skipped: skipped,
            index,
            ..TicketWrite::default()
        })
    }

    /// Rewrite a ticket to `draft`, diffing children against `previous`
    ///
    /// The ticket and every previously known child being updated must exist,
    /// otherwise nothing is written and [`SalonError::NotFound`] is returned.
    pub fn update(
        &self,
        ticket_id: &str,
        draft: &TicketDraft,
        previous: &PreviousChildren,
    ) -> Result<TicketWrite, SalonError> {
        let header = normalize_header(&draft.header)?;
        let items = self.prepare_items(ticket_id, &header, &draft.service_items)?;
        let (actions, skipped) = self.prepare_actions(&draft.actions)?;

        let mut batch = WriteBatch::new();
        let next = sync::next_appointment(&items);
        let ticket = Ticket::for_write(ticket_id, header, next.as_ref());
        batch
            .update(paths::ticket(ticket_id), to_document(&ticket)?)
            .stamp(&[UPDATED_AT]);

        let item_ids: Vec<String> = items.iter().map(|i| i.service_id.clone()).collect();
        let item_diff = diff_ids(&previous.service_item_ids, &item_ids);
        let existing: HashSet<&str> = item_diff.update.iter().map(String::as_str).collect();

        for item in &items {
            let path = paths::service_item(ticket_id, &item.service_id);
            let mut data = to_document(item)?;
            if !item.is_completed {
                data.insert("completedAt".to_string(), Value::Null);
            }
            if existing.contains(item.service_id.as_str()) {
                batch.update(path, data).stamp(&[UPDATED_AT]);
            } else {
                batch.set(path, data).stamp(&[CREATED_AT, UPDATED_AT]);
            }
        }

        for removed in &item_diff.delete {
            batch.delete(paths::service_item(ticket_id, removed));
            batch.delete(paths::appointment(ticket_id, removed));
        }

        let index = sync::apply_effects(&mut batch, sync::plan_index_effects(&items))?;

        let action_ids: Vec<String> = actions.iter().map(|a| a.id.clone()).collect();
        let action_diff = diff_ids(&previous.action_ids, &action_ids);
        let existing: HashSet<&str> = action_diff.update.iter().map(String::as_str).collect();

        for prepared in &actions {
            let path = paths::action(ticket_id, &prepared.id);
            let data = to_document(&prepared.action)?;
            if existing.contains(prepared.id.as_str()) {
                batch.update(path, data);
            } else {
                batch.set(path, data).stamp(&[CREATED_AT]);
            }
        }
        for removed in &action_diff.delete {
            batch.delete(paths::action(ticket_id, removed));
        }

        self.commit(batch, "ticket.update")?;
        log::debug!(
            "updated ticket {ticket_id}: {} item(s) removed, {} action(s) removed",
            item_diff.delete.len(),
            action_diff.delete.len()
        );

        Ok(TicketWrite {
            ticket_id: ticket_id.to_string(),
            action_ids,
            service_items_removed: item_diff.delete,
            actions_removed: action_diff.delete,
            actions_skipped: skipped,
            index,
        })
    }

    /// [`TicketWriter::update`] with the previous child ids read from the store
    pub fn update_from_store(
        &self,
        ticket_id: &str,
        draft: &TicketDraft,
    ) -> Result<TicketWrite, SalonError> {
        let previous = self.previous_children(ticket_id)?;
        self.update(ticket_id, draft, &previous)
    }

    /// Child ids currently stored under a ticket
    pub fn previous_children(&self, ticket_id: &str) -> Result<PreviousChildren, SalonError> {
        let ids = |collection: String| -> Result<Vec<String>, SalonError> {
            Ok(self
                .store
                .query(&Query::collection(collection))?
                .into_iter()
                .map(|snap| snap.id().to_string())
                .collect())
        };
        Ok(PreviousChildren {
            service_item_ids: ids(paths::service_items(ticket_id))?,
            action_ids: ids(paths::actions(ticket_id))?,
        })
    }

    /// Remove a ticket, its service items, its actions and its appointments
    ///
    /// Ledger entries that reference the ticket are financial facts and stay.
    /// Deleting a ticket that no longer exists succeeds and removes any
    /// leftovers.
    pub fn delete(&self, ticket_id: &str) -> Result<TicketWrite, SalonError> {
        let previous = self.previous_children(ticket_id)?;
        let item_diff = diff_ids(&previous.service_item_ids, &[]);
        let action_diff = diff_ids(&previous.action_ids, &[]);

        let mut batch = WriteBatch::new();
        for removed in &item_diff.delete {
            batch.delete(paths::service_item(ticket_id, removed));
            batch.delete(paths::appointment(ticket_id, removed));
        }
        for removed in &action_diff.delete {
            batch.delete(paths::action(ticket_id, removed));
        }

        // Index records whose service item is already gone
        let known: HashSet<&str> = item_diff.delete.iter().map(String::as_str).collect();
        let stray = self.store.query(
            &Query::collection(paths::APPOINTMENTS).where_eq("ticketId", ticket_id),
        )?;
        let mut index = IndexCounts {
            deleted: item_diff.delete.len(),
            ..IndexCounts::default()
        };
        for snap in stray {
            let service_id = snap
                .get("serviceId")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if !known.contains(service_id) {
                batch.delete(snap.path.clone());
                index.deleted += 1;
            }
        }

        batch.delete(paths::ticket(ticket_id));
        self.commit(batch, "ticket.delete")?;
        log::info!(
            "deleted ticket {ticket_id} with {} service item(s) and {} action(s)",
            item_diff.delete.len(),
            action_diff.delete.len()
        );

        Ok(TicketWrite {
            ticket_id: ticket_id.to_string(),
            service_items_removed: item_diff.delete,
            actions_removed: action_diff.delete,
            index,
            ..TicketWrite::default()
        })
    }

    fn commit(&self, batch: WriteBatch, label: &str) -> Result<(), SalonError> {
        let max = self.store.max_batch_ops();
        if batch.len() > max {
            return Err(SalonError::validation(format!(
                "Ticket has too many changes to save at once ({} writes, limit {max}).",
                batch.len()
            )));
        }
        commit_batch(self.store, batch, label)?;
        Ok(())
    }

    fn prepare_items(
        &self,
        ticket_id: &str,
        header: &TicketHeader,
        drafts: &[ServiceItemDraft],
    ) -> Result<Vec<TicketServiceItem>, SalonError> {
        let mut seen = HashSet::new();
        let mut items = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let service_id = draft.service_id.trim();
            if service_id.is_empty() {
                return Err(SalonError::validation("Every service item needs a service."));
            }
            if !seen.insert(service_id.to_string()) {
                return Err(SalonError::validation(format!(
                    "Service {} is listed more than once.",
                    display_name(draft)
                )));
            }

            items.push(TicketServiceItem {
                ticket_id: ticket_id.to_string(),
                service_id: service_id.to_string(),
                service_name: draft.service_name.trim().to_string(),
                price_text: normalize_optional(draft.price_text.as_deref()),
                service_note: normalize_optional(draft.service_note.as_deref()),
                appointment_date_time: self.clock.resolve(&draft.appointment),
                confirmation_level: draft.confirmation_level,
                is_completed: draft.is_completed,
                completed_at: draft.completed_at.filter(|_| draft.is_completed),
                assigned_employee_id: header.assigned_employee_id.clone(),
                customer_phone: header.customer_phone.clone(),
                customer_name: header.customer_name.clone(),
                created_at: None,
                updated_at: None,
            });
        }
        Ok(items)
    }

    fn prepare_actions(&self, drafts: &[ActionDraft]) -> Result<(Vec<PreparedAction>, usize), SalonError> {
        let mut seen = HashSet::new();
        let mut prepared = Vec::with_capacity(drafts.len());
        let mut skipped = 0;

        for draft in drafts {
            let description = draft.description.trim();
            let Some(due_date_time) = self.clock.resolve(&draft.due) else {
                match self.due_policy {
                    InvalidDuePolicy::Skip => {
                        log::warn!("skipping action {description:?}: missing or invalid due date");
                        skipped += 1;
                        continue;
                    }
                    InvalidDuePolicy::Reject => {
                        return Err(SalonError::validation(format!(
                            "Action \"{description}\" needs a valid due date."
                        )));
                    }
                }
            };

            let id = draft
                .id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map_or_else(new_doc_id, str::to_string);
            if !seen.insert(id.clone()) {
                return Err(SalonError::validation(format!(
                    "Action {id} is listed more than once."
                )));
            }

            prepared.push(PreparedAction {
                action: TicketAction {
                    id: id.clone(),
                    description: description.to_string(),
                    due_date_time,
                    is_completed: draft.is_completed,
                    created_at: None,
                },
                id,
            });
        }
        Ok((prepared, skipped))
    }
}

fn display_name(draft: &ServiceItemDraft) -> &str {
    let name = draft.service_name.trim();
    if name.is_empty() {
        draft.service_id.trim()
    } else {
        name
    }
}

/// Trim; blank becomes `None`
pub fn normalize_optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn normalize_header(header: &TicketHeader) -> Result<TicketHeader, SalonError> {
    let customer_phone = header.customer_phone.trim();
    if customer_phone.is_empty() {
        return Err(SalonError::validation("Customer phone is required."));
    }
    let assigned_employee_id = header.assigned_employee_id.trim();
    if assigned_employee_id.is_empty() {
        return Err(SalonError::validation("Assigned employee is required."));
    }
    Ok(TicketHeader {
        customer_phone: customer_phone.to_string(),
        customer_name: normalize_optional(header.customer_name.as_deref()),
        status: header.status,
        assigned_employee_id: assigned_employee_id.to_string(),
        overall_note: normalize_optional(header.overall_note.as_deref()),
    })
}
