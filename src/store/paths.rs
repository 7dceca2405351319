//! Collection names and document paths.

use super::DocPath;
use crate::ids::appointment_id;

pub const TICKETS: &str = "tickets";
pub const SERVICE_ITEMS: &str = "serviceItems";
pub const ACTIONS: &str = "actions";
pub const APPOINTMENTS: &str = "appointments";
pub const LEDGER: &str = "ledger";
pub const BILLS: &str = "bills";

pub fn ticket(ticket_id: &str) -> DocPath {
    DocPath::new(TICKETS, ticket_id)
}

pub fn service_items(ticket_id: &str) -> String {
    ticket(ticket_id).sub_collection(SERVICE_ITEMS)
}

pub fn service_item(ticket_id: &str, service_id: &str) -> DocPath {
    ticket(ticket_id).child(SERVICE_ITEMS, service_id)
}

pub fn actions(ticket_id: &str) -> String {
    ticket(ticket_id).sub_collection(ACTIONS)
}

pub fn action(ticket_id: &str, action_id: &str) -> DocPath {
    ticket(ticket_id).child(ACTIONS, action_id)
}

pub fn appointment(ticket_id: &str, service_id: &str) -> DocPath {
    DocPath::new(APPOINTMENTS, appointment_id(ticket_id, service_id))
}

pub fn ledger_entry(entry_id: &str) -> DocPath {
    DocPath::new(LEDGER, entry_id)
}

pub fn bill(bill_id: &str) -> DocPath {
    DocPath::new(BILLS, bill_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        assert_eq!(service_item("t1", "svc_1").to_string(), "tickets/t1/serviceItems/svc_1");
        assert_eq!(action("t1", "a1").to_string(), "tickets/t1/actions/a1");
        assert_eq!(appointment("t1", "svc_1").to_string(), "appointments/t1__svc_1");
        assert_eq!(service_items("t1"), "tickets/t1/serviceItems");
    }
}
