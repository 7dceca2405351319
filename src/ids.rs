//! Document identifiers.

use uuid::Uuid;

/// Separator between ticket id and service id in appointment ids
pub const APPOINTMENT_ID_SEPARATOR: &str = "__";

/// Generate a fresh document id (32 lowercase hex chars, no dashes)
pub fn new_doc_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Appointment index id for one service item: `{ticketId}__{serviceId}`
///
/// The id is a pure function of the pair, which is what makes index upserts
/// and deletes idempotent without a read.
pub fn appointment_id(ticket_id: &str, service_id: &str) -> String {
    format!("{ticket_id}{APPOINTMENT_ID_SEPARATOR}{service_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_doc_id_shape() {
        let id = new_doc_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, new_doc_id());
    }

    #[test]
    fn test_appointment_id() {
        assert_eq!(appointment_id("t1", "svc_1"), "t1__svc_1");
    }
}
