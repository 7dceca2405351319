//! SQL for the document table.

use may_postgres::types::ToSql;
use serde_json::Value;

use crate::store::Query;

pub const TABLE: &str = "salonbook_documents";

pub const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS salonbook_documents (
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    data JSONB NOT NULL,
    PRIMARY KEY (collection, id)
)";

pub const SERVER_TIME_MS: &str = "SELECT (EXTRACT(EPOCH FROM now()) * 1000)::BIGINT";

pub const SELECT_ONE: &str =
    "SELECT data FROM salonbook_documents WHERE collection = $1 AND id = $2";

pub const UPSERT_REPLACE: &str = "INSERT INTO salonbook_documents (collection, id, data) \
     VALUES ($1, $2, $3) \
     ON CONFLICT (collection, id) DO UPDATE SET data = EXCLUDED.data";

pub const UPSERT_MERGE: &str = "INSERT INTO salonbook_documents (collection, id, data) \
     VALUES ($1, $2, $3) \
     ON CONFLICT (collection, id) DO UPDATE SET data = salonbook_documents.data || EXCLUDED.data";

pub const UPDATE_MERGE: &str =
    "UPDATE salonbook_documents SET data = data || $3 WHERE collection = $1 AND id = $2";

pub const DELETE_ONE: &str = "DELETE FROM salonbook_documents WHERE collection = $1 AND id = $2";

pub type Params = Vec<Box<dyn ToSql + Sync>>;

/// `SELECT id, data` for `query` with its bound parameters
///
/// Filters compare `data -> field` as JSONB and require the stored value to
/// have the same JSON type as the operand. The ordered field must be present
/// and non-null.
pub fn select(query: &Query) -> (String, Params) {
    let mut sql = format!("SELECT id, data FROM {TABLE} WHERE collection = $1");
    let mut params: Params = vec![Box::new(query.collection.clone())];

    for filter in &query.filters {
        params.push(Box::new(filter.field.clone()));
        let field = params.len();
        params.push(Box::new(filter.value.clone()));
        let value = params.len();
        sql.push_str(&format!(
            " AND jsonb_typeof(data -> ${field}) = jsonb_typeof(${value}::jsonb) \
             AND data -> ${field} {} ${value}::jsonb",
            filter.op.as_sql()
        ));
    }

    match &query.order_by {
        Some((field, direction)) => {
            params.push(Box::new(field.clone()));
            let n = params.len();
            sql.push_str(&format!(
                " AND jsonb_exists(data, ${n}) AND data -> ${n} <> 'null'::jsonb \
                 ORDER BY data -> ${n} {}, id",
                direction.as_sql()
            ));
        }
        None => sql.push_str(" ORDER BY id"),
    }

    if let Some(limit) = query.limit {
        params.push(Box::new(i64::try_from(limit).unwrap_or(i64::MAX)));
        sql.push_str(&format!(" LIMIT ${}", params.len()));
    }

    (sql, params)
}

/// Borrow boxed parameters the way the executor takes them
pub fn bind(params: &Params) -> Vec<&dyn ToSql> {
    params.iter().map(|p| p.as_ref() as &dyn ToSql).collect()
}

/// Document body as a JSONB parameter
pub fn jsonb(data: &crate::store::Document) -> Value {
    Value::Object(data.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Direction, FilterOp};

    #[test]
    fn test_select_plain_collection() {
        let (sql, params) = select(&Query::collection("tickets"));
        assert!(sql.ends_with("WHERE collection = $1 ORDER BY id"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_select_filters_order_limit() {
        let query = Query::collection("appointments")
            .filter("appointmentDateTime", FilterOp::Gte, 10)
            .filter("appointmentDateTime", FilterOp::Lt, 20)
            .order_by("appointmentDateTime", Direction::Asc)
            .limit(50);
        let (sql, params) = select(&query);

        assert!(sql.contains("data -> $2 >= $3::jsonb"));
        assert!(sql.contains("data -> $4 < $5::jsonb"));
        assert!(sql.contains("jsonb_exists(data, $6)"));
        assert!(sql.contains("ORDER BY data -> $6 ASC, id"));
        assert!(sql.ends_with("LIMIT $7"));
        assert_eq!(params.len(), 7);
    }
}
