//! Collection queries: equality/range filters, one ordering, a limit.

use std::cmp::Ordering;

use serde_json::Value;

use super::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl FilterOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
        }
    }

    fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            FilterOp::Eq => ordering == Ordering::Equal,
            FilterOp::Lt => ordering == Ordering::Less,
            FilterOp::Lte => ordering != Ordering::Greater,
            FilterOp::Gt => ordering == Ordering::Greater,
            FilterOp::Gte => ordering != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    /// A document matches when the field exists and compares as required.
    /// Values of different JSON types never match.
    pub fn matches(&self, doc: &Document) -> bool {
        doc.get(&self.field)
            .and_then(|actual| compare_values(actual, &self.value))
            .is_some_and(|ordering| self.op.accepts(ordering))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// Query over the documents directly inside one collection path
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Eq, value)
    }

    /// Documents lacking `field` are excluded from ordered results
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Filter, order and truncate `docs` the way a store would
    pub fn apply<T>(&self, docs: impl IntoIterator<Item = T>, body: impl Fn(&T) -> &Document) -> Vec<T> {
        let mut matched: Vec<T> = docs
            .into_iter()
            .filter(|doc| self.filters.iter().all(|f| f.matches(body(doc))))
            .collect();

        if let Some((field, direction)) = &self.order_by {
            matched.retain(|doc| body(doc).get(field).is_some_and(|v| !v.is_null()));
            matched.sort_by(|a, b| {
                let ordering = match (body(a).get(field), body(b).get(field)) {
                    (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
                    _ => Ordering::Equal,
                };
                match direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                }
            });
        }

        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }
        matched
    }
}

/// Order two JSON scalars of the same type; `None` for mismatched or composite values
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_compare_values() {
        assert_eq!(compare_values(&json!(1), &json!(2)), Some(Ordering::Less));
        assert_eq!(compare_values(&json!(2.5), &json!(2)), Some(Ordering::Greater));
        assert_eq!(compare_values(&json!("b"), &json!("a")), Some(Ordering::Greater));
        assert_eq!(compare_values(&json!("1"), &json!(1)), None);
        assert_eq!(compare_values(&json!([1]), &json!([1])), None);
    }

    #[test]
    fn test_range_filter_is_half_open() {
        let q = Query::collection("appointments")
            .filter("at", FilterOp::Gte, 10)
            .filter("at", FilterOp::Lt, 20);
        let docs = vec![
            doc(json!({"at": 9})),
            doc(json!({"at": 10})),
            doc(json!({"at": 19})),
            doc(json!({"at": 20})),
            doc(json!({"other": 15})),
        ];
        let hits = q.apply(docs, |d| d);
        let ats: Vec<i64> = hits.iter().map(|d| d["at"].as_i64().unwrap()).collect();
        assert_eq!(ats, vec![10, 19]);
    }

    #[test]
    fn test_order_excludes_missing_and_limits() {
        let q = Query::collection("tickets")
            .order_by("updatedAt", Direction::Desc)
            .limit(2);
        let docs = vec![
            doc(json!({"updatedAt": 1})),
            doc(json!({"updatedAt": 3})),
            doc(json!({"name": "no timestamp"})),
            doc(json!({"updatedAt": 2})),
        ];
        let hits = q.apply(docs, |d| d);
        let order: Vec<i64> = hits.iter().map(|d| d["updatedAt"].as_i64().unwrap()).collect();
        assert_eq!(order, vec![3, 2]);
    }

    #[test]
    fn test_eq_filter_type_strict() {
        let q = Query::collection("appointments").where_eq("ticketId", "t1");
        assert!(q.filters[0].matches(&doc(json!({"ticketId": "t1"}))));
        assert!(!q.filters[0].matches(&doc(json!({"ticketId": "t2"}))));
        assert!(!q.filters[0].matches(&doc(json!({}))));
    }
}
