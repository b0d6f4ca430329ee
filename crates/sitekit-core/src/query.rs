//! Document-store query model: constraints, ordering, and records.
//!
//! `CollectionQuery` is opaque to the lazy loader — it is handed verbatim to
//! the store, and only the store's implementation evaluates it (via
//! [`apply_query`]).

use std::cmp::Ordering;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Equality/comparison operator applied to a record field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A single field filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBy {
    pub field: String,
    pub direction: OrderDirection,
}

/// A collection name plus filter/order/limit constraints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionQuery {
    pub collection: String,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    #[serde(default)]
    pub order_by: Option<OrderBy>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl CollectionQuery {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            constraints: Vec::new(),
            order_by: None,
            limit: None,
        }
    }
}

/// A stored document: the store's key plus its schemaless field map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// The store key merged into the field map under `"id"`
    pub fn merged(&self) -> Value {
        let mut fields = self.fields.clone();
        fields.insert("id".to_string(), Value::String(self.id.clone()));
        Value::Object(fields)
    }

    /// Deserialize into a caller-supplied shape, id included. Validation of
    /// the untyped field map happens here, at the collaborator boundary.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.merged())
    }
}

/// Total order over JSON values: type rank first (null < bool < number <
/// string < array < object), then value within the type
fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn matches(record: &Record, constraint: &Constraint) -> bool {
    let field_value = record.fields.get(&constraint.field).unwrap_or(&Value::Null);

    match constraint.op {
        FilterOp::Eq => field_value == &constraint.value,
        FilterOp::Ne => field_value != &constraint.value,
        FilterOp::Lt => compare_values(field_value, &constraint.value) == Ordering::Less,
        FilterOp::Le => compare_values(field_value, &constraint.value) != Ordering::Greater,
        FilterOp::Gt => compare_values(field_value, &constraint.value) == Ordering::Greater,
        FilterOp::Ge => compare_values(field_value, &constraint.value) != Ordering::Less,
    }
}

/// Evaluate a query over a record set: constraint filtering, then ordering,
/// then limit. Store-side logic; the loader never calls this.
pub fn apply_query(records: Vec<Record>, query: &CollectionQuery) -> Vec<Record> {
    let mut out: Vec<Record> = records
        .into_iter()
        .filter(|record| query.constraints.iter().all(|c| matches(record, c)))
        .collect();

    if let Some(order) = &query.order_by {
        out.sort_by(|a, b| {
            let av = a.fields.get(&order.field).unwrap_or(&Value::Null);
            let bv = b.fields.get(&order.field).unwrap_or(&Value::Null);
            let ordering = compare_values(av, bv);
            match order.direction {
                OrderDirection::Asc => ordering,
                OrderDirection::Desc => ordering.reverse(),
            }
        });
    }

    if let Some(limit) = query.limit {
        out.truncate(limit);
    }

    out
}
