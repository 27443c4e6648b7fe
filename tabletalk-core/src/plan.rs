//! Typed plans and the write validator.
//!
//! Raw planner JSON is decoded into a closed set of cases at this boundary:
//! a read, a write, or unsure. Anything that does not fit one of the known
//! shapes falls out as unsure; there is no stringly-typed branching past
//! this point.

use crate::error::CoreError;
use crate::rules::WriteRules;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A validated, normalized mutation ready for execution.
///
/// Serialized form round-trips through the confirmation boundary and back
/// through [`validate_write`], so the wire shape matches what the planner is
/// asked to produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Operation {
    Insert {
        table: String,
        values: Map<String, Value>,
    },
    Update {
        table: String,
        set: Map<String, Value>,
        where_equals: Map<String, Value>,
    },
}

impl Operation {
    pub fn table(&self) -> &str {
        match self {
            Operation::Insert { table, .. } => table,
            Operation::Update { table, .. } => table,
        }
    }
}

/// Structured intent recovered from planner output
#[derive(Debug, Clone)]
pub enum Plan {
    Read {
        sql: String,
        reason: String,
    },
    /// Write intent; the operation stays untyped until [`validate_write`]
    Write {
        operation: Value,
        reason: String,
    },
    Unsure {
        reason: String,
    },
}

/// Sort an extracted JSON payload into one of the known plan shapes.
/// Unknown or missing intents are unsure, not errors.
pub fn parse_plan(payload: &Map<String, Value>) -> Plan {
    let reason = payload
        .get("reason")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let intent = payload
        .get("intent")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_lowercase();

    match intent.as_str() {
        "read" => Plan::Read {
            sql: payload
                .get("sql")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            reason,
        },
        "write" => Plan::Write {
            operation: payload.get("operation").cloned().unwrap_or(Value::Null),
            reason,
        },
        _ => Plan::Unsure { reason },
    }
}

/// Validate an untrusted operation payload against the whitelist.
///
/// No type coercion and no SQL-level validation happens here; values pass
/// through as opaque scalars for the executor to bind. The non-empty
/// `where_equals` requirement is what makes "update all rows" structurally
/// impossible.
pub fn validate_write(op: &Value, rules: &WriteRules) -> Result<Operation, CoreError> {
    let op = op
        .as_object()
        .ok_or_else(|| CoreError::invalid_operation("Invalid operation payload"))?;

    let op_type = op.get("type").and_then(Value::as_str).unwrap_or_default();
    let table = op.get("table").and_then(Value::as_str).unwrap_or_default();
    if op_type.is_empty() || table.is_empty() {
        return Err(CoreError::invalid_operation("Invalid operation payload"));
    }

    let rule = rules
        .get(table)
        .ok_or_else(|| CoreError::invalid_operation(format!("Table not allowed: {}", table)))?;

    match op_type.to_lowercase().as_str() {
        "insert" => {
            let values = non_empty_object(op.get("values"))
                .ok_or_else(|| CoreError::invalid_operation("Insert values missing"))?;
            for column in values.keys() {
                if !rule.allows_insert(column) {
                    return Err(CoreError::invalid_operation(format!(
                        "Column not allowed for insert: {}",
                        column
                    )));
                }
            }
            Ok(Operation::Insert {
                table: table.to_string(),
                values: values.clone(),
            })
        }
        "update" => {
            let set = non_empty_object(op.get("set"))
                .ok_or_else(|| CoreError::invalid_operation("Update set missing"))?;
            for column in set.keys() {
                if !rule.allows_update(column) {
                    return Err(CoreError::invalid_operation(format!(
                        "Column not allowed for update: {}",
                        column
                    )));
                }
            }
            let where_equals = non_empty_object(op.get("where_equals")).ok_or_else(|| {
                CoreError::invalid_operation("Update must include where_equals")
            })?;
            Ok(Operation::Update {
                table: table.to_string(),
                set: set.clone(),
                where_equals: where_equals.clone(),
            })
        }
        _ => Err(CoreError::invalid_operation("Write type not permitted")),
    }
}

fn non_empty_object(value: Option<&Value>) -> Option<&Map<String, Value>> {
    value.and_then(Value::as_object).filter(|m| !m.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::default_rules;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_parse_plan_read() {
        let payload = as_map(json!({"intent": "read", "sql": "SELECT 1", "reason": "count"}));
        match parse_plan(&payload) {
            Plan::Read { sql, reason } => {
                assert_eq!(sql, "SELECT 1");
                assert_eq!(reason, "count");
            }
            other => panic!("expected read plan, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_plan_unknown_intent_is_unsure() {
        let payload = as_map(json!({"intent": "delete_everything"}));
        assert!(matches!(parse_plan(&payload), Plan::Unsure { .. }));

        let payload = as_map(json!({"sql": "SELECT 1"}));
        assert!(matches!(parse_plan(&payload), Plan::Unsure { .. }));
    }

    #[test]
    fn test_parse_plan_intent_is_case_insensitive() {
        let payload = as_map(json!({"intent": "READ", "sql": "SELECT 1"}));
        assert!(matches!(parse_plan(&payload), Plan::Read { .. }));
    }

    #[test]
    fn test_validate_insert_with_allowed_columns() {
        let rules = default_rules();
        let op = json!({
            "type": "insert",
            "table": "products",
            "values": {"name": "Widget", "sku": "W-1"}
        });
        match validate_write(&op, &rules).unwrap() {
            Operation::Insert { table, values } => {
                assert_eq!(table, "products");
                assert_eq!(values.len(), 2);
                // insertion order survives validation
                let keys: Vec<_> = values.keys().collect();
                assert_eq!(keys, vec!["name", "sku"]);
            }
            other => panic!("expected insert, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_insert_rejects_unexpected_column() {
        let rules = default_rules();
        let op = json!({
            "type": "insert",
            "table": "products",
            "values": {"name": "Widget", "id": 999}
        });
        match validate_write(&op, &rules) {
            Err(CoreError::InvalidOperation { message }) => {
                assert!(message.contains("Column not allowed for insert: id"));
            }
            other => panic!("expected InvalidOperation, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_insert_rejects_empty_values() {
        let rules = default_rules();
        let op = json!({"type": "insert", "table": "products", "values": {}});
        assert!(validate_write(&op, &rules).is_err());

        let op = json!({"type": "insert", "table": "products"});
        assert!(validate_write(&op, &rules).is_err());
    }

    #[test]
    fn test_validate_update_requires_where_equals() {
        let rules = default_rules();
        let op = json!({
            "type": "update",
            "table": "products",
            "set": {"price": 12.5}
        });
        match validate_write(&op, &rules) {
            Err(CoreError::InvalidOperation { message }) => {
                assert!(message.contains("where_equals"));
            }
            other => panic!("expected InvalidOperation, got {:?}", other),
        }

        let op = json!({
            "type": "update",
            "table": "products",
            "set": {"price": 12.5},
            "where_equals": {}
        });
        assert!(validate_write(&op, &rules).is_err());
    }

    #[test]
    fn test_validate_update_normalizes() {
        let rules = default_rules();
        let op = json!({
            "type": "update",
            "table": "products",
            "set": {"price": 12.5},
            "where_equals": {"sku": "ABC"}
        });
        match validate_write(&op, &rules).unwrap() {
            Operation::Update {
                table,
                set,
                where_equals,
            } => {
                assert_eq!(table, "products");
                assert_eq!(set.get("price"), Some(&json!(12.5)));
                assert_eq!(where_equals.get("sku"), Some(&json!("ABC")));
            }
            other => panic!("expected update, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_unlisted_table() {
        let rules = default_rules();
        let op = json!({
            "type": "insert",
            "table": "users",
            "values": {"name": "eve"}
        });
        match validate_write(&op, &rules) {
            Err(CoreError::InvalidOperation { message }) => {
                assert!(message.contains("Table not allowed: users"));
            }
            other => panic!("expected InvalidOperation, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_delete_type() {
        let rules = default_rules();
        let op = json!({
            "type": "delete",
            "table": "products",
            "where_equals": {"sku": "ABC"}
        });
        match validate_write(&op, &rules) {
            Err(CoreError::InvalidOperation { message }) => {
                assert!(message.contains("Write type not permitted"));
            }
            other => panic!("expected InvalidOperation, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_missing_type_or_table() {
        let rules = default_rules();
        assert!(validate_write(&json!({"table": "products"}), &rules).is_err());
        assert!(validate_write(&json!({"type": "insert"}), &rules).is_err());
        assert!(validate_write(&json!(null), &rules).is_err());
        assert!(validate_write(&json!("insert"), &rules).is_err());
    }

    #[test]
    fn test_validated_operation_revalidates_after_round_trip() {
        // the confirmation boundary serializes the operation and validates it
        // again on the way back in
        let rules = default_rules();
        let op = json!({
            "type": "update",
            "table": "products",
            "set": {"stock": 7},
            "where_equals": {"sku": "ABC"}
        });
        let validated = validate_write(&op, &rules).unwrap();
        let echoed = serde_json::to_value(&validated).unwrap();
        let revalidated = validate_write(&echoed, &rules).unwrap();
        assert_eq!(validated, revalidated);
    }
}
