//! Parameterized execution of validated insert and update operations.
//!
//! Identifiers cannot be bound as parameters, so table and column names are
//! escaped by doubling backtick delimiters. Every value is bound, never
//! interpolated. The operations arriving here have already passed
//! [`crate::plan::validate_write`]; this module only handles the SQL shape
//! and the engine's answers.

use crate::error::CoreError;
use regex::Regex;
use rusqlite::{params_from_iter, Connection, Row};
use serde_json::{Map, Number, Value};
use tracing::debug;

/// Result of an insert: the engine-assigned id, plus the full row when the
/// best-effort re-fetch succeeded
#[derive(Debug, Clone)]
pub struct InsertOutcome {
    pub inserted_id: i64,
    pub row: Option<Map<String, Value>>,
}

/// Result of an update. `affected_rows` of 0 is a valid outcome meaning the
/// predicate matched nothing.
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub affected_rows: usize,
}

/// Escape an identifier for inline use, doubling backtick delimiters
pub(crate) fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Execute a validated insert and best-effort re-fetch the new row.
/// A failed re-fetch does not fail the insert; the id alone is returned.
pub fn exec_insert(
    conn: &Connection,
    table: &str,
    values: &Map<String, Value>,
) -> Result<InsertOutcome, CoreError> {
    let column_list = values
        .keys()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; values.len()].join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        column_list,
        placeholders
    );

    let params = values
        .iter()
        .map(|(column, value)| bind_value(column, value))
        .collect::<Result<Vec<_>, _>>()?;

    conn.execute(&sql, params_from_iter(params))
        .map_err(|e| friendly_write_error(e, values))?;

    let inserted_id = conn.last_insert_rowid();
    let row = fetch_inserted_row(conn, table, inserted_id);
    if row.is_none() {
        debug!(table, inserted_id, "Inserted row could not be re-fetched");
    }

    Ok(InsertOutcome { inserted_id, row })
}

/// Execute a validated update and report the engine's affected-row count
/// verbatim
pub fn exec_update(
    conn: &Connection,
    table: &str,
    set: &Map<String, Value>,
    where_equals: &Map<String, Value>,
) -> Result<UpdateOutcome, CoreError> {
    let set_expr = set
        .keys()
        .map(|c| format!("{} = ?", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(", ");
    let where_expr = where_equals
        .keys()
        .map(|c| format!("{} = ?", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(" AND ");
    let sql = format!(
        "UPDATE {} SET {} WHERE {}",
        quote_ident(table),
        set_expr,
        where_expr
    );

    let params = set
        .iter()
        .chain(where_equals.iter())
        .map(|(column, value)| bind_value(column, value))
        .collect::<Result<Vec<_>, _>>()?;

    let affected_rows = conn
        .execute(&sql, params_from_iter(params))
        .map_err(|e| friendly_write_error(e, set))?;

    Ok(UpdateOutcome { affected_rows })
}

fn fetch_inserted_row(conn: &Connection, table: &str, id: i64) -> Option<Map<String, Value>> {
    let sql = format!("SELECT * FROM {} WHERE rowid = ?", quote_ident(table));
    let mut stmt = conn.prepare(&sql).ok()?;
    let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    let mut rows = stmt.query([id]).ok()?;
    let row = rows.next().ok()??;
    row_to_map(row, &names).ok()
}

pub(crate) fn row_to_map(row: &Row, names: &[String]) -> Result<Map<String, Value>, rusqlite::Error> {
    let mut map = Map::new();
    for (idx, name) in names.iter().enumerate() {
        map.insert(name.clone(), column_value(row, idx)?);
    }
    Ok(map)
}

pub(crate) fn column_value(row: &Row, idx: usize) -> Result<Value, rusqlite::Error> {
    use rusqlite::types::ValueRef;
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i.into()),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
    })
}

/// Values are opaque scalars; anything structured was never promised to work
fn bind_value(column: &str, value: &Value) -> Result<rusqlite::types::Value, CoreError> {
    use rusqlite::types::Value as SqlValue;
    match value {
        Value::Null => Ok(SqlValue::Null),
        Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(SqlValue::Integer(i))
            } else if let Some(f) = n.as_f64() {
                Ok(SqlValue::Real(f))
            } else {
                Err(CoreError::execution(format!(
                    "Unsupported numeric value for column {}",
                    column
                )))
            }
        }
        Value::String(s) => Ok(SqlValue::Text(s.clone())),
        Value::Array(_) | Value::Object(_) => Err(CoreError::execution(format!(
            "Non-scalar value for column {}",
            column
        ))),
    }
}

/// Rewrite unique-constraint violations into a message a user can act on.
/// SQLite names the column but not the value; the value comes from the
/// attempted payload.
fn friendly_write_error(e: rusqlite::Error, attempted: &Map<String, Value>) -> CoreError {
    let message = e.to_string();
    let unique = Regex::new(r"UNIQUE constraint failed: (\w+)\.(\w+)").unwrap();
    if let Some(caps) = unique.captures(&message) {
        let column = &caps[2];
        let value = attempted
            .get(column)
            .map(render_scalar)
            .unwrap_or_default();
        return CoreError::execution(format!(
            "A record with unique {}='{}' already exists; consider using an update instead",
            column, value
        ));
    }
    CoreError::execution(message)
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
