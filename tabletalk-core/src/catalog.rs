//! Schema introspection for the whitelisted tables.
//!
//! The catalog produces two things: structured [`ColumnMeta`] per table, and a
//! deterministic textual rendering handed to the planner as grounding. Both
//! are rebuilt per request and never mutated once built. Introspection is not
//! safety-critical (the whitelist is), so callers degrade to a visible
//! placeholder when loading fails instead of aborting the request.

use crate::error::CoreError;
use crate::executor::quote_ident;
use crate::rules::WriteRules;
use rusqlite::Connection;
use std::collections::BTreeMap;
use tracing::debug;

/// What kind of key constraint a column participates in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    None,
    Primary,
    Unique,
}

/// Column metadata as reported by the engine
#[derive(Debug, Clone)]
pub struct ColumnMeta {
    pub name: String,
    pub sql_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub key: KeyKind,
    pub extra: String,
}

/// Observed min/max of a column, used as a grounding hint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coverage {
    pub min: String,
    pub max: String,
}

pub type SchemaMap = BTreeMap<String, Vec<ColumnMeta>>;

/// Create the demo `products` table when it does not exist yet.
/// Failures are ignored; the table may already exist with a different shape.
pub fn ensure_products_table(conn: &Connection) {
    let sql = "CREATE TABLE IF NOT EXISTS products (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        sku TEXT NOT NULL UNIQUE,
        price REAL NOT NULL DEFAULT 0,
        description TEXT,
        category TEXT NOT NULL DEFAULT 'general',
        stock INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )";
    if let Err(e) = conn.execute_batch(sql) {
        debug!(error = %e, "ensure_products_table skipped");
    }
}

/// Introspect column metadata for the whitelisted tables and render the
/// grounding text. Tables that do not exist are silently absent from the
/// result.
pub fn load_schema(
    conn: &Connection,
    tables: &WriteRules,
) -> Result<(SchemaMap, String), CoreError> {
    let mut schema = SchemaMap::new();

    for table in tables.keys() {
        let columns = load_columns(conn, table)
            .map_err(|e| CoreError::schema_load(format!("{}: {}", table, e)))?;
        if !columns.is_empty() {
            schema.insert(table.clone(), columns);
        }
    }

    let text = render_schema_text(&schema);
    Ok((schema, text))
}

fn load_columns(conn: &Connection, table: &str) -> Result<Vec<ColumnMeta>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let mut columns = stmt
        .query_map([], |row| {
            let notnull: i64 = row.get(3)?;
            let pk: i64 = row.get(5)?;
            let sql_type: String = row.get(2)?;
            // INTEGER PRIMARY KEY columns alias the rowid and auto-assign ids
            let extra = if pk > 0 && sql_type.to_uppercase().contains("INT") {
                "auto_increment".to_string()
            } else {
                String::new()
            };
            Ok(ColumnMeta {
                name: row.get(1)?,
                sql_type,
                nullable: notnull == 0,
                default: row.get(4)?,
                key: if pk > 0 { KeyKind::Primary } else { KeyKind::None },
                extra,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    if columns.is_empty() {
        return Ok(columns);
    }

    for unique_column in unique_columns(conn, table)? {
        if let Some(column) = columns
            .iter_mut()
            .find(|c| c.name == unique_column && c.key == KeyKind::None)
        {
            column.key = KeyKind::Unique;
        }
    }

    Ok(columns)
}

/// Columns covered by a single-column unique index (multi-column unique
/// constraints are not a per-column property and are left unmarked)
fn unique_columns(conn: &Connection, table: &str) -> Result<Vec<String>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!("PRAGMA index_list({})", quote_ident(table)))?;
    let indexes = stmt
        .query_map([], |row| {
            let name: String = row.get(1)?;
            let unique: i64 = row.get(2)?;
            let origin: String = row.get(3)?;
            Ok((name, unique == 1 && origin != "pk"))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut result = Vec::new();
    for (index_name, relevant) in indexes {
        if !relevant {
            continue;
        }
        let mut info = conn.prepare(&format!("PRAGMA index_info({})", quote_ident(&index_name)))?;
        let cols = info
            .query_map([], |row| row.get::<_, String>(2))?
            .collect::<Result<Vec<_>, _>>()?;
        if cols.len() == 1 {
            result.push(cols.into_iter().next().unwrap_or_default());
        }
    }
    Ok(result)
}

fn render_schema_text(schema: &SchemaMap) -> String {
    schema
        .iter()
        .map(|(table, columns)| {
            let column_lines = columns
                .iter()
                .map(|c| {
                    let mut bits = vec![format!("{} {}", c.name, c.sql_type)];
                    bits.push(if c.nullable { "NULL" } else { "NOT NULL" }.to_string());
                    if let Some(default) = &c.default {
                        bits.push(format!("DEFAULT {}", default));
                    }
                    match c.key {
                        KeyKind::Primary => bits.push("PRIMARY KEY".to_string()),
                        KeyKind::Unique => bits.push("UNIQUE".to_string()),
                        KeyKind::None => {}
                    }
                    if !c.extra.is_empty() {
                        bits.push(c.extra.clone());
                    }
                    bits.join(" ")
                })
                .collect::<Vec<_>>()
                .join("\n- ");
            format!("Table '{}' columns:\n- {}", table, column_lines)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Min/max of a column, advisory only: `None` covers the empty table, the
/// missing table, and every failure mode alike.
pub fn coverage(conn: &Connection, table: &str, date_column: &str) -> Option<Coverage> {
    let sql = format!(
        "SELECT MIN({col}) AS min_val, MAX({col}) AS max_val FROM {table}",
        col = quote_ident(date_column),
        table = quote_ident(table),
    );
    let result = conn.query_row(&sql, [], |row| {
        let min: rusqlite::types::Value = row.get(0)?;
        let max: rusqlite::types::Value = row.get(1)?;
        Ok((value_to_text(min), value_to_text(max)))
    });
    match result {
        Ok((Some(min), Some(max))) => Some(Coverage { min, max }),
        _ => None,
    }
}

fn value_to_text(value: rusqlite::types::Value) -> Option<String> {
    use rusqlite::types::Value;
    match value {
        Value::Null => None,
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Text(s) => Some(s),
        Value::Blob(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::default_rules;

    fn demo_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        ensure_products_table(&conn);
        conn
    }

    #[test]
    fn test_ensure_products_table_is_idempotent() {
        let conn = demo_conn();
        ensure_products_table(&conn);
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='products'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_load_schema_renders_documented_format() {
        let conn = demo_conn();
        let (schema, text) = load_schema(&conn, &default_rules()).unwrap();

        assert!(schema.contains_key("products"));
        // sales is whitelisted but absent from the database
        assert!(!schema.contains_key("sales"));

        assert!(text.starts_with("Table 'products' columns:"));
        assert!(text.contains("- id INTEGER NULL PRIMARY KEY auto_increment"));
        assert!(text.contains("- sku TEXT NOT NULL UNIQUE"));
        assert!(text.contains("- category TEXT NOT NULL DEFAULT 'general'"));
        assert!(text.contains("- description TEXT NULL"));
    }

    #[test]
    fn test_load_schema_is_deterministic() {
        let conn = demo_conn();
        let rules = default_rules();
        let (_, first) = load_schema(&conn, &rules).unwrap();
        let (_, second) = load_schema(&conn, &rules).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_coverage_empty_table_is_none() {
        let conn = demo_conn();
        assert_eq!(coverage(&conn, "products", "created_at"), None);
    }

    #[test]
    fn test_coverage_missing_table_is_none() {
        let conn = demo_conn();
        assert_eq!(coverage(&conn, "sales", "sold_at"), None);
    }

    #[test]
    fn test_coverage_reports_min_and_max() {
        let conn = demo_conn();
        conn.execute_batch(
            "INSERT INTO products (name, sku, created_at) VALUES ('a', 'A-1', '2024-01-02');
             INSERT INTO products (name, sku, created_at) VALUES ('b', 'B-1', '2024-06-30');",
        )
        .unwrap();
        let cov = coverage(&conn, "products", "created_at").unwrap();
        assert_eq!(cov.min, "2024-01-02");
        assert_eq!(cov.max, "2024-06-30");
    }
}
