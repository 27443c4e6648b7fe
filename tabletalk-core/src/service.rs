//! Request orchestration: natural-language text in, a safe outcome out.
//!
//! The assistant wires the planner, the session store, and the configuration
//! together and drives the control flow: grounding → plan → guard/validate →
//! execute. Every failure along the way is recoverable; the caller always
//! gets either an [`Outcome`] or a [`CoreError`] it can render, never a
//! crash.
//!
//! The database lock is only ever taken around synchronous statement
//! execution, never across a planner await.

use crate::catalog::{self, SchemaMap};
use crate::config::AppConfig;
use crate::error::CoreError;
use crate::executor::{self, exec_insert, exec_update, InsertOutcome, UpdateOutcome};
use crate::extract::extract_json_payload;
use crate::pagination::PageRequest;
use crate::plan::{parse_plan, validate_write, Operation, Plan};
use crate::read_guard::{guard_select, strip_row_bounds, wrap_count, wrap_page};
use crate::rules::rules_summary;
use crate::session::SessionStore;
use crate::DbConnection;
use rusqlite::Connection;
use serde_json::{Map, Value};
use std::sync::{Arc, MutexGuard};
use tabletalk_llm_sdk::{ChatMessage, Planner};
use tracing::{info, warn};

/// Schema context handed to the planner, plus the advisory coverage hint
/// reused when a read comes back empty
pub struct Grounding {
    pub schema: SchemaMap,
    pub text: String,
    pub coverage_hint: Option<String>,
}

/// What a write actually did
#[derive(Debug)]
pub enum WriteResult {
    Inserted(InsertOutcome),
    Updated(UpdateOutcome),
}

/// One page of read results
#[derive(Debug)]
pub struct ReadOutcome {
    pub rows: Vec<Map<String, Value>>,
    /// Best-effort total row count of the base query; `None` when the count
    /// query failed
    pub total: Option<u64>,
    pub page: u64,
    pub page_size: usize,
    /// The exact statement that was executed, for provenance display
    pub sql: String,
    pub reason: String,
    pub feedback: String,
}

/// The result of one request against the assistant
#[derive(Debug)]
pub enum Outcome {
    Read(ReadOutcome),
    /// A validated write awaiting explicit confirmation; nothing was executed
    ProposedWrite {
        operation: Operation,
        reason: String,
        feedback: String,
    },
    WriteApplied {
        result: WriteResult,
        operation: Operation,
        feedback: String,
    },
    /// No usable plan, or the planner declared itself unsure
    Unsure { feedback: String },
    /// A page was requested but no read has been accepted in this session
    NothingToPaginate { feedback: String },
}

pub struct Assistant {
    planner: Arc<dyn Planner>,
    sessions: Arc<dyn SessionStore>,
    config: Arc<AppConfig>,
}

fn lock(db: &DbConnection) -> MutexGuard<'_, Connection> {
    db.lock().unwrap_or_else(|e| e.into_inner())
}

impl Assistant {
    pub fn new(
        planner: Arc<dyn Planner>,
        sessions: Arc<dyn SessionStore>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            planner,
            sessions,
            config,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Clamp raw caller-supplied paging values against the configured default
    pub fn page_request(&self, page: i64, page_size: i64) -> PageRequest {
        PageRequest::new(page, page_size, self.config.limits.page_size)
    }

    /// Build the schema grounding block. Fails open: introspection errors
    /// degrade to a visible placeholder instead of aborting the request.
    pub fn build_grounding(&self, conn: &Connection) -> Grounding {
        if self.config.tables.contains_key("products") {
            catalog::ensure_products_table(conn);
        }

        match catalog::load_schema(conn, &self.config.tables) {
            Ok((schema, mut text)) => {
                let mut coverage_hint = None;
                let mut hints = Vec::new();
                if self.config.tables.contains_key("sales") {
                    if let Some(cov) = catalog::coverage(conn, "sales", "sold_at") {
                        let hint = format!(
                            "Data coverage for 'sales' (sold_at): {} → {}",
                            cov.min, cov.max
                        );
                        coverage_hint = Some(hint.clone());
                        hints.push(hint);
                    }
                }
                if self.config.tables.contains_key("products") {
                    if let Some(cov) = catalog::coverage(conn, "products", "created_at") {
                        hints.push(format!(
                            "Data coverage for 'products' (created_at): {} → {}",
                            cov.min, cov.max
                        ));
                    }
                }
                if !hints.is_empty() {
                    text.push_str("\n\n");
                    text.push_str(&hints.join("\n"));
                }
                Grounding {
                    schema,
                    text,
                    coverage_hint,
                }
            }
            Err(e) => {
                warn!(error = %e, "Schema introspection failed; grounding degraded");
                Grounding {
                    schema: SchemaMap::new(),
                    text: format!("(failed to load schema: {})", e),
                    coverage_hint: None,
                }
            }
        }
    }

    /// The grounding text alone, for diagnostics endpoints
    pub fn schema_text(&self, db: &DbConnection) -> String {
        self.build_grounding(&lock(db)).text
    }

    /// Handle a natural-language request end to end
    pub async fn handle_text(
        &self,
        db: &DbConnection,
        session_id: &str,
        nl: &str,
        page: PageRequest,
    ) -> Result<Outcome, CoreError> {
        let grounding = {
            let conn = lock(db);
            self.build_grounding(&conn)
        };

        info!(session = session_id, "Handling natural-language request");
        let raw = self
            .planner
            .complete(self.planner_messages(&grounding.text, nl))
            .await?;

        let Some(payload) = extract_json_payload(&raw) else {
            info!(session = session_id, "Planner response carried no plan");
            return Ok(Outcome::Unsure {
                feedback: "Could not determine intent.".to_string(),
            });
        };

        match parse_plan(&payload) {
            Plan::Read { sql, reason } => {
                self.run_read(
                    db,
                    session_id,
                    &sql,
                    page,
                    reason,
                    grounding.coverage_hint.as_deref(),
                )
                .await
            }
            Plan::Write { operation, reason } => {
                let validated = validate_write(&operation, &self.config.tables)?;
                if self.config.require_write_confirmation {
                    info!(table = validated.table(), "Write proposed, awaiting confirmation");
                    Ok(Outcome::ProposedWrite {
                        operation: validated,
                        reason,
                        feedback: "Review and confirm the write operation below.".to_string(),
                    })
                } else {
                    self.execute_operation(&lock(db), validated)
                }
            }
            Plan::Unsure { .. } => {
                info!(session = session_id, "Planner was unsure");
                Ok(Outcome::Unsure {
                    feedback: "Could not determine intent.".to_string(),
                })
            }
        }
    }

    /// Execute a client-echoed operation from the confirmation boundary.
    /// The echoed payload is untrusted input and is validated from scratch.
    pub fn handle_confirm(&self, db: &DbConnection, op_json: &str) -> Result<Outcome, CoreError> {
        let op: Value = serde_json::from_str(op_json)
            .map_err(|_| CoreError::invalid_operation("Invalid operation payload"))?;
        let validated = validate_write(&op, &self.config.tables)?;
        info!(table = validated.table(), "Applying confirmed write");
        self.execute_operation(&lock(db), validated)
    }

    /// Re-slice the last accepted read for another page
    pub fn handle_page(
        &self,
        db: &DbConnection,
        session_id: &str,
        page: PageRequest,
    ) -> Result<Outcome, CoreError> {
        let Some(ctx) = self.sessions.recall(session_id) else {
            return Ok(Outcome::NothingToPaginate {
                feedback: "Nothing to paginate.".to_string(),
            });
        };

        let (rows, total, page_sql) = {
            let conn = lock(db);
            self.fetch_page(&conn, &ctx.base_sql, page)?
        };
        self.sessions.cache_result(session_id, rows.clone());

        info!(
            page = page.page,
            size = page.page_size,
            rows = rows.len(),
            "Read page loaded"
        );
        let feedback = if rows.is_empty() {
            "No results on this page.".to_string()
        } else {
            format!("Page {} loaded.", page.page)
        };
        Ok(Outcome::Read(ReadOutcome {
            rows,
            total,
            page: page.page,
            page_size: page.page_size,
            sql: page_sql,
            reason: String::new(),
            feedback,
        }))
    }

    async fn run_read(
        &self,
        db: &DbConnection,
        session_id: &str,
        sql: &str,
        page: PageRequest,
        reason: String,
        coverage_hint: Option<&str>,
    ) -> Result<Outcome, CoreError> {
        let guarded = guard_select(sql, self.config.limits.max_rows)?;
        let base_sql = strip_row_bounds(&guarded);
        self.sessions
            .remember_read(session_id, base_sql.clone(), page.page_size);

        let (rows, total, page_sql) = {
            let conn = lock(db);
            self.fetch_page(&conn, &base_sql, page)?
        };
        self.sessions.cache_result(session_id, rows.clone());

        let feedback = if rows.is_empty() {
            info!(sql = %page_sql, "Read returned no rows");
            let hint = coverage_hint
                .map(|h| format!("{}. ", h))
                .unwrap_or_default();
            format!(
                "{}No results. Consider broadening the time range (e.g., last 365 days) \
                 or using an explicit historical window.",
                hint
            )
        } else {
            info!(sql = %page_sql, rows = rows.len(), "Read succeeded");
            self.summarize(&rows).await
        };

        Ok(Outcome::Read(ReadOutcome {
            rows,
            total,
            page: page.page,
            page_size: page.page_size,
            sql: page_sql,
            reason,
            feedback,
        }))
    }

    fn fetch_page(
        &self,
        conn: &Connection,
        base_sql: &str,
        page: PageRequest,
    ) -> Result<(Vec<Map<String, Value>>, Option<u64>, String), CoreError> {
        // total is best-effort; a failed count never blocks the row fetch
        let total = conn
            .query_row(&wrap_count(base_sql), [], |row| row.get::<_, i64>(0))
            .ok()
            .and_then(|count| u64::try_from(count).ok());

        let page_sql = wrap_page(base_sql, page.page_size, page.offset());
        let rows = fetch_rows(conn, &page_sql)?;
        Ok((rows, total, page_sql))
    }

    fn execute_operation(
        &self,
        conn: &Connection,
        operation: Operation,
    ) -> Result<Outcome, CoreError> {
        match &operation {
            Operation::Insert { table, values } => {
                let result = exec_insert(conn, table, values)?;
                info!(table = table.as_str(), inserted_id = result.inserted_id, "Insert executed");
                Ok(Outcome::WriteApplied {
                    result: WriteResult::Inserted(result),
                    operation,
                    feedback: "Insert executed successfully.".to_string(),
                })
            }
            Operation::Update {
                table,
                set,
                where_equals,
            } => {
                let result = exec_update(conn, table, set, where_equals)?;
                info!(table = table.as_str(), affected = result.affected_rows, "Update executed");
                Ok(Outcome::WriteApplied {
                    result: WriteResult::Updated(result),
                    operation,
                    feedback: "Update executed successfully.".to_string(),
                })
            }
        }
    }

    async fn summarize(&self, rows: &[Map<String, Value>]) -> String {
        let payload = serde_json::to_string(rows).unwrap_or_default();
        let messages = vec![
            ChatMessage::system("Summarize these query results in one brief paragraph."),
            ChatMessage::user(payload),
        ];
        match self.planner.complete(messages).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "Result summarization failed");
                "Query executed. Showing raw results.".to_string()
            }
        }
    }

    fn planner_messages(&self, grounding_text: &str, nl: &str) -> Vec<ChatMessage> {
        let system = "You are a production-grade SQLite NL-to-DB planner. \
            Return STRICT JSON only with keys: intent (\"read\"|\"write\"), reason (string). \
            For intent=\"read\": sql (single SELECT with SQLite syntax, add LIMIT if missing). \
            For intent=\"write\": operation { type (\"insert\"|\"update\"), table (string), \
            values (for insert) OR set (for update), where_equals (object with equality-only \
            conditions for update) }. \
            Never include comments or extra keys. Use only exposed tables and columns. \
            Prefer robust time windows (e.g., last 365 days) so results are non-empty even if \
            data is historical; consider data coverage hints provided.";

        vec![
            ChatMessage::system(system),
            ChatMessage::assistant(format!("Database schema for grounding:\n{}", grounding_text)),
            ChatMessage::assistant(format!(
                "Table access rules:\n{}",
                rules_summary(&self.config.tables)
            )),
            ChatMessage::user(format!("User request: {}", nl)),
        ]
    }
}

fn fetch_rows(conn: &Connection, sql: &str) -> Result<Vec<Map<String, Value>>, CoreError> {
    let mut stmt = conn.prepare(sql)?;
    let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(executor::row_to_map(row, &names)?);
    }
    Ok(out)
}
