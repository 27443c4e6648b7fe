//! # tabletalk core
//!
//! The plan-validation and safe-execution core of tabletalk: everything
//! between "the planner said something" and "one bounded, whitelisted SQL
//! statement ran".
//!
//! The pipeline: [`extract::extract_json_payload`] recovers a JSON plan from
//! raw planner text, [`plan::parse_plan`] sorts it into a closed set of
//! intents, [`read_guard`] validates and bounds reads,
//! [`plan::validate_write`] checks writes against the [`rules`] whitelist,
//! and [`executor`] runs the surviving statements with every value bound as a
//! parameter. [`service::Assistant`] drives the whole flow per request;
//! [`session`] carries the little state that outlives one request.

use rusqlite::Connection;
use std::sync::{Arc, Mutex};

pub mod catalog;
pub mod config;
pub mod error;
pub mod executor;
pub mod extract;
pub mod pagination;
pub mod plan;
pub mod read_guard;
pub mod rules;
pub mod service;
pub mod session;

/// The shared database handle: one connection, one statement at a time
pub type DbConnection = Arc<Mutex<Connection>>;

pub use catalog::{ColumnMeta, Coverage, KeyKind, SchemaMap};
pub use config::AppConfig;
pub use error::CoreError;
pub use executor::{InsertOutcome, UpdateOutcome};
pub use pagination::PageRequest;
pub use plan::{Operation, Plan};
pub use rules::{default_rules, TableRule, WriteRules};
pub use service::{Assistant, Outcome, ReadOutcome, WriteResult};
pub use session::{MemorySessionStore, PaginationContext, SessionStore};
