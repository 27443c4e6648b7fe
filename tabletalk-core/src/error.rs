use tabletalk_llm_sdk::PlannerError;
use thiserror::Error;

/// Error taxonomy for the validation and execution core.
///
/// Every variant is recoverable at the request level: callers render a
/// user-visible message and stay ready for the next request. Nothing here is
/// allowed to take the process down.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Schema introspection failed; grounding degrades, the request continues
    #[error("Failed to load schema: {message}")]
    SchemaLoad { message: String },

    /// The planner response did not contain a usable plan
    #[error("Could not parse a plan from the planner response")]
    PlanParse,

    /// A read statement failed validation and was not executed
    #[error("{message}")]
    InvalidRead { message: String },

    /// A write operation failed validation and was not executed
    #[error("{message}")]
    InvalidOperation { message: String },

    /// The database rejected an otherwise valid statement
    #[error("{message}")]
    Execution { message: String },

    /// The planner call itself failed
    #[error("Planning failed: {source}")]
    Planner {
        #[from]
        source: PlannerError,
    },
}

impl CoreError {
    pub fn schema_load<S: Into<String>>(message: S) -> Self {
        Self::SchemaLoad {
            message: message.into(),
        }
    }

    pub fn invalid_read<S: Into<String>>(message: S) -> Self {
        Self::InvalidRead {
            message: message.into(),
        }
    }

    pub fn invalid_operation<S: Into<String>>(message: S) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    pub fn execution<S: Into<String>>(message: S) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(e: rusqlite::Error) -> Self {
        CoreError::Execution {
            message: e.to_string(),
        }
    }
}
