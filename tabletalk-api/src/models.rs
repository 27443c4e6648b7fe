use serde::{Deserialize, Serialize};
use tabletalk_core::{Outcome, ReadOutcome, WriteResult};

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub text: String,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub page_size: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    /// The proposed operation exactly as it was handed out
    pub operation: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct PageRequestBody {
    pub page: i64,
    #[serde(default)]
    pub page_size: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ReadResponse {
    pub mode: &'static str,
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    pub total: Option<u64>,
    pub page: u64,
    pub page_size: usize,
    pub sql: String,
    pub reason: String,
    pub feedback: String,
}

#[derive(Debug, Serialize)]
pub struct ProposedWriteResponse {
    pub mode: &'static str,
    pub operation: serde_json::Value,
    pub reason: String,
    pub feedback: String,
}

#[derive(Debug, Serialize)]
pub struct WriteAppliedResponse {
    pub mode: &'static str,
    pub inserted_id: Option<i64>,
    pub row: Option<serde_json::Map<String, serde_json::Value>>,
    pub affected_rows: Option<usize>,
    pub feedback: String,
}

#[derive(Debug, Serialize)]
pub struct FeedbackResponse {
    pub mode: &'static str,
    pub feedback: String,
}

#[derive(Debug, Serialize)]
pub struct SchemaResponse {
    pub schema_text: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Flatten a core outcome into the JSON body the caller sees
pub fn outcome_body(outcome: Outcome) -> serde_json::Value {
    let body = match outcome {
        Outcome::Read(ReadOutcome {
            rows,
            total,
            page,
            page_size,
            sql,
            reason,
            feedback,
        }) => serde_json::to_value(ReadResponse {
            mode: "read",
            rows,
            total,
            page,
            page_size,
            sql,
            reason,
            feedback,
        }),
        Outcome::ProposedWrite {
            operation,
            reason,
            feedback,
        } => serde_json::to_value(ProposedWriteResponse {
            mode: "proposed_write",
            operation: serde_json::to_value(operation).unwrap_or_default(),
            reason,
            feedback,
        }),
        Outcome::WriteApplied {
            result, feedback, ..
        } => {
            let (inserted_id, row, affected_rows) = match result {
                WriteResult::Inserted(insert) => (Some(insert.inserted_id), insert.row, None),
                WriteResult::Updated(update) => (None, None, Some(update.affected_rows)),
            };
            serde_json::to_value(WriteAppliedResponse {
                mode: "write",
                inserted_id,
                row,
                affected_rows,
                feedback,
            })
        }
        Outcome::Unsure { feedback } => serde_json::to_value(FeedbackResponse {
            mode: "unsure",
            feedback,
        }),
        Outcome::NothingToPaginate { feedback } => serde_json::to_value(FeedbackResponse {
            mode: "read",
            feedback,
        }),
    };
    body.unwrap_or_default()
}
