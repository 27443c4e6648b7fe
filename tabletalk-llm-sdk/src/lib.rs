//! # tabletalk LLM SDK
//!
//! The planner interface for tabletalk: a provider-agnostic [`Planner`] trait
//! plus an OpenAI-compatible chat completions client. The rest of the system
//! treats the planner as an opaque, possibly-slow, possibly-failing black box;
//! every failure surfaces as a recoverable [`PlannerError`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use tabletalk_llm_sdk::{ChatMessage, OpenAiClient, Planner};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = OpenAiClient::new("your-api-key", "gpt-4o-mini")?;
//!     let raw = client
//!         .complete(vec![
//!             ChatMessage::system("You are a database planner."),
//!             ChatMessage::user("How many products are in stock?"),
//!         ])
//!         .await?;
//!     println!("Planner said: {}", raw);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod openai;
pub mod types;

pub use client::Planner;
pub use error::PlannerError;
pub use openai::OpenAiClient;
pub use types::{ChatMessage, Role};

#[cfg(test)]
mod tests {
    use crate::types::{ChatMessage, Role};

    #[test]
    fn test_message_constructors() {
        let message = ChatMessage::user("Hello");
        assert_eq!(message.role, Role::User);
        assert_eq!(message.content, "Hello");

        let message = ChatMessage::system("Be brief");
        assert_eq!(message.role, Role::System);
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::Assistant.to_string(), "assistant");
    }
}
