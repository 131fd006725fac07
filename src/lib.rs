//! Anki Deck Creator
//!
//! A chat filter/action pair that sits between a chat UI host and the LLM to:
//! - Trim long transcripts while keeping regex-selected metadata lines
//! - Teach the LLM a flashcard block format and count the cards it emits
//! - Re-scan the conversation on demand and package every card as an `.apkg`

pub mod cards;
pub mod config;
pub mod deck;
pub mod history;
pub mod interceptor;
pub mod protocol;
pub mod rules;

pub use cards::{CardExtractor, CardRecord, CardScan, CardTally, FieldSchema};
pub use config::{DeckCreatorConfig, RetentionUnit};
pub use deck::{Deck, DeckBuilder, DeckSpec};
pub use history::HistoryReducer;
pub use interceptor::{ExportedDeck, Interceptor, NullSink, OutletResult, StatusSink};
pub use protocol::{Body, Message, Role, StatusEvent};
pub use rules::PreservePatterns;

/// Result type for deck creator operations
pub type Result<T> = std::result::Result<T, DeckCreatorError>;

/// Errors that can occur in the deck creator
#[derive(Debug, thiserror::Error)]
pub enum DeckCreatorError {
    /// Missing message anchor, bad pattern, or mismatched field schema
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed card payload. Recovered locally by the extractor, only
    /// surfaced by strict single-record parsing.
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("No valid flashcards to export")]
    EmptyDeck,

    /// Failure in the deck packaging libraries or host delivery
    #[error("External collaborator error: {0}")]
    ExternalCollaborator(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for DeckCreatorError {
    fn from(e: rusqlite::Error) -> Self {
        Self::ExternalCollaborator(format!("sqlite: {}", e))
    }
}

impl From<zip::result::ZipError> for DeckCreatorError {
    fn from(e: zip::result::ZipError) -> Self {
        Self::ExternalCollaborator(format!("zip: {}", e))
    }
}

impl From<regex::Error> for DeckCreatorError {
    fn from(e: regex::Error) -> Self {
        Self::Configuration(format!("invalid pattern: {}", e))
    }
}
