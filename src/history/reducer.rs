//! Sliding-window history reducer
//!
//! Layout of a transcript as seen by the reducer:
//!
//! ```text
//! [system]?  interior...  current-user
//! ```
//!
//! The system prompt and the current user message always survive. Of the
//! interior, only the newest `keep` messages (or turns) are kept. User
//! messages that fall out of the window are scanned for preserved lines,
//! which are prepended as one labeled block to the earliest kept message.

use super::annotation::strip_annotations;
use crate::config::{DeckCreatorConfig, RetentionUnit};
use crate::protocol::Message;
use crate::rules::PreservePatterns;
use crate::{DeckCreatorError, Result};
use std::collections::HashSet;
use tracing::{debug, info};

/// Label heading the block of preserved lines
pub const PRESERVED_HEADER: &str = "[Preserved from earlier messages]";

/// Output of a reduction
#[derive(Debug, Clone, PartialEq)]
pub struct Reduction {
    pub messages: Vec<Message>,
    /// Interior messages removed
    pub dropped: usize,
    /// Lines carried over from dropped user messages, oldest first
    pub preserved_lines: Vec<String>,
    /// Kept assistant messages that had annotations removed
    pub stripped: usize,
}

impl Reduction {
    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

/// Trims transcripts to a retention window
#[derive(Debug, Clone)]
pub struct HistoryReducer {
    keep: usize,
    unit: RetentionUnit,
    patterns: PreservePatterns,
}

impl HistoryReducer {
    pub fn new(keep: usize, unit: RetentionUnit, patterns: PreservePatterns) -> Self {
        Self {
            keep,
            unit,
            patterns,
        }
    }

    pub fn from_config(config: &DeckCreatorConfig) -> Result<Self> {
        Ok(Self::new(
            config.keep_messages,
            config.retention_unit,
            config.preserve_patterns()?,
        ))
    }

    /// Reduce a transcript. Fails if the last message is not from the user.
    pub fn reduce(&self, transcript: &[Message]) -> Result<Reduction> {
        let Some((current, rest)) = transcript.split_last() else {
            return Err(DeckCreatorError::Configuration(
                "transcript is empty, expected a current user message".to_string(),
            ));
        };
        if !current.is_user() {
            return Err(DeckCreatorError::Configuration(format!(
                "last message must come from the user, got {}",
                current.role
            )));
        }

        let (system, interior) = match rest.split_first() {
            Some((first, interior)) if first.is_system() => (Some(first), interior),
            _ => (None, rest),
        };

        let start = self.retention_start(interior);
        let (dropped, retained) = interior.split_at(start);

        // First occurrence wins when several dropped messages repeat a line.
        let mut seen = HashSet::new();
        let preserved_lines: Vec<String> = dropped
            .iter()
            .filter(|m| m.is_user())
            .flat_map(|m| self.patterns.preserved_lines(&m.text()))
            .filter(|line| seen.insert(line.clone()))
            .collect();

        let mut kept: Vec<Message> = retained.to_vec();
        let mut stripped = 0;
        for message in kept.iter_mut().filter(|m| m.is_assistant()) {
            if message.rewrite_text(strip_annotations) {
                stripped += 1;
            }
        }

        let mut current = current.clone();
        if !preserved_lines.is_empty() {
            let block = preserved_block(&preserved_lines);
            match kept.first_mut() {
                Some(earliest) => earliest.prepend_text(&block),
                None => current.prepend_text(&block),
            }
        }

        let mut messages = Vec::with_capacity(kept.len() + 2);
        messages.extend(system.cloned());
        messages.extend(kept);
        messages.push(current);

        if !dropped.is_empty() {
            info!(
                "Trimmed history: dropped {} message(s), preserved {} line(s)",
                dropped.len(),
                preserved_lines.len()
            );
        }
        debug!(
            "History reduced from {} to {} message(s), {} annotation(s) stripped",
            transcript.len(),
            messages.len(),
            stripped
        );

        Ok(Reduction {
            messages,
            dropped: dropped.len(),
            preserved_lines,
            stripped,
        })
    }

    /// Index into `interior` of the first message to keep
    fn retention_start(&self, interior: &[Message]) -> usize {
        match self.unit {
            RetentionUnit::Messages => interior.len().saturating_sub(self.keep),
            RetentionUnit::Turns => {
                if self.keep == 0 {
                    return interior.len();
                }
                // A turn opens at a user message; walk back until `keep` of them.
                let mut turns = 0;
                for (i, message) in interior.iter().enumerate().rev() {
                    if message.is_user() {
                        turns += 1;
                        if turns == self.keep {
                            return i;
                        }
                    }
                }
                0
            }
        }
    }
}

fn preserved_block(lines: &[String]) -> String {
    format!("{}\n{}\n\n", PRESERVED_HEADER, lines.join("\n"))
}
