//! Card extraction from assistant output
//!
//! Cards travel inside tagged blocks in free LLM text:
//!
//! ```text
//! Here are your cards.
//! <anki_cards>
//! [{"body": "The capital of France is {{c1::Paris}}", "more": "Since 508"}]
//! </anki_cards>
//! ```
//!
//! Every scan starts from the raw transcript. Nothing is cached between
//! calls, so the same transcript always yields the same records.

use super::schema::FieldSchema;
use crate::config::DEFAULT_CARD_TAG;
use crate::protocol::Message;
use crate::{DeckCreatorError, Result};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// One flashcard as emitted by the LLM: field name -> field value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardRecord {
    fields: BTreeMap<String, String>,
}

impl CardRecord {
    pub fn new<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Result of scanning some text or a transcript
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardScan {
    /// Valid records, in transcript order
    pub records: Vec<CardRecord>,
    /// Entries skipped because they were not well-formed card objects
    pub malformed: usize,
    /// Card blocks found
    pub blocks: usize,
}

impl CardScan {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn merge(&mut self, other: CardScan) {
        self.records.extend(other.records);
        self.malformed += other.malformed;
        self.blocks += other.blocks;
    }
}

/// Card counts reported back to the user after a response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CardTally {
    /// Valid cards across the whole conversation
    pub total: usize,
    /// Cards added since the previous tally
    pub new: usize,
    /// Malformed entries across the whole conversation
    pub malformed: usize,
}

/// Finds card blocks and parses their records against a field schema
#[derive(Debug, Clone)]
pub struct CardExtractor {
    schema: FieldSchema,
    block_pattern: Regex,
}

impl CardExtractor {
    pub fn new(schema: FieldSchema) -> Self {
        Self {
            schema,
            block_pattern: block_regex(DEFAULT_CARD_TAG),
        }
    }

    /// Use a custom tag name instead of `anki_cards`
    pub fn with_tag(schema: FieldSchema, tag: &str) -> Self {
        Self {
            schema,
            block_pattern: block_regex(tag),
        }
    }

    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    /// Payloads of every card block in `text`, trimmed
    pub fn find_blocks<'t>(&self, text: &'t str) -> Vec<&'t str> {
        self.block_pattern
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str())
            .collect()
    }

    pub fn has_blocks(&self, text: &str) -> bool {
        self.block_pattern.is_match(text)
    }

    /// Validate one JSON value as a card record
    pub fn parse_record(&self, value: &Value) -> Result<CardRecord> {
        let Value::Object(map) = value else {
            return Err(DeckCreatorError::Parse(format!(
                "card entry is not an object: {}",
                value
            )));
        };

        if map.is_empty() {
            return Err(DeckCreatorError::Parse("card entry has no fields".to_string()));
        }

        let mut fields = BTreeMap::new();
        for (name, value) in map {
            if !self.schema.contains(name) {
                return Err(DeckCreatorError::Parse(format!(
                    "unknown field {:?} (expected one of: {})",
                    name,
                    self.schema.names().collect::<Vec<_>>().join(", ")
                )));
            }
            let Value::String(text) = value else {
                return Err(DeckCreatorError::Parse(format!(
                    "field {:?} is not a string",
                    name
                )));
            };
            fields.insert(name.clone(), text.clone());
        }

        Ok(CardRecord { fields })
    }

    /// Parse a block payload: an array of card objects or a single object.
    /// Invalid JSON counts as one malformed entry.
    pub fn parse_block(&self, payload: &str) -> CardScan {
        let mut scan = CardScan {
            blocks: 1,
            ..Default::default()
        };

        let value: Value = match serde_json::from_str(payload) {
            Ok(v) => v,
            Err(e) => {
                warn!("Skipping card block with invalid JSON: {}", e);
                scan.malformed = 1;
                return scan;
            }
        };

        let entries = match value {
            Value::Array(items) => items,
            other => vec![other],
        };

        for entry in &entries {
            match self.parse_record(entry) {
                Ok(record) => scan.records.push(record),
                Err(e) => {
                    debug!("Skipping malformed card: {}", e);
                    scan.malformed += 1;
                }
            }
        }

        scan
    }

    /// Scan free text for every card block
    pub fn scan_text(&self, text: &str) -> CardScan {
        let mut scan = CardScan::default();
        for payload in self.find_blocks(text) {
            scan.merge(self.parse_block(payload));
        }
        scan
    }

    /// Scan every assistant message of a transcript
    pub fn extract(&self, messages: &[Message]) -> CardScan {
        let mut scan = CardScan::default();
        for message in messages.iter().filter(|m| m.is_assistant()) {
            scan.merge(self.scan_text(&message.text()));
        }
        debug!(
            "Scanned {} block(s): {} card(s), {} malformed",
            scan.blocks,
            scan.records.len(),
            scan.malformed
        );
        scan
    }

    /// Count cards for user feedback.
    ///
    /// With `previous_total`, new cards are the growth since that total;
    /// otherwise they are the cards in the last assistant message.
    pub fn tally(&self, messages: &[Message], previous_total: Option<usize>) -> CardTally {
        let scan = self.extract(messages);
        let total = scan.records.len();

        let new = match previous_total {
            Some(previous) => total.saturating_sub(previous),
            None => messages
                .iter()
                .rev()
                .find(|m| m.is_assistant())
                .map(|m| self.scan_text(&m.text()).records.len())
                .unwrap_or(0),
        };

        CardTally {
            total,
            new,
            malformed: scan.malformed,
        }
    }
}

/// `(?is)<tag>\s*(.*?)\s*</tag>`
fn block_regex(tag: &str) -> Regex {
    let tag = regex::escape(tag);
    Regex::new(&format!(r"(?is)<{tag}>\s*(.*?)\s*</{tag}>"))
        .expect("escaped tag forms a valid pattern")
}
