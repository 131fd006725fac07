//! Deck assembly from extracted card records

use super::ids::{note_guid, stable_id};
use super::package;
use crate::cards::{CardRecord, FieldSchema};
use crate::config::DeckCreatorConfig;
use crate::{DeckCreatorError, Result};
use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

static CLOZE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{\{c(\d+)::.+?\}\}").expect("cloze pattern is valid"));

/// Deck name, note type name and field schema for an export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeckSpec {
    pub deck_name: String,
    pub model_name: String,
    pub schema: FieldSchema,
}

impl DeckSpec {
    pub fn new(
        deck_name: impl Into<String>,
        model_name: impl Into<String>,
        schema: FieldSchema,
    ) -> Result<Self> {
        let deck_name = deck_name.into();
        let model_name = model_name.into();
        if deck_name.trim().is_empty() {
            return Err(DeckCreatorError::Configuration(
                "deck name must not be empty".to_string(),
            ));
        }
        if model_name.trim().is_empty() {
            return Err(DeckCreatorError::Configuration(
                "note type name must not be empty".to_string(),
            ));
        }
        Ok(Self {
            deck_name,
            model_name,
            schema,
        })
    }

    /// Download name: deck name with spaces replaced, `.apkg` suffix
    pub fn file_name(&self) -> String {
        format!("{}.apkg", self.deck_name.replace(' ', "_"))
    }

    pub fn deck_id(&self) -> i64 {
        stable_id(&self.deck_name)
    }

    pub fn model_id(&self) -> i64 {
        stable_id(&self.model_name)
    }

    /// Front template: cloze rendering of the first field
    pub fn question_template(&self) -> String {
        format!("{{{{cloze:{}}}}}", self.schema.cloze_field())
    }

    /// Back template: the cloze again, then each secondary field
    pub fn answer_template(&self) -> String {
        let mut afmt = self.question_template();
        for field in self.schema.secondary_fields() {
            afmt.push_str(&format!(
                "<br><br><b>{name}:</b><br>{{{{{name}}}}}",
                name = field.name
            ));
        }
        afmt
    }
}

/// One note, fields in schema order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub guid: String,
    pub fields: Vec<String>,
    /// Card ordinals generated for this note (cloze number - 1)
    pub card_ords: Vec<i64>,
}

impl Note {
    pub fn field(&self, schema: &FieldSchema, name: &str) -> Option<&str> {
        schema
            .names()
            .position(|n| n == name)
            .and_then(|i| self.fields.get(i))
            .map(String::as_str)
    }
}

/// Assembled deck, ready to package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deck {
    pub spec: DeckSpec,
    pub deck_id: i64,
    pub model_id: i64,
    pub notes: Vec<Note>,
    /// Records rejected during validation
    pub skipped: usize,
    /// Records identical to an earlier one, dropped
    pub duplicates: usize,
}

impl Deck {
    pub fn card_count(&self) -> usize {
        self.notes.iter().map(|n| n.card_ords.len()).sum()
    }

    /// Serialize to `.apkg` bytes
    pub fn to_apkg(&self) -> Result<Vec<u8>> {
        package::write_apkg(self, chrono::Utc::now().timestamp_millis())
    }
}

/// Builds decks for one `DeckSpec`
#[derive(Debug, Clone)]
pub struct DeckBuilder {
    spec: DeckSpec,
}

impl DeckBuilder {
    pub fn new(spec: DeckSpec) -> Self {
        Self { spec }
    }

    pub fn from_config(config: &DeckCreatorConfig) -> Result<Self> {
        Ok(Self::new(config.deck_spec()?))
    }

    pub fn spec(&self) -> &DeckSpec {
        &self.spec
    }

    /// Validate records and bind them to one deck, in input order
    pub fn assemble(&self, records: &[CardRecord]) -> Result<Deck> {
        let schema = &self.spec.schema;
        let mut notes = Vec::with_capacity(records.len());
        let mut skipped = 0;
        let mut duplicates = 0;
        let mut guids = HashSet::new();

        for (i, record) in records.iter().enumerate() {
            if let Some(unknown) = record.field_names().find(|n| !schema.contains(n)) {
                warn!("Skipping card #{}: field {:?} is not in the schema", i + 1, unknown);
                skipped += 1;
                continue;
            }

            let cloze = record.get(schema.cloze_field()).unwrap_or_default();
            if cloze.trim().is_empty() {
                warn!(
                    "Skipping card #{}: required field {:?} is missing",
                    i + 1,
                    schema.cloze_field()
                );
                skipped += 1;
                continue;
            }

            let fields: Vec<String> = schema
                .names()
                .map(|name| record.get(name).unwrap_or_default().to_string())
                .collect();

            // Anki keeps one note per GUID on import.
            let guid = note_guid(&fields);
            if !guids.insert(guid.clone()) {
                debug!("Skipping card #{}: duplicate of an earlier card", i + 1);
                duplicates += 1;
                continue;
            }

            notes.push(Note {
                guid,
                card_ords: cloze_ords(cloze),
                fields,
            });
        }

        if notes.is_empty() {
            return Err(DeckCreatorError::EmptyDeck);
        }

        debug!(
            "Assembled {} note(s) for deck {:?}, {} skipped, {} duplicate(s)",
            notes.len(),
            self.spec.deck_name,
            skipped,
            duplicates
        );

        Ok(Deck {
            deck_id: self.spec.deck_id(),
            model_id: self.spec.model_id(),
            spec: self.spec.clone(),
            notes,
            skipped,
            duplicates,
        })
    }

    /// Assemble and package in one step
    pub fn build(&self, records: &[CardRecord]) -> Result<Vec<u8>> {
        let deck = self.assemble(records)?;
        let bytes = deck.to_apkg()?;
        info!(
            "Built deck {:?}: {} note(s), {} card(s), {} bytes",
            self.spec.deck_name,
            deck.notes.len(),
            deck.card_count(),
            bytes.len()
        );
        Ok(bytes)
    }
}

/// Distinct cloze ordinals in a field, at least one
fn cloze_ords(text: &str) -> Vec<i64> {
    let ords: BTreeSet<i64> = CLOZE_NUMBER
        .captures_iter(text)
        .filter_map(|caps| caps[1].parse::<i64>().ok())
        .filter(|n| *n > 0)
        .map(|n| n - 1)
        .collect();

    if ords.is_empty() {
        vec![0]
    } else {
        ords.into_iter().collect()
    }
}
