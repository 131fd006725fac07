//! Field schema shared by the extractor, the instruction prompt and the deck

use crate::{DeckCreatorError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One field of the note type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    /// Shown to the LLM when describing the card format
    #[serde(default)]
    pub description: String,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Ordered list of field names. The first field carries the cloze text; the
/// rest are shown on the back of the card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    fields: Vec<FieldSpec>,
}

impl FieldSchema {
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self> {
        if fields.is_empty() {
            return Err(DeckCreatorError::Configuration(
                "field schema must declare at least one field".to_string(),
            ));
        }

        for (i, field) in fields.iter().enumerate() {
            if field.name.trim().is_empty() {
                return Err(DeckCreatorError::Configuration(format!(
                    "field #{} has an empty name",
                    i + 1
                )));
            }
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(DeckCreatorError::Configuration(format!(
                    "duplicate field name {:?}",
                    field.name
                )));
            }
        }

        Ok(Self { fields })
    }

    /// Parse a JSON object of field name -> description, keeping key order
    pub fn from_description_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json).map_err(|e| {
            DeckCreatorError::Configuration(format!("invalid fields_description JSON: {}", e))
        })?;

        let Value::Object(map) = value else {
            return Err(DeckCreatorError::Configuration(
                "fields_description must be a JSON object".to_string(),
            ));
        };

        let fields = map
            .into_iter()
            .map(|(name, desc)| {
                let description = match desc {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                FieldSpec { name, description }
            })
            .collect();

        Self::new(fields)
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// Field holding the cloze deletions
    pub fn cloze_field(&self) -> &str {
        &self.fields[0].name
    }

    /// Fields appended to the answer side
    pub fn secondary_fields(&self) -> &[FieldSpec] {
        &self.fields[1..]
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Default for FieldSchema {
    fn default() -> Self {
        Self {
            fields: vec![
                FieldSpec::new(
                    "body",
                    "Main content with cloze deletions like {{c1::hidden text}}",
                ),
                FieldSpec::new("more", "Additional context or explanations"),
            ],
        }
    }
}
