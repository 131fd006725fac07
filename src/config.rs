//! Configuration for the deck creator
//!
//! Every option the host exposes as a named setting lives here with a typed
//! default. A TOML file can override any subset of them.

use crate::cards::{FieldSchema, FieldSpec};
use crate::deck::DeckSpec;
use crate::rules::PreservePatterns;
use crate::{DeckCreatorError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable pointing at a config file
pub const CONFIG_ENV_VAR: &str = "ANKI_DECK_CREATOR_CONFIG";

/// Default deck name
pub const DEFAULT_DECK_NAME: &str = "LLM Generated Cards";

/// Default note type name
pub const DEFAULT_MODEL_NAME: &str = "Cloze Model";

/// Default tag wrapping card blocks in assistant output
pub const DEFAULT_CARD_TAG: &str = "anki_cards";

/// What `keep_messages` counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionUnit {
    /// Single messages, newest first
    #[default]
    Messages,
    /// User-led turns (a user message plus the replies that follow it)
    Turns,
}

/// Configuration for the filter and the export action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeckCreatorConfig {
    /// Per-user switch; when false every hook passes the body through
    pub enabled: bool,

    /// Surface debug-level status events to the host
    pub debug: bool,

    /// How many prior messages (or turns) to keep
    pub keep_messages: usize,

    pub retention_unit: RetentionUnit,

    /// Regexes selecting lines to carry over from dropped user messages
    pub preserve_patterns: Vec<String>,

    /// Append the flashcard format instruction to the system prompt
    pub inject_instructions: bool,

    pub deck_name: String,

    /// Note type name
    pub model_name: String,

    /// Ordered field schema. The first field holds the cloze text.
    pub fields: Vec<FieldSpec>,

    /// Host-style JSON object of field name -> description. Overrides
    /// `fields` when set.
    pub fields_description: Option<String>,

    /// Tag wrapping card blocks, without angle brackets
    pub card_tag: String,
}

impl Default for DeckCreatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debug: false,
            keep_messages: 10,
            retention_unit: RetentionUnit::Messages,
            preserve_patterns: Vec::new(),
            inject_instructions: true,
            deck_name: DEFAULT_DECK_NAME.to_string(),
            model_name: DEFAULT_MODEL_NAME.to_string(),
            fields: FieldSchema::default().fields().to_vec(),
            fields_description: None,
            card_tag: DEFAULT_CARD_TAG.to_string(),
        }
    }
}

impl DeckCreatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keep_messages(mut self, keep: usize) -> Self {
        self.keep_messages = keep;
        self
    }

    pub fn with_retention_unit(mut self, unit: RetentionUnit) -> Self {
        self.retention_unit = unit;
        self
    }

    pub fn with_preserve_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preserve_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_fields_description(mut self, json: impl Into<String>) -> Self {
        self.fields_description = Some(json.into());
        self
    }

    pub fn with_deck_name(mut self, name: impl Into<String>) -> Self {
        self.deck_name = name.into();
        self
    }

    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_inject_instructions(mut self, inject: bool) -> Self {
        self.inject_instructions = inject;
        self
    }

    /// Resolve the field schema, preferring `fields_description`
    pub fn field_schema(&self) -> Result<FieldSchema> {
        match &self.fields_description {
            Some(json) => FieldSchema::from_description_json(json),
            None => FieldSchema::new(self.fields.clone()),
        }
    }

    pub fn preserve_patterns(&self) -> Result<PreservePatterns> {
        PreservePatterns::compile(&self.preserve_patterns)
    }

    pub fn deck_spec(&self) -> Result<DeckSpec> {
        DeckSpec::new(&self.deck_name, &self.model_name, self.field_schema()?)
    }

    /// Check every derived setting up front
    pub fn validate(&self) -> Result<()> {
        self.preserve_patterns()?;
        self.deck_spec()?;
        if self.card_tag.is_empty()
            || !self
                .card_tag
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(DeckCreatorError::Configuration(format!(
                "card_tag must be a plain tag name, got {:?}",
                self.card_tag
            )));
        }
        Ok(())
    }

    /// Load configuration from a TOML file. A missing file yields defaults.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config = Self::from_toml(&content)?;
        debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| DeckCreatorError::Configuration(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

/// Resolve the config file location.
///
/// `$ANKI_DECK_CREATOR_CONFIG` wins, otherwise
/// `<config_dir>/anki-deck-creator/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|dir| dir.join("anki-deck-creator").join("config.toml"))
}
