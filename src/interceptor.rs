//! Host-facing hooks
//!
//! The host calls these synchronously at three points of a chat round:
//! - `inlet` before the request goes to the LLM (trim history, add the card
//!   format instruction)
//! - `outlet` after the LLM replied (count cards, annotate the reply)
//! - `export` when the user presses the deck button (build the `.apkg`)
//!
//! Nothing is kept between calls. The running card total is recomputed from
//! the transcript, or threaded through by the caller as `previous_total`.

use crate::cards::{
    flashcard_instruction, has_instruction, CardExtractor, CardTally, INSTRUCTION_SEPARATOR,
};
use crate::config::DeckCreatorConfig;
use crate::deck::DeckBuilder;
use crate::history::{status_annotation, strip_annotations, HistoryReducer};
use crate::protocol::{Body, Message, StatusEvent};
use crate::{DeckCreatorError, Result};
use base64::Engine as _;
use serde_json::Value;
use tracing::{debug, error, info};

/// Receives status events destined for the host UI
pub trait StatusSink {
    fn emit(&mut self, event: StatusEvent);
}

impl StatusSink for Vec<StatusEvent> {
    fn emit(&mut self, event: StatusEvent) {
        self.push(event);
    }
}

/// Sink that drops every event
#[derive(Debug, Default)]
pub struct NullSink;

impl StatusSink for NullSink {
    fn emit(&mut self, _event: StatusEvent) {}
}

#[derive(Debug, Clone, Copy)]
enum LogLevel {
    Debug,
    Info,
    Error,
}

/// Outcome of the outlet hook
#[derive(Debug, Clone, PartialEq)]
pub struct OutletResult {
    pub body: Body,
    /// Present when the last reply contained card blocks. Pass `tally.total`
    /// back as `previous_total` on the next call.
    pub tally: Option<CardTally>,
}

/// A packaged deck ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedDeck {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub note_count: usize,
    pub card_count: usize,
    /// Records found but rejected at build time
    pub skipped: usize,
    /// Records identical to an earlier card, folded into it
    pub duplicates: usize,
    /// Entries that failed to parse
    pub malformed: usize,
}

impl ExportedDeck {
    pub const MIME_TYPE: &'static str = "application/x-apkg";

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    /// Payload for browser-side download by the host
    pub fn download_payload(&self) -> Value {
        serde_json::json!({
            "filename": self.file_name,
            "mimeType": Self::MIME_TYPE,
            "data": self.to_base64(),
        })
    }
}

/// The filter and action pair, configured once and called per request
#[derive(Debug, Clone)]
pub struct Interceptor {
    config: DeckCreatorConfig,
    reducer: HistoryReducer,
    extractor: CardExtractor,
    builder: DeckBuilder,
    instruction: String,
}

impl Interceptor {
    pub const NAME: &'static str = "Anki Deck Creator";

    /// Validate the configuration and prepare every component
    pub fn new(config: DeckCreatorConfig) -> Result<Self> {
        config.validate()?;
        let schema = config.field_schema()?;
        let instruction = flashcard_instruction(&schema, &config.card_tag);

        Ok(Self {
            reducer: HistoryReducer::from_config(&config)?,
            extractor: CardExtractor::with_tag(schema, &config.card_tag),
            builder: DeckBuilder::from_config(&config)?,
            instruction,
            config,
        })
    }

    pub fn config(&self) -> &DeckCreatorConfig {
        &self.config
    }

    pub fn extractor(&self) -> &CardExtractor {
        &self.extractor
    }

    /// Info and error messages always reach the host; debug ones only when
    /// the debug option is on.
    fn log(&self, sink: &mut dyn StatusSink, level: LogLevel, message: &str) {
        let text = format!("[{}] {}", Self::NAME, message);
        match level {
            LogLevel::Debug => {
                debug!("{}", text);
                if self.config.debug {
                    sink.emit(StatusEvent::progress(text));
                }
            }
            LogLevel::Info => {
                info!("{}", text);
                sink.emit(StatusEvent::progress(text));
            }
            LogLevel::Error => {
                error!("{}", text);
                sink.emit(StatusEvent::error(text));
            }
        }
    }

    /// Inbound hook: trim history and add the card format instruction
    pub fn inlet(&self, mut body: Body, sink: &mut dyn StatusSink) -> Result<Body> {
        if !self.config.enabled {
            debug!("Filter disabled, inlet pass-through");
            return Ok(body);
        }

        self.log(sink, LogLevel::Info, "Processing inlet request");

        let reduction = match self.reducer.reduce(&body.messages) {
            Ok(r) => r,
            Err(e) => {
                self.log(sink, LogLevel::Error, &format!("Error in inlet: {}", e));
                return Err(e);
            }
        };

        if reduction.dropped > 0 {
            self.log(
                sink,
                LogLevel::Debug,
                &format!(
                    "Dropped {} earlier message(s), kept {} preserved line(s)",
                    reduction.dropped,
                    reduction.preserved_lines.len()
                ),
            );
        }
        body.messages = reduction.into_messages();

        if self.config.inject_instructions && self.inject_instruction(&mut body.messages) {
            self.log(
                sink,
                LogLevel::Info,
                "Added flashcard creation instruction to system prompt",
            );
        }

        Ok(body)
    }

    /// Append the instruction to the system message, or insert one.
    /// Returns false if it was already there.
    fn inject_instruction(&self, messages: &mut Vec<Message>) -> bool {
        match messages.iter_mut().find(|m| m.is_system()) {
            Some(system) => {
                if has_instruction(&system.text()) {
                    return false;
                }
                system.append_text(&format!("{}{}", INSTRUCTION_SEPARATOR, self.instruction));
            }
            None => messages.insert(0, Message::system(self.instruction.clone())),
        }
        true
    }

    /// Outbound hook: count cards and annotate the last reply
    pub fn outlet(
        &self,
        mut body: Body,
        previous_total: Option<usize>,
        sink: &mut dyn StatusSink,
    ) -> Result<OutletResult> {
        if !self.config.enabled {
            return Ok(OutletResult { body, tally: None });
        }

        self.log(sink, LogLevel::Debug, "Processing outlet request");

        let has_cards = match body.last_assistant() {
            Some(message) => self.extractor.has_blocks(&message.text()),
            None => {
                self.log(sink, LogLevel::Debug, "No assistant message found");
                return Ok(OutletResult { body, tally: None });
            }
        };
        if !has_cards {
            return Ok(OutletResult { body, tally: None });
        }

        let tally = self.extractor.tally(&body.messages, previous_total);
        self.log(
            sink,
            LogLevel::Info,
            &format!("Found {} new card(s) in this response", tally.new),
        );

        if let Some(last) = body.last_assistant_mut() {
            last.rewrite_text(strip_annotations);
            last.append_text(&status_annotation(&tally));
        }

        sink.emit(StatusEvent::success(format!(
            "Found {} new cards. Total: {}",
            tally.new, tally.total
        )));

        Ok(OutletResult {
            body,
            tally: Some(tally),
        })
    }

    /// Action hook: re-scan the conversation and package every card
    pub fn export(&self, body: &Body, sink: &mut dyn StatusSink) -> Result<ExportedDeck> {
        sink.emit(StatusEvent::progress(
            "Extracting flashcards from conversation...",
        ));

        let scan = self.extractor.extract(&body.messages);
        if scan.records.is_empty() {
            sink.emit(StatusEvent::error(format!(
                "No flashcards found in this conversation. Make sure the LLM has generated cards in <{}> tags.",
                self.config.card_tag
            )));
            return Err(DeckCreatorError::EmptyDeck);
        }

        sink.emit(StatusEvent::progress(format!(
            "Found {} cards. Generating .apkg file...",
            scan.records.len()
        )));

        let result = self
            .builder
            .assemble(&scan.records)
            .and_then(|deck| deck.to_apkg().map(|bytes| (deck, bytes)));
        let (deck, bytes) = match result {
            Ok(built) => built,
            Err(e) => {
                sink.emit(StatusEvent::error(format!("Error creating .apkg file: {}", e)));
                return Err(e);
            }
        };

        sink.emit(StatusEvent::success(format!(
            "Successfully generated Anki deck with {} cards!",
            deck.notes.len()
        )));
        info!(
            "Exported {:?}: {} note(s), {} card(s)",
            self.builder.spec().file_name(),
            deck.notes.len(),
            deck.card_count()
        );

        Ok(ExportedDeck {
            file_name: self.builder.spec().file_name(),
            note_count: deck.notes.len(),
            card_count: deck.card_count(),
            skipped: deck.skipped,
            duplicates: deck.duplicates,
            malformed: scan.malformed,
            bytes,
        })
    }
}
