//! Flashcard records: schema, extraction from assistant text, and the
//! instruction that tells the LLM how to format them.

mod extractor;
mod instruction;
mod schema;

pub use extractor::{CardExtractor, CardRecord, CardScan, CardTally};
pub use instruction::{flashcard_instruction, has_instruction, INSTRUCTION_HEADER, INSTRUCTION_SEPARATOR};
pub use schema::{FieldSchema, FieldSpec};
