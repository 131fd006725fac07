//! Prompt text teaching the LLM the card block format

use super::schema::FieldSchema;
use serde_json::{Map, Value};

/// First line of the instruction; also used to detect an earlier injection
pub const INSTRUCTION_HEADER: &str = "**IMPORTANT INSTRUCTION FOR FLASHCARD CREATION:**";

/// Separator placed between an existing system prompt and the instruction
pub const INSTRUCTION_SEPARATOR: &str = "\n\n---";

const CLOZE_EXAMPLE: &str = "What is this?<br>{{c1::This is an example of hidden content}}";
const SECONDARY_EXAMPLE: &str = "Additional information here";

/// Build the flashcard instruction for a schema and block tag
pub fn flashcard_instruction(schema: &FieldSchema, tag: &str) -> String {
    let fields_list = schema
        .fields()
        .iter()
        .map(|f| format!("- **{}**: {}", f.name, f.description))
        .collect::<Vec<_>>()
        .join("\n");

    let mut example = Map::new();
    for (i, name) in schema.names().enumerate() {
        let value = if i == 0 { CLOZE_EXAMPLE } else { SECONDARY_EXAMPLE };
        example.insert(name.to_string(), Value::String(value.to_string()));
    }
    let example_json = serde_json::to_string_pretty(&Value::Array(vec![Value::Object(example)]))
        .unwrap_or_default();

    format!(
        "\n\n{INSTRUCTION_HEADER}\n\n\
         When creating flashcards, keep your response VERY brief.\n\
         Just acknowledge briefly and provide the cards in the specified format.\n\n\
         You MUST include a JSON array of flashcard dictionaries enclosed in <{tag}> tags.\n\n\
         Each flashcard should be a dictionary with the following fields:\n\
         {fields_list}\n\n\
         For cloze deletions, use the format {{{{c1::text to hide}}}}, {{{{c2::another hidden text}}}}, etc.\n\n\
         Example format:\n\
         <{tag}>\n\
         {example_json}\n\
         </{tag}>\n\n\
         The user can then use the 'Generate Anki Deck' action button to create a downloadable .apkg file.\n"
    )
}

/// Whether a system prompt already carries the instruction
pub fn has_instruction(text: &str) -> bool {
    text.contains(INSTRUCTION_HEADER)
}
