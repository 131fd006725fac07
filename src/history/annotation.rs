//! Card-count annotations appended to assistant replies
//!
//! The outlet appends a short status block wrapped in HTML comment markers.
//! The next inlet strips it again so the notice never accumulates in the
//! prompt sent to the LLM.

use crate::cards::CardTally;
use regex::Regex;
use std::sync::LazyLock;

pub const INFO_START: &str = "<!-- ANKI_INFO_START -->";
pub const INFO_END: &str = "<!-- ANKI_INFO_END -->";

static ANNOTATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\s*<!-- ANKI_INFO_START -->.*?<!-- ANKI_INFO_END -->")
        .expect("annotation pattern is valid")
});

/// Remove every annotation block. Running it twice is a no-op.
pub fn strip_annotations(text: &str) -> String {
    ANNOTATION.replace_all(text, "").into_owned()
}

pub fn has_annotation(text: &str) -> bool {
    ANNOTATION.is_match(text)
}

/// Status block reporting card counts after a response
pub fn status_annotation(tally: &CardTally) -> String {
    let mut info = format!("\n\n{}\n\n---\n\n✅ **Flashcards formatted successfully!**\n\n", INFO_START);
    info.push_str(&format!("🆕 New cards in this response: **{}**\n", tally.new));
    info.push_str(&format!("📊 Total cards in conversation: **{}**\n", tally.total));
    if tally.malformed > 0 {
        info.push_str(&format!(
            "⚠️ Skipped malformed entries: **{}**\n",
            tally.malformed
        ));
    }
    info.push_str(
        "\n💡 Click the **'Generate Anki Deck'** action button below to download all cards as a .apkg file.\n",
    );
    info.push('\n');
    info.push_str(INFO_END);
    info
}
