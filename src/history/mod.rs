//! Transcript trimming for inbound requests
//!
//! Keeps the system prompt, the current user message and a window of recent
//! messages. Metadata lines from dropped user messages are carried forward.

mod annotation;
mod reducer;

pub use annotation::{has_annotation, status_annotation, strip_annotations, INFO_END, INFO_START};
pub use reducer::{HistoryReducer, Reduction, PRESERVED_HEADER};
