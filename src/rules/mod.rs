//! Line preservation rules applied to messages dropped from history

mod preserve;

pub use preserve::{preserved_lines, PreservePatterns};
