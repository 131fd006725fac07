//! Regex patterns selecting lines that must survive history trimming

use crate::{DeckCreatorError, Result};
use regex::Regex;

/// Collect every line of `text` matched by at least one pattern, in source
/// order. Each pattern is tried against one line at a time; a line matched by
/// several patterns is returned once.
pub fn preserved_lines(patterns: &[Regex], text: &str) -> Vec<String> {
    if patterns.is_empty() {
        return Vec::new();
    }

    text.lines()
        .map(|line| line.trim_end())
        .filter(|line| !line.is_empty())
        .filter(|line| patterns.iter().any(|p| p.is_match(line)))
        .map(str::to_string)
        .collect()
}

/// Compiled set of preservation patterns
#[derive(Debug, Clone, Default)]
pub struct PreservePatterns {
    patterns: Vec<Regex>,
}

impl PreservePatterns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile pattern sources, failing on the first invalid one
    pub fn compile<I, S>(sources: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = sources
            .into_iter()
            .map(|s| {
                Regex::new(s.as_ref()).map_err(|e| {
                    DeckCreatorError::Configuration(format!(
                        "invalid preserve pattern {:?}: {}",
                        s.as_ref(),
                        e
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn sources(&self) -> Vec<&str> {
        self.patterns.iter().map(|p| p.as_str()).collect()
    }

    /// Lines of `text` that must be carried forward
    pub fn preserved_lines(&self, text: &str) -> Vec<String> {
        preserved_lines(&self.patterns, text)
    }
}
