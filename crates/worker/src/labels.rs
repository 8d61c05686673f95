//! Class-index to name mapping
//!
//! Loaded once before any worker starts and never mutated afterwards, so it is
//! shared across workers without locking.

use cocoserve_common::{CocoError, Result};
use std::borrow::Cow;
use std::path::Path;
use tracing::info;

/// Read-only label table, index = 0-based line number
#[derive(Debug, Clone, Default)]
pub struct LabelTable {
    names: Vec<String>,
}

impl LabelTable {
    /// Load labels from a line-oriented text file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| CocoError::labels(format!("Failed to read {}: {}", path.display(), e)))?;

        let table = Self::from_lines(content.lines());
        if table.is_empty() {
            return Err(CocoError::labels(format!("{} contains no labels", path.display())));
        }

        info!(path = %path.display(), labels = table.len(), "Loaded label table");
        Ok(table)
    }

    /// Build a table from already-split lines
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = lines
            .into_iter()
            .map(|line| line.into().trim_end_matches('\r').to_string())
            .collect();
        Self { names }
    }

    /// Human-readable name for a class index
    ///
    /// Indices past the end of the table render as `#<index>`.
    pub fn name(&self, class: usize) -> Cow<'_, str> {
        match self.names.get(class) {
            Some(name) => Cow::Borrowed(name.as_str()),
            None => Cow::Owned(format!("#{}", class)),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
