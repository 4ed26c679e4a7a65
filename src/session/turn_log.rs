//! JSON-lines log of answered turns

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::ConversationTurn;
use crate::Result;

/// Appends one JSON object per answered turn
#[derive(Debug, Clone)]
pub struct TurnLog {
    path: PathBuf,
}

impl TurnLog {
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `turn` as a single line
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be opened or written
    pub fn append(&self, turn: &ConversationTurn) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(turn)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{line}")?;

        tracing::debug!(path = %self.path.display(), turn = %turn.id, "logged turn");
        Ok(())
    }
}
