//! Slide deck model and parsing.
//!
//! This module handles:
//! - Segmenting constrained markdown into slides and typed content blocks
//! - Parsing list, table and phase-plan payloads for display
//! - Caching parse results by source content

mod cache;
mod parser;
mod phase;
mod types;

use std::path::Path;

use anyhow::{Context, Result};

pub use cache::{DeckCache, hash_bytes};
pub use parser::parse;
pub use phase::{Phase, is_phase_diagram, parse_phases};
pub use types::{
    BlockKind, ContentBlock, DEFAULT_TITLE, DEFAULT_VERSION, Deck, ListItem, Metadata, Slide,
    Table, is_ordered_list, list_items,
};

/// Read and parse a deck file.
///
/// # Errors
///
/// Returns an error if the file cannot be read. Parsing itself never fails.
pub fn load(path: &Path) -> Result<Deck> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read deck {}", path.display()))?;
    Ok(parse(&source))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.md");
        std::fs::write(&path, "# Loaded\n---\n## Slide 1: A\nx\n").unwrap();
        let deck = load(&path).unwrap();
        assert_eq!(deck.metadata.title, "Loaded");
        assert_eq!(deck.len(), 1);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("missing.md")).unwrap_err();
        assert!(err.to_string().contains("Failed to read deck"));
    }
}
