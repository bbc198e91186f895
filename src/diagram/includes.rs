//! Diagram file access and `!include` expansion.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;

use super::INCLUDE_DIRECTIVE;

/// Source of diagram files addressed by paths relative to a diagrams root.
pub trait DiagramStore: Send + Sync {
    /// Read the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or cannot be read.
    fn fetch(&self, path: &str) -> io::Result<String>;
}

/// Reads diagram files from a directory on disk.
#[derive(Debug, Clone)]
pub struct FsDiagramStore {
    root: PathBuf,
}

impl FsDiagramStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl DiagramStore for FsDiagramStore {
    fn fetch(&self, path: &str) -> io::Result<String> {
        std::fs::read_to_string(self.root.join(path.trim_start_matches('/')))
    }
}

/// In-memory store, keyed by relative path.
#[derive(Debug, Clone, Default)]
pub struct MemoryDiagramStore {
    files: HashMap<String, String>,
}

impl MemoryDiagramStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }
}

impl DiagramStore for MemoryDiagramStore {
    fn fetch(&self, path: &str) -> io::Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))
    }
}

/// Expand every `!include <path>` line of `text` with the referenced file.
///
/// Includes nest. A directive whose file is missing, or that would re-enter a
/// file already on the current include chain, is kept verbatim and logged.
/// Paths in angle brackets name the renderer's standard library and are left
/// for the renderer.
pub fn resolve_includes(store: &dyn DiagramStore, text: &str) -> String {
    let mut chain = Vec::new();
    expand(store, text, &mut chain)
}

/// Like [`resolve_includes`] for the contents of `root_path`, so that a file
/// including itself is caught as a cycle.
pub(crate) fn resolve_file_includes(store: &dyn DiagramStore, root_path: &str, text: &str) -> String {
    let mut chain = vec![root_path.to_string()];
    expand(store, text, &mut chain)
}

fn expand(store: &dyn DiagramStore, text: &str, chain: &mut Vec<String>) -> String {
    let mut out: Vec<String> = Vec::new();

    for line in text.lines() {
        let Some(path) = include_target(line) else {
            out.push(line.to_string());
            continue;
        };

        if chain.iter().any(|p| p == path) {
            tracing::warn!(path, chain = ?chain, "include cycle, leaving directive unresolved");
            out.push(line.to_string());
            continue;
        }

        match store.fetch(path) {
            Ok(content) => {
                chain.push(path.to_string());
                out.push(expand(store, content.trim_end(), chain));
                chain.pop();
            }
            Err(err) => {
                tracing::warn!(path, error = %err, "include not found, leaving directive unresolved");
                out.push(line.to_string());
            }
        }
    }

    out.join("\n")
}

fn include_target(line: &str) -> Option<&str> {
    let rest = line.trim().strip_prefix(INCLUDE_DIRECTIVE)?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let path = rest.trim();
    if path.is_empty() || (path.starts_with('<') && path.ends_with('>')) {
        return None;
    }
    Some(path)
}
