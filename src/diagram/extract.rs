//! Moving inline diagram fences out of a deck and into `.puml` files.
//!
//! Each non-empty ```` ```plantuml ```` fence is replaced by a
//! `@ref:<file>` pointer; the fence markers stay so the deck still parses
//! the block as a diagram reference.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use super::{DIAGRAM_LANGUAGE, REFERENCE_PREFIX};

pub const DIAGRAM_EXTENSION: &str = "puml";

const FENCE: &str = "```";

static SLIDE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^##\s+\S+\s+(\d+):").expect("valid slide number regex"));
static NAMED_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@startuml\s+(\S+)").expect("valid named start regex"));

/// Diagram source lifted out of the deck.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDiagram {
    pub file_name: String,
    /// Fence body, newline terminated
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// The deck with every extracted fence body replaced by a pointer
    pub markdown: String,
    pub diagrams: Vec<ExtractedDiagram>,
}

/// Lift inline diagram fences out of `markdown`.
///
/// Files are named after `@startuml <name>` when present, otherwise
/// `slide<N>-diagram<K>` where `K` counts diagrams within slide `N`. Fences
/// that are empty, already hold a pointer, or are never closed are left
/// untouched.
pub fn extract_diagrams(markdown: &str) -> Extraction {
    let lines: Vec<&str> = markdown.split('\n').collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut diagrams = Vec::new();
    let mut taken = HashSet::new();
    let mut slide = 0;
    let mut count = 0;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        i += 1;

        if let Some(number) = SLIDE_NUMBER
            .captures(line)
            .and_then(|caps| caps[1].parse().ok())
        {
            slide = number;
            count = 0;
        }

        if !is_diagram_fence(line) {
            out.push(line.to_string());
            continue;
        }

        let Some(close) = lines[i..]
            .iter()
            .position(|l| l.trim() == FENCE)
            .map(|offset| i + offset)
        else {
            out.extend(lines[i - 1..].iter().map(ToString::to_string));
            break;
        };

        let body: Vec<&str> = lines[i..close]
            .iter()
            .map(|l| l.trim_end_matches('\r'))
            .collect();
        out.push(line.to_string());

        if body.iter().all(|l| l.trim().is_empty()) || is_pointer(&body) {
            out.extend(lines[i..close].iter().map(ToString::to_string));
        } else {
            count += 1;
            let file_name = claim(file_name(&body, slide, count), &mut taken);
            out.push(format!("{REFERENCE_PREFIX}{file_name}"));
            diagrams.push(ExtractedDiagram {
                file_name,
                source: format!("{}\n", body.join("\n")),
            });
        }

        out.push(lines[close].to_string());
        i = close + 1;
    }

    Extraction {
        markdown: out.join("\n"),
        diagrams,
    }
}

/// Write extracted diagrams under `dir`, creating it if needed.
///
/// Existing files with the same name are overwritten.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or a file cannot be
/// written.
pub fn write_diagrams(dir: &Path, diagrams: &[ExtractedDiagram]) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create diagrams directory {}", dir.display()))?;

    diagrams
        .iter()
        .map(|diagram| {
            let path = dir.join(&diagram.file_name);
            std::fs::write(&path, &diagram.source)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::debug!(path = %path.display(), "wrote diagram file");
            Ok(path)
        })
        .collect()
}

fn is_diagram_fence(line: &str) -> bool {
    line.trim()
        .strip_prefix(FENCE)
        .is_some_and(|info| info.trim_start().starts_with(DIAGRAM_LANGUAGE))
}

fn is_pointer(body: &[&str]) -> bool {
    body.first()
        .is_some_and(|first| first.trim().starts_with(REFERENCE_PREFIX))
}

fn file_name(body: &[&str], slide: usize, count: usize) -> String {
    let stem = body
        .iter()
        .find_map(|line| NAMED_START.captures(line))
        .map(|caps| {
            caps[1]
                .to_lowercase()
                .chars()
                .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '-' })
                .collect::<String>()
        })
        .unwrap_or_else(|| format!("slide{slide}-diagram{count}"));
    format!("{stem}.{DIAGRAM_EXTENSION}")
}

/// Suffix `-2`, `-3`, ... until the name is unused.
fn claim(name: String, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.clone()) {
        return name;
    }
    let stem = name.trim_end_matches(&format!(".{DIAGRAM_EXTENSION}")).to_string();
    let mut n = 2;
    loop {
        let candidate = format!("{stem}-{n}.{DIAGRAM_EXTENSION}");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
