//! Box-art phase plans drawn inside code fences.
//!
//! A plan is a column of boxes, each opened by a `ФАЗА N: title` line and
//! holding `•` bullet items, joined by `↓` arrows:
//!
//! ```text
//! ┌──────────────────────┐
//! │ ФАЗА 1: Пилот        │
//! │ • Один цех           │
//! └──────────────────────┘
//!            ↓
//! ```

use std::sync::LazyLock;

use regex::Regex;

const PHASE_MARKER: &str = "ФАЗА";

static PHASE_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ФАЗА\s*(\d+):\s*(.+)").expect("valid phase title regex"));
static PHASE_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[•*]\s*(.+)").expect("valid phase item regex"));

/// One box of a phase plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase {
    pub title: String,
    pub items: Vec<String>,
}

/// True when a code block payload looks like a phase plan.
pub fn is_phase_diagram(content: &str) -> bool {
    content.contains(PHASE_MARKER) && (content.contains("┌──") || content.contains('─'))
}

/// Read the phases of a box-art plan, in drawing order.
///
/// Returns an empty list when no `ФАЗА N:` line is present.
pub fn parse_phases(content: &str) -> Vec<Phase> {
    let mut phases = Vec::new();
    let mut current: Option<Phase> = None;

    for line in content.lines().map(str::trim) {
        if line.is_empty() || line == "↓" || line.chars().all(|c| c == '─') {
            continue;
        }

        if let Some(caps) = PHASE_TITLE.captures(line) {
            phases.extend(current.take());
            current = Some(Phase {
                title: strip_border(&caps[2]).to_string(),
                items: Vec::new(),
            });
            continue;
        }

        if let Some(phase) = current.as_mut() {
            if line.contains('•') {
                if let Some(caps) = PHASE_ITEM.captures(line) {
                    let item = strip_border(&caps[1]);
                    if !item.is_empty() {
                        phase.items.push(item.to_string());
                    }
                }
                continue;
            }
        }

        if line.contains("└──") && current.as_ref().is_some_and(|p| !p.items.is_empty()) {
            phases.extend(current.take());
        }
    }

    phases.extend(current);
    phases
}

fn strip_border(text: &str) -> &str {
    let text = text.trim();
    let text = text.strip_prefix('│').unwrap_or(text).trim_start();
    text.strip_suffix('│').unwrap_or(text).trim_end()
}
