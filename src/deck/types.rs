//! Core deck types.

use serde::Serialize;

/// Title used when the document has no `# ` heading in its preamble.
pub const DEFAULT_TITLE: &str = "Presentation";

/// Version used when the preamble has no version field.
pub const DEFAULT_VERSION: &str = "1.0";

/// A parsed presentation: metadata plus slides in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Deck {
    pub metadata: Metadata,
    pub slides: Vec<Slide>,
}

impl Deck {
    /// Number of slides in the deck.
    pub fn len(&self) -> usize {
        self.slides.len()
    }

    /// Returns true when no slide boundary was found.
    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }

    /// Look up a slide by its 1-based id.
    pub fn slide(&self, id: usize) -> Option<&Slide> {
        id.checked_sub(1).and_then(|idx| self.slides.get(idx))
    }
}

/// Labelled fields from the preamble before the first `---`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metadata {
    pub title: String,
    pub version: String,
    pub date: String,
    pub phase: String,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            version: DEFAULT_VERSION.to_string(),
            date: String::new(),
            phase: String::new(),
        }
    }
}

/// One page of the presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slide {
    /// 1-based position in the deck
    pub id: usize,
    pub title: String,
    pub content: Vec<ContentBlock>,
    /// Source lines of the slide, joined with `\n`
    pub raw_markdown: String,
}

/// Discriminant of a [`ContentBlock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockKind {
    Text,
    Heading,
    List,
    Table,
    Code,
    Diagram,
    DiagramRef,
}

/// A typed unit of slide content.
///
/// `content` is the raw payload with its delimiting syntax removed but
/// otherwise unparsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ContentBlock {
    Text { content: String },
    Heading { content: String },
    List { content: String },
    Table { content: String },
    Code {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        language: Option<String>,
    },
    Diagram { content: String },
    /// Pointer to a diagram file, resolved at render time.
    DiagramRef {
        content: String,
        #[serde(rename = "diagramPath")]
        path: String,
    },
}

impl ContentBlock {
    pub fn content(&self) -> &str {
        match self {
            Self::Text { content }
            | Self::Heading { content }
            | Self::List { content }
            | Self::Table { content }
            | Self::Code { content, .. }
            | Self::Diagram { content }
            | Self::DiagramRef { content, .. } => content,
        }
    }

    pub const fn kind(&self) -> BlockKind {
        match self {
            Self::Text { .. } => BlockKind::Text,
            Self::Heading { .. } => BlockKind::Heading,
            Self::List { .. } => BlockKind::List,
            Self::Table { .. } => BlockKind::Table,
            Self::Code { .. } => BlockKind::Code,
            Self::Diagram { .. } => BlockKind::Diagram,
            Self::DiagramRef { .. } => BlockKind::DiagramRef,
        }
    }

    /// True for inline diagram source and diagram file references.
    pub const fn is_diagram(&self) -> bool {
        matches!(self, Self::Diagram { .. } | Self::DiagramRef { .. })
    }
}

/// A list entry with its bullet or ordinal marker stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListItem {
    pub text: String,
    pub ordinal: bool,
}

/// Split a list block payload into items.
///
/// Lines that carry no marker are ignored; the segmenter has already folded
/// soft-wrapped continuation lines into their item.
pub fn list_items(content: &str) -> Vec<ListItem> {
    content
        .lines()
        .map(str::trim)
        .filter_map(|line| {
            if let Some(rest) = strip_bullet(line) {
                return Some(ListItem {
                    text: rest.to_string(),
                    ordinal: false,
                });
            }
            strip_ordinal(line).map(|rest| ListItem {
                text: rest.to_string(),
                ordinal: true,
            })
        })
        .collect()
}

/// True when any item of the list uses an `N.` marker.
pub fn is_ordered_list(content: &str) -> bool {
    list_items(content).iter().any(|item| item.ordinal)
}

pub(crate) fn strip_bullet(line: &str) -> Option<&str> {
    let rest = line.strip_prefix('-').or_else(|| line.strip_prefix('*'))?;
    rest.starts_with(char::is_whitespace)
        .then(|| rest.trim_start())
}

pub(crate) fn strip_ordinal(line: &str) -> Option<&str> {
    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let rest = line[digits..].strip_prefix('.')?;
    rest.starts_with(char::is_whitespace)
        .then(|| rest.trim_start())
}

/// A pipe table split into header cells and data rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Parse a table block payload.
    ///
    /// The second line is the header separator and is skipped. Rows are padded
    /// or truncated to the header width. Returns `None` when there are fewer
    /// than two non-blank lines.
    pub fn parse(content: &str) -> Option<Self> {
        let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
        if lines.len() < 2 {
            return None;
        }

        let headers: Vec<String> = split_cells(lines[0])
            .into_iter()
            .filter(|cell| !is_separator_cell(cell))
            .collect();

        let rows = lines[2..]
            .iter()
            .map(|line| {
                let mut cells = split_cells(line);
                cells.resize(headers.len(), String::new());
                cells
            })
            .collect();

        Some(Self { headers, rows })
    }
}

fn split_cells(line: &str) -> Vec<String> {
    line.split('|')
        .map(str::trim)
        .filter(|cell| !cell.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn is_separator_cell(cell: &str) -> bool {
    cell.chars().all(|c| c == '-' || c == ':')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_kind_matches_variant() {
        let block = ContentBlock::DiagramRef {
            content: "@ref:a.puml".to_string(),
            path: "a.puml".to_string(),
        };
        assert_eq!(block.kind(), BlockKind::DiagramRef);
        assert_eq!(block.content(), "@ref:a.puml");
        assert!(block.is_diagram());
        assert!(!ContentBlock::Text { content: String::new() }.is_diagram());
    }

    #[test]
    fn test_block_serializes_with_kebab_type_tag() {
        let block = ContentBlock::DiagramRef {
            content: "@ref:flow.puml".to_string(),
            path: "flow.puml".to_string(),
        };
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "diagram-ref");
        assert_eq!(json["diagramPath"], "flow.puml");

        let code = ContentBlock::Code {
            content: "x".to_string(),
            language: None,
        };
        let json = serde_json::to_value(&code).unwrap();
        assert_eq!(json["type"], "code");
        assert!(json.get("language").is_none());
    }

    #[test]
    fn test_deck_slide_lookup_is_one_based() {
        let deck = Deck {
            metadata: Metadata::default(),
            slides: vec![Slide {
                id: 1,
                title: "Only".to_string(),
                content: Vec::new(),
                raw_markdown: String::new(),
            }],
        };
        assert!(deck.slide(0).is_none());
        assert_eq!(deck.slide(1).map(|s| s.title.as_str()), Some("Only"));
        assert!(deck.slide(2).is_none());
    }

    #[test]
    fn test_list_items_strip_markers() {
        let items = list_items("- first\n* second\n10. tenth");
        let texts: Vec<_> = items.iter().map(|i| i.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "tenth"]);
        assert!(items[2].ordinal);
        assert!(!items[0].ordinal);
    }

    #[test]
    fn test_ordered_list_detection() {
        assert!(is_ordered_list("1. one\n2. two"));
        assert!(!is_ordered_list("- one\n- two"));
    }

    #[test]
    fn test_markers_require_whitespace() {
        assert_eq!(strip_bullet("-x"), None);
        assert_eq!(strip_ordinal("1.x"), None);
        assert_eq!(strip_ordinal("v1. x"), None);
        assert_eq!(strip_bullet("- x"), Some("x"));
    }

    #[test]
    fn test_table_parse_skips_separator_row() {
        let table = Table::parse("| A | B |\n|---|:--:|\n| 1 | 2 |\n| 3 |").unwrap();
        assert_eq!(table.headers, vec!["A", "B"]);
        assert_eq!(
            table.rows,
            vec![
                vec!["1".to_string(), "2".to_string()],
                vec!["3".to_string(), String::new()],
            ]
        );
    }

    #[test]
    fn test_table_parse_needs_two_lines() {
        assert!(Table::parse("| A | B |").is_none());
        assert!(Table::parse("| A | B |\n\n").is_none());
    }
}
