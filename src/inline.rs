//! Inline emphasis: `**bold**` and `*italic*` spans within a line of text.
//!
//! Markers are consumed; everything else passes through untouched, so the
//! concatenated run text is the input with its formatting markers removed.
//! Emphasis never spans a newline and does not nest.

use std::sync::LazyLock;

use regex::Regex;

static BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("valid bold regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineStyle {
    Plain,
    Bold,
    Italic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineRun {
    pub style: InlineStyle,
    pub text: String,
}

impl InlineRun {
    fn new(style: InlineStyle, text: &str) -> Self {
        Self {
            style,
            text: text.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Span {
    start: usize,
    end: usize,
    style: InlineStyle,
}

impl Span {
    const fn marker_len(&self) -> usize {
        match self.style {
            InlineStyle::Bold => 2,
            _ => 1,
        }
    }

    const fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Split `text` into plain, bold and italic runs.
///
/// # Example
///
/// ```
/// use slidemark::inline::{parse_inline, InlineStyle};
///
/// let runs = parse_inline("a **b** *c*");
/// let styles: Vec<_> = runs.iter().map(|r| r.style).collect();
/// assert_eq!(
///     styles,
///     [InlineStyle::Plain, InlineStyle::Bold, InlineStyle::Plain, InlineStyle::Italic]
/// );
/// ```
pub fn parse_inline(text: &str) -> Vec<InlineRun> {
    let bold: Vec<Span> = BOLD
        .find_iter(text)
        .map(|m| Span {
            start: m.start(),
            end: m.end(),
            style: InlineStyle::Bold,
        })
        .collect();

    let mut spans: Vec<Span> = italic_spans(text)
        .into_iter()
        .filter(|italic| !bold.iter().any(|b| b.overlaps(italic)))
        .chain(bold.iter().copied())
        .collect();
    spans.sort_by_key(|span| span.start);

    let mut runs = Vec::new();
    let mut cursor = 0;
    for span in spans {
        if span.start < cursor {
            continue;
        }
        if span.start > cursor {
            runs.push(InlineRun::new(InlineStyle::Plain, &text[cursor..span.start]));
        }
        let inner = &text[span.start + span.marker_len()..span.end - span.marker_len()];
        runs.push(InlineRun::new(span.style, inner));
        cursor = span.end;
    }
    if cursor < text.len() {
        runs.push(InlineRun::new(InlineStyle::Plain, &text[cursor..]));
    }
    runs
}

/// Text with every marker removed.
pub fn plain_text(text: &str) -> String {
    parse_inline(text).into_iter().map(|run| run.text).collect()
}

/// `*x*` where neither star touches another star.
fn italic_spans(text: &str) -> Vec<Span> {
    let bytes = text.as_bytes();
    let is_lone_star = |i: usize| {
        bytes[i] == b'*'
            && (i == 0 || bytes[i - 1] != b'*')
            && bytes.get(i + 1).is_none_or(|&b| b != b'*')
    };

    let mut spans = Vec::new();
    let mut open = 0;
    'scan: while open < bytes.len() {
        if !is_lone_star(open) || bytes.get(open + 1).is_none_or(|&b| b == b'\n') {
            open += 1;
            continue;
        }
        for close in open + 2..bytes.len() {
            if bytes[close] == b'\n' {
                break;
            }
            if is_lone_star(close) {
                spans.push(Span {
                    start: open,
                    end: close + 1,
                    style: InlineStyle::Italic,
                });
                open = close + 1;
                continue 'scan;
            }
        }
        open += 1;
    }
    spans
}
