//! Single-pass, line-oriented slide segmentation.
//!
//! The parser never fails: unrecognised lines degrade to text blocks, open
//! blocks are flushed at the end of a slide, and a document without a `---`
//! separator yields a deck with no slides.

use std::sync::LazyLock;

use regex::Regex;

use super::types::{ContentBlock, Deck, Metadata, Slide, strip_bullet, strip_ordinal};
use crate::diagram::{DIAGRAM_LANGUAGE, END_TAG, REFERENCE_PREFIX, START_TAG};

/// Only the first few lines are searched for the title and labelled fields.
const METADATA_SCAN_LINES: usize = 10;

const RULE: &str = "---";
const FENCE: &str = "```";

static SLIDE_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^##\s+\S+\s+\d+:").expect("valid slide heading regex"));
static TITLE_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\S+\s+\d+:\s*").expect("valid title label regex"));
static VERSION_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*\*(?:Версия|Version):\*\*\s*(.+)").expect("valid version regex")
});
static DATE_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(?:Дата|Date):\*\*\s*(.+)").expect("valid date regex"));
static PHASE_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*\*(?:Этап|Phase)\s*\d+:\s*(.+)").expect("valid phase regex")
});

/// Parse markdown source into a [`Deck`].
///
/// # Example
///
/// ```
/// use slidemark::deck::{parse, BlockKind};
///
/// let deck = parse("# Talk\n---\n## Slide 1: Hello\nWorld\n");
/// assert_eq!(deck.metadata.title, "Talk");
/// assert_eq!(deck.slides[0].title, "Hello");
/// assert_eq!(deck.slides[0].content[0].kind(), BlockKind::Text);
/// ```
pub fn parse(source: &str) -> Deck {
    let lines: Vec<&str> = source.lines().collect();
    let metadata = extract_metadata(&lines);
    let slides: Vec<Slide> = split_into_slides(&lines)
        .into_iter()
        .enumerate()
        .map(|(idx, section)| parse_slide(&section, idx + 1))
        .collect();

    tracing::debug!(
        title = %metadata.title,
        slides = slides.len(),
        "parsed deck"
    );

    Deck { metadata, slides }
}

fn extract_metadata(lines: &[&str]) -> Metadata {
    let mut metadata = Metadata::default();

    for line in lines.iter().take(METADATA_SCAN_LINES).map(|l| l.trim()) {
        if line.starts_with("# ") {
            metadata.title = strip_heading_marks(line).to_string();
        } else {
            if let Some(value) = capture(&VERSION_FIELD, line) {
                metadata.version = value;
            }
            if let Some(value) = capture(&DATE_FIELD, line) {
                metadata.date = value;
            }
            if let Some(value) = capture(&PHASE_FIELD, line) {
                metadata.phase = value.trim_end_matches('*').trim_end().to_string();
            }
        }

        if line == RULE {
            break;
        }
    }

    if metadata.title.is_empty() {
        metadata.title = super::types::DEFAULT_TITLE.to_string();
    }
    if metadata.version.is_empty() {
        metadata.version = super::types::DEFAULT_VERSION.to_string();
    }
    metadata
}

fn capture(re: &Regex, line: &str) -> Option<String> {
    re.captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Cut the body (everything after the first `---`) into slide sections.
fn split_into_slides<'a>(lines: &[&'a str]) -> Vec<Vec<&'a str>> {
    let mut slides = Vec::new();
    let mut current: Vec<&'a str> = Vec::new();
    let mut in_body = false;

    for &line in lines {
        let trimmed = line.trim();

        if !in_body {
            in_body = trimmed == RULE;
            continue;
        }

        if SLIDE_HEADING.is_match(line) {
            if !current.is_empty() {
                slides.push(std::mem::take(&mut current));
            }
            current.push(line);
        } else if trimmed == RULE {
            if !current.is_empty() {
                slides.push(std::mem::take(&mut current));
            }
        } else if !current.is_empty() || !trimmed.is_empty() {
            current.push(line);
        }
    }

    if !current.is_empty() {
        slides.push(current);
    }
    slides
}

fn parse_slide(section: &[&str], id: usize) -> Slide {
    let heading = section
        .first()
        .map(|line| line.trim())
        .filter(|line| line.starts_with("## "));

    let title = heading
        .map(slide_title)
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| format!("Slide {id}"));

    let body = if heading.is_some() { &section[1..] } else { section };

    Slide {
        id,
        title,
        content: segment(body),
        raw_markdown: section.join("\n"),
    }
}

/// `## Slide 3: Results` becomes `Results`; a heading without the numbered
/// label is used as-is.
fn slide_title(heading: &str) -> String {
    let text = strip_heading_marks(heading);
    TITLE_LABEL.replace(text, "").trim().to_string()
}

fn strip_heading_marks(line: &str) -> &str {
    line.trim_start_matches('#').trim()
}

/// The block currently being accumulated.
#[derive(Debug, Default)]
enum Mode<'a> {
    #[default]
    None,
    Code {
        language: &'a str,
        body: Vec<&'a str>,
    },
    Table(Vec<&'a str>),
    List(Vec<String>),
}

fn segment(lines: &[&str]) -> Vec<ContentBlock> {
    let mut blocks = Vec::new();
    let mut mode = Mode::None;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim();
        i += 1;

        if let Some(fence_info) = trimmed.strip_prefix(FENCE) {
            match std::mem::take(&mut mode) {
                Mode::Code { language, body } => blocks.push(classify_fence(language, &body)),
                open => {
                    flush(open, &mut blocks);
                    mode = Mode::Code {
                        language: fence_info.trim(),
                        body: Vec::new(),
                    };
                }
            }
            continue;
        }

        if let Mode::Code { body, .. } = &mut mode {
            body.push(line);
            continue;
        }

        if is_table_row(trimmed) {
            if let Mode::Table(rows) = &mut mode {
                rows.push(line);
            } else {
                flush(std::mem::take(&mut mode), &mut blocks);
                mode = Mode::Table(vec![line]);
            }
            continue;
        }
        if matches!(mode, Mode::Table(_)) {
            flush(std::mem::take(&mut mode), &mut blocks);
        }

        if is_list_item(trimmed) {
            if let Mode::List(items) = &mut mode {
                items.push(trimmed.to_string());
            } else {
                mode = Mode::List(vec![trimmed.to_string()]);
            }
            continue;
        }
        if matches!(mode, Mode::List(_)) {
            if trimmed.is_empty() {
                flush(std::mem::take(&mut mode), &mut blocks);
            } else {
                // Soft wrap: the line continues the previous item.
                if let Mode::List(items) = &mut mode {
                    if let Some(last) = items.last_mut() {
                        last.push(' ');
                        last.push_str(trimmed);
                    }
                }
                continue;
            }
        }

        if trimmed.starts_with("## ") || trimmed.starts_with("### ") {
            blocks.push(ContentBlock::Heading {
                content: strip_heading_marks(trimmed).to_string(),
            });
            continue;
        }

        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if trimmed.contains(DIAGRAM_LANGUAGE) || trimmed.contains(START_TAG) {
            let start = i - 1;
            let end = lines[start..]
                .iter()
                .position(|l| l.contains(END_TAG))
                .map_or(lines.len(), |offset| start + offset + 1);
            blocks.push(ContentBlock::Diagram {
                content: lines[start..end].join("\n"),
            });
            i = end;
            continue;
        }

        blocks.push(ContentBlock::Text {
            content: trimmed.to_string(),
        });
    }

    flush(mode, &mut blocks);
    blocks
}

fn flush(mode: Mode<'_>, blocks: &mut Vec<ContentBlock>) {
    match mode {
        Mode::None => {}
        Mode::Code { language, body } => {
            if !body.is_empty() {
                blocks.push(classify_fence(language, &body));
            }
        }
        Mode::Table(rows) => {
            if !rows.is_empty() {
                blocks.push(ContentBlock::Table {
                    content: rows.join("\n"),
                });
            }
        }
        Mode::List(items) => {
            if !items.is_empty() {
                blocks.push(ContentBlock::List {
                    content: items.join("\n"),
                });
            }
        }
    }
}

/// Decide between diagram, diagram reference and plain code for a fenced body.
fn classify_fence(language: &str, body: &[&str]) -> ContentBlock {
    let content = body.join("\n");
    let is_diagram = language.eq_ignore_ascii_case(DIAGRAM_LANGUAGE)
        || content.contains(START_TAG)
        || content.contains(END_TAG);

    if !is_diagram {
        return ContentBlock::Code {
            content,
            language: (!language.is_empty()).then(|| language.to_string()),
        };
    }

    match reference_path(body) {
        Some(path) => ContentBlock::DiagramRef { content, path },
        None => ContentBlock::Diagram { content },
    }
}

fn reference_path(body: &[&str]) -> Option<String> {
    let path = body.first()?.trim().strip_prefix(REFERENCE_PREFIX)?.trim();
    (!path.is_empty()).then(|| path.to_string())
}

fn is_table_row(trimmed: &str) -> bool {
    trimmed.contains('|') && trimmed.split('|').count() >= 3
}

fn is_list_item(trimmed: &str) -> bool {
    strip_bullet(trimmed).is_some() || strip_ordinal(trimmed).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::{BlockKind, list_items};

    fn single_slide(body: &str) -> Slide {
        let deck = parse(&format!("# Deck\n---\n## Slide 1: Test\n{body}"));
        assert_eq!(deck.slides.len(), 1, "expected one slide in {deck:#?}");
        deck.slides.into_iter().next().unwrap()
    }

    fn kinds(slide: &Slide) -> Vec<BlockKind> {
        slide.content.iter().map(ContentBlock::kind).collect()
    }

    #[test]
    fn test_scenario_two_slides_with_metadata() {
        let deck = parse(
            "# T\n**Версия:** 1.0\n---\n## Слайд 1: Intro\nHello\n---\n## Слайд 2: Done\n- a\n- b\n",
        );
        assert_eq!(deck.metadata.title, "T");
        assert_eq!(deck.metadata.version, "1.0");
        assert_eq!(deck.slides.len(), 2);

        let first = &deck.slides[0];
        assert_eq!(first.id, 1);
        assert_eq!(first.title, "Intro");
        assert_eq!(
            first.content,
            vec![ContentBlock::Text {
                content: "Hello".to_string()
            }]
        );

        let second = &deck.slides[1];
        assert_eq!(second.id, 2);
        assert_eq!(second.title, "Done");
        assert_eq!(kinds(second), vec![BlockKind::List]);
        let items: Vec<_> = list_items(second.content[0].content())
            .into_iter()
            .map(|item| item.text)
            .collect();
        assert_eq!(items, vec!["a", "b"]);
    }

    #[test]
    fn test_metadata_defaults_when_absent() {
        let deck = parse("intro text\n---\nbody");
        assert_eq!(deck.metadata, Metadata::default());
    }

    #[test]
    fn test_metadata_reads_date_and_phase() {
        let deck = parse(
            "# Roadmap\n**Date:** 2024-05-01\n**Phase 1: Discovery**\n**Version:** 2.1\n---\n",
        );
        assert_eq!(deck.metadata.title, "Roadmap");
        assert_eq!(deck.metadata.date, "2024-05-01");
        assert_eq!(deck.metadata.phase, "Discovery");
        assert_eq!(deck.metadata.version, "2.1");
    }

    #[test]
    fn test_metadata_scan_stops_at_rule() {
        let deck = parse("---\n# Late title\n**Version:** 9\n");
        assert_eq!(deck.metadata.title, "Presentation");
        assert_eq!(deck.metadata.version, "1.0");
    }

    #[test]
    fn test_metadata_scan_limited_to_ten_lines() {
        let mut source = "\n".repeat(10);
        source.push_str("# Too late\n---\n");
        assert_eq!(parse(&source).metadata.title, "Presentation");
    }

    #[test]
    fn test_no_rule_yields_no_slides() {
        let deck = parse("# Title\n## Slide 1: A\ntext\n");
        assert!(deck.is_empty());
    }

    #[test]
    fn test_rule_separated_slides_without_headings() {
        let deck = parse("# T\n---\nfirst\n---\n\n\nsecond\n");
        assert_eq!(deck.slides.len(), 2);
        assert_eq!(deck.slides[0].title, "Slide 1");
        assert_eq!(deck.slides[1].title, "Slide 2");
        assert_eq!(deck.slides[1].content[0].content(), "second");
    }

    #[test]
    fn test_slides_numbered_sequentially_regardless_of_heading_numbers() {
        let deck = parse("# T\n---\n## Slide 7: A\nx\n## Slide 3: B\ny\n");
        let ids: Vec<_> = deck.slides.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(deck.slides[1].title, "B");
    }

    #[test]
    fn test_plain_second_level_heading_as_title() {
        let deck = parse("# T\n---\n## Overview\nbody\n");
        assert_eq!(deck.slides[0].title, "Overview");
        assert_eq!(kinds(&deck.slides[0]), vec![BlockKind::Text]);
    }

    #[test]
    fn test_raw_markdown_keeps_slide_source() {
        let slide = single_slide("line one\nline two");
        assert_eq!(slide.raw_markdown, "## Slide 1: Test\nline one\nline two");
    }

    #[test]
    fn test_adjacent_text_lines_are_not_merged() {
        let slide = single_slide("one\ntwo\n\nthree");
        assert_eq!(kinds(&slide), vec![BlockKind::Text; 3]);
    }

    #[test]
    fn test_headings_inside_slide() {
        let slide = single_slide("## Sub\n### Deeper\n#### dropped\n# dropped");
        assert_eq!(
            slide.content,
            vec![
                ContentBlock::Heading {
                    content: "Sub".to_string()
                },
                ContentBlock::Heading {
                    content: "Deeper".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_fenced_code_keeps_language() {
        let slide = single_slide("```rust\nfn main() {}\n  indented\n```");
        assert_eq!(
            slide.content,
            vec![ContentBlock::Code {
                content: "fn main() {}\n  indented".to_string(),
                language: Some("rust".to_string()),
            }]
        );
    }

    #[test]
    fn test_fenced_code_without_language() {
        let slide = single_slide("```\n| a | b |\n- not a list\n```");
        assert_eq!(
            slide.content,
            vec![ContentBlock::Code {
                content: "| a | b |\n- not a list".to_string(),
                language: None,
            }]
        );
    }

    #[test]
    fn test_fence_tagged_plantuml_is_diagram() {
        let slide = single_slide("```PlantUML\nA -> B\n```");
        assert_eq!(kinds(&slide), vec![BlockKind::Diagram]);
        assert_eq!(slide.content[0].content(), "A -> B");
    }

    #[test]
    fn test_fence_with_start_tag_is_diagram_whatever_the_language() {
        let slide = single_slide("```text\n@startuml\nA -> B\n@enduml\n```");
        assert_eq!(kinds(&slide), vec![BlockKind::Diagram]);
    }

    #[test]
    fn test_reference_pointer_becomes_diagram_ref() {
        let slide = single_slide("```plantuml\n@ref: flows/login.puml\n```");
        assert_eq!(
            slide.content,
            vec![ContentBlock::DiagramRef {
                content: "@ref: flows/login.puml".to_string(),
                path: "flows/login.puml".to_string(),
            }]
        );
    }

    #[test]
    fn test_reference_pointer_must_open_the_fence() {
        let slide = single_slide("```plantuml\n' legacy\n@ref:x.puml\n```");
        assert_eq!(kinds(&slide), vec![BlockKind::Diagram]);

        let slide = single_slide("```plantuml\n  @ref:x.puml  \n```");
        assert_eq!(kinds(&slide), vec![BlockKind::DiagramRef]);
    }

    #[test]
    fn test_reference_pointer_outside_diagram_fence_is_code() {
        let slide = single_slide("```\n@ref:x.puml\n```");
        assert_eq!(kinds(&slide), vec![BlockKind::Code]);
    }

    #[test]
    fn test_unterminated_fence_is_flushed() {
        let slide = single_slide("text\n```python\nprint(1)");
        assert_eq!(kinds(&slide), vec![BlockKind::Text, BlockKind::Code]);
        assert_eq!(slide.content[1].content(), "print(1)");
    }

    #[test]
    fn test_table_block_and_boundary() {
        let slide = single_slide("| A | B |\n|---|---|\n| 1 | 2 |\nafter");
        assert_eq!(kinds(&slide), vec![BlockKind::Table, BlockKind::Text]);
        assert_eq!(
            slide.content[0].content(),
            "| A | B |\n|---|---|\n| 1 | 2 |"
        );
        assert_eq!(slide.content[1].content(), "after");
    }

    #[test]
    fn test_table_ends_at_blank_line() {
        let slide = single_slide("| A | B |\n|---|---|\n\n| C | D |");
        assert_eq!(kinds(&slide), vec![BlockKind::Table, BlockKind::Table]);
    }

    #[test]
    fn test_single_pipe_is_text() {
        let slide = single_slide("either a | b");
        assert_eq!(kinds(&slide), vec![BlockKind::Text]);
    }

    #[test]
    fn test_list_soft_wrap_appends_to_last_item() {
        let slide = single_slide("- first item\n  continues here\n- second");
        assert_eq!(
            slide.content,
            vec![ContentBlock::List {
                content: "- first item continues here\n- second".to_string()
            }]
        );
    }

    #[test]
    fn test_blank_line_closes_list() {
        let slide = single_slide("1. one\n2. two\n\nparagraph");
        assert_eq!(kinds(&slide), vec![BlockKind::List, BlockKind::Text]);
    }

    #[test]
    fn test_table_row_closes_open_list_first() {
        let slide = single_slide("- item\n| A | B |\n|---|---|");
        assert_eq!(kinds(&slide), vec![BlockKind::List, BlockKind::Table]);
    }

    #[test]
    fn test_fence_closes_open_list_first() {
        let slide = single_slide("- item\n```\ncode\n```");
        assert_eq!(kinds(&slide), vec![BlockKind::List, BlockKind::Code]);
    }

    #[test]
    fn test_inline_diagram_capture_until_end_tag() {
        let slide = single_slide("@startuml\nA -> B\n@enduml\nafter");
        assert_eq!(kinds(&slide), vec![BlockKind::Diagram, BlockKind::Text]);
        assert_eq!(slide.content[0].content(), "@startuml\nA -> B\n@enduml");
    }

    #[test]
    fn test_inline_diagram_capture_runs_to_end_without_end_tag() {
        let slide = single_slide("see plantuml below\nA -> B\n- not a list");
        assert_eq!(kinds(&slide), vec![BlockKind::Diagram]);
        assert_eq!(
            slide.content[0].content(),
            "see plantuml below\nA -> B\n- not a list"
        );
    }

    #[test]
    fn test_fence_only_slide_never_yields_text() {
        for (body, expected) in [
            ("```js\nx\n```", BlockKind::Code),
            ("```plantuml\nA -> B\n```", BlockKind::Diagram),
            ("```plantuml\n@ref:a.puml\n```", BlockKind::DiagramRef),
        ] {
            let slide = single_slide(body);
            assert_eq!(kinds(&slide), vec![expected], "body: {body}");
        }
    }

    #[test]
    fn test_parse_is_idempotent() {
        let source = include_str!("../../tests/fixtures/deck.md");
        assert_eq!(parse(source), parse(source));
    }

    #[test]
    fn test_windows_line_endings() {
        let deck = parse("# T\r\n---\r\n## Slide 1: A\r\n- x\r\n- y\r\n");
        assert_eq!(deck.slides[0].title, "A");
        assert_eq!(deck.slides[0].content[0].content(), "- x\n- y");
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn line() -> impl Strategy<Value = String> {
            prop_oneof![
                Just("```".to_string()),
                Just("```plantuml".to_string()),
                Just("---".to_string()),
                Just(String::new()),
                "## Slide [1-9]: [A-Za-z ]{1,10}",
                "\\| [a-z]{1,4} \\| [0-9]{1,3} \\|",
                "- [a-z ]{1,12}",
                "[1-9]\\. [a-z ]{1,12}",
                "[a-zA-Z@ ]{1,20}",
            ]
        }

        fn document() -> impl Strategy<Value = String> {
            proptest::collection::vec(line(), 0..40)
                .prop_map(|lines| format!("# Deck\n---\n{}", lines.join("\n")))
        }

        proptest! {
            #[test]
            fn parsing_is_deterministic(source in document()) {
                prop_assert_eq!(parse(&source), parse(&source));
            }

            #[test]
            fn slide_ids_count_up_from_one(source in document()) {
                for (idx, slide) in parse(&source).slides.iter().enumerate() {
                    prop_assert_eq!(slide.id, idx + 1);
                }
            }

            #[test]
            fn fence_only_slide_is_a_single_block(
                language in prop::sample::select(vec!["", "js", "text", "plantuml"]),
                body in proptest::collection::vec("[a-z@>: ]{0,12}", 0..6),
            ) {
                let source = format!(
                    "# Deck\n---\n## Slide 1: Only\n```{language}\n{}\n```",
                    body.join("\n")
                );
                let deck = parse(&source);
                prop_assert_eq!(deck.slides.len(), 1);
                let blocks = &deck.slides[0].content;
                prop_assert_eq!(blocks.len(), 1);
                prop_assert!(matches!(
                    blocks[0].kind(),
                    BlockKind::Code | BlockKind::Diagram | BlockKind::DiagramRef
                ));
            }
        }
    }
}
