// Only allow lints that are either transitive-dependency noise or
// genuinely opinionated style choices that don't indicate real issues.
#![allow(
    // Transitive dependency version mismatches we can't control
    clippy::multiple_crate_versions,
    // module_name_repetitions is pure style preference (e.g. diagram::DiagramStore)
    clippy::module_name_repetitions
)]

//! # slidemark
//!
//! Markdown slide decks served as web presentations and exported to PDF.
//!
//! A deck is a constrained markdown file:
//! - A title block (`# Title`, `## Subtitle`, `**Version:**`, ...) before the first `---`
//! - `## Slide N: Title` headings that start slides
//! - Headings, paragraphs, lists, tables, code and PlantUML diagrams inside slides
//!
//! ## Pipeline
//!
//! Parsing is pure and cached by content hash. Pages are rendered as one
//! self-contained HTML document with keyboard navigation. Diagram images are
//! fetched by the page from the server, which renders them through a
//! Kroki-compatible service and caches them by source hash. Export drives a
//! headless browser through the served page one slide at a time and merges
//! the per-slide PDFs.
//!
//! ## Modules
//!
//! - [`deck`]: Deck model, parser and cache
//! - [`inline`]: Bold/italic inline formatting
//! - [`diagram`]: Diagram encoding, includes, rendering and extraction
//! - [`html`]: Presentation page rendering
//! - [`navigation`]: Slide navigation state and key bindings
//! - [`server`]: HTTP presentation server
//! - [`export`]: PDF export
//! - [`config`]: Persistent flag defaults

pub mod config;
pub mod deck;
pub mod diagram;
pub mod export;
pub mod html;
pub mod inline;
pub mod navigation;
pub mod server;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::deck::{ContentBlock, Deck, Slide, parse};
    pub use crate::diagram::DiagramGateway;
    pub use crate::export::{ExportOptions, Exporter};
    pub use crate::html::{DiagramMode, PageRenderer};
    pub use crate::navigation::{NavMessage, Navigator};
}
