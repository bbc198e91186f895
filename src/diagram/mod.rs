//! PlantUML diagram support.
//!
//! This module handles:
//! - URL-safe encoding of diagram source for PlantUML servers
//! - Expansion of `!include` directives against a diagrams directory
//! - Rendering through a Kroki-compatible HTTP service with SVG/PNG fallback
//! - Extracting inline diagram fences from a deck into `.puml` files

pub mod encoder;
mod extract;
mod gateway;
mod includes;

pub use extract::{
    DIAGRAM_EXTENSION, ExtractedDiagram, Extraction, extract_diagrams, write_diagrams,
};
pub use gateway::{
    DEFAULT_PLANTUML_SERVER, DEFAULT_RENDER_ENDPOINT, DiagramGateway, DiagramRequest, ImageFormat,
    KrokiService, RenderError, RenderService, RenderedImage, ServiceResponse, strip_fences,
};
pub use includes::{DiagramStore, FsDiagramStore, MemoryDiagramStore, resolve_includes};

/// Fence tag that marks a code block as a diagram.
pub const DIAGRAM_LANGUAGE: &str = "plantuml";
/// Opening marker of a PlantUML document.
pub const START_TAG: &str = "@startuml";
/// Closing marker of a PlantUML document.
pub const END_TAG: &str = "@enduml";
/// Prefix of a pointer to a diagram file, e.g. `@ref:flows/login.puml`.
pub const REFERENCE_PREFIX: &str = "@ref:";
/// Directive that splices another diagram file into the current one.
pub const INCLUDE_DIRECTIVE: &str = "!include";
/// Diagrams directory used when none is configured.
pub const DEFAULT_DIAGRAMS_DIR: &str = "diagrams";
