//! Diagram render gateway.
//!
//! Turns a diagram block into an image through an external Kroki-compatible
//! service. SVG is requested first; if the service does not answer with a
//! well-formed SVG document the request is repeated for PNG. When both fail
//! the caller gets [`RenderError::Unavailable`] and is expected to show the
//! raw source instead.

use std::time::Duration;

use anyhow::Context;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::DIAGRAM_LANGUAGE;
use super::encoder::encode;
use super::includes::{DiagramStore, resolve_file_includes, resolve_includes};
use crate::deck::ContentBlock;

pub const DEFAULT_RENDER_ENDPOINT: &str = "https://kroki.io";
pub const DEFAULT_PLANTUML_SERVER: &str = "https://www.plantuml.com/plantuml";
const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Svg,
    Png,
}

impl ImageFormat {
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Svg => "svg",
            Self::Png => "png",
        }
    }

    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Svg => "image/svg+xml",
            Self::Png => "image/png",
        }
    }
}

/// A rendered diagram. The bytes are owned by whoever displays the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    pub format: ImageFormat,
    pub bytes: Vec<u8>,
}

impl RenderedImage {
    /// Inline reference usable as an `<img src>`.
    pub fn to_data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.format.mime_type(),
            STANDARD.encode(&self.bytes)
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to load diagram file {path}: {source}")]
    SourceUnavailable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to render diagram: the diagram service may be unavailable")]
    Unavailable,
}

/// What to render: inline source or a file under the diagrams directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagramRequest<'a> {
    Inline(&'a str),
    File(&'a str),
}

impl<'a> DiagramRequest<'a> {
    /// Request for a diagram block; `None` for other block kinds.
    pub fn from_block(block: &'a ContentBlock) -> Option<Self> {
        match block {
            ContentBlock::Diagram { content } => Some(Self::Inline(content)),
            ContentBlock::DiagramRef { path, .. } => Some(Self::File(path)),
            _ => None,
        }
    }
}

/// Raw answer of the render service.
#[derive(Debug, Clone, Default)]
pub struct ServiceResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl ServiceResponse {
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    fn is_svg(&self) -> bool {
        let head = String::from_utf8_lossy(&self.body[..self.body.len().min(256)]);
        let head = head.trim_start();
        head.starts_with("<svg") || head.starts_with("<?xml")
    }

    fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("image/"))
            || self.body.starts_with(PNG_SIGNATURE)
    }
}

/// HTTP boundary to the diagram rendering service.
pub trait RenderService: Send + Sync {
    /// Submit `source` and request an image in `format`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure; HTTP error statuses are
    /// reported through [`ServiceResponse::status`].
    fn post(&self, format: ImageFormat, source: &str) -> anyhow::Result<ServiceResponse>;
}

/// Kroki-compatible service: `POST <endpoint>/<language>/<format>`.
pub struct KrokiService {
    agent: ureq::Agent,
    endpoint: String,
    language: String,
}

impl KrokiService {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            agent,
            endpoint: endpoint.into(),
            language: DIAGRAM_LANGUAGE.to_string(),
        }
    }

    fn url(&self, format: ImageFormat) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint.trim_end_matches('/'),
            self.language,
            format.extension()
        )
    }
}

impl RenderService for KrokiService {
    fn post(&self, format: ImageFormat, source: &str) -> anyhow::Result<ServiceResponse> {
        let url = self.url(format);
        let response = self
            .agent
            .post(&url)
            .header("Content-Type", "text/plain")
            .send(source.as_bytes())
            .with_context(|| format!("HTTP request failed for {url}"))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(ToOwned::to_owned);
        let body = response
            .into_body()
            .read_to_vec()
            .with_context(|| format!("Failed to read response body from {url}"))?;

        Ok(ServiceResponse {
            status,
            content_type,
            body,
        })
    }
}

/// Resolves diagram sources and renders them through a [`RenderService`].
pub struct DiagramGateway {
    store: Box<dyn DiagramStore>,
    service: Box<dyn RenderService>,
    plantuml_server: String,
}

impl DiagramGateway {
    pub fn new(store: Box<dyn DiagramStore>, service: Box<dyn RenderService>) -> Self {
        Self {
            store,
            service,
            plantuml_server: DEFAULT_PLANTUML_SERVER.to_string(),
        }
    }

    #[must_use]
    pub fn with_plantuml_server(mut self, server: impl Into<String>) -> Self {
        self.plantuml_server = server.into();
        self
    }

    /// Produce the diagram text that would be sent to the service.
    ///
    /// Files are read from the store with their includes expanded; inline
    /// source has its fence markers removed.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::SourceUnavailable`] when a referenced file cannot
    /// be read.
    pub fn resolve_source(&self, request: DiagramRequest<'_>) -> Result<String, RenderError> {
        match request {
            DiagramRequest::File(path) => {
                let text = self
                    .store
                    .fetch(path)
                    .map_err(|source| RenderError::SourceUnavailable {
                        path: path.to_string(),
                        source,
                    })?;
                Ok(resolve_file_includes(self.store.as_ref(), path, &text))
            }
            DiagramRequest::Inline(source) => Ok(resolve_includes(
                self.store.as_ref(),
                &strip_fences(source),
            )),
        }
    }

    /// Resolve and render a diagram.
    ///
    /// # Errors
    ///
    /// Returns an error when the source cannot be loaded or neither format
    /// could be rendered.
    pub fn render(&self, request: DiagramRequest<'_>) -> Result<RenderedImage, RenderError> {
        let source = self.resolve_source(request)?;
        self.render_source(&source)
    }

    /// Render already-resolved source, falling back from SVG to PNG.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Unavailable`] when both formats fail.
    pub fn render_source(&self, source: &str) -> Result<RenderedImage, RenderError> {
        for format in [ImageFormat::Svg, ImageFormat::Png] {
            match self.service.post(format, source) {
                Ok(response) if response.is_success() && accepts(format, &response) => {
                    return Ok(RenderedImage {
                        format,
                        bytes: response.body,
                    });
                }
                Ok(response) => {
                    tracing::warn!(
                        format = format.extension(),
                        status = response.status,
                        content_type = ?response.content_type,
                        "diagram service returned an unusable response"
                    );
                }
                Err(err) => {
                    tracing::warn!(format = format.extension(), error = %format!("{err:#}"), "diagram request failed");
                }
            }
        }
        Err(RenderError::Unavailable)
    }

    /// `GET` URL for a PlantUML server, carrying the encoded source.
    pub fn image_url(&self, source: &str) -> String {
        format!(
            "{}/svg/{}",
            self.plantuml_server.trim_end_matches('/'),
            encode(source)
        )
    }
}

fn accepts(format: ImageFormat, response: &ServiceResponse) -> bool {
    match format {
        ImageFormat::Svg => response.is_svg(),
        ImageFormat::Png => response.is_image(),
    }
}

/// Remove a surrounding ```` ```plantuml ```` / ```` ``` ```` fence, if any.
pub fn strip_fences(source: &str) -> String {
    let trimmed = source.trim();
    let mut lines: Vec<&str> = trimmed.lines().collect();
    if lines.first().is_some_and(|l| l.trim_start().starts_with("```")) {
        lines.remove(0);
    }
    if lines.last().is_some_and(|l| l.trim() == "```") {
        lines.pop();
    }
    lines.join("\n")
}
