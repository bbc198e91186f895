//! HTTP server for the rendered presentation.
//!
//! The deck file is read on every request and reparsed only when its content
//! hash changes. The page itself never waits on the diagram service: diagram
//! images are fetched by the browser from `/diagram/{slide}/{block}`, which
//! renders on the blocking pool and caches images by resolved source hash.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderName, StatusCode, header},
    response::{Html, Json, Redirect},
    routing::get,
};
use serde::Serialize;
use tokio::net::TcpListener;

use crate::deck::{Deck, DeckCache, hash_bytes};
use crate::diagram::{DiagramGateway, DiagramRequest, RenderError, RenderedImage};
use crate::html::{DiagramMode, PageRenderer};

pub const DEFAULT_PORT: u16 = 3000;

/// Shared state for request handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Shared>,
}

struct Shared {
    deck_path: PathBuf,
    cache: Mutex<DeckCache>,
    images: Mutex<HashMap<u64, Arc<RenderedImage>>>,
    gateway: DiagramGateway,
    mode: DiagramMode,
}

/// Why a diagram image could not be served.
#[derive(Debug, thiserror::Error)]
pub enum DiagramError {
    #[error("slide {slide} has no diagram block {block}")]
    NotFound { slide: usize, block: usize },
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl DiagramError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Render(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl AppState {
    pub fn new(deck_path: impl Into<PathBuf>, gateway: DiagramGateway, mode: DiagramMode) -> Self {
        Self {
            inner: Arc::new(Shared {
                deck_path: deck_path.into(),
                cache: Mutex::new(DeckCache::new()),
                images: Mutex::new(HashMap::new()),
                gateway,
                mode,
            }),
        }
    }

    /// Current deck, reparsed only if the file content changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the deck file cannot be read.
    pub fn deck(&self) -> Result<Arc<Deck>> {
        let path = &self.inner.deck_path;
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read deck {}", path.display()))?;
        let mut cache = self
            .inner
            .cache
            .lock()
            .map_err(|_| anyhow!("deck cache lock poisoned"))?;
        Ok(cache.get_or_parse(&source))
    }

    /// Render the current deck to HTML.
    ///
    /// # Errors
    ///
    /// Returns an error if the deck file cannot be read.
    pub fn page(&self) -> Result<String> {
        let deck = self.deck()?;
        let renderer = PageRenderer::new(&self.inner.gateway, self.inner.mode);
        Ok(renderer.render(&deck))
    }

    /// Image for block `block` (0-based) of slide `slide`.
    ///
    /// The source is resolved on every call so edits to referenced files show
    /// up; the service is only contacted for source not rendered before.
    ///
    /// # Errors
    ///
    /// Returns [`DiagramError::NotFound`] when the block is not a diagram and
    /// [`DiagramError::Render`] when the source or the service fails.
    pub fn diagram(&self, slide: usize, block: usize) -> Result<Arc<RenderedImage>, DiagramError> {
        let deck = self.deck()?;
        let request = deck
            .slide(slide)
            .and_then(|s| s.content.get(block))
            .and_then(DiagramRequest::from_block)
            .ok_or(DiagramError::NotFound { slide, block })?;

        let gateway = &self.inner.gateway;
        let source = gateway.resolve_source(request)?;
        let key = hash_bytes(source.as_bytes());
        if let Some(image) = self.images()?.get(&key) {
            return Ok(Arc::clone(image));
        }

        let image = Arc::new(gateway.render_source(&source)?);
        tracing::debug!(slide, block, bytes = image.bytes.len(), "rendered diagram");
        self.images()?.insert(key, Arc::clone(&image));
        Ok(image)
    }

    fn images(&self) -> Result<MutexGuard<'_, HashMap<u64, Arc<RenderedImage>>>> {
        self.inner
            .images
            .lock()
            .map_err(|_| anyhow!("diagram cache lock poisoned"))
    }

    fn parse_count(&self) -> usize {
        self.inner.cache.lock().map_or(0, |cache| cache.parse_count())
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { Redirect::to("/presentation/") }))
        .route("/presentation", get(presentation))
        .route("/presentation/", get(presentation))
        .route("/diagram/:slide/:block", get(diagram))
        .route("/deck.json", get(deck_json))
        .route("/health", get(health))
        .with_state(state)
}

/// Bind `127.0.0.1:<port>` and serve until the process exits.
///
/// # Errors
///
/// Returns an error if the port cannot be bound or the server fails.
pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    serve_on(listener, state).await
}

/// Serve on an already bound listener.
///
/// # Errors
///
/// Returns an error if the server fails.
pub async fn serve_on(listener: TcpListener, state: AppState) -> Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, deck = %state.inner.deck_path.display(), "serving presentation");
    println!("Presentation available at http://{addr}/presentation/");
    axum::serve(listener, router(state))
        .await
        .context("HTTP server failed")
}

type HandlerError = (StatusCode, String);

fn internal(err: &anyhow::Error) -> HandlerError {
    tracing::warn!(error = %format!("{err:#}"), "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
}

async fn presentation(State(state): State<AppState>) -> Result<Html<String>, HandlerError> {
    let page = tokio::task::spawn_blocking(move || state.page())
        .await
        .map_err(|err| internal(&anyhow!(err)))?
        .map_err(|err| internal(&err))?;
    Ok(Html(page))
}

async fn diagram(
    State(state): State<AppState>,
    Path((slide, block)): Path<(usize, usize)>,
) -> Result<([(HeaderName, &'static str); 2], Vec<u8>), HandlerError> {
    let image = tokio::task::spawn_blocking(move || state.diagram(slide, block))
        .await
        .map_err(|err| internal(&anyhow!(err)))?
        .map_err(|err| {
            let status = err.status();
            tracing::warn!(slide, block, %status, error = %err, "diagram request failed");
            (status, err.to_string())
        })?;
    Ok((
        [
            (header::CONTENT_TYPE, image.format.mime_type()),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        image.bytes.clone(),
    ))
}

async fn deck_json(State(state): State<AppState>) -> Result<Json<Deck>, HandlerError> {
    let deck = state.deck().map_err(|err| internal(&err))?;
    Ok(Json(Deck::clone(&deck)))
}

#[derive(Serialize)]
struct HealthRes {
    ok: bool,
    parses: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        parses: state.parse_count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagram::{ImageFormat, MemoryDiagramStore, RenderService, ServiceResponse};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const DIAGRAM_DECK: &str = "# Drawn\n---\n## Slide 1: A\nhello\n---\n\
        ## Slide 2: Flow\n```plantuml\n@startuml\nA -> B\n@enduml\n```\ntext\n";

    struct Offline;

    impl RenderService for Offline {
        fn post(&self, _format: ImageFormat, _source: &str) -> Result<ServiceResponse> {
            anyhow::bail!("offline")
        }
    }

    /// Answers with a fixed SVG and counts requests.
    #[derive(Clone, Default)]
    struct Counting(Arc<AtomicUsize>);

    impl RenderService for Counting {
        fn post(&self, _format: ImageFormat, _source: &str) -> Result<ServiceResponse> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(ServiceResponse {
                status: 200,
                content_type: Some("image/svg+xml".to_string()),
                body: b"<svg xmlns=\"http://www.w3.org/2000/svg\"></svg>".to_vec(),
            })
        }
    }

    fn state(dir: &tempfile::TempDir) -> (AppState, PathBuf) {
        let path = dir.path().join("deck.md");
        std::fs::write(&path, "# Served\n---\n## Slide 1: A\nhello\n---\n## Slide 2: B\nbye\n")
            .unwrap();
        let gateway = DiagramGateway::new(Box::new(MemoryDiagramStore::new()), Box::new(Offline));
        (AppState::new(&path, gateway, DiagramMode::Served), path)
    }

    fn diagram_state(dir: &tempfile::TempDir, service: impl RenderService + 'static) -> AppState {
        let path = dir.path().join("deck.md");
        std::fs::write(&path, DIAGRAM_DECK).unwrap();
        let gateway = DiagramGateway::new(Box::new(MemoryDiagramStore::new()), Box::new(service));
        AppState::new(&path, gateway, DiagramMode::Served)
    }

    #[test]
    fn test_deck_is_reparsed_only_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let (state, path) = state(&dir);

        let first = state.deck().unwrap();
        let second = state.deck().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(state.parse_count(), 1);

        std::fs::write(&path, "# Served\n---\n## Slide 1: Changed\n").unwrap();
        let third = state.deck().unwrap();
        assert_eq!(third.slides[0].title, "Changed");
        assert_eq!(state.parse_count(), 2);
    }

    #[test]
    fn test_missing_deck_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (state, path) = state(&dir);
        std::fs::remove_file(path).unwrap();
        assert!(state.page().is_err());
    }

    #[test]
    fn test_page_does_not_wait_on_diagram_service() {
        let dir = tempfile::tempdir().unwrap();
        let service = Counting::default();
        let state = diagram_state(&dir, service.clone());

        let page = state.page().unwrap();
        assert!(page.contains("src=\"/diagram/2/0\""));
        assert_eq!(service.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_diagram_rendered_once_per_source() {
        let dir = tempfile::tempdir().unwrap();
        let service = Counting::default();
        let state = diagram_state(&dir, service.clone());

        let first = state.diagram(2, 0).unwrap();
        let second = state.diagram(2, 0).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.format, ImageFormat::Svg);
        assert_eq!(service.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_diagram_lookup_rejects_other_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let state = diagram_state(&dir, Counting::default());

        for (slide, block) in [(2, 1), (2, 9), (7, 0), (0, 0)] {
            let err = state.diagram(slide, block).unwrap_err();
            assert!(matches!(err, DiagramError::NotFound { .. }), "{slide}/{block}");
            assert_eq!(err.status(), StatusCode::NOT_FOUND);
        }
    }

    #[test]
    fn test_failed_render_is_a_bad_gateway() {
        let dir = tempfile::tempdir().unwrap();
        let state = diagram_state(&dir, Offline);

        let err = state.diagram(2, 0).unwrap_err();
        assert!(matches!(err, DiagramError::Render(RenderError::Unavailable)));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    fn get(url: &str) -> (u16, String) {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(5)))
            .http_status_as_error(false)
            .build()
            .into();
        let response = agent.get(url).call().unwrap();
        let status = response.status().as_u16();
        let body = response.into_body().read_to_string().unwrap();
        (status, body)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_routes_over_http() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _path) = state(&dir);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(serve_on(listener, state));

        let (page, deck, health) = tokio::task::spawn_blocking(move || {
            (
                get(&format!("{base}/presentation/")),
                get(&format!("{base}/deck.json")),
                get(&format!("{base}/health")),
            )
        })
        .await
        .unwrap();

        assert_eq!(page.0, 200);
        assert!(page.1.contains("<div class=\"slideCounter\">1 / 2</div>"));
        assert_eq!(deck.0, 200);
        let json: serde_json::Value = serde_json::from_str(&deck.1).unwrap();
        assert_eq!(json["metadata"]["title"], "Served");
        assert_eq!(json["slides"][1]["content"][0]["type"], "text");
        assert_eq!(health.0, 200);
        assert!(health.1.contains("\"ok\":true"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_diagram_route_serves_image() {
        let dir = tempfile::tempdir().unwrap();
        let state = diagram_state(&dir, Counting::default());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(serve_on(listener, state));

        let (image, missing) = tokio::task::spawn_blocking(move || {
            (
                get(&format!("{base}/diagram/2/0")),
                get(&format!("{base}/diagram/2/1")),
            )
        })
        .await
        .unwrap();

        assert_eq!(image.0, 200);
        assert!(image.1.starts_with("<svg"));
        assert_eq!(missing.0, 404);
    }

    #[tokio::test]
    async fn test_bind_fails_when_port_taken() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _path) = state(&dir);
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();
        let err = serve(state, port).await.unwrap_err();
        assert!(err.to_string().contains("Failed to bind"));
    }
}
