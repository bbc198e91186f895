//! PDF export.
//!
//! Drives a browser page through every slide of the served presentation,
//! waits for diagrams to finish loading, prints each slide to a one-page PDF
//! and merges the pages into one document.
//!
//! The run is a fixed sequence of stages:
//!
//! ```text
//! Idle -> ServerStarting -> BrowserLaunching -> PageLoading
//!      -> (Navigate -> AwaitDiagrams -> Capture) per slide
//!      -> Merging -> Writing -> Done
//! ```
//!
//! Any failure moves to `Failed`. The server and browser are owned by guards,
//! so they are released on every exit path.

mod chrome;
mod merge;
mod page;
mod poll;
mod server;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;

pub use chrome::{ChromeLauncher, ChromePage};
pub use merge::{MergeError, merge_pdfs};
pub use page::{PageLauncher, PdfLayout, PresentationPage, VIEWPORT};
pub use poll::{Clock, ManualClock, PollTimeout, SystemClock, poll_until};
pub use server::{ServerCommand, ServerGuard, ensure_port_free, is_accepting};

pub const DEFAULT_OUTPUT: &str = "dist/presentation.pdf";

/// Counting by navigation stops here even if the counter keeps growing.
const MAX_COUNTED_SLIDES: usize = 10_000;

static COUNTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*/\s*(\d*)").expect("valid counter regex"));

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("port {0} is already in use")]
    PortInUse(u16),
    #[error("failed to start presentation server: {0}")]
    ServerSpawn(#[source] std::io::Error),
    #[error("presentation server did not accept connections on port {port} within {timeout:?}")]
    ServerTimeout { port: u16, timeout: Duration },
    #[error("presentation did not load from {url}: {reason}")]
    PageLoad { url: String, reason: String },
    #[error("expected slide {expected}, but the counter shows {actual}")]
    SlideCounterMismatch { expected: usize, actual: String },
    #[error("presentation has no slides")]
    NoSlides,
    #[error(transparent)]
    Merge(#[from] MergeError),
}

/// Export progress, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    Idle,
    ServerStarting,
    BrowserLaunching,
    PageLoading,
    Navigate(usize),
    AwaitDiagrams(usize),
    Capture(usize),
    Merging,
    Writing,
    Done,
    Failed,
}

impl fmt::Display for ExportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::ServerStarting => write!(f, "server-starting"),
            Self::BrowserLaunching => write!(f, "browser-launching"),
            Self::PageLoading => write!(f, "page-loading"),
            Self::Navigate(slide) => write!(f, "navigate({slide})"),
            Self::AwaitDiagrams(slide) => write!(f, "await-diagrams({slide})"),
            Self::Capture(slide) => write!(f, "capture({slide})"),
            Self::Merging => write!(f, "merging"),
            Self::Writing => write!(f, "writing"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Parsed `N / M` slide counter. `total` is `None` when it is missing or 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counter {
    pub current: usize,
    pub total: Option<usize>,
}

pub fn parse_counter(text: &str) -> Option<Counter> {
    let caps = COUNTER.captures(text)?;
    let current = caps.get(1)?.as_str().parse().ok()?;
    let total = caps
        .get(2)
        .and_then(|m| m.as_str().parse().ok())
        .filter(|&total: &usize| total > 0);
    Some(Counter { current, total })
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub output: PathBuf,
    /// Export at most this many slides
    pub max_slides: Option<usize>,
    /// Use an already running presentation instead of spawning a server
    pub base_url: Option<String>,
    pub server: ServerCommand,
    pub wait_for_diagrams: bool,
    pub server_timeout: Duration,
    pub page_load_timeout: Duration,
    /// Per key press, when waiting for the counter to update
    pub step_timeout: Duration,
    pub poll_interval: Duration,
    pub diagram_timeout: Duration,
    /// Extra wait after diagrams report loaded
    pub settle_delay: Duration,
    /// Pause between presses when counting slides by navigation
    pub key_delay: Duration,
    pub viewport: (u32, u32),
    pub layout: PdfLayout,
}

impl ExportOptions {
    pub fn new(output: impl Into<PathBuf>, server: ServerCommand) -> Self {
        Self {
            output: output.into(),
            max_slides: None,
            base_url: None,
            server,
            wait_for_diagrams: true,
            server_timeout: Duration::from_secs(30),
            page_load_timeout: Duration::from_secs(30),
            step_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(500),
            diagram_timeout: Duration::from_secs(20),
            settle_delay: Duration::from_secs(1),
            key_delay: Duration::from_millis(300),
            viewport: VIEWPORT,
            layout: PdfLayout::A4_LANDSCAPE,
        }
    }
}

pub struct Exporter {
    options: ExportOptions,
}

impl Exporter {
    pub const fn new(options: ExportOptions) -> Self {
        Self { options }
    }

    /// Run the export and return the written path.
    ///
    /// # Errors
    ///
    /// Returns an [`ExportError`] (wrapped in `anyhow`) for the failures it
    /// names, and other errors for browser or filesystem failures. Nothing is
    /// written unless every slide was captured and merged.
    pub fn run<L, C>(&self, launcher: &L, clock: &C) -> Result<PathBuf>
    where
        L: PageLauncher,
        C: Clock + ?Sized,
    {
        enter(ExportStage::Idle);
        let result = self.run_stages(launcher, clock);
        match &result {
            Ok(path) => {
                enter(ExportStage::Done);
                tracing::info!(path = %path.display(), "export finished");
            }
            Err(err) => {
                tracing::error!(stage = %ExportStage::Failed, error = %format!("{err:#}"), "export failed");
            }
        }
        result
    }

    fn run_stages<L, C>(&self, launcher: &L, clock: &C) -> Result<PathBuf>
    where
        L: PageLauncher,
        C: Clock + ?Sized,
    {
        let opts = &self.options;

        // Declared first so it is dropped after the browser.
        let (_server, base_url) = match &opts.base_url {
            Some(url) => (None, url.trim_end_matches('/').to_string()),
            None => {
                enter(ExportStage::ServerStarting);
                let guard = ServerGuard::start(
                    &opts.server,
                    opts.poll_interval,
                    opts.server_timeout,
                    clock,
                )?;
                let url = guard.base_url();
                (Some(guard), url)
            }
        };

        enter(ExportStage::BrowserLaunching);
        let mut page = launcher.launch(opts.viewport)?;

        enter(ExportStage::PageLoading);
        let url = format!("{base_url}/presentation/");
        page.open(&url, opts.page_load_timeout)
            .map_err(|err| ExportError::PageLoad {
                url: url.clone(),
                reason: format!("{err:#}"),
            })?;
        page.hide_navigation()?;

        let total = self.count_slides(&mut page, clock)?;
        if total == 0 {
            return Err(ExportError::NoSlides.into());
        }
        let count = opts.max_slides.map_or(total, |max| max.min(total));
        tracing::info!(total, exporting = count, "found slides");

        let mut captures = Vec::with_capacity(count);
        for slide in 1..=count {
            enter(ExportStage::Navigate(slide));
            self.navigate(&mut page, slide, clock)?;

            if opts.wait_for_diagrams {
                enter(ExportStage::AwaitDiagrams(slide));
                self.await_diagrams(&mut page, slide, clock);
                clock.sleep(opts.settle_delay);
            }

            enter(ExportStage::Capture(slide));
            let pdf = page
                .print_pdf(&opts.layout)
                .with_context(|| format!("Failed to capture slide {slide}"))?;
            captures.push(pdf);
        }
        drop(page);

        enter(ExportStage::Merging);
        let merged = merge_pdfs(&captures).map_err(ExportError::from)?;

        enter(ExportStage::Writing);
        write_output(&opts.output, &merged)?;
        Ok(opts.output.clone())
    }

    /// Total from the counter, or by stepping forward until it stops growing.
    fn count_slides<P, C>(&self, page: &mut P, clock: &C) -> Result<usize>
    where
        P: PresentationPage,
        C: Clock + ?Sized,
    {
        let counter = read_counter(page)?;
        if let Some(total) = counter.and_then(|c| c.total) {
            return Ok(total);
        }

        tracing::info!("counting slides by navigation");
        let mut count = counter.map_or(1, |c| c.current);
        while count < MAX_COUNTED_SLIDES {
            page.press_key("ArrowRight")?;
            clock.sleep(self.options.key_delay);
            match read_counter(page)? {
                Some(c) if c.current > count => count = c.current,
                _ => break,
            }
        }
        page.press_key("Home")?;
        clock.sleep(self.options.key_delay);
        Ok(count)
    }

    /// Press `Home`, then `ArrowRight` until slide `target`, checking the
    /// counter after every press.
    fn navigate<P, C>(&self, page: &mut P, target: usize, clock: &C) -> Result<()>
    where
        P: PresentationPage,
        C: Clock + ?Sized,
    {
        page.press_key("Home")?;
        self.expect_slide(page, 1, clock)?;
        for expected in 2..=target {
            page.press_key("ArrowRight")?;
            self.expect_slide(page, expected, clock)?;
        }
        Ok(())
    }

    fn expect_slide<P, C>(&self, page: &mut P, expected: usize, clock: &C) -> Result<()>
    where
        P: PresentationPage,
        C: Clock + ?Sized,
    {
        let mut last_seen: Option<String> = None;
        let reached = poll_until(
            clock,
            self.options.poll_interval,
            self.options.step_timeout,
            || match page.counter_text() {
                Ok(text) => {
                    let hit = text
                        .as_deref()
                        .and_then(parse_counter)
                        .is_some_and(|c| c.current == expected);
                    last_seen = text;
                    hit
                }
                Err(err) => {
                    tracing::debug!(error = %err, "counter read failed");
                    false
                }
            },
        );
        reached.map_err(|_| {
            ExportError::SlideCounterMismatch {
                expected,
                actual: last_seen.unwrap_or_else(|| "nothing".to_string()),
            }
            .into()
        })
    }

    fn await_diagrams<P, C>(&self, page: &mut P, slide: usize, clock: &C)
    where
        P: PresentationPage,
        C: Clock + ?Sized,
    {
        let settled = poll_until(
            clock,
            self.options.poll_interval,
            self.options.diagram_timeout,
            || match page.diagrams_settled() {
                Ok(settled) => settled,
                Err(err) => {
                    tracing::debug!(error = %err, "diagram check failed");
                    false
                }
            },
        );
        if let Err(timeout) = settled {
            tracing::warn!(slide, %timeout, "diagrams still loading, capturing anyway");
        }
    }
}

fn enter(stage: ExportStage) {
    tracing::info!(%stage, "export stage");
}

fn read_counter<P: PresentationPage>(page: &mut P) -> Result<Option<Counter>> {
    Ok(page.counter_text()?.as_deref().and_then(parse_counter))
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))
}
