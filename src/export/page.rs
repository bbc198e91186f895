//! Browser boundary for the exporter.

use std::time::Duration;

use anyhow::Result;

/// Browser viewport used for the whole export.
pub const VIEWPORT: (u32, u32) = (1920, 1080);

/// Print settings shared by every slide capture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfLayout {
    pub landscape: bool,
    pub print_background: bool,
    /// Paper size in inches
    pub paper_width: f64,
    pub paper_height: f64,
    /// Margin on every side, in inches
    pub margin: f64,
}

impl PdfLayout {
    /// A4, landscape, backgrounds on, 0.5 cm margins.
    pub const A4_LANDSCAPE: Self = Self {
        landscape: true,
        print_background: true,
        paper_width: 8.27,
        paper_height: 11.69,
        margin: 0.5 / 2.54,
    };
}

impl Default for PdfLayout {
    fn default() -> Self {
        Self::A4_LANDSCAPE
    }
}

/// Starts a browser and opens a page in it.
pub trait PageLauncher {
    type Page: PresentationPage;

    /// # Errors
    ///
    /// Returns an error if the browser cannot be started.
    fn launch(&self, viewport: (u32, u32)) -> Result<Self::Page>;
}

/// A page showing the rendered presentation.
///
/// Dropping the page releases the browser.
pub trait PresentationPage {
    /// Navigate to `url` and wait for the `.presentation` element.
    ///
    /// # Errors
    ///
    /// Returns an error if navigation fails or the element does not appear
    /// within `timeout`.
    fn open(&mut self, url: &str, timeout: Duration) -> Result<()>;

    /// Hide navigation controls so they do not appear in captures.
    ///
    /// # Errors
    ///
    /// Returns an error if the page script fails.
    fn hide_navigation(&mut self) -> Result<()>;

    /// Text of the slide counter, if the page has one.
    ///
    /// # Errors
    ///
    /// Returns an error if the page cannot be queried.
    fn counter_text(&mut self) -> Result<Option<String>>;

    /// Press a key, named as in `KeyboardEvent.key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key event cannot be dispatched.
    fn press_key(&mut self, key: &str) -> Result<()>;

    /// True when no `.loading` markers remain and every diagram image has
    /// loaded with a nonzero natural size.
    ///
    /// # Errors
    ///
    /// Returns an error if the page cannot be queried.
    fn diagrams_settled(&mut self) -> Result<bool>;

    /// Print the current view to a one-page PDF.
    ///
    /// # Errors
    ///
    /// Returns an error if printing fails.
    fn print_pdf(&mut self, layout: &PdfLayout) -> Result<Vec<u8>>;
}
