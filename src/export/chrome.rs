//! Headless Chrome driver.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use headless_chrome::types::PrintToPdfOptions;
use headless_chrome::{Browser, LaunchOptions, Tab};

use super::page::{PageLauncher, PdfLayout, PresentationPage};

const HIDE_NAVIGATION: &str = r"(function () {
  var style = document.createElement('style');
  style.textContent = '.navigation { display: none !important; } body { margin: 0; padding: 0; }';
  document.head.appendChild(style);
  return true;
})()";

const COUNTER_TEXT: &str = r"(function () {
  var counter = document.querySelector('.slideCounter');
  return counter ? counter.textContent : null;
})()";

const DIAGRAMS_SETTLED: &str = r"(function () {
  if (document.querySelectorAll('.loading').length > 0) return false;
  var images = document.querySelectorAll('img.diagram');
  return Array.prototype.every.call(images, function (img) {
    return img.complete && img.naturalWidth > 0 && img.naturalHeight > 0;
  });
})()";

/// Launches a local Chrome or Chromium in headless mode.
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    idle_timeout: Duration,
}

impl ChromeLauncher {
    pub const fn new(idle_timeout: Duration) -> Self {
        Self { idle_timeout }
    }
}

impl Default for ChromeLauncher {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

impl PageLauncher for ChromeLauncher {
    type Page = ChromePage;

    fn launch(&self, viewport: (u32, u32)) -> Result<ChromePage> {
        let options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false)
            .window_size(Some(viewport))
            .idle_browser_timeout(self.idle_timeout)
            .build()
            .map_err(|err| anyhow!("Invalid browser launch options: {err}"))?;
        let browser = Browser::new(options).context("Failed to launch headless browser")?;
        let tab = browser.new_tab().context("Failed to open browser tab")?;
        tracing::debug!(?viewport, "browser launched");
        Ok(ChromePage {
            tab,
            _browser: browser,
        })
    }
}

/// One tab of a launched browser. The browser process ends when this drops.
pub struct ChromePage {
    tab: Arc<Tab>,
    _browser: Browser,
}

impl ChromePage {
    fn evaluate(&self, script: &str) -> Result<Option<serde_json::Value>> {
        let result = self
            .tab
            .evaluate(script, false)
            .context("Page script failed")?;
        Ok(result.value)
    }
}

impl PresentationPage for ChromePage {
    fn open(&mut self, url: &str, timeout: Duration) -> Result<()> {
        self.tab.set_default_timeout(timeout);
        self.tab
            .navigate_to(url)
            .with_context(|| format!("Failed to navigate to {url}"))?
            .wait_until_navigated()
            .with_context(|| format!("Navigation to {url} did not finish"))?;
        self.tab
            .wait_for_element_with_custom_timeout(".presentation", timeout)
            .context("Presentation container did not appear")?;
        Ok(())
    }

    fn hide_navigation(&mut self) -> Result<()> {
        self.evaluate(HIDE_NAVIGATION)?;
        Ok(())
    }

    fn counter_text(&mut self) -> Result<Option<String>> {
        Ok(self
            .evaluate(COUNTER_TEXT)?
            .and_then(|value| value.as_str().map(ToOwned::to_owned)))
    }

    fn press_key(&mut self, key: &str) -> Result<()> {
        self.tab
            .press_key(key)
            .with_context(|| format!("Failed to press {key}"))?;
        Ok(())
    }

    fn diagrams_settled(&mut self) -> Result<bool> {
        Ok(self
            .evaluate(DIAGRAMS_SETTLED)?
            .and_then(|value| value.as_bool())
            .unwrap_or(false))
    }

    fn print_pdf(&mut self, layout: &PdfLayout) -> Result<Vec<u8>> {
        let options = PrintToPdfOptions {
            landscape: Some(layout.landscape),
            print_background: Some(layout.print_background),
            paper_width: Some(layout.paper_width),
            paper_height: Some(layout.paper_height),
            margin_top: Some(layout.margin),
            margin_bottom: Some(layout.margin),
            margin_left: Some(layout.margin),
            margin_right: Some(layout.margin),
            page_ranges: Some("1".to_string()),
            ..Default::default()
        };
        self.tab
            .print_to_pdf(Some(options))
            .context("Failed to print page to PDF")
    }
}
