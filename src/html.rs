//! Deck to self-contained HTML page.
//!
//! The page holds every slide as a `section.slide`, shows one at a time and
//! carries a small script for keyboard and button navigation. Diagrams are
//! fetched from the presentation server, embedded as data URIs, linked to a
//! PlantUML server, or shown as source text. A diagram image sits in a
//! container marked `.loading` until the browser has finished loading it; if
//! the image fails, the script swaps in the hidden source fallback.

use crate::deck::{
    ContentBlock, Deck, Metadata, Phase, Slide, Table, is_ordered_list, is_phase_diagram,
    list_items, parse_phases,
};
use crate::diagram::{DiagramGateway, DiagramRequest};
use crate::inline::{InlineStyle, parse_inline};
use crate::navigation::{KEY_BINDINGS, NavMessage, Navigator};

/// How diagram blocks become images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiagramMode {
    /// Point `<img>` at the presentation server's diagram route.
    #[default]
    Served,
    /// Render through the gateway and inline the image.
    Embedded,
    /// Point `<img>` at a PlantUML server URL.
    Linked,
    /// Show the diagram source only.
    SourceOnly,
}

/// Renders decks to HTML.
pub struct PageRenderer<'a> {
    gateway: Option<&'a DiagramGateway>,
    mode: DiagramMode,
}

impl<'a> PageRenderer<'a> {
    pub const fn new(gateway: &'a DiagramGateway, mode: DiagramMode) -> Self {
        Self {
            gateway: Some(gateway),
            mode,
        }
    }

    /// Renderer that never contacts a diagram service.
    pub const fn source_only() -> Self {
        Self {
            gateway: None,
            mode: DiagramMode::SourceOnly,
        }
    }

    /// Render the full page.
    pub fn render(&self, deck: &Deck) -> String {
        let nav = Navigator::new(deck.len());
        let mut html = String::with_capacity(16 * 1024);

        html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
        html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
        html.push_str(&format!("<title>{}</title>\n", escape(&deck.metadata.title)));
        html.push_str("<style>\n");
        html.push_str(STYLE);
        html.push_str("</style>\n</head>\n<body>\n");
        html.push_str(&format!(
            "<div class=\"presentation\" data-total=\"{}\">\n",
            deck.len()
        ));

        if deck.is_empty() {
            html.push_str("<p class=\"empty\">No slides</p>\n");
        }
        for slide in &deck.slides {
            self.render_slide(slide, &deck.metadata, nav.current(), &mut html);
        }

        render_navigation(&nav, &mut html);
        html.push_str("</div>\n<script>\n");
        html.push_str(&page_script());
        html.push_str("</script>\n</body>\n</html>\n");
        html
    }

    fn render_slide(&self, slide: &Slide, metadata: &Metadata, active: usize, html: &mut String) {
        let active_class = if slide.id == active { " active" } else { "" };

        if slide.id == 1 {
            html.push_str(&format!(
                "<section class=\"slide title-slide{active_class}\" data-slide=\"1\">\n"
            ));
            html.push_str(&format!(
                "<h1 class=\"title-slide-main\">{}</h1>\n",
                render_inline(&slide.title)
            ));
            if !slide.content.is_empty() {
                html.push_str("<div class=\"title-slide-subtitle\">\n");
                for (index, block) in slide.content.iter().enumerate() {
                    self.render_block(slide.id, index, block, html);
                }
                html.push_str("</div>\n");
            }
            let meta = title_meta(metadata);
            if !meta.is_empty() {
                html.push_str(&format!(
                    "<p class=\"title-slide-meta\">{}</p>\n",
                    escape(&meta)
                ));
            }
            html.push_str("</section>\n");
            return;
        }

        html.push_str(&format!(
            "<section class=\"slide{active_class}\" data-slide=\"{}\">\n",
            slide.id
        ));
        html.push_str(&format!(
            "<header class=\"slide-header\"><h2 class=\"slide-title\">{}</h2></header>\n",
            render_inline(&slide.title)
        ));
        html.push_str("<div class=\"slide-content\">\n");
        for (index, block) in slide.content.iter().enumerate() {
            self.render_block(slide.id, index, block, html);
        }
        html.push_str("</div>\n</section>\n");
    }

    fn render_block(&self, slide: usize, index: usize, block: &ContentBlock, html: &mut String) {
        match block {
            ContentBlock::Heading { content } => {
                html.push_str(&format!("<h3 class=\"heading\">{}</h3>\n", render_inline(content)));
            }
            ContentBlock::Text { content } => {
                html.push_str(&format!("<p class=\"text\">{}</p>\n", render_inline(content)));
            }
            ContentBlock::List { content } => render_list(content, html),
            ContentBlock::Table { content } => render_table(content, html),
            ContentBlock::Code { content, .. } if is_phase_diagram(content) => {
                let phases = parse_phases(content);
                if phases.is_empty() {
                    html.push_str(&format!(
                        "<pre class=\"code-block\"><code>{}</code></pre>\n",
                        escape(content)
                    ));
                } else {
                    render_phases(&phases, html);
                }
            }
            ContentBlock::Code { content, language } => {
                let class = language
                    .as_deref()
                    .map(|lang| format!(" class=\"language-{}\"", escape(lang)))
                    .unwrap_or_default();
                html.push_str(&format!(
                    "<pre class=\"code-block\"><code{class}>{}</code></pre>\n",
                    escape(content)
                ));
            }
            ContentBlock::Diagram { .. } | ContentBlock::DiagramRef { .. } => {
                self.render_diagram(slide, index, block, html);
            }
        }
    }

    fn render_diagram(&self, slide: usize, index: usize, block: &ContentBlock, html: &mut String) {
        let src = match (self.mode, self.gateway, DiagramRequest::from_block(block)) {
            (DiagramMode::Served, _, Some(_)) => Ok(diagram_url(slide, index)),
            (DiagramMode::Embedded, Some(gateway), Some(request)) => {
                gateway.render(request).map(|image| image.to_data_uri())
            }
            (DiagramMode::Linked, Some(gateway), Some(request)) => gateway
                .resolve_source(request)
                .map(|source| gateway.image_url(&source)),
            _ => {
                html.push_str(&format!(
                    "<div class=\"diagram-container\"><pre class=\"diagram-source\">{}</pre></div>\n",
                    escape(block.content())
                ));
                return;
            }
        };

        match src {
            Ok(src) => html.push_str(&format!(
                "<div class=\"diagram-container loading\">\
                 <img class=\"diagram\" alt=\"Diagram\" src=\"{}\">\
                 <details class=\"fallback\" hidden><summary>Diagram source</summary>\
                 <pre class=\"code\">{}</pre></details></div>\n",
                escape(&src),
                escape(block.content())
            )),
            Err(err) => {
                tracing::warn!(slide, block = index, error = %err, "showing diagram source instead of image");
                html.push_str(&format!(
                    "<div class=\"diagram-container diagram-error\">\
                     <p class=\"error-message\">{}</p>\
                     <details class=\"fallback\"><summary>Diagram source</summary>\
                     <pre class=\"code\">{}</pre></details></div>\n",
                    escape(&err.to_string()),
                    escape(block.content())
                ));
            }
        }
    }
}

/// Server path of the image for block `index` (0-based) of slide `slide`.
pub fn diagram_url(slide: usize, index: usize) -> String {
    format!("/diagram/{slide}/{index}")
}

fn render_phases(phases: &[Phase], html: &mut String) {
    html.push_str("<div class=\"phase-diagram\">\n");
    for (i, phase) in phases.iter().enumerate() {
        if i > 0 {
            html.push_str("<div class=\"phase-arrow\">\u{2193}</div>\n");
        }
        html.push_str(&format!(
            "<div class=\"phase-card\"><h4 class=\"phase-title\">ФАЗА {}: {}</h4>\n",
            i + 1,
            render_inline(&phase.title)
        ));
        html.push_str("<ul class=\"phase-items\">\n");
        for item in &phase.items {
            html.push_str(&format!("<li>{}</li>\n", render_inline(item)));
        }
        html.push_str("</ul></div>\n");
    }
    html.push_str("</div>\n");
}

fn title_meta(metadata: &Metadata) -> String {
    let mut parts = vec![format!("Version {}", metadata.version)];
    if !metadata.date.is_empty() {
        parts.push(metadata.date.clone());
    }
    if !metadata.phase.is_empty() {
        parts.push(metadata.phase.clone());
    }
    parts.join(" \u{00b7} ")
}

fn render_list(content: &str, html: &mut String) {
    let tag = if is_ordered_list(content) { "ol" } else { "ul" };
    html.push_str(&format!("<{tag} class=\"markdown-list\">\n"));
    for item in list_items(content) {
        html.push_str(&format!("<li>{}</li>\n", render_inline(&item.text)));
    }
    html.push_str(&format!("</{tag}>\n"));
}

fn render_table(content: &str, html: &mut String) {
    let Some(table) = Table::parse(content) else {
        html.push_str(&format!("<pre>{}</pre>\n", escape(content)));
        return;
    };

    html.push_str("<div class=\"table-wrapper\"><table>\n<thead><tr>");
    for header in &table.headers {
        html.push_str(&format!("<th>{}</th>", render_inline(header)));
    }
    html.push_str("</tr></thead>\n<tbody>\n");
    for row in &table.rows {
        html.push_str("<tr>");
        for cell in row {
            html.push_str(&format!("<td>{}</td>", render_inline(cell)));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</tbody>\n</table></div>\n");
}

fn render_navigation(nav: &Navigator, html: &mut String) {
    html.push_str("<nav class=\"navigation\">\n<div class=\"controls\">\n");
    html.push_str("<button type=\"button\" class=\"nav-button\" data-nav=\"first\">Start</button>\n");
    html.push_str("<button type=\"button\" class=\"nav-button\" data-nav=\"previous\">Back</button>\n");
    html.push_str(&format!(
        "<div class=\"slideCounter\">{}</div>\n",
        nav.counter_label()
    ));
    html.push_str("<button type=\"button\" class=\"nav-button\" data-nav=\"next\">Next</button>\n");
    html.push_str("<button type=\"button\" class=\"nav-button\" data-nav=\"last\">End</button>\n");
    html.push_str("</div>\n<div class=\"progress\"><div class=\"progress-bar\"></div></div>\n");
    html.push_str("<div class=\"hint\">Use \u{2190} \u{2192} or space to navigate</div>\n</nav>\n");
}

const fn action_name(msg: NavMessage) -> &'static str {
    match msg {
        NavMessage::Next => "next",
        NavMessage::Previous => "previous",
        NavMessage::First => "first",
        NavMessage::Last => "last",
        NavMessage::GoTo(_) => "goto",
    }
}

fn page_script() -> String {
    let bindings: Vec<String> = KEY_BINDINGS
        .iter()
        .map(|(key, msg)| format!("{key:?}: {:?}", action_name(*msg)))
        .collect();
    SCRIPT.replace("/*KEY_BINDINGS*/", &bindings.join(", "))
}

fn render_inline(text: &str) -> String {
    parse_inline(text)
        .into_iter()
        .map(|run| match run.style {
            InlineStyle::Plain => escape(&run.text),
            InlineStyle::Bold => format!("<strong>{}</strong>", escape(&run.text)),
            InlineStyle::Italic => format!("<em>{}</em>", escape(&run.text)),
        })
        .collect()
}

/// Escape text for element content and quoted attribute values.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const SCRIPT: &str = r#"(function () {
  var slides = Array.prototype.slice.call(document.querySelectorAll('.slide'));
  var total = slides.length;
  var current = total > 0 ? 1 : 0;
  var counter = document.querySelector('.slideCounter');
  var bar = document.querySelector('.progress-bar');
  var buttons = document.querySelectorAll('[data-nav]');
  var keys = { /*KEY_BINDINGS*/ };

  function show(n) {
    if (total === 0 || n < 1 || n > total) return;
    current = n;
    slides.forEach(function (slide, i) {
      slide.classList.toggle('active', i + 1 === current);
    });
    counter.textContent = current + ' / ' + total;
    bar.style.width = (current / total) * 100 + '%';
    buttons.forEach(function (button) {
      var back = button.dataset.nav === 'first' || button.dataset.nav === 'previous';
      button.disabled = back ? current <= 1 : current >= total;
    });
  }

  var actions = {
    next: function () { show(current + 1); },
    previous: function () { show(current - 1); },
    first: function () { show(1); },
    last: function () { show(total); }
  };

  document.addEventListener('keydown', function (event) {
    var target = event.target;
    if (target && (target.tagName === 'INPUT' || target.tagName === 'TEXTAREA' || target.isContentEditable)) {
      return;
    }
    var action = keys[event.key];
    if (!action) return;
    event.preventDefault();
    actions[action]();
  });

  buttons.forEach(function (button) {
    button.addEventListener('click', function () { actions[button.dataset.nav](); });
  });

  document.querySelectorAll('.diagram-container.loading img').forEach(function (img) {
    var container = img.parentElement;
    function done() { container.classList.remove('loading'); }
    function failed() {
      var fallback = container.querySelector('.fallback');
      img.remove();
      container.classList.add('diagram-error');
      if (fallback) fallback.hidden = false;
      done();
    }
    if (img.complete) {
      if (img.naturalWidth > 0) done(); else failed();
    } else {
      img.addEventListener('load', done);
      img.addEventListener('error', failed);
    }
  });

  show(current);
})();
"#;

const STYLE: &str = r"
* { box-sizing: border-box; }
html, body { margin: 0; height: 100%; font-family: 'Segoe UI', Roboto, Helvetica, Arial, sans-serif; color: #1f2329; background: #f4f6f9; }
.presentation { position: relative; min-height: 100vh; display: flex; flex-direction: column; }
.slide { display: none; flex: 1; padding: 48px 72px 120px; background: #fff; }
.slide.active { display: block; }
.title-slide.active { display: flex; flex-direction: column; justify-content: center; align-items: center; text-align: center; background: linear-gradient(135deg, #020a1c, #1b3a6b); color: #fff; }
.title-slide-main { font-size: 3.2em; margin: 0 0 24px; }
.title-slide-subtitle { font-size: 1.4em; opacity: 0.9; }
.title-slide-meta { margin-top: 48px; opacity: 0.7; }
.slide-header { border-bottom: 3px solid #020a1c; margin-bottom: 24px; }
.slide-title { font-size: 2.2em; margin: 0 0 12px; }
.slide-content { font-size: 1.25em; line-height: 1.5; }
.heading { margin: 24px 0 12px; }
.text { margin: 8px 0; }
.markdown-list li { margin: 6px 0; }
.table-wrapper table { border-collapse: collapse; width: 100%; }
.table-wrapper th, .table-wrapper td { border: 1px solid #d0d7de; padding: 8px 12px; text-align: left; }
.table-wrapper th { background: #eef2f7; }
.code-block { background: #0d1117; color: #e6edf3; padding: 16px; border-radius: 6px; overflow-x: auto; font-size: 0.85em; }
.diagram-container { text-align: center; margin: 16px 0; }
.diagram-container.loading { min-height: 80px; }
.diagram { max-width: 100%; max-height: 70vh; }
.diagram-source, .fallback pre { text-align: left; background: #f6f8fa; padding: 12px; overflow-x: auto; }
.diagram-error .error-message { color: #b42318; }
.phase-diagram { display: flex; flex-direction: column; align-items: center; gap: 8px; margin: 16px 0; }
.phase-card { width: min(560px, 100%); border: 2px solid #1b3a6b; border-radius: 8px; padding: 12px 20px; background: #f8fafc; }
.phase-title { margin: 0 0 8px; color: #1b3a6b; }
.phase-items { margin: 0; padding-left: 20px; }
.phase-arrow { font-size: 1.6em; color: #1b3a6b; }
.navigation { position: fixed; left: 0; right: 0; bottom: 0; padding: 12px 24px; background: rgba(255, 255, 255, 0.95); border-top: 1px solid #d0d7de; }
.controls { display: flex; justify-content: center; align-items: center; gap: 12px; }
.nav-button { font-size: 1em; padding: 6px 16px; cursor: pointer; }
.nav-button:disabled { cursor: default; opacity: 0.4; }
.slideCounter { min-width: 80px; text-align: center; font-weight: 600; }
.progress { height: 4px; margin-top: 8px; background: #e4e7ec; }
.progress-bar { height: 100%; width: 0; background: #020a1c; }
.hint { text-align: center; font-size: 0.8em; color: #667085; margin-top: 4px; }
.empty { margin: auto; font-size: 1.5em; color: #667085; }
@media print { .navigation { display: none; } .slide { padding-bottom: 48px; } }
";
