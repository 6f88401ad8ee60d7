//! Diagram bootstrap injection
//!
//! Fenced `mermaid` blocks arrive as `<pre><code class="language-mermaid">`.
//! The bootstrap script converts them into `div.mermaid` nodes and renders
//! them while the page loads, so every backend captures drawn diagrams
//! instead of source text. Instrumentation is a pure string transform and
//! needs no browser.

use crate::markup;
use log::debug;
use scraper::{Html, Selector};

/// Fence language that marks a diagram block
pub const DIAGRAM_LANGUAGE: &str = "mermaid";

/// Attribute carried by the injected `<script>` tag
pub const BOOTSTRAP_MARKER: &str = "data-docshot-bootstrap";

/// Attribute set on every diagram node the bootstrap has processed
pub const CONVERTED_MARKER: &str = "data-docshot-diagram";

const DIAGRAM_BLOCK_SELECTOR: &str = "pre > code.language-mermaid";

const DIAGRAM_BOOTSTRAP: &str = r#"<script data-docshot-bootstrap>
(function () {
  if (typeof mermaid === 'undefined') {
    console.warn('docshot: mermaid is not loaded; diagrams stay as code');
    return;
  }
  try {
    mermaid.initialize({ startOnLoad: false, theme: 'default' });
  } catch (e) {
    console.error('docshot: mermaid.initialize failed', e);
    return;
  }
  document.querySelectorAll('pre > code.language-mermaid').forEach(function (code) {
    var pre = code.parentElement;
    if (!pre || !pre.parentElement) return;
    var div = document.createElement('div');
    div.className = 'mermaid';
    div.setAttribute('data-docshot-diagram', 'pending');
    div.textContent = code.textContent;
    pre.parentElement.replaceChild(div, pre);
  });
  document.querySelectorAll('div.mermaid:not([data-docshot-diagram="done"])').forEach(function (div) {
    try {
      mermaid.init(undefined, div);
    } catch (e) {
      console.error('docshot: diagram render failed', e);
    }
    div.setAttribute('data-docshot-diagram', 'done');
  });
})();
</script>
"#;

/// Insert the diagram bootstrap right before the closing body tag
///
/// Already-instrumented input is returned unchanged. Without a `</body>` the
/// script is appended at the end of the document.
///
/// # Examples
///
/// ```
/// let once = docshot::instrument::instrument("<html><body><p>x</p></body></html>");
/// let twice = docshot::instrument::instrument(&once);
/// assert_eq!(once, twice);
/// assert!(once.ends_with("</script>\n</body></html>"));
/// ```
pub fn instrument(html: &str) -> String {
    if is_instrumented(html) {
        debug!("document already carries the diagram bootstrap");
        return html.to_string();
    }

    match markup::rfind_ci(html, "</body>") {
        Some(at) => markup::insert_at(html, at, DIAGRAM_BOOTSTRAP),
        None => {
            let mut out = String::with_capacity(html.len() + DIAGRAM_BOOTSTRAP.len());
            out.push_str(html);
            out.push_str(DIAGRAM_BOOTSTRAP);
            out
        }
    }
}

/// Whether the bootstrap script is already present
pub fn is_instrumented(html: &str) -> bool {
    html.contains(&format!("<script {}>", BOOTSTRAP_MARKER))
}

/// Number of unconverted diagram code blocks in the document
pub fn diagram_block_count(html: &str) -> usize {
    let document = Html::parse_document(html);
    Selector::parse(DIAGRAM_BLOCK_SELECTOR)
        .map(|sel| document.select(&sel).count())
        .unwrap_or(0)
}

/// Script counting processed diagram nodes in a live page
pub fn converted_count_script() -> String {
    format!(
        "document.querySelectorAll('[{}=\"done\"]').length",
        CONVERTED_MARKER
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<!DOCTYPE html>
<html><head><title>t</title></head>
<body>
<h1>Flow</h1>
<pre><code class="language-mermaid">graph TD; A-->B;</code></pre>
<pre><code class="language-rust">fn main() {}</code></pre>
<pre><code class="language-mermaid">sequenceDiagram; A->>B: hi</code></pre>
</body></html>"#;

    #[test]
    fn bootstrap_lands_before_closing_body() {
        let out = instrument(DOC);
        let script = out.find(BOOTSTRAP_MARKER).unwrap();
        let body_end = out.rfind("</body>").unwrap();
        assert!(script < body_end);
        assert!(out.starts_with(&DOC[..DOC.find("</body>").unwrap()]));
    }

    #[test]
    fn instrumenting_twice_changes_nothing() {
        let once = instrument(DOC);
        let twice = instrument(&once);
        let thrice = instrument(&twice);
        assert_eq!(once, thrice);
        assert_eq!(thrice.matches(BOOTSTRAP_MARKER).count(), 1);
    }

    #[test]
    fn diagram_blocks_survive_instrumentation() {
        assert_eq!(diagram_block_count(DOC), 2);
        let out = instrument(&instrument(DOC));
        assert_eq!(diagram_block_count(&out), 2);
    }

    #[test]
    fn missing_body_appends() {
        let out = instrument("<p>fragment</p>");
        assert!(out.starts_with("<p>fragment</p><script"));
        assert!(is_instrumented(&out));
    }

    #[test]
    fn uppercase_body_tag() {
        let out = instrument("<HTML><BODY>x</BODY></HTML>");
        assert!(out.ends_with("</script>\n</BODY></HTML>"));
    }

    #[test]
    fn bootstrap_tolerates_missing_library() {
        assert!(DIAGRAM_BOOTSTRAP.contains("typeof mermaid === 'undefined'"));
        assert!(DIAGRAM_BOOTSTRAP.contains(DIAGRAM_BLOCK_SELECTOR));
        assert!(DIAGRAM_BOOTSTRAP.contains(DIAGRAM_LANGUAGE));
    }
}
