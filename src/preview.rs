//! Static HTML preview, written when no renderer is available
//!
//! The preview is the instrumented document plus print styles and a print
//! trigger, so the user can still save it as PDF or an image from a browser.

use crate::markup;
use crate::naming::ArtifactNamer;
use crate::Result;
use log::info;
use std::path::PathBuf;

/// Label of the print trigger button
pub const PRINT_TRIGGER_LABEL: &str = "打印为PDF";

/// Attribute marking the injected print trigger
pub const PRINT_MARKER: &str = "data-docshot-print";

const PRINT_STYLES: &str = r#"
<style>
@media print {
  body {
    margin: 0;
    padding: 20px;
  }

  @page {
    size: A4;
    margin: 10mm;
  }

  .print-button, .print-message {
    display: none;
  }
}

.print-button {
  position: fixed;
  top: 20px;
  right: 20px;
  background-color: #4CAF50;
  color: white;
  border: none;
  border-radius: 4px;
  padding: 10px 20px;
  font-size: 16px;
  cursor: pointer;
  z-index: 1000;
}

.print-button:hover {
  background-color: #45a049;
}

.print-message {
  position: fixed;
  bottom: 20px;
  left: 0;
  right: 0;
  background-color: #f8f9fa;
  color: #333;
  text-align: center;
  padding: 10px;
  border-top: 1px solid #ddd;
  font-size: 14px;
  z-index: 1000;
}
</style>
<script>
function printPage() {
  window.print();
}
</script>
"#;

fn print_trigger() -> String {
    format!(
        r#"
<button class="print-button" {marker} onclick="printPage()">{label}</button>
<div class="print-message">
  提示: 您可以使用浏览器的打印功能将此页面保存为PDF或图片。
  点击右上角的"打印"按钮，或按Ctrl+P (Windows) / Cmd+P (Mac)。
</div>
"#,
        marker = PRINT_MARKER,
        label = PRINT_TRIGGER_LABEL
    )
}

/// Add print styles before `</head>` and the print trigger after `<body>`
///
/// Without `</head>` the styles are prepended; without `<body>` the trigger
/// follows the styles.
///
/// # Examples
///
/// ```
/// use docshot::preview::{add_print_styles, PRINT_TRIGGER_LABEL};
/// let page = add_print_styles("<html><head></head><body><p>hi</p></body></html>");
/// assert!(page.contains(PRINT_TRIGGER_LABEL));
/// assert!(page.find("@media print").unwrap() < page.find("</head>").unwrap());
/// ```
pub fn add_print_styles(html: &str) -> String {
    let (styled, styles_end) = match markup::find_ci(html, "</head>") {
        Some(at) => (
            markup::insert_at(html, at, PRINT_STYLES),
            at + PRINT_STYLES.len() + "</head>".len(),
        ),
        None => (format!("{}{}", PRINT_STYLES, html), PRINT_STYLES.len()),
    };

    let at = markup::end_of_open_tag(&styled, "body").unwrap_or(styles_end);
    markup::insert_at(&styled, at, &print_trigger())
}

/// Write the preview of `html` into the namer's directory
pub async fn write_preview(html: &str, namer: &ArtifactNamer) -> Result<PathBuf> {
    let path = namer.preview_path();
    tokio::fs::write(&path, add_print_styles(html)).await?;
    info!("HTML preview written to {}", path.display());
    Ok(path)
}
