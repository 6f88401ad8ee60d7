//! docshot
//!
//! Turns a finished HTML document into PNG, JPEG, WebP or PDF files, falling
//! back across rendering backends and, when none is usable, to a printable
//! HTML preview.
//!
//! # Features
//!
//! - **CDP Backend** (default): headless Chrome over the Chrome DevTools Protocol,
//!   with content-measured viewports and per-heading section images
//! - **Document renderer**: `wkhtmltoimage` / `wkhtmltopdf` when Chrome is missing
//! - **Preview fallback**: a standalone HTML file with a print-to-PDF button
//!
//! # Example
//!
//! ```no_run
//! use docshot::{ImageFormat, RenderRequest};
//!
//! # async fn run() -> docshot::Result<()> {
//! let request = RenderRequest {
//!     extra_formats: vec![ImageFormat::Jpeg],
//!     split_into_sections: true,
//!     file_name_prefix: Some("weekly".to_string()),
//!     ..RenderRequest::new("<html><body><h1>Hello</h1><p>World</p></body></html>")
//! };
//!
//! for path in docshot::render_html(&request).await? {
//!     println!("{}", path.display());
//! }
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::OnceLock;

pub mod error;
pub use error::{Error, Result};

mod markup;

pub mod backend;
pub mod instrument;
pub mod naming;
pub mod orchestrator;
pub mod preview;
pub mod probe;
pub mod request;
pub mod sections;
pub mod viewport;

#[cfg(feature = "cdp")]
pub mod cdp;

// Async handle over the synchronous CDP engine
#[cfg(feature = "cdp")]
pub mod async_api;

#[cfg(feature = "cdp")]
pub use async_api::Browser;

pub use backend::{Backend, CaptureSettings, LivePage, Session};
pub use orchestrator::Renderer;
pub use probe::{BackendKind, Capability};
pub use request::{Artifact, ArtifactKind, ImageFormat, RenderRequest, SectionRange, ViewportSpec};

/// Render with the default backends and return the written paths
///
/// Backend probes are cached for the life of the process.
pub async fn render_html(request: &RenderRequest) -> Result<Vec<PathBuf>> {
    static RENDERER: OnceLock<Renderer> = OnceLock::new();
    let renderer = RENDERER.get_or_init(Renderer::new);
    let artifacts = renderer.render(request).await?;
    Ok(artifacts.into_iter().map(|a| a.path).collect())
}
