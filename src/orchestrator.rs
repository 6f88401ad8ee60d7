//! Render orchestration: backend selection, capture and fallback
//!
//! One call to [`Renderer::render`] instruments the document, walks the
//! backend registry in priority order and returns the artifacts of the first
//! backend that produces its primary format. Backends that are missing or
//! fail are skipped; when none is left a static HTML preview is written.
//! Only storage failures ([`Error::is_fatal`]) reach the caller.

use crate::backend::{bounded, default_backends, Backend, CaptureSettings, LivePage, Session};
use crate::instrument::instrument;
use crate::naming::{ArtifactNamer, NameBatch};
use crate::preview::write_preview;
use crate::probe::{BackendKind, Prober};
use crate::request::{Artifact, ArtifactKind, ImageFormat, RenderRequest, SectionRange};
use crate::sections::{capture_section, partition, section_viewport, tile_ranges};
use crate::viewport::{apply_fixed, fit_to_content, pause, resolve_auto_size, resolve_fixed, Settle};
use crate::{Error, Result};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Converts documents using the first backend that works
pub struct Renderer {
    backends: Vec<Box<dyn Backend>>,
    prober: Prober,
    settle: Settle,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    /// Headless Chrome, then wkhtmltox, then the HTML preview
    pub fn new() -> Self {
        Self::with_backends(default_backends())
    }

    /// Use `backends` in the given priority order
    pub fn with_backends(backends: Vec<Box<dyn Backend>>) -> Self {
        Self {
            backends,
            prober: Prober::new(),
            settle: Settle::default(),
        }
    }

    pub fn with_settle(mut self, settle: Settle) -> Self {
        self.settle = settle;
        self
    }

    /// Probe cache shared by every render of this renderer, keyed by
    /// registry position
    pub fn prober(&self) -> &Prober {
        &self.prober
    }

    /// Convert `request.source_document` into image/PDF files
    ///
    /// Always returns at least one artifact: when no backend can render, the
    /// single artifact is an HTML preview.
    pub async fn render(&self, request: &RenderRequest) -> Result<Vec<Artifact>> {
        let request = request.normalized();
        let dir = ensure_output_dir(&request.output_directory).await?;
        let namer = ArtifactNamer::new(dir, &request);
        let html = instrument(&request.source_document);

        for (slot, backend) in self.backends.iter().enumerate() {
            if !self.prober.probe(slot, backend.as_ref()).await.is_available() {
                continue;
            }
            let conversion = Conversion {
                backend: backend.as_ref(),
                request: &request,
                namer: &namer,
                settle: self.settle,
            };
            match conversion.run(&html).await {
                Ok(artifacts) => return Ok(artifacts),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(
                    "{} backend '{}' failed: {}",
                    backend.kind().label(),
                    backend.name(),
                    e
                ),
            }
        }

        warn!("No rendering backend could convert the document; writing an HTML preview");
        let path = write_preview(&html, &namer).await?;
        Ok(vec![Artifact {
            path,
            kind: ArtifactKind::Preview,
            section_index: None,
            range: None,
            backend: BackendKind::None,
        }])
    }
}

/// Create the output directory, retargeting to its parent when that fails
///
/// The returned path is absolute.
pub async fn ensure_output_dir(requested: &Path) -> Result<PathBuf> {
    let dir = match tokio::fs::create_dir_all(requested).await {
        Ok(()) => requested.to_path_buf(),
        Err(source) => {
            let parent = requested
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."))
                .to_path_buf();
            let err = Error::DirectoryCreate {
                path: requested.to_path_buf(),
                source,
            };
            warn!("{}; writing to {} instead", err, parent.display());
            tokio::fs::create_dir_all(&parent).await?;
            parent
        }
    };

    if dir.is_absolute() {
        Ok(dir)
    } else {
        Ok(std::env::current_dir()?.join(dir))
    }
}

/// How a whole-document capture sizes the viewport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sizing {
    Fixed,
    Auto,
    /// Auto, with the script wait already paid by a section attempt
    AutoSettled,
}

/// One document on one backend
struct Conversion<'a> {
    backend: &'a dyn Backend,
    request: &'a RenderRequest,
    namer: &'a ArtifactNamer,
    settle: Settle,
}

impl Conversion<'_> {
    async fn run(&self, html: &str) -> Result<Vec<Artifact>> {
        info!(
            "Rendering with {} backend '{}'",
            self.backend.kind().label(),
            self.backend.name()
        );
        let mut session = bounded(self.request.timeout_millis, self.backend.open(html, self.request)).await?;

        let outcome = self.capture_all(session.as_mut()).await;

        if let Err(e) = session.close().await {
            warn!("Failed to close '{}' session: {}", self.backend.name(), e);
        }
        outcome
    }

    async fn capture_all(&self, session: &mut dyn Session) -> Result<Vec<Artifact>> {
        let primary = self.primary_format(session)?;
        let split = self.request.split_into_sections && primary != ImageFormat::Pdf;
        if self.request.split_into_sections && !split {
            info!("PDF output covers the whole document; section splitting skipped");
        }

        if let Some(page) = session.live_page() {
            if !split {
                let sizing = if self.request.uses_auto_size() { Sizing::Auto } else { Sizing::Fixed };
                return self.capture_document(page, primary, sizing).await;
            }
            match self.capture_sections(page, primary).await {
                Ok(artifacts) if !artifacts.is_empty() => return Ok(artifacts),
                Ok(_) => info!(
                    "No elements match '{}'; capturing the whole document",
                    self.request.section_selector
                ),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Section capture failed: {}; capturing the whole document", e);
                    page.scroll_to(0).await?;
                }
            }
            return self.capture_document(page, primary, Sizing::AutoSettled).await;
        }

        if split {
            info!(
                "'{}' cannot frame sections; capturing the whole document",
                self.backend.name()
            );
        }
        let settings = CaptureSettings::for_request(
            self.request,
            resolve_fixed(self.request),
            self.request.uses_auto_size(),
        );
        let bytes = self.capture(session, primary, &settings).await?;
        self.finish_batch(session, self.namer.batch(None), primary, bytes, &settings, None)
            .await
    }

    /// Requested primary format, or the backend's substitute for it
    fn primary_format(&self, session: &dyn Session) -> Result<ImageFormat> {
        let requested = self.request.primary_format;
        if session.supports(requested) {
            return Ok(requested);
        }
        match session.substitute(requested) {
            Some(format) => {
                warn!(
                    "'{}' cannot produce {}; producing {} instead",
                    self.backend.name(),
                    requested,
                    format
                );
                Ok(format)
            }
            None => Err(Error::FormatUnsupported {
                backend: self.backend.name(),
                format: requested,
            }),
        }
    }

    /// Whole document on a live page, auto-sized or fixed
    async fn capture_document(
        &self,
        page: &mut dyn LivePage,
        primary: ImageFormat,
        sizing: Sizing,
    ) -> Result<Vec<Artifact>> {
        let viewport = match sizing {
            Sizing::Fixed => apply_fixed(page, self.request, &self.settle).await?,
            Sizing::Auto => resolve_auto_size(page, self.request, &self.settle).await?,
            Sizing::AutoSettled => fit_to_content(page, self.request, &self.settle).await?,
        };
        if self.request.max_height > 0 && viewport.height > self.request.max_height {
            warn!(
                "Document is {}px tall, above the {}px maximum; consider splitting into sections",
                viewport.height, self.request.max_height
            );
        }

        let settings = CaptureSettings::for_request(self.request, viewport, false);
        let bytes = self.capture(page, primary, &settings).await?;
        self.finish_batch(page, self.namer.batch(None), primary, bytes, &settings, None)
            .await
    }

    /// One batch per section; written files are removed again on failure
    async fn capture_sections(&self, page: &mut dyn LivePage, primary: ImageFormat) -> Result<Vec<Artifact>> {
        pause(Duration::from_millis(self.request.wait_millis)).await;
        pause(self.settle.reflow).await;

        let ranges = partition(page, &self.request.section_selector).await?;
        if ranges.is_empty() {
            return Ok(Vec::new());
        }
        let ranges = tile_ranges(ranges, self.request.max_height);
        let base = resolve_fixed(self.request);
        info!("Capturing {} sections", ranges.len());

        let mut written = Vec::new();
        for (index, range) in ranges.iter().enumerate() {
            let settings = CaptureSettings::for_request(self.request, section_viewport(range, base), false);
            let outcome = async {
                let bytes = bounded(
                    self.request.timeout_millis,
                    capture_section(page, range, primary, &settings, &self.settle),
                )
                .await?;
                self.finish_batch(page, self.namer.batch(Some(index)), primary, bytes, &settings, Some(range))
                    .await
            }
            .await;

            match outcome {
                Ok(artifacts) => {
                    debug!("section {} '{}' captured", index + 1, range.title);
                    written.extend(artifacts);
                }
                Err(e) => {
                    remove_artifacts(&written).await;
                    return Err(e);
                }
            }
        }
        Ok(written)
    }

    async fn capture<S: Session + ?Sized>(
        &self,
        session: &mut S,
        format: ImageFormat,
        settings: &CaptureSettings,
    ) -> Result<Vec<u8>> {
        bounded(self.request.timeout_millis, session.capture(format, settings)).await
    }

    /// Write the primary capture, then capture and write each extra format
    ///
    /// Extra formats that fail or are unsupported are skipped with a warning.
    async fn finish_batch<S: Session + ?Sized>(
        &self,
        session: &mut S,
        batch: NameBatch<'_>,
        primary: ImageFormat,
        primary_bytes: Vec<u8>,
        settings: &CaptureSettings,
        range: Option<&SectionRange>,
    ) -> Result<Vec<Artifact>> {
        let mut artifacts = vec![self.write(&batch, primary, &primary_bytes, range).await?];

        for &format in &self.request.extra_formats {
            if format == primary {
                continue;
            }
            if !session.supports(format) || (range.is_some() && format == ImageFormat::Pdf) {
                let skipped = Error::FormatUnsupported {
                    backend: self.backend.name(),
                    format,
                };
                warn!("{}; skipping", skipped);
                continue;
            }
            match self.capture(session, format, settings).await {
                Ok(bytes) => artifacts.push(self.write(&batch, format, &bytes, range).await?),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!("Skipping {} output: {}", format, e),
            }
        }
        Ok(artifacts)
    }

    async fn write(
        &self,
        batch: &NameBatch<'_>,
        format: ImageFormat,
        bytes: &[u8],
        range: Option<&SectionRange>,
    ) -> Result<Artifact> {
        let path = batch.path(format);
        tokio::fs::write(&path, bytes).await?;
        info!("Wrote {}", path.display());
        Ok(Artifact {
            path,
            kind: ArtifactKind::Rendered(format),
            section_index: batch.section(),
            range: range.cloned(),
            backend: self.backend.kind(),
        })
    }
}

async fn remove_artifacts(artifacts: &[Artifact]) {
    for artifact in artifacts {
        if let Err(e) = tokio::fs::remove_file(&artifact.path).await {
            warn!("Failed to remove partial output {}: {}", artifact.path.display(), e);
        }
    }
}
