//! Secondary backend: wkhtmltoimage / wkhtmltopdf driven as external CLIs
//!
//! There is no live page here. The document is written to a scratch file and
//! each capture is one CLI run; viewport measuring and section framing are
//! unavailable, so the orchestrator renders the whole document.

use crate::backend::{bounded, Backend, CaptureSettings, Session};
use crate::probe::BackendKind;
use crate::request::{ImageFormat, RenderRequest};
use crate::{Error, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, warn};
use std::ffi::OsString;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use tempfile::NamedTempFile;
use tokio::process::Command;

const NAME: &str = "wkhtmltox";

/// Bound on a `--version` run while probing
const PROBE_TIMEOUT_MS: u64 = 10_000;

/// Which of the two tools answered the probe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Tools {
    image: bool,
    pdf: bool,
}

/// Headless document renderer
#[derive(Debug)]
pub struct WkhtmlBackend {
    image_bin: PathBuf,
    pdf_bin: PathBuf,
    tools: OnceLock<Tools>,
}

impl Default for WkhtmlBackend {
    fn default() -> Self {
        Self::with_binaries("wkhtmltoimage", "wkhtmltopdf")
    }
}

impl WkhtmlBackend {
    pub fn with_binaries(image_bin: impl Into<PathBuf>, pdf_bin: impl Into<PathBuf>) -> Self {
        Self {
            image_bin: image_bin.into(),
            pdf_bin: pdf_bin.into(),
            tools: OnceLock::new(),
        }
    }

    async fn tools(&self) -> Tools {
        if let Some(tools) = self.tools.get() {
            return *tools;
        }
        let tools = Tools {
            image: tool_answers(&self.image_bin).await,
            pdf: tool_answers(&self.pdf_bin).await,
        };
        *self.tools.get_or_init(|| tools)
    }
}

/// Whether `program --version` runs and exits cleanly
async fn tool_answers(program: &Path) -> bool {
    let result = run(program, vec![OsString::from("--version")], PROBE_TIMEOUT_MS).await;
    match result {
        Ok(()) => true,
        Err(e) => {
            debug!("{} did not answer: {}", program.display(), e);
            false
        }
    }
}

/// Run `program` to completion, mapping a missing executable to unavailability
async fn run(program: &Path, args: Vec<OsString>, timeout_ms: u64) -> Result<()> {
    let mut command = Command::new(program);
    command
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = bounded(timeout_ms, async {
        command.output().await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                Error::BackendUnavailable {
                    backend: NAME,
                    reason: format!("{} not found", program.display()),
                }
            } else {
                Error::RenderError(format!("Failed to spawn {}: {}", program.display(), err))
            }
        })
    })
    .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::RenderError(format!(
            "{} exited with {:?}: {}",
            program.display(),
            output.status.code(),
            stderr.trim()
        )));
    }
    Ok(())
}

impl Backend for WkhtmlBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Secondary
    }

    fn name(&self) -> &'static str {
        NAME
    }

    fn probe(&self) -> BoxFuture<'_, Result<()>> {
        async move {
            let tools = self.tools().await;
            if tools.image || tools.pdf {
                debug!("wkhtmltox tools: image={} pdf={}", tools.image, tools.pdf);
                Ok(())
            } else {
                Err(Error::BackendUnavailable {
                    backend: NAME,
                    reason: format!(
                        "neither {} nor {} could be run",
                        self.image_bin.display(),
                        self.pdf_bin.display()
                    ),
                })
            }
        }
        .boxed()
    }

    fn open<'a>(
        &'a self,
        html: &'a str,
        request: &'a RenderRequest,
    ) -> BoxFuture<'a, Result<Box<dyn Session>>> {
        async move {
            let tools = self.tools().await;

            let mut input = tempfile::Builder::new()
                .prefix("docshot-")
                .suffix(".html")
                .tempfile()
                .map_err(|e| Error::LoadError(format!("Failed to create scratch file: {}", e)))?;
            input
                .write_all(html.as_bytes())
                .and_then(|_| input.flush())
                .map_err(|e| Error::LoadError(format!("Failed to write scratch file: {}", e)))?;

            Ok(Box::new(WkhtmlSession {
                image_bin: self.image_bin.clone(),
                pdf_bin: self.pdf_bin.clone(),
                tools,
                input,
                wait_millis: request.wait_millis,
                timeout_ms: request.timeout_millis,
            }) as Box<dyn Session>)
        }
        .boxed()
    }
}

struct WkhtmlSession {
    image_bin: PathBuf,
    pdf_bin: PathBuf,
    tools: Tools,
    input: NamedTempFile,
    wait_millis: u64,
    timeout_ms: u64,
}

impl WkhtmlSession {
    fn image_args(&self, format: ImageFormat, settings: &CaptureSettings, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--format".into(),
            match format {
                ImageFormat::Jpeg => "jpg".into(),
                _ => "png".into(),
            },
            "--quality".into(),
            settings.quality.to_string().into(),
            "--width".into(),
            settings.viewport.width.to_string().into(),
        ];
        if !settings.full_page {
            args.push("--height".into());
            args.push(settings.viewport.height.to_string().into());
        }
        if settings.transparent && format == ImageFormat::Png {
            args.push("--transparent".into());
        }
        args.extend(self.common_args());
        args.push(self.input.path().into());
        args.push(output.into());
        args
    }

    fn pdf_args(&self, settings: &CaptureSettings, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--page-size".into(),
            "A4".into(),
            "--orientation".into(),
            "Portrait".into(),
        ];
        for side in ["--margin-top", "--margin-bottom", "--margin-left", "--margin-right"] {
            args.push(side.into());
            args.push("10mm".into());
        }
        let background = if settings.transparent { "--no-background" } else { "--background" };
        args.push(background.into());
        args.extend(self.common_args());
        args.push(self.input.path().into());
        args.push(output.into());
        args
    }

    fn common_args(&self) -> Vec<OsString> {
        vec![
            "--javascript-delay".into(),
            self.wait_millis.to_string().into(),
            "--enable-local-file-access".into(),
            "--quiet".into(),
        ]
    }
}

impl Session for WkhtmlSession {
    fn supports(&self, format: ImageFormat) -> bool {
        match format {
            ImageFormat::Png | ImageFormat::Jpeg => self.tools.image,
            ImageFormat::Pdf => self.tools.pdf,
            ImageFormat::Webp => false,
        }
    }

    fn substitute(&self, format: ImageFormat) -> Option<ImageFormat> {
        [ImageFormat::Pdf, ImageFormat::Png]
            .into_iter()
            .find(|candidate| *candidate != format && self.supports(*candidate))
    }

    fn capture<'a>(
        &'a mut self,
        format: ImageFormat,
        settings: &'a CaptureSettings,
    ) -> BoxFuture<'a, Result<Vec<u8>>> {
        async move {
            if !self.supports(format) {
                return Err(Error::FormatUnsupported { backend: NAME, format });
            }

            let output = tempfile::Builder::new()
                .prefix("docshot-")
                .suffix(&format!(".{}", format.extension()))
                .tempfile()
                .map_err(|e| Error::RenderError(format!("Failed to create output file: {}", e)))?;

            let (program, args) = match format {
                ImageFormat::Pdf => (&self.pdf_bin, self.pdf_args(settings, output.path())),
                _ => (&self.image_bin, self.image_args(format, settings, output.path())),
            };
            debug!("running {} for {}", program.display(), format);
            run(program, args, self.timeout_ms).await?;

            let bytes = tokio::fs::read(output.path())
                .await
                .map_err(|e| Error::RenderError(format!("Failed to read {} output: {}", format, e)))?;
            if bytes.is_empty() {
                return Err(Error::RenderError(format!("{} produced an empty {}", program.display(), format)));
            }
            Ok(bytes)
        }
        .boxed()
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
        let input = self.input;
        async move {
            input.close().map_err(|e| {
                warn!("Failed to remove scratch document: {}", e);
                Error::Other(format!("Failed to remove scratch document: {}", e))
            })
        }
        .boxed()
    }
}
