use crate::cdp::{CdpEngine, EngineConfig};
use crate::request::{ImageFormat, ViewportSpec};
use crate::{Error, Result};
use tokio::sync::{mpsc, oneshot};

enum Command {
    LoadHtml(String, oneshot::Sender<Result<()>>),
    Evaluate(String, oneshot::Sender<Result<serde_json::Value>>),
    SetViewport(ViewportSpec, oneshot::Sender<Result<()>>),
    ScrollTo(u32, oneshot::Sender<Result<()>>),
    Screenshot(ImageFormat, u8, oneshot::Sender<Result<Vec<u8>>>),
    PrintPdf(ViewportSpec, oneshot::Sender<Result<Vec<u8>>>),
    Close(oneshot::Sender<Result<()>>),
}

/// An async handle to a headless browser owned by a blocking worker.
///
/// The worker runs on tokio's blocking pool, owns the synchronous
/// `CdpEngine` and executes commands in arrival order, so page state is
/// only ever touched by one caller at a time. Dropping the handle ends the
/// worker and the browser with it.
pub struct Browser {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl Browser {
    /// Launch a browser (the worker owns the engine).
    pub async fn launch(config: EngineConfig) -> Result<Self> {
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<Command>();
        let (init_tx, init_rx) = oneshot::channel::<Result<()>>();

        tokio::task::spawn_blocking(move || {
            let mut engine = match CdpEngine::launch(config) {
                Ok(e) => e,
                Err(err) => {
                    let _ = init_tx.send(Err(err));
                    return;
                }
            };
            let _ = init_tx.send(Ok(()));

            while let Some(cmd) = cmd_rx.blocking_recv() {
                match cmd {
                    Command::LoadHtml(html, resp) => {
                        let _ = resp.send(engine.load_html(&html));
                    }
                    Command::Evaluate(script, resp) => {
                        let _ = resp.send(engine.evaluate(&script));
                    }
                    Command::SetViewport(viewport, resp) => {
                        let _ = resp.send(engine.set_viewport(viewport));
                    }
                    Command::ScrollTo(offset, resp) => {
                        let _ = resp.send(engine.scroll_to(offset));
                    }
                    Command::Screenshot(format, quality, resp) => {
                        let _ = resp.send(engine.screenshot(format, quality));
                    }
                    Command::PrintPdf(viewport, resp) => {
                        let _ = resp.send(engine.print_pdf(viewport));
                    }
                    Command::Close(resp) => {
                        let _ = resp.send(engine.close());
                        return;
                    }
                }
            }
        });

        init_rx
            .await
            .map_err(|e| Error::Other(format!("Worker init canceled: {}", e)))??;

        Ok(Self { cmd_tx })
    }

    async fn request<T>(
        &self,
        what: &str,
        command: impl FnOnce(oneshot::Sender<Result<T>>) -> Command,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(command(tx))
            .map_err(|_| Error::Other(format!("{}: browser worker has exited", what)))?;
        rx.await
            .map_err(|e| Error::Other(format!("{} canceled: {}", what, e)))?
    }

    /// Load a document and wait for it to finish loading
    pub async fn load_html(&self, html: &str) -> Result<()> {
        let html = html.to_string();
        self.request("LoadHtml", |tx| Command::LoadHtml(html, tx)).await
    }

    /// Evaluate script in the page and return its JSON value
    pub async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let script = script.to_string();
        self.request("Evaluate", |tx| Command::Evaluate(script, tx)).await
    }

    pub async fn set_viewport(&self, viewport: ViewportSpec) -> Result<()> {
        self.request("SetViewport", |tx| Command::SetViewport(viewport, tx)).await
    }

    pub async fn scroll_to(&self, offset: u32) -> Result<()> {
        self.request("ScrollTo", |tx| Command::ScrollTo(offset, tx)).await
    }

    /// Capture the current viewport
    pub async fn screenshot(&self, format: ImageFormat, quality: u8) -> Result<Vec<u8>> {
        self.request("Screenshot", |tx| Command::Screenshot(format, quality, tx)).await
    }

    pub async fn print_pdf(&self, viewport: ViewportSpec) -> Result<Vec<u8>> {
        self.request("PrintPdf", |tx| Command::PrintPdf(viewport, tx)).await
    }

    /// Shut down the worker and close the browser.
    pub async fn close(self) -> Result<()> {
        self.request("Close", Command::Close).await
    }
}
