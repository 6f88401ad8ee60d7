//! Primary backend: headless Chrome driven over CDP

use crate::backend::{Backend, Session};
use crate::probe::BackendKind;
use crate::request::RenderRequest;
use crate::{Error, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::path::PathBuf;

const NAME: &str = "headless-chrome";

/// Headless Chrome with live page automation
#[derive(Debug, Clone, Default)]
pub struct ChromeBackend {
    chrome_path: Option<PathBuf>,
}

impl ChromeBackend {
    /// Use a specific Chrome/Chromium executable
    pub fn with_executable(path: impl Into<PathBuf>) -> Self {
        Self {
            chrome_path: Some(path.into()),
        }
    }
}

impl Backend for ChromeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Primary
    }

    fn name(&self) -> &'static str {
        NAME
    }

    #[cfg(feature = "cdp")]
    fn probe(&self) -> BoxFuture<'_, Result<()>> {
        async move {
            let path = match &self.chrome_path {
                Some(path) => path.clone(),
                None => headless_chrome::browser::default_executable().map_err(|reason| {
                    Error::BackendUnavailable { backend: NAME, reason }
                })?,
            };
            if !path.exists() {
                return Err(Error::BackendUnavailable {
                    backend: NAME,
                    reason: format!("{} does not exist", path.display()),
                });
            }
            log::debug!("using Chrome at {}", path.display());
            Ok(())
        }
        .boxed()
    }

    #[cfg(not(feature = "cdp"))]
    fn probe(&self) -> BoxFuture<'_, Result<()>> {
        async {
            Err(Error::BackendUnavailable {
                backend: NAME,
                reason: "built without the `cdp` feature".into(),
            })
        }
        .boxed()
    }

    #[cfg(feature = "cdp")]
    fn open<'a>(
        &'a self,
        html: &'a str,
        request: &'a RenderRequest,
    ) -> BoxFuture<'a, Result<Box<dyn Session>>> {
        async move {
            let config = crate::cdp::EngineConfig {
                viewport: crate::viewport::resolve_fixed(request),
                timeout_ms: request.timeout_millis,
                transparent_background: request.transparent_background,
                chrome_path: self.chrome_path.clone(),
                ..Default::default()
            };
            let browser = crate::async_api::Browser::launch(config).await?;
            if let Err(e) = browser.load_html(html).await {
                if let Err(close_err) = browser.close().await {
                    log::warn!("closing browser after failed load: {}", close_err);
                }
                return Err(e);
            }
            Ok(Box::new(live::ChromeSession::new(browser, request)) as Box<dyn Session>)
        }
        .boxed()
    }

    #[cfg(not(feature = "cdp"))]
    fn open<'a>(
        &'a self,
        _html: &'a str,
        _request: &'a RenderRequest,
    ) -> BoxFuture<'a, Result<Box<dyn Session>>> {
        async {
            Err(Error::BackendUnavailable {
                backend: NAME,
                reason: "built without the `cdp` feature".into(),
            })
        }
        .boxed()
    }
}

#[cfg(feature = "cdp")]
mod live {
    use crate::async_api::Browser;
    use crate::backend::{bounded, CaptureSettings, LivePage, Session};
    use crate::request::{ImageFormat, RenderRequest, ViewportSpec};
    use crate::sections::{heading_scan_script, HeadingScan};
    use crate::viewport::{ContentSize, MEASURE_SCRIPT};
    use crate::{Error, Result};
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use serde::de::DeserializeOwned;

    pub(super) struct ChromeSession {
        browser: Browser,
        timeout_ms: u64,
    }

    impl ChromeSession {
        pub(super) fn new(browser: Browser, request: &RenderRequest) -> Self {
            Self {
                browser,
                timeout_ms: request.timeout_millis,
            }
        }

        async fn evaluate_as<T: DeserializeOwned>(&self, script: &str) -> Result<T> {
            let value = bounded(self.timeout_ms, self.browser.evaluate(script)).await?;
            serde_json::from_value(value)
                .map_err(|e| Error::ScriptError(format!("Unexpected script result: {}", e)))
        }
    }

    impl Session for ChromeSession {
        fn supports(&self, _format: ImageFormat) -> bool {
            true
        }

        fn live_page(&mut self) -> Option<&mut dyn LivePage> {
            Some(self)
        }

        fn capture<'a>(
            &'a mut self,
            format: ImageFormat,
            settings: &'a CaptureSettings,
        ) -> BoxFuture<'a, Result<Vec<u8>>> {
            async move {
                match format {
                    ImageFormat::Pdf => self.browser.print_pdf(settings.viewport).await,
                    _ => self.browser.screenshot(format, settings.quality).await,
                }
            }
            .boxed()
        }

        fn close(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
            let this = *self;
            async move { this.browser.close().await }.boxed()
        }
    }

    impl LivePage for ChromeSession {
        fn measure_content(&mut self) -> BoxFuture<'_, Result<ContentSize>> {
            async move { self.evaluate_as::<ContentSize>(MEASURE_SCRIPT).await }.boxed()
        }

        fn heading_marks<'a>(&'a mut self, selector: &'a str) -> BoxFuture<'a, Result<HeadingScan>> {
            async move {
                let script = heading_scan_script(selector);
                self.evaluate_as::<HeadingScan>(&script).await
            }
            .boxed()
        }

        fn set_viewport(&mut self, viewport: ViewportSpec) -> BoxFuture<'_, Result<()>> {
            async move { bounded(self.timeout_ms, self.browser.set_viewport(viewport)).await }.boxed()
        }

        fn scroll_to(&mut self, offset: u32) -> BoxFuture<'_, Result<()>> {
            async move { bounded(self.timeout_ms, self.browser.scroll_to(offset)).await }.boxed()
        }
    }
}
