//! Chrome DevTools Protocol engine (synchronous, one tab per browser)

use crate::request::{ImageFormat, ViewportSpec};
use crate::{Error, Result};
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::{Emulation, Page};
use headless_chrome::types::PrintToPdfOptions;
use headless_chrome::{Browser, LaunchOptions};
use log::{debug, warn};
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;

/// CSS pixels per inch, used to size PDF pages from a viewport
const CSS_PX_PER_INCH: f64 = 96.0;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Resource timing entries recorded so far
const RESOURCE_COUNT_SCRIPT: &str = "performance.getEntriesByType('resource').length";

/// Unchanged resource polls (500ms) that count as network idle
const IDLE_POLLS: u32 = 5;

/// Launch settings for a [`CdpEngine`]
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Initial window size and scale
    pub viewport: ViewportSpec,
    /// Bound on each protocol call and on page loads
    pub timeout_ms: u64,
    pub transparent_background: bool,
    /// Chrome executable; the `CHROME` env var or a PATH lookup when unset
    pub chrome_path: Option<PathBuf>,
    /// Run Chrome with its sandbox (off by default for container use)
    pub sandbox: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            viewport: ViewportSpec::default(),
            timeout_ms: 60000,
            transparent_background: false,
            chrome_path: None,
            sandbox: false,
        }
    }
}

/// Headless Chrome with a single tab
///
/// The loaded document lives in a scratch file for as long as the engine
/// does; dropping the engine kills the browser process.
pub struct CdpEngine {
    browser: Browser,
    tab: Arc<Tab>,
    config: EngineConfig,
    document: Option<NamedTempFile>,
}

impl CdpEngine {
    pub fn launch(config: EngineConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.timeout_ms);

        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(config.sandbox)
            .window_size(Some((config.viewport.width, config.viewport.height)))
            .path(config.chrome_path.clone())
            .idle_browser_timeout(timeout.max(Duration::from_secs(30)) * 2)
            .build()
            .map_err(|e| Error::InitializationError(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::InitializationError(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| Error::InitializationError(format!("Failed to create tab: {}", e)))?;
        tab.set_default_timeout(timeout);

        let engine = Self {
            browser,
            tab,
            config,
            document: None,
        };
        engine.set_viewport(engine.config.viewport)?;
        if engine.config.transparent_background {
            engine.set_transparent_background()?;
        }
        Ok(engine)
    }

    /// Load `html` from a scratch file and wait until the page is complete
    pub fn load_html(&mut self, html: &str) -> Result<()> {
        let mut file = tempfile::Builder::new()
            .prefix("docshot-")
            .suffix(".html")
            .tempfile()
            .map_err(|e| Error::LoadError(format!("Failed to create scratch file: {}", e)))?;
        file.write_all(html.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| Error::LoadError(format!("Failed to write scratch file: {}", e)))?;

        let url = format!("file://{}", file.path().display());
        self.tab
            .navigate_to(&url)
            .map_err(|e| Error::LoadError(format!("Navigation failed: {}", e)))?;
        self.tab
            .wait_until_navigated()
            .map_err(|e| Error::LoadError(format!("Wait for navigation failed: {}", e)))?;
        self.document = Some(file);

        self.wait_until_complete()
    }

    /// Poll `document.readyState` until the load event, then wait for the
    /// network to go idle
    ///
    /// A page that never goes idle (polling, streaming) is captured anyway
    /// once the timeout runs out.
    fn wait_until_complete(&self) -> Result<()> {
        let deadline = Instant::now() + Duration::from_millis(self.config.timeout_ms);
        loop {
            let state = self.evaluate("document.readyState")?;
            if state.as_str() == Some("complete") {
                break;
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout(self.config.timeout_ms));
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        let mut idle = IdleTracker::new(IDLE_POLLS);
        loop {
            let count = self.evaluate(RESOURCE_COUNT_SCRIPT)?.as_u64().unwrap_or(0);
            if idle.observe(count) {
                debug!("network idle after {} resources", count);
                return Ok(());
            }
            if Instant::now() >= deadline {
                warn!("Network still busy after {}ms; capturing anyway", self.config.timeout_ms);
                return Ok(());
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Evaluate in the page's global context, awaiting returned promises
    pub fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .tab
            .evaluate(script, true)
            .map_err(|e| Error::ScriptError(format!("Evaluation failed: {}", e)))?;
        Ok(result.value.unwrap_or(serde_json::Value::Null))
    }

    pub fn set_viewport(&self, viewport: ViewportSpec) -> Result<()> {
        let params: Emulation::SetDeviceMetricsOverride = serde_json::from_value(json!({
            "width": viewport.width,
            "height": viewport.height,
            "deviceScaleFactor": viewport.device_scale_factor,
            "mobile": false,
        }))
        .map_err(|e| Error::RenderError(format!("Bad viewport parameters: {}", e)))?;

        self.tab
            .call_method(params)
            .map_err(|e| Error::RenderError(format!("Failed to set viewport: {}", e)))?;
        debug!(
            "viewport set to {}x{}@{}",
            viewport.width, viewport.height, viewport.device_scale_factor
        );
        Ok(())
    }

    fn set_transparent_background(&self) -> Result<()> {
        let params: Emulation::SetDefaultBackgroundColorOverride = serde_json::from_value(json!({
            "color": { "r": 0, "g": 0, "b": 0, "a": 0.0 }
        }))
        .map_err(|e| Error::RenderError(format!("Bad background parameters: {}", e)))?;

        self.tab
            .call_method(params)
            .map_err(|e| Error::RenderError(format!("Failed to clear background: {}", e)))?;
        Ok(())
    }

    pub fn scroll_to(&self, offset: u32) -> Result<()> {
        self.evaluate(&format!("window.scrollTo(0, {}); window.scrollY", offset))?;
        Ok(())
    }

    /// Capture the current viewport as an image
    pub fn screenshot(&self, format: ImageFormat, quality: u8) -> Result<Vec<u8>> {
        let option = match format {
            ImageFormat::Png => Page::CaptureScreenshotFormatOption::Png,
            ImageFormat::Jpeg => Page::CaptureScreenshotFormatOption::Jpeg,
            ImageFormat::Webp => Page::CaptureScreenshotFormatOption::Webp,
            ImageFormat::Pdf => return Err(Error::RenderError("PDF is printed, not captured".into())),
        };
        let quality = format.is_lossy().then_some(u32::from(quality));

        self.tab
            .capture_screenshot(option, quality, None, true)
            .map_err(|e| Error::RenderError(format!("Screenshot failed: {}", e)))
    }

    /// Print the document to a single PDF page sized like `viewport`
    pub fn print_pdf(&self, viewport: ViewportSpec) -> Result<Vec<u8>> {
        let options = PrintToPdfOptions {
            landscape: Some(false),
            print_background: Some(!self.config.transparent_background),
            paper_width: Some(f64::from(viewport.width) / CSS_PX_PER_INCH),
            paper_height: Some(f64::from(viewport.height) / CSS_PX_PER_INCH),
            margin_top: Some(0.0),
            margin_bottom: Some(0.0),
            margin_left: Some(0.0),
            margin_right: Some(0.0),
            prefer_css_page_size: Some(false),
            ..Default::default()
        };

        self.tab
            .print_to_pdf(Some(options))
            .map_err(|e| Error::RenderError(format!("PDF printing failed: {}", e)))
    }

    /// Close the browser and remove the scratch document
    pub fn close(self) -> Result<()> {
        drop(self.tab);
        drop(self.browser);
        if let Some(file) = self.document {
            if let Err(e) = file.close() {
                warn!("Failed to remove scratch document: {}", e);
            }
        }
        Ok(())
    }
}

/// Counts consecutive polls that saw the same number of resources
#[derive(Debug)]
struct IdleTracker {
    last: Option<u64>,
    quiet: u32,
    needed: u32,
}

impl IdleTracker {
    fn new(needed: u32) -> Self {
        Self { last: None, quiet: 0, needed }
    }

    /// Record a poll; true once `needed` polls in a row saw no new resource
    fn observe(&mut self, count: u64) -> bool {
        if self.last == Some(count) {
            self.quiet += 1;
        } else {
            self.last = Some(count);
            self.quiet = 0;
        }
        self.quiet >= self.needed
    }
}
