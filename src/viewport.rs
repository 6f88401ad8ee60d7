//! Viewport resolution: caller-fixed or measured from the live document

use crate::backend::LivePage;
use crate::request::{RenderRequest, ViewportSpec, DEFAULT_HEIGHT, DEFAULT_WIDTH};
use crate::Result;
use log::debug;
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Measured document extent in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentSize {
    pub width: u32,
    pub height: u32,
}

impl<'de> Deserialize<'de> for ContentSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            width: f64,
            height: f64,
        }
        let raw = Raw::deserialize(deserializer)?;
        Ok(ContentSize {
            width: css_px(raw.width),
            height: css_px(raw.height),
        })
    }
}

/// Round a layout value up to whole, positive pixels
pub(crate) fn css_px(value: f64) -> u32 {
    if value.is_finite() && value > 0.0 {
        value.ceil().min(u32::MAX as f64) as u32
    } else {
        0
    }
}

/// Covers both standards-mode and quirks-mode layouts
pub(crate) const MEASURE_SCRIPT: &str = r#"(function () {
  var d = document.documentElement, b = document.body || d;
  return {
    width: Math.max(b.scrollWidth, d.scrollWidth, b.offsetWidth, d.offsetWidth, b.clientWidth, d.clientWidth),
    height: Math.max(b.scrollHeight, d.scrollHeight, b.offsetHeight, d.offsetHeight, b.clientHeight, d.clientHeight)
  };
})()"#;

/// Fixed pauses that let the page reflow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settle {
    /// After a viewport change on a whole-document capture
    pub reflow: Duration,
    /// After scrolling to a section
    pub scroll: Duration,
}

impl Default for Settle {
    fn default() -> Self {
        Self {
            reflow: Duration::from_millis(2000),
            scroll: Duration::from_millis(500),
        }
    }
}

impl Settle {
    /// No pauses at all
    pub fn none() -> Self {
        Self {
            reflow: Duration::ZERO,
            scroll: Duration::ZERO,
        }
    }
}

pub(crate) async fn pause(d: Duration) {
    if !d.is_zero() {
        tokio::time::sleep(d).await;
    }
}

/// Caller dimensions, or 1200x800, at the requested scale
pub fn resolve_fixed(request: &RenderRequest) -> ViewportSpec {
    ViewportSpec {
        width: request.fixed_width.unwrap_or(DEFAULT_WIDTH),
        height: request.fixed_height.unwrap_or(DEFAULT_HEIGHT),
        device_scale_factor: request.scale,
    }
}

/// Size the viewport to the document's full extent
///
/// Waits `wait_millis` first so asynchronous diagram rendering can finish,
/// then measures, resizes and waits `settle.reflow` for the resize to reflow.
pub async fn resolve_auto_size(
    page: &mut dyn LivePage,
    request: &RenderRequest,
    settle: &Settle,
) -> Result<ViewportSpec> {
    pause(Duration::from_millis(request.wait_millis)).await;
    fit_to_content(page, request, settle).await
}

/// Measure, resize and wait `settle.reflow`, without the script wait
///
/// For pages whose scripts have already had `wait_millis` to finish.
pub async fn fit_to_content(
    page: &mut dyn LivePage,
    request: &RenderRequest,
    settle: &Settle,
) -> Result<ViewportSpec> {
    let size = page.measure_content().await?;
    let viewport = ViewportSpec {
        width: size.width.max(1),
        height: size.height.max(1),
        device_scale_factor: request.scale,
    };
    debug!(
        "content measured at {}x{} (scale {})",
        viewport.width, viewport.height, viewport.device_scale_factor
    );

    page.set_viewport(viewport).await?;
    pause(settle.reflow).await;
    Ok(viewport)
}

/// Apply the fixed viewport to a live page, with the same settle delays
pub async fn apply_fixed(
    page: &mut dyn LivePage,
    request: &RenderRequest,
    settle: &Settle,
) -> Result<ViewportSpec> {
    let viewport = resolve_fixed(request);
    page.set_viewport(viewport).await?;
    pause(Duration::from_millis(request.wait_millis)).await;
    pause(settle.reflow).await;
    Ok(viewport)
}
