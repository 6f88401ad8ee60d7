//! Backend adapters and the uniform capture contract
//!
//! A [`Backend`] is probed, then opened once per document into a [`Session`]
//! that owns whatever the renderer needs (a browser tab, a scratch file).
//! Sessions backed by a live page additionally expose [`LivePage`] for
//! measuring, scrolling and resizing. Page state (viewport, scroll offset) is
//! global to the session, so every call on a session is made in sequence by
//! its single owner.

pub mod chrome;
pub mod wkhtml;

pub use chrome::ChromeBackend;
pub use wkhtml::WkhtmlBackend;

use crate::probe::BackendKind;
use crate::request::{ImageFormat, RenderRequest, ViewportSpec};
use crate::sections::HeadingScan;
use crate::viewport::ContentSize;
use crate::{Error, Result};
use futures::future::BoxFuture;
use std::future::Future;
use std::time::Duration;

/// Per-capture encoder settings
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    pub viewport: ViewportSpec,
    /// 0-100, honoured by lossy encoders only
    pub quality: u8,
    pub transparent: bool,
    /// Let the renderer grow past `viewport.height` to the document height
    pub full_page: bool,
}

impl CaptureSettings {
    pub fn for_request(request: &RenderRequest, viewport: ViewportSpec, full_page: bool) -> Self {
        Self {
            viewport,
            quality: request.quality,
            transparent: request.transparent_background,
            full_page,
        }
    }
}

/// A pluggable renderer
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Short name used in logs and errors
    fn name(&self) -> &'static str;

    /// Check that the renderer is installed and usable
    fn probe(&self) -> BoxFuture<'_, Result<()>>;

    /// Load `html` and return a session ready for capture
    fn open<'a>(
        &'a self,
        html: &'a str,
        request: &'a RenderRequest,
    ) -> BoxFuture<'a, Result<Box<dyn Session>>>;
}

/// One loaded document inside a backend
pub trait Session: Send {
    fn supports(&self, format: ImageFormat) -> bool;

    /// Format to produce instead of an unsupported primary format
    fn substitute(&self, _format: ImageFormat) -> Option<ImageFormat> {
        None
    }

    /// Live page automation, when the backend has it
    fn live_page(&mut self) -> Option<&mut dyn LivePage> {
        None
    }

    /// Render the document in `format` and return the encoded bytes
    fn capture<'a>(
        &'a mut self,
        format: ImageFormat,
        settings: &'a CaptureSettings,
    ) -> BoxFuture<'a, Result<Vec<u8>>>;

    /// Release the session; called on every exit path
    fn close(self: Box<Self>) -> BoxFuture<'static, Result<()>>;
}

/// Script-driven access to a loaded page
pub trait LivePage: Session {
    /// Largest scroll/offset/client extent of the document and body
    fn measure_content(&mut self) -> BoxFuture<'_, Result<ContentSize>>;

    /// Elements matching `selector`, in document order, with their offsets
    fn heading_marks<'a>(&'a mut self, selector: &'a str) -> BoxFuture<'a, Result<HeadingScan>>;

    fn set_viewport(&mut self, viewport: ViewportSpec) -> BoxFuture<'_, Result<()>>;

    fn scroll_to(&mut self, offset: u32) -> BoxFuture<'_, Result<()>>;
}

/// Registry in priority order: headless Chrome, then wkhtmltox
pub fn default_backends() -> Vec<Box<dyn Backend>> {
    vec![
        Box::new(ChromeBackend::default()),
        Box::new(WkhtmlBackend::default()),
    ]
}

/// Await `fut`, failing with [`Error::Timeout`] after `timeout_ms`
pub async fn bounded<T, F>(timeout_ms: u64, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(Duration::from_millis(timeout_ms), fut).await {
        Ok(res) => res,
        Err(_) => Err(Error::Timeout(timeout_ms)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounded_maps_elapsed_to_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, Error>(1)
        };
        match bounded(10, slow).await {
            Err(Error::Timeout(10)) => {}
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(bounded(1000, async { Ok::<_, Error>(7) }).await.unwrap(), 7);
    }

    #[test]
    fn registry_is_in_priority_order() {
        let kinds: Vec<_> = default_backends().iter().map(|b| b.kind()).collect();
        assert_eq!(kinds, vec![BackendKind::Primary, BackendKind::Secondary]);
    }
}
