//! Backend capability probing
//!
//! A missing backend is an expected outcome, not a failure: probe errors and
//! even panics are folded into [`Capability::Unavailable`]. Results are cached
//! per registry slot for the lifetime of the [`Prober`], so each registered
//! backend is probed at most once, even when several share a kind.

use crate::backend::Backend;
use futures::FutureExt;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Mutex, PoisonError};

/// Rendering path, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum BackendKind {
    /// Headless browser with live page automation
    Primary,
    /// Headless document renderer
    Secondary,
    /// No renderer; static HTML preview
    None,
}

impl BackendKind {
    pub fn label(self) -> &'static str {
        match self {
            BackendKind::Primary => "primary",
            BackendKind::Secondary => "secondary",
            BackendKind::None => "preview",
        }
    }
}

/// Probe state of one backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    Available,
    Unavailable(String),
    /// Not probed yet
    Untested,
}

impl Capability {
    pub fn is_available(&self) -> bool {
        matches!(self, Capability::Available)
    }
}

/// Probes backends lazily and remembers the answers
///
/// Answers are keyed by the backend's position in the registry.
#[derive(Debug, Default)]
pub struct Prober {
    states: Mutex<HashMap<usize, Capability>>,
}

impl Prober {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last known state of the backend in `slot`, without probing
    pub fn state(&self, slot: usize) -> Capability {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&slot)
            .cloned()
            .unwrap_or(Capability::Untested)
    }

    /// Resolve the capability of `backend` registered in `slot`, probing only
    /// on first use
    pub async fn probe(&self, slot: usize, backend: &dyn Backend) -> Capability {
        let kind = backend.kind();
        let cached = self.state(slot);
        if cached != Capability::Untested {
            debug!("{} backend '{}' capability cached: {:?}", kind.label(), backend.name(), cached);
            return cached;
        }

        let capability = safe_probe(backend).await;
        match &capability {
            Capability::Available => info!("{} backend '{}' is available", kind.label(), backend.name()),
            Capability::Unavailable(reason) => warn!(
                "{} backend '{}' is unavailable: {}",
                kind.label(),
                backend.name(),
                reason
            ),
            Capability::Untested => {}
        }

        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(slot, capability.clone());
        capability
    }
}

/// Run a backend probe, turning errors and panics into a tagged result
async fn safe_probe(backend: &dyn Backend) -> Capability {
    match AssertUnwindSafe(backend.probe()).catch_unwind().await {
        Ok(Ok(())) => Capability::Available,
        Ok(Err(e)) => Capability::Unavailable(e.to_string()),
        Err(_) => Capability::Unavailable(format!("probe of '{}' panicked", backend.name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Session;
    use crate::{Error, RenderRequest, Result};
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Outcome {
        Ok,
        Missing,
        Panic,
    }

    struct FakeBackend {
        kind: BackendKind,
        outcome: Outcome,
        probes: AtomicUsize,
    }

    impl FakeBackend {
        fn new(kind: BackendKind, outcome: Outcome) -> Self {
            Self { kind, outcome, probes: AtomicUsize::new(0) }
        }
    }

    impl Backend for FakeBackend {
        fn kind(&self) -> BackendKind {
            self.kind
        }

        fn name(&self) -> &'static str {
            "fake"
        }

        fn probe(&self) -> BoxFuture<'_, Result<()>> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            async move {
                match self.outcome {
                    Outcome::Ok => Ok(()),
                    Outcome::Missing => Err(Error::BackendUnavailable {
                        backend: "fake",
                        reason: "not installed".into(),
                    }),
                    Outcome::Panic => panic!("loader blew up"),
                }
            }
            .boxed()
        }

        fn open<'a>(&'a self, _html: &'a str, _request: &'a RenderRequest) -> BoxFuture<'a, Result<Box<dyn Session>>> {
            async { Err(Error::Other("not used".into())) }.boxed()
        }
    }

    #[tokio::test]
    async fn probes_once_and_caches() {
        let prober = Prober::new();
        let backend = FakeBackend::new(BackendKind::Primary, Outcome::Ok);
        assert_eq!(prober.state(0), Capability::Untested);
        assert!(prober.probe(0, &backend).await.is_available());
        assert!(prober.probe(0, &backend).await.is_available());
        assert_eq!(backend.probes.load(Ordering::SeqCst), 1);
        assert_eq!(prober.state(0), Capability::Available);
    }

    #[tokio::test]
    async fn same_kind_backends_are_probed_separately() {
        let prober = Prober::new();
        let missing = FakeBackend::new(BackendKind::Primary, Outcome::Missing);
        let installed = FakeBackend::new(BackendKind::Primary, Outcome::Ok);
        assert!(!prober.probe(0, &missing).await.is_available());
        assert!(prober.probe(1, &installed).await.is_available());
        assert_eq!(installed.probes.load(Ordering::SeqCst), 1);
        assert!(matches!(prober.state(0), Capability::Unavailable(_)));
        assert_eq!(prober.state(1), Capability::Available);
    }

    #[tokio::test]
    async fn absence_is_a_state_not_an_error() {
        let prober = Prober::new();
        let backend = FakeBackend::new(BackendKind::Secondary, Outcome::Missing);
        match prober.probe(0, &backend).await {
            Capability::Unavailable(reason) => assert!(reason.contains("not installed")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn panicking_probe_is_contained() {
        let prober = Prober::new();
        let backend = FakeBackend::new(BackendKind::Primary, Outcome::Panic);
        let cap = prober.probe(0, &backend).await;
        assert!(matches!(cap, Capability::Unavailable(ref r) if r.contains("panicked")));
    }
}
