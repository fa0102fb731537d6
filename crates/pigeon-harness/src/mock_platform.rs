//! Mock Platform for Testing
//!
//! Records every request the session submits and never answers on its own. Tests
//! read the requests back and play the platform's part by hand through the
//! session's [`RawEventSink`](pigeon_core::RawEventSink).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use pigeon_core::{PlatformAdapter, PlatformError, PlatformRequest, RequestKind};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::time::{timeout, Duration};
use tracing::debug;

/// Counters kept by [`MockPlatform`]
#[derive(Debug, Default)]
pub struct MockPlatformStats {
    pub requests_submitted: AtomicU64,
    pub requests_refused: AtomicU64,
}

/// Recording platform adapter
#[derive(Debug)]
pub struct MockPlatform {
    history: Mutex<Vec<PlatformRequest>>,
    request_sender: mpsc::UnboundedSender<PlatformRequest>,
    request_receiver: AsyncMutex<mpsc::UnboundedReceiver<PlatformRequest>>,
    /// When set, every submission fails with this error
    refusal: Mutex<Option<PlatformError>>,
    stats: MockPlatformStats,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPlatform {
    pub fn new() -> Self {
        let (request_sender, request_receiver) = mpsc::unbounded_channel();
        Self {
            history: Mutex::new(Vec::new()),
            request_sender,
            request_receiver: AsyncMutex::new(request_receiver),
            refusal: Mutex::new(None),
            stats: MockPlatformStats::default(),
        }
    }

    /// Fail all further submissions with `error`, or accept them again with `None`
    pub fn refuse_submissions(&self, error: Option<PlatformError>) {
        *self.refusal.lock().unwrap_or_else(PoisonError::into_inner) = error;
    }

    /// Every request submitted so far, in order
    pub fn submitted(&self) -> Vec<PlatformRequest> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn stats(&self) -> &MockPlatformStats {
        &self.stats
    }

    /// Next submitted request not yet taken, waiting at most `limit`
    pub async fn expect_request_timeout(&self, limit: Duration) -> Option<PlatformRequest> {
        let mut receiver = self.request_receiver.lock().await;
        timeout(limit, receiver.recv()).await.ok().flatten()
    }

    /// Skip ahead to the next request of `kind`
    pub async fn expect_kind(&self, kind: RequestKind, limit: Duration) -> Option<PlatformRequest> {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let request = self.expect_request_timeout(remaining).await?;
            if request.kind() == kind {
                return Some(request);
            }
            debug!("Skipping {} while waiting for {}", request.id(), kind);
        }
    }

    /// Requests submitted but not yet taken
    pub async fn drain(&self) -> Vec<PlatformRequest> {
        let mut receiver = self.request_receiver.lock().await;
        let mut drained = Vec::new();
        while let Ok(request) = receiver.try_recv() {
            drained.push(request);
        }
        drained
    }
}

#[async_trait::async_trait]
impl PlatformAdapter for MockPlatform {
    async fn submit(&self, request: PlatformRequest) -> Result<(), PlatformError> {
        let refusal = self
            .refusal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(error) = refusal {
            self.stats.requests_refused.fetch_add(1, Ordering::Relaxed);
            return Err(error);
        }

        self.stats.requests_submitted.fetch_add(1, Ordering::Relaxed);
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        let _ = self.request_sender.send(request);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
