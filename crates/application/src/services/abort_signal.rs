//! Abort signal - Cancellation flag shared by an execution and its callers

use std::sync::Arc;

use tokio::sync::watch;

/// One-shot cancellation flag carrying the abort reason
///
/// The first reason wins; later triggers are ignored so `abort` stays
/// idempotent. Waiters observe the flag at every suspension point.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    tx: Arc<watch::Sender<Option<String>>>,
}

impl Default for AbortSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Raise the flag; returns `false` if it was already raised
    pub fn trigger(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        })
    }

    pub fn is_triggered(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// The abort reason, if raised
    pub fn reason(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    /// Resolve with the reason once the flag is raised
    pub async fn cancelled(&self) -> String {
        let mut rx = self.tx.subscribe();
        if let Ok(reason) = rx.wait_for(Option::is_some).await {
            return reason.clone().unwrap_or_default();
        }
        std::future::pending().await
    }
}
