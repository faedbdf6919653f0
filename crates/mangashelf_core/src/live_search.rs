//! crates/mangashelf_core/src/live_search.rs
//!
//! Type-ahead search with last-query-wins semantics: starting a search cancels
//! the one still in flight, so a slow earlier response can never overwrite a
//! faster later one.

use std::future::Future;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Default)]
pub struct LiveSearch {
    in_flight: Mutex<Option<CancellationToken>>,
}

impl LiveSearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `search` unless a newer search starts first.
    /// Returns `None` when this search was superseded or cancelled.
    pub async fn run<F, T>(&self, search: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        let token = CancellationToken::new();
        if let Some(previous) = self.swap(Some(token.clone())) {
            previous.cancel();
        }

        tokio::select! {
            _ = token.cancelled() => {
                debug!("live search superseded");
                None
            }
            result = search => Some(result),
        }
    }

    /// Aborts the in-flight search, if any.
    pub fn cancel(&self) {
        if let Some(previous) = self.swap(None) {
            previous.cancel();
        }
    }

    fn swap(&self, next: Option<CancellationToken>) -> Option<CancellationToken> {
        let mut guard = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *guard, next)
    }
}
