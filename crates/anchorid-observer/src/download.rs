//! Bounded-concurrency CAS fetch pool (spec.md §4.3). Every file download in
//! the Observer's ingestion pipeline goes through one shared
//! [`DownloadManager`], whose semaphore is the only concurrency limiter — a
//! transaction's own files are joined with `futures::future::join_all`, not
//! a second pool.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use anchorid_core::external::{CasClient, CasError};
use anchorid_core::timeout::{timeout, Timed};

/// Default per-download timeout (spec.md §4.3).
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// The five-way outcome spec.md §4.3 names for a single file fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Success(Vec<u8>),
    NotFound,
    MaxSizeExceeded,
    /// Content was fetched but doesn't hash to the URI that named it.
    InvalidHash,
    CasNotReachable,
}

pub struct DownloadManager {
    cas: Arc<dyn CasClient>,
    semaphore: Arc<Semaphore>,
    timeout: Duration,
}

impl DownloadManager {
    pub fn new(cas: Arc<dyn CasClient>, max_concurrent_downloads: usize) -> Arc<Self> {
        Self::with_timeout(cas, max_concurrent_downloads, DEFAULT_DOWNLOAD_TIMEOUT)
    }

    pub fn with_timeout(
        cas: Arc<dyn CasClient>,
        max_concurrent_downloads: usize,
        timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            cas,
            semaphore: Arc::new(Semaphore::new(max_concurrent_downloads.max(1))),
            timeout,
        })
    }

    /// Fetch `uri`, rejecting anything past `max_bytes`, within the shared
    /// concurrency ceiling. No retry happens here — a caller that gets
    /// `CasNotReachable` is responsible for rescheduling.
    pub async fn download(&self, uri: &str, max_bytes: usize) -> DownloadOutcome {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .expect("semaphore is never closed");

        match timeout(self.timeout, self.cas.read(uri, max_bytes)).await {
            Timed::Value(bytes) => {
                if anchorid_core::cas_uri_for(&bytes) != uri {
                    DownloadOutcome::InvalidHash
                } else {
                    DownloadOutcome::Success(bytes)
                }
            }
            Timed::Err(CasError::NotFound(_)) => DownloadOutcome::NotFound,
            Timed::Err(CasError::TooLarge { .. }) => DownloadOutcome::MaxSizeExceeded,
            Timed::Err(CasError::Transport(_)) => DownloadOutcome::CasNotReachable,
            Timed::TimedOut => DownloadOutcome::CasNotReachable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchorid_core::external::InMemoryCas;

    #[tokio::test]
    async fn downloads_previously_written_content() {
        let cas = Arc::new(InMemoryCas::new());
        let uri = cas.write(b"hello").await.unwrap();
        let manager = DownloadManager::new(cas, 4);
        match manager.download(&uri, 100).await {
            DownloadOutcome::Success(bytes) => assert_eq!(bytes, b"hello"),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reports_not_found_for_an_unknown_uri() {
        let cas = Arc::new(InMemoryCas::new());
        let manager = DownloadManager::new(cas, 4);
        assert_eq!(
            manager.download("cas://nope", 100).await,
            DownloadOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn reports_max_size_exceeded() {
        let cas = Arc::new(InMemoryCas::new());
        let uri = cas.write(&vec![0u8; 1000]).await.unwrap();
        let manager = DownloadManager::new(cas, 4);
        assert_eq!(
            manager.download(&uri, 10).await,
            DownloadOutcome::MaxSizeExceeded
        );
    }

    #[tokio::test]
    async fn concurrency_is_bounded_by_the_semaphore() {
        let cas = Arc::new(InMemoryCas::new());
        let uri = cas.write(b"hello").await.unwrap();
        let manager = DownloadManager::new(cas, 2);
        let results = futures::future::join_all(
            (0..8).map(|_| manager.download(&uri, 100)),
        )
        .await;
        assert!(results
            .iter()
            .all(|r| matches!(r, DownloadOutcome::Success(_))));
    }
}
