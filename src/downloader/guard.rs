// Post-fetch size check and per-kind time budgets

use std::time::Duration;

use tracing::{debug, warn};

use super::errors::FetchError;
use super::models::Fetched;

/// Practical upload limit of the delivery transport (49 MiB)
pub const MAX_UPLOAD_BYTES: u64 = 49 * 1024 * 1024;

/// Time budgets, fixed per kind of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budgets {
    /// Fast "top single result" lookup
    pub top_result: Duration,
    /// Multi-result lookup presented as options
    pub search: Duration,
    /// One full download strategy
    pub download: Duration,
    /// Whole race, secondary results included
    pub race_deadline: Duration,
}

impl Default for Budgets {
    fn default() -> Self {
        Self {
            top_result: Duration::from_secs(8),
            search: Duration::from_secs(20),
            download: Duration::from_secs(120),
            race_deadline: Duration::from_secs(180),
        }
    }
}

/// Stateless validation applied to every terminal fetch outcome
#[derive(Debug, Clone, Copy)]
pub struct Guard {
    max_bytes: u64,
}

impl Guard {
    pub fn new() -> Self {
        Self {
            max_bytes: MAX_UPLOAD_BYTES,
        }
    }

    /// Pass failures through untouched; reject and delete oversized artifacts
    pub async fn validate(
        &self,
        outcome: Result<Fetched, FetchError>,
    ) -> Result<Fetched, FetchError> {
        let fetched = outcome?;

        let size = match tokio::fs::metadata(fetched.artifact.path()).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!(file = %fetched.artifact.path().display(), error = %e, "artifact vanished before validation");
                return Err(FetchError::NetworkError(format!("artifact unreadable: {}", e)));
            }
        };

        if size > self.max_bytes {
            warn!(
                id = %fetched.id,
                strategy = %fetched.strategy,
                size,
                limit = self.max_bytes,
                "artifact rejected as too large"
            );
            // dropping the artifact removes it from disk
            drop(fetched);
            return Err(FetchError::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }

        debug!(id = %fetched.id, size, "artifact accepted");
        Ok(fetched)
    }
}

impl Default for Guard {
    fn default() -> Self {
        Self::new()
    }
}
