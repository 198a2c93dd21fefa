// Error taxonomy for fetch operations

use std::time::Duration;

use thiserror::Error;

use super::models::Strategy;

/// Upload ceiling shown to users in megabytes
const LIMIT_MB: u64 = 49;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Nothing matched the query, or the source has no usable rendition
    #[error("not found: {0}")]
    NotFound(String),

    /// Transient extraction failure (network, tool crash, missing output)
    #[error("network error: {0}")]
    NetworkError(String),

    /// A single strategy or lookup exceeded its budget
    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Artifact exceeds the delivery ceiling
    #[error("artifact is {size} bytes, limit is {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    /// Registry miss: token pruned, stale or never issued
    #[error("token expired or unknown")]
    TokenExpired,

    /// Every strategy of a race reached a failed terminal state
    #[error("all {} strategies failed", .0.len())]
    AllStrategiesFailed(Vec<(Strategy, FetchError)>),

    /// Race deadline elapsed before any strategy succeeded
    #[error("race deadline of {}s elapsed", .0.as_secs())]
    DeadlineExceeded(Duration),
}

impl FetchError {
    /// Classify yt-dlp stderr output.
    ///
    /// Only the last `ERROR:` line matters most of the time, but yt-dlp sometimes
    /// prints the useful part on a preceding line, so the whole text is scanned.
    pub fn from_stderr(stderr: &str, budget: Duration) -> Self {
        let lower = stderr.to_lowercase();

        if lower.contains("timed out") || lower.contains("timeout") {
            return Self::Timeout(budget);
        }

        if lower.contains("video unavailable")
            || lower.contains("unsupported url")
            || lower.contains("no video formats found")
            || lower.contains("requested format is not available")
            || lower.contains("private video")
            || lower.contains("this video is no longer available")
            || lower.contains("http error 404")
            || lower.contains("there is no video in this post")
        {
            return Self::NotFound(summarize(stderr));
        }

        Self::NetworkError(summarize(stderr))
    }

    /// Text shown to the user when a request ends with this error
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound(_) => {
                "😔 Sorry, nothing was found for that. Try another name or link.".to_string()
            }
            Self::NetworkError(_) => {
                "🚫 Download failed because of a network problem. Please try again in a moment."
                    .to_string()
            }
            Self::Timeout(after) => format!(
                "⌛ The download took longer than {}s and was stopped. Try a shorter track.",
                after.as_secs()
            ),
            Self::TooLarge { .. } => format!(
                "🚫 The file is too large (>{}MB). Please pick a shorter track or another result.",
                LIMIT_MB
            ),
            Self::TokenExpired => {
                "⏳ This button has expired. Please send the link again.".to_string()
            }
            Self::AllStrategiesFailed(_) => {
                "🚫 Could not download anything from this post. Check that it is public and try again."
                    .to_string()
            }
            Self::DeadlineExceeded(_) => {
                "⌛ This post is taking too long to download. Please try again later.".to_string()
            }
        }
    }
}

/// First `ERROR:` line, or the last non-empty line, capped for logs
fn summarize(stderr: &str) -> String {
    let line = stderr
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| stderr.lines().map(str::trim).rev().find(|l| !l.is_empty()))
        .unwrap_or("unknown error");
    line.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUDGET: Duration = Duration::from_secs(30);

    #[test]
    fn test_unavailable_is_not_found() {
        let err = FetchError::from_stderr("ERROR: [youtube] abc123: Video unavailable", BUDGET);
        assert!(matches!(err, FetchError::NotFound(ref m) if m.contains("abc123")));
    }

    #[test]
    fn test_timeout_detection() {
        let err = FetchError::from_stderr("ERROR: Read timed out. (read timeout=30)", BUDGET);
        assert_eq!(err, FetchError::Timeout(BUDGET));
    }

    #[test]
    fn test_unknown_is_network() {
        let err = FetchError::from_stderr("WARNING: x\nERROR: HTTP Error 403: Forbidden\n", BUDGET);
        assert_eq!(
            err,
            FetchError::NetworkError("ERROR: HTTP Error 403: Forbidden".to_string())
        );
    }

    #[test]
    fn test_summarize_falls_back_to_last_line() {
        assert_eq!(summarize("first\nsecond\n\n"), "second");
        assert_eq!(summarize(""), "unknown error");
    }

    #[test]
    fn test_user_messages_are_distinct() {
        let all = [
            FetchError::NotFound(String::new()),
            FetchError::NetworkError(String::new()),
            FetchError::Timeout(BUDGET),
            FetchError::TooLarge { size: 2, limit: 1 },
            FetchError::TokenExpired,
            FetchError::AllStrategiesFailed(Vec::new()),
            FetchError::DeadlineExceeded(BUDGET),
        ];
        let messages: std::collections::HashSet<String> =
            all.iter().map(FetchError::user_message).collect();
        assert_eq!(messages.len(), all.len());
    }
}
