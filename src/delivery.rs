// Messaging collaborator contract
//
// The router never talks to the bot SDK directly. It reports progress, sends
// finished media and offers plain option lists through this trait.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::downloader::MediaKind;

/// Longest title fragment shown on an option
pub const LABEL_TITLE_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The transport refused the message or file
    #[error("delivery rejected: {0}")]
    Rejected(String),

    #[error("delivery transport failed: {0}")]
    Transport(String),
}

/// Outcome of a decorative action nobody waits on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "best-effort results are meant to be inspected or discarded explicitly"]
pub enum BestEffort {
    Done,
    Skipped,
}

impl BestEffort {
    /// Collapse any failure into `Skipped`
    pub fn from_result<T, E: std::fmt::Display>(result: Result<T, E>, what: &str) -> Self {
        match result {
            Ok(_) => Self::Done,
            Err(e) => {
                tracing::debug!(action = what, error = %e, "best-effort action skipped");
                Self::Skipped
            }
        }
    }
}

/// Sticker moods used around the main flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mood {
    Welcome,
    NotFound,
    Error,
}

/// One selectable affordance: visible label plus opaque callback data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuOption {
    pub label: String,
    pub data: String,
}

impl MenuOption {
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }

    /// `🎵 ` followed by the first 50 characters of the title
    pub fn track(title: &str, data: impl Into<String>) -> Self {
        let short: String = title.chars().take(LABEL_TITLE_CHARS).collect();
        Self::new(format!("🎵 {}", short), data)
    }
}

#[async_trait]
pub trait Delivery: Send + Sync {
    /// Show or replace the transient status line
    async fn status(&self, text: &str) -> BestEffort;

    /// Remove the status line
    async fn clear_status(&self) -> BestEffort;

    async fn notify(&self, text: &str) -> Result<(), DeliveryError>;

    /// Upload a finished file. The caller deletes it afterwards.
    async fn send_media(
        &self,
        path: &Path,
        kind: MediaKind,
        title: &str,
    ) -> Result<(), DeliveryError>;

    async fn present_options(
        &self,
        prompt: &str,
        options: &[MenuOption],
    ) -> Result<(), DeliveryError>;

    async fn sticker(&self, mood: Mood) -> BestEffort;
}
