pub mod config;
pub mod delivery;
pub mod downloader;
pub mod registry;
pub mod router;
pub mod telegram;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, Settings};
pub use router::{Handled, Outcome, Router};
