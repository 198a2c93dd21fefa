// Downloader module - extraction client, fetch pool, races and guard

pub mod coordinator;
pub mod errors;
pub mod guard;
pub mod models;
pub mod traits;
pub mod utils;
pub mod ytdlp;

pub use coordinator::{FetchCoordinator, FetchSpec, FetchTask, RaceWin, Secondary, TaskState};
pub use errors::FetchError;
pub use guard::{Budgets, Guard, MAX_UPLOAD_BYTES};
pub use models::{
    Artifact, AttemptDir, ExtractOptions, ExtractedMedia, Fetched, MediaKind, SearchEntry,
    Strategy,
};
pub use traits::Extractor;
pub use ytdlp::{YtDlpConfig, YtDlpExtractor};
