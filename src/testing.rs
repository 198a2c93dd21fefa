// Scripted collaborators for unit tests

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::delivery::{BestEffort, Delivery, DeliveryError, MenuOption, Mood};
use crate::registry::Clock;
use crate::downloader::{
    ExtractOptions, ExtractedMedia, Extractor, FetchError, MediaKind, SearchEntry, Strategy,
};

/// Manually advanced clock
pub struct FakeClock {
    start: Instant,
    offset: Mutex<Duration>,
}

impl FakeClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        })
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap() += by;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.start + *self.offset.lock().unwrap()
    }
}

/// Let spawned and freshly aborted tasks run to completion
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

#[derive(Debug, Clone)]
pub enum Script {
    Succeed { after: Duration, id: String, bytes: u64 },
    Fail { after: Duration, error: FetchError },
    Hang,
}

impl Script {
    pub fn succeed(after: Duration, id: &str, bytes: u64) -> Self {
        Self::Succeed {
            after,
            id: id.to_string(),
            bytes,
        }
    }

    pub fn fail(after: Duration, error: FetchError) -> Self {
        Self::Fail { after, error }
    }
}

struct SearchScript {
    after: Duration,
    result: Result<Vec<SearchEntry>, FetchError>,
}

/// Extractor whose behaviour is scripted per strategy and per search limit
#[derive(Default)]
pub struct FakeExtractor {
    downloads: Mutex<HashMap<Strategy, Script>>,
    searches: Mutex<HashMap<usize, SearchScript>>,
    calls: Mutex<Vec<(Strategy, String)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, strategy: Strategy, script: Script) {
        self.downloads.lock().unwrap().insert(strategy, script);
    }

    pub fn on_search(
        &self,
        limit: usize,
        after: Duration,
        result: Result<Vec<SearchEntry>, FetchError>,
    ) {
        self.searches
            .lock()
            .unwrap()
            .insert(limit, SearchScript { after, result });
    }

    /// Every `extract` call as (strategy, source)
    pub fn calls(&self) -> Vec<(Strategy, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Extractor for FakeExtractor {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn extract(
        &self,
        source: &str,
        opts: &ExtractOptions,
    ) -> Result<ExtractedMedia, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((opts.strategy, source.to_string()));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let script = self
            .downloads
            .lock()
            .unwrap()
            .get(&opts.strategy)
            .cloned()
            .unwrap_or_else(|| Script::fail(Duration::ZERO, FetchError::NotFound(source.to_string())));

        match script {
            Script::Succeed { after, id, bytes } => {
                tokio::time::sleep(after).await;
                let ext = match opts.strategy {
                    Strategy::Video => "mp4",
                    Strategy::Audio | Strategy::Generic => "m4a",
                };
                let path = opts.output_dir.join(format!("{}.{}", id, ext));
                std::fs::File::create(&path)
                    .and_then(|f| f.set_len(bytes))
                    .map_err(|e| FetchError::NetworkError(e.to_string()))?;
                Ok(ExtractedMedia {
                    path,
                    title: format!("Title of {}", id),
                    id,
                })
            }
            Script::Fail { after, error } => {
                tokio::time::sleep(after).await;
                Err(error)
            }
            Script::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
        _timeout: Duration,
    ) -> Result<Vec<SearchEntry>, FetchError> {
        let scripted = self
            .searches
            .lock()
            .unwrap()
            .get(&limit)
            .map(|s| (s.after, s.result.clone()));

        match scripted {
            Some((after, result)) => {
                tokio::time::sleep(after).await;
                result
            }
            None => Err(FetchError::NotFound(query.to_string())),
        }
    }
}

/// Everything the router asked the messaging layer to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Status(String),
    Notify(String),
    Media {
        kind: MediaKind,
        title: String,
        path: PathBuf,
        existed: bool,
    },
    Options {
        prompt: String,
        options: Vec<MenuOption>,
    },
    Sticker(Mood),
    ClearStatus,
}

#[derive(Default)]
pub struct RecordingDelivery {
    events: Mutex<Vec<Event>>,
    fail_media: Mutex<Vec<MediaKind>>,
    fail_options: Mutex<bool>,
}

impl RecordingDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `send_media` of this kind fail
    pub fn fail_media(&self, kind: MediaKind) {
        self.fail_media.lock().unwrap().push(kind);
    }

    /// Make every `present_options` fail
    pub fn fail_options(&self) {
        *self.fail_options.lock().unwrap() = true;
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn media(&self) -> Vec<(MediaKind, PathBuf, bool)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Media {
                    kind, path, existed, ..
                } => Some((kind, path, existed)),
                _ => None,
            })
            .collect()
    }

    pub fn notices(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Notify(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn options(&self) -> Option<Vec<MenuOption>> {
        self.events().into_iter().rev().find_map(|e| match e {
            Event::Options { options, .. } => Some(options),
            _ => None,
        })
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl Delivery for RecordingDelivery {
    async fn status(&self, text: &str) -> BestEffort {
        self.push(Event::Status(text.to_string()));
        BestEffort::Done
    }

    async fn clear_status(&self) -> BestEffort {
        self.push(Event::ClearStatus);
        BestEffort::Done
    }

    async fn notify(&self, text: &str) -> Result<(), DeliveryError> {
        self.push(Event::Notify(text.to_string()));
        Ok(())
    }

    async fn send_media(
        &self,
        path: &Path,
        kind: MediaKind,
        title: &str,
    ) -> Result<(), DeliveryError> {
        self.push(Event::Media {
            kind,
            title: title.to_string(),
            path: path.to_path_buf(),
            existed: path.is_file(),
        });
        if self.fail_media.lock().unwrap().contains(&kind) {
            return Err(DeliveryError::Rejected("scripted failure".to_string()));
        }
        Ok(())
    }

    async fn present_options(
        &self,
        prompt: &str,
        options: &[MenuOption],
    ) -> Result<(), DeliveryError> {
        self.push(Event::Options {
            prompt: prompt.to_string(),
            options: options.to_vec(),
        });
        if *self.fail_options.lock().unwrap() {
            return Err(DeliveryError::Rejected("BUTTON_DATA_INVALID".to_string()));
        }
        Ok(())
    }

    async fn sticker(&self, mood: Mood) -> BestEffort {
        self.push(Event::Sticker(mood));
        BestEffort::Done
    }
}
