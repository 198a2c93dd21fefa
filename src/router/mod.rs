// Request router - turns one inbound message or button press into fetches
//
// Text:      classify -> dispatch -> (race | single fetch | lookup) -> guard -> deliver/fail
// Callbacks: dispatch -> single fetch -> guard -> deliver/fail, or expired token

pub mod callback;
pub mod classify;
pub mod flow;

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::delivery::{BestEffort, Delivery, MenuOption, Mood};
use crate::downloader::{
    Budgets, FetchCoordinator, FetchError, FetchSpec, Fetched, Guard, MediaKind, Strategy,
};
use crate::registry::TokenRegistry;

pub use callback::CallbackAction;
pub use classify::{classify, extract_video_id, Platform, Request, RequestKind};
pub use flow::{Phase, Trail};

pub const SEARCHING_TEXT: &str = "🔎 Searching...";
pub const DOWNLOADING_TEXT: &str = "⏳ Downloading...";
pub const CHOOSE_PROMPT: &str = "Choose one of these:";
pub const AUDIO_PROMPT: &str = "Want the audio track as well?";
pub const AUDIO_BUTTON: &str = "🎵 Download audio";
pub const SEND_FAILED_TEXT: &str = "🚫 The file was downloaded but could not be sent. Please try again.";
pub const OPTIONS_FAILED_TEXT: &str = "🚫 Found some tracks but could not show them. Please try again.";
pub const UNKNOWN_ACTION_TEXT: &str = "🤔 This button is no longer supported. Please send your request again.";

const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// How a request or action ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Delivered {
        kind: MediaKind,
        secondary: Option<MediaKind>,
    },
    Presented {
        options: usize,
    },
    Failed(FetchError),
    DeliveryFailed(String),
    Expired,
    Rejected,
}

#[derive(Debug, Clone)]
pub struct Handled {
    pub outcome: Outcome,
    pub trail: Trail,
}

#[derive(Clone)]
pub struct Router {
    coordinator: FetchCoordinator,
    registry: Arc<TokenRegistry>,
    guard: Guard,
    budgets: Budgets,
    search_limit: usize,
}

impl Router {
    pub fn new(
        coordinator: FetchCoordinator,
        registry: Arc<TokenRegistry>,
        guard: Guard,
        budgets: Budgets,
        search_limit: usize,
    ) -> Self {
        Self {
            coordinator,
            registry,
            guard,
            budgets,
            search_limit: search_limit.max(1),
        }
    }

    pub fn registry(&self) -> &TokenRegistry {
        &self.registry
    }

    /// Handle free text (search query or link)
    pub async fn handle_text(&self, text: &str, delivery: &dyn Delivery) -> Handled {
        let started = Instant::now();
        let mut trail = Trail::new();

        trail.enter(Phase::Classifying);
        let request = classify(text);
        info!(kind = ?request.kind, platform = ?request.platform, text = %request.raw_text, "request received");
        let _ = delivery.status(SEARCHING_TEXT).await;

        trail.enter(Phase::Dispatching);
        let outcome = match (request.kind, request.platform) {
            (_, Platform::SocialMedia) => self.social(&request, delivery, &mut trail).await,
            (RequestKind::DirectLink, Platform::VideoSite) => {
                let spec = match request.video_id() {
                    Some(id) => FetchSpec::new(id, Strategy::Audio, self.budgets.download),
                    None => {
                        debug!(url = %request.raw_text, "no video id in link, fetching as-is");
                        FetchSpec::new(&request.raw_text, Strategy::Generic, self.budgets.download)
                    }
                };
                self.single(spec, delivery, &mut trail).await
            }
            (RequestKind::SearchQuery, Platform::VideoSite) => {
                self.search(&request.raw_text, delivery, &mut trail).await
            }
        };

        Self::finish(outcome, trail, started)
    }

    /// Handle a button press carrying previously emitted callback data
    pub async fn handle_callback(&self, data: &str, delivery: &dyn Delivery) -> Handled {
        let started = Instant::now();
        let mut trail = Trail::new();
        trail.enter(Phase::Dispatching);

        let outcome = match CallbackAction::parse(data) {
            None => {
                warn!(data, "unrecognised callback data");
                trail.enter(Phase::Failing);
                self.tell(delivery, UNKNOWN_ACTION_TEXT).await;
                Outcome::Rejected
            }
            Some(CallbackAction::Select { video_id }) => {
                info!(video_id = %video_id, "option selected");
                let _ = delivery.status(DOWNLOADING_TEXT).await;
                let spec = FetchSpec::new(video_id, Strategy::Audio, self.budgets.download);
                self.single(spec, delivery, &mut trail).await
            }
            Some(CallbackAction::AudioToken { token }) => match self.registry.resolve(&token) {
                None => {
                    info!(token = %token, "token expired or unknown");
                    trail.enter(Phase::Expired);
                    self.tell(delivery, &FetchError::TokenExpired.user_message()).await;
                    Outcome::Expired
                }
                Some(url) => {
                    info!(token = %token, url = %url, "audio requested for post");
                    let _ = delivery.status(DOWNLOADING_TEXT).await;
                    let spec = FetchSpec::new(&url, Strategy::Audio, self.budgets.download)
                        .with_headers(browser_headers(&url));
                    self.single(spec, delivery, &mut trail).await
                }
            },
        };

        Self::finish(outcome, trail, started)
    }

    fn finish(outcome: Outcome, mut trail: Trail, started: Instant) -> Handled {
        trail.enter(Phase::Done);
        info!(
            outcome = ?outcome,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request finished"
        );
        Handled { outcome, trail }
    }

    /// Fast top result first, then a short list to choose from
    async fn search(&self, query: &str, delivery: &dyn Delivery, trail: &mut Trail) -> Outcome {
        match self
            .coordinator
            .lookup(query, 1, self.budgets.top_result)
            .await
        {
            Ok(entries) if !entries.is_empty() => {
                let top = &entries[0];
                info!(id = %top.id, title = %top.title, "top result picked");
                let spec = FetchSpec::new(&top.id, Strategy::Audio, self.budgets.download);
                return self.single(spec, delivery, trail).await;
            }
            Ok(_) => debug!(query, "top-result lookup came back empty"),
            Err(e) => debug!(query, error = %e, "top-result lookup failed, listing instead"),
        }

        match self
            .coordinator
            .lookup(query, self.search_limit, self.budgets.search)
            .await
        {
            Ok(entries) if !entries.is_empty() => {
                let options: Vec<MenuOption> = entries
                    .iter()
                    .map(|entry| {
                        let data = CallbackAction::Select {
                            video_id: entry.id.clone(),
                        }
                        .encode();
                        MenuOption::track(&entry.title, data)
                    })
                    .collect();
                let _ = delivery.clear_status().await;
                match delivery.present_options(CHOOSE_PROMPT, &options).await {
                    Ok(()) => {
                        trail.enter(Phase::Presenting);
                        Outcome::Presented {
                            options: options.len(),
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "could not present options");
                        trail.enter(Phase::Failing);
                        self.tell(delivery, OPTIONS_FAILED_TEXT).await;
                        Outcome::DeliveryFailed(e.to_string())
                    }
                }
            }
            Ok(_) => self.fail(FetchError::NotFound(query.to_string()), delivery, trail).await,
            Err(e) => self.fail(e, delivery, trail).await,
        }
    }

    /// One strategy, guard, then delivery or failure
    async fn single(&self, spec: FetchSpec, delivery: &dyn Delivery, trail: &mut Trail) -> Outcome {
        trail.enter(Phase::SingleFetching);
        let result = self.coordinator.fetch_one(spec).await;

        trail.enter(Phase::Validating);
        match self.guard.validate(result).await {
            Ok(fetched) => {
                trail.enter(Phase::Delivering);
                let kind = fetched.kind();
                match self.send(fetched, delivery).await {
                    Ok(()) => {
                        let _ = delivery.clear_status().await;
                        Outcome::Delivered {
                            kind,
                            secondary: None,
                        }
                    }
                    Err(reason) => {
                        self.tell(delivery, SEND_FAILED_TEXT).await;
                        Outcome::DeliveryFailed(reason)
                    }
                }
            }
            Err(e) => self.fail(e, delivery, trail).await,
        }
    }

    /// Video and audio raced for a social-media post
    async fn social(&self, request: &Request, delivery: &dyn Delivery, trail: &mut Trail) -> Outcome {
        let url = request.raw_text.as_str();
        let token = self.registry.register(url);
        debug!(token = %token, "post registered");

        trail.enter(Phase::Racing);
        let race = self
            .coordinator
            .race(
                url,
                &[Strategy::Video, Strategy::Audio],
                &browser_headers(url),
                self.budgets.download,
                self.budgets.race_deadline,
            )
            .await;

        trail.enter(Phase::Validating);
        let win = match race {
            Ok(win) => win,
            Err(e) => return self.fail(e, delivery, trail).await,
        };

        let mut secondary = win.secondary;
        let mut candidate = Some(win.primary);
        let mut delivered: Vec<MediaKind> = Vec::new();
        let mut rejected: Option<FetchError> = None;
        let mut audio_too_large = false;

        loop {
            let fetched: Fetched = match candidate.take() {
                Some(fetched) => fetched,
                None => match secondary.next().await {
                    Some(fetched) => fetched,
                    None => break,
                },
            };
            let kind = fetched.kind();
            if delivered.contains(&kind) {
                debug!(strategy = %fetched.strategy, "rendition already delivered, discarding");
                continue;
            }

            let fetched = match self.guard.validate(Ok(fetched)).await {
                Ok(fetched) => fetched,
                Err(e) => {
                    if kind == MediaKind::Audio && matches!(e, FetchError::TooLarge { .. }) {
                        audio_too_large = true;
                    }
                    rejected.get_or_insert(e);
                    continue;
                }
            };

            if delivered.is_empty() {
                trail.enter(Phase::Delivering);
                match self.send(fetched, delivery).await {
                    Ok(()) => delivered.push(kind),
                    Err(reason) => {
                        secondary.cancel();
                        self.tell(delivery, SEND_FAILED_TEXT).await;
                        return Outcome::DeliveryFailed(reason);
                    }
                }
            } else {
                // secondary delivery is best-effort
                match self.send(fetched, delivery).await {
                    Ok(()) => delivered.push(kind),
                    Err(reason) => debug!(?kind, %reason, "secondary delivery dropped"),
                }
            }
        }

        let offer_audio = !delivered.contains(&MediaKind::Audio) && !audio_too_large;

        let outcome = match delivered.first().copied() {
            Some(kind) => {
                let _ = delivery.clear_status().await;
                Outcome::Delivered {
                    kind,
                    secondary: delivered.get(1).copied(),
                }
            }
            None => {
                let error = rejected.unwrap_or_else(|| FetchError::NotFound(url.to_string()));
                self.fail(error, delivery, trail).await
            }
        };

        if offer_audio {
            let button = MenuOption::new(
                AUDIO_BUTTON,
                CallbackAction::AudioToken { token }.encode(),
            );
            if let Err(e) = delivery.present_options(AUDIO_PROMPT, &[button]).await {
                debug!(error = %e, "audio button not shown");
            }
        }

        outcome
    }

    /// Hand the artifact to the messaging layer; it is deleted when this returns
    async fn send(&self, fetched: Fetched, delivery: &dyn Delivery) -> Result<(), String> {
        let kind = fetched.kind();
        let result = delivery
            .send_media(fetched.artifact.path(), kind, &fetched.title)
            .await;
        match &result {
            Ok(()) => info!(id = %fetched.id, strategy = %fetched.strategy, "media delivered"),
            Err(e) => warn!(id = %fetched.id, strategy = %fetched.strategy, error = %e, "media delivery failed"),
        }
        drop(fetched);
        result.map_err(|e| e.to_string())
    }

    async fn fail(&self, error: FetchError, delivery: &dyn Delivery, trail: &mut Trail) -> Outcome {
        trail.enter(Phase::Failing);
        warn!(error = %error, "request failed");

        let mood = match &error {
            FetchError::NotFound(_) => Some(Mood::NotFound),
            FetchError::NetworkError(_) | FetchError::AllStrategiesFailed(_) => Some(Mood::Error),
            _ => None,
        };
        let _ = delivery.clear_status().await;
        if let Some(mood) = mood {
            let _: BestEffort = delivery.sticker(mood).await;
        }
        self.tell(delivery, &error.user_message()).await;
        Outcome::Failed(error)
    }

    async fn tell(&self, delivery: &dyn Delivery, text: &str) {
        if let Err(e) = delivery.notify(text).await {
            warn!(error = %e, "could not notify user");
        }
    }
}

/// Browser-like headers for social-media hosts
pub fn browser_headers(url: &str) -> Vec<(String, String)> {
    vec![
        ("User-Agent".to_string(), BROWSER_USER_AGENT.to_string()),
        ("Referer".to_string(), referer_for(url)),
        ("Accept-Language".to_string(), "en-US,en;q=0.9".to_string()),
    ]
}

/// `scheme://host/` of the link, Instagram's front page when unparseable
fn referer_for(url: &str) -> String {
    url.split_once("://")
        .and_then(|(scheme, rest)| {
            let host = rest.split(['/', '?', '#']).next()?;
            (!host.is_empty()).then(|| format!("{}://{}/", scheme, host))
        })
        .unwrap_or_else(|| "https://www.instagram.com/".to_string())
}
