// Request classification

use lazy_static::lazy_static;
use regex::Regex;

/// Hosts whose posts are raced video-vs-audio
const SOCIAL_HOSTS: &[&str] = &[
    "instagram.com",
    "instagr.am",
    "tiktok.com",
    "facebook.com",
    "fb.watch",
];

const VIDEO_SITE_HOSTS: &[&str] = &["youtube.com", "youtu.be", "youtube-nocookie.com"];

lazy_static! {
    static ref VIDEO_ID_RE: Regex = Regex::new(
        r"(?:[?&]v=|youtu\.be/|/shorts/|/embed/|/live/)([A-Za-z0-9_-]+)"
    )
    .unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    DirectLink,
    SearchQuery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    VideoSite,
    SocialMedia,
}

/// One inbound text message after classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub raw_text: String,
    pub kind: RequestKind,
    pub platform: Platform,
}

impl Request {
    /// Video id carried by a direct video-site link, if one can be parsed
    pub fn video_id(&self) -> Option<String> {
        match (self.kind, self.platform) {
            (RequestKind::DirectLink, Platform::VideoSite) => extract_video_id(&self.raw_text),
            _ => None,
        }
    }
}

pub fn classify(raw: &str) -> Request {
    let text = raw.trim();
    let lower = text.to_lowercase();

    let (kind, platform) = if SOCIAL_HOSTS.iter().any(|host| lower.contains(host)) {
        (RequestKind::DirectLink, Platform::SocialMedia)
    } else if VIDEO_SITE_HOSTS.iter().any(|host| lower.contains(host)) {
        (RequestKind::DirectLink, Platform::VideoSite)
    } else {
        (RequestKind::SearchQuery, Platform::VideoSite)
    };

    Request {
        raw_text: text.to_string(),
        kind,
        platform,
    }
}

pub fn extract_video_id(url: &str) -> Option<String> {
    VIDEO_ID_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
