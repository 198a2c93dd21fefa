// yt-dlp extractor - drives the native `yt-dlp` binary
//
// Downloads land in the attempt directory supplied by the coordinator using
// the `%(id)s.%(ext)s` template, so concurrent attempts never collide.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::errors::FetchError;
use super::models::{ExtractOptions, ExtractedMedia, SearchEntry};
use super::traits::Extractor;
use super::utils::{find_ytdlp, locate_artifact, run_output_with_timeout};

/// Connection settings shared by every yt-dlp invocation
#[derive(Debug, Clone)]
pub struct YtDlpConfig {
    /// Path to the yt-dlp binary
    pub binary: String,
    /// SOCKS5/HTTP proxy URL
    pub proxy: Option<String>,
    /// Path to cookies.txt file
    pub cookies_path: Option<String>,
    /// Per-socket timeout in seconds
    pub socket_timeout_secs: u32,
    pub retries: u32,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            binary: find_ytdlp(),
            proxy: None,
            cookies_path: None,
            socket_timeout_secs: 30,
            retries: 3,
        }
    }
}

pub struct YtDlpExtractor {
    config: YtDlpConfig,
}

#[derive(Debug, Deserialize)]
struct SearchPlaylist {
    #[serde(default)]
    entries: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: Option<String>,
    title: Option<String>,
}

impl YtDlpExtractor {
    pub fn new(config: YtDlpConfig) -> Self {
        Self { config }
    }

    /// Accept both raw video id and full URL
    fn source_url(source: &str) -> String {
        if source.starts_with("http") {
            source.to_string()
        } else {
            format!("https://www.youtube.com/watch?v={}", source)
        }
    }

    fn common_args(&self) -> Vec<String> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            self.config.socket_timeout_secs.to_string(),
            "--retries".to_string(),
            self.config.retries.to_string(),
        ];

        if let Some(path) = &self.config.cookies_path {
            args.push("--cookies".to_string());
            args.push(path.clone());
        }

        if let Some(proxy) = &self.config.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }

        args
    }

    fn build_download_args(&self, source: &str, opts: &ExtractOptions) -> Vec<String> {
        let template = opts.output_dir.join("%(id)s.%(ext)s");
        let mut args = vec![
            "-f".to_string(),
            opts.strategy.format_spec().to_string(),
            "--dump-json".to_string(),
            "--no-simulate".to_string(),
            "--no-progress".to_string(),
            "--no-check-certificates".to_string(),
            "--fixup".to_string(),
            "never".to_string(),
            "-o".to_string(),
            template.to_string_lossy().to_string(),
        ];
        args.extend(self.common_args());

        for (name, value) in &opts.headers {
            args.push("--add-header".to_string());
            args.push(format!("{}:{}", name, value));
        }

        args.push(Self::source_url(source));
        args
    }

    fn build_search_args(&self, query: &str, limit: usize) -> Vec<String> {
        let mut args = vec![
            "--flat-playlist".to_string(),
            "--dump-single-json".to_string(),
        ];
        args.extend(self.common_args());
        args.push(format!("ytsearch{}:{}", limit.max(1), query));
        args
    }

    /// Parse `--dump-json` output and find the file it produced
    fn parse_download(stdout: &[u8], opts: &ExtractOptions) -> Result<ExtractedMedia, FetchError> {
        let json_str = String::from_utf8_lossy(stdout);
        let line = json_str
            .lines()
            .rev()
            .find(|l| l.trim_start().starts_with('{'))
            .ok_or_else(|| FetchError::NetworkError("yt-dlp printed no metadata".to_string()))?;
        let json: serde_json::Value = serde_json::from_str(line)
            .map_err(|e| FetchError::NetworkError(format!("Invalid JSON: {}", e)))?;

        let id = json["id"].as_str().unwrap_or("unknown").to_string();
        let title = json["title"]
            .as_str()
            .or_else(|| json["description"].as_str())
            .unwrap_or("Unknown")
            .to_string();

        let reported = json["requested_downloads"][0]["filepath"]
            .as_str()
            .or_else(|| json["_filename"].as_str())
            .or_else(|| json["filename"].as_str())
            .map(PathBuf::from)
            .filter(|p| p.starts_with(&opts.output_dir) && p.is_file());

        let path = reported
            .or_else(|| locate_artifact(&opts.output_dir, &id))
            .ok_or_else(|| {
                FetchError::NetworkError(format!("yt-dlp finished but no file for {}", id))
            })?;

        Ok(ExtractedMedia { path, id, title })
    }

    fn parse_search(stdout: &[u8], limit: usize) -> Result<Vec<SearchEntry>, FetchError> {
        let playlist: SearchPlaylist = serde_json::from_slice(stdout)
            .map_err(|e| FetchError::NetworkError(format!("Invalid JSON: {}", e)))?;

        Ok(playlist
            .entries
            .into_iter()
            .filter_map(|hit| {
                let id = hit.id.filter(|id| !id.is_empty())?;
                let title = hit.title.unwrap_or_else(|| id.clone());
                Some(SearchEntry { id, title })
            })
            .take(limit)
            .collect())
    }

    async fn run(&self, args: Vec<String>, limit: Duration) -> Result<Vec<u8>, FetchError> {
        debug!(binary = %self.config.binary, args = %args.join(" "), "running yt-dlp");

        match run_output_with_timeout(&self.config.binary, args, limit).await {
            Ok(out) if out.status.success() => Ok(out.stdout),
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                let err = FetchError::from_stderr(&stderr, limit);
                warn!(error = %err, "yt-dlp failed");
                Err(err)
            }
            Err(e) if e.starts_with("Timed out") => Err(FetchError::Timeout(limit)),
            Err(e) => {
                warn!(error = %e, "yt-dlp could not run");
                Err(FetchError::NetworkError(e))
            }
        }
    }
}

impl Default for YtDlpExtractor {
    fn default() -> Self {
        Self::new(YtDlpConfig::default())
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn extract(
        &self,
        source: &str,
        opts: &ExtractOptions,
    ) -> Result<ExtractedMedia, FetchError> {
        let args = self.build_download_args(source, opts);
        let stdout = self.run(args, opts.timeout).await?;
        let media = Self::parse_download(&stdout, opts)?;
        info!(
            strategy = %opts.strategy,
            id = %media.id,
            file = %media.path.display(),
            "yt-dlp download finished"
        );
        Ok(media)
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
        timeout: Duration,
    ) -> Result<Vec<SearchEntry>, FetchError> {
        let args = self.build_search_args(query, limit);
        let stdout = self.run(args, timeout).await?;
        Self::parse_search(&stdout, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::models::Strategy;

    fn extractor() -> YtDlpExtractor {
        YtDlpExtractor::new(YtDlpConfig {
            binary: "yt-dlp".to_string(),
            proxy: Some("socks5h://127.0.0.1:1080".to_string()),
            cookies_path: None,
            socket_timeout_secs: 30,
            retries: 3,
        })
    }

    fn options(dir: PathBuf) -> ExtractOptions {
        ExtractOptions {
            strategy: Strategy::Audio,
            timeout: Duration::from_secs(60),
            headers: vec![("Referer".to_string(), "https://www.instagram.com/".to_string())],
            output_dir: dir,
        }
    }

    #[test]
    fn test_bare_id_becomes_watch_url() {
        assert_eq!(
            YtDlpExtractor::source_url("abc123"),
            "https://www.youtube.com/watch?v=abc123"
        );
        assert_eq!(
            YtDlpExtractor::source_url("https://youtu.be/abc123"),
            "https://youtu.be/abc123"
        );
    }

    #[test]
    fn test_download_args() {
        let opts = options(PathBuf::from("/tmp/attempt"));
        let args = extractor().build_download_args("abc123", &opts);

        assert_eq!(args[0], "-f");
        assert_eq!(args[1], Strategy::Audio.format_spec());
        assert!(args.contains(&"/tmp/attempt/%(id)s.%(ext)s".to_string()));
        assert!(args.contains(&"Referer:https://www.instagram.com/".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "--proxy" && w[1] == "socks5h://127.0.0.1:1080"));
        assert_eq!(args.last().unwrap(), "https://www.youtube.com/watch?v=abc123");
    }

    #[test]
    fn test_search_args() {
        let args = extractor().build_search_args("some song", 3);
        assert!(args.contains(&"--flat-playlist".to_string()));
        assert_eq!(args.last().unwrap(), "ytsearch3:some song");
    }

    #[test]
    fn test_parse_search_skips_entries_without_id() {
        let json = br#"{"entries":[{"id":"a1","title":"First"},{"title":"No id"},{"id":"b2"}]}"#;
        let entries = YtDlpExtractor::parse_search(json, 5).unwrap();
        assert_eq!(
            entries,
            vec![
                SearchEntry { id: "a1".to_string(), title: "First".to_string() },
                SearchEntry { id: "b2".to_string(), title: "b2".to_string() },
            ]
        );
    }

    #[test]
    fn test_parse_search_empty() {
        let entries = YtDlpExtractor::parse_search(br#"{"entries":[]}"#, 3).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_parse_download_uses_reported_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("abc123.m4a");
        std::fs::write(&file, b"x").unwrap();
        let json = serde_json::json!({
            "id": "abc123",
            "title": "Song",
            "requested_downloads": [{"filepath": file.to_string_lossy()}],
        });

        let media = YtDlpExtractor::parse_download(
            json.to_string().as_bytes(),
            &options(dir.path().to_path_buf()),
        )
        .unwrap();
        assert_eq!(media.path, file);
        assert_eq!(media.title, "Song");
    }

    #[test]
    fn test_parse_download_scans_dir_when_path_missing() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("Cxyz.mp4");
        std::fs::write(&file, b"x").unwrap();
        let json = r#"{"id":"Cxyz","title":null,"description":"caption"}"#;

        let media =
            YtDlpExtractor::parse_download(json.as_bytes(), &options(dir.path().to_path_buf()))
                .unwrap();
        assert_eq!(media.path, file);
        assert_eq!(media.title, "caption");
    }

    #[test]
    fn test_parse_download_without_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = YtDlpExtractor::parse_download(
            br#"{"id":"abc"}"#,
            &options(dir.path().to_path_buf()),
        )
        .unwrap_err();
        assert!(matches!(err, FetchError::NetworkError(_)));
    }
}
