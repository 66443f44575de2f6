//! Per-streamer video listing scraper.
//!
//! Sequential: video count -> listing pages -> play pages. Each play page is
//! checked for a directly embedded media url; most players are injected by
//! scripts, in which case the video is reported as unresolved and skipped.
//!
//! Env: `VIDEO_BASE_URL`, `VIDEO_PAGE_SIZE` (default 15), `VIDEO_REQUEST_TIMEOUT_SECS`.
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::util::env::{env_opt, env_parse, env_secs};

pub mod parse;

pub use parse::{VideoInfo, VideoLink};

pub const DEFAULT_VIDEO_BASE_URL: &str = "https://v.huya.com";
/// Videos per listing page. The site does not report it, so this is an estimate.
pub const DEFAULT_VIDEO_PAGE_SIZE: u32 = 15;

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected video info payload: {0}")]
    Decode(String),
    #[error("invalid video count {raw:?}")]
    Count { raw: String },
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("bad selector {0}")]
    Selector(String),
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct VideoConfig {
    pub base_url: String,
    pub page_size: u32,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_VIDEO_BASE_URL.to_string(),
            page_size: DEFAULT_VIDEO_PAGE_SIZE,
            request_timeout: Duration::from_secs(30),
            user_agent: crate::listing::DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl VideoConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env_opt("VIDEO_BASE_URL").unwrap_or(defaults.base_url),
            page_size: env_parse("VIDEO_PAGE_SIZE", defaults.page_size).max(1),
            request_timeout: env_secs("VIDEO_REQUEST_TIMEOUT_SECS", 30),
            user_agent: defaults.user_agent,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoSummary {
    pub uid: i64,
    pub video_sum: u64,
    pub pages: u64,
    pub pages_failed: u64,
    pub links_found: usize,
    pub downloaded: usize,
    pub unresolved: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFetch {
    Downloaded,
    /// The play page carried no direct media url.
    Unresolved,
}

#[derive(Debug, Clone)]
pub struct VideoClient {
    http: Client,
    base: Url,
}

impl VideoClient {
    pub fn new(cfg: &VideoConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(cfg.user_agent.as_str())
            .timeout(cfg.request_timeout)
            .build()?;
        let base = Url::parse(cfg.base_url.trim_end_matches('/'))
            .with_context(|| format!("invalid video base url {}", cfg.base_url))?;
        Ok(Self { http, base })
    }

    pub async fn fetch_video_info(&self, uid: i64) -> Result<VideoInfo, VideoError> {
        let url = self
            .base
            .join(&format!("/index.php?r=user/liveinfo&uid={uid}"))?;
        let body = self.get_bytes(url).await?;
        parse::parse_video_info(&body)
    }

    pub async fn fetch_video_page(&self, uid: i64, page: u64) -> Result<Vec<VideoLink>, VideoError> {
        let url = self.base.join(&format!("/u/{uid}/video.html?p={page}"))?;
        let body = self.get_bytes(url).await?;
        parse::parse_video_list(&String::from_utf8_lossy(&body))
    }

    /// Resolve the play page of `link` and download its media to `target`.
    pub async fn fetch_video(&self, link: &VideoLink, target: &Path) -> Result<VideoFetch, VideoError> {
        let play_url = self.base.join(&link.href)?;
        let body = self.get_bytes(play_url.clone()).await?;
        let Some(src) = parse::find_video_source(&String::from_utf8_lossy(&body))? else {
            return Ok(VideoFetch::Unresolved);
        };
        let media_url = play_url.join(&src)?;
        debug!(video = %link.id, url = %media_url, "downloading video");
        let media = self.get_bytes(media_url).await?;
        tokio::fs::write(target, &media)
            .await
            .map_err(|source| VideoError::Io {
                path: target.to_path_buf(),
                source,
            })?;
        Ok(VideoFetch::Downloaded)
    }

    async fn get_bytes(&self, url: Url) -> Result<bytes::Bytes, VideoError> {
        let transport = |source| VideoError::Transport {
            url: url.to_string(),
            source,
        };
        let resp = self
            .http
            .get(url.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(transport)?;
        resp.bytes().await.map_err(transport)
    }
}

/// Walk every listing page of `uid` and fetch each video into `out`.
///
/// Only the video count lookup is fatal; a failing listing page or video is
/// logged and skipped.
pub async fn run_video_scrape(cfg: &VideoConfig, uid: i64, out: &Path) -> Result<VideoSummary> {
    tokio::fs::create_dir_all(out)
        .await
        .with_context(|| format!("failed to create output dir {}", out.display()))?;
    let client = VideoClient::new(cfg)?;

    let info = client
        .fetch_video_info(uid)
        .await
        .with_context(|| format!("failed to load video info for uid {uid}"))?;
    let pages = parse::page_count(info.video_sum, cfg.page_size);
    info!(uid = info.uid, sum = info.video_sum, pages, "video listing discovered");

    let mut summary = VideoSummary {
        uid: info.uid,
        video_sum: info.video_sum,
        pages,
        ..VideoSummary::default()
    };
    for page in 1..=pages {
        let links = match client.fetch_video_page(uid, page).await {
            Ok(links) => links,
            Err(e) => {
                warn!(uid, page, error = %e, "video listing page failed; skipping");
                summary.pages_failed += 1;
                continue;
            }
        };
        summary.links_found += links.len();
        for link in &links {
            let target = parse::target_path(out, link);
            match client.fetch_video(link, &target).await {
                Ok(VideoFetch::Downloaded) => {
                    info!(video = %link.id, path = %target.display(), "video saved");
                    summary.downloaded += 1;
                }
                Ok(VideoFetch::Unresolved) => {
                    warn!(video = %link.id, title = %link.title, "no direct media url on play page");
                    summary.unresolved += 1;
                }
                Err(e) => {
                    warn!(video = %link.id, error = %e, "video fetch failed");
                    summary.failed += 1;
                }
            }
        }
    }
    info!(
        uid,
        links = summary.links_found,
        downloaded = summary.downloaded,
        unresolved = summary.unresolved,
        failed = summary.failed,
        "video scrape finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    type Route = (&'static str, &'static str);

    /// Minimal HTTP/1.1 responder: exact path+query match, 404 otherwise.
    async fn serve_routes(routes: Vec<Route>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let routes = routes.clone();
                tokio::spawn(async move {
                    let mut head = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => head.extend_from_slice(&buf[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&head);
                    let target = head.split_whitespace().nth(1).unwrap_or("/").to_string();
                    let (status, body) = routes
                        .iter()
                        .find(|(path, _)| *path == target)
                        .map(|(_, body)| ("200 OK", *body))
                        .unwrap_or(("404 Not Found", "missing"));
                    let response = format!(
                        "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{addr}")
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("livelist-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    const LIST_PAGE_1: &str = r#"<div class="user-videos-content"><div class="content-list"><ul>
        <li><a href="/play/101.html" title="Clutch">x</a></li>
        <li><a href="/play/102.html" title="Scripted">y</a></li>
        <li><a href="/play/103.html" title="Gone">z</a></li>
    </ul></div></div>"#;

    #[tokio::test]
    async fn scrape_downloads_embedded_videos_and_skips_the_rest() {
        let base = serve_routes(vec![
            (
                "/index.php?r=user/liveinfo&uid=42",
                r#"{"uid":42,"user_video_sum":"0,016"}"#,
            ),
            ("/u/42/video.html?p=1", LIST_PAGE_1),
            // page 2 is missing and must only be counted as failed
            ("/play/101.html", r#"<video src="/media/101.mp4"></video>"#),
            ("/play/102.html", r#"<div id="player"></div>"#),
            ("/media/101.mp4", "fake-mp4-bytes"),
        ])
        .await;
        let cfg = VideoConfig {
            base_url: base,
            request_timeout: Duration::from_secs(5),
            ..VideoConfig::default()
        };
        let out = scratch_dir("scrape");

        let summary = run_video_scrape(&cfg, 42, &out).await.unwrap();
        assert_eq!(summary.video_sum, 16);
        assert_eq!(summary.pages, 2);
        assert_eq!(summary.pages_failed, 1);
        assert_eq!(summary.links_found, 3);
        assert_eq!(summary.downloaded, 1);
        assert_eq!(summary.unresolved, 1);
        assert_eq!(summary.failed, 1);

        let saved = std::fs::read(out.join("Clutch-101.mp4")).unwrap();
        assert_eq!(saved, b"fake-mp4-bytes");
        let _ = std::fs::remove_dir_all(&out);
    }

    #[tokio::test]
    async fn missing_video_info_aborts() {
        let base = serve_routes(vec![]).await;
        let cfg = VideoConfig {
            base_url: base,
            ..VideoConfig::default()
        };
        let out = scratch_dir("abort");
        assert!(run_video_scrape(&cfg, 7, &out).await.is_err());
        // the output dir is created before anything is fetched
        assert!(out.is_dir());
        let _ = std::fs::remove_dir_all(&out);
    }
}
