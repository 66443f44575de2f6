use std::path::{Path, PathBuf};

use scraper::{Html, Selector};
use serde_json::Value;

use super::VideoError;

const VIDEO_LINK_SELECTOR: &str = ".user-videos-content .content-list ul li a";
const VIDEO_SOURCE_SELECTORS: [&str; 2] = ["video[src]", "video source[src]"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoInfo {
    pub uid: i64,
    pub video_sum: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoLink {
    pub id: String,
    pub title: String,
    pub href: String,
}

/// Decode the `user/liveinfo` payload. `user_video_sum` arrives as a
/// thousands-grouped string such as `"1,234"`.
pub fn parse_video_info(body: &[u8]) -> Result<VideoInfo, VideoError> {
    let root: Value =
        serde_json::from_slice(body).map_err(|e| VideoError::Decode(e.to_string()))?;
    let uid = root
        .get("uid")
        .and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .ok_or_else(|| VideoError::Decode("missing uid".into()))?;
    let video_sum = match root.get("user_video_sum") {
        Some(Value::String(s)) => parse_grouped_count(s)?,
        Some(Value::Number(n)) => n.as_u64().ok_or_else(|| VideoError::Count {
            raw: n.to_string(),
        })?,
        _ => return Err(VideoError::Decode("missing user_video_sum".into())),
    };
    Ok(VideoInfo { uid, video_sum })
}

pub fn parse_grouped_count(raw: &str) -> Result<u64, VideoError> {
    raw.split(',').try_fold(0u64, |acc, group| {
        let part: u64 = group.trim().parse().map_err(|_| VideoError::Count {
            raw: raw.to_string(),
        })?;
        acc.checked_mul(1000)
            .and_then(|v| v.checked_add(part))
            .ok_or_else(|| VideoError::Count {
                raw: raw.to_string(),
            })
    })
}

/// Number of listing pages needed for `video_sum` videos at `page_size` per page.
pub fn page_count(video_sum: u64, page_size: u32) -> u64 {
    video_sum.div_ceil(u64::from(page_size.max(1)))
}

pub fn parse_video_list(html: &str) -> Result<Vec<VideoLink>, VideoError> {
    let doc = Html::parse_document(html);
    let selector = selector(VIDEO_LINK_SELECTOR)?;
    Ok(doc
        .select(&selector)
        .filter_map(|a| {
            let href = a.value().attr("href")?.trim();
            if href.is_empty() {
                return None;
            }
            Some(VideoLink {
                id: video_id_from_href(href),
                title: a.value().attr("title").unwrap_or_default().trim().to_string(),
                href: href.to_string(),
            })
        })
        .collect())
}

/// `/play/123456.html` -> `123456`
pub fn video_id_from_href(href: &str) -> String {
    let id = href.trim_start_matches('/');
    let id = id.strip_prefix("play/").unwrap_or(id);
    id.strip_suffix(".html").unwrap_or(id).to_string()
}

/// The play page's direct media url, when the player is present in the served HTML.
pub fn find_video_source(html: &str) -> Result<Option<String>, VideoError> {
    let doc = Html::parse_document(html);
    for raw in VIDEO_SOURCE_SELECTORS {
        let selector = selector(raw)?;
        let found = doc
            .select(&selector)
            .filter_map(|el| el.value().attr("src"))
            .map(str::trim)
            .find(|src| !src.is_empty());
        if let Some(src) = found {
            return Ok(Some(src.to_string()));
        }
    }
    Ok(None)
}

/// `<out>/<title>-<id>.mp4`, with path separators in the title neutralised.
pub fn target_path(out: &Path, link: &VideoLink) -> PathBuf {
    let title: String = link
        .title
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    out.join(format!("{}-{}.mp4", title, link.id))
}

fn selector(raw: &str) -> Result<Selector, VideoError> {
    Selector::parse(raw).map_err(|e| VideoError::Selector(format!("{raw}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST_PAGE: &str = r#"
        <html><body>
          <div class="user-videos-content">
            <div class="content-list">
              <ul>
                <li><a href="/play/101.html" title="Ranked grind">Ranked grind</a></li>
                <li><a href="/play/102.html" title="  Finals  ">Finals</a></li>
                <li><a title="broken">no href</a></li>
              </ul>
            </div>
          </div>
          <div class="sidebar"><ul><li><a href="/play/999.html" title="ad">ad</a></li></ul></div>
        </body></html>"#;

    #[test]
    fn grouped_counts_are_joined_by_thousands() {
        assert_eq!(parse_grouped_count("7").unwrap(), 7);
        assert_eq!(parse_grouped_count("1,234").unwrap(), 1234);
        assert_eq!(parse_grouped_count("2,000,015").unwrap(), 2_000_015);
        assert!(matches!(
            parse_grouped_count("1,2x4"),
            Err(VideoError::Count { .. })
        ));
        assert!(parse_grouped_count("").is_err());
    }

    #[test]
    fn video_info_reads_uid_and_sum() {
        let info = parse_video_info(br#"{"uid": 1234567, "user_video_sum": "1,020"}"#).unwrap();
        assert_eq!(
            info,
            VideoInfo {
                uid: 1234567,
                video_sum: 1020
            }
        );
        let info = parse_video_info(br#"{"uid": "42", "user_video_sum": 16}"#).unwrap();
        assert_eq!(info.video_sum, 16);
        assert!(matches!(
            parse_video_info(br#"{"uid": 1}"#),
            Err(VideoError::Decode(_))
        ));
    }

    #[test]
    fn page_count_rounds_up() {
        assert_eq!(page_count(0, 15), 0);
        assert_eq!(page_count(15, 15), 1);
        assert_eq!(page_count(16, 15), 2);
        assert_eq!(page_count(3, 0), 3);
    }

    #[test]
    fn list_page_yields_links_inside_the_video_list_only() {
        let links = parse_video_list(LIST_PAGE).unwrap();
        assert_eq!(
            links,
            vec![
                VideoLink {
                    id: "101".into(),
                    title: "Ranked grind".into(),
                    href: "/play/101.html".into(),
                },
                VideoLink {
                    id: "102".into(),
                    title: "Finals".into(),
                    href: "/play/102.html".into(),
                },
            ]
        );
    }

    #[test]
    fn ids_strip_play_prefix_and_html_suffix() {
        assert_eq!(video_id_from_href("/play/123.html"), "123");
        assert_eq!(video_id_from_href("play/pal.html"), "pal");
        assert_eq!(video_id_from_href("/other/5"), "other/5");
    }

    #[test]
    fn video_source_prefers_src_attribute_then_source_child() {
        let direct = r#"<video src="/media/1.mp4"></video>"#;
        assert_eq!(
            find_video_source(direct).unwrap().as_deref(),
            Some("/media/1.mp4")
        );
        let nested = r#"<video><source src="https://cdn.example/2.mp4"></video>"#;
        assert_eq!(
            find_video_source(nested).unwrap().as_deref(),
            Some("https://cdn.example/2.mp4")
        );
        let scripted = r#"<div id="player"></div><script>load()</script>"#;
        assert_eq!(find_video_source(scripted).unwrap(), None);
    }

    #[test]
    fn target_path_neutralises_separators() {
        let link = VideoLink {
            id: "9".into(),
            title: "a/b\\c".into(),
            href: "/play/9.html".into(),
        };
        assert_eq!(
            target_path(Path::new("videos"), &link),
            PathBuf::from("videos/a_b_c-9.mp4")
        );
    }
}
