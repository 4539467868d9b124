//! Best-effort stream classification: a quick probe of the origin URL to
//! decide whether it can be relayed directly or needs transcoding.
//! Results are informational only and never block session creation.

use std::time::Duration;

use crate::models::StreamKind;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn classify_stream(client: &reqwest::Client, url: &str) -> StreamKind {
    let response = match client.get(url).timeout(PROBE_TIMEOUT).send().await {
        Ok(resp) => resp,
        Err(err) => {
            tracing::debug!(url, error = %err, "stream classification probe failed");
            return StreamKind::Unknown;
        }
    };

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    classify_content_type(&content_type, url)
}

fn classify_content_type(content_type: &str, url: &str) -> StreamKind {
    if content_type.contains("mpegurl") || url.ends_with(".m3u8") {
        StreamKind::Hls
    } else if content_type.contains("video/mp2t") || url.ends_with(".ts") {
        StreamKind::MpegTs
    } else if content_type.starts_with("video/") || content_type.starts_with("audio/") {
        StreamKind::DirectPlayable
    } else if content_type.is_empty() {
        StreamKind::Unknown
    } else {
        StreamKind::NeedsTranscode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hls_playlists_are_recognised_by_extension() {
        assert_eq!(classify_content_type("", "http://origin/stream.m3u8"), StreamKind::Hls);
    }

    #[test]
    fn video_content_type_is_direct_playable() {
        assert_eq!(classify_content_type("video/mp4", "http://origin/a"), StreamKind::DirectPlayable);
    }

    #[test]
    fn unrecognised_type_falls_back_to_needs_transcode() {
        assert_eq!(classify_content_type("application/octet-stream", "http://origin/a"), StreamKind::NeedsTranscode);
    }
}
