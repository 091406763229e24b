use async_trait::async_trait;
use serde::Deserialize;
use std::env;
use url::Url;

use crate::util::URL_SCHEME_REGEX;

use super::{InputError, Inputable, Metadata};

const VIDEOS_ENDPOINT: &str = "https://www.googleapis.com/youtube/v3/videos";

/// A YouTube video that can be queued in a room
pub struct YouTubeInput;

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    title: String,
    thumbnails: Thumbnails,
}

#[derive(Debug, Deserialize)]
struct Thumbnails {
    high: Option<Thumbnail>,
    default: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

#[async_trait]
impl Inputable for YouTubeInput {
    fn test(url: &str) -> bool {
        let url = URL_SCHEME_REGEX.replace(url, "https://");
        let url = match Url::parse(&url) {
            Ok(url) => url,
            Err(_) => return false,
        };

        // Test youtube.com/watch?v=...
        if url
            .host_str()
            .filter(|host| host.ends_with("youtube.com"))
            .is_some()
        {
            return url.path().starts_with("/watch")
                && url.query_pairs().any(|(k, v)| k == "v" && !v.is_empty());
        }

        // Test youtu.be/...
        url.host_str() == Some("youtu.be") && url.path().len() > 1
    }

    async fn fetch(url: &str) -> Result<Metadata, InputError> {
        let video_id = video_id(url).ok_or(InputError::NoMatch)?;
        let api_key = env::var("YOUTUBE_API_KEY")
            .map_err(|_| InputError::Other("YOUTUBE_API_KEY is not set".to_string()))?;

        let response: VideoListResponse = reqwest::Client::new()
            .get(VIDEOS_ENDPOINT)
            .query(&[
                ("id", video_id.as_str()),
                ("key", api_key.as_str()),
                ("part", "snippet"),
            ])
            .send()
            .await
            .map_err(|e| InputError::FetchError(e.to_string()))?
            .json()
            .await
            .map_err(|e| InputError::ParseError(e.to_string()))?;

        let snippet = response
            .items
            .into_iter()
            .next()
            .ok_or(InputError::NotFound)?
            .snippet;

        let thumbnail = snippet
            .thumbnails
            .high
            .or(snippet.thumbnails.default)
            .map(|t| t.url)
            .unwrap_or_default();

        Ok(Metadata {
            title: snippet.title,
            thumbnail,
        })
    }
}

/// Extracts the video id from a watch or short-form url
fn video_id(url: &str) -> Option<String> {
    let url = URL_SCHEME_REGEX.replace(url, "https://");
    let url = Url::parse(&url).ok()?;

    if url.host_str() == Some("youtu.be") {
        return url.path_segments()?.next().map(|s| s.to_string());
    }

    url.query_pairs()
        .find(|(k, _)| k == "v")
        .map(|(_, v)| v.into_owned())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_url_testing() {
        assert!(YouTubeInput::test(
            "https://www.youtube.com/watch?v=JwRWf3ho4B8&list=PL23A657E4BD523733&index=45"
        ));
        assert!(YouTubeInput::test(
            "www.youtube.com/watch?v=z09GolEktUw&feature=youtu.be"
        ));
        assert!(YouTubeInput::test(
            "https://music.youtube.com/watch?v=-t-75CCdM2o"
        ));
        assert!(YouTubeInput::test("youtu.be/z09GolEktUw"));

        assert!(!YouTubeInput::test("https://www.youtube.com/"));
        assert!(!YouTubeInput::test("https://www.youtube.com/@Ayrun"));
        assert!(!YouTubeInput::test("youtube.com/"));
        assert!(!YouTubeInput::test("https://example.com/watch?v=abc"));
    }

    #[test]
    fn test_video_id_extraction() {
        assert_eq!(
            video_id("https://www.youtube.com/watch?v=z09GolEktUw"),
            Some("z09GolEktUw".to_string())
        );
        assert_eq!(
            video_id("youtu.be/z09GolEktUw"),
            Some("z09GolEktUw".to_string())
        );
    }
}
