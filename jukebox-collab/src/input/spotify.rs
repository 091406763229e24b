use async_trait::async_trait;
use serde::Deserialize;
use std::env;
use url::Url;

use crate::util::URL_SCHEME_REGEX;

use super::{InputError, Inputable, Metadata};

const TOKEN_ENDPOINT: &str = "https://accounts.spotify.com/api/token";
const TRACKS_ENDPOINT: &str = "https://api.spotify.com/v1/tracks";

/// A Spotify track that can be queued in a room
pub struct SpotifyInput;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct TrackResponse {
    name: String,
    album: Album,
}

#[derive(Debug, Deserialize)]
struct Album {
    images: Vec<Image>,
}

#[derive(Debug, Deserialize)]
struct Image {
    url: String,
}

#[async_trait]
impl Inputable for SpotifyInput {
    fn test(url: &str) -> bool {
        let url = URL_SCHEME_REGEX.replace(url, "https://");
        let url = match Url::parse(&url) {
            Ok(url) => url,
            Err(_) => return false,
        };

        url.host_str()
            .filter(|host| host.ends_with("spotify.com"))
            .is_some()
            && track_id_from_path(url.path()).is_some()
    }

    async fn fetch(url: &str) -> Result<Metadata, InputError> {
        let normalized = URL_SCHEME_REGEX.replace(url, "https://");
        let track_id = Url::parse(&normalized)
            .ok()
            .and_then(|u| track_id_from_path(u.path()))
            .ok_or(InputError::NoMatch)?;

        let token = access_token().await?;

        let response = reqwest::Client::new()
            .get(format!("{TRACKS_ENDPOINT}/{track_id}"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| InputError::FetchError(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(InputError::NotFound);
        }

        let track: TrackResponse = response
            .json()
            .await
            .map_err(|e| InputError::ParseError(e.to_string()))?;

        let thumbnail = track
            .album
            .images
            .into_iter()
            .next()
            .map(|i| i.url)
            .unwrap_or_default();

        Ok(Metadata {
            title: track.name,
            thumbnail,
        })
    }
}

/// Fetches a client-credentials token for the catalog lookups
async fn access_token() -> Result<String, InputError> {
    let client_id = env::var("SPOTIFY_CLIENT_ID")
        .map_err(|_| InputError::Other("SPOTIFY_CLIENT_ID is not set".to_string()))?;
    let client_secret = env::var("SPOTIFY_CLIENT_SECRET")
        .map_err(|_| InputError::Other("SPOTIFY_CLIENT_SECRET is not set".to_string()))?;

    let response: TokenResponse = reqwest::Client::new()
        .post(TOKEN_ENDPOINT)
        .basic_auth(client_id, Some(client_secret))
        .form(&[("grant_type", "client_credentials")])
        .send()
        .await
        .map_err(|e| InputError::FetchError(e.to_string()))?
        .json()
        .await
        .map_err(|e| InputError::ParseError(e.to_string()))?;

    Ok(response.access_token)
}

/// Extracts the track id from a `/track/{id}` path
fn track_id_from_path(path: &str) -> Option<String> {
    path.strip_prefix("/track/")
        .map(|rest| rest.split('/').next().unwrap_or(rest))
        .filter(|id| !id.is_empty())
        .map(|id| id.to_string())
}
