use serde_json::Value;
use tracing::debug;

use super::Manager;
use crate::{
    common::{BackendException, ClientError, ClientResult},
    configs::SearchPlatform,
    protocol::{LoadTracksResponse, LoadType, TrackData},
    track::Track,
};

/// A search term plus the platform to search on when it is not a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub query: String,
    /// Falls back to the manager's default platform.
    pub source: Option<SearchPlatform>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: SearchPlatform) -> Self {
        self.source = Some(source);
        self
    }

    /// The identifier sent to `/loadtracks`.
    pub fn identifier(&self, default: SearchPlatform) -> String {
        if is_url(&self.query) {
            return self.query.clone();
        }
        format!("{}:{}", self.source.unwrap_or(default).prefix(), self.query)
    }
}

impl From<&str> for SearchQuery {
    fn from(query: &str) -> Self {
        Self::new(query)
    }
}

impl From<String> for SearchQuery {
    fn from(query: String) -> Self {
        Self::new(query)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistSummary {
    pub name: String,
    pub selected_track: Option<Track>,
    /// Sum of every track's duration in milliseconds.
    pub duration: u64,
}

/// Outcome of a search, with tracks built and annotated with the requester.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub load_type: LoadType,
    pub tracks: Vec<Track>,
    pub playlist: Option<PlaylistSummary>,
    pub exception: Option<BackendException>,
}

impl SearchResult {
    pub(crate) fn build(response: LoadTracksResponse, requester: Option<Value>) -> Self {
        let tracks: Vec<Track> = response
            .tracks
            .into_iter()
            .map(|data| Track::build(data, requester.clone()))
            .collect();

        let playlist = match (response.load_type, response.playlist_info) {
            (LoadType::PlaylistLoaded, Some(info)) => Some(PlaylistSummary {
                name: info.name.unwrap_or_default(),
                selected_track: usize::try_from(info.selected_track)
                    .ok()
                    .and_then(|i| tracks.get(i).cloned()),
                duration: tracks
                    .iter()
                    .fold(0u64, |acc, t| acc.saturating_add(t.duration)),
            }),
            _ => None,
        };

        Self {
            load_type: response.load_type,
            tracks,
            playlist,
            exception: response.exception,
        }
    }
}

fn is_url(query: &str) -> bool {
    query.starts_with("http://") || query.starts_with("https://")
}

impl Manager {
    /// Load tracks from the least used node.
    pub async fn search(
        &self,
        query: SearchQuery,
        requester: Option<Value>,
    ) -> ClientResult<SearchResult> {
        let node = self
            .least_used_nodes()
            .into_iter()
            .next()
            .ok_or(ClientError::NoAvailableNodes)?;

        let identifier = query.identifier(self.config.default_search_platform);
        debug!("[{}] Searching for \"{}\"", node.id(), identifier);

        let endpoint = format!("loadtracks?identifier={}", urlencoding::encode(&identifier));
        let response: LoadTracksResponse = node.make_request(&endpoint, |_| {}).await?;
        Ok(SearchResult::build(response, requester))
    }

    /// Decode backend track handles through `/decodetracks`.
    pub async fn decode_tracks(&self, tracks: &[String]) -> ClientResult<Vec<TrackData>> {
        let node = self
            .least_used_nodes()
            .into_iter()
            .next()
            .ok_or(ClientError::NoAvailableNodes)?;

        let body = serde_json::to_value(tracks)?;
        node.make_request("decodetracks", |request| {
            request.method = reqwest::Method::POST;
            request.body = Some(body);
        })
        .await
    }

    /// Decode one handle, locally when possible.
    pub async fn decode_track(&self, track: &str) -> ClientResult<TrackData> {
        if let Some(data) = TrackData::decode(track) {
            return Ok(data);
        }

        self.decode_tracks(&[track.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::NoMatches(track.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use axum::{
        Json, Router,
        extract::{Query, State},
        http::{HeaderMap, StatusCode},
        routing::{get, post},
    };
    use serde_json::json;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio_tungstenite::tungstenite::Message;

    use super::*;
    use crate::{
        configs::{ManagerConfig, NodeOptions},
        manager::tests::noop_send,
        protocol::{TrackInfo, tracks::tests::encode_v3},
        track::UnresolvedTrack,
    };

    #[derive(Clone, Default)]
    pub(crate) struct Backend {
        pub(crate) decoded: Arc<AtomicUsize>,
    }

    fn info(title: &str, author: &str, length: u64) -> Value {
        json!({
            "identifier": title.to_lowercase(),
            "isSeekable": true,
            "author": author,
            "length": length,
            "isStream": false,
            "position": 0,
            "title": title,
            "uri": format!("https://www.youtube.com/watch?v={}", title.to_lowercase()),
            "sourceName": "youtube"
        })
    }

    async fn load_tracks(
        headers: HeaderMap,
        Query(params): Query<std::collections::HashMap<String, String>>,
    ) -> Result<Json<Value>, StatusCode> {
        if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("youshallnotpass") {
            return Err(StatusCode::UNAUTHORIZED);
        }

        let identifier = params.get("identifier").cloned().unwrap_or_default();
        let body = match identifier.as_str() {
            "ytsearch:Band - Song" | "ytsearch:song" => json!({
                "loadType": "SEARCH_RESULT",
                "playlistInfo": {},
                "tracks": [
                    { "track": "t-cover", "info": info("Song (cover)", "Someone", 1000) },
                    { "track": "t-topic", "info": info("Song", "Band - Topic", 2000) }
                ]
            }),
            "https://example.com/list" => json!({
                "loadType": "PLAYLIST_LOADED",
                "playlistInfo": { "name": "Mix", "selectedTrack": 1 },
                "tracks": [
                    { "track": "t-1", "info": info("One", "A", 1000) },
                    { "track": "t-2", "info": info("Two", "B", 2500) }
                ]
            }),
            _ => json!({
                "loadType": "LOAD_FAILED",
                "playlistInfo": {},
                "tracks": [],
                "exception": { "message": "unsupported", "severity": "COMMON" }
            }),
        };
        Ok(Json(body))
    }

    async fn decode_tracks(
        State(backend): State<Backend>,
        Json(tracks): Json<Vec<String>>,
    ) -> Json<Value> {
        backend.decoded.fetch_add(1, Ordering::Relaxed);
        Json(Value::Array(
            tracks
                .iter()
                .map(|t| json!({ "track": t, "info": info("Remote", "R", 3000) }))
                .collect(),
        ))
    }

    /// A manager whose only node talks REST to an in-process backend; socket
    /// frames land in the returned receiver.
    pub(crate) async fn fake_backend() -> (Arc<Manager>, Backend, UnboundedReceiver<Message>) {
        let backend = Backend::default();
        let app = Router::new()
            .route("/loadtracks", get(load_tracks))
            .route("/decodetracks", post(decode_tracks))
            .with_state(backend.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let manager = Manager::new(
            ManagerConfig::default(),
            vec![NodeOptions::new("127.0.0.1", port)],
            noop_send(),
        )
        .unwrap();
        let rx = manager.nodes()[0].attach_test_socket();
        (manager, backend, rx)
    }

    #[test]
    fn test_identifier_prefixes_plain_queries() {
        assert_eq!(
            SearchQuery::new("song").identifier(SearchPlatform::Youtube),
            "ytsearch:song"
        );
        assert_eq!(
            SearchQuery::new("song")
                .with_source(SearchPlatform::Soundcloud)
                .identifier(SearchPlatform::Youtube),
            "scsearch:song"
        );
        assert_eq!(
            SearchQuery::new("https://x.test/a").identifier(SearchPlatform::YoutubeMusic),
            "https://x.test/a"
        );
    }

    #[tokio::test]
    async fn test_search_builds_tracks_and_counts_calls() {
        let (manager, _backend, _rx) = fake_backend().await;
        let node = manager.nodes().remove(0);

        let result = manager
            .search("song".into(), Some(json!({ "id": 7 })))
            .await
            .unwrap();

        assert_eq!(result.load_type, LoadType::SearchResult);
        assert_eq!(result.tracks.len(), 2);
        assert_eq!(result.tracks[0].requester, Some(json!({ "id": 7 })));
        assert!(result.playlist.is_none());
        assert_eq!(node.calls(), 1);
    }

    #[tokio::test]
    async fn test_search_summarises_playlists() {
        let (manager, _backend, _rx) = fake_backend().await;

        let result = manager
            .search("https://example.com/list".into(), None)
            .await
            .unwrap();

        let playlist = result.playlist.expect("playlist summary");
        assert_eq!(playlist.name, "Mix");
        assert_eq!(playlist.duration, 3500);
        assert_eq!(playlist.selected_track.map(|t| t.title), Some("Two".to_string()));
    }

    #[tokio::test]
    async fn test_unresolved_track_resolves_against_backend() {
        let (manager, _backend, _rx) = fake_backend().await;

        let resolved = UnresolvedTrack::new("Song")
            .with_author("Band")
            .resolve(&manager)
            .await
            .unwrap();
        assert_eq!(resolved.track, "t-topic");

        let err = UnresolvedTrack::new("missing")
            .resolve(&manager)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::LoadFailed(ref ex) if ex.message.as_deref() == Some("unsupported")
        ));
    }

    #[tokio::test]
    async fn test_decode_track_prefers_local_decoding() {
        let (manager, backend, _rx) = fake_backend().await;

        let local = TrackInfo {
            identifier: "abc".into(),
            is_seekable: true,
            author: "Local".into(),
            length: 1234,
            is_stream: false,
            position: 0,
            title: "Blob".into(),
            uri: Some("https://www.youtube.com/watch?v=abc".into()),
            source_name: Some("youtube".into()),
        };
        let data = manager.decode_track(&encode_v3(&local)).await.unwrap();
        assert_eq!(data.info.title, "Blob");
        assert_eq!(backend.decoded.load(Ordering::Relaxed), 0);

        let data = manager.decode_track("not-a-blob").await.unwrap();
        assert_eq!(data.info.title, "Remote");
        assert_eq!(data.track, "not-a-blob");
        assert_eq!(backend.decoded.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_search_without_open_nodes_fails() {
        let manager = Manager::new(ManagerConfig::default(), Vec::new(), noop_send()).unwrap();
        assert!(matches!(
            manager.search("song".into(), None).await,
            Err(ClientError::NoAvailableNodes)
        ));
    }
}
