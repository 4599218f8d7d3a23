use serde_json::Value;

use crate::{
    common::{BackendException, ClientError, ClientResult, Severity},
    manager::{Manager, SearchQuery},
    protocol::{LoadType, TrackData},
};

/// Tolerance when matching an unresolved track's duration hint.
pub const DURATION_TOLERANCE_MS: u64 = 1500;

const THUMBNAIL_SIZES: [&str; 8] = [
    "0",
    "1",
    "2",
    "3",
    "default",
    "mqdefault",
    "hqdefault",
    "maxresdefault",
];

/// A playable track: the backend's encoded handle plus display metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    /// Base64 handle issued by the backend.
    pub track: String,
    pub title: String,
    pub identifier: String,
    pub author: String,
    /// Milliseconds.
    pub duration: u64,
    pub is_seekable: bool,
    pub is_stream: bool,
    pub uri: Option<String>,
    pub source_name: Option<String>,
    pub thumbnail: Option<String>,
    /// Opaque annotation supplied by the host.
    pub requester: Option<Value>,
}

impl Track {
    pub fn build(data: TrackData, requester: Option<Value>) -> Self {
        let info = data.info;
        let thumbnail = youtube_thumbnail(info.uri.as_deref(), &info.identifier, "default");

        Self {
            track: data.track,
            title: info.title,
            identifier: info.identifier,
            author: info.author,
            duration: info.length,
            is_seekable: info.is_seekable,
            is_stream: info.is_stream,
            uri: info.uri,
            source_name: info.source_name,
            thumbnail,
            requester,
        }
    }

    /// Thumbnail URL in another size; unknown sizes fall back to `default`.
    pub fn display_thumbnail(&self, size: &str) -> Option<String> {
        let size = THUMBNAIL_SIZES
            .iter()
            .find(|s| **s == size)
            .copied()
            .unwrap_or("default");
        youtube_thumbnail(self.uri.as_deref(), &self.identifier, size)
    }
}

fn youtube_thumbnail(uri: Option<&str>, identifier: &str, size: &str) -> Option<String> {
    match uri {
        Some(uri) if uri.contains("youtube") => Some(format!(
            "https://img.youtube.com/vi/{}/{}.jpg",
            identifier, size
        )),
        _ => None,
    }
}

/// A placeholder that has to be searched for before it can be played.
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedTrack {
    pub title: String,
    pub author: Option<String>,
    /// Milliseconds.
    pub duration: Option<u64>,
    pub requester: Option<Value>,
}

impl UnresolvedTrack {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            author: None,
            duration: None,
            requester: None,
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_duration(mut self, duration: u64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_requester(mut self, requester: Value) -> Self {
        self.requester = Some(requester);
        self
    }

    /// `"<author> - <title>"`, or the bare title without an author.
    pub fn query(&self) -> String {
        match self.author.as_deref().filter(|a| !a.is_empty()) {
            Some(author) => format!("{} - {}", author, self.title),
            None => self.title.clone(),
        }
    }

    /// Search the backend and pick the closest match.
    pub async fn resolve(&self, manager: &Manager) -> ClientResult<Track> {
        let result = manager
            .search(SearchQuery::new(self.query()), self.requester.clone())
            .await?;

        if result.load_type != LoadType::SearchResult {
            return Err(ClientError::LoadFailed(result.exception.unwrap_or(
                BackendException {
                    message: Some("No tracks found.".into()),
                    severity: Severity::Common,
                    cause: None,
                },
            )));
        }

        self.closest(result.tracks)
            .ok_or_else(|| ClientError::NoMatches(self.query()))
    }

    /// Author or exact title match first, then duration, then the first result.
    pub fn closest(&self, mut tracks: Vec<Track>) -> Option<Track> {
        if let Some(author) = self.author.as_deref() {
            let topic = format!("{} - Topic", author);
            let title = self.title.to_lowercase();
            let found = tracks.iter().position(|t| {
                let track_author = t.author.to_lowercase();
                track_author == author.to_lowercase()
                    || track_author == topic.to_lowercase()
                    || t.title.to_lowercase() == title
            });
            if let Some(index) = found {
                return Some(tracks.swap_remove(index));
            }
        }

        if let Some(duration) = self.duration {
            let found = tracks
                .iter()
                .position(|t| t.duration.abs_diff(duration) <= DURATION_TOLERANCE_MS);
            if let Some(index) = found {
                return Some(tracks.swap_remove(index));
            }
        }

        if tracks.is_empty() {
            None
        } else {
            Some(tracks.swap_remove(0))
        }
    }
}

/// An entry of a queue: either playable now or awaiting resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueItem {
    Track(Track),
    Unresolved(UnresolvedTrack),
}

impl QueueItem {
    pub fn title(&self) -> &str {
        match self {
            Self::Track(track) => &track.title,
            Self::Unresolved(track) => &track.title,
        }
    }

    /// Known duration in milliseconds, if any.
    pub fn duration(&self) -> Option<u64> {
        match self {
            Self::Track(track) => Some(track.duration),
            Self::Unresolved(track) => track.duration,
        }
    }

    pub fn as_track(&self) -> Option<&Track> {
        match self {
            Self::Track(track) => Some(track),
            Self::Unresolved(_) => None,
        }
    }
}

impl From<Track> for QueueItem {
    fn from(track: Track) -> Self {
        Self::Track(track)
    }
}

impl From<UnresolvedTrack> for QueueItem {
    fn from(track: UnresolvedTrack) -> Self {
        Self::Unresolved(track)
    }
}
