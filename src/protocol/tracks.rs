use std::io::{Cursor, Read};

use base64::prelude::*;
use byteorder::{BigEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};

use crate::common::BackendException;

/// Track as returned by `/loadtracks` and `/decodetracks`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackData {
    /// Base64-encoded track data.
    pub track: String,
    pub info: TrackInfo,
}

/// Metadata for an audio track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    pub identifier: String,
    pub is_seekable: bool,
    pub author: String,
    /// Duration in milliseconds. 0 for live streams.
    pub length: u64,
    pub is_stream: bool,
    #[serde(default)]
    pub position: u64,
    pub title: String,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub source_name: Option<String>,
}

impl TrackData {
    /// Decode a Lavaplayer message-encoded track without asking the backend.
    ///
    /// Layout (versions 1, 2 and 3):
    ///   [u32 header: (payload_size) | (flags << 30)]
    ///     flags bit 0 = TRACK_INFO_VERSIONED (version byte present)
    ///   [u8  version]
    ///   [utf title]
    ///   [utf author]
    ///   [u64 length ms]
    ///   [utf identifier]
    ///   [u8  is_stream: 0/1]
    ///   [opt_utf uri]         -- v2+
    ///   [opt_utf artwork_url] -- v3+
    ///   [opt_utf isrc]        -- v3+
    ///   [utf source_name]
    ///   [u64 position ms]
    pub fn decode(encoded: &str) -> Option<Self> {
        let data = BASE64_STANDARD.decode(encoded).ok()?;
        if data.len() < 4 {
            return None;
        }

        let mut cursor = Cursor::new(data);
        let header = cursor.read_u32::<BigEndian>().ok()?;
        let flags = (header >> 30) & 0x03;

        let version = if (flags & 1) != 0 {
            cursor.read_u8().ok()?
        } else {
            1
        };

        if version > 3 {
            return None;
        }

        let title = read_utf(&mut cursor)?;
        let author = read_utf(&mut cursor)?;
        let length = cursor.read_u64::<BigEndian>().ok()?;
        let identifier = read_utf(&mut cursor)?;
        let is_stream = cursor.read_u8().ok()? != 0;

        let uri = if version >= 2 {
            read_opt_utf(&mut cursor)?
        } else {
            None
        };

        // artwork url and isrc have no place in the v3 REST shape
        if version >= 3 {
            read_opt_utf(&mut cursor)?;
            read_opt_utf(&mut cursor)?;
        }

        let source_name = read_utf(&mut cursor)?;
        let position = cursor.read_u64::<BigEndian>().ok().unwrap_or(0);

        Some(Self {
            track: encoded.to_string(),
            info: TrackInfo {
                identifier,
                is_seekable: !is_stream,
                author,
                length,
                is_stream,
                position,
                title,
                uri,
                source_name: Some(source_name),
            },
        })
    }
}

fn read_utf<R: Read>(r: &mut R) -> Option<String> {
    let len = r.read_u16::<BigEndian>().ok()? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).ok()?;
    String::from_utf8(buf).ok()
}

/// `Some(None)` for an absent field, `None` for truncated input.
fn read_opt_utf<R: Read>(r: &mut R) -> Option<Option<String>> {
    let present = r.read_u8().ok()? != 0;
    if present { read_utf(r).map(Some) } else { Some(None) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadType {
    TrackLoaded,
    PlaylistLoaded,
    SearchResult,
    NoMatches,
    LoadFailed,
}

/// Playlist metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistInfo {
    #[serde(default)]
    pub name: Option<String>,
    /// Index of the selected track, or -1 if none.
    #[serde(default = "no_selection")]
    pub selected_track: i32,
}

fn no_selection() -> i32 {
    -1
}

/// Raw `/loadtracks` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadTracksResponse {
    pub load_type: LoadType,
    #[serde(default)]
    pub playlist_info: Option<PlaylistInfo>,
    #[serde(default)]
    pub tracks: Vec<TrackData>,
    #[serde(default)]
    pub exception: Option<BackendException>,
}
