use serde::Serialize;

use crate::{Metadata, RoomData, TrackData};

/// A track together with its resolved display metadata, as clients see it
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedTrack {
    #[serde(flatten)]
    pub track: TrackData,
    pub title: String,
    pub thumbnail: String,
}

impl QueuedTrack {
    pub fn new(track: TrackData, metadata: Metadata) -> Self {
        Self {
            track,
            title: metadata.title,
            thumbnail: metadata.thumbnail,
        }
    }
}

/// Events fanned out to the connections of a room, serialized as
/// `{ "type": ..., "data": ... }` envelopes on the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum RoomEvent {
    /// Reply to a successful join, sent only to the joining connection
    RoomJoined {
        room_id: String,
        user_id: String,
        is_owner: bool,
        room: RoomData,
        /// The queue as produced by the ordering engine, metadata included
        tracks: Vec<QueuedTrack>,
    },
    TrackAdded {
        track: QueuedTrack,
    },
    /// A vote was recorded. Carries the absolute store-returned count, so
    /// out-of-order delivery between clients is harmless.
    TrackVoted {
        track_id: String,
        up_votes: i64,
    },
    TrackVoteError {
        track_id: String,
        message: String,
    },
    /// Success carries the track id; a rejection or rollback carries a message
    TrackDeleted {
        #[serde(skip_serializing_if = "Option::is_none")]
        track_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    NextTrack {
        track: TrackData,
    },
    NoMoreTracks,
    Error {
        message: String,
    },
}
