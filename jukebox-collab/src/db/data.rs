use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The type used for primary keys in the database.
/// Ids are opaque strings; a room's id doubles as its join code.
pub type PrimaryKey = String;

/// A jukebox room
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RoomData {
    pub id: PrimaryKey,
    pub name: String,
    /// The user that created the room, authorized to delete and advance tracks
    pub owner_id: PrimaryKey,
}

/// A queued, voteable reference to external media
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TrackData {
    pub id: PrimaryKey,
    /// The room this track belongs to. A track belongs to exactly one room.
    pub room_id: PrimaryKey,
    pub url: String,
    /// Denormalized vote count, incremented atomically by the store
    pub up_votes: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single user's one-time endorsement of a track.
/// Note: `user_id` and `track_id` are unique together.
#[derive(Debug, Clone)]
pub struct VoteData {
    pub id: PrimaryKey,
    pub user_id: PrimaryKey,
    pub track_id: PrimaryKey,
    pub direction: VoteDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VoteDirection {
    #[default]
    Up,
    Down,
}

impl VoteDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "UP",
            Self::Down => "DOWN",
        }
    }

    pub fn from_str(value: &str) -> Self {
        match value {
            "DOWN" => Self::Down,
            _ => Self::Up,
        }
    }
}
