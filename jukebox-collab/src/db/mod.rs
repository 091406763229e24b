use async_trait::async_trait;
use thiserror::Error;

mod data;
pub use data::*;

mod memory;
pub use memory::*;

mod pg;
pub use pg::*;

pub type Result<T> = std::result::Result<T, DatabaseError>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// An unknown or internal error happened with the database
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A resource in the database doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
}

impl DatabaseError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound {
                resource: _,
                identifier: _
            }
        )
    }
}

/// Helper trait to reduce boilerplate
pub trait IntoDatabaseError {
    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError;
    fn any(self) -> DatabaseError;
}

/// Helper trait to reduce boilerplate
pub trait DatabaseResult {
    /// Turns the Result into a conflict error if it's Ok()
    fn conflict_or_ok(self, resource: &'static str, field: &'static str, value: &str)
        -> Result<()>;
}

impl<T> DatabaseResult for Result<T> {
    fn conflict_or_ok(
        self,
        resource: &'static str,
        field: &'static str,
        value: &str,
    ) -> Result<()> {
        match self {
            Ok(_) => Err(DatabaseError::Conflict {
                resource,
                field,
                value: value.to_string(),
            }),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Represents a type that persists jukebox data durably.
/// The store is the single owner of durable truth; the cache only mirrors it.
#[async_trait]
pub trait Database: Send + Sync + 'static {
    async fn room_by_id(&self, room_id: &str) -> Result<RoomData>;

    async fn track_by_id(&self, track_id: &str) -> Result<TrackData>;
    /// Returns every track belonging to a room, in no particular order.
    async fn tracks_by_room(&self, room_id: &str) -> Result<Vec<TrackData>>;
    async fn create_track(&self, new_track: NewTrack) -> Result<TrackData>;
    /// Deletes a track, returning the deleted row so it can be restored if needed.
    async fn delete_track(&self, track_id: &str) -> Result<TrackData>;
    /// Re-creates a previously deleted track with its original field values
    async fn restore_track(&self, track: TrackData) -> Result<TrackData>;

    async fn vote_by_user_and_track(&self, user_id: &str, track_id: &str) -> Result<VoteData>;
    /// Within one transaction, inserts the vote row and applies its effect on the
    /// track's vote count, returning the authoritative new count.
    async fn create_vote(&self, new_vote: NewVote) -> Result<i64>;
}

#[derive(Debug)]
pub struct NewTrack {
    pub room_id: PrimaryKey,
    pub url: String,
}

#[derive(Debug)]
pub struct NewVote {
    pub user_id: PrimaryKey,
    pub track_id: PrimaryKey,
    pub direction: VoteDirection,
}
