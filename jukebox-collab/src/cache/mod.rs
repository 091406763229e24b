use async_trait::async_trait;
use thiserror::Error;

mod memory;
pub use memory::*;

pub type Result<T> = std::result::Result<T, CacheError>;

#[derive(Debug, Error)]
pub enum CacheError {
    /// The entry is not in the cache. On queue removal this is the drift
    /// signal that triggers delete compensation.
    #[error("{resource}:{identifier} is not in the cache")]
    NotFound {
        resource: &'static str,
        identifier: String,
    },
    /// An unknown or internal error happened with the cache
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
}

impl CacheError {
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

/// The fast, advisory projection of a room's queue: an ordered list of track
/// ids per room and an upvote counter per track.
///
/// The cache never owns truth. It must always be rebuildable from the store,
/// and whenever the two disagree the store wins.
#[async_trait]
pub trait Cache: Send + Sync + 'static {
    /// Appends a track id to the end of a room's queue
    async fn push_track(&self, room_id: &str, track_id: &str) -> Result<()>;
    /// Removes a track id from a room's queue, and drops its counter.
    /// Returns [CacheError::NotFound] if the id wasn't queued.
    async fn remove_track(&self, room_id: &str, track_id: &str) -> Result<()>;
    /// Returns a room's queued track ids in insertion order
    async fn queue(&self, room_id: &str) -> Result<Vec<String>>;
    /// Returns the first queued track id of a room, if any
    async fn head(&self, room_id: &str) -> Result<Option<String>>;

    /// Returns a track's upvote counter, if one is cached
    async fn counter(&self, track_id: &str) -> Result<Option<i64>>;
    async fn set_counter(&self, track_id: &str, value: i64) -> Result<()>;
    /// Increments a track's upvote counter, returning the new value
    async fn increment_counter(&self, track_id: &str, by: i64) -> Result<i64>;

    /// Drops a room's queue and the counters of every track in it
    async fn clear_room(&self, room_id: &str) -> Result<()>;
}
