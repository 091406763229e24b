use async_trait::async_trait;
use chrono::Utc;
use crossbeam::atomic::AtomicCell;
use dashmap::DashMap;

use crate::util::random_string;

use super::{
    Database, DatabaseError, DatabaseResult, NewTrack, NewVote, PrimaryKey, Result, RoomData,
    TrackData, VoteData, VoteDirection,
};

/// An in-memory database implementation, used by tests and local development.
/// Behaves like [super::PgDatabase] minus durability.
#[derive(Default)]
pub struct MemoryDatabase {
    rooms: DashMap<PrimaryKey, RoomData>,
    tracks: DashMap<PrimaryKey, TrackData>,
    votes: DashMap<(PrimaryKey, PrimaryKey), VoteData>,
    /// When set, writes fail with an internal error. Lets tests exercise the
    /// store-failure paths.
    failing: AtomicCell<bool>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_room(&self, room: RoomData) {
        self.rooms.insert(room.id.clone(), room);
    }

    pub fn insert_track(&self, track: TrackData) {
        self.tracks.insert(track.id.clone(), track);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing)
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.failing.load() {
            Err(DatabaseError::Internal("writes are disabled".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn room_by_id(&self, room_id: &str) -> Result<RoomData> {
        self.rooms
            .get(room_id)
            .map(|r| r.clone())
            .ok_or(DatabaseError::NotFound {
                resource: "room",
                identifier: "id",
            })
    }

    async fn track_by_id(&self, track_id: &str) -> Result<TrackData> {
        self.tracks
            .get(track_id)
            .map(|t| t.clone())
            .ok_or(DatabaseError::NotFound {
                resource: "track",
                identifier: "id",
            })
    }

    async fn tracks_by_room(&self, room_id: &str) -> Result<Vec<TrackData>> {
        Ok(self
            .tracks
            .iter()
            .filter(|t| t.room_id == room_id)
            .map(|t| t.clone())
            .collect())
    }

    async fn create_track(&self, new_track: NewTrack) -> Result<TrackData> {
        self.ensure_writable()?;
        let _ = self.room_by_id(&new_track.room_id).await?;

        let now = Utc::now();
        let track = TrackData {
            id: random_string(24),
            room_id: new_track.room_id,
            url: new_track.url,
            up_votes: 0,
            created_at: now,
            updated_at: now,
        };

        self.tracks.insert(track.id.clone(), track.clone());
        Ok(track)
    }

    async fn delete_track(&self, track_id: &str) -> Result<TrackData> {
        self.ensure_writable()?;

        let (_, track) = self
            .tracks
            .remove(track_id)
            .ok_or(DatabaseError::NotFound {
                resource: "track",
                identifier: "id",
            })?;

        // Votes cascade with their track, as the schema does
        self.votes.retain(|(_, voted_track), _| voted_track != track_id);

        Ok(track)
    }

    async fn restore_track(&self, track: TrackData) -> Result<TrackData> {
        self.ensure_writable()?;
        self.tracks.insert(track.id.clone(), track.clone());
        Ok(track)
    }

    async fn vote_by_user_and_track(&self, user_id: &str, track_id: &str) -> Result<VoteData> {
        self.votes
            .get(&(user_id.to_string(), track_id.to_string()))
            .map(|v| v.clone())
            .ok_or(DatabaseError::NotFound {
                resource: "vote",
                identifier: "user_id:track_id",
            })
    }

    async fn create_vote(&self, new_vote: NewVote) -> Result<i64> {
        self.ensure_writable()?;

        self.vote_by_user_and_track(&new_vote.user_id, &new_vote.track_id)
            .await
            .conflict_or_ok(
                "vote",
                "user_id:track_id",
                format!("{}:{}", new_vote.user_id, new_vote.track_id).as_str(),
            )?;

        let mut track = self
            .tracks
            .get_mut(&new_vote.track_id)
            .ok_or(DatabaseError::NotFound {
                resource: "track",
                identifier: "id",
            })?;

        let vote = VoteData {
            id: random_string(24),
            user_id: new_vote.user_id.clone(),
            track_id: new_vote.track_id.clone(),
            direction: new_vote.direction,
        };

        self.votes
            .insert((new_vote.user_id, new_vote.track_id), vote);

        if new_vote.direction == VoteDirection::Up {
            track.up_votes += 1;
            track.updated_at = Utc::now();
        }

        Ok(track.up_votes)
    }
}
