use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, query, query_as, query_scalar, Error as SqlxError, PgPool, Row};

use crate::util::random_string;

use super::{
    Database, DatabaseError, DatabaseResult, IntoDatabaseError, NewTrack, NewVote, Result,
    RoomData, TrackData, VoteData, VoteDirection,
};

/// The length of generated track and vote ids.
const KEY_LENGTH: usize = 24;

/// A postgres database implementation for jukebox
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    pub async fn new(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn room_by_id(&self, room_id: &str) -> Result<RoomData> {
        query_as::<_, RoomData>("SELECT id, name, owner_id FROM rooms WHERE id = $1")
            .bind(room_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("room", "id"))
    }

    async fn track_by_id(&self, track_id: &str) -> Result<TrackData> {
        query_as::<_, TrackData>(
            "SELECT id, room_id, url, up_votes, created_at, updated_at
             FROM tracks WHERE id = $1",
        )
        .bind(track_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("track", "id"))
    }

    async fn tracks_by_room(&self, room_id: &str) -> Result<Vec<TrackData>> {
        query_as::<_, TrackData>(
            "SELECT id, room_id, url, up_votes, created_at, updated_at
             FROM tracks WHERE room_id = $1",
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn create_track(&self, new_track: NewTrack) -> Result<TrackData> {
        // Ensure the room exists so a bad join code fails cleanly
        let _ = self.room_by_id(&new_track.room_id).await?;

        query_as::<_, TrackData>(
            "INSERT INTO tracks (id, room_id, url)
             VALUES ($1, $2, $3)
             RETURNING id, room_id, url, up_votes, created_at, updated_at",
        )
        .bind(random_string(KEY_LENGTH))
        .bind(&new_track.room_id)
        .bind(&new_track.url)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn delete_track(&self, track_id: &str) -> Result<TrackData> {
        query_as::<_, TrackData>(
            "DELETE FROM tracks WHERE id = $1
             RETURNING id, room_id, url, up_votes, created_at, updated_at",
        )
        .bind(track_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("track", "id"))
    }

    async fn restore_track(&self, track: TrackData) -> Result<TrackData> {
        query_as::<_, TrackData>(
            "INSERT INTO tracks (id, room_id, url, up_votes, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, room_id, url, up_votes, created_at, updated_at",
        )
        .bind(&track.id)
        .bind(&track.room_id)
        .bind(&track.url)
        .bind(track.up_votes)
        .bind(track.created_at)
        .bind(track.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn vote_by_user_and_track(&self, user_id: &str, track_id: &str) -> Result<VoteData> {
        let row = query("SELECT id, user_id, track_id, direction FROM votes WHERE user_id = $1 AND track_id = $2")
            .bind(user_id)
            .bind(track_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("vote", "user_id:track_id"))?;

        Ok(VoteData {
            id: row.get("id"),
            user_id: row.get("user_id"),
            track_id: row.get("track_id"),
            direction: VoteDirection::from_str(row.get("direction")),
        })
    }

    async fn create_vote(&self, new_vote: NewVote) -> Result<i64> {
        // The unique constraint is the real guard; this check just produces a
        // friendlier conflict before we open a transaction.
        self.vote_by_user_and_track(&new_vote.user_id, &new_vote.track_id)
            .await
            .conflict_or_ok(
                "vote",
                "user_id:track_id",
                format!("{}:{}", new_vote.user_id, new_vote.track_id).as_str(),
            )?;

        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        query("INSERT INTO votes (id, user_id, track_id, direction) VALUES ($1, $2, $3, $4)")
            .bind(random_string(KEY_LENGTH))
            .bind(&new_vote.user_id)
            .bind(&new_vote.track_id)
            .bind(new_vote.direction.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                e.conflict_or_any(
                    "vote",
                    "user_id:track_id",
                    format!("{}:{}", new_vote.user_id, new_vote.track_id),
                )
            })?;

        // Only an upvote moves the counter. A downvote is recorded in the
        // ledger but has no decrement semantics.
        let count: i64 = if new_vote.direction == VoteDirection::Up {
            query_scalar(
                "UPDATE tracks SET up_votes = up_votes + 1, updated_at = now()
                 WHERE id = $1 RETURNING up_votes",
            )
            .bind(&new_vote.track_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| e.not_found_or("track", "id"))?
        } else {
            query_scalar("SELECT up_votes FROM tracks WHERE id = $1")
                .bind(&new_vote.track_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| e.not_found_or("track", "id"))?
        };

        tx.commit().await.map_err(|e| e.any())?;

        Ok(count)
    }
}

/// Helper to map unique constraint violations to conflicts
trait IntoConflictError {
    fn conflict_or_any(
        self,
        resource: &'static str,
        field: &'static str,
        value: String,
    ) -> DatabaseError;
}

impl IntoConflictError for SqlxError {
    fn conflict_or_any(
        self,
        resource: &'static str,
        field: &'static str,
        value: String,
    ) -> DatabaseError {
        let is_unique_violation = self
            .as_database_error()
            .map(|e| e.is_unique_violation())
            .unwrap_or(false);

        if is_unique_violation {
            DatabaseError::Conflict {
                resource,
                field,
                value,
            }
        } else {
            self.any()
        }
    }
}

impl IntoDatabaseError for SqlxError {
    fn any(self) -> DatabaseError {
        DatabaseError::Internal(Box::new(self))
    }

    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError {
        match self {
            SqlxError::RowNotFound => DatabaseError::NotFound {
                resource,
                identifier,
            },
            e => Self::any(e),
        }
    }
}
