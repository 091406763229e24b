use log::{error, info, warn};

use crate::{
    Cache, CollabContext, Database, DatabaseError, NewVote, RoomError, RoomEvent, VoteDirection,
};

/// Records votes, enforcing one vote per user per track. The store write is
/// the commit point; the cache counter is only touched after it succeeds.
pub struct VoteLedger<Db, C> {
    context: CollabContext<Db, C>,
}

impl<Db, C> VoteLedger<Db, C>
where
    Db: Database,
    C: Cache,
{
    pub fn new(context: &CollabContext<Db, C>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Handles a vote end to end, broadcasting the outcome to the room.
    /// A repeat vote by the same user is absorbed silently.
    pub async fn vote(
        &self,
        room_id: &str,
        track_id: &str,
        user_id: Option<&str>,
        direction: VoteDirection,
    ) {
        let user_id = match user_id.filter(|id| !id.is_empty()) {
            Some(id) => id,
            None => {
                warn!("Rejected anonymous vote for track {}", track_id);

                self.context.broadcast(
                    room_id,
                    RoomEvent::TrackVoteError {
                        track_id: track_id.to_string(),
                        message: RoomError::MissingVoter.to_string(),
                    },
                );

                return;
            }
        };

        // Defensive check; the store's unique constraint is the authority
        match self
            .context
            .database
            .vote_by_user_and_track(user_id, track_id)
            .await
        {
            Ok(_) => {
                info!("User {} already voted for track {}", user_id, track_id);
                return;
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                error!("Vote lookup for track {} failed: {}", track_id, e);
                self.broadcast_failure(room_id, track_id);
                return;
            }
        }

        let count = match self
            .context
            .database
            .create_vote(NewVote {
                user_id: user_id.to_string(),
                track_id: track_id.to_string(),
                direction,
            })
            .await
        {
            Ok(count) => count,
            // Two in-flight votes by the same user raced; the constraint
            // absorbed the second one.
            Err(DatabaseError::Conflict { .. }) => {
                info!("User {} already voted for track {}", user_id, track_id);
                return;
            }
            Err(e) => {
                error!("Recording vote for track {} failed: {}", track_id, e);
                self.broadcast_failure(room_id, track_id);
                return;
            }
        };

        if direction == VoteDirection::Up {
            // Cache drift here heals at the next join-time reconciliation
            if let Err(e) = self.context.cache.increment_counter(track_id, 1).await {
                warn!("Counter for track {} not incremented: {}", track_id, e);
            }
        }

        info!(
            "User {} voted for track {} in room {} ({} upvotes)",
            user_id, track_id, room_id, count
        );

        self.context.broadcast(
            room_id,
            RoomEvent::TrackVoted {
                track_id: track_id.to_string(),
                up_votes: count,
            },
        );
    }

    fn broadcast_failure(&self, room_id: &str, track_id: &str) {
        self.context.broadcast(
            room_id,
            RoomEvent::TrackVoteError {
                track_id: track_id.to_string(),
                message: "An error occurred while processing your vote".to_string(),
            },
        );
    }
}
