mod connection;
pub use connection::*;

use log::{error, info, warn};
use serde_json::Value;
use thiserror::Error;

use crate::{
    auth::authorize_owner, order_tracks, Cache, CacheError, ClientMessage, CollabContext,
    Database, DatabaseError, Metadata, QueuedTrack, RoomEvent, TrackLifecycle, VoteLedger,
    KNOWN_KINDS,
};

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("Room {0} was not found")]
    RoomNotFound(String),
    #[error("Track url was not recognized: {0}")]
    InvalidTrack(String),
    #[error("Only the room owner may modify the queue")]
    Unauthorized,
    #[error("A user id is required to vote")]
    MissingVoter,
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Tracks which connections belong to which room, dispatches inbound
/// messages to the handlers, and is the single fan-out point for outbound
/// events.
pub struct RoomManager<Db, C> {
    context: CollabContext<Db, C>,
    tracks: TrackLifecycle<Db, C>,
    votes: VoteLedger<Db, C>,
}

impl<Db, C> RoomManager<Db, C>
where
    Db: Database,
    C: Cache,
{
    pub fn new(context: &CollabContext<Db, C>) -> Self {
        Self {
            tracks: TrackLifecycle::new(context),
            votes: VoteLedger::new(context),
            context: context.clone(),
        }
    }

    /// Registers a new connection around its outbound sender
    pub fn register(&self, sender: EventSender) -> ConnectionId {
        self.context.connections.register(sender)
    }

    /// Removes a disconnected connection's membership. Nothing else is torn
    /// down; in-flight mutations complete and broadcast to whoever remains.
    pub fn leave(&self, connection_id: ConnectionId) {
        self.context.connections.unregister(connection_id);
        info!("Connection {} left", connection_id);
    }

    /// Routes one raw inbound message. Malformed payloads get an error reply;
    /// unknown kinds are logged and ignored.
    pub async fn dispatch(&self, connection_id: ConnectionId, raw: &str) {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                warn!("Malformed message from connection {}: {}", connection_id, e);

                self.context.send_to(
                    connection_id,
                    RoomEvent::Error {
                        message: "Malformed message".to_string(),
                    },
                );

                return;
            }
        };

        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if !KNOWN_KINDS.contains(&kind.as_str()) {
            warn!(
                "Ignoring unknown message kind {:?} from connection {}",
                kind, connection_id
            );
            return;
        }

        let message: ClientMessage = match serde_json::from_value(value) {
            Ok(message) => message,
            Err(e) => {
                warn!("Invalid {} message from connection {}: {}", kind, connection_id, e);

                self.context.send_to(
                    connection_id,
                    RoomEvent::Error {
                        message: format!("Invalid {kind} message"),
                    },
                );

                return;
            }
        };

        match message {
            ClientMessage::JoinRoom { room_id, user_id } => {
                self.join(connection_id, &room_id, &user_id).await
            }
            ClientMessage::AddTrack { room_id, url } => {
                if let Err(e) = self.tracks.add(&room_id, &url).await {
                    self.report(connection_id, e)
                }
            }
            ClientMessage::VoteTrack {
                room_id,
                track_id,
                user_id,
                direction,
            } => {
                self.votes
                    .vote(&room_id, &track_id, user_id.as_deref(), direction)
                    .await
            }
            ClientMessage::DeleteTrack {
                room_id,
                track_id,
                user_id,
            } => {
                if let Err(e) = self.tracks.delete(&room_id, &track_id, &user_id).await {
                    self.report(connection_id, e)
                }
            }
            ClientMessage::TrackEnded { room_id, track_id } => {
                if let Err(e) = self.tracks.advance(&room_id, &track_id).await {
                    self.report(connection_id, e)
                }
            }
        }
    }

    /// Joins a connection to a room and replies with the current state of
    /// its queue. Reads the store and corrects the cache, never the reverse.
    pub async fn join(&self, connection_id: ConnectionId, room_id: &str, user_id: &str) {
        let room = match self.context.database.room_by_id(room_id).await {
            Ok(room) => room,
            Err(e) => {
                let message = if e.is_not_found() {
                    "Room not found".to_string()
                } else {
                    error!("Room lookup for {} failed: {}", room_id, e);
                    "Failed to join room".to_string()
                };

                self.context
                    .send_to(connection_id, RoomEvent::Error { message });
                return;
            }
        };

        self.context.connections.associate(connection_id, room_id);

        let is_owner = authorize_owner(&room, user_id).is_ok();

        let tracks = match self.queue_snapshot(room_id).await {
            Ok(tracks) => tracks,
            Err(e) => {
                error!("Reading the queue of room {} failed: {}", room_id, e);

                self.context.send_to(
                    connection_id,
                    RoomEvent::Error {
                        message: "Failed to join room".to_string(),
                    },
                );

                return;
            }
        };

        info!("User {} joined room {}", user_id, room_id);

        self.context.send_to(
            connection_id,
            RoomEvent::RoomJoined {
                room_id: room_id.to_string(),
                user_id: user_id.to_string(),
                is_owner,
                room,
                tracks,
            },
        );
    }

    /// Builds the ordered, metadata-enriched view of a room's queue,
    /// reconciling cache counters against the store along the way.
    async fn queue_snapshot(&self, room_id: &str) -> Result<Vec<QueuedTrack>, RoomError> {
        let mut ids = self.context.cache.queue(room_id).await?;

        if ids.is_empty() {
            // The projection may simply be cold
            let rows = self.tracks.rebuild_from_store(room_id).await?;
            ids = rows.into_iter().map(|track| track.id).collect();
        }

        let mut rows = Vec::with_capacity(ids.len());

        for id in ids {
            let track = match self.context.database.track_by_id(&id).await {
                Ok(track) => track,
                Err(e) if e.is_not_found() => {
                    warn!("Dropping queued track {} with no store row", id);

                    match self.context.cache.remove_track(room_id, &id).await {
                        Ok(()) | Err(CacheError::NotFound { .. }) => continue,
                        Err(e) => return Err(e.into()),
                    }
                }
                Err(e) => return Err(e.into()),
            };

            // The cache is advisory; wherever its counter disagrees with the
            // store, the store wins and the cache is corrected in place.
            let counter = self.context.cache.counter(&track.id).await?;
            if counter != Some(track.up_votes) {
                warn!(
                    "Correcting cached counter for track {} ({:?} -> {})",
                    track.id, counter, track.up_votes
                );

                self.context
                    .cache
                    .set_counter(&track.id, track.up_votes)
                    .await?;
            }

            rows.push(track);
        }

        order_tracks(&mut rows);

        let mut queued = Vec::with_capacity(rows.len());

        for track in rows {
            let metadata = match self.context.resolver.resolve(&track.url).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    // A catalog outage must not hide queued tracks
                    warn!("Metadata for track {} unavailable: {}", track.id, e);

                    Metadata {
                        title: "Unknown Title".to_string(),
                        thumbnail: String::new(),
                    }
                }
            };

            queued.push(QueuedTrack::new(track, metadata));
        }

        Ok(queued)
    }

    /// Reports a handler failure back to the connection that caused it.
    /// Validation failures carry their own message; internal failures are
    /// logged and reported generically.
    fn report(&self, connection_id: ConnectionId, error: RoomError) {
        let message = match &error {
            RoomError::Database(_) | RoomError::Cache(_) => {
                error!("Handler failed: {}", error);
                "Message processing failed".to_string()
            }
            other => other.to_string(),
        };

        self.context
            .send_to(connection_id, RoomEvent::Error { message });
    }
}

#[cfg(test)]
mod test {
    use tokio::sync::mpsc;

    use crate::testing::{self, track};
    use crate::{Cache, RoomEvent};

    #[tokio::test]
    async fn joining_an_unknown_room_registers_nothing() {
        let context = testing::context();
        let manager = testing::manager(&context);

        let (sender, mut rx) = mpsc::unbounded_channel();
        let connection = manager.register(sender);

        manager.join(connection, "nowhere", "alice").await;

        match rx.try_recv().unwrap() {
            RoomEvent::Error { message } => assert_eq!(message, "Room not found"),
            other => panic!("got {other:?}"),
        }

        assert_eq!(context.connections.room_of(connection), None);
    }

    #[tokio::test]
    async fn join_orders_the_queue_and_reconciles_counters() {
        let context = testing::context();
        let manager = testing::manager(&context);

        context.database.insert_room(testing::room("room", "alice"));
        context.database.insert_track(track("a", "room", 2, 30));
        context.database.insert_track(track("b", "room", 2, 20));
        context.database.insert_track(track("c", "room", 5, 10));

        for id in ["a", "b", "c"] {
            context.cache.push_track("room", id).await.unwrap();
        }

        context.cache.set_counter("a", 2).await.unwrap();
        // A stale counter the store should win over
        context.cache.set_counter("b", 7).await.unwrap();
        context.cache.set_counter("c", 5).await.unwrap();

        let (sender, mut rx) = mpsc::unbounded_channel();
        let connection = manager.register(sender);

        manager.join(connection, "room", "bob").await;

        match rx.try_recv().unwrap() {
            RoomEvent::RoomJoined {
                is_owner, tracks, ..
            } => {
                assert!(!is_owner);

                let ids: Vec<_> = tracks.iter().map(|t| t.track.id.as_str()).collect();
                assert_eq!(ids, vec!["c", "a", "b"]);
                assert!(tracks.iter().all(|t| t.title == "Mock Track"));
            }
            other => panic!("got {other:?}"),
        }

        assert_eq!(context.cache.counter("b").await.unwrap(), Some(2));
        assert_eq!(
            context.connections.room_of(connection),
            Some("room".to_string())
        );
    }

    #[tokio::test]
    async fn join_rebuilds_a_cold_cache() {
        let context = testing::context();
        let manager = testing::manager(&context);

        context.database.insert_room(testing::room("room", "alice"));
        context.database.insert_track(track("t1", "room", 1, 10));

        let (sender, mut rx) = mpsc::unbounded_channel();
        let connection = manager.register(sender);

        manager.join(connection, "room", "alice").await;

        match rx.try_recv().unwrap() {
            RoomEvent::RoomJoined {
                is_owner, tracks, ..
            } => {
                assert!(is_owner);
                assert_eq!(tracks.len(), 1);
            }
            other => panic!("got {other:?}"),
        }

        assert_eq!(
            context.cache.queue("room").await.unwrap(),
            vec!["t1".to_string()]
        );
    }

    #[tokio::test]
    async fn malformed_messages_get_an_error_reply() {
        let context = testing::context();
        let manager = testing::manager(&context);

        let (sender, mut rx) = mpsc::unbounded_channel();
        let connection = manager.register(sender);

        manager.dispatch(connection, "not json at all").await;

        assert!(matches!(
            rx.try_recv().unwrap(),
            RoomEvent::Error { .. }
        ));
    }

    #[tokio::test]
    async fn unknown_kinds_are_ignored_without_a_reply() {
        let context = testing::context();
        let manager = testing::manager(&context);

        let (sender, mut rx) = mpsc::unbounded_channel();
        let connection = manager.register(sender);

        manager
            .dispatch(connection, r#"{ "type": "DANCE", "data": {} }"#)
            .await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn known_kinds_with_bad_fields_get_an_error_reply() {
        let context = testing::context();
        let manager = testing::manager(&context);

        let (sender, mut rx) = mpsc::unbounded_channel();
        let connection = manager.register(sender);

        manager
            .dispatch(connection, r#"{ "type": "ADD_TRACK", "data": {} }"#)
            .await;

        match rx.try_recv().unwrap() {
            RoomEvent::Error { message } => assert!(message.contains("ADD_TRACK")),
            other => panic!("got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dispatch_routes_a_full_vote_round_trip() {
        let context = testing::context();
        let manager = testing::manager(&context);

        context.database.insert_room(testing::room("room", "alice"));
        context.database.insert_track(track("t1", "room", 0, 0));
        context.cache.push_track("room", "t1").await.unwrap();

        let (sender, mut rx) = mpsc::unbounded_channel();
        let connection = manager.register(sender);

        manager
            .dispatch(
                connection,
                r#"{ "type": "JOIN_ROOM", "data": { "roomId": "room", "userId": "u1" } }"#,
            )
            .await;
        assert!(matches!(
            rx.try_recv().unwrap(),
            RoomEvent::RoomJoined { .. }
        ));

        manager
            .dispatch(
                connection,
                r#"{ "type": "VOTE_TRACK", "data": { "roomId": "room", "trackId": "t1", "userId": "u1" } }"#,
            )
            .await;

        match rx.try_recv().unwrap() {
            RoomEvent::TrackVoted { track_id, up_votes } => {
                assert_eq!(track_id, "t1");
                assert_eq!(up_votes, 1);
            }
            other => panic!("got {other:?}"),
        }
    }

    #[tokio::test]
    async fn a_left_connection_receives_no_broadcasts() {
        let context = testing::context();
        let manager = testing::manager(&context);

        context.database.insert_room(testing::room("room", "alice"));

        let (_staying, mut staying_rx) = testing::join(&context, "room");
        let (leaving, mut leaving_rx) = testing::join(&context, "room");

        manager.leave(leaving);
        context.broadcast("room", RoomEvent::NoMoreTracks);

        assert!(matches!(
            staying_rx.try_recv().unwrap(),
            RoomEvent::NoMoreTracks
        ));
        assert!(leaving_rx.try_recv().is_err());
    }
}
