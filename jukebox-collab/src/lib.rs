mod auth;
mod cache;
mod db;
mod events;
mod input;
mod ordering;
mod protocol;
mod rooms;
mod tracks;
mod util;
mod votes;

pub use auth::*;
pub use cache::{Cache, CacheError, MemoryCache};
pub use db::*;
pub use events::*;
pub use input::*;
pub use ordering::*;
pub use protocol::*;
pub use rooms::*;
pub use tracks::*;
pub use util::{random_string, Id};
pub use votes::*;

use std::sync::Arc;

/// The jukebox collab system. Owns the durable store, the queue cache, and
/// the room sessions that broadcast queue changes to connected clients.
pub struct Collab<Db, C> {
    pub database: Arc<Db>,
    pub cache: Arc<C>,
    pub rooms: RoomManager<Db, C>,
}

/// Passed around the components of the collab system to give access to the
/// store, the cache, the metadata resolver, and the connected clients.
pub struct CollabContext<Db, C> {
    pub database: Arc<Db>,
    pub cache: Arc<C>,
    pub resolver: Arc<dyn MetadataResolver>,
    pub connections: Arc<ConnectionRegistry>,
}

impl<Db, C> Collab<Db, C>
where
    Db: Database,
    C: Cache,
{
    pub fn new(database: Db, cache: C, resolver: Arc<dyn MetadataResolver>) -> Self {
        let database = Arc::new(database);
        let cache = Arc::new(cache);

        let context = CollabContext {
            database: database.clone(),
            cache: cache.clone(),
            resolver,
            connections: Default::default(),
        };

        Self {
            rooms: RoomManager::new(&context),
            database,
            cache,
        }
    }
}

impl<Db, C> CollabContext<Db, C> {
    /// Fans an event out to every connection currently joined to a room
    pub fn broadcast(&self, room_id: &str, event: RoomEvent) {
        self.connections.broadcast(room_id, event)
    }

    /// Sends an event to a single connection
    pub fn send_to(&self, connection_id: ConnectionId, event: RoomEvent) {
        self.connections.send_to(connection_id, event)
    }
}

impl<Db, C> Clone for CollabContext<Db, C> {
    fn clone(&self) -> Self {
        Self {
            database: self.database.clone(),
            cache: self.cache.clone(),
            resolver: self.resolver.clone(),
            connections: self.connections.clone(),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use tokio::sync::mpsc;

    use crate::{
        CollabContext, ConnectionId, EventReceiver, InputError, MemoryCache, MemoryDatabase,
        Metadata, MetadataResolver, RoomData, RoomEvent, RoomManager, TrackData, TrackLifecycle,
        VoteLedger,
    };

    /// Resolves known-catalog urls without touching the network
    pub struct StaticResolver;

    #[async_trait]
    impl MetadataResolver for StaticResolver {
        async fn resolve(&self, url: &str) -> Result<Metadata, InputError> {
            if url.contains("youtube.com") || url.contains("spotify.com") {
                Ok(Metadata {
                    title: "Mock Track".to_string(),
                    thumbnail: "https://img.example.com/mock.jpg".to_string(),
                })
            } else {
                Err(InputError::NoMatch)
            }
        }
    }

    pub fn context() -> CollabContext<MemoryDatabase, MemoryCache> {
        CollabContext {
            database: Arc::new(MemoryDatabase::new()),
            cache: Arc::new(MemoryCache::new()),
            resolver: Arc::new(StaticResolver),
            connections: Default::default(),
        }
    }

    /// A context with a seeded room and one connection joined to it
    pub async fn joined_context(
        room_id: &str,
        owner_id: &str,
    ) -> (CollabContext<MemoryDatabase, MemoryCache>, EventReceiver) {
        let context = context();
        context.database.insert_room(room(room_id, owner_id));

        let (_, receiver) = join(&context, room_id);
        (context, receiver)
    }

    /// Registers a connection and associates it with a room directly,
    /// bypassing the join handler
    pub fn join(
        context: &CollabContext<MemoryDatabase, MemoryCache>,
        room_id: &str,
    ) -> (ConnectionId, EventReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();

        let id = context.connections.register(sender);
        context.connections.associate(id, room_id);

        (id, receiver)
    }

    pub fn manager(
        context: &CollabContext<MemoryDatabase, MemoryCache>,
    ) -> RoomManager<MemoryDatabase, MemoryCache> {
        RoomManager::new(context)
    }

    pub fn lifecycle(
        context: &CollabContext<MemoryDatabase, MemoryCache>,
    ) -> TrackLifecycle<MemoryDatabase, MemoryCache> {
        TrackLifecycle::new(context)
    }

    pub fn ledger(
        context: &CollabContext<MemoryDatabase, MemoryCache>,
    ) -> VoteLedger<MemoryDatabase, MemoryCache> {
        VoteLedger::new(context)
    }

    pub fn room(id: &str, owner_id: &str) -> RoomData {
        RoomData {
            id: id.to_string(),
            name: format!("Room {id}"),
            owner_id: owner_id.to_string(),
        }
    }

    /// A track row whose timestamps lie the given amount of seconds in the
    /// past, so tests can control ordering
    pub fn track(id: &str, room_id: &str, up_votes: i64, seconds_ago: i64) -> TrackData {
        let at = Utc::now() - Duration::seconds(seconds_ago);

        TrackData {
            id: id.to_string(),
            room_id: room_id.to_string(),
            url: format!("https://youtube.com/watch?v={id}"),
            up_votes,
            created_at: at,
            updated_at: at,
        }
    }

    /// Drains every event currently sitting in a receiver
    pub fn unordered_events(receiver: &mut EventReceiver) -> Vec<RoomEvent> {
        std::iter::from_fn(|| receiver.try_recv().ok()).collect()
    }
}
