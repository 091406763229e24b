use dashmap::DashMap;
use log::warn;
use tokio::sync::mpsc;

use crate::{events::RoomEvent, util::Id};

pub type ConnectionId = Id<Connection>;

pub type EventSender = mpsc::UnboundedSender<RoomEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<RoomEvent>;

/// A connected client and its outbound event channel
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    sender: EventSender,
}

impl Connection {
    fn new(sender: EventSender) -> Self {
        Self {
            id: ConnectionId::new(),
            sender,
        }
    }

    pub fn send(&self, event: RoomEvent) {
        // The receiving half closing just means the socket is gone; the
        // registry cleans the entry up on leave.
        if self.sender.send(event).is_err() {
            warn!("Dropped event for closed connection {}", self.id);
        }
    }
}

/// A thread-safe bidirectional index between connections and rooms, injected
/// into every handler. Membership here is the only state a disconnect tears
/// down.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Connection>,
    room_by_connection: DashMap<ConnectionId, String>,
    connections_by_room: DashMap<String, Vec<ConnectionId>>,
}

impl ConnectionRegistry {
    /// Registers a new connection around its outbound sender, before it has
    /// joined any room
    pub fn register(&self, sender: EventSender) -> ConnectionId {
        let connection = Connection::new(sender);
        let id = connection.id;

        self.connections.insert(id, connection);
        id
    }

    /// Removes a connection and its room membership, with no further side
    /// effects
    pub fn unregister(&self, id: ConnectionId) {
        self.connections.remove(&id);

        if let Some((_, room_id)) = self.room_by_connection.remove(&id) {
            if let Some(mut members) = self.connections_by_room.get_mut(&room_id) {
                members.retain(|member| *member != id);
            }
        }
    }

    /// Associates a connection with a room. A connection belongs to at most
    /// one room, so a re-join moves it.
    pub fn associate(&self, id: ConnectionId, room_id: &str) {
        if let Some((_, previous)) = self.room_by_connection.remove(&id) {
            if let Some(mut members) = self.connections_by_room.get_mut(&previous) {
                members.retain(|member| *member != id);
            }
        }

        self.room_by_connection.insert(id, room_id.to_string());
        self.connections_by_room
            .entry(room_id.to_string())
            .or_default()
            .push(id);
    }

    /// Returns the room a connection has joined, if any
    pub fn room_of(&self, id: ConnectionId) -> Option<String> {
        self.room_by_connection.get(&id).map(|room| room.clone())
    }

    /// Sends an event to a single connection
    pub fn send_to(&self, id: ConnectionId, event: RoomEvent) {
        if let Some(connection) = self.connections.get(&id) {
            connection.send(event)
        }
    }

    /// Fans an event out to every connection currently joined to a room
    pub fn broadcast(&self, room_id: &str, event: RoomEvent) {
        let members = self
            .connections_by_room
            .get(room_id)
            .map(|members| members.clone())
            .unwrap_or_default();

        for member in members {
            self.send_to(member, event.clone())
        }
    }
}
