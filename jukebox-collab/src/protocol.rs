use serde::Deserialize;

use crate::VoteDirection;

/// The message kinds the gateway understands. Anything else inbound is
/// logged and ignored without a reply.
pub const KNOWN_KINDS: [&str; 5] = [
    "JOIN_ROOM",
    "ADD_TRACK",
    "VOTE_TRACK",
    "DELETE_TRACK",
    "TRACK_ENDED",
];

/// Messages clients send over the gateway, as `{ "type": ..., "data": ... }`
/// envelopes mirroring [crate::RoomEvent]
#[derive(Debug, Clone, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    JoinRoom {
        room_id: String,
        user_id: String,
    },
    AddTrack {
        room_id: String,
        url: String,
    },
    VoteTrack {
        room_id: String,
        track_id: String,
        /// Absent for anonymous connections; the ledger rejects those votes
        user_id: Option<String>,
        #[serde(default)]
        direction: VoteDirection,
    },
    DeleteTrack {
        room_id: String,
        track_id: String,
        user_id: String,
    },
    TrackEnded {
        room_id: String,
        track_id: String,
    },
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn vote_direction_defaults_to_up() {
        let message: ClientMessage = serde_json::from_str(
            r#"{ "type": "VOTE_TRACK", "data": { "roomId": "r", "trackId": "t", "userId": "u" } }"#,
        )
        .unwrap();

        match message {
            ClientMessage::VoteTrack { direction, .. } => {
                assert_eq!(direction, VoteDirection::Up)
            }
            other => panic!("parsed as {other:?}"),
        }
    }

    #[test]
    fn missing_user_id_still_parses() {
        let message: ClientMessage = serde_json::from_str(
            r#"{ "type": "VOTE_TRACK", "data": { "roomId": "r", "trackId": "t" } }"#,
        )
        .unwrap();

        match message {
            ClientMessage::VoteTrack { user_id, .. } => assert_eq!(user_id, None),
            other => panic!("parsed as {other:?}"),
        }
    }
}
