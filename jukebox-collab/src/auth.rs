use crate::{RoomData, RoomError};

/// The single ownership check every mutating handler goes through.
/// Only the room's designated owner may delete tracks or drive playback.
pub fn authorize_owner(room: &RoomData, user_id: &str) -> Result<(), RoomError> {
    if room.owner_id == user_id {
        Ok(())
    } else {
        Err(RoomError::Unauthorized)
    }
}
