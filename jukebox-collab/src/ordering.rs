use crate::TrackData;

/// Orders a room's tracks for display and playback: most upvotes first,
/// ties broken by the earliest `updated_at` (first come, first served).
///
/// The cache queue only records insertion order; anything asking "what plays
/// next" must apply this instead of trusting the raw queue.
pub fn order_tracks(tracks: &mut [TrackData]) {
    tracks.sort_by(|a, b| {
        b.up_votes
            .cmp(&a.up_votes)
            .then(a.updated_at.cmp(&b.updated_at))
            .then(a.id.cmp(&b.id))
    });
}
