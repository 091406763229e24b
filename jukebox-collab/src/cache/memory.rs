use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::{Cache, CacheError, Result};

/// A process-local cache implementation backed by plain maps.
/// Stands in for the external list/counter cache the store mirrors into.
#[derive(Default)]
pub struct MemoryCache {
    queues: DashMap<String, Mutex<Vec<String>>>,
    counters: DashMap<String, i64>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn push_track(&self, room_id: &str, track_id: &str) -> Result<()> {
        self.queues
            .entry(room_id.to_string())
            .or_default()
            .lock()
            .push(track_id.to_string());

        Ok(())
    }

    async fn remove_track(&self, room_id: &str, track_id: &str) -> Result<()> {
        let removed = self
            .queues
            .get(room_id)
            .map(|queue| {
                let mut queue = queue.lock();
                let length_before = queue.len();

                queue.retain(|id| id != track_id);
                queue.len() != length_before
            })
            .unwrap_or(false);

        if !removed {
            return Err(CacheError::NotFound {
                resource: "queued track",
                identifier: track_id.to_string(),
            });
        }

        self.counters.remove(track_id);
        Ok(())
    }

    async fn queue(&self, room_id: &str) -> Result<Vec<String>> {
        Ok(self
            .queues
            .get(room_id)
            .map(|queue| queue.lock().clone())
            .unwrap_or_default())
    }

    async fn head(&self, room_id: &str) -> Result<Option<String>> {
        Ok(self
            .queues
            .get(room_id)
            .and_then(|queue| queue.lock().first().cloned()))
    }

    async fn counter(&self, track_id: &str) -> Result<Option<i64>> {
        Ok(self.counters.get(track_id).map(|c| *c))
    }

    async fn set_counter(&self, track_id: &str, value: i64) -> Result<()> {
        self.counters.insert(track_id.to_string(), value);
        Ok(())
    }

    async fn increment_counter(&self, track_id: &str, by: i64) -> Result<i64> {
        let mut counter = self.counters.entry(track_id.to_string()).or_insert(0);
        *counter += by;

        Ok(*counter)
    }

    async fn clear_room(&self, room_id: &str) -> Result<()> {
        if let Some((_, queue)) = self.queues.remove(room_id) {
            for track_id in queue.lock().iter() {
                self.counters.remove(track_id);
            }
        }

        Ok(())
    }
}
