use std::sync::Arc;

use axum::extract::FromRef;
use jukebox_collab::{Collab, MemoryCache, PgDatabase};

pub type ServerCollab = Collab<PgDatabase, MemoryCache>;

#[derive(Clone, FromRef)]
pub struct ServerContext {
    pub collab: Arc<ServerCollab>,
}
