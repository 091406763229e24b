use std::sync::Arc;

use colored::Colorize;
use jukebox_collab::{CatalogResolver, Collab, DatabaseError, MemoryCache, PgDatabase};
use log::{error, info};
use thiserror::Error;

use crate::{
    config::{Config, ConfigError},
    context::{ServerCollab, ServerContext},
};

mod config;
mod context;
mod logging;
mod server;
mod ws;

#[derive(Debug, Error)]
enum StartupError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Could not initialize database: {0}")]
    Database(#[from] DatabaseError),
}

impl StartupError {
    fn hint(&self) -> String {
        match self {
            StartupError::Config(_) => {
                "Check the environment the server is started with.".to_string()
            }
            StartupError::Database(_) => {
                "This is a database error. Make sure the Postgres instance is reachable at DATABASE_URL, then try again.".to_string()
            }
        }
    }
}

async fn init() -> Result<(Config, Arc<ServerCollab>), StartupError> {
    let config = Config::from_env()?;

    info!("Connecting to database...");
    let database = PgDatabase::new(&config.database_url).await?;

    let collab = Collab::new(database, MemoryCache::new(), Arc::new(CatalogResolver));

    Ok((config, Arc::new(collab)))
}

#[tokio::main]
async fn main() {
    logging::init_logger();

    match init().await {
        Ok((config, collab)) => {
            info!("Initialized successfully.");
            server::run_server(config.port, ServerContext { collab }).await;
        }
        Err(error) => {
            error!(
                "{} Read the error below to troubleshoot the issue.",
                "The jukebox server failed to start!".bold().red()
            );
            error!("{}", error);
            error!("{}", format!("Hint: {}", error.hint()).dimmed().italic());
        }
    }
}
