use std::net::{Ipv6Addr, SocketAddr};

use log::info;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::{context::ServerContext, ws};

pub type Router = axum::Router<ServerContext>;

/// Starts the jukebox server
pub async fn run_server(port: u16, context: ServerContext) {
    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let version_one_router = Router::new().merge(ws::router());

    let root_router = Router::new()
        .nest("/v1", version_one_router)
        .layer(cors)
        .with_state(context);

    let listener = TcpListener::bind(&addr).await.expect("listens on address");

    info!("Listening on port {}", port);

    axum::serve(listener, root_router.into_make_service())
        .await
        .expect("server runs");
}
