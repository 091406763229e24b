use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use log::{info, warn};
use tokio::{spawn, sync::mpsc};

use crate::{context::ServerContext, server::Router};

pub fn router() -> Router {
    Router::new().route("/gateway", get(gateway))
}

async fn gateway(State(context): State<ServerContext>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, context))
}

async fn handle_socket(socket: WebSocket, context: ServerContext) {
    let (mut outgoing, mut incoming) = socket.split();
    let (sender, mut receiver) = mpsc::unbounded_channel();

    let connection_id = context.collab.rooms.register(sender);
    info!("Connection {} opened", connection_id);

    // Serializes outbound room events onto the socket
    let writer = spawn(async move {
        while let Some(event) = receiver.recv().await {
            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Failed to serialize event: {}", e);
                    continue;
                }
            };

            if outgoing.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = incoming.next().await {
        let message = match message {
            Ok(message) => message,
            Err(_) => break,
        };

        match message {
            Message::Text(raw) => {
                // Each message is handled on its own task, so a slow catalog
                // lookup cannot stall the socket
                let collab = context.collab.clone();
                spawn(async move { collab.rooms.dispatch(connection_id, &raw).await });
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    context.collab.rooms.leave(connection_id);
    writer.abort();

    info!("Connection {} closed", connection_id);
}
