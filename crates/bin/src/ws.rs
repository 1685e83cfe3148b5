//! Per-connection WebSocket handling.

use crate::{AppState, ConnectionSlot};
use axum::{
    extract::{
        ConnectInfo, State,
        ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use protocol::ClientMessage;
use server::error::GameError;
use server::{Connection, GameHandle, Outbox};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::{Instant, interval_at};
use tracing::{debug, info, warn};

pub(crate) async fn websocket_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    let Some(slot) = state.admit() else {
        warn!("Refusing connection from {}: server full", addr);
        return (StatusCode::SERVICE_UNAVAILABLE, "Server is full").into_response();
    };
    ws.on_upgrade(move |socket| handle_socket(socket, addr, state, slot))
}

async fn handle_socket(socket: WebSocket, addr: SocketAddr, state: AppState, _slot: ConnectionSlot) {
    let handle = state.handle;
    let mut conn = handle.connect();
    let Some(outbound) = conn.take_outbound() else {
        return;
    };
    info!("Session {} connected from {}", conn.id(), addr);

    let (sink, mut stream) = socket.split();
    let mut writer = tokio::spawn(write_outbound(sink, outbound, state.ping_interval));

    loop {
        tokio::select! {
            frame = stream.next() => {
                let message = match frame {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => {
                        debug!("Session {} read error: {}", conn.id(), e);
                        break;
                    }
                    None => break,
                };
                match message {
                    Message::Text(text) => {
                        if let Err(e) = handle_text(&handle, &mut conn, text.as_str()).await {
                            warn!("Session {}: {}", conn.id(), e);
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    Message::Binary(_) => debug!("Session {} sent a binary frame", conn.id()),
                    Message::Ping(_) | Message::Pong(_) => {}
                }
            }
            // The writer stops when the session is evicted or the socket fails.
            _ = &mut writer => break,
        }
    }

    writer.abort();
    info!("Session {} disconnected", conn.id());
    if let Err(e) = handle.unregister(conn).await {
        warn!("Could not unregister session: {}", e);
    }
}

async fn handle_text(handle: &GameHandle, conn: &mut Connection, text: &str) -> Result<(), GameError> {
    match ClientMessage::parse(text) {
        Ok(ClientMessage::Register { name }) => {
            handle.register(conn, name).await?;
        }
        Ok(ClientMessage::PlayerUpdate(update)) => {
            if !handle.update_player(conn, &update).await {
                debug!("Session {} sent an update without a player", conn.id());
            }
        }
        Err(e) => debug!("Ignoring message from session {}: {}", conn.id(), e),
    }
    Ok(())
}

/// Drain the outbound buffer into the socket, pinging on an interval.
async fn write_outbound(
    mut sink: SplitSink<WebSocket, Message>,
    outbound: Outbox,
    ping_interval: Duration,
) {
    let mut ping = interval_at(Instant::now() + ping_interval, ping_interval);
    loop {
        tokio::select! {
            payload = outbound.recv() => {
                let Some(payload) = payload else {
                    let _ = sink.send(Message::Close(None)).await;
                    return;
                };
                let text = match Utf8Bytes::try_from(payload) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Dropping non-UTF-8 payload: {}", e);
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    return;
                }
            }
            _ = ping.tick() => {
                if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                    return;
                }
            }
        }
    }
}
