// src/connection.rs
//
// The Connection Accepter: performs the WebSocket upgrade handshake,
// extracts the room/user identity from the request, and hands a ready
// transport off to the hub. This is the only place `axum::extract::ws`
// types appear — everything downstream talks to the `FrameReader` /
// `FrameWriter` abstraction.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::Response;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use uuid::Uuid;

use crate::hub::{FrameReader, FrameWriter, Hub, ReadEvent, TransportError};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    #[serde(rename = "userId")]
    user_id: Option<String>,
    #[serde(rename = "displayName")]
    display_name: Option<String>,
}

pub async fn ws_room_handler(
    ws: WebSocketUpgrade,
    Path(room_id): Path<String>,
    Query(query): Query<ConnectQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let user_id = query
        .user_id
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("anon-{}", Uuid::new_v4()));
    let display_name = query.display_name.filter(|s| !s.is_empty()).unwrap_or_else(|| "Guest".to_string());

    ws.on_upgrade(move |socket| async move {
        let (sink, stream) = socket.split();
        let reader = AxumFrameReader(stream);
        let writer = AxumFrameWriter(sink);
        state.hub.handle_connection(writer, reader, room_id, user_id, display_name).await;
    })
}

// ─── axum WebSocket adapters ────────────────────────────────────────────────

struct AxumFrameReader(SplitStream<WebSocket>);

#[async_trait]
impl FrameReader for AxumFrameReader {
    async fn read_frame(&mut self) -> Result<ReadEvent, TransportError> {
        match self.0.next().await {
            Some(Ok(Message::Text(text))) => Ok(ReadEvent::Text(text)),
            Some(Ok(Message::Pong(_))) => Ok(ReadEvent::Pong),
            Some(Ok(Message::Close(_))) => Err(TransportError("peer sent close frame".into())),
            Some(Ok(_)) => Ok(ReadEvent::Ignored),
            Some(Err(e)) => Err(TransportError(e.to_string())),
            None => Err(TransportError("connection closed".into())),
        }
    }
}

struct AxumFrameWriter(SplitSink<WebSocket, Message>);

#[async_trait]
impl FrameWriter for AxumFrameWriter {
    async fn write_text(&mut self, text: &str) -> Result<(), TransportError> {
        self.0.send(Message::Text(text.to_string())).await.map_err(|e| TransportError(e.to_string()))
    }

    async fn write_ping(&mut self) -> Result<(), TransportError> {
        self.0.send(Message::Ping(Vec::new())).await.map_err(|e| TransportError(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let _ = self.0.send(Message::Close(None)).await;
        Ok(())
    }
}
