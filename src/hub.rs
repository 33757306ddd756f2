// src/hub.rs
//
// The signaling hub: the concurrent core of this crate. Owns the
// authoritative in-memory `room -> {userId -> Client}` index, serializes
// every mutation of that index through a single hub task, and drives the
// per-connection reader/writer task pair.
//
// The hub is generic over a small transport abstraction (`FrameReader` /
// `FrameWriter`) rather than tied to `axum::extract::ws::WebSocket`
// directly, so the concurrency logic here can be exercised against an
// in-memory mock transport. Production wiring lives in `connection.rs`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::frame;
use crate::model::SignalMessage;
use crate::usecase::RoomUseCase;

// ─── Transport abstraction ──────────────────────────────────────────────────

/// A frame (or heartbeat signal) read off the wire.
#[derive(Debug)]
pub enum ReadEvent {
    Text(String),
    Pong,
    /// Binary or other non-text frames are ignored per the reader contract.
    Ignored,
}

/// Transport-level failure: read/write error or deadline expiry. Never
/// surfaced to the peer directly — it always triggers unregister.
#[derive(Debug)]
pub struct TransportError(pub String);

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for TransportError {}

#[async_trait]
pub trait FrameReader: Send {
    async fn read_frame(&mut self) -> Result<ReadEvent, TransportError>;
}

#[async_trait]
pub trait FrameWriter: Send {
    async fn write_text(&mut self, text: &str) -> Result<(), TransportError>;
    async fn write_ping(&mut self) -> Result<(), TransportError>;
    async fn close(&mut self) -> Result<(), TransportError>;
}

// ─── Client state ───────────────────────────────────────────────────────────

enum Outbound {
    Frame(SignalMessage),
    Close,
}

/// A connected peer, as tracked by the hub's in-memory index. Destroyed
/// when unregistered.
struct ClientHandle {
    user_id: String,
    room_id: String,
    display_name: String,
    tx: mpsc::Sender<Outbound>,
    closed: Arc<AtomicBool>,
}

impl ClientHandle {
    /// Non-blocking enqueue. Returns `false` (and does not panic or block)
    /// when the queue is full or already closed — the caller skips a slow
    /// or departed peer rather than stalling the room.
    fn try_send(&self, msg: SignalMessage) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        self.tx.try_send(Outbound::Frame(msg)).is_ok()
    }

    /// Race-safe, idempotent queue close: a closed-sentinel drain pattern
    /// rather than relying solely on the channel's own drop-closes
    /// semantics, so a send racing with close never panics or is silently
    /// lost ahead of the close.
    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.tx.try_send(Outbound::Close);
        }
    }
}

// ─── Hub commands ───────────────────────────────────────────────────────────

struct UnregisterCmd {
    room_id: String,
    user_id: String,
    /// Whether the reader task already cleared this user as the room's
    /// screen sharer before submitting this command — decides whether the
    /// hub task fans out a `screen-share` off frame.
    screen_share_cleared: bool,
}

struct BroadcastCmd {
    room_id: String,
    message: SignalMessage,
    exclude: Option<String>,
}

type RoomIndex = RwLock<HashMap<String, HashMap<String, ClientHandle>>>;

// ─── Hub ─────────────────────────────────────────────────────────────────────

/// The signaling hub. Cheap to clone (interior `Arc`); the constructor
/// spawns the single serializing hub task and returns a handle to it.
pub struct Hub {
    rooms: Arc<RoomIndex>,
    register_tx: mpsc::Sender<ClientHandle>,
    unregister_tx: mpsc::Sender<UnregisterCmd>,
    broadcast_tx: mpsc::Sender<BroadcastCmd>,
    usecase: Arc<RoomUseCase>,
    config: Arc<Config>,
}

impl Hub {
    pub fn spawn(usecase: Arc<RoomUseCase>, config: Arc<Config>) -> Arc<Hub> {
        let rooms: Arc<RoomIndex> = Arc::new(RwLock::new(HashMap::new()));
        let cap = config.broadcast_channel_capacity;
        let (register_tx, register_rx) = mpsc::channel(cap);
        let (unregister_tx, unregister_rx) = mpsc::channel(cap);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(cap);

        let hub = Arc::new(Hub {
            rooms: rooms.clone(),
            register_tx,
            unregister_tx,
            broadcast_tx,
            usecase: usecase.clone(),
            config,
        });

        tokio::spawn(run_hub_task(rooms, register_rx, unregister_rx, broadcast_rx));

        hub
    }

    pub fn room_count(&self) -> usize {
        self.rooms.read().unwrap().len()
    }

    pub fn client_count(&self) -> usize {
        self.rooms.read().unwrap().values().map(|r| r.len()).sum()
    }

    /// Accept a connection end to end: join the room via the use-case,
    /// register the client, spawn its writer task, and run its reader task
    /// to completion on the calling task.
    pub async fn handle_connection<R, W>(
        self: &Arc<Self>,
        mut writer: W,
        reader: R,
        room_id: String,
        user_id: String,
        display_name: String,
    ) where
        R: FrameReader + 'static,
        W: FrameWriter + 'static,
    {
        if let Err(e) = self.usecase.join_room(&room_id, &user_id, &display_name).await {
            tracing::info!(%room_id, %user_id, error = %e, "join rejected after upgrade");
            let _ = writer
                .write_text(&frame::join_error_frame("Failed to join room").to_string())
                .await;
            let _ = writer.close().await;
            return;
        }

        let (tx, rx) = mpsc::channel(self.config.client_queue_capacity);
        let client = ClientHandle {
            user_id: user_id.clone(),
            room_id: room_id.clone(),
            display_name: display_name.clone(),
            tx,
            closed: Arc::new(AtomicBool::new(false)),
        };

        if self.register_tx.send(client).await.is_err() {
            tracing::warn!(%room_id, %user_id, "hub is shutting down, dropping connection");
            let _ = writer.close().await;
            return;
        }

        tokio::spawn(run_writer(
            writer,
            rx,
            Duration::from_secs(self.config.write_deadline_secs),
            Duration::from_secs(self.config.heartbeat_interval_secs),
        ));

        run_reader(
            self.clone(),
            reader,
            room_id,
            user_id,
            display_name,
            Duration::from_secs(self.config.read_deadline_secs),
        )
        .await;
    }
}

// ─── Hub task: the single serializer ───────────────────────────────────────

async fn run_hub_task(
    rooms: Arc<RoomIndex>,
    mut register_rx: mpsc::Receiver<ClientHandle>,
    mut unregister_rx: mpsc::Receiver<UnregisterCmd>,
    mut broadcast_rx: mpsc::Receiver<BroadcastCmd>,
) {
    // This task's only suspension point is this select — every arm below
    // is synchronous index/queue bookkeeping. Anything that needs to await
    // a registry or use-case call is resolved by the caller (the reader
    // task) before the command reaches this channel, so a slow registry
    // never head-of-line-blocks register/unregister/broadcast for every
    // other room.
    loop {
        tokio::select! {
            maybe = register_rx.recv() => {
                match maybe {
                    Some(client) => handle_register(&rooms, client),
                    None => break,
                }
            }
            maybe = unregister_rx.recv() => {
                match maybe {
                    Some(cmd) => handle_unregister(&rooms, cmd),
                    None => break,
                }
            }
            maybe = broadcast_rx.recv() => {
                match maybe {
                    Some(cmd) => broadcast(&rooms, &cmd.room_id, cmd.message, cmd.exclude.as_deref()),
                    None => break,
                }
            }
        }
    }

    // Shutdown: close every outbound queue and clear the index.
    let mut guard = rooms.write().unwrap();
    for room in guard.values() {
        for client in room.values() {
            client.close();
        }
    }
    guard.clear();
}

fn handle_register(rooms: &RoomIndex, client: ClientHandle) {
    let room_id = client.room_id.clone();
    let user_id = client.user_id.clone();
    let display_name = client.display_name.clone();

    let prior = {
        let mut guard = rooms.write().unwrap();
        guard.entry(room_id.clone()).or_default().insert(user_id.clone(), client)
    };
    // A re-registering userId supersedes the prior handle; the superseded
    // entry's writer observes its queue closed and terminates.
    if let Some(prior) = prior {
        prior.close();
    }

    broadcast(
        rooms,
        &room_id,
        frame::peer_joined(&room_id, &user_id, &display_name),
        Some(&user_id),
    );
}

/// Synchronous: the registry/use-case cleanup (screen-share release,
/// `leave_room`) already happened in the reader task before this command
/// was sent. This only touches the in-memory index and the outbound
/// queues it owns.
fn handle_unregister(rooms: &RoomIndex, cmd: UnregisterCmd) {
    let UnregisterCmd { room_id, user_id, screen_share_cleared } = cmd;

    let client = {
        let mut guard = rooms.write().unwrap();
        let client = guard.get_mut(&room_id).and_then(|room| room.remove(&user_id));
        if guard.get(&room_id).is_some_and(|room| room.is_empty()) {
            guard.remove(&room_id);
        }
        client
    };

    let Some(client) = client else {
        // Absent from the hub index: no-op, matching the registration
        // contract that a superseded or already-departed client has
        // nothing left to clean up.
        return;
    };
    client.close();

    if screen_share_cleared {
        broadcast(rooms, &room_id, frame::screen_share_state(&room_id, false), None);
    }

    broadcast(rooms, &room_id, frame::peer_left(&room_id, &user_id), None);
}

/// Fan out `message` to every client in `room_id` except `exclude`. A slow
/// or departed peer is skipped, never evicted, by this path — eviction
/// happens later via read-deadline expiry or a write error.
fn broadcast(rooms: &RoomIndex, room_id: &str, message: SignalMessage, exclude: Option<&str>) {
    let guard = rooms.read().unwrap();
    let Some(room) = guard.get(room_id) else { return };
    for (user_id, client) in room.iter() {
        if Some(user_id.as_str()) == exclude {
            continue;
        }
        if !client.try_send(message.clone()) {
            tracing::debug!(room_id, user_id, "broadcast dropped: queue full or client closed");
        }
    }
}

// ─── Reader task ────────────────────────────────────────────────────────────

async fn run_reader<R: FrameReader>(
    hub: Arc<Hub>,
    mut reader: R,
    room_id: String,
    user_id: String,
    display_name: String,
    read_deadline: Duration,
) {
    loop {
        let outcome = tokio::time::timeout(read_deadline, reader.read_frame()).await;
        match outcome {
            Err(_) => {
                tracing::debug!(%room_id, %user_id, "read deadline expired");
                break;
            }
            Ok(Err(e)) => {
                tracing::debug!(%room_id, %user_id, error = %e, "transport read error");
                break;
            }
            Ok(Ok(ReadEvent::Pong)) => continue,
            Ok(Ok(ReadEvent::Ignored)) => continue,
            Ok(Ok(ReadEvent::Text(text))) => {
                let mut msg: SignalMessage = match serde_json::from_str(&text) {
                    Ok(msg) => msg,
                    Err(e) => {
                        tracing::warn!(%room_id, %user_id, error = %e, "malformed signal frame, skipping");
                        continue;
                    }
                };
                // Prevent spoofing: the server is the sole authority on
                // who sent what, from where.
                msg.from = user_id.clone();
                msg.room_id = room_id.clone();

                if dispatch(&hub, &room_id, &user_id, &display_name, msg).await {
                    break;
                }
            }
        }
    }

    let screen_share_cleared = clear_screen_share_on_departure(&hub.usecase, &room_id, &user_id).await;

    if let Err(e) = hub.usecase.leave_room(&room_id, &user_id).await {
        tracing::warn!(%room_id, %user_id, error = %e, "leave_room failed during unregister");
    }

    let _ = hub
        .unregister_tx
        .send(UnregisterCmd { room_id, user_id, screen_share_cleared })
        .await;
}

/// Releases `user_id`'s screen-share hold, if any, before the connection's
/// unregister command reaches the hub task. Run here (on the per-connection
/// reader task) rather than in the hub task itself, so a slow registry call
/// only stalls this one connection's teardown instead of every room's
/// register/unregister/broadcast processing.
async fn clear_screen_share_on_departure(usecase: &Arc<RoomUseCase>, room_id: &str, user_id: &str) -> bool {
    match usecase.get_screen_sharer(room_id).await {
        Ok(Some(holder)) if holder == user_id => match usecase.stop_screen_share(room_id, user_id).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(%room_id, %user_id, error = %e, "failed to clear screen share on disconnect");
                false
            }
        },
        Ok(_) => false,
        Err(e) => {
            tracing::warn!(%room_id, error = %e, "registry error checking screen sharer during unregister");
            false
        }
    }
}

/// Returns `true` when the connection should close (a `leave` frame).
async fn dispatch(
    hub: &Arc<Hub>,
    room_id: &str,
    user_id: &str,
    display_name: &str,
    msg: SignalMessage,
) -> bool {
    match msg.kind.as_str() {
        frame::TYPE_OFFER | frame::TYPE_ANSWER | frame::TYPE_ICE => {
            forward_to_peer(hub, room_id, msg).await;
            false
        }
        frame::TYPE_SCREEN_SHARE => {
            handle_screen_share(hub, room_id, user_id, msg).await;
            false
        }
        frame::TYPE_PING => {
            handle_ping(hub, room_id, user_id);
            false
        }
        frame::TYPE_CHAT => {
            handle_chat(hub, room_id, user_id, display_name, msg).await;
            false
        }
        frame::TYPE_MEDIA_STATE => {
            handle_media_state(hub, room_id, user_id, msg).await;
            false
        }
        frame::TYPE_LEAVE => true,
        _ => {
            let _ = hub
                .broadcast_tx
                .send(BroadcastCmd {
                    room_id: room_id.to_string(),
                    message: msg,
                    exclude: Some(user_id.to_string()),
                })
                .await;
            false
        }
    }
}

/// Unicast when `to` is set; otherwise a room broadcast excluding the
/// sender. The unicast lookup/enqueue is non-blocking; the broadcast
/// enqueue is an awaited send to the hub's single serializer.
async fn forward_to_peer(hub: &Arc<Hub>, room_id: &str, msg: SignalMessage) {
    if let Some(to) = msg.to.clone() {
        let delivered = {
            let guard = hub.rooms.read().unwrap();
            guard
                .get(room_id)
                .and_then(|room| room.get(&to))
                .map(|client| client.try_send(msg.clone()))
                .unwrap_or(false)
        };
        if !delivered {
            tracing::debug!(room_id, to, "forward-to-peer dropped: target missing or queue full");
        }
    } else {
        let exclude = msg.from.clone();
        let _ = hub
            .broadcast_tx
            .send(BroadcastCmd {
                room_id: room_id.to_string(),
                message: msg,
                exclude: Some(exclude),
            })
            .await;
    }
}

fn handle_ping(hub: &Arc<Hub>, room_id: &str, user_id: &str) {
    let guard = hub.rooms.read().unwrap();
    if let Some(client) = guard.get(room_id).and_then(|room| room.get(user_id)) {
        client.try_send(frame::pong(room_id));
    }
}

/// Runs the use-case's screen-share check first, per the resolved
/// ambiguity in the design notes. A start conflict is reported directly
/// to the initiator (bypassing the hub task); a stop failure is silent.
async fn handle_screen_share(hub: &Arc<Hub>, room_id: &str, user_id: &str, msg: SignalMessage) {
    let is_sharing = msg
        .data
        .as_ref()
        .and_then(|d| d.get("isSharing"))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    if is_sharing {
        match hub.usecase.start_screen_share(room_id, user_id).await {
            Ok(()) => {
                let _ = hub
                    .broadcast_tx
                    .send(BroadcastCmd {
                        room_id: room_id.to_string(),
                        message: frame::screen_share_state(room_id, true),
                        exclude: None,
                    })
                    .await;
            }
            Err(e) => {
                let guard = hub.rooms.read().unwrap();
                if let Some(client) = guard.get(room_id).and_then(|room| room.get(user_id)) {
                    client.try_send(frame::screen_share_error(room_id, e.message()));
                }
            }
        }
    } else {
        match hub.usecase.stop_screen_share(room_id, user_id).await {
            Ok(()) => {
                let _ = hub
                    .broadcast_tx
                    .send(BroadcastCmd {
                        room_id: room_id.to_string(),
                        message: frame::screen_share_state(room_id, false),
                        exclude: None,
                    })
                    .await;
            }
            Err(e) => {
                tracing::debug!(room_id, user_id, error = %e, "stop-screen-share failed, not surfaced to caller");
            }
        }
    }
}

async fn handle_chat(hub: &Arc<Hub>, room_id: &str, user_id: &str, fallback_name: &str, msg: SignalMessage) {
    let user_name = match hub.usecase.get_participants(room_id).await {
        Ok(participants) => participants
            .into_iter()
            .find(|p| p.user_id == user_id)
            .map(|p| p.display_name)
            .unwrap_or_else(|| fallback_name.to_string()),
        Err(_) => fallback_name.to_string(),
    };

    let text = msg
        .data
        .as_ref()
        .and_then(|d| d.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    if let Err(e) = hub
        .usecase
        .send_chat_message(room_id, user_id, &user_name, text)
        .await
    {
        tracing::warn!(room_id, user_id, error = %e, "failed to persist chat message");
    }

    let mut augmented = msg.data.clone().unwrap_or_else(|| json!({}));
    if let Value::Object(ref mut map) = augmented {
        map.insert("userName".to_string(), json!(user_name));
    }
    let mut out = msg;
    out.data = Some(augmented);

    // Echo-back semantics: broadcast to the whole room, sender included.
    let _ = hub
        .broadcast_tx
        .send(BroadcastCmd {
            room_id: room_id.to_string(),
            message: out,
            exclude: None,
        })
        .await;
}

async fn handle_media_state(hub: &Arc<Hub>, room_id: &str, user_id: &str, msg: SignalMessage) {
    if let Ok(participants) = hub.usecase.get_participants(room_id).await {
        if let Some(mut participant) = participants.into_iter().find(|p| p.user_id == user_id) {
            if let Some(data) = &msg.data {
                if let Some(m) = data.get("isMuted").and_then(Value::as_bool) {
                    participant.is_muted = m;
                }
                if let Some(v) = data.get("isVideoOff").and_then(Value::as_bool) {
                    participant.is_video_off = v;
                }
            }
            let _ = hub.usecase.update_participant_state(participant).await;
        }
    }

    let _ = hub
        .broadcast_tx
        .send(BroadcastCmd {
            room_id: room_id.to_string(),
            message: msg,
            exclude: Some(user_id.to_string()),
        })
        .await;
}

// ─── Writer task ────────────────────────────────────────────────────────────

async fn run_writer<W: FrameWriter>(
    mut writer: W,
    mut rx: mpsc::Receiver<Outbound>,
    write_deadline: Duration,
    heartbeat_interval: Duration,
) {
    let mut heartbeat = tokio::time::interval(heartbeat_interval);
    heartbeat.tick().await; // first tick fires immediately; consume it.

    loop {
        tokio::select! {
            maybe = rx.recv() => {
                match maybe {
                    None | Some(Outbound::Close) => {
                        let _ = writer.close().await;
                        break;
                    }
                    Some(Outbound::Frame(msg)) => {
                        let text = match serde_json::to_string(&msg) {
                            Ok(t) => t,
                            Err(_) => continue,
                        };
                        match tokio::time::timeout(write_deadline, writer.write_text(&text)).await {
                            Ok(Ok(())) => {}
                            _ => break,
                        }
                    }
                }
            }
            _ = heartbeat.tick() => {
                match tokio::time::timeout(write_deadline, writer.write_ping()).await {
                    Ok(Ok(())) => {}
                    _ => break,
                }
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{MemoryRegistry, RoomRegistry};
    use std::time::Duration as StdDuration;

    enum Incoming {
        Text(String),
    }

    #[derive(Debug, PartialEq)]
    enum Outgoing {
        Text(String),
        Ping,
        Close,
    }

    struct MockReader(mpsc::Receiver<Incoming>);

    #[async_trait]
    impl FrameReader for MockReader {
        async fn read_frame(&mut self) -> Result<ReadEvent, TransportError> {
            match self.0.recv().await {
                Some(Incoming::Text(t)) => Ok(ReadEvent::Text(t)),
                None => Err(TransportError("client disconnected".into())),
            }
        }
    }

    struct MockWriter(mpsc::Sender<Outgoing>);

    #[async_trait]
    impl FrameWriter for MockWriter {
        async fn write_text(&mut self, text: &str) -> Result<(), TransportError> {
            self.0
                .send(Outgoing::Text(text.to_string()))
                .await
                .map_err(|_| TransportError("closed".into()))
        }
        async fn write_ping(&mut self) -> Result<(), TransportError> {
            self.0.send(Outgoing::Ping).await.map_err(|_| TransportError("closed".into()))
        }
        async fn close(&mut self) -> Result<(), TransportError> {
            let _ = self.0.send(Outgoing::Close).await;
            Ok(())
        }
    }

    struct TestClient {
        in_tx: mpsc::Sender<Incoming>,
        out_rx: mpsc::Receiver<Outgoing>,
    }

    impl TestClient {
        fn send(&self, json: serde_json::Value) {
            self.in_tx.try_send(Incoming::Text(json.to_string())).unwrap();
        }

        async fn recv_text(&mut self) -> SignalMessage {
            loop {
                match self.out_rx.recv().await.expect("writer closed unexpectedly") {
                    Outgoing::Text(t) => return serde_json::from_str(&t).unwrap(),
                    Outgoing::Ping => continue,
                    Outgoing::Close => panic!("unexpected close"),
                }
            }
        }
    }

    fn test_hub() -> Arc<Hub> {
        let config = Arc::new(Config {
            bind_addr: "127.0.0.1:0".into(),
            default_max_participants: 100,
            room_ttl_secs: 86400,
            recording_ttl_secs: 604800,
            chat_history_cap: 1000,
            broadcast_channel_capacity: 256,
            client_queue_capacity: 256,
            registry_call_timeout_secs: 5,
            read_deadline_secs: 70,
            write_deadline_secs: 10,
            heartbeat_interval_secs: 3600,
            allowed_origins: "*".into(),
            log_level: "info".into(),
        });
        let registry: Arc<dyn RoomRegistry> = Arc::new(MemoryRegistry::new());
        let usecase = Arc::new(RoomUseCase::new(registry, &config));
        Hub::spawn(usecase, config)
    }

    async fn connect(hub: &Arc<Hub>, room_id: &str, user_id: &str, display_name: &str) -> TestClient {
        let (in_tx, in_rx) = mpsc::channel(64);
        let (out_tx, out_rx) = mpsc::channel(64);
        let hub = hub.clone();
        let room_id = room_id.to_string();
        let user_id = user_id.to_string();
        let display_name = display_name.to_string();
        tokio::spawn(async move {
            hub.handle_connection(MockWriter(out_tx), MockReader(in_rx), room_id, user_id, display_name)
                .await;
        });
        // Give the register command a moment to land before the caller
        // sends follow-up frames that depend on room membership.
        tokio::time::sleep(StdDuration::from_millis(20)).await;
        TestClient { in_tx, out_rx }
    }

    #[tokio::test]
    async fn peer_joined_excludes_the_new_client() {
        let hub = test_hub();
        hub.usecase
            .create_room("Standup".into(), "alice".into(), Some(10), None)
            .await
            .unwrap();
        let mut alice = connect(&hub, "r1", "alice", "Alice").await;
        let _bob = connect(&hub, "r1", "bob", "Bob").await;

        let msg = alice.recv_text().await;
        assert_eq!(msg.kind, "peer-joined");
        assert_eq!(msg.data.unwrap()["userId"], "bob");
    }

    #[tokio::test]
    async fn offer_is_forwarded_only_to_the_target() {
        let hub = test_hub();
        hub.usecase
            .create_room("Standup".into(), "alice".into(), Some(10), None)
            .await
            .unwrap();
        let mut alice = connect(&hub, "r1", "alice", "Alice").await;
        let mut bob = connect(&hub, "r1", "bob", "Bob").await;
        // drain bob's own peer-joined notification noise is not expected
        // since bob joined after alice and alice is the only listener.
        let _ = alice.recv_text().await; // peer-joined for bob

        bob.send(json!({ "type": "offer", "to": "alice", "data": { "sdp": "v=0", "sdpType": "offer" } }));
        let msg = alice.recv_text().await;
        assert_eq!(msg.kind, "offer");
        assert_eq!(msg.from, "bob");
        assert_eq!(msg.room_id, "r1");
    }

    #[tokio::test]
    async fn chat_is_broadcast_including_sender_and_persisted() {
        let hub = test_hub();
        hub.usecase
            .create_room("Standup".into(), "alice".into(), Some(10), None)
            .await
            .unwrap();
        let mut alice = connect(&hub, "r1", "alice", "Alice").await;

        alice.send(json!({ "type": "chat", "data": { "message": "hi" } }));
        let msg = alice.recv_text().await;
        assert_eq!(msg.kind, "chat");
        assert_eq!(msg.from, "alice");
        assert_eq!(msg.data.as_ref().unwrap()["message"], "hi");

        tokio::time::sleep(StdDuration::from_millis(20)).await;
        let history = hub.usecase.get_chat_history("r1", 10).await.unwrap();
        assert_eq!(history.last().unwrap().user_id, "alice");
        assert_eq!(history.last().unwrap().message, "hi");
    }

    #[tokio::test]
    async fn chat_spoofed_from_field_is_overwritten() {
        let hub = test_hub();
        hub.usecase
            .create_room("Standup".into(), "alice".into(), Some(10), None)
            .await
            .unwrap();
        let mut alice = connect(&hub, "r1", "alice", "Alice").await;

        alice.send(json!({ "type": "chat", "from": "victim", "data": { "message": "hi" } }));
        let msg = alice.recv_text().await;
        assert_eq!(msg.from, "alice");
    }

    #[tokio::test]
    async fn screen_share_conflict_reports_error_to_initiator_only() {
        let hub = test_hub();
        hub.usecase
            .create_room("Standup".into(), "alice".into(), Some(10), None)
            .await
            .unwrap();
        let mut alice = connect(&hub, "r1", "alice", "Alice").await;
        let mut bob = connect(&hub, "r1", "bob", "Bob").await;
        let _ = alice.recv_text().await; // peer-joined for bob

        alice.send(json!({ "type": "screen-share", "data": { "isSharing": true } }));
        let share_on = bob.recv_text().await;
        assert_eq!(share_on.kind, "screen-share");
        assert_eq!(share_on.data.unwrap()["isSharing"], true);

        bob.send(json!({ "type": "screen-share", "data": { "isSharing": true } }));
        let err = bob.recv_text().await;
        assert_eq!(err.kind, "screen-share-error");
        assert_eq!(
            err.data.unwrap()["error"],
            "screen share already in progress by another user"
        );

        assert_eq!(hub.usecase.get_screen_sharer("r1").await.unwrap(), Some("alice".to_string()));
    }

    #[tokio::test]
    async fn join_failure_on_full_room_sends_flat_error_and_closes() {
        let hub = test_hub();
        hub.usecase
            .create_room("Standup".into(), "alice".into(), Some(2), None)
            .await
            .unwrap();
        let _alice = connect(&hub, "r1", "alice", "Alice").await;
        let _bob = connect(&hub, "r1", "bob", "Bob").await;

        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let hub2 = hub.clone();
        tokio::spawn(async move {
            hub2.handle_connection(MockWriter(out_tx), MockReader(in_rx), "r1".into(), "carol".into(), "Carol".into())
                .await;
        });
        drop(in_tx);

        match out_rx.recv().await.unwrap() {
            Outgoing::Text(t) => {
                let v: serde_json::Value = serde_json::from_str(&t).unwrap();
                assert_eq!(v, json!({ "error": "Failed to join room" }));
            }
            other => panic!("expected a text frame, got {other:?}"),
        }
        assert_eq!(out_rx.recv().await, Some(Outgoing::Close));

        tokio::time::sleep(StdDuration::from_millis(20)).await;
        assert_eq!(hub.client_count(), 2);
    }

    #[tokio::test]
    async fn leave_broadcasts_peer_left_and_removes_from_index() {
        let hub = test_hub();
        hub.usecase
            .create_room("Standup".into(), "alice".into(), Some(10), None)
            .await
            .unwrap();
        let mut alice = connect(&hub, "r1", "alice", "Alice").await;
        let bob = connect(&hub, "r1", "bob", "Bob").await;
        let _ = alice.recv_text().await; // peer-joined for bob

        bob.send(json!({ "type": "leave" }));
        let msg = alice.recv_text().await;
        assert_eq!(msg.kind, "peer-left");
        assert_eq!(msg.data.unwrap()["userId"], "bob");

        tokio::time::sleep(StdDuration::from_millis(20)).await;
        assert_eq!(hub.client_count(), 1);
    }
}
