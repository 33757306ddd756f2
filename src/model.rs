// src/model.rs
//
// Domain entities for the signaling plane: rooms, participants, chat
// messages, recordings, and the wire-level signal frame. These are the
// types the registry stores and the use-case layer operates on.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-room settings governing what participants are allowed to do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSettings {
    pub allow_screen_share: bool,
    pub allow_chat: bool,
    pub waiting_room: bool,
    pub recording_enabled: bool,
    pub max_duration_minutes: u32,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            allow_screen_share: true,
            allow_chat: true,
            waiting_room: false,
            recording_enabled: false,
            max_duration_minutes: 0,
        }
    }
}

/// A meeting room. TTL-bounded in the registry; the authoritative
/// participant set lives alongside it, not inside this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub host_id: String,
    pub created_at: DateTime<Utc>,
    pub max_participants: u32,
    pub is_recording: bool,
    pub settings: RoomSettings,
    /// Caller-supplied annotations, passed through unverified.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl Room {
    pub fn new(id: String, name: String, host_id: String, max_participants: u32) -> Self {
        Self {
            id,
            name,
            host_id,
            created_at: Utc::now(),
            max_participants: if max_participants == 0 { 100 } else { max_participants },
            is_recording: false,
            settings: RoomSettings::default(),
            metadata: HashMap::new(),
        }
    }
}

/// A single occupant of a room. Mutated on media-state events; destroyed on
/// leave or disconnect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: String,
    pub room_id: String,
    pub display_name: String,
    pub joined_at: DateTime<Utc>,
    pub is_host: bool,
    pub is_muted: bool,
    pub is_video_off: bool,
    pub is_screen_share: bool,
}

/// The kind of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMessageKind {
    Text,
    File,
    System,
}

/// A chat message appended on a `chat` signal. Retained for the room's TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub room_id: String,
    pub user_id: String,
    pub user_name: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: ChatMessageKind,
}

/// Recording lifecycle status. Advances monotonically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingStatus {
    Recording,
    Processing,
    Completed,
    Failed,
}

/// A room recording. Created on host-start; chunks appended during its
/// lifetime; finalized on host-stop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    pub id: String,
    pub room_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_sec: i64,
    pub status: RecordingStatus,
    pub chunk_urls: Vec<String>,
    pub size_bytes: u64,
    /// Set by the (out-of-scope) storage pipeline once processing completes.
    #[serde(default)]
    pub file_url: Option<String>,
}

impl Recording {
    pub fn new(id: String, room_id: String) -> Self {
        Self {
            id,
            room_id,
            start_time: Utc::now(),
            end_time: None,
            duration_sec: 0,
            status: RecordingStatus::Recording,
            chunk_urls: Vec::new(),
            size_bytes: 0,
            file_url: None,
        }
    }
}

/// The on-wire signal frame exchanged over the WebSocket, one per text
/// frame. `from` and `room_id` are always rewritten by the server before
/// dispatch to prevent spoofing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(rename = "roomId", default)]
    pub room_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl SignalMessage {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            from: String::new(),
            to: None,
            room_id: String::new(),
            data: None,
            timestamp: Some(Utc::now()),
        }
    }

    pub fn with_to(mut self, to: impl Into<String>) -> Self {
        self.to = Some(to.into());
        self
    }

    pub fn with_room(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = room_id.into();
        self
    }

    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = from.into();
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}
