// src/registry.rs
//
// The room registry: a key/value store abstraction exposing room record
// CRUD with TTL, a participant map per room, an append-only chat log per
// room, recording records, and a single-valued screen-share holder per
// room. Every operation is transactional at the level of a single call;
// no compound operation is required to be atomic, and weak consistency
// with the hub's in-memory index is expected and tolerated.
//
// `MemoryRegistry` is the only shipped implementor. A Redis-backed one
// (matching the `room:{id}` key layout) is a natural drop-in but the
// external store's wire protocol is out of scope here.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::UseCaseError;
use crate::model::{ChatMessage, Participant, Recording, Room};

/// A value paired with an optional expiry instant. `None` means no TTL.
struct Entry<T> {
    value: T,
    expires_at: Option<Instant>,
}

impl<T> Entry<T> {
    fn new(value: T, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|d| Instant::now() + d),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.map(|t| Instant::now() >= t).unwrap_or(false)
    }
}

/// The registry interface the hub and use-case layer consume.
#[async_trait]
pub trait RoomRegistry: Send + Sync {
    async fn create_room(&self, room: Room, ttl: Duration) -> Result<(), UseCaseError>;
    async fn get_room(&self, room_id: &str) -> Result<Room, UseCaseError>;
    async fn update_room(&self, room: Room) -> Result<(), UseCaseError>;
    async fn delete_room(&self, room_id: &str) -> Result<(), UseCaseError>;
    async fn extend_room_ttl(&self, room_id: &str, ttl: Duration) -> Result<(), UseCaseError>;

    async fn add_participant(&self, participant: Participant) -> Result<(), UseCaseError>;
    async fn remove_participant(&self, room_id: &str, user_id: &str) -> Result<(), UseCaseError>;
    async fn get_participant(&self, room_id: &str, user_id: &str) -> Result<Participant, UseCaseError>;
    async fn get_all_participants(&self, room_id: &str) -> Result<Vec<Participant>, UseCaseError>;
    async fn count_participants(&self, room_id: &str) -> Result<usize, UseCaseError>;
    async fn update_participant(&self, participant: Participant) -> Result<(), UseCaseError>;

    async fn save_chat_message(&self, msg: ChatMessage, cap: usize) -> Result<(), UseCaseError>;
    async fn chat_range(&self, room_id: &str, limit: usize) -> Result<Vec<ChatMessage>, UseCaseError>;
    async fn delete_chat(&self, room_id: &str) -> Result<(), UseCaseError>;

    async fn create_recording(&self, recording: Recording, ttl: Duration) -> Result<(), UseCaseError>;
    async fn get_recording(&self, recording_id: &str) -> Result<Recording, UseCaseError>;
    async fn update_recording(&self, recording: Recording) -> Result<(), UseCaseError>;
    async fn add_recording_chunk(&self, recording_id: &str, url: String) -> Result<(), UseCaseError>;

    async fn set_screen_sharer(&self, room_id: &str, user_id: &str, ttl: Duration) -> Result<(), UseCaseError>;
    async fn get_screen_sharer(&self, room_id: &str) -> Result<Option<String>, UseCaseError>;
    async fn clear_screen_sharer(&self, room_id: &str) -> Result<(), UseCaseError>;
}

/// In-process, TTL-aware implementation of [`RoomRegistry`]. TTL expiry is
/// lazy: checked on read, and swept opportunistically on write.
#[derive(Default)]
pub struct MemoryRegistry {
    rooms: RwLock<HashMap<String, Entry<Room>>>,
    participants: RwLock<HashMap<String, HashMap<String, Participant>>>,
    chat: RwLock<HashMap<String, Vec<ChatMessage>>>,
    recordings: RwLock<HashMap<String, Entry<Recording>>>,
    screen_sharers: RwLock<HashMap<String, Entry<String>>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoomRegistry for MemoryRegistry {
    async fn create_room(&self, room: Room, ttl: Duration) -> Result<(), UseCaseError> {
        let mut rooms = self.rooms.write().unwrap();
        rooms.insert(room.id.clone(), Entry::new(room, Some(ttl)));
        Ok(())
    }

    async fn get_room(&self, room_id: &str) -> Result<Room, UseCaseError> {
        let rooms = self.rooms.read().unwrap();
        match rooms.get(room_id) {
            Some(entry) if !entry.is_expired() => Ok(entry.value.clone()),
            _ => Err(UseCaseError::room_not_found(room_id)),
        }
    }

    async fn update_room(&self, room: Room) -> Result<(), UseCaseError> {
        let mut rooms = self.rooms.write().unwrap();
        match rooms.get_mut(&room.id) {
            Some(entry) if !entry.is_expired() => {
                entry.value = room;
                Ok(())
            }
            _ => Err(UseCaseError::room_not_found(&room.id)),
        }
    }

    async fn delete_room(&self, room_id: &str) -> Result<(), UseCaseError> {
        self.rooms.write().unwrap().remove(room_id);
        self.participants.write().unwrap().remove(room_id);
        self.chat.write().unwrap().remove(room_id);
        self.screen_sharers.write().unwrap().remove(room_id);
        Ok(())
    }

    async fn extend_room_ttl(&self, room_id: &str, ttl: Duration) -> Result<(), UseCaseError> {
        let mut rooms = self.rooms.write().unwrap();
        match rooms.get_mut(room_id) {
            Some(entry) if !entry.is_expired() => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(())
            }
            _ => Err(UseCaseError::room_not_found(room_id)),
        }
    }

    async fn add_participant(&self, participant: Participant) -> Result<(), UseCaseError> {
        let mut participants = self.participants.write().unwrap();
        participants
            .entry(participant.room_id.clone())
            .or_default()
            .insert(participant.user_id.clone(), participant);
        Ok(())
    }

    async fn remove_participant(&self, room_id: &str, user_id: &str) -> Result<(), UseCaseError> {
        let mut participants = self.participants.write().unwrap();
        if let Some(room) = participants.get_mut(room_id) {
            room.remove(user_id);
        }
        Ok(())
    }

    async fn get_participant(&self, room_id: &str, user_id: &str) -> Result<Participant, UseCaseError> {
        let participants = self.participants.read().unwrap();
        participants
            .get(room_id)
            .and_then(|room| room.get(user_id))
            .cloned()
            .ok_or_else(|| UseCaseError::NotFound(format!("Participant '{user_id}' not in room '{room_id}'.")))
    }

    async fn get_all_participants(&self, room_id: &str) -> Result<Vec<Participant>, UseCaseError> {
        let participants = self.participants.read().unwrap();
        Ok(participants
            .get(room_id)
            .map(|room| room.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn count_participants(&self, room_id: &str) -> Result<usize, UseCaseError> {
        let participants = self.participants.read().unwrap();
        Ok(participants.get(room_id).map(|room| room.len()).unwrap_or(0))
    }

    async fn update_participant(&self, participant: Participant) -> Result<(), UseCaseError> {
        self.add_participant(participant).await
    }

    async fn save_chat_message(&self, msg: ChatMessage, cap: usize) -> Result<(), UseCaseError> {
        let mut chat = self.chat.write().unwrap();
        let log = chat.entry(msg.room_id.clone()).or_default();
        log.push(msg);
        if log.len() > cap {
            let excess = log.len() - cap;
            log.drain(0..excess);
        }
        Ok(())
    }

    async fn chat_range(&self, room_id: &str, limit: usize) -> Result<Vec<ChatMessage>, UseCaseError> {
        let chat = self.chat.read().unwrap();
        let log = chat.get(room_id).cloned().unwrap_or_default();
        let start = log.len().saturating_sub(limit);
        Ok(log[start..].to_vec())
    }

    async fn delete_chat(&self, room_id: &str) -> Result<(), UseCaseError> {
        self.chat.write().unwrap().remove(room_id);
        Ok(())
    }

    async fn create_recording(&self, recording: Recording, ttl: Duration) -> Result<(), UseCaseError> {
        let mut recordings = self.recordings.write().unwrap();
        recordings.insert(recording.id.clone(), Entry::new(recording, Some(ttl)));
        Ok(())
    }

    async fn get_recording(&self, recording_id: &str) -> Result<Recording, UseCaseError> {
        let recordings = self.recordings.read().unwrap();
        match recordings.get(recording_id) {
            Some(entry) if !entry.is_expired() => Ok(entry.value.clone()),
            _ => Err(UseCaseError::recording_not_found(recording_id)),
        }
    }

    async fn update_recording(&self, recording: Recording) -> Result<(), UseCaseError> {
        let mut recordings = self.recordings.write().unwrap();
        match recordings.get_mut(&recording.id) {
            Some(entry) if !entry.is_expired() => {
                entry.value = recording;
                Ok(())
            }
            _ => Err(UseCaseError::recording_not_found(&recording.id)),
        }
    }

    async fn add_recording_chunk(&self, recording_id: &str, url: String) -> Result<(), UseCaseError> {
        let mut recordings = self.recordings.write().unwrap();
        match recordings.get_mut(recording_id) {
            Some(entry) if !entry.is_expired() => {
                entry.value.chunk_urls.push(url);
                Ok(())
            }
            _ => Err(UseCaseError::recording_not_found(recording_id)),
        }
    }

    async fn set_screen_sharer(&self, room_id: &str, user_id: &str, ttl: Duration) -> Result<(), UseCaseError> {
        let mut sharers = self.screen_sharers.write().unwrap();
        sharers.insert(room_id.to_string(), Entry::new(user_id.to_string(), Some(ttl)));
        Ok(())
    }

    async fn get_screen_sharer(&self, room_id: &str) -> Result<Option<String>, UseCaseError> {
        let sharers = self.screen_sharers.read().unwrap();
        Ok(sharers.get(room_id).filter(|e| !e.is_expired()).map(|e| e.value.clone()))
    }

    async fn clear_screen_sharer(&self, room_id: &str) -> Result<(), UseCaseError> {
        self.screen_sharers.write().unwrap().remove(room_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChatMessageKind;
    use std::time::Duration;

    fn sample_room(id: &str) -> Room {
        Room::new(id.into(), "Standup".into(), "host-1".into(), 2)
    }

    #[tokio::test]
    async fn room_round_trips() {
        let reg = MemoryRegistry::new();
        reg.create_room(sample_room("r1"), Duration::from_secs(60)).await.unwrap();
        let room = reg.get_room("r1").await.unwrap();
        assert_eq!(room.id, "r1");
    }

    #[tokio::test]
    async fn get_missing_room_is_not_found() {
        let reg = MemoryRegistry::new();
        let err = reg.get_room("missing").await.unwrap_err();
        assert!(matches!(err, UseCaseError::NotFound(_)));
    }

    #[tokio::test]
    async fn chat_range_respects_cap_and_limit() {
        let reg = MemoryRegistry::new();
        for i in 0..5 {
            reg.save_chat_message(
                ChatMessage {
                    id: format!("m{i}"),
                    room_id: "r1".into(),
                    user_id: "alice".into(),
                    user_name: "Alice".into(),
                    message: format!("msg {i}"),
                    timestamp: chrono::Utc::now(),
                    kind: ChatMessageKind::Text,
                },
                3,
            )
            .await
            .unwrap();
        }
        let all = reg.chat_range("r1", 10).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all.last().unwrap().message, "msg 4");
    }

    #[tokio::test]
    async fn screen_sharer_set_get_clear() {
        let reg = MemoryRegistry::new();
        assert_eq!(reg.get_screen_sharer("r1").await.unwrap(), None);
        reg.set_screen_sharer("r1", "alice", Duration::from_secs(60)).await.unwrap();
        assert_eq!(reg.get_screen_sharer("r1").await.unwrap(), Some("alice".to_string()));
        reg.clear_screen_sharer("r1").await.unwrap();
        assert_eq!(reg.get_screen_sharer("r1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn participant_count_tracks_add_remove() {
        let reg = MemoryRegistry::new();
        reg.add_participant(Participant {
            user_id: "alice".into(),
            room_id: "r1".into(),
            display_name: "Alice".into(),
            joined_at: chrono::Utc::now(),
            is_host: true,
            is_muted: false,
            is_video_off: false,
            is_screen_share: false,
        })
        .await
        .unwrap();
        assert_eq!(reg.count_participants("r1").await.unwrap(), 1);
        reg.remove_participant("r1", "alice").await.unwrap();
        assert_eq!(reg.count_participants("r1").await.unwrap(), 0);
    }
}
