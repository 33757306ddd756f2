// src/usecase.rs
//
// The room use-case layer: a thin orchestration layer over the registry.
// It validates capacity and host identity, stamps identifiers and
// timestamps, and sequences multi-step registry operations. Every method
// here mirrors a named operation in the component design (CreateRoom,
// JoinRoom, StartScreenShare, ...).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::config::Config;
use crate::error::UseCaseError;
use crate::model::{ChatMessage, ChatMessageKind, Participant, Recording, RecordingStatus, Room, RoomSettings};
use crate::registry::RoomRegistry;

/// Orchestrates room-level rules on top of a [`RoomRegistry`].
pub struct RoomUseCase {
    registry: Arc<dyn RoomRegistry>,
    room_ttl: Duration,
    recording_ttl: Duration,
    chat_history_cap: usize,
    default_max_participants: u32,
    registry_call_timeout: Duration,
}

impl RoomUseCase {
    pub fn new(registry: Arc<dyn RoomRegistry>, config: &Config) -> Self {
        Self {
            registry,
            room_ttl: Duration::from_secs(config.room_ttl_secs),
            recording_ttl: Duration::from_secs(config.recording_ttl_secs),
            chat_history_cap: config.chat_history_cap,
            default_max_participants: config.default_max_participants,
            registry_call_timeout: Duration::from_secs(config.registry_call_timeout_secs),
        }
    }

    /// Every registry call is given this caller-supplied deadline rather
    /// than being allowed to hang indefinitely — a stalled store must fail
    /// the one operation waiting on it, not the caller's task forever.
    async fn with_deadline<T>(&self, call: impl Future<Output = Result<T, UseCaseError>>) -> Result<T, UseCaseError> {
        match tokio::time::timeout(self.registry_call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(UseCaseError::RegistryError("registry call exceeded deadline".to_string())),
        }
    }

    pub async fn create_room(
        &self,
        name: String,
        host_id: String,
        max_participants: Option<u32>,
        settings: Option<RoomSettings>,
    ) -> Result<Room, UseCaseError> {
        let id = Uuid::new_v4().to_string();
        let mut room = Room::new(
            id,
            name,
            host_id,
            max_participants.unwrap_or(self.default_max_participants),
        );
        if let Some(settings) = settings {
            room.settings = settings;
        }
        self.with_deadline(self.registry.create_room(room.clone(), self.room_ttl)).await?;
        Ok(room)
    }

    pub async fn get_room(&self, room_id: &str) -> Result<Room, UseCaseError> {
        self.with_deadline(self.registry.get_room(room_id)).await
    }

    pub async fn join_room(
        &self,
        room_id: &str,
        user_id: &str,
        display_name: &str,
    ) -> Result<Participant, UseCaseError> {
        let room = self.with_deadline(self.registry.get_room(room_id)).await?;
        let count = self.with_deadline(self.registry.count_participants(room_id)).await?;
        // A re-join of the same userId overwrites the prior record rather
        // than adding a new occupant, so only refuse genuinely new joins
        // once the room is at capacity.
        let already_present = self.with_deadline(self.registry.get_participant(room_id, user_id)).await.is_ok();
        if !already_present && count >= room.max_participants as usize {
            return Err(UseCaseError::room_full(room_id));
        }

        let participant = Participant {
            user_id: user_id.to_string(),
            room_id: room_id.to_string(),
            display_name: display_name.to_string(),
            joined_at: Utc::now(),
            is_host: user_id == room.host_id,
            is_muted: false,
            is_video_off: false,
            is_screen_share: false,
        };
        self.with_deadline(self.registry.add_participant(participant.clone())).await?;
        Ok(participant)
    }

    pub async fn leave_room(&self, room_id: &str, user_id: &str) -> Result<(), UseCaseError> {
        // Room lifetime is governed by TTL, never by occupancy — the room
        // record is intentionally left alone here.
        self.with_deadline(self.registry.remove_participant(room_id, user_id)).await
    }

    pub async fn get_participants(&self, room_id: &str) -> Result<Vec<Participant>, UseCaseError> {
        self.with_deadline(self.registry.get_all_participants(room_id)).await
    }

    pub async fn update_participant_state(&self, participant: Participant) -> Result<(), UseCaseError> {
        self.with_deadline(self.registry.update_participant(participant)).await
    }

    pub async fn send_chat_message(
        &self,
        room_id: &str,
        user_id: &str,
        user_name: &str,
        message: String,
    ) -> Result<ChatMessage, UseCaseError> {
        let msg = ChatMessage {
            id: Uuid::new_v4().to_string(),
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            message,
            timestamp: Utc::now(),
            kind: ChatMessageKind::Text,
        };
        self.with_deadline(self.registry.save_chat_message(msg.clone(), self.chat_history_cap)).await?;
        Ok(msg)
    }

    pub async fn get_chat_history(&self, room_id: &str, limit: usize) -> Result<Vec<ChatMessage>, UseCaseError> {
        self.with_deadline(self.registry.chat_range(room_id, limit)).await
    }

    pub async fn start_recording(&self, room_id: &str, requester_id: &str) -> Result<Recording, UseCaseError> {
        let mut room = self.with_deadline(self.registry.get_room(room_id)).await?;
        if requester_id != room.host_id {
            return Err(UseCaseError::not_host(room_id));
        }
        if room.is_recording {
            return Err(UseCaseError::recording_in_progress(room_id));
        }

        let recording = Recording::new(Uuid::new_v4().to_string(), room_id.to_string());
        self.with_deadline(self.registry.create_recording(recording.clone(), self.recording_ttl)).await?;

        room.is_recording = true;
        self.with_deadline(self.registry.update_room(room)).await?;

        Ok(recording)
    }

    pub async fn stop_recording(
        &self,
        room_id: &str,
        recording_id: &str,
        requester_id: &str,
    ) -> Result<Recording, UseCaseError> {
        let mut room = self.with_deadline(self.registry.get_room(room_id)).await?;
        if requester_id != room.host_id {
            return Err(UseCaseError::not_host(room_id));
        }

        let mut recording = self.with_deadline(self.registry.get_recording(recording_id)).await?;
        let end_time = Utc::now();
        recording.duration_sec = (end_time - recording.start_time).num_seconds().max(0);
        recording.end_time = Some(end_time);
        recording.status = RecordingStatus::Processing;
        self.with_deadline(self.registry.update_recording(recording.clone())).await?;

        room.is_recording = false;
        self.with_deadline(self.registry.update_room(room)).await?;

        Ok(recording)
    }

    pub async fn add_recording_chunk(&self, recording_id: &str, url: String) -> Result<(), UseCaseError> {
        self.with_deadline(self.registry.add_recording_chunk(recording_id, url)).await
    }

    pub async fn get_recording(&self, recording_id: &str) -> Result<Recording, UseCaseError> {
        self.with_deadline(self.registry.get_recording(recording_id)).await
    }

    pub async fn extend_room_duration(&self, room_id: &str) -> Result<(), UseCaseError> {
        self.with_deadline(self.registry.extend_room_ttl(room_id, self.room_ttl)).await
    }

    pub async fn start_screen_share(&self, room_id: &str, user_id: &str) -> Result<(), UseCaseError> {
        if let Some(holder) = self.with_deadline(self.registry.get_screen_sharer(room_id)).await? {
            if holder != user_id {
                return Err(UseCaseError::screen_share_conflict());
            }
        }
        self.with_deadline(self.registry.set_screen_sharer(room_id, user_id, self.room_ttl)).await
    }

    pub async fn stop_screen_share(&self, room_id: &str, user_id: &str) -> Result<(), UseCaseError> {
        match self.with_deadline(self.registry.get_screen_sharer(room_id)).await? {
            Some(holder) if holder == user_id => self.with_deadline(self.registry.clear_screen_sharer(room_id)).await,
            _ => Err(UseCaseError::not_screen_sharer()),
        }
    }

    pub async fn get_screen_sharer(&self, room_id: &str) -> Result<Option<String>, UseCaseError> {
        self.with_deadline(self.registry.get_screen_sharer(room_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryRegistry;

    fn test_config() -> Config {
        Config {
            bind_addr: "127.0.0.1:0".into(),
            default_max_participants: 2,
            room_ttl_secs: 86400,
            recording_ttl_secs: 604800,
            chat_history_cap: 1000,
            broadcast_channel_capacity: 256,
            client_queue_capacity: 256,
            registry_call_timeout_secs: 5,
            read_deadline_secs: 70,
            write_deadline_secs: 10,
            heartbeat_interval_secs: 30,
            allowed_origins: "*".into(),
            log_level: "info".into(),
        }
    }

    fn usecase() -> RoomUseCase {
        let registry: Arc<dyn RoomRegistry> = Arc::new(MemoryRegistry::new());
        RoomUseCase::new(registry, &test_config())
    }

    #[tokio::test]
    async fn join_room_enforces_capacity() {
        let uc = usecase();
        let room = uc.create_room("Standup".into(), "host".into(), None, None).await.unwrap();
        uc.join_room(&room.id, "host", "Host").await.unwrap();
        uc.join_room(&room.id, "bob", "Bob").await.unwrap();
        let err = uc.join_room(&room.id, "carol", "Carol").await.unwrap_err();
        assert!(matches!(err, UseCaseError::Full(_)));
    }

    #[tokio::test]
    async fn rejoin_same_user_is_idempotent() {
        let uc = usecase();
        let room = uc.create_room("Standup".into(), "host".into(), None, None).await.unwrap();
        uc.join_room(&room.id, "host", "Host").await.unwrap();
        uc.join_room(&room.id, "bob", "Bob").await.unwrap();
        // bob rejoining must not be refused even though the room is full.
        uc.join_room(&room.id, "bob", "Bob").await.unwrap();
    }

    #[tokio::test]
    async fn screen_share_conflict_message() {
        let uc = usecase();
        let room = uc.create_room("Standup".into(), "host".into(), None, None).await.unwrap();
        uc.start_screen_share(&room.id, "alice").await.unwrap();
        let err = uc.start_screen_share(&room.id, "bob").await.unwrap_err();
        assert_eq!(err.message(), "screen share already in progress by another user");
    }

    #[tokio::test]
    async fn stop_screen_share_requires_holder() {
        let uc = usecase();
        let room = uc.create_room("Standup".into(), "host".into(), None, None).await.unwrap();
        uc.start_screen_share(&room.id, "alice").await.unwrap();
        let err = uc.stop_screen_share(&room.id, "bob").await.unwrap_err();
        assert_eq!(err.message(), "you are not the current screen sharer");
    }

    #[tokio::test]
    async fn start_recording_requires_host() {
        let uc = usecase();
        let room = uc.create_room("Standup".into(), "host".into(), None, None).await.unwrap();
        let err = uc.start_recording(&room.id, "bob").await.unwrap_err();
        assert!(matches!(err, UseCaseError::Forbidden(_)));
    }

    #[tokio::test]
    async fn start_recording_twice_conflicts() {
        let uc = usecase();
        let room = uc.create_room("Standup".into(), "host".into(), None, None).await.unwrap();
        uc.start_recording(&room.id, "host").await.unwrap();
        let err = uc.start_recording(&room.id, "host").await.unwrap_err();
        assert!(matches!(err, UseCaseError::Conflict(_)));
    }

    #[tokio::test]
    async fn leave_room_does_not_delete_room() {
        let uc = usecase();
        let room = uc.create_room("Standup".into(), "host".into(), None, None).await.unwrap();
        uc.join_room(&room.id, "host", "Host").await.unwrap();
        uc.leave_room(&room.id, "host").await.unwrap();
        // The room itself must still resolve; only TTL expiry removes it.
        uc.get_room(&room.id).await.unwrap();
    }
}
