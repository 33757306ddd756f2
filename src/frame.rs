// src/frame.rs
//
// Well-known `SignalMessage.type` values and constructors for the frames
// the hub itself originates (as opposed to frames merely forwarded
// between peers). Keeping these as named constructors, rather than
// scattering `"peer-joined"` string literals through hub.rs, mirrors the
// `LiveRelayEvent` constructor-per-kind style this codebase favors
// elsewhere for its event envelopes.

use serde_json::json;

use crate::model::SignalMessage;

pub const TYPE_OFFER: &str = "offer";
pub const TYPE_ANSWER: &str = "answer";
pub const TYPE_ICE: &str = "ice";
pub const TYPE_PING: &str = "ping";
pub const TYPE_PONG: &str = "pong";
pub const TYPE_PEER_JOINED: &str = "peer-joined";
pub const TYPE_PEER_LEFT: &str = "peer-left";
pub const TYPE_CHAT: &str = "chat";
pub const TYPE_MEDIA_STATE: &str = "media-state";
pub const TYPE_SCREEN_SHARE: &str = "screen-share";
pub const TYPE_SCREEN_SHARE_ERROR: &str = "screen-share-error";
pub const TYPE_LEAVE: &str = "leave";

/// `server` is the reserved `from` value for frames the hub itself
/// originates rather than forwards.
pub const FROM_SERVER: &str = "server";

pub fn pong(room_id: &str) -> SignalMessage {
    SignalMessage::new(TYPE_PONG).with_from(FROM_SERVER).with_room(room_id)
}

pub fn ping() -> SignalMessage {
    SignalMessage::new(TYPE_PING).with_from(FROM_SERVER)
}

pub fn peer_joined(room_id: &str, user_id: &str, display_name: &str) -> SignalMessage {
    SignalMessage::new(TYPE_PEER_JOINED)
        .with_from(FROM_SERVER)
        .with_room(room_id)
        .with_data(json!({
            "userId": user_id,
            "displayName": display_name,
            "isHost": false,
        }))
}

pub fn peer_left(room_id: &str, user_id: &str) -> SignalMessage {
    SignalMessage::new(TYPE_PEER_LEFT)
        .with_from(FROM_SERVER)
        .with_room(room_id)
        .with_data(json!({ "userId": user_id }))
}

pub fn screen_share_state(room_id: &str, is_sharing: bool) -> SignalMessage {
    SignalMessage::new(TYPE_SCREEN_SHARE)
        .with_from(FROM_SERVER)
        .with_room(room_id)
        .with_data(json!({ "isSharing": is_sharing }))
}

pub fn screen_share_error(room_id: &str, error: &str) -> SignalMessage {
    SignalMessage::new(TYPE_SCREEN_SHARE_ERROR)
        .with_from(FROM_SERVER)
        .with_room(room_id)
        .with_data(json!({ "error": error }))
}

/// The post-upgrade join-failure frame is a bespoke flat object, not a
/// `SignalMessage` — the wire contract for this one case is exactly
/// `{"error":"..."}`, sent once, immediately before closing.
pub fn join_error_frame(message: &str) -> serde_json::Value {
    json!({ "error": message })
}
