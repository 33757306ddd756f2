use tracing::info;

// ---------------------------------------------------------------------------
// Production configuration — loaded from environment variables
// ---------------------------------------------------------------------------

/// Complete server configuration loaded at startup.
///
/// Every field can be set via an environment variable prefixed with
/// `MESH_`. Defaults are suitable for local development.
#[derive(Debug, Clone)]
pub struct Config {
    // ── Network ─────────────────────────────────────────────────────────
    /// Address to bind the HTTP listener to.
    pub bind_addr: String,

    // ── Room defaults ───────────────────────────────────────────────────
    /// Default `maxParticipants` applied when a caller does not specify one.
    pub default_max_participants: u32,
    /// TTL applied to a newly created room, in seconds.
    pub room_ttl_secs: u64,
    /// TTL applied to recording records, in seconds.
    pub recording_ttl_secs: u64,
    /// Maximum number of chat messages retained per room.
    pub chat_history_cap: usize,

    // ── Hub channel/queue capacities ────────────────────────────────────
    /// Capacity of the hub's broadcast command channel.
    pub broadcast_channel_capacity: usize,
    /// Capacity of each client's outbound frame queue.
    pub client_queue_capacity: usize,

    // ── Registry deadlines ───────────────────────────────────────────────
    /// Deadline applied to every registry call made by the use-case layer,
    /// in seconds. A call that exceeds this is treated as a registry error
    /// rather than left to hang a caller indefinitely.
    pub registry_call_timeout_secs: u64,

    // ── Transport timing ────────────────────────────────────────────────
    /// Reader idle deadline, in seconds, reset on any inbound frame or pong.
    pub read_deadline_secs: u64,
    /// Writer per-frame write deadline, in seconds.
    pub write_deadline_secs: u64,
    /// Interval between server-initiated heartbeat pings, in seconds.
    pub heartbeat_interval_secs: u64,

    // ── CORS ─────────────────────────────────────────────────────────────
    pub allowed_origins: String,

    // ── Logging ──────────────────────────────────────────────────────────
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Automatically loads a `.env` file if present (via `dotenvy`).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let bind_addr = env_or("MESH_BIND_ADDR", "0.0.0.0:8080");

        let default_max_participants = env_or("MESH_DEFAULT_MAX_PARTICIPANTS", "100")
            .parse::<u32>()
            .unwrap_or(100);
        let room_ttl_secs = env_or("MESH_ROOM_TTL_SECS", "86400")
            .parse::<u64>()
            .unwrap_or(86400);
        let recording_ttl_secs = env_or("MESH_RECORDING_TTL_SECS", "604800")
            .parse::<u64>()
            .unwrap_or(604800);
        let chat_history_cap = env_or("MESH_CHAT_HISTORY_CAP", "1000")
            .parse::<usize>()
            .unwrap_or(1000);

        let broadcast_channel_capacity = env_or("MESH_BROADCAST_CHANNEL_CAPACITY", "256")
            .parse::<usize>()
            .unwrap_or(256);
        let client_queue_capacity = env_or("MESH_CLIENT_QUEUE_CAPACITY", "256")
            .parse::<usize>()
            .unwrap_or(256);

        let registry_call_timeout_secs = env_or("MESH_REGISTRY_CALL_TIMEOUT_SECS", "5")
            .parse::<u64>()
            .unwrap_or(5);

        let read_deadline_secs = env_or("MESH_READ_DEADLINE_SECS", "70")
            .parse::<u64>()
            .unwrap_or(70);
        let write_deadline_secs = env_or("MESH_WRITE_DEADLINE_SECS", "10")
            .parse::<u64>()
            .unwrap_or(10);
        let heartbeat_interval_secs = env_or("MESH_HEARTBEAT_INTERVAL_SECS", "30")
            .parse::<u64>()
            .unwrap_or(30);

        let allowed_origins = env_or("MESH_ALLOWED_ORIGINS", "*");
        let log_level = env_or("MESH_LOG_LEVEL", "info");

        let config = Config {
            bind_addr,
            default_max_participants,
            room_ttl_secs,
            recording_ttl_secs,
            chat_history_cap,
            broadcast_channel_capacity,
            client_queue_capacity,
            registry_call_timeout_secs,
            read_deadline_secs,
            write_deadline_secs,
            heartbeat_interval_secs,
            allowed_origins,
            log_level,
        };

        config.log_summary();
        config
    }

    fn log_summary(&self) {
        info!("──── Signaling Hub Configuration ────");
        info!("  bind_addr               : {}", self.bind_addr);
        info!("  default_max_participants: {}", self.default_max_participants);
        info!("  room_ttl_secs           : {}", self.room_ttl_secs);
        info!("  recording_ttl_secs      : {}", self.recording_ttl_secs);
        info!("  chat_history_cap        : {}", self.chat_history_cap);
        info!("  broadcast_channel_cap   : {}", self.broadcast_channel_capacity);
        info!("  client_queue_cap        : {}", self.client_queue_capacity);
        info!("  registry_call_timeout_s : {}", self.registry_call_timeout_secs);
        info!("  read_deadline_secs      : {}", self.read_deadline_secs);
        info!("  write_deadline_secs     : {}", self.write_deadline_secs);
        info!("  heartbeat_interval_secs : {}", self.heartbeat_interval_secs);
        info!(
            "  cors_origins            : {}",
            if self.allowed_origins == "*" {
                "* (permissive)"
            } else {
                &self.allowed_origins
            }
        );
        info!("  log_level               : {}", self.log_level);
        info!("──────────────────────────────────────");
    }
}

// ---------------------------------------------------------------------------
// Environment helpers
// ---------------------------------------------------------------------------

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_or_falls_back_to_default() {
        std::env::remove_var("MESH_TEST_UNSET_KEY");
        assert_eq!(env_or("MESH_TEST_UNSET_KEY", "fallback"), "fallback");
    }

    #[test]
    fn env_or_prefers_set_value() {
        std::env::set_var("MESH_TEST_SET_KEY", "value");
        assert_eq!(env_or("MESH_TEST_SET_KEY", "fallback"), "value");
        std::env::remove_var("MESH_TEST_SET_KEY");
    }

    #[test]
    fn defaults_match_transport_timing_constants() {
        let cfg = Config {
            bind_addr: "0.0.0.0:8080".into(),
            default_max_participants: 100,
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
        };
        assert_eq!(cfg.read_deadline_secs, 70);
        assert_eq!(cfg.heartbeat_interval_secs, 30);
        assert_eq!(cfg.client_queue_capacity, 256);
    }
}
