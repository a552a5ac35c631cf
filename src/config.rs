use std::time::Duration;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::logger::log;

// Logging can only be turned off in development builds.

#[cfg(debug_assertions)]
pub const LOGGING_ENABLED: bool = true;

#[cfg(not(debug_assertions))]
pub const LOGGING_ENABLED: bool = false;

/// Minimum trimmed nickname length accepted by `Session::start`.
pub const MIN_NICKNAME_LEN: usize = 2;

/// Quiet period after the last keystroke before `stop_typing` goes out.
pub const TYPING_QUIET: Duration = Duration::from_secs(1);

/// ICE server description as the UI hands it to us ('stun' or 'turn').
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServerConfig {
    pub id: String,
    pub r#type: String,
    pub url: String,
    pub username: Option<String>,
    pub credential: Option<String>,
}

static DEFAULT_ICE_SERVERS: Lazy<Vec<ServerConfig>> = Lazy::new(|| {
    vec![
        ServerConfig {
            id: "default-stun-0".into(),
            r#type: "stun".into(),
            url: "stun:stun.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
        ServerConfig {
            id: "default-stun-1".into(),
            r#type: "stun".into(),
            url: "stun:stun1.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
    ]
});

pub fn default_ice_servers() -> Vec<ServerConfig> {
    DEFAULT_ICE_SERVERS.clone()
}

/// Checks a user-supplied ICE server list before it is installed.
pub fn validate_ice_servers(servers: &[ServerConfig]) -> bool {
    for server in servers {
        if server.url.is_empty() {
            log("Server URL cannot be empty");
            return false;
        }

        if server.r#type == "turn" && (server.username.is_none() || server.credential.is_none()) {
            log("TURN servers require username and credential");
            return false;
        }
    }
    true
}

/// Everything a session needs before it starts: where the matchmaker lives,
/// which ICE servers video pairings use, how eager the typing debounce is.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base ws:// or wss:// URL of the matchmaking server.
    pub server_url: String,
    pub ice_servers: Vec<ServerConfig>,
    pub typing_quiet: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            server_url: "ws://127.0.0.1:8000".into(),
            ice_servers: default_ice_servers(),
            typing_quiet: TYPING_QUIET,
        }
    }
}
