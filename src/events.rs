use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

/// Chat flavor picked on the landing screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMode {
    Text,
    Video,
}

impl ChatMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatMode::Text => "text",
            ChatMode::Video => "video",
        }
    }
}

impl fmt::Display for ChatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message from the matchmaking server, one JSON object per ws frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        message: String,
    },
    Searching {
        message: String,
    },
    PartnerFound {
        partner_nickname: String,
        initiator: bool,
    },
    PartnerDisconnected,
    ChatMessage {
        message: String,
        nickname: String,
    },
    Typing,
    StopTyping,
    Offer {
        sdp: RTCSessionDescription,
    },
    Answer {
        sdp: RTCSessionDescription,
    },
    IceCandidate {
        candidate: RTCIceCandidateInit,
    },
}

/// One request from us to the matchmaking server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    ChatMessage { message: String },
    Typing,
    StopTyping,
    Next,
    Offer { sdp: RTCSessionDescription },
    Answer { sdp: RTCSessionDescription },
    IceCandidate { candidate: RTCIceCandidateInit },
}

/// One transcript line. `mine` marks the optimistic local echo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEntry {
    pub nickname: String,
    pub text: String,
    pub mine: bool,
    pub ts: i64,
}

/// Everything the presentation layer needs to render; it consumes these and
/// never talks back.
pub enum UiEvent {
    /// Inline status line (greetings, partner notices, errors).
    System(String),
    /// A transcript entry was appended.
    Message(ChatEntry),
    /// The visible transcript was cleared (on `next` and `leave`).
    TranscriptCleared,
    PartnerOnline { nickname: String },
    PartnerCleared,
    RemoteTyping(bool),
    /// Local preview tracks, available once capture succeeded.
    LocalPreview(Vec<Arc<TrackLocalStaticSample>>),
    /// Remote media is flowing; the only point where the placeholder hides.
    RemoteMedia(Arc<TrackRemote>),
    /// The remote stream went away with its pairing; show the placeholder.
    RemoteMediaCleared,
    /// The channel died. Sending is disabled; the user must start over.
    ChannelLost,
    /// The session is gone (explicit leave or channel loss).
    Closed,
}
