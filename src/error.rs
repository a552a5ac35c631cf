use thiserror::Error;

use crate::config::MIN_NICKNAME_LEN;

/// Local media acquisition failures, distinguished so the UI can show a
/// specific message for each.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("camera/microphone access was denied")]
    PermissionDenied,
    #[error("no camera or microphone found")]
    DeviceNotFound,
    #[error("camera/microphone is being used by another application")]
    DeviceBusy,
    #[error("media capture failed: {0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("invalid signaling endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
    #[error("signaling endpoint cannot be a base URL")]
    CannotBeABase,
    #[error("websocket error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("malformed signaling message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Why `Session::start` refused to open a session. All of these are
/// session-level: the user acts again, nothing is retried automatically.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("nickname must be at least {MIN_NICKNAME_LEN} characters")]
    InputInvalid,
    #[error("media acquisition failed: {0}")]
    Media(#[from] CaptureError),
    #[error("signaling channel unavailable: {0}")]
    Channel(#[from] SignalingError),
}

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("webrtc failure: {0}")]
    Rtc(#[from] webrtc::Error),
    #[error("local description missing after negotiation step")]
    NoLocalDescription,
}
