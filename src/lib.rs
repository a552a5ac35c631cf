//! Client-side controller for an anonymous one-to-one random chat service:
//! nickname + mode in, a matched stranger out, with text messages over the
//! signaling channel and a negotiated peer-to-peer link in video mode.

pub mod config;
pub mod error;
pub mod events;
pub mod logger;
pub mod media;
pub mod peer;
pub mod session;
pub mod signaling;
pub mod utils;

pub use config::SessionConfig;
pub use error::{CaptureError, PeerError, SignalingError, StartError};
pub use events::{ChatEntry, ChatMode, ClientRequest, ServerEvent, UiEvent};
pub use media::{CaptureConstraints, CaptureHandle, MediaSource, SampleCapture};
pub use session::{PairingId, Partner, Session, SessionHandle, UserAction};
