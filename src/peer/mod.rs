pub mod connection;
pub mod link;

use std::sync::Arc;

use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::track::track_remote::TrackRemote;

use crate::session::PairingId;

pub use link::{NegotiationState, PeerLink};

/// Asynchronous output of one peer link. Every event carries the pairing it
/// was spawned for; consumers drop events whose pairing is no longer current.
pub enum PeerEvent {
    LocalCandidate {
        pairing: PairingId,
        candidate: RTCIceCandidateInit,
    },
    RemoteTrack {
        pairing: PairingId,
        track: Arc<TrackRemote>,
    },
    LinkState {
        pairing: PairingId,
        state: RTCPeerConnectionState,
    },
}

/// Where a peer link delivers its events.
pub type PeerSink = Arc<dyn Fn(PeerEvent) + Send + Sync>;
