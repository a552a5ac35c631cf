use std::sync::Arc;

use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::track::track_local::TrackLocal;

use crate::config::ServerConfig;
use crate::error::PeerError;
use crate::logger::log;
use crate::peer::connection::build_peer;
use crate::peer::PeerSink;
use crate::session::PairingId;

/// Offer/answer progress of one peer link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    New,
    HaveLocalOffer,
    HaveRemoteOffer,
    Stable,
    Closed,
}

/// One peer-to-peer link, bound to exactly one pairing. Never reused: a new
/// pairing always constructs a fresh link, and teardown closes this one
/// before its replacement exists.
pub struct PeerLink {
    pairing: PairingId,
    pc: Arc<RTCPeerConnection>,
    negotiation: NegotiationState,
    have_remote: bool,
}

impl PeerLink {
    pub async fn new(
        pairing: PairingId,
        ice_servers: &[ServerConfig],
        tracks: Vec<Arc<dyn TrackLocal + Send + Sync>>,
        sink: PeerSink,
    ) -> Result<Self, PeerError> {
        let pc = build_peer(pairing, ice_servers, tracks, sink).await?;
        Ok(PeerLink {
            pairing,
            pc,
            negotiation: NegotiationState::New,
            have_remote: false,
        })
    }

    pub fn pairing(&self) -> PairingId {
        self.pairing
    }

    pub fn negotiation(&self) -> NegotiationState {
        self.negotiation
    }

    /// Initiator side: produces the local offer for transmission.
    pub async fn create_offer(&mut self) -> Result<RTCSessionDescription, PeerError> {
        if self.negotiation != NegotiationState::New {
            log(&format!(
                "create_offer in state {:?}, link is one-shot per pairing",
                self.negotiation
            ));
        }
        let offer = self.pc.create_offer(None).await?;
        self.pc.set_local_description(offer).await?;
        self.negotiation = NegotiationState::HaveLocalOffer;
        self.local_description().await
    }

    /// Answerer side: applies the remote offer and produces the local answer.
    /// An offer arriving in any state but `New` is ignored.
    pub async fn accept_offer(
        &mut self,
        remote: RTCSessionDescription,
    ) -> Result<Option<RTCSessionDescription>, PeerError> {
        if self.negotiation != NegotiationState::New {
            log(&format!(
                "Ignoring offer in negotiation state {:?}",
                self.negotiation
            ));
            return Ok(None);
        }
        self.pc.set_remote_description(remote).await?;
        self.negotiation = NegotiationState::HaveRemoteOffer;
        self.have_remote = true;

        let answer = self.pc.create_answer(None).await?;
        self.pc.set_local_description(answer).await?;
        self.negotiation = NegotiationState::Stable;
        self.local_description().await.map(Some)
    }

    /// Valid only after `create_offer`; anything else is a silent no-op.
    pub async fn accept_answer(&mut self, remote: RTCSessionDescription) -> Result<(), PeerError> {
        if self.negotiation != NegotiationState::HaveLocalOffer {
            log(&format!(
                "Ignoring answer in negotiation state {:?}",
                self.negotiation
            ));
            return Ok(());
        }
        self.pc.set_remote_description(remote).await?;
        self.have_remote = true;
        self.negotiation = NegotiationState::Stable;
        Ok(())
    }

    /// A candidate arriving before any remote description is dropped, not
    /// queued; ICE renegotiates routes on its own.
    pub async fn add_remote_candidate(
        &mut self,
        candidate: RTCIceCandidateInit,
    ) -> Result<(), PeerError> {
        if !self.have_remote {
            log("Remote description not set, dropping candidate");
            return Ok(());
        }
        self.pc.add_ice_candidate(candidate).await?;
        Ok(())
    }

    /// Terminates the underlying connection. Idempotent.
    pub async fn close(&mut self) {
        if self.negotiation == NegotiationState::Closed {
            return;
        }
        if let Err(e) = self.pc.close().await {
            log(&format!("Peer connection close failed: {e}"));
        }
        self.negotiation = NegotiationState::Closed;
    }

    async fn local_description(&self) -> Result<RTCSessionDescription, PeerError> {
        self.pc
            .local_description()
            .await
            .ok_or(PeerError::NoLocalDescription)
    }
}
