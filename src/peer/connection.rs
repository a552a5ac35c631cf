use std::sync::Arc;

use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::config::ServerConfig;
use crate::logger::{dump_candidate, log};
use crate::peer::{PeerEvent, PeerSink};
use crate::session::PairingId;
use crate::utils::add_ice_url_scheme;

/// Maps the UI-facing server descriptions onto webrtc ICE servers.
pub fn ice_servers_from_config(servers: &[ServerConfig]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|config| RTCIceServer {
            urls: vec![add_ice_url_scheme(config)],
            username: config.username.clone().unwrap_or_default(),
            credential: config.credential.clone().unwrap_or_default(),
        })
        .collect()
}

fn rtc_config(servers: &[ServerConfig]) -> RTCConfiguration {
    RTCConfiguration {
        ice_servers: ice_servers_from_config(servers),
        ice_candidate_pool_size: 10,
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

/// Builds the peer connection for one pairing: default codecs and
/// interceptors, local tracks attached, all callbacks routed into `sink`
/// tagged with the owning pairing.
pub(crate) async fn build_peer(
    pairing: PairingId,
    ice_servers: &[ServerConfig],
    tracks: Vec<Arc<dyn TrackLocal + Send + Sync>>,
    sink: PeerSink,
) -> Result<Arc<RTCPeerConnection>, webrtc::Error> {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs()?;
    let mut registry = Registry::new();
    registry = register_default_interceptors(registry, &mut media_engine)?;

    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build();

    let pc = Arc::new(api.new_peer_connection(rtc_config(ice_servers)).await?);

    let candidate_sink = sink.clone();
    pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
        if let Some(c) = cand {
            dump_candidate("LOCAL", &c);
            if let Ok(init) = c.to_json() {
                candidate_sink(PeerEvent::LocalCandidate {
                    pairing,
                    candidate: init,
                });
            }
        } else {
            log("ICE candidate gathering completed (null candidate received)");
        }
        Box::pin(async {})
    }));

    let track_sink = sink.clone();
    pc.on_track(Box::new(move |track: Arc<TrackRemote>, _receiver, _transceiver| {
        log(&format!(
            "Remote track arrived: {} ({})",
            track.id(),
            track.codec().capability.mime_type
        ));
        track_sink(PeerEvent::RemoteTrack { pairing, track });
        Box::pin(async {})
    }));

    pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
        log(&format!("Peer connection state changed to: {state:?}"));
        sink(PeerEvent::LinkState { pairing, state });
        Box::pin(async {})
    }));

    for track in tracks {
        pc.add_track(track).await?;
    }

    Ok(pc)
}
