use webrtc::ice_transport::ice_candidate::RTCIceCandidate;

/// Timestamped stdout logging, gated by the build-time config flag.
pub fn log(msg: &str) {
    if crate::config::LOGGING_ENABLED {
        let now = chrono::Local::now();
        println!("RCC: [{}] {}", now.format("%Y-%m-%d %H:%M:%S%.3f"), msg);
    }
}

/// Prints an ICE candidate as it appears (Trickle-ICE).
pub fn dump_candidate(label: &str, cand: &RTCIceCandidate) {
    if let Ok(init) = cand.to_json() {
        log(&format!(
            "Trickle {label}: candidate={} sdp_mid={:?} sdp_mline_index={:?}",
            init.candidate, init.sdp_mid, init.sdp_mline_index
        ));
    }
}
