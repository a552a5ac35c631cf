use std::sync::Arc;

use webrtc::api::media_engine::{MIME_TYPE_H264, MIME_TYPE_OPUS};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use crate::error::CaptureError;
use crate::logger::log;

/// Capture constraints, mirroring what the landing screen asks for.
#[derive(Debug, Clone)]
pub struct CaptureConstraints {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        CaptureConstraints {
            width: 640,
            height: 480,
            frame_rate: 30,
            echo_cancellation: true,
            noise_suppression: true,
        }
    }
}

/// Device acquisition seam. The session controller only ever sees this trait,
/// so tests can hand it a source that denies or fakes capture.
pub trait MediaSource: Send + Sync {
    fn acquire(&self, constraints: &CaptureConstraints) -> Result<CaptureHandle, CaptureError>;
}

/// Live capture handle. The session owns one across pairings; peer links only
/// borrow track references. Only `leave` (or a failed start) releases it.
pub struct CaptureHandle {
    tracks: Vec<Arc<TrackLocalStaticSample>>,
}

impl CaptureHandle {
    pub fn new(tracks: Vec<Arc<TrackLocalStaticSample>>) -> Self {
        CaptureHandle { tracks }
    }

    /// Borrowed track references for one peer link.
    pub fn tracks(&self) -> Vec<Arc<dyn TrackLocal + Send + Sync>> {
        self.tracks
            .iter()
            .map(|t| Arc::clone(t) as Arc<dyn TrackLocal + Send + Sync>)
            .collect()
    }

    /// Local preview sink for the presentation layer.
    pub fn preview(&self) -> Vec<Arc<TrackLocalStaticSample>> {
        self.tracks.clone()
    }

    /// Stops everything held. Safe to call when nothing was acquired.
    pub fn release(&mut self) {
        if self.tracks.is_empty() {
            return;
        }
        log(&format!("Releasing {} captured tracks", self.tracks.len()));
        self.tracks.clear();
    }

    pub fn is_released(&self) -> bool {
        self.tracks.is_empty()
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Device-less capture source: builds H264 + Opus sample tracks that a
/// frame producer can feed later. Device selection itself lives outside
/// the controller.
pub struct SampleCapture;

impl MediaSource for SampleCapture {
    fn acquire(&self, constraints: &CaptureConstraints) -> Result<CaptureHandle, CaptureError> {
        log(&format!(
            "Acquiring sample capture {}x{}@{}",
            constraints.width, constraints.height, constraints.frame_rate
        ));

        let video = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_H264.to_owned(),
                ..Default::default()
            },
            "video".to_owned(),
            "rcc-media".to_owned(),
        ));
        let audio = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                ..Default::default()
            },
            "audio".to_owned(),
            "rcc-media".to_owned(),
        ));

        Ok(CaptureHandle::new(vec![video, audio]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_is_idempotent() {
        let mut handle = SampleCapture
            .acquire(&CaptureConstraints::default())
            .unwrap();
        assert_eq!(handle.tracks().len(), 2);
        handle.release();
        assert!(handle.is_released());
        // second release is a no-op
        handle.release();
        assert!(handle.is_released());
    }

    #[test]
    fn empty_handle_release_is_a_noop() {
        let mut handle = CaptureHandle::new(Vec::new());
        handle.release();
        assert!(handle.is_released());
    }
}
