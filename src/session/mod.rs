//! The session controller: a single-task state machine that interprets the
//! signaling event stream, drives peer link negotiation for video pairings
//! and keeps the presentation layer consistent with the true pairing state.

mod state;
mod typing;

use std::mem;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

use crate::config::{default_ice_servers, validate_ice_servers, SessionConfig, MIN_NICKNAME_LEN};
use crate::error::{PeerError, StartError};
use crate::events::{ChatEntry, ChatMode, ClientRequest, ServerEvent, UiEvent};
use crate::logger::log;
use crate::media::{CaptureConstraints, CaptureHandle, MediaSource};
use crate::peer::{PeerEvent, PeerLink, PeerSink};
use crate::session::state::{Pairing, Phase};
use crate::session::typing::TypingDebounce;
use crate::signaling::{ChannelEvent, SignalingChannel};

pub use state::{PairingId, Partner};

/// Outgoing user actions, fed to the controller through a `SessionHandle`.
pub enum UserAction {
    SendMessage(String),
    /// One raw keystroke in the message box; debounced into typing signals.
    Keystroke,
    /// Drop the current partner and ask the server for a new one.
    Next,
    /// Close everything and return to idle.
    Leave,
}

/// Internal loop feed: peer link callbacks and typing timer expiries, each
/// tagged with the pairing it was spawned for.
pub(crate) enum EngineEvent {
    Peer(PeerEvent),
    TypingExpired(PairingId),
}

#[derive(Debug, PartialEq)]
enum Flow {
    Continue,
    Stop,
}

pub struct Session;

impl Session {
    /// Validates the nickname, acquires media in video mode, opens the
    /// signaling channel and spawns the controller loop. Nothing is opened
    /// when validation or capture fails, and a capture acquired for a start
    /// that then fails is released before the error is returned.
    pub async fn start(
        mut config: SessionConfig,
        media: &dyn MediaSource,
        ui: mpsc::UnboundedSender<UiEvent>,
        nickname: &str,
        mode: ChatMode,
    ) -> Result<SessionHandle, StartError> {
        let nickname = nickname.trim().to_string();
        if nickname.chars().count() < MIN_NICKNAME_LEN {
            return Err(StartError::InputInvalid);
        }

        if !validate_ice_servers(&config.ice_servers) {
            log("Supplied ICE server list is invalid, using defaults");
            config.ice_servers = default_ice_servers();
        }

        let capture = match mode {
            ChatMode::Video => Some(media.acquire(&CaptureConstraints::default())?),
            ChatMode::Text => None,
        };

        let channel = match SignalingChannel::connect(&config, &nickname, mode).await {
            Ok(channel) => channel,
            Err(e) => {
                if let Some(mut capture) = capture {
                    capture.release();
                }
                return Err(e.into());
            }
        };

        if let Some(capture) = &capture {
            let _ = ui.send(UiEvent::LocalPreview(capture.preview()));
        }

        let (outbound, inbound) = channel.into_parts();
        let (actions_tx, actions_rx) = mpsc::unbounded_channel();
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();

        let controller = SessionController {
            nickname,
            mode,
            config,
            ui,
            capture,
            outbound: Some(outbound),
            engine: engine_tx,
            phase: Phase::Connecting,
            pairing_seq: 0,
            transcript: Vec::new(),
        };

        let task = tokio::spawn(run(controller, inbound, actions_rx, engine_rx));
        Ok(SessionHandle {
            actions: actions_tx,
            task,
        })
    }
}

/// Cheap cloneless handle to a running session. Actions sent after the
/// session closed are silently dropped, which makes `leave` idempotent.
pub struct SessionHandle {
    actions: mpsc::UnboundedSender<UserAction>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn send_message(&self, text: impl Into<String>) {
        let _ = self.actions.send(UserAction::SendMessage(text.into()));
    }

    pub fn keystroke(&self) {
        let _ = self.actions.send(UserAction::Keystroke);
    }

    pub fn next(&self) {
        let _ = self.actions.send(UserAction::Next);
    }

    pub fn leave(&self) {
        let _ = self.actions.send(UserAction::Leave);
    }

    /// Resolves once the controller loop has fully shut down.
    pub async fn closed(self) {
        let _ = self.task.await;
    }
}

/// Strict arrival-order event loop: signaling events, user actions and
/// engine events are handled one at a time, never reordered or batched.
async fn run(
    mut ctl: SessionController,
    mut signals: mpsc::UnboundedReceiver<ChannelEvent>,
    mut actions: mpsc::UnboundedReceiver<UserAction>,
    mut engine: mpsc::UnboundedReceiver<EngineEvent>,
) {
    loop {
        tokio::select! {
            event = signals.recv() => match event {
                Some(ChannelEvent::Event(event)) => ctl.handle_signal(event).await,
                Some(ChannelEvent::Lost) | None => {
                    ctl.on_channel_lost().await;
                    break;
                }
            },
            action = actions.recv() => match action {
                Some(action) => {
                    if ctl.handle_action(action).await == Flow::Stop {
                        break;
                    }
                }
                // every handle is gone; treat it as leave
                None => {
                    ctl.handle_action(UserAction::Leave).await;
                    break;
                }
            },
            Some(event) = engine.recv() => ctl.handle_engine(event).await,
        }
    }
}

pub(crate) struct SessionController {
    nickname: String,
    mode: ChatMode,
    config: SessionConfig,
    ui: mpsc::UnboundedSender<UiEvent>,
    /// Owned across pairings; peer links only borrow track references.
    capture: Option<CaptureHandle>,
    /// `None` once the session is closed; dropping it closes the websocket.
    outbound: Option<mpsc::UnboundedSender<ClientRequest>>,
    engine: mpsc::UnboundedSender<EngineEvent>,
    phase: Phase,
    pairing_seq: u64,
    transcript: Vec<ChatEntry>,
}

impl SessionController {
    async fn handle_signal(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Connected { message, .. } => {
                if !matches!(self.phase, Phase::Connecting) {
                    log(&format!("'connected' while {}, ignoring", self.phase.name()));
                    return;
                }
                self.phase = Phase::Searching;
                self.system(message);
            }

            ServerEvent::Searching { message } => {
                if matches!(self.phase, Phase::Closed) {
                    return;
                }
                self.teardown_pairing().await;
                self.phase = Phase::Searching;
                self.system(message);
            }

            ServerEvent::PartnerFound {
                partner_nickname,
                initiator,
            } => self.on_partner_found(partner_nickname, initiator).await,

            ServerEvent::PartnerDisconnected => {
                if !matches!(self.phase, Phase::Paired(_)) {
                    log("'partner_disconnected' without a partner, ignoring");
                    return;
                }
                self.teardown_pairing().await;
                // no automatic re-search: the user asks for the next partner
                self.system("Partner disconnected. Press next to find someone new.");
            }

            ServerEvent::ChatMessage { message, nickname } => {
                if !matches!(self.phase, Phase::Paired(_)) {
                    log("chat message without a partner, dropping");
                    return;
                }
                self.append_entry(ChatEntry {
                    nickname,
                    text: message,
                    mine: false,
                    ts: chrono::Utc::now().timestamp(),
                });
            }

            ServerEvent::Typing => self.set_remote_typing(true),
            ServerEvent::StopTyping => self.set_remote_typing(false),

            ServerEvent::Offer { sdp } => self.on_offer(sdp).await,
            ServerEvent::Answer { sdp } => self.on_answer(sdp).await,
            ServerEvent::IceCandidate { candidate } => {
                self.on_remote_candidate(candidate).await
            }
        }
    }

    async fn on_partner_found(&mut self, partner_nickname: String, initiator: bool) {
        match self.phase {
            Phase::Searching | Phase::Paired(_) => {}
            _ => {
                log(&format!(
                    "'partner_found' while {}, ignoring",
                    self.phase.name()
                ));
                return;
            }
        }

        // the stale pairing must be fully gone before anything can touch
        // the new one
        self.teardown_pairing().await;

        self.pairing_seq += 1;
        let id = PairingId::from_raw(self.pairing_seq);
        log(&format!(
            "{id}: matched with {partner_nickname} (initiator={initiator})"
        ));

        let link = match self.mode {
            ChatMode::Video => {
                match build_link(&self.config, self.capture.as_ref(), &self.engine, id).await {
                    Ok(link) => Some(link),
                    Err(e) => {
                        log(&format!("Failed to build peer link: {e}"));
                        self.system("Failed to set up video connection. Please try again.");
                        None
                    }
                }
            }
            ChatMode::Text => None,
        };

        let mut pairing = Pairing {
            id,
            partner: Partner {
                nickname: partner_nickname.clone(),
            },
            link,
            remote_typing: false,
            typing: TypingDebounce::new(self.config.typing_quiet),
        };

        self.ui(UiEvent::PartnerOnline {
            nickname: partner_nickname.clone(),
        });
        self.system(format!("Connected with {partner_nickname}! Say hi 👋"));

        if initiator {
            if let Some(link) = pairing.link.as_mut() {
                match link.create_offer().await {
                    Ok(sdp) => self.send(ClientRequest::Offer { sdp }),
                    Err(e) => {
                        log(&format!("Failed to create offer: {e}"));
                        self.system("Failed to initiate video call. Please try again.");
                    }
                }
            }
        }

        self.phase = Phase::Paired(pairing);
    }

    async fn on_offer(&mut self, sdp: RTCSessionDescription) {
        if self.mode != ChatMode::Video {
            log("'offer' in text mode, discarding");
            return;
        }

        let mut reply = None;
        let mut failed = false;
        if let Phase::Paired(pairing) = &mut self.phase {
            if pairing.link.is_none() {
                // eager construction failed earlier; build one now
                match build_link(&self.config, self.capture.as_ref(), &self.engine, pairing.id)
                    .await
                {
                    Ok(link) => pairing.link = Some(link),
                    Err(e) => {
                        log(&format!("Failed to build peer link for offer: {e}"));
                        failed = true;
                    }
                }
            }
            if let Some(link) = pairing.link.as_mut() {
                match link.accept_offer(sdp).await {
                    Ok(Some(answer)) => reply = Some(ClientRequest::Answer { sdp: answer }),
                    Ok(None) => {}
                    Err(e) => {
                        log(&format!("Failed to accept offer: {e}"));
                        failed = true;
                    }
                }
            }
        } else {
            log("'offer' outside a pairing, discarding as stale");
        }

        if let Some(reply) = reply {
            self.send(reply);
        }
        if failed {
            self.system("Failed to accept video call. Please try again.");
        }
    }

    async fn on_answer(&mut self, sdp: RTCSessionDescription) {
        let mut failed = false;
        match &mut self.phase {
            Phase::Paired(pairing) => match pairing.link.as_mut() {
                // silent no-op inside unless we actually have a local offer
                Some(link) => {
                    if let Err(e) = link.accept_answer(sdp).await {
                        log(&format!("Failed to accept answer: {e}"));
                        failed = true;
                    }
                }
                None => log("'answer' with no live peer link, discarding as stale"),
            },
            _ => log("'answer' outside a pairing, discarding as stale"),
        }
        if failed {
            self.system("Video connection error. Please try again.");
        }
    }

    async fn on_remote_candidate(&mut self, candidate: RTCIceCandidateInit) {
        match &mut self.phase {
            Phase::Paired(pairing) => match pairing.link.as_mut() {
                Some(link) => {
                    if let Err(e) = link.add_remote_candidate(candidate).await {
                        log(&format!("Failed to add remote candidate: {e}"));
                    }
                }
                None => log("candidate with no live peer link, discarding as stale"),
            },
            _ => log("candidate outside a pairing, discarding as stale"),
        }
    }

    async fn handle_action(&mut self, action: UserAction) -> Flow {
        match action {
            UserAction::SendMessage(text) => {
                self.send_message(text);
                Flow::Continue
            }
            UserAction::Keystroke => {
                self.on_keystroke();
                Flow::Continue
            }
            UserAction::Next => {
                self.on_next().await;
                Flow::Continue
            }
            UserAction::Leave => {
                self.on_leave().await;
                Flow::Stop
            }
        }
    }

    fn send_message(&mut self, text: String) {
        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }
        let stop_typing = match &mut self.phase {
            Phase::Paired(pairing) => pairing.typing.flush(),
            _ => {
                log("No partner assigned, dropping outgoing message");
                return;
            }
        };

        // optimistic: appended locally without awaiting acknowledgment
        self.send(ClientRequest::ChatMessage {
            message: text.clone(),
        });
        self.append_entry(ChatEntry {
            nickname: self.nickname.clone(),
            text,
            mine: true,
            ts: chrono::Utc::now().timestamp(),
        });
        if stop_typing {
            self.send(ClientRequest::StopTyping);
        }
    }

    fn on_keystroke(&mut self) {
        let start = match &mut self.phase {
            Phase::Paired(pairing) => pairing.typing.keystroke(pairing.id, &self.engine),
            _ => return,
        };
        if start {
            self.send(ClientRequest::Typing);
        }
    }

    async fn on_next(&mut self) {
        if matches!(self.phase, Phase::Closed) {
            log("'next' after close, ignoring");
            return;
        }
        self.teardown_pairing().await;
        self.transcript.clear();
        self.ui(UiEvent::TranscriptCleared);
        // the channel stays open; the server answers with 'searching'
        self.send(ClientRequest::Next);
    }

    async fn on_leave(&mut self) {
        if matches!(self.phase, Phase::Closed) {
            return;
        }
        self.teardown_pairing().await;
        self.phase = Phase::Closed;
        // dropping the writer queue closes the websocket
        self.outbound = None;
        if let Some(mut capture) = self.capture.take() {
            capture.release();
        }
        self.transcript.clear();
        self.ui(UiEvent::TranscriptCleared);
        self.ui(UiEvent::Closed);
    }

    async fn on_channel_lost(&mut self) {
        if matches!(self.phase, Phase::Closed) {
            return;
        }
        log("Signaling channel lost");
        self.teardown_pairing().await;
        self.phase = Phase::Closed;
        self.outbound = None;
        if let Some(mut capture) = self.capture.take() {
            capture.release();
        }
        self.system("Connection lost. Please start a new chat to reconnect.");
        self.ui(UiEvent::ChannelLost);
        self.ui(UiEvent::Closed);
    }

    async fn handle_engine(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Peer(PeerEvent::LocalCandidate { pairing, candidate }) => {
                if self.current_pairing() == Some(pairing) {
                    self.send(ClientRequest::IceCandidate { candidate });
                } else {
                    log(&format!("Local candidate for superseded {pairing}, discarding"));
                }
            }
            EngineEvent::Peer(PeerEvent::RemoteTrack { pairing, track }) => {
                if self.current_pairing() == Some(pairing) {
                    self.ui(UiEvent::RemoteMedia(track));
                } else {
                    log(&format!("Remote track for superseded {pairing}, discarding"));
                }
            }
            EngineEvent::Peer(PeerEvent::LinkState { pairing, state }) => {
                if self.current_pairing() == Some(pairing)
                    && state == RTCPeerConnectionState::Failed
                {
                    self.system("Video connection failed. Try switching to text mode.");
                }
            }
            EngineEvent::TypingExpired(pairing) => {
                let stop = match &mut self.phase {
                    Phase::Paired(p) if p.id == pairing => p.typing.expired(),
                    _ => {
                        log(&format!("Typing timer for superseded {pairing}, discarding"));
                        false
                    }
                };
                if stop {
                    self.send(ClientRequest::StopTyping);
                }
            }
        }
    }

    /// Closes and discards the current pairing, if any. The old peer link is
    /// `Closed` before this returns, so no successor can coexist with it.
    async fn teardown_pairing(&mut self) {
        match mem::replace(&mut self.phase, Phase::Searching) {
            Phase::Paired(mut pairing) => {
                log(&format!("Tearing down {}", pairing.id));
                if pairing.typing.flush() {
                    self.send(ClientRequest::StopTyping);
                }
                if let Some(mut link) = pairing.link.take() {
                    link.close().await;
                    self.ui(UiEvent::RemoteMediaCleared);
                }
                if pairing.remote_typing {
                    self.ui(UiEvent::RemoteTyping(false));
                }
                self.ui(UiEvent::PartnerCleared);
            }
            other => self.phase = other,
        }
    }

    fn set_remote_typing(&mut self, on: bool) {
        let changed = match &mut self.phase {
            Phase::Paired(pairing) if pairing.remote_typing != on => {
                pairing.remote_typing = on;
                true
            }
            _ => false,
        };
        if changed {
            self.ui(UiEvent::RemoteTyping(on));
        }
    }

    fn append_entry(&mut self, entry: ChatEntry) {
        self.transcript.push(entry.clone());
        self.ui(UiEvent::Message(entry));
    }

    fn current_pairing(&self) -> Option<PairingId> {
        match &self.phase {
            Phase::Paired(pairing) => Some(pairing.id),
            _ => None,
        }
    }

    fn send(&self, request: ClientRequest) {
        match &self.outbound {
            Some(outbound) => {
                if outbound.send(request).is_err() {
                    log("Signaling writer gone, dropping request");
                }
            }
            None => log("Session closed, dropping request"),
        }
    }

    fn ui(&self, event: UiEvent) {
        let _ = self.ui.send(event);
    }

    fn system(&self, message: impl Into<String>) {
        self.ui(UiEvent::System(message.into()));
    }
}

/// Builds the peer link for one pairing, wiring its callbacks back into the
/// controller loop tagged with the pairing id.
async fn build_link(
    config: &SessionConfig,
    capture: Option<&CaptureHandle>,
    engine: &mpsc::UnboundedSender<EngineEvent>,
    id: PairingId,
) -> Result<PeerLink, PeerError> {
    let tracks = capture.map(|c| c.tracks()).unwrap_or_default();
    let tx = engine.clone();
    let sink: PeerSink = Arc::new(move |event| {
        let _ = tx.send(EngineEvent::Peer(event));
    });
    PeerLink::new(id, &config.ice_servers, tracks, sink).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_ice_servers;
    use crate::error::CaptureError;
    use crate::media::SampleCapture;
    use crate::peer::NegotiationState;
    use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
    use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

    type Harness = (
        SessionController,
        mpsc::UnboundedReceiver<ClientRequest>,
        mpsc::UnboundedReceiver<UiEvent>,
        mpsc::UnboundedReceiver<EngineEvent>,
    );

    fn controller(mode: ChatMode) -> Harness {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (ui_tx, ui_rx) = mpsc::unbounded_channel();
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();

        let capture = match mode {
            ChatMode::Video => Some(
                SampleCapture
                    .acquire(&CaptureConstraints::default())
                    .unwrap(),
            ),
            ChatMode::Text => None,
        };

        let ctl = SessionController {
            nickname: "Al".into(),
            mode,
            config: SessionConfig::default(),
            ui: ui_tx,
            capture,
            outbound: Some(out_tx),
            engine: engine_tx,
            phase: Phase::Connecting,
            pairing_seq: 0,
            transcript: Vec::new(),
        };
        (ctl, out_rx, ui_rx, engine_rx)
    }

    async fn pair(ctl: &mut SessionController, nickname: &str, initiator: bool) {
        ctl.handle_signal(ServerEvent::Connected {
            user_id: None,
            message: "Welcome".into(),
        })
        .await;
        ctl.handle_signal(ServerEvent::PartnerFound {
            partner_nickname: nickname.into(),
            initiator,
        })
        .await;
    }

    fn link_state(ctl: &SessionController) -> NegotiationState {
        match &ctl.phase {
            Phase::Paired(pairing) => pairing.link.as_ref().unwrap().negotiation(),
            _ => panic!("not paired"),
        }
    }

    async fn remote_link(pairing: u64) -> PeerLink {
        let capture = SampleCapture
            .acquire(&CaptureConstraints::default())
            .unwrap();
        let sink: PeerSink = Arc::new(|_| {});
        PeerLink::new(
            PairingId::from_raw(pairing),
            &default_ice_servers(),
            capture.tracks(),
            sink,
        )
        .await
        .unwrap()
    }

    struct DeniedCapture;
    impl MediaSource for DeniedCapture {
        fn acquire(&self, _: &CaptureConstraints) -> Result<CaptureHandle, CaptureError> {
            Err(CaptureError::PermissionDenied)
        }
    }

    struct SharedTrackCapture(Arc<TrackLocalStaticSample>);
    impl MediaSource for SharedTrackCapture {
        fn acquire(&self, _: &CaptureConstraints) -> Result<CaptureHandle, CaptureError> {
            Ok(CaptureHandle::new(vec![self.0.clone()]))
        }
    }

    #[tokio::test]
    async fn short_nickname_rejected_before_anything_opens() {
        let (ui_tx, _ui_rx) = mpsc::unbounded_channel();
        // the endpoint is unreachable: reaching it would fail differently
        let config = SessionConfig {
            server_url: "ws://127.0.0.1:1".into(),
            ..Default::default()
        };
        let err = Session::start(config, &SampleCapture, ui_tx, "  A  ", ChatMode::Text)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StartError::InputInvalid));
    }

    #[tokio::test]
    async fn media_denial_blocks_video_start_before_the_channel() {
        let (ui_tx, _ui_rx) = mpsc::unbounded_channel();
        let config = SessionConfig {
            server_url: "ws://127.0.0.1:1".into(),
            ..Default::default()
        };
        let err = Session::start(config, &DeniedCapture, ui_tx, "Al", ChatMode::Video)
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            StartError::Media(CaptureError::PermissionDenied)
        ));
    }

    #[tokio::test]
    async fn failed_video_start_releases_the_capture() {
        let (ui_tx, _ui_rx) = mpsc::unbounded_channel();
        let config = SessionConfig {
            server_url: "ws://127.0.0.1:1".into(),
            ..Default::default()
        };
        let source = SharedTrackCapture(Arc::new(TrackLocalStaticSample::new(
            Default::default(),
            "video".to_owned(),
            "test".to_owned(),
        )));
        let err = Session::start(config, &source, ui_tx, "Al", ChatMode::Video)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StartError::Channel(_)));
        // the handle must have let go of the device tracks
        assert_eq!(Arc::strong_count(&source.0), 1);
    }

    #[tokio::test]
    async fn text_pairing_without_initiator_creates_no_offer() {
        let (mut ctl, mut out, mut ui, _engine) = controller(ChatMode::Text);
        pair(&mut ctl, "Bo", false).await;

        assert!(matches!(ctl.phase, Phase::Paired(_)));
        match &ctl.phase {
            Phase::Paired(pairing) => {
                assert_eq!(pairing.partner.nickname, "Bo");
                assert!(pairing.link.is_none());
            }
            _ => unreachable!(),
        }
        assert!(out.try_recv().is_err(), "nothing should have been sent");
        assert!(matches!(ui.try_recv(), Ok(UiEvent::System(m)) if m == "Welcome"));
    }

    #[tokio::test]
    async fn partner_found_replaces_partner_and_advances_the_pairing() {
        let (mut ctl, _out, _ui, _engine) = controller(ChatMode::Text);
        pair(&mut ctl, "Bo", false).await;
        let first = ctl.current_pairing().unwrap();

        // a new match may arrive while the old pairing is still displayed
        ctl.handle_signal(ServerEvent::PartnerFound {
            partner_nickname: "Cy".into(),
            initiator: false,
        })
        .await;

        let second = ctl.current_pairing().unwrap();
        assert_ne!(first, second);
        assert_eq!(ctl.pairing_seq, 2);
        match &ctl.phase {
            Phase::Paired(pairing) => assert_eq!(pairing.partner.nickname, "Cy"),
            _ => panic!("not paired"),
        }
    }

    #[tokio::test]
    async fn video_initiator_negotiates_to_stable() {
        let (mut ctl, mut out, _ui, _engine) = controller(ChatMode::Video);
        pair(&mut ctl, "Bo", true).await;

        let offer = match out.try_recv() {
            Ok(ClientRequest::Offer { sdp }) => sdp,
            _ => panic!("expected an offer to be transmitted"),
        };
        assert_eq!(link_state(&ctl), NegotiationState::HaveLocalOffer);

        let mut callee = remote_link(99).await;
        let answer = callee.accept_offer(offer).await.unwrap().unwrap();

        ctl.handle_signal(ServerEvent::Answer { sdp: answer }).await;
        assert_eq!(link_state(&ctl), NegotiationState::Stable);

        callee.close().await;
        ctl.handle_action(UserAction::Leave).await;
    }

    #[tokio::test]
    async fn video_answerer_replies_to_an_offer() {
        let (mut ctl, mut out, _ui, _engine) = controller(ChatMode::Video);
        pair(&mut ctl, "Bo", false).await;
        assert!(out.try_recv().is_err(), "answerer must not offer");

        let mut caller = remote_link(99).await;
        let offer = caller.create_offer().await.unwrap();

        ctl.handle_signal(ServerEvent::Offer { sdp: offer }).await;
        let answer = match out.try_recv() {
            Ok(ClientRequest::Answer { sdp }) => sdp,
            _ => panic!("expected an answer to be transmitted"),
        };
        assert_eq!(link_state(&ctl), NegotiationState::Stable);

        caller.accept_answer(answer).await.unwrap();
        assert_eq!(caller.negotiation(), NegotiationState::Stable);

        caller.close().await;
        ctl.handle_action(UserAction::Leave).await;
    }

    #[tokio::test]
    async fn stale_negotiation_traffic_never_reaches_the_new_pairing() {
        let (mut ctl, mut out, _ui, _engine) = controller(ChatMode::Video);
        pair(&mut ctl, "Bo", false).await;
        let old = ctl.current_pairing().unwrap();

        ctl.handle_signal(ServerEvent::PartnerDisconnected).await;
        ctl.handle_signal(ServerEvent::PartnerFound {
            partner_nickname: "Cy".into(),
            initiator: false,
        })
        .await;

        // a candidate from Bo's negotiation arrives late: the new link has no
        // remote description, so it is dropped without effect
        ctl.handle_signal(ServerEvent::IceCandidate {
            candidate: RTCIceCandidateInit {
                candidate: "candidate:0 1 UDP 1 192.0.2.1 50000 typ host".into(),
                ..Default::default()
            },
        })
        .await;
        assert_eq!(link_state(&ctl), NegotiationState::New);

        // a local candidate spawned under the old pairing is discarded too
        ctl.handle_engine(EngineEvent::Peer(PeerEvent::LocalCandidate {
            pairing: old,
            candidate: RTCIceCandidateInit::default(),
        }))
        .await;
        while let Ok(request) = out.try_recv() {
            assert!(!matches!(request, ClientRequest::IceCandidate { .. }));
        }

        ctl.handle_action(UserAction::Leave).await;
    }

    #[tokio::test]
    async fn partner_disconnect_returns_to_searching_without_auto_search() {
        let (mut ctl, mut out, mut ui, _engine) = controller(ChatMode::Text);
        pair(&mut ctl, "Bo", false).await;

        ctl.handle_signal(ServerEvent::PartnerDisconnected).await;
        assert!(matches!(ctl.phase, Phase::Searching));
        assert!(out.try_recv().is_err(), "no 'next' may be sent on its own");

        let mut cleared = false;
        while let Ok(event) = ui.try_recv() {
            if matches!(event, UiEvent::PartnerCleared) {
                cleared = true;
            }
        }
        assert!(cleared);
    }

    #[tokio::test]
    async fn send_message_appends_locally_and_flushes_the_typing_burst() {
        let (mut ctl, mut out, _ui, _engine) = controller(ChatMode::Text);
        pair(&mut ctl, "Bo", false).await;

        ctl.handle_action(UserAction::Keystroke).await;
        assert!(matches!(out.try_recv(), Ok(ClientRequest::Typing)));

        ctl.handle_action(UserAction::SendMessage("hi there".into()))
            .await;
        assert!(
            matches!(out.try_recv(), Ok(ClientRequest::ChatMessage { message }) if message == "hi there")
        );
        assert!(matches!(out.try_recv(), Ok(ClientRequest::StopTyping)));

        assert_eq!(ctl.transcript.len(), 1);
        assert!(ctl.transcript[0].mine);
        assert_eq!(ctl.transcript[0].text, "hi there");
    }

    #[tokio::test]
    async fn send_message_without_partner_is_a_noop() {
        let (mut ctl, mut out, _ui, _engine) = controller(ChatMode::Text);
        ctl.handle_signal(ServerEvent::Connected {
            user_id: None,
            message: "Welcome".into(),
        })
        .await;

        ctl.handle_action(UserAction::SendMessage("hello?".into()))
            .await;
        assert!(out.try_recv().is_err());
        assert!(ctl.transcript.is_empty());
    }

    #[tokio::test]
    async fn next_clears_the_transcript_and_keeps_the_channel() {
        let (mut ctl, mut out, mut ui, _engine) = controller(ChatMode::Text);
        pair(&mut ctl, "Bo", false).await;
        ctl.handle_signal(ServerEvent::ChatMessage {
            message: "hey".into(),
            nickname: "Bo".into(),
        })
        .await;
        assert_eq!(ctl.transcript.len(), 1);

        ctl.handle_action(UserAction::Next).await;
        assert!(ctl.transcript.is_empty());
        assert!(matches!(ctl.phase, Phase::Searching));
        assert!(ctl.outbound.is_some(), "channel must stay open");

        let mut saw_next = false;
        while let Ok(request) = out.try_recv() {
            if matches!(request, ClientRequest::Next) {
                saw_next = true;
            }
        }
        assert!(saw_next);

        let mut saw_cleared = false;
        while let Ok(event) = ui.try_recv() {
            if matches!(event, UiEvent::TranscriptCleared) {
                saw_cleared = true;
            }
        }
        assert!(saw_cleared);
    }

    #[tokio::test]
    async fn remote_typing_toggles_the_indicator_once() {
        let (mut ctl, _out, mut ui, _engine) = controller(ChatMode::Text);
        pair(&mut ctl, "Bo", false).await;
        while ui.try_recv().is_ok() {}

        ctl.handle_signal(ServerEvent::Typing).await;
        ctl.handle_signal(ServerEvent::Typing).await;
        ctl.handle_signal(ServerEvent::StopTyping).await;

        assert!(matches!(ui.try_recv(), Ok(UiEvent::RemoteTyping(true))));
        assert!(matches!(ui.try_recv(), Ok(UiEvent::RemoteTyping(false))));
        assert!(ui.try_recv().is_err());
    }

    #[tokio::test]
    async fn leave_is_idempotent_and_releases_everything() {
        let (mut ctl, _out, mut ui, _engine) = controller(ChatMode::Video);
        pair(&mut ctl, "Bo", false).await;

        assert_eq!(ctl.handle_action(UserAction::Leave).await, Flow::Stop);
        assert!(matches!(ctl.phase, Phase::Closed));
        assert!(ctl.capture.is_none());
        assert!(ctl.outbound.is_none());

        assert_eq!(ctl.handle_action(UserAction::Leave).await, Flow::Stop);

        let mut closed = 0;
        while let Ok(event) = ui.try_recv() {
            if matches!(event, UiEvent::Closed) {
                closed += 1;
            }
        }
        assert_eq!(closed, 1);
    }

    #[tokio::test]
    async fn channel_loss_closes_the_session_and_disables_sending() {
        let (mut ctl, mut out, mut ui, _engine) = controller(ChatMode::Text);
        pair(&mut ctl, "Bo", false).await;
        while out.try_recv().is_ok() {}

        ctl.on_channel_lost().await;
        assert!(matches!(ctl.phase, Phase::Closed));

        ctl.handle_action(UserAction::SendMessage("anyone?".into()))
            .await;
        assert!(out.try_recv().is_err());

        let mut lost = false;
        while let Ok(event) = ui.try_recv() {
            if matches!(event, UiEvent::ChannelLost) {
                lost = true;
            }
        }
        assert!(lost);
    }
}
