use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::session::{EngineEvent, PairingId};

/// Turns raw keystrokes into at most one `typing` start per burst and exactly
/// one matching `stop_typing`, emitted after a quiet period or on explicit
/// send. The quiet timer is an abortable sleep task that posts back into the
/// controller loop, tagged with its pairing.
pub(crate) struct TypingDebounce {
    quiet: Duration,
    active: bool,
    timer: Option<JoinHandle<()>>,
}

impl TypingDebounce {
    pub fn new(quiet: Duration) -> Self {
        TypingDebounce {
            quiet,
            active: false,
            timer: None,
        }
    }

    /// Registers a local keystroke and (re)arms the quiet timer. Returns true
    /// when this keystroke opens a burst and a `typing` start must go out.
    pub fn keystroke(
        &mut self,
        pairing: PairingId,
        expiry: &mpsc::UnboundedSender<EngineEvent>,
    ) -> bool {
        let started = !self.active;
        self.active = true;

        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        let tx = expiry.clone();
        let quiet = self.quiet;
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            let _ = tx.send(EngineEvent::TypingExpired(pairing));
        }));

        started
    }

    /// Explicit end of the burst (message send or teardown). Returns true
    /// when a `stop_typing` must go out.
    pub fn flush(&mut self) -> bool {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        let was_active = self.active;
        self.active = false;
        was_active
    }

    /// The quiet timer fired. Returns true when a `stop_typing` must go out.
    pub fn expired(&mut self) -> bool {
        self.timer = None;
        let was_active = self.active;
        self.active = false;
        was_active
    }
}

impl Drop for TypingDebounce {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
