use std::fmt;

use crate::peer::PeerLink;
use crate::session::typing::TypingDebounce;

/// Locally generated, monotonically increasing tag for one pairing. The wire
/// protocol carries no pairing identity, so every asynchronous continuation
/// captures the id it was spawned under and is checked against the current
/// one before any of its effects apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairingId(u64);

impl PairingId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        PairingId(raw)
    }
}

impl fmt::Display for PairingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pairing #{}", self.0)
    }
}

/// The matched stranger. Replaced wholesale on every new pairing, never
/// mutated in place.
#[derive(Debug, Clone)]
pub struct Partner {
    pub nickname: String,
}

/// Top-level controller state. Each variant carries only the data valid in
/// that state; `Idle` is simply the absence of a running controller. `Closed`
/// is terminal: explicit leave or unrecoverable channel loss.
pub(crate) enum Phase {
    /// Channel open, waiting for the server greeting.
    Connecting,
    Searching,
    Paired(Pairing),
    Closed,
}

impl Phase {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Phase::Connecting => "connecting",
            Phase::Searching => "searching",
            Phase::Paired(_) => "paired",
            Phase::Closed => "closed",
        }
    }
}

/// One matched episode. The peer link exists only here and only in video
/// mode, so the "PeerLink iff video and partnered" invariant holds by
/// construction.
pub(crate) struct Pairing {
    pub id: PairingId,
    pub partner: Partner,
    pub link: Option<PeerLink>,
    pub remote_typing: bool,
    pub typing: TypingDebounce,
}
