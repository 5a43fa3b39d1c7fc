//! Gate for the embedded voice widget.
//!
//! Chat never depends on this; front-ends read the state to decide whether
//! to offer voice input.

use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityState {
    /// No media input on this host.
    Unavailable,
    Loading,
    Ready,
    Error(String),
}

/// Host-side checks the gate relies on.
pub trait CapabilityProbe: Send + Sync {
    fn media_input_available(&self) -> bool;
}

/// Terminal hosts have no microphone bridge.
pub struct TerminalProbe;

impl CapabilityProbe for TerminalProbe {
    fn media_input_available(&self) -> bool {
        false
    }
}

pub struct CapabilityGate {
    tx: watch::Sender<CapabilityState>,
}

impl CapabilityGate {
    /// Probes once: `Loading` when media input exists, `Unavailable` otherwise.
    pub fn detect(probe: &dyn CapabilityProbe) -> Self {
        let initial = if probe.media_input_available() {
            CapabilityState::Loading
        } else {
            CapabilityState::Unavailable
        };
        tracing::debug!("[VOICE] Capability detected: {:?}", initial);
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn state(&self) -> CapabilityState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CapabilityState> {
        self.tx.subscribe()
    }

    pub fn mark_ready(&self) -> bool {
        self.finish_loading(CapabilityState::Ready)
    }

    pub fn mark_failed(&self, reason: impl Into<String>) -> bool {
        self.finish_loading(CapabilityState::Error(reason.into()))
    }

    /// Only a loading widget can settle; later reports are ignored.
    fn finish_loading(&self, next: CapabilityState) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == CapabilityState::Loading {
                *state = next;
                true
            } else {
                false
            }
        })
    }
}
