//! Explicitly owned, swappable provider handle.
//!
//! The read-only provider and the wallet-connected provider are mutually
//! exclusive: at most one is active at a time, and swapping between them is
//! an explicit transition that tears down the pulse tasks bound to the old
//! provider before the new one starts. Nothing here is a module-level
//! singleton; the slot is constructed once and passed where needed.

use std::time::Duration;

use alloy::providers::DynProvider;
use tracing::info;

use crate::pulse::Pulse;

/// Connectivity mode of the active provider.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProviderMode {
    /// Chain reads only, no account and no transaction signing.
    ReadOnly,
    /// A wallet is connected; reads and sends are both available.
    Wallet,
}

/// The active provider together with the pulse derived from it.
pub struct ProviderSlot {
    mode: ProviderMode,
    provider: DynProvider,
    pulse: Pulse,
    identity_interval: Duration,
}

impl ProviderSlot {
    /// Activates the given provider and starts its pulse.
    pub fn connect(provider: DynProvider, mode: ProviderMode, identity_interval: Duration) -> Self {
        let pulse = Pulse::start(provider.clone(), identity_interval);
        info!(?mode, "provider activated");
        Self {
            mode,
            provider,
            pulse,
            identity_interval,
        }
    }

    pub fn mode(&self) -> ProviderMode {
        self.mode
    }

    pub fn provider(&self) -> DynProvider {
        self.provider.clone()
    }

    pub fn pulse(&self) -> &Pulse {
        &self.pulse
    }

    /// Replaces the active provider. The old pulse is dropped first, which
    /// aborts every derivation task bound to the old provider, so no
    /// duplicate fetches or stale-provider errors can follow the swap.
    pub fn swap(&mut self, provider: DynProvider, mode: ProviderMode) {
        info!(old = ?self.mode, new = ?mode, "swapping active provider");
        self.pulse.stop();
        self.pulse = Pulse::start(provider.clone(), self.identity_interval);
        self.provider = provider;
        self.mode = mode;
    }
}
