//! Synchronization configuration.

/// Tunables for the tempo decision loop.
///
/// The engine treats this as an immutable snapshot per inbound event; the
/// host replaces the whole struct to reconfigure, it is never mutated in
/// place mid-decision.
#[derive(Clone, Debug, PartialEq)]
pub struct SyncConfig {
    /// Correct phase drift, not just tempo changes.
    pub phase_sync: bool,
    /// Allowed phase drift, in cycles, before a realign is forced.
    pub phase_tolerance: f64,
    /// Constant offset, in cycles, added to incoming phase to compensate for
    /// fixed scheduling latency between the pattern engine and local
    /// rendering.
    pub phase_lead: f64,
    /// Verbose per-packet logging.
    pub debug: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            phase_sync: true,
            phase_tolerance: 1.0 / 64.0,
            phase_lead: 0.0,
            debug: false,
        }
    }
}
