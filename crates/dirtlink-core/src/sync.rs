//! Tempo model and drift decision logic.
//!
//! The decision step is a pure function of the incoming sample and the
//! previously applied model; all mutation happens only after the rendering
//! engine has actually accepted an update.

use crate::config::SyncConfig;

/// Frequency changes below this are treated as unchanged.
const CPS_EPSILON: f64 = 1e-9;

/// The tempo model the local engine is currently running.
///
/// Anchor-based, like a transport clock: the cycle position is known exactly
/// at `anchor_time` and extrapolated linearly at `frequency` everywhere else.
/// At most one model is live at a time; it is replaced whole on every
/// accepted update, never partially mutated.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TempoModel {
    /// Cycles per second. Always > 0.
    pub frequency: f64,
    /// POSIX seconds at which `cycle` was true.
    pub anchor_time: f64,
    /// Cycle position at `anchor_time`.
    pub cycle: f64,
}

impl TempoModel {
    /// Predicted cycle position at the given POSIX time.
    pub fn cycle_at(&self, time: f64) -> f64 {
        self.cycle + (time - self.anchor_time) * self.frequency
    }
}

/// Outcome of evaluating one inbound tempo sample. Not persisted.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Decision {
    /// Whether an update should be pushed to the rendering engine.
    pub should_update: bool,
    /// Whether the sample carried phase information.
    pub has_cycle: bool,
    /// Signed drift in cycles between the locally predicted phase and the
    /// reported phase, wrapped into `[-0.5, 0.5)`. Zero when phase sync is
    /// off or no cycle was reported.
    pub phase_drift: f64,
}

/// Wrap a cycle offset into `[-0.5, 0.5)`, congruent mod 1.
///
/// Used both for phase drift and for normalizing the configured lead.
pub fn wrap_signed(value: f64) -> f64 {
    let mut wrapped = ((value % 1.0) + 1.0) % 1.0;
    if wrapped >= 0.5 {
        wrapped -= 1.0;
    }
    wrapped
}

/// Apply the configured lead offset to a reported cycle position.
///
/// The lead compensates for constant scheduling latency between the pattern
/// engine and local rendering. It is normalized into `[-0.5, 0.5)` so that a
/// lead of e.g. `3.25` behaves identically to `0.25`.
pub fn effective_cycle(cycle: f64, phase_lead: f64) -> f64 {
    cycle + wrap_signed(phase_lead)
}

/// Decide whether a new tempo sample warrants pushing an update.
///
/// Pure and side-effect-free. Rules:
/// - a frequency change beyond 1e-9 always updates;
/// - with phase sync enabled and a cycle present, drift beyond the tolerance
///   forces a realign;
/// - the first cycle-bearing sample (no usable previous model) always
///   realigns, anchoring the model.
pub fn evaluate(
    model: Option<&TempoModel>,
    cps: f64,
    cycle: Option<f64>,
    msg_time: f64,
    config: &SyncConfig,
) -> Decision {
    let cps_changed = match model {
        Some(prev) => (cps - prev.frequency).abs() >= CPS_EPSILON,
        None => true,
    };

    let phase_cycle = if config.phase_sync { cycle } else { None };
    let Some(cycle) = phase_cycle else {
        return Decision {
            should_update: cps_changed,
            has_cycle: cycle.is_some(),
            phase_drift: 0.0,
        };
    };

    let (need_realign, phase_drift) = match model {
        Some(prev) => {
            let drift = wrap_signed(prev.cycle_at(msg_time) - cycle);
            (drift.abs() > config.phase_tolerance, drift)
        }
        // First observation always anchors.
        None => (true, 0.0),
    };

    Decision {
        should_update: cps_changed || need_realign,
        has_cycle: true,
        phase_drift,
    }
}
