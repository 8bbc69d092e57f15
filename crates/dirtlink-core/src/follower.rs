//! The tempo follower: per-message control loop.
//!
//! Runs inline on the receiver's reactor thread. For every `/dirt/play`
//! message it normalizes the arguments, timestamps the sample (bundle timetag
//! or local clock), evaluates drift against the retained model, and — when an
//! update is warranted — builds the candidate list and offers it to the
//! rendering engine. The model is replaced only after the engine accepts.

use crate::config::SyncConfig;
use crate::event::DirtPlayEvent;
use crate::receiver::{InboundMessage, MessageHandler};
use crate::sync::{self, TempoModel};
use crate::tempo::{self, TempoSink};
use crate::timetag;

/// The OSC address this follower tracks.
pub const PLAY_ADDR: &str = "/dirt/play";

/// Counters for the follower's activity. Diagnostic only.
#[derive(Clone, Copy, Debug, Default)]
pub struct FollowerStats {
    /// `/dirt/play` events seen.
    pub events: u64,
    /// Updates accepted by the sink.
    pub updates: u64,
    /// Updates rejected by every candidate shape.
    pub failures: u64,
}

/// Tracks `/dirt/play` traffic and keeps a rendering engine's tempo in step.
pub struct TempoFollower<S: TempoSink> {
    config: SyncConfig,
    sink: S,
    model: Option<TempoModel>,
    stats: FollowerStats,
}

impl<S: TempoSink> TempoFollower<S> {
    pub fn new(config: SyncConfig, sink: S) -> Self {
        Self {
            config,
            sink,
            model: None,
            stats: FollowerStats::default(),
        }
    }

    /// The currently applied model, if any update has been accepted yet.
    pub fn model(&self) -> Option<TempoModel> {
        self.model
    }

    /// Activity counters.
    pub fn stats(&self) -> FollowerStats {
        self.stats
    }

    /// Replace the configuration snapshot used for subsequent decisions.
    pub fn set_config(&mut self, config: SyncConfig) {
        self.config = config;
    }

    /// Consume the follower, returning its sink.
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Evaluate one play event and push a tempo update if needed.
    ///
    /// Errors are contained here: a failed apply leaves the model unchanged
    /// and the next sample re-evaluates from the prior state.
    fn handle_play(&mut self, event: &DirtPlayEvent, msg_time: f64) {
        self.stats.events += 1;

        let Some(cps) = event.cps.filter(|_| event.is_actionable()) else {
            log::error!(
                "[SYNC] {PLAY_ADDR} event without usable cps (got {:?}); ignoring",
                event.cps
            );
            return;
        };

        let decision = sync::evaluate(self.model.as_ref(), cps, event.cycle, msg_time, &self.config);
        if self.config.debug {
            log::debug!(
                "[SYNC] cps={cps} cycle={:?} t={msg_time:.6} drift={:+.6} update={}",
                event.cycle,
                decision.phase_drift,
                decision.should_update
            );
        }
        if !decision.should_update {
            return;
        }

        // Lead compensation applies whenever phase information is present,
        // no matter what triggered the update.
        let effective_cycle = event
            .cycle
            .map(|cycle| sync::effective_cycle(cycle, self.config.phase_lead));

        let candidates = tempo::build_candidates(cps, effective_cycle, msg_time);
        match tempo::apply(&mut self.sink, &candidates) {
            Ok(applied) => {
                self.stats.updates += 1;
                self.commit(cps, effective_cycle, msg_time);
                log::info!(
                    "[SYNC] Tempo set to {cps} cps (drift {:+.4} cycles, {:?})",
                    decision.phase_drift,
                    applied
                );
            }
            Err(e) => {
                self.stats.failures += 1;
                log::error!("[SYNC] Tempo update failed: {e}");
            }
        }
    }

    /// Replace the model after a successful apply.
    ///
    /// Without phase information the previous cycle count is retained
    /// (defaulting to 0) so that phase continuity survives frequency-only
    /// updates.
    fn commit(&mut self, cps: f64, effective_cycle: Option<f64>, msg_time: f64) {
        let cycle = match effective_cycle {
            Some(cycle) => cycle,
            None => self.model.map(|m| m.cycle).unwrap_or(0.0),
        };
        self.model = Some(TempoModel {
            frequency: cps,
            anchor_time: msg_time,
            cycle,
        });
    }
}

impl<S: TempoSink + Send> MessageHandler for TempoFollower<S> {
    fn on_message(&mut self, message: InboundMessage) {
        if message.addr != PLAY_ADDR {
            // Other addresses pass through untouched; surface them only in
            // debug mode.
            if self.config.debug {
                log::debug!("[OSC] {} ({} args)", message.addr, message.args.len());
            }
            return;
        }

        let event = DirtPlayEvent::from_args(&message.args);
        let msg_time = message.time.unwrap_or_else(timetag::now);
        self.handle_play(&event, msg_time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tempo::TempoCandidate;
    use anyhow::Result;
    use rosc::OscType;

    /// Scriptable sink: rejects precise candidates when asked, records all.
    struct ScriptedSink {
        reject_precise: bool,
        reject_all: bool,
        accepted: Vec<TempoCandidate>,
    }

    impl ScriptedSink {
        fn accept_all() -> Self {
            Self {
                reject_precise: false,
                reject_all: false,
                accepted: Vec::new(),
            }
        }
    }

    impl TempoSink for ScriptedSink {
        fn set_tempo(&mut self, candidate: &TempoCandidate) -> Result<()> {
            if self.reject_all {
                anyhow::bail!("engine offline");
            }
            if self.reject_precise && matches!(candidate, TempoCandidate::Precise { .. }) {
                anyhow::bail!("precise shape unsupported");
            }
            self.accepted.push(*candidate);
            Ok(())
        }
    }

    fn play(args: &[(&str, f64)], time: Option<f64>) -> InboundMessage {
        let mut osc_args = Vec::new();
        for (key, value) in args {
            osc_args.push(OscType::String(key.to_string()));
            osc_args.push(OscType::Double(*value));
        }
        InboundMessage {
            addr: PLAY_ADDR.to_string(),
            args: osc_args,
            time,
        }
    }

    #[test]
    fn test_first_sample_anchors_model() {
        let mut follower = TempoFollower::new(SyncConfig::default(), ScriptedSink::accept_all());
        follower.on_message(play(&[("cps", 0.5), ("cycle", 4.0)], Some(100.0)));

        let model = follower.model().unwrap();
        assert_eq!(model.frequency, 0.5);
        assert_eq!(model.anchor_time, 100.0);
        assert_eq!(model.cycle, 4.0);
        assert_eq!(follower.stats().updates, 1);
    }

    #[test]
    fn test_repeated_on_grid_samples_are_noops() {
        let mut follower = TempoFollower::new(SyncConfig::default(), ScriptedSink::accept_all());
        follower.on_message(play(&[("cps", 0.5), ("cycle", 4.0)], Some(100.0)));
        follower.on_message(play(&[("cps", 0.5), ("cycle", 4.5)], Some(101.0)));
        follower.on_message(play(&[("cps", 0.5), ("cycle", 5.0)], Some(102.0)));

        assert_eq!(follower.stats().events, 3);
        assert_eq!(follower.stats().updates, 1);
    }

    #[test]
    fn test_drift_triggers_realign() {
        let mut follower = TempoFollower::new(SyncConfig::default(), ScriptedSink::accept_all());
        follower.on_message(play(&[("cps", 2.0), ("cycle", 10.0)], Some(100.0)));
        // Predicted 12.0 at t=101, reported 12.3.
        follower.on_message(play(&[("cps", 2.0), ("cycle", 12.3)], Some(101.0)));

        let model = follower.model().unwrap();
        assert_eq!(model.anchor_time, 101.0);
        assert!((model.cycle - 12.3).abs() < 1e-9);
        assert_eq!(follower.stats().updates, 2);
    }

    #[test]
    fn test_fallback_to_simple_still_updates_model() {
        let mut follower = TempoFollower::new(
            SyncConfig::default(),
            ScriptedSink {
                reject_precise: true,
                reject_all: false,
                accepted: Vec::new(),
            },
        );
        follower.on_message(play(&[("cps", 2.0)], Some(100.0)));

        let model = follower.model().unwrap();
        assert_eq!(model.frequency, 2.0);
        assert_eq!(model.cycle, 0.0);
        let sink = follower.into_sink();
        assert_eq!(sink.accepted.len(), 1);
        assert!(matches!(sink.accepted[0], TempoCandidate::Simple { frequency } if frequency == 2.0));
    }

    #[test]
    fn test_all_rejected_leaves_model_unchanged() {
        let mut follower = TempoFollower::new(
            SyncConfig::default(),
            ScriptedSink {
                reject_precise: false,
                reject_all: true,
                accepted: Vec::new(),
            },
        );
        follower.on_message(play(&[("cps", 2.0), ("cycle", 1.0)], Some(100.0)));
        assert!(follower.model().is_none());
        assert_eq!(follower.stats().failures, 1);
    }

    #[test]
    fn test_frequency_only_update_preserves_cycle() {
        let mut follower = TempoFollower::new(SyncConfig::default(), ScriptedSink::accept_all());
        follower.on_message(play(&[("cps", 0.5), ("cycle", 4.0)], Some(100.0)));
        // Tempo change without phase information.
        follower.on_message(play(&[("cps", 0.75)], Some(101.0)));

        let model = follower.model().unwrap();
        assert_eq!(model.frequency, 0.75);
        assert_eq!(model.anchor_time, 101.0);
        assert_eq!(model.cycle, 4.0);
    }

    #[test]
    fn test_lead_compensation_shifts_anchor_cycle() {
        let config = SyncConfig {
            phase_lead: 0.25,
            ..SyncConfig::default()
        };
        let mut follower = TempoFollower::new(config, ScriptedSink::accept_all());
        follower.on_message(play(&[("cps", 0.5), ("cycle", 4.0)], Some(100.0)));

        let model = follower.model().unwrap();
        assert!((model.cycle - 4.25).abs() < 1e-12);
    }

    #[test]
    fn test_unusable_cps_is_contained() {
        let mut follower = TempoFollower::new(SyncConfig::default(), ScriptedSink::accept_all());
        follower.on_message(play(&[("cps", -1.0)], Some(100.0)));
        assert!(follower.model().is_none());

        // The bad event does not affect the next one.
        follower.on_message(play(&[("cps", 0.5), ("cycle", 0.0)], Some(101.0)));
        assert!(follower.model().is_some());
    }

    #[test]
    fn test_other_addresses_pass_through() {
        let mut follower = TempoFollower::new(SyncConfig::default(), ScriptedSink::accept_all());
        follower.on_message(InboundMessage {
            addr: "/dirt/handshake".to_string(),
            args: vec![],
            time: None,
        });
        assert_eq!(follower.stats().events, 0);
    }
}
