//! Tempo candidates and their application to the rendering engine.
//!
//! The engine's tempo entry point does not guarantee which input shapes it
//! accepts, so a desired tempo is encoded as an ordered list of candidates,
//! most precise first, and offered one by one until one is accepted. The
//! fallback is data, not exception control flow.

use crate::error::ApplyError;
use anyhow::Result;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

/// Denominator used for rational frequencies (thousandths).
pub const FREQ_DEN: i64 = 1_000;
/// Denominator used for rational cycle counts (millionths).
pub const CYCLE_DEN: i64 = 1_000_000;

/// A fixed-denominator rational, standing in for the arbitrary-precision
/// rationals the protocol's most exact tempo shape calls for.
///
/// The denominator encodes the precision contract (thousandths for
/// frequency, millionths for cycle count), so values are deliberately not
/// reduced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rational {
    pub num: i64,
    pub den: i64,
}

impl Rational {
    /// Zero with the given denominator.
    pub fn zero(den: i64) -> Self {
        Self { num: 0, den }
    }

    /// Scale a float to a rational with the given denominator.
    ///
    /// Returns `None` when the value is non-finite or the scaled numerator
    /// does not fit in i64.
    pub fn from_f64(value: f64, den: i64) -> Option<Self> {
        let scaled = (value * den as f64).round();
        if !scaled.is_finite() || scaled < i64::MIN as f64 || scaled > i64::MAX as f64 {
            return None;
        }
        Some(Self {
            num: scaled as i64,
            den,
        })
    }

    /// The rational value as f64.
    pub fn to_f64(self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

/// One encoding of a desired tempo, ordered from most precise to most
/// compatible.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TempoCandidate {
    /// Rational frequency and cycle count plus a phase anchor time.
    Precise {
        /// Cycles per second, in thousandths.
        frequency: Rational,
        /// Cycle position at `anchor_time`, in millionths. Rational zero when
        /// the sample carried no phase information.
        cycle: Rational,
        /// POSIX seconds at which `cycle` holds.
        anchor_time: f64,
    },
    /// Bare frequency, no phase anchor.
    Simple {
        /// Cycles per second.
        frequency: f64,
    },
}

impl TempoCandidate {
    /// The frequency this candidate carries, as f64.
    pub fn frequency(&self) -> f64 {
        match self {
            TempoCandidate::Precise { frequency, .. } => frequency.to_f64(),
            TempoCandidate::Simple { frequency } => *frequency,
        }
    }
}

/// Build the candidate list for a desired tempo, newest-first by precision.
///
/// The precise shape is skipped only when the values cannot be represented
/// (non-finite, or out of range after scaling); the simple shape is always
/// present, so the list is never empty.
pub fn build_candidates(cps: f64, cycle: Option<f64>, anchor_time: f64) -> Vec<TempoCandidate> {
    let mut candidates = Vec::with_capacity(2);

    let frequency = Rational::from_f64(cps, FREQ_DEN);
    let cycle_rational = match cycle {
        Some(c) => Rational::from_f64(c, CYCLE_DEN),
        None => Some(Rational::zero(CYCLE_DEN)),
    };
    if let (Some(frequency), Some(cycle)) = (frequency, cycle_rational) {
        candidates.push(TempoCandidate::Precise {
            frequency,
            cycle,
            anchor_time,
        });
    }

    candidates.push(TempoCandidate::Simple { frequency: cps });
    candidates
}

/// The rendering engine's tempo entry point.
///
/// Implementations accept or reject a candidate shape; rejection is an error
/// return, and the applier then falls through to the next shape.
pub trait TempoSink {
    /// Hand one candidate to the engine. `Err` means rejected.
    fn set_tempo(&mut self, candidate: &TempoCandidate) -> Result<()>;
}

/// Offer candidates to the sink in order; the first acceptance wins.
///
/// Returns the accepted candidate, or [`ApplyError`] carrying the last
/// rejection reason when every shape was refused.
pub fn apply(sink: &mut dyn TempoSink, candidates: &[TempoCandidate]) -> Result<TempoCandidate, ApplyError> {
    let mut last: Option<anyhow::Error> = None;
    for candidate in candidates {
        match sink.set_tempo(candidate) {
            Ok(()) => return Ok(*candidate),
            Err(e) => {
                log::debug!("[TEMPO] Candidate {candidate:?} rejected: {e:#}");
                last = Some(e);
            }
        }
    }
    Err(ApplyError {
        attempts: candidates.len(),
        last: last.unwrap_or_else(|| anyhow::anyhow!("no candidates offered")),
    })
}

/// Single-slot, latest-wins handoff to an engine driven from another thread.
///
/// Only the most recent tempo matters, so a stale value sitting in the slot
/// is replaced rather than queued behind. The consumer side drains the slot
/// at its own pace via the paired [`Receiver`].
#[derive(Clone)]
pub struct LatestSink {
    tx: Sender<TempoCandidate>,
    rx: Receiver<TempoCandidate>,
}

impl LatestSink {
    /// Create the slot and a receiver for the consuming thread.
    pub fn new() -> (Self, Receiver<TempoCandidate>) {
        let (tx, rx) = bounded(1);
        (Self { tx, rx: rx.clone() }, rx)
    }
}

impl TempoSink for LatestSink {
    fn set_tempo(&mut self, candidate: &TempoCandidate) -> Result<()> {
        match self.tx.try_send(*candidate) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(candidate)) => {
                // Drop the stale value, keep the newest.
                let _ = self.rx.try_recv();
                self.tx
                    .try_send(candidate)
                    .map_err(|e| anyhow::anyhow!("tempo slot unavailable: {e}"))
            }
            Err(TrySendError::Disconnected(_)) => {
                Err(anyhow::anyhow!("tempo consumer disconnected"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every candidate offered and rejects the first `reject` of them.
    struct RecordingSink {
        reject: usize,
        seen: Vec<TempoCandidate>,
    }

    impl RecordingSink {
        fn accepting_after(reject: usize) -> Self {
            Self { reject, seen: Vec::new() }
        }
    }

    impl TempoSink for RecordingSink {
        fn set_tempo(&mut self, candidate: &TempoCandidate) -> Result<()> {
            self.seen.push(*candidate);
            if self.seen.len() <= self.reject {
                anyhow::bail!("shape not supported");
            }
            Ok(())
        }
    }

    #[test]
    fn test_rational_scaling() {
        let freq = Rational::from_f64(0.5625, FREQ_DEN).unwrap();
        assert_eq!(freq.num, 563); // rounded to thousandths
        assert_eq!(freq.den, 1_000);

        let cycle = Rational::from_f64(12.3456789, CYCLE_DEN).unwrap();
        assert_eq!(cycle.num, 12_345_679);
        assert!((cycle.to_f64() - 12.3456789).abs() < 1e-6);

        assert!(Rational::from_f64(f64::NAN, FREQ_DEN).is_none());
        assert!(Rational::from_f64(1e30, CYCLE_DEN).is_none());
    }

    #[test]
    fn test_candidate_order_precise_then_simple() {
        let candidates = build_candidates(2.0, Some(12.3), 101.0);
        assert_eq!(candidates.len(), 2);
        assert!(matches!(candidates[0], TempoCandidate::Precise { .. }));
        assert!(matches!(candidates[1], TempoCandidate::Simple { frequency } if frequency == 2.0));
    }

    #[test]
    fn test_missing_cycle_encodes_rational_zero() {
        let candidates = build_candidates(2.0, None, 101.0);
        match candidates[0] {
            TempoCandidate::Precise { cycle, .. } => {
                assert_eq!(cycle, Rational::zero(CYCLE_DEN));
            }
            _ => panic!("expected precise candidate first"),
        }
    }

    #[test]
    fn test_unrepresentable_values_fall_back_to_simple_only() {
        let candidates = build_candidates(2.0, Some(1e40), 101.0);
        assert_eq!(candidates.len(), 1);
        assert!(matches!(candidates[0], TempoCandidate::Simple { .. }));
    }

    #[test]
    fn test_apply_stops_at_first_acceptance() {
        let mut sink = RecordingSink::accepting_after(0);
        let candidates = build_candidates(2.0, Some(12.3), 101.0);
        let applied = apply(&mut sink, &candidates).unwrap();
        assert_eq!(sink.seen.len(), 1);
        assert!(matches!(applied, TempoCandidate::Precise { .. }));
    }

    #[test]
    fn test_apply_falls_back_in_order() {
        let mut sink = RecordingSink::accepting_after(1);
        let candidates = build_candidates(2.0, Some(12.3), 101.0);
        let applied = apply(&mut sink, &candidates).unwrap();
        assert_eq!(sink.seen.len(), 2);
        assert!(matches!(applied, TempoCandidate::Simple { frequency } if frequency == 2.0));
    }

    #[test]
    fn test_apply_reports_last_rejection() {
        let mut sink = RecordingSink::accepting_after(10);
        let candidates = build_candidates(2.0, Some(12.3), 101.0);
        let err = apply(&mut sink, &candidates).unwrap_err();
        assert_eq!(err.attempts, 2);
        assert!(err.to_string().contains("shape not supported"));
    }

    #[test]
    fn test_latest_sink_keeps_newest() {
        let (mut sink, rx) = LatestSink::new();
        let a = TempoCandidate::Simple { frequency: 1.0 };
        let b = TempoCandidate::Simple { frequency: 2.0 };
        sink.set_tempo(&a).unwrap();
        sink.set_tempo(&b).unwrap();
        assert_eq!(rx.try_recv().unwrap(), b);
        assert!(rx.try_recv().is_err());
    }
}
