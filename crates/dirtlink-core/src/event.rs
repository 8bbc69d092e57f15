//! Normalization of `/dirt/play` events.
//!
//! SuperDirt-style play messages carry a flat argument list alternating
//! between keys and values (`[k0, v0, k1, v1, ...]`). Only `cps` and `cycle`
//! matter to the tempo follower; every other pair is kept verbatim for
//! logging and downstream consumers.

use rosc::OscType;
use std::collections::HashMap;

/// One normalized `/dirt/play` event.
///
/// Ephemeral: built per datagram, consumed synchronously by the decision
/// loop, then discarded.
#[derive(Clone, Debug, Default)]
pub struct DirtPlayEvent {
    /// Tempo in cycles per second, if present.
    pub cps: Option<f64>,
    /// Cycle position at the event's scheduled time, if present. Presence
    /// signals that phase information is available.
    pub cycle: Option<f64>,
    /// All remaining key/value pairs, untouched.
    pub params: HashMap<String, OscType>,
}

impl DirtPlayEvent {
    /// Build an event from the alternating key/value argument list.
    ///
    /// A trailing unpaired key is dropped; on duplicate keys the last value
    /// wins.
    pub fn from_args(args: &[OscType]) -> Self {
        let mut event = Self::default();
        for pair in args.chunks_exact(2) {
            let key = key_string(&pair[0]);
            match key.as_str() {
                "cps" => event.cps = as_f64(&pair[1]),
                "cycle" => event.cycle = as_f64(&pair[1]),
                _ => {
                    event.params.insert(key, pair[1].clone());
                }
            }
        }
        event
    }

    /// Whether this event can drive a tempo decision: `cps` present, finite
    /// and positive.
    pub fn is_actionable(&self) -> bool {
        matches!(self.cps, Some(cps) if cps.is_finite() && cps > 0.0)
    }
}

/// Coerce an argument in key position to a string key.
fn key_string(arg: &OscType) -> String {
    match arg {
        OscType::String(s) => s.clone(),
        OscType::Int(v) => v.to_string(),
        OscType::Long(v) => v.to_string(),
        OscType::Float(v) => v.to_string(),
        OscType::Double(v) => v.to_string(),
        OscType::Char(c) => c.to_string(),
        other => format!("{other:?}"),
    }
}

/// Numeric coercion for value positions.
fn as_f64(arg: &OscType) -> Option<f64> {
    match arg {
        OscType::Float(v) => Some(*v as f64),
        OscType::Double(v) => Some(*v),
        OscType::Int(v) => Some(*v as f64),
        OscType::Long(v) => Some(*v as f64),
        _ => None,
    }
}
