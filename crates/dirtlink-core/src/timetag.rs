//! OSC timetag conversion.
//!
//! OSC timetags use the NTP epoch (1900-01-01) with a 32.32 fixed-point
//! layout. Everything downstream of the receiver works in POSIX fractional
//! seconds, so timetags are normalized on ingress and only converted back
//! when publishing.

use rosc::{OscTime, OscType};
use std::sync::LazyLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Seconds between the NTP epoch (1900-01-01) and the Unix epoch (1970-01-01).
pub const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

const FRAC_SCALE: f64 = 4_294_967_296.0; // 2^32

/// Anchor pair captured once at init: (monotonic instant, wall-clock time).
/// All subsequent timestamps are derived from the Instant elapsed since this
/// anchor, using the SystemTime only as the epoch reference, so NTP
/// adjustments of the wall clock cannot make [`now`] jump.
static CLOCK_ANCHOR: LazyLock<(Instant, f64)> = LazyLock::new(|| {
    let wall = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();
    (Instant::now(), wall)
});

/// Current POSIX time in fractional seconds with sub-millisecond resolution.
///
/// This is the substitute used whenever an inbound packet carries no usable
/// timetag.
pub fn now() -> f64 {
    let (anchor_instant, anchor_wall) = &*CLOCK_ANCHOR;
    anchor_wall + anchor_instant.elapsed().as_secs_f64()
}

/// Convert an OSC timetag to POSIX fractional seconds.
///
/// Returns `None` for the "immediate" timetag `(0, 1)`, which carries no
/// scheduling time (the caller substitutes [`now`]).
pub fn from_osc(time: OscTime) -> Option<f64> {
    if time.seconds == 0 {
        return None;
    }
    Some(time.seconds as f64 + time.fractional as f64 / FRAC_SCALE - NTP_UNIX_OFFSET as f64)
}

/// Convert POSIX fractional seconds to an OSC timetag.
///
/// Times before the NTP epoch clamp to the "immediate" timetag.
pub fn to_osc(posix: f64) -> OscTime {
    let ntp = posix + NTP_UNIX_OFFSET as f64;
    if !ntp.is_finite() || ntp < 0.0 {
        return OscTime { seconds: 0, fractional: 1 };
    }
    let seconds = (ntp as u64 % (u32::MAX as u64 + 1)) as u32;
    let fractional = (ntp.fract() * FRAC_SCALE) as u32;
    OscTime { seconds, fractional }
}

/// Decode a POSIX timestamp from a single OSC argument.
///
/// Accepts numeric arguments (already POSIX, passed through), a numeric
/// string, or a timetag argument (NTP, converted). Anything else, or a
/// non-finite value, yields `None` — absence of a usable timestamp is a
/// normal case, never an error.
pub fn decode_arg(arg: &OscType) -> Option<f64> {
    let value = match arg {
        OscType::Double(v) => Some(*v),
        OscType::Float(v) => Some(*v as f64),
        OscType::Int(v) => Some(*v as f64),
        OscType::Long(v) => Some(*v as f64),
        OscType::String(s) => s.trim().parse::<f64>().ok(),
        OscType::Time(t) => from_osc(*t),
        _ => None,
    };
    value.filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ntp_roundtrip() {
        for (secs, frac) in [
            (NTP_UNIX_OFFSET as u32 + 1_000_000, 0u32),
            (NTP_UNIX_OFFSET as u32 + 1_722_000_000, u32::MAX / 2),
            (u32::MAX, u32::MAX),
        ] {
            let time = OscTime { seconds: secs, fractional: frac };
            let posix = from_osc(time).unwrap();
            let expected = secs as f64 + frac as f64 / 4_294_967_296.0 - 2_208_988_800.0;
            assert!((posix - expected).abs() < 1e-6, "mismatch for ({secs}, {frac})");
        }
    }

    #[test]
    fn test_to_osc_inverts_from_osc() {
        let posix = 1_722_000_000.25;
        let time = to_osc(posix);
        let back = from_osc(time).unwrap();
        assert!((back - posix).abs() < 1e-6);
    }

    #[test]
    fn test_immediate_timetag_decodes_to_none() {
        assert_eq!(from_osc(OscTime { seconds: 0, fractional: 1 }), None);
    }

    #[test]
    fn test_decode_arg_variants() {
        assert_eq!(decode_arg(&OscType::Double(100.5)), Some(100.5));
        assert_eq!(decode_arg(&OscType::Int(42)), Some(42.0));
        assert_eq!(decode_arg(&OscType::String("123.75".into())), Some(123.75));
        assert_eq!(decode_arg(&OscType::String("not a number".into())), None);
        assert_eq!(decode_arg(&OscType::Double(f64::NAN)), None);
        assert_eq!(decode_arg(&OscType::Double(f64::INFINITY)), None);
        assert_eq!(decode_arg(&OscType::Nil), None);

        let time = OscTime {
            seconds: NTP_UNIX_OFFSET as u32 + 10,
            fractional: 0,
        };
        assert_eq!(decode_arg(&OscType::Time(time)), Some(10.0));
    }

    #[test]
    fn test_now_is_monotone_and_plausible() {
        let a = now();
        let b = now();
        assert!(b >= a);
        // Sometime after 2024.
        assert!(a > 1_700_000_000.0);
    }
}
