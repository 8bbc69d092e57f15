//! OSC re-broadcast of accepted tempo.
//!
//! Publishes every accepted tempo candidate as a `/link/tempo` message to a
//! downstream UDP consumer (a visualizer, another follower, a synthesis
//! server shim). Precise candidates travel as rational integer pairs plus an
//! NTP timetag so no precision is lost on the wire; simple candidates as a
//! single float, the shape any OSC consumer accepts.

use crate::tempo::{TempoCandidate, TempoSink};
use crate::timetag;
use anyhow::Result;
use rosc::{encoder, OscMessage, OscPacket, OscType};
use std::net::UdpSocket;
use std::sync::Arc;

/// Address used for published tempo messages.
pub const TEMPO_ADDR: &str = "/link/tempo";

/// UDP publisher of accepted tempo updates.
#[derive(Clone)]
pub struct TempoBroadcast {
    sock: Arc<UdpSocket>,
    /// Target address in "host:port" format.
    pub addr: String,
}

impl TempoBroadcast {
    /// Create a publisher targeting the given address.
    ///
    /// Binds an ephemeral local port; nothing is sent until a tempo update
    /// is accepted.
    pub fn new<A: Into<String>>(addr: A) -> Result<Self> {
        let sock = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self {
            sock: Arc::new(sock),
            addr: addr.into(),
        })
    }

    /// The wire form of one candidate.
    fn message(candidate: &TempoCandidate) -> OscMessage {
        let args = match candidate {
            TempoCandidate::Precise {
                frequency,
                cycle,
                anchor_time,
            } => vec![
                OscType::Long(frequency.num),
                OscType::Long(frequency.den),
                OscType::Long(cycle.num),
                OscType::Long(cycle.den),
                OscType::Time(timetag::to_osc(*anchor_time)),
            ],
            TempoCandidate::Simple { frequency } => vec![OscType::Float(*frequency as f32)],
        };
        OscMessage {
            addr: TEMPO_ADDR.to_string(),
            args,
        }
    }
}

impl TempoSink for TempoBroadcast {
    fn set_tempo(&mut self, candidate: &TempoCandidate) -> Result<()> {
        let buf = encoder::encode(&OscPacket::Message(Self::message(candidate)))?;
        self.sock.send_to(&buf, &self.addr)?;
        Ok(())
    }
}

impl std::fmt::Debug for TempoBroadcast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TempoBroadcast")
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}
