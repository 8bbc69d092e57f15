//! dirtlink Core - tempo synchronization driven by SuperDirt-style OSC.
//!
//! This crate keeps a local rendering engine's tempo in step with an external
//! pattern engine (TidalCycles/SuperDirt dialect) by following its
//! `/dirt/play` OSC traffic:
//!
//! - **Timetag** - NTP <-> POSIX timestamp conversion
//! - **Receiver** - UDP socket, OSC decode, bundle demultiplexing, dispatch
//! - **Event** - `/dirt/play` key/value argument normalization
//! - **Sync** - tempo model and pure phase-drift decision logic
//! - **Tempo** - candidate encodings and first-accept application
//! - **Follower** - the per-message control loop
//! - **Link** - receiver + follower as one start/stop/restart unit
//! - **Remote** - OSC re-broadcast of accepted tempo
//!
//! # Architecture
//!
//! A single reactor thread owns the UDP socket and runs the whole
//! per-datagram path inline: decode, normalize, decide, apply. The
//! [`TempoModel`] therefore has exactly one writer and is replaced
//! atomically on every accepted update. The rendering engine sits behind
//! the [`TempoSink`] trait; an update is offered as an ordered list of
//! [`TempoCandidate`]s and the first accepted shape wins. Nothing that
//! happens to one datagram - malformed bytes, undecodable arguments, a
//! rejected update - can stop the listening loop or corrupt the model.

pub mod config;
pub mod error;
pub mod event;
pub mod follower;
pub mod link;
pub mod receiver;
pub mod remote;
pub mod sync;
pub mod tempo;
pub mod timetag;

// Re-export main types for convenience
pub use config::SyncConfig;
pub use error::{ApplyError, ReceiverError};
pub use event::DirtPlayEvent;
pub use follower::{FollowerStats, TempoFollower, PLAY_ADDR};
pub use link::DirtLink;
pub use receiver::{
    InboundMessage, MessageHandler, OptionsUpdate, OscReceiver, ReceiverOptions, ReceiverState,
};
pub use remote::TempoBroadcast;
pub use sync::{evaluate, wrap_signed, Decision, TempoModel};
pub use tempo::{build_candidates, LatestSink, Rational, TempoCandidate, TempoSink};
