//! Service facade: receiver + follower as one unit.

use crate::config::SyncConfig;
use crate::error::ReceiverError;
use crate::follower::{FollowerStats, TempoFollower};
use crate::receiver::{OptionsUpdate, OscReceiver, ReceiverOptions, ReceiverState};
use crate::sync::TempoModel;
use crate::tempo::TempoSink;
use std::net::SocketAddr;

/// A running tempo link: an OSC receiver whose handler is a
/// [`TempoFollower`] feeding the given sink.
///
/// The follower (and with it the tempo model) lives on the reactor thread
/// while the link is started and is handed back on [`stop`](Self::stop), so
/// model state survives restarts. `stop()` joins the reactor before
/// returning; once it returns, no further sink call can occur.
pub struct DirtLink<S: TempoSink + Send + 'static> {
    receiver: OscReceiver<TempoFollower<S>>,
}

impl<S: TempoSink + Send + 'static> DirtLink<S> {
    /// Create a stopped link.
    pub fn new(options: ReceiverOptions, config: SyncConfig, sink: S) -> Self {
        let follower = TempoFollower::new(config, sink);
        Self {
            receiver: OscReceiver::new(options, follower),
        }
    }

    /// Bind and start following.
    pub fn start(&mut self) -> Result<(), ReceiverError> {
        self.receiver.start()
    }

    /// Stop following. Idempotent.
    pub fn stop(&mut self) {
        self.receiver.stop();
    }

    /// Stop, merge the option update, start again. Tempo state is retained.
    pub fn restart(&mut self, update: OptionsUpdate) -> Result<(), ReceiverError> {
        self.receiver.restart(update)
    }

    /// Receiver lifecycle state.
    pub fn state(&self) -> ReceiverState {
        self.receiver.state()
    }

    /// Address actually bound, while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.receiver.local_addr()
    }

    /// Total datagrams seen. Diagnostic only.
    pub fn datagram_count(&self) -> u64 {
        self.receiver.datagram_count()
    }

    /// The applied tempo model, readable while the link is stopped.
    pub fn model(&self) -> Option<TempoModel> {
        self.receiver.handler().and_then(|f| f.model())
    }

    /// Follower counters, readable while the link is stopped.
    pub fn stats(&self) -> Option<FollowerStats> {
        self.receiver.handler().map(|f| f.stats())
    }

    /// Replace the sync configuration. Takes effect while the link is
    /// stopped; the new snapshot is used once restarted.
    pub fn set_config(&mut self, config: SyncConfig) -> bool {
        match self.receiver.handler_mut() {
            Some(follower) => {
                follower.set_config(config);
                true
            }
            None => false,
        }
    }
}
