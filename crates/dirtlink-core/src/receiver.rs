//! UDP OSC receiver.
//!
//! Binds a UDP socket and runs a single reactor thread that owns both the
//! socket and the registered handler. Datagrams are decoded with `rosc`,
//! bundles are flattened (each contained packet inherits the bundle timetag
//! unless a nested bundle carries its own), and every resulting message is
//! dispatched synchronously on the reactor thread. No per-datagram error can
//! stop the listening loop.

use crate::error::ReceiverError;
use crate::timetag;
use rosc::{OscPacket, OscType};
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How often the reactor wakes up to check for shutdown.
const POLL_TIMEOUT: Duration = Duration::from_millis(50);

/// Minimum spacing between log lines for non-OSC noise datagrams.
const NOISE_LOG_WINDOW: Duration = Duration::from_secs(2);

/// One decoded OSC message as seen by handlers.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    /// OSC address pattern (e.g. "/dirt/play").
    pub addr: String,
    /// Raw argument list.
    pub args: Vec<OscType>,
    /// POSIX timestamp from the enclosing bundle's timetag, if any.
    pub time: Option<f64>,
}

/// Receives every message the reactor decodes, on the reactor thread.
pub trait MessageHandler: Send {
    fn on_message(&mut self, message: InboundMessage);
}

/// Bind parameters for the receiver.
#[derive(Clone, Debug, PartialEq)]
pub struct ReceiverOptions {
    /// Interface to bind.
    pub host: String,
    /// UDP port to bind.
    pub port: u16,
    /// Verbose per-datagram logging.
    pub debug: bool,
}

impl Default for ReceiverOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 57121,
            debug: false,
        }
    }
}

/// Partial options for [`OscReceiver::restart`]; unset fields keep their
/// current value.
#[derive(Clone, Debug, Default)]
pub struct OptionsUpdate {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub debug: Option<bool>,
}

impl ReceiverOptions {
    /// This options set with the update's fields applied on top.
    pub fn merged(&self, update: &OptionsUpdate) -> Self {
        Self {
            host: update.host.clone().unwrap_or_else(|| self.host.clone()),
            port: update.port.unwrap_or(self.port),
            debug: update.debug.unwrap_or(self.debug),
        }
    }
}

/// Receiver lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceiverState {
    /// Never bound, or the last bind attempt failed.
    Unbound,
    /// Socket bound, reactor running.
    Bound,
    /// Stopped after having been bound.
    Closed,
}

/// UDP OSC receiver with an owned dispatch handler.
///
/// The handler moves onto the reactor thread on [`start`](Self::start) and is
/// recovered when [`stop`](Self::stop) joins it, so handler state (e.g. a
/// tempo model) survives a [`restart`](Self::restart).
pub struct OscReceiver<H: MessageHandler + 'static> {
    options: ReceiverOptions,
    state: ReceiverState,
    handler: Option<H>,
    worker: Option<Worker<H>>,
    datagrams: Arc<AtomicU64>,
    local_addr: Option<SocketAddr>,
}

struct Worker<H> {
    shutdown: Arc<AtomicBool>,
    join: JoinHandle<H>,
}

impl<H: MessageHandler + 'static> OscReceiver<H> {
    /// Create an unbound receiver.
    pub fn new(options: ReceiverOptions, handler: H) -> Self {
        Self {
            options,
            state: ReceiverState::Unbound,
            handler: Some(handler),
            worker: None,
            datagrams: Arc::new(AtomicU64::new(0)),
            local_addr: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ReceiverState {
        self.state
    }

    /// Current options.
    pub fn options(&self) -> &ReceiverOptions {
        &self.options
    }

    /// Address actually bound (useful when the configured port is 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Total datagrams seen across all binds. Diagnostic only.
    pub fn datagram_count(&self) -> u64 {
        self.datagrams.load(Ordering::Relaxed)
    }

    /// The handler, when the receiver is not running.
    pub fn handler(&self) -> Option<&H> {
        self.handler.as_ref()
    }

    /// Mutable handler access, when the receiver is not running.
    pub fn handler_mut(&mut self) -> Option<&mut H> {
        self.handler.as_mut()
    }

    /// Bind the socket and start the reactor thread.
    ///
    /// On bind failure the receiver stays `Unbound` and the error is
    /// returned; the caller may retry via [`restart`](Self::restart).
    pub fn start(&mut self) -> Result<(), ReceiverError> {
        if self.worker.is_some() || self.handler.is_none() {
            return Err(ReceiverError::AlreadyBound);
        }

        let addr = format!("{}:{}", self.options.host, self.options.port);
        let socket = match UdpSocket::bind(&addr) {
            Ok(socket) => socket,
            Err(source) => {
                self.state = ReceiverState::Unbound;
                return Err(ReceiverError::Bind { addr, source });
            }
        };
        socket.set_read_timeout(Some(POLL_TIMEOUT))?;
        self.local_addr = socket.local_addr().ok();
        let Some(handler) = self.handler.take() else {
            return Err(ReceiverError::AlreadyBound);
        };

        let shutdown = Arc::new(AtomicBool::new(false));
        let reactor = Reactor {
            socket,
            handler,
            shutdown: shutdown.clone(),
            datagrams: self.datagrams.clone(),
            debug: self.options.debug,
            noise: RateLimiter::new(NOISE_LOG_WINDOW),
        };
        let join = thread::spawn(move || reactor.run());

        self.worker = Some(Worker { shutdown, join });
        self.state = ReceiverState::Bound;
        log::info!("[OSC] Listening on {addr}");
        Ok(())
    }

    /// Stop listening. Idempotent; a no-op when not bound.
    ///
    /// Joins the reactor thread before returning, so no handler call can
    /// occur after this returns.
    pub fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.shutdown.store(true, Ordering::Relaxed);
            match worker.join.join() {
                Ok(handler) => self.handler = Some(handler),
                Err(_) => log::error!("[OSC] Receiver thread panicked; handler lost"),
            }
            self.state = ReceiverState::Closed;
            self.local_addr = None;
            log::info!("[OSC] Receiver stopped");
        }
    }

    /// Stop, merge the option update, and start again.
    pub fn restart(&mut self, update: OptionsUpdate) -> Result<(), ReceiverError> {
        self.stop();
        self.options = self.options.merged(&update);
        self.start()
    }
}

impl<H: MessageHandler + 'static> Drop for OscReceiver<H> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The reactor owns the socket and handler for the lifetime of one bind.
struct Reactor<H> {
    socket: UdpSocket,
    handler: H,
    shutdown: Arc<AtomicBool>,
    datagrams: Arc<AtomicU64>,
    debug: bool,
    noise: RateLimiter,
}

impl<H: MessageHandler> Reactor<H> {
    /// Receive loop; returns the handler on shutdown.
    fn run(mut self) -> H {
        let mut buf = [0u8; 65536];
        while !self.shutdown.load(Ordering::Relaxed) {
            match self.socket.recv_from(&mut buf) {
                Ok((len, peer)) => self.handle_datagram(&buf[..len], peer),
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) =>
                {
                    continue;
                }
                Err(e) => {
                    log::warn!("[OSC] Socket receive error: {e}");
                }
            }
        }
        self.handler
    }

    fn handle_datagram(&mut self, data: &[u8], peer: SocketAddr) {
        let seq = self.datagrams.fetch_add(1, Ordering::Relaxed) + 1;
        if self.debug {
            log::debug!("[OSC] Datagram #{seq}: {} bytes from {peer}", data.len());
        }

        match rosc::decoder::decode_udp(data) {
            Ok((_, packet)) => self.dispatch_packet(packet, None),
            Err(e) if looks_like_osc(data) => {
                log::error!("[OSC] Failed to decode packet from {peer}: {e}");
            }
            Err(_) => {
                // Typically another protocol aimed at our port; one warning
                // per window is enough.
                if let Some(suppressed) = self.noise.allow(Instant::now()) {
                    if suppressed > 0 {
                        log::warn!(
                            "[OSC] Non-OSC datagram from {peer} ({suppressed} more suppressed); check the sender's target port"
                        );
                    } else {
                        log::warn!(
                            "[OSC] Non-OSC datagram from {peer}; check the sender's target port"
                        );
                    }
                }
            }
        }
    }

    /// Dispatch a packet, recursing into bundles. Contained packets inherit
    /// the innermost enclosing bundle's timetag.
    fn dispatch_packet(&mut self, packet: OscPacket, inherited_time: Option<f64>) {
        match packet {
            OscPacket::Message(msg) => {
                self.handler.on_message(InboundMessage {
                    addr: msg.addr,
                    args: msg.args,
                    time: inherited_time,
                });
            }
            OscPacket::Bundle(bundle) => {
                let time = timetag::from_osc(bundle.timetag).or(inherited_time);
                for packet in bundle.content {
                    self.dispatch_packet(packet, time);
                }
            }
        }
    }
}

/// A datagram that does not even start like an OSC packet (`/` address or
/// `#bundle` marker) is classified as non-OSC noise.
fn looks_like_osc(data: &[u8]) -> bool {
    matches!(data.first(), Some(&b'/') | Some(&b'#'))
}

/// Allows one event per time window, counting how many were suppressed.
struct RateLimiter {
    window: Duration,
    last: Option<Instant>,
    suppressed: u64,
}

impl RateLimiter {
    fn new(window: Duration) -> Self {
        Self {
            window,
            last: None,
            suppressed: 0,
        }
    }

    /// `Some(suppressed)` when the caller may log now, `None` to stay quiet.
    fn allow(&mut self, now: Instant) -> Option<u64> {
        match self.last {
            Some(last) if now.duration_since(last) < self.window => {
                self.suppressed += 1;
                None
            }
            _ => {
                let suppressed = std::mem::take(&mut self.suppressed);
                self.last = Some(now);
                Some(suppressed)
            }
        }
    }
}
