//! dirtlink CLI - The `dirtlink` command.
//!
//! Binds a UDP port, follows `/dirt/play` tempo traffic, and drives a tempo
//! sink: either the built-in console sink (monitoring) or an OSC
//! re-broadcast to a downstream consumer (`--forward`).

use anyhow::Result;
use clap::{Parser, Subcommand};
use dirtlink_core::{
    DirtLink, ReceiverOptions, SyncConfig, TempoBroadcast, TempoCandidate, TempoSink,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// dirtlink - tempo synchronization for SuperDirt-style OSC streams
#[derive(Parser, Debug)]
#[command(name = "dirtlink")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Follow /dirt/play OSC traffic and keep a tempo sink in step", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Listen for /dirt/play traffic and follow its tempo
    Listen {
        /// Interface to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// UDP port to bind
        #[arg(short, long, default_value_t = 57121)]
        port: u16,

        /// Allowed phase drift in cycles before realigning
        #[arg(long, default_value_t = 1.0 / 64.0)]
        tolerance: f64,

        /// Constant phase lead in cycles (scheduling latency compensation)
        #[arg(long, default_value_t = 0.0)]
        lead: f64,

        /// Track tempo changes only, ignore phase drift
        #[arg(long)]
        no_phase_sync: bool,

        /// Re-broadcast accepted tempo as OSC to this "host:port" address
        #[arg(long, value_name = "ADDR")]
        forward: Option<String>,

        /// Verbose per-packet logging
        #[arg(short, long)]
        debug: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Listen {
            host,
            port,
            tolerance,
            lead,
            no_phase_sync,
            forward,
            debug,
        } => {
            init_logger(debug);
            let options = ReceiverOptions { host, port, debug };
            let config = SyncConfig {
                phase_sync: !no_phase_sync,
                phase_tolerance: tolerance,
                phase_lead: lead,
                debug,
            };
            match forward {
                Some(addr) => {
                    let sink = TempoBroadcast::new(addr)?;
                    log::info!("Forwarding accepted tempo to {}", sink.addr);
                    run_listen(DirtLink::new(options, config, sink))
                }
                None => run_listen(DirtLink::new(options, config, ConsoleSink)),
            }
        }
        Commands::Version => {
            println!("dirtlink {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Tempo synchronization for SuperDirt-style OSC streams");
            println!();
            println!("Modular Architecture:");
            println!("  - dirtlink-core: receiver, decision loop, tempo sinks");
            println!("  - dirtlink-cli:  this binary");
            Ok(())
        }
    }
}

fn init_logger(debug: bool) {
    let default_filter = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .init();
}

/// Tempo sink for monitor mode: prints every accepted update.
struct ConsoleSink;

impl TempoSink for ConsoleSink {
    fn set_tempo(&mut self, candidate: &TempoCandidate) -> Result<()> {
        let cps = candidate.frequency();
        match candidate {
            TempoCandidate::Precise { cycle, anchor_time, .. } => {
                println!(
                    "tempo {:.4} cps ({:.1} bpm), cycle {:.6} @ {:.6}",
                    cps,
                    cps * 60.0 * 4.0,
                    cycle.to_f64(),
                    anchor_time
                );
            }
            TempoCandidate::Simple { .. } => {
                println!("tempo {:.4} cps ({:.1} bpm)", cps, cps * 60.0 * 4.0);
            }
        }
        Ok(())
    }
}

/// Run the link until SIGINT/SIGTERM, logging a periodic status line.
fn run_listen<S: TempoSink + Send + 'static>(mut link: DirtLink<S>) -> Result<()> {
    link.start()?;

    let term = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, term.clone())?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, term.clone())?;

    let mut last_status = Instant::now();
    let mut last_count = 0u64;
    while !term.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(200));
        if last_status.elapsed() >= Duration::from_secs(10) {
            let count = link.datagram_count();
            log::info!(
                "{} datagram(s) received ({} in the last 10s)",
                count,
                count - last_count
            );
            last_count = count;
            last_status = Instant::now();
        }
    }

    log::info!("Shutting down...");
    link.stop();
    if let Some(stats) = link.stats() {
        log::info!(
            "{} play event(s), {} update(s) applied, {} failed",
            stats.events,
            stats.updates,
            stats.failures
        );
    }
    if let Some(model) = link.model() {
        log::info!(
            "final tempo {:.4} cps, cycle {:.4} @ {:.3}",
            model.frequency,
            model.cycle,
            model.anchor_time
        );
    }
    Ok(())
}
