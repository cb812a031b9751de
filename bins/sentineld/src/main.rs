// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Sentinel Daemon (sentineld)
//!
//! Runs the entity sentinel against a simulated population on a wall-clock
//! tick. Entities are corrupted, churned and issue protected actions on a
//! fixed rhythm; admin commands are read line-by-line from stdin
//! (`status`, `status json`, `reload`, `check`, `safety`, `repair <id>`).
mod sim;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use echo_audit::{AuditSink, DailyFileAudit};
use echo_config_fs::FsConfigStore;
use echo_sentinel::{
    ActionVerdict, Admin, AdminCommand, Host, Issuer, Sentinel, StatusReport, TickReport,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::sim::{Corruption, SimHost};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Milliseconds between simulation ticks
    #[clap(short, long, default_value_t = 50)]
    tick_interval: u64,

    /// Entities connected at startup (entity #0 is the operator)
    #[clap(short, long, default_value_t = 8)]
    population: u64,

    /// Ticks between injected corruptions (0 disables)
    #[clap(long, default_value_t = 60)]
    corrupt_every: u64,

    /// Ticks between simulated protected actions (0 disables)
    #[clap(long, default_value_t = 45)]
    action_every: u64,

    /// Ticks between one entity leaving and another joining (0 disables)
    #[clap(long, default_value_t = 300)]
    churn_every: u64,

    /// Config directory (defaults to the platform config dir)
    #[clap(long)]
    config_dir: Option<PathBuf>,

    /// Log at debug level
    #[clap(short, long)]
    verbose: bool,
}

/// Everything the tick callback owns.
struct Daemon {
    args: Args,
    admin: Admin<FsConfigStore>,
    sentinel: Sentinel,
    host: SimHost,
    commands: UnboundedReceiver<String>,
}

impl Daemon {
    fn on_tick(&mut self, tick: u64) {
        self.simulate(tick);
        let report = self.sentinel.tick(&mut self.host);
        log_report(&report);
        while let Ok(line) = self.commands.try_recv() {
            self.run_command(&line);
        }
    }

    fn simulate(&mut self, tick: u64) {
        let args = &self.args;
        if every(tick, args.churn_every) {
            if let Some(gone) = self.host.retire_oldest() {
                self.sentinel.on_leave(gone);
            }
            let joined = self.host.spawn_entity();
            self.sentinel.on_join(joined);
        }
        if every(tick, args.corrupt_every) {
            let round = tick / args.corrupt_every;
            let kind = Corruption::nth(round);
            if let Some(id) = self.host.corrupt(round.wrapping_mul(3), kind) {
                debug!(entity = %id, ?kind, "corruption injected");
            }
        }
        if every(tick, args.action_every) {
            let round = tick / args.action_every;
            if let Some(id) = self.host.pick(round) {
                let line = if round.is_multiple_of(2) { "/spawn" } else { "/home" };
                let verdict = self.sentinel.on_action(&mut self.host, id, line, Instant::now());
                debug!(entity = %id, line, ?verdict, "action intercepted");
                if let ActionVerdict::PassThrough(_) = verdict {
                    if let Err(fault) = self.host.execute_action(id, line.trim_start_matches('/')) {
                        warn!(entity = %id, %fault, "pass-through action failed");
                    }
                }
            }
        }
    }

    fn run_command(&mut self, line: &str) {
        let line = line.trim();
        let line = line.strip_prefix("sentinel ").unwrap_or(line);
        if line.eq_ignore_ascii_case("status json") {
            match serde_json::to_string_pretty(&StatusReport::of(&self.sentinel)) {
                Ok(json) => info!(target: "sentineld::admin", "{json}"),
                Err(err) => warn!(%err, "status encoding failed"),
            }
            return;
        }
        let command = AdminCommand::parse(line);
        let messages = self.sentinel.config().messages.clone();
        match self
            .admin
            .execute(&mut self.sentinel, &mut self.host, Issuer::Console, command)
        {
            Ok(reply) => {
                for out in reply.lines(&messages) {
                    info!(target: "sentineld::admin", "{out}");
                }
            }
            Err(err) => {
                warn!(target: "sentineld::admin", %err, "{}", messages.prefixed(err.message_key()));
            }
        }
    }
}

fn every(tick: u64, period: u64) -> bool {
    period > 0 && tick.is_multiple_of(period)
}

fn log_report(report: &TickReport) {
    if report.repaired > 0 || report.faults > 0 || !report.disconnected.is_empty() {
        info!(
            tick = report.tick,
            scanned = report.scanned,
            repaired = report.repaired,
            disconnected = report.disconnected.len(),
            faults = report.faults,
            "tick"
        );
    }
    for (entity, state) in &report.deferred {
        debug!(tick = report.tick, %entity, ?state, "deferred action settled");
    }
}

fn spawn_stdin_reader() -> UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    info!("Starting Sentinel Daemon (sentineld)...");
    info!("Tick interval: {}ms", args.tick_interval);

    let store = match &args.config_dir {
        Some(dir) => FsConfigStore::at(dir),
        None => FsConfigStore::new("echo-sentinel"),
    }
    .context("opening config store")?;
    info!("Config directory: {}", store.data_dir().display());
    let audit_dir = store.data_dir().join("logs");
    let audit: Arc<dyn AuditSink> =
        Arc::new(DailyFileAudit::new(&audit_dir).context("opening audit directory")?);

    let admin = Admin::new(store);
    let loaded = admin.load_config().context("loading config")?;
    if loaded.written {
        info!(from_version = loaded.from_version, "config written");
    }
    let mut sentinel = Sentinel::new(loaded.value, audit);
    sentinel.start_if_configured();

    let mut host = SimHost::default();
    for _ in 0..args.population.max(1) {
        let id = host.spawn_entity();
        sentinel.on_join(id);
    }

    let period = Duration::from_millis(args.tick_interval.max(1));
    let mut daemon = Daemon {
        args,
        admin,
        sentinel,
        host,
        commands: spawn_stdin_reader(),
    };

    tokio::select! {
        result = echo_sched::drive(period, |tick| {
            daemon.on_tick(tick);
            Ok(())
        }) => result?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("waiting for ctrl-c")?;
            info!("Shutting down");
        }
    }

    Ok(())
}
