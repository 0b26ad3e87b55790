use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rdt_lab_abstract::{CorruptAckPolicy, ProtocolConfig, SimConfig};
use rdt_lab_protocols::{ProtocolKind, build_pair};
use rdt_lab_simulator::{SimulationReport, Simulator, scenario_runner};

#[derive(Parser, Debug)]
#[command(author, version, about = "Reliable data transfer simulator")]
struct Args {
    /// Protocol family: naive, abp, gbn or connected. Overrides the scenario's choice.
    #[arg(long)]
    protocol: Option<String>,

    /// Load a scenario from disk.
    #[arg(long)]
    scenario: Option<PathBuf>,

    #[arg(long)]
    window_size: Option<usize>,

    /// Retransmission timeout in simulation steps.
    #[arg(long)]
    retransmit_interval: Option<u64>,

    /// What a sender does with a garbled ACK: await-timeout or retransmit.
    #[arg(long)]
    corrupt_ack_policy: Option<CorruptAckPolicy>,

    #[arg(long, default_value_t = 0.1)]
    loss_rate: f64,

    #[arg(long, default_value_t = 0.1)]
    corrupt_rate: f64,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Number of messages the application offers in the default run.
    #[arg(long, default_value_t = 10)]
    messages: usize,

    /// Write a JSON trace of the finished simulation.
    #[arg(long)]
    trace_out: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();
    info!("rdt-lab-sim-cli starting…");

    let report = match &args.scenario {
        Some(path) => run_scenario(&args, path)?,
        None => run_default_sim(&args)?,
    };

    log_summary(&report);

    if let Some(trace_path) = &args.trace_out {
        write_trace(trace_path, &report)?;
        info!("Trace written to {}", trace_path.display());
    }

    Ok(())
}

impl Args {
    fn apply_protocol_overrides(&self, mut config: ProtocolConfig) -> ProtocolConfig {
        if let Some(n) = self.window_size {
            config = config.with_window_size(n);
        }
        if let Some(interval) = self.retransmit_interval {
            config = config.with_retransmit_interval(interval);
        }
        if let Some(policy) = self.corrupt_ack_policy {
            config = config.with_corrupt_ack_policy(policy);
        }
        config
    }

    fn channel_config(&self) -> SimConfig {
        SimConfig {
            loss_rate: self.loss_rate,
            corrupt_rate: self.corrupt_rate,
            seed: self.seed,
            ..Default::default()
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run_scenario(args: &Args, path: &Path) -> Result<SimulationReport> {
    let scenario = scenario_runner::load_scenario(path)?;
    let name = args
        .protocol
        .as_deref()
        .or(scenario.protocol.as_deref())
        .unwrap_or("gbn");
    let kind = ProtocolKind::from_name(name)?;
    let config = args.apply_protocol_overrides(scenario.protocol_config.clone());

    let (sender, receiver) = build_pair(kind, &config)?;
    scenario_runner::run_scenario(&scenario, sender, receiver)
        .with_context(|| format!("Scenario '{}' failed", scenario.name))
}

fn run_default_sim(args: &Args) -> Result<SimulationReport> {
    let kind = ProtocolKind::from_name(args.protocol.as_deref().unwrap_or("gbn"))?;
    let config = args.apply_protocol_overrides(ProtocolConfig::default());
    let channel = args.channel_config();
    channel.validate().context("Invalid channel configuration")?;

    let (sender, receiver) = build_pair(kind, &config)?;
    let mut sim = Simulator::new(channel, sender, receiver);
    sim.schedule_messages(args.messages);
    if kind == ProtocolKind::Connected {
        // Close once the last message has been offered.
        let last_offer = sim.config().app_interval * args.messages as u64;
        sim.schedule_close(last_offer);
    }

    info!(
        "Starting default simulation: {} with {} messages",
        kind.name(),
        args.messages
    );
    sim.run_until_complete();
    info!("Simulation complete.");
    Ok(sim.export_report())
}

fn log_summary(report: &SimulationReport) {
    info!(
        "Delivered {} messages in {} steps ({} sent, {} ACKs, {} rejections)",
        report.delivered_data.len(),
        report.duration,
        report.sender_segment_count,
        report.receiver_segment_count,
        report.app_rejections
    );
    if report.timed_out {
        warn!("Run stopped at the time limit");
    }
    if report.pending_app_messages > 0 {
        warn!(
            "{} messages were never accepted by the sender",
            report.pending_app_messages
        );
    }
}

fn write_trace(path: &Path, report: &SimulationReport) -> Result<()> {
    let data = serde_json::to_vec_pretty(report).context("Failed to serialize simulation trace")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write trace file {}", path.display()))?;
    Ok(())
}
