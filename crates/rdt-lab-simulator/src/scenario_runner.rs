use anyhow::{Context, Result, anyhow};
use rdt_lab_abstract::{
    ReceiverProtocol, SenderProtocol, SimConfig, TestAction, TestAssertion, TestScenario,
};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::engine::Simulator;
use crate::trace::SimulationReport;

pub fn load_scenario(path: &Path) -> Result<TestScenario> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    parse_scenario(&content)
}

pub fn parse_scenario(content: &str) -> Result<TestScenario> {
    toml::from_str(content).context("Failed to parse scenario")
}

/// Build a simulator with the scenario's channel config and actions applied.
pub fn build_simulator(
    scenario: &TestScenario,
    sender: Box<dyn SenderProtocol>,
    receiver: Box<dyn ReceiverProtocol>,
) -> Result<Simulator> {
    let mut config = SimConfig::default();
    scenario.config.apply_to(&mut config);
    config.validate().context("Invalid channel configuration")?;

    let mut sim = Simulator::new(config, sender, receiver);
    configure_actions(&mut sim, &scenario.actions);
    Ok(sim)
}

pub fn configure_actions(sim: &mut Simulator, actions: &[TestAction]) {
    for action in actions {
        match action {
            TestAction::AppSend { time, data } => {
                sim.schedule_app_send(*time, data.as_bytes().to_vec());
            }
            TestAction::Close { time } => sim.schedule_close(*time),
            TestAction::DropNextFromSenderSeq { seq } => sim.add_drop_sender_seq_once(*seq),
            TestAction::DropNextFromReceiverAck { ack } => sim.add_drop_receiver_ack_once(*ack),
            TestAction::CorruptNextFromSenderSeq { seq } => sim.add_corrupt_sender_seq_once(*seq),
            TestAction::CorruptNextFromReceiverAck { ack } => {
                sim.add_corrupt_receiver_ack_once(*ack)
            }
        }
    }
}

/// Run a scenario to completion and check its assertions.
pub fn run_scenario(
    scenario: &TestScenario,
    sender: Box<dyn SenderProtocol>,
    receiver: Box<dyn ReceiverProtocol>,
) -> Result<SimulationReport> {
    info!("Running Scenario: {}", scenario.name);
    info!("Description: {}", scenario.description);

    let mut sim = build_simulator(scenario, sender, receiver)?;

    // Call init after we've configured the simulator
    sim.init();

    let max_duration = scenario.assertions.iter().find_map(|a| match a {
        TestAssertion::MaxDuration { steps } => Some(*steps),
        _ => None,
    });

    match max_duration {
        Some(limit) => {
            while sim.step() {
                if sim.current_time() > limit {
                    return Err(anyhow!("Test timed out after {} steps", limit));
                }
            }
        }
        None => sim.run(),
    }

    let report = sim.export_report();
    check_assertions(&scenario.assertions, &report)?;
    info!("Scenario '{}' passed", scenario.name);
    Ok(report)
}

/// Load a scenario file and run it.
pub fn run_scenario_file(
    path: &Path,
    sender: Box<dyn SenderProtocol>,
    receiver: Box<dyn ReceiverProtocol>,
) -> Result<SimulationReport> {
    let scenario = load_scenario(path)?;
    run_scenario(&scenario, sender, receiver)
}

pub fn check_assertions(assertions: &[TestAssertion], report: &SimulationReport) -> Result<()> {
    if report.timed_out {
        return Err(anyhow!(
            "Simulation hit its time limit at step {}",
            report.duration
        ));
    }

    for assertion in assertions {
        match assertion {
            TestAssertion::DataDelivered { data } => {
                let found = report.delivered_data.iter().any(|d| d == data.as_bytes());
                if !found {
                    return Err(anyhow!(
                        "Assertion Failed: Data {:?} was not delivered",
                        data
                    ));
                }
            }
            TestAssertion::DeliveredInOrder { data } => {
                let delivered = report.delivered_strings();
                if &delivered != data {
                    return Err(anyhow!(
                        "Assertion Failed: delivered {:?}, expected {:?}",
                        delivered,
                        data
                    ));
                }
            }
            TestAssertion::NoDuplicates => {
                let mut seen = HashSet::new();
                if let Some(dup) = report.delivered_data.iter().find(|d| !seen.insert(*d)) {
                    return Err(anyhow!(
                        "Assertion Failed: {:?} delivered more than once",
                        String::from_utf8_lossy(dup)
                    ));
                }
            }
            TestAssertion::SenderSegmentCount { min, max } => {
                if report.sender_segment_count < *min {
                    return Err(anyhow!(
                        "Assertion Failed: Sender sent {} segments, expected min {}",
                        report.sender_segment_count,
                        min
                    ));
                }
                if let Some(max) = max
                    && report.sender_segment_count > *max
                {
                    return Err(anyhow!(
                        "Assertion Failed: Sender sent {} segments, expected max {}",
                        report.sender_segment_count,
                        max
                    ));
                }
            }
            // Enforced while stepping
            TestAssertion::MaxDuration { .. } => {}
        }
    }
    Ok(())
}
