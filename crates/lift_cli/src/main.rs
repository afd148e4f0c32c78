//! liftsim: run an elevator group-control simulation from two YAML configs
//! and stream the event log as NDJSON.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::de::DeserializeOwned;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lift_core::bus::MessageBus;
use lift_core::config::{GroupControlConfig, SimulationConfig};
use lift_core::log::EventLogWriter;
use lift_core::runner::{initialize_simulation, run_until_empty_realtime, simulation_schedule};
use lift_core::scenario::build_world;
use lift_core::stats::SimStats;

/// Discrete-event simulator for multi-car elevator installations.
#[derive(Debug, Parser)]
#[command(name = "liftsim", version, about)]
struct Cli {
    /// Simulation configuration (building, elevators, doors, traffic).
    simulation_config: PathBuf,
    /// Group-control configuration (allocation and repositioning strategies).
    group_control_config: PathBuf,
    /// Event log output path (NDJSON).
    #[arg(long, default_value = "simulation_log.ndjson")]
    log_file: PathBuf,
    /// Runaway guard on the event pump.
    #[arg(long, default_value_t = 10_000_000)]
    max_steps: usize,
}

/// Both documents accept either a wrapped (`simulation:` / `group_control:`)
/// or a bare mapping.
fn load_config<T: DeserializeOwned>(path: &PathBuf, wrapper_key: &str) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let value: serde_yaml::Value = serde_yaml::from_str(&text)
        .with_context(|| format!("invalid YAML in {}", path.display()))?;
    let inner = match &value {
        serde_yaml::Value::Mapping(mapping) => {
            mapping.get(wrapper_key).cloned().unwrap_or(value)
        }
        _ => value,
    };
    serde_yaml::from_value(inner)
        .with_context(|| format!("invalid configuration in {}", path.display()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let sim: SimulationConfig = load_config(&cli.simulation_config, "simulation")?;
    let gc: GroupControlConfig = load_config(&cli.group_control_config, "group_control")?;

    // Configuration problems abort here, before any event runs.
    let mut world = build_world(&sim, &gc).context("configuration rejected")?;
    initialize_simulation(&mut world);
    let mut schedule = simulation_schedule();

    let log_file = File::create(&cli.log_file)
        .with_context(|| format!("failed to create log file {}", cli.log_file.display()))?;
    let mut log_writer = EventLogWriter::new(BufWriter::new(log_file));

    info!(
        simulation = %cli.simulation_config.display(),
        group_control = %cli.group_control_config.display(),
        log = %cli.log_file.display(),
        "starting simulation"
    );

    let steps = run_until_empty_realtime(
        &mut world,
        &mut schedule,
        cli.max_steps,
        sim.realtime_factor,
        |world, _event| {
            let records = world.resource_mut::<MessageBus>().take_new_records();
            if let Err(error) = log_writer.write_records(&records) {
                tracing::error!(%error, "failed to write event log");
            }
        },
    );

    // Anything published after the last processed event (final statuses).
    let records = world.resource_mut::<MessageBus>().take_new_records();
    log_writer.write_records(&records)?;
    log_writer.flush()?;

    let summary = world.resource::<SimStats>().summary();
    println!("simulation complete: {steps} events processed");
    println!("  passengers spawned:   {}", summary.passengers_spawned);
    println!("  journeys completed:   {}", summary.journeys_completed);
    println!("  boarding failures:    {}", summary.boarding_failures);
    println!("  full-load bypasses:   {}", summary.full_load_bypasses);
    println!("  reopen denials:       {}", summary.reopen_denials);
    println!("  safety violations:    {}", summary.safety_violations);
    if let Some(avg) = summary.avg_wait_secs {
        println!("  avg wait to board:    {avg:.2} s");
    }
    if let Some(max) = summary.max_wait_secs {
        println!("  max wait to board:    {max:.2} s");
    }
    if let Some(avg) = summary.avg_riding_secs {
        println!("  avg riding time:      {avg:.2} s");
    }
    if let Some(avg) = summary.avg_journey_secs {
        println!("  avg journey time:     {avg:.2} s");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn loads_wrapped_and_bare_documents() {
        let mut wrapped = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(
            wrapped,
            "simulation:\n  building:\n    num_floors: 6\n  random_seed: 7"
        )
        .expect("write");
        let config: SimulationConfig =
            load_config(&wrapped.path().to_path_buf(), "simulation").expect("wrapped");
        assert_eq!(config.building.num_floors, 6);
        assert_eq!(config.random_seed, Some(7));

        let mut bare = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(bare, "building:\n  num_floors: 4").expect("write");
        let config: SimulationConfig =
            load_config(&bare.path().to_path_buf(), "simulation").expect("bare");
        assert_eq!(config.building.num_floors, 4);
    }

    #[test]
    fn rejects_malformed_yaml() {
        let mut bad = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(bad, "building: [not: a mapping").expect("write");
        let result: Result<SimulationConfig> = load_config(&bad.path().to_path_buf(), "simulation");
        assert!(result.is_err());
    }
}
