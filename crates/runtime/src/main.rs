//! # fieldflow
//!
//! Builds one of the demo graphs, compiles it and drives it through the
//! two-phase clock, logging probed values after every step.

#![deny(clippy::all, clippy::pedantic)]

mod demos;
mod settings;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use clock::{Clock, ProbeSnapshot};

use demos::Demo;
use settings::Settings;

#[derive(Debug, Parser)]
#[command(name = "fieldflow", about = "Run a field graph demo")]
struct Args {
    #[arg(long, value_enum, default_value = "counter")]
    demo: Demo,
    /// Steps to run after the reset.
    #[arg(long, default_value_t = 10)]
    steps: u64,
    /// JSON file with `compiler` and `clock` sections.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value_t = 7)]
    seed: u64,
}

fn report(snapshot: &ProbeSnapshot) {
    let mut names: Vec<_> = snapshot.names.keys().collect();
    names.sort();
    for name in names {
        let Some(value) = snapshot.by_name(name) else {
            continue;
        };
        let values = value.values();
        let sum: f32 = values.iter().sum();
        let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        tracing::info!(
            step = snapshot.step,
            probe = %name,
            len = values.len(),
            sum,
            max,
            "probe"
        );
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref())?;

    tracing::info!(demo = ?args.demo, steps = args.steps, "building graph");
    let mut graph = demos::build(args.demo, args.seed).context("declaring the demo graph")?;
    let compiled = graph.freeze(&settings.compiler).context("compiling the graph")?;
    let mut clock = Clock::new(compiled, compute::default_backend(), settings.clock)?;
    let probes = clock.probe_handle();

    clock.reset()?;
    report(&probes.snapshot());
    for _ in 0..args.steps {
        if let Err(e) = clock.step() {
            tracing::error!("Error during step {}: {e}", clock.steps() + 1);
            clock.release()?;
            return Err(e.into());
        }
        report(&probes.snapshot());
    }

    clock.release()?;
    tracing::info!("Run finished after {} steps.", args.steps);
    Ok(())
}
