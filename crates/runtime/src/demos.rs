//! Example graphs runnable from the command line.

use clap::ValueEnum;
use compute::kernel::{BorderPolicy, ReduceOp};
use compute::{FieldData, FieldType, Shape};
use graph::{ExternalError, Graph, GraphError, NodeRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Demo {
    /// `x <== x + 1` with the count drained to the log.
    Counter,
    /// Heat diffusion on a torus with random point sources.
    Diffusion,
    /// Winner-take-all over random scores, tallying wins per slot.
    Winner,
}

const GRID: usize = 16;
const SLOTS: usize = 8;

fn log_sink(label: &'static str) -> impl FnMut(&FieldData) -> Result<(), ExternalError> + Send {
    move |value: &FieldData| -> Result<(), ExternalError> {
        tracing::debug!(actuator = label, values = ?value.values(), "drained");
        Ok(())
    }
}

fn counter(g: &mut Graph) -> Result<(), GraphError> {
    let x = g.declare_constant(FieldData::from_slice(&[0.0])?)?;
    let next = g.offset(x, 1.0)?;
    g.bind_recurrence(x, next)?;
    g.declare_actuator(x, log_sink("count"))?;
    g.probe(x, "count")
}

/// 5-point Laplacian with wrap-around borders.
fn laplacian(g: &mut Graph, x: NodeRef) -> Result<NodeRef, GraphError> {
    let mut sum = g.scale(x, -4.0)?;
    for offsets in [[1, 0], [-1, 0], [0, 1], [0, -1]] {
        let neighbour = g.shift(x, &offsets, BorderPolicy::Cyclic)?;
        sum = g.add(sum, neighbour)?;
    }
    Ok(sum)
}

fn diffusion(g: &mut Graph, seed: u64) -> Result<(), GraphError> {
    let ty = FieldType::scalar(Shape::new(&[GRID, GRID])?);
    let mut rng = fastrand::Rng::with_seed(seed);
    let heat = g.declare_field(ty.clone(), |_, _| (rng.f32() * 0.1).into())?;

    let mut rng = fastrand::Rng::with_seed(seed.wrapping_add(1));
    let source_type = ty.clone();
    let source = g.declare_sensor(ty, move || -> Result<FieldData, ExternalError> {
        let mut value = FieldData::zeros(source_type.clone());
        value.set_element(rng.usize(..GRID * GRID), 0, compute::Complex::real(1.0));
        Ok(value)
    })?;

    let spread = laplacian(g, heat)?;
    let spread = g.scale(spread, 0.2)?;
    let injected = g.scale(source, 0.5)?;
    let delta = g.add(spread, injected)?;
    let next = g.add(heat, delta)?;
    g.bind_recurrence(heat, next)?;

    let total = g.field_reduce(heat, ReduceOp::Sum)?;
    let peak = g.field_reduce(heat, ReduceOp::Max)?;
    g.declare_actuator(total, log_sink("total heat"))?;
    g.probe(total, "total")?;
    g.probe(peak, "peak")
}

fn winner(g: &mut Graph, seed: u64) -> Result<(), GraphError> {
    let ty = FieldType::scalar(Shape::new(&[SLOTS])?);
    let mut rng = fastrand::Rng::with_seed(seed);
    let score_type = ty.clone();
    let scores = g.declare_sensor(ty.clone(), move || -> Result<FieldData, ExternalError> {
        let values = (0..SLOTS).map(|_| rng.f32()).collect();
        Ok(FieldData::from_values(score_type.clone(), values)?)
    })?;
    let won = g.winner_take_all(scores)?;

    let tally = g.declare_constant(FieldData::zeros(ty))?;
    let next = g.add(tally, won)?;
    g.bind_recurrence(tally, next)?;
    g.declare_actuator(won, log_sink("winner"))?;
    g.probe(won, "winner")?;
    g.probe(tally, "tally")
}

/// Declares the graph of `demo`, probes included.
pub fn build(demo: Demo, seed: u64) -> Result<Graph, GraphError> {
    let mut g = Graph::new();
    match demo {
        Demo::Counter => counter(&mut g)?,
        Demo::Diffusion => diffusion(&mut g, seed)?,
        Demo::Winner => winner(&mut g, seed)?,
    }
    Ok(g)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clock::Clock;
    use graph::CompilerConfig;

    fn run(demo: Demo, steps: u64) -> Clock {
        let mut g = build(demo, 3).unwrap();
        let compiled = g.freeze(&CompilerConfig::default()).unwrap();
        let mut clock = Clock::with_default_backend(compiled).unwrap();
        clock.reset().unwrap();
        for _ in 0..steps {
            clock.step().unwrap();
        }
        clock
    }

    #[test]
    fn counter_counts() {
        let clock = run(Demo::Counter, 7);
        let count = clock.probe_handle().read_named("count").unwrap();
        assert_eq!(count.values(), &[7.0]);
    }

    #[test]
    fn winner_tally_sums_to_step_count() {
        let clock = run(Demo::Winner, 12);
        let tally = clock.probe_handle().read_named("tally").unwrap();
        assert_eq!(tally.values().iter().sum::<f32>(), 12.0);
        let won = clock.probe_handle().read_named("winner").unwrap();
        assert_eq!(won.values().iter().filter(|&&v| v == 1.0).count(), 1);
    }

    #[test]
    fn diffusion_gains_the_injected_heat() {
        let start = run(Demo::Diffusion, 0);
        let before = start.probe_handle().read_named("total").unwrap().values()[0];
        let later = run(Demo::Diffusion, 4);
        let after = later.probe_handle().read_named("total").unwrap().values()[0];
        assert!((after - before - 2.0).abs() < 1e-3);
    }
}
