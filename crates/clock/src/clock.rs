//! Two-phase master/slave execution of a compiled graph.
//!
//! Every step first copies each master buffer into its slave and runs the
//! kernel schedule on the slave snapshot while sensors fetch and actuators
//! drain. Only then are the new values latched into the masters, so a value
//! fed back at step `n` is visible from step `n + 1`.

use std::sync::Arc;

use compute::kernels::decode_outputs;
use compute::{ComputeBackend, FieldData};
use graph::{ActuatorBinding, CompiledGraph, FusedKernel, NodeRef, SensorBinding};
use rayon::prelude::*;
use tracing::{debug, error, info};

use crate::buffers::{BufferArena, Frame, MasterSlave};
use crate::config::ClockConfig;
use crate::error::ClockError;
use crate::probe::{ProbeHandle, ProbeSnapshot};
use crate::state::ClockState;

fn fetch(sensor: &mut SensorBinding) -> Result<FieldData, ClockError> {
    let value = sensor.source.fetch().map_err(|source| ClockError::Sensor {
        node: sensor.node,
        source,
    })?;
    if value.field_type() != &sensor.field_type {
        return Err(ClockError::SensorType {
            node: sensor.node,
            expected: sensor.field_type.clone(),
            found: value.field_type().clone(),
        });
    }
    Ok(value)
}

fn fetch_all(sensors: &mut [SensorBinding], parallel: bool) -> Result<Vec<FieldData>, ClockError> {
    if parallel {
        sensors.par_iter_mut().map(fetch).collect()
    } else {
        sensors.iter_mut().map(fetch).collect()
    }
}

fn drain_all(actuators: &mut [ActuatorBinding], buffers: &BufferArena) -> Result<(), ClockError> {
    for actuator in actuators {
        let value = &buffers.get(actuator.node)?.slave;
        actuator.sink.drain(value).map_err(|source| ClockError::Actuator {
            node: actuator.node,
            source,
        })?;
    }
    Ok(())
}

fn run_kernel(
    kernel: &FusedKernel,
    frame: &Frame,
    backend: &dyn ComputeBackend,
) -> Result<Vec<(NodeRef, FieldData)>, ClockError> {
    let mut binds = Vec::with_capacity(kernel.inputs.len() + kernel.outputs.len());
    for &node in &kernel.inputs {
        binds.push(frame.get(node)?.to_buffer_view());
    }
    for ty in &kernel.program.outputs {
        binds.push(FieldData::zeros(ty.clone()).to_buffer_view());
    }
    let bytes = backend.dispatch(&kernel.program, &binds, kernel.workgroups())?;
    let values = decode_outputs(&kernel.program, &bytes)?;
    Ok(kernel.outputs.iter().copied().zip(values).collect())
}

/// Runs the kernel schedule one dependency wave at a time. Kernels of a
/// wave read the same frame and their outputs land once the wave is done.
fn propagate(
    kernels: &[FusedKernel],
    waves: &[Vec<usize>],
    frame: &mut Frame,
    backend: &dyn ComputeBackend,
    parallel: bool,
) -> Result<(), ClockError> {
    for wave in waves {
        let snapshot: &Frame = frame;
        let run = |&k: &usize| run_kernel(&kernels[k], snapshot, backend);
        let results: Vec<_> = if parallel && wave.len() > 1 {
            wave.par_iter().map(run).collect()
        } else {
            wave.iter().map(run).collect()
        };
        for result in results {
            for (node, value) in result? {
                frame.set(node, value);
            }
        }
    }
    Ok(())
}

/// Values of every source node as held by the slaves.
fn source_frame(graph: &CompiledGraph, buffers: &BufferArena) -> Result<Frame, ClockError> {
    let mut frame = Frame::with_len(graph.node_types.len());
    for constant in &graph.constants {
        frame.set(constant.node, constant.value.clone());
    }
    let double_buffered = graph
        .sensors
        .iter()
        .map(|s| s.node)
        .chain(graph.recurrences.iter().map(|r| r.node));
    for node in double_buffered {
        frame.set(node, buffers.get(node)?.slave.clone());
    }
    Ok(frame)
}

/// Phase 2: masters take the fetched and computed values.
fn latch(
    graph: &CompiledGraph,
    buffers: &mut BufferArena,
    frame: &Frame,
    fetched: Vec<FieldData>,
) -> Result<(), ClockError> {
    for (sensor, value) in graph.sensors.iter().zip(fetched) {
        buffers.get_mut(sensor.node)?.master = value;
    }
    for actuator in &graph.actuators {
        buffers.get_mut(actuator.node)?.master = frame.get(actuator.input)?.clone();
    }
    for recurrence in &graph.recurrences {
        buffers.get_mut(recurrence.node)?.master = frame.get(recurrence.feedback)?.clone();
    }
    Ok(())
}

fn publish(probes: &ProbeHandle, graph: &CompiledGraph, frame: &Frame, step: u64) -> Result<(), ClockError> {
    let mut snapshot = ProbeSnapshot {
        step,
        ..ProbeSnapshot::default()
    };
    for probe in &graph.probes {
        snapshot.fields.insert(probe.node, frame.get(probe.node)?.clone());
        snapshot.names.insert(probe.name.clone(), probe.node);
    }
    probes.publish(snapshot);
    Ok(())
}

/// Drives a [`CompiledGraph`] through reset, step and release.
pub struct Clock {
    graph: Option<CompiledGraph>,
    backend: Arc<dyn ComputeBackend>,
    config: ClockConfig,
    pool: Option<rayon::ThreadPool>,
    state: ClockState,
    buffers: BufferArena,
    probes: ProbeHandle,
    steps: u64,
}

impl Clock {
    pub fn new(
        graph: CompiledGraph,
        backend: Arc<dyn ComputeBackend>,
        config: ClockConfig,
    ) -> Result<Self, ClockError> {
        let pool = match config.worker_threads {
            Some(threads) => Some(rayon::ThreadPoolBuilder::new().num_threads(threads).build()?),
            None => None,
        };
        info!(
            kernels = graph.kernels.len(),
            waves = graph.waves.len(),
            backend = backend.name(),
            parallel = config.parallel,
            "clock created"
        );
        Ok(Self {
            graph: Some(graph),
            backend,
            config,
            pool,
            state: ClockState::Unreset,
            buffers: BufferArena::default(),
            probes: ProbeHandle::default(),
            steps: 0,
        })
    }

    /// Clock on [`compute::default_backend`] with default settings.
    pub fn with_default_backend(graph: CompiledGraph) -> Result<Self, ClockError> {
        Self::new(graph, compute::default_backend(), ClockConfig::default())
    }

    #[must_use]
    pub fn state(&self) -> ClockState {
        self.state
    }

    /// Steps completed since the last reset.
    #[must_use]
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Handle for reading probe snapshots from other threads.
    #[must_use]
    pub fn probe_handle(&self) -> ProbeHandle {
        self.probes.clone()
    }

    /// Value of a probed node as of the last completed step.
    pub fn read_probe(&self, node: NodeRef) -> Result<FieldData, ClockError> {
        match self.state {
            ClockState::Released => return Err(ClockError::GraphReleased),
            ClockState::Unreset => return Err(ClockError::NotReset),
            _ => {}
        }
        self.probes.read(node).ok_or(ClockError::UnknownProbe(node))
    }

    fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    /// Rebuilds every buffer from the sensors and declared initial values,
    /// runs one propagation and primes the actuators.
    ///
    /// Actuators drain the primed value here and again in the first `step`,
    /// so every sink sees the reset value twice.
    pub fn reset(&mut self) -> Result<(), ClockError> {
        self.state.check_reset()?;
        let mut graph = self.graph.take().ok_or(ClockError::GraphReleased)?;
        let result = self.prime(&mut graph);
        self.graph = Some(graph);
        match result {
            Ok(()) => {
                self.state = ClockState::Primed;
                info!("clock reset");
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "reset failed");
                self.state = ClockState::Failed;
                Err(err)
            }
        }
    }

    fn prime(&mut self, graph: &mut CompiledGraph) -> Result<(), ClockError> {
        let mut buffers = BufferArena::with_len(graph.node_types.len());
        let initial = fetch_all(&mut graph.sensors, false)?;
        for (sensor, value) in graph.sensors.iter().zip(initial) {
            buffers.insert(sensor.node, MasterSlave::new(value));
        }
        for recurrence in &graph.recurrences {
            buffers.insert(recurrence.node, MasterSlave::new(recurrence.init.clone()));
        }

        let mut frame = source_frame(graph, &buffers)?;
        let parallel = self.config.parallel;
        let backend = self.backend.as_ref();
        let (kernels, waves) = (&graph.kernels, &graph.waves);
        self.install(|| propagate(kernels, waves, &mut frame, backend, parallel))?;

        for actuator in &graph.actuators {
            let value = frame.get(actuator.input)?.clone();
            buffers.insert(actuator.node, MasterSlave::new(value));
        }
        let fetched = fetch_all(&mut graph.sensors, false)?;
        latch(graph, &mut buffers, &frame, fetched)?;
        for actuator in &graph.actuators {
            buffers.get_mut(actuator.node)?.advance();
        }
        drain_all(&mut graph.actuators, &buffers)?;

        self.buffers = buffers;
        self.steps = 0;
        publish(&self.probes, graph, &frame, 0)
    }

    /// Advances the graph by one step.
    pub fn step(&mut self) -> Result<(), ClockError> {
        self.state.check_step()?;
        let mut graph = self.graph.take().ok_or(ClockError::GraphReleased)?;
        let result = self.advance(&mut graph);
        self.graph = Some(graph);
        match result {
            Ok(()) => {
                self.state = ClockState::Stepping;
                debug!(step = self.steps, "step complete");
                Ok(())
            }
            Err(err) => {
                error!(error = %err, step = self.steps + 1, "step failed");
                self.state = ClockState::Failed;
                Err(err)
            }
        }
    }

    fn advance(&mut self, graph: &mut CompiledGraph) -> Result<(), ClockError> {
        // Phase 1
        self.buffers.advance_all();
        let mut frame = source_frame(graph, &self.buffers)?;
        let parallel = self.config.parallel;
        let backend = self.backend.as_ref();
        let buffers = &self.buffers;
        let CompiledGraph {
            sensors,
            actuators,
            kernels,
            waves,
            ..
        } = &mut *graph;
        let frame_ref = &mut frame;
        let fetched = self.install(|| {
            if parallel {
                let (fetched, (drained, computed)) = rayon::join(
                    || fetch_all(sensors, true),
                    || {
                        rayon::join(
                            || drain_all(actuators, buffers),
                            || propagate(kernels, waves, frame_ref, backend, true),
                        )
                    },
                );
                drained?;
                computed?;
                fetched
            } else {
                let fetched = fetch_all(sensors, false)?;
                drain_all(actuators, buffers)?;
                propagate(kernels, waves, frame_ref, backend, false)?;
                Ok(fetched)
            }
        })?;

        // Phase 2
        latch(graph, &mut self.buffers, &frame, fetched)?;
        self.steps += 1;
        publish(&self.probes, graph, &frame, self.steps)
    }

    /// Frees buffers and kernels. The clock accepts no further calls.
    pub fn release(&mut self) -> Result<(), ClockError> {
        if self.state == ClockState::Released {
            return Err(ClockError::GraphReleased);
        }
        self.graph = None;
        self.buffers.clear();
        self.probes.publish(ProbeSnapshot::default());
        self.state = ClockState::Released;
        info!("clock released");
        Ok(())
    }
}

impl Drop for Clock {
    fn drop(&mut self) {
        if self.state != ClockState::Released {
            debug!(state = %self.state, "clock dropped without release");
        }
    }
}
