use compute::{ComputeError, FieldType};
use graph::{ExternalError, NodeRef};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClockError {
    #[error("clock has not been reset")]
    NotReset,
    #[error("graph has been released")]
    GraphReleased,
    #[error("graph failed during an earlier step")]
    GraphFailed,
    #[error("sensor {node} failed to fetch")]
    Sensor {
        node: NodeRef,
        #[source]
        source: ExternalError,
    },
    #[error("actuator {node} failed to drain")]
    Actuator {
        node: NodeRef,
        #[source]
        source: ExternalError,
    },
    #[error("sensor {node} produced {found}, declared as {expected}")]
    SensorType {
        node: NodeRef,
        expected: FieldType,
        found: FieldType,
    },
    #[error("node {0} is not probed")]
    UnknownProbe(NodeRef),
    #[error("no value for node {0} in this step")]
    MissingValue(NodeRef),
    #[error("worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
    #[error(transparent)]
    Backend(#[from] ComputeError),
}
