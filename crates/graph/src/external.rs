//! Interfaces to code outside the graph: sensors feed fields in, actuators
//! drain fields out. Both are driven by the clock, possibly from a worker
//! thread, once per step.

use compute::FieldData;

pub type ExternalError = Box<dyn std::error::Error + Send + Sync>;

pub trait FieldSource: Send {
    /// Produces the next input value.
    fn fetch(&mut self) -> Result<FieldData, ExternalError>;
}

pub trait FieldSink: Send {
    /// Consumes one output value.
    fn drain(&mut self, value: &FieldData) -> Result<(), ExternalError>;
}

impl<F> FieldSource for F
where
    F: FnMut() -> Result<FieldData, ExternalError> + Send,
{
    fn fetch(&mut self) -> Result<FieldData, ExternalError> {
        self()
    }
}

impl<F> FieldSink for F
where
    F: FnMut(&FieldData) -> Result<(), ExternalError> + Send,
{
    fn drain(&mut self, value: &FieldData) -> Result<(), ExternalError> {
        self(value)
    }
}
