//! User-defined multi-output kernels.
//!
//! A [`KernelTemplate`] is registered once and instantiated at any number of
//! call sites. Each instantiation yields one node per named output and always
//! compiles to a kernel of its own.

use compute::kernel::{Stmt, ThreadAddressing, MAX_KERNEL_OUTPUTS};
use compute::{FieldType, TensorRegime};

use crate::error::GraphError;
use crate::node::NodeRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TemplateId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub(crate) usize);

/// Type of a kernel output as a function of the input types.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputRule {
    /// Same type as input `slot`.
    LikeInput(usize),
    Fixed(FieldType),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputSpec {
    pub name: String,
    pub rule: OutputRule,
}

impl OutputSpec {
    pub fn new(name: impl Into<String>, rule: OutputRule) -> Self {
        Self {
            name: name.into(),
            rule,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum KernelBodies {
    /// One body for every tensor size.
    Uniform(Vec<Stmt>),
    /// Separate bodies for small and big tensors.
    Dual { small: Vec<Stmt>, big: Vec<Stmt> },
}

impl KernelBodies {
    #[must_use]
    pub fn select(&self, regime: TensorRegime) -> &[Stmt] {
        match (self, regime) {
            (Self::Uniform(body), _) => body,
            (Self::Dual { small, .. }, TensorRegime::Small) => small,
            (Self::Dual { big, .. }, TensorRegime::Big) => big,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KernelTemplate {
    pub name: String,
    pub outputs: Vec<OutputSpec>,
    pub addressing: ThreadAddressing,
    /// Work-group size replacing the platform default.
    pub local_size: Option<Vec<usize>>,
    /// Number of temporaries the bodies bind.
    pub temps: usize,
    pub bodies: KernelBodies,
}

impl KernelTemplate {
    pub fn new(name: impl Into<String>, outputs: Vec<OutputSpec>, bodies: KernelBodies) -> Self {
        Self {
            name: name.into(),
            outputs,
            addressing: ThreadAddressing::default(),
            local_size: None,
            temps: 0,
            bodies,
        }
    }

    #[must_use]
    pub fn with_addressing(mut self, addressing: ThreadAddressing) -> Self {
        self.addressing = addressing;
        self
    }

    #[must_use]
    pub fn with_local_size(mut self, local: Vec<usize>) -> Self {
        self.local_size = Some(local);
        self
    }

    #[must_use]
    pub fn with_temps(mut self, temps: usize) -> Self {
        self.temps = temps;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), GraphError> {
        if self.outputs.is_empty() {
            return Err(GraphError::invalid("custom kernel", "at least one output is required"));
        }
        if self.outputs.len() > MAX_KERNEL_OUTPUTS {
            return Err(GraphError::TooManyOutputs {
                kernel: self.name.clone(),
                count: self.outputs.len(),
            });
        }
        Ok(())
    }

    /// Output types for a call with `inputs`.
    pub fn output_types(&self, inputs: &[&FieldType]) -> Result<Vec<FieldType>, GraphError> {
        for ty in inputs {
            if ty.element.is_color() {
                return Err(GraphError::UnsupportedElementKind {
                    op: "custom kernel",
                    element: ty.element,
                });
            }
        }
        if let ThreadAddressing::PerInputTensor(slot) | ThreadAddressing::PerInputElement(slot) =
            self.addressing
        {
            if slot >= inputs.len() {
                return Err(GraphError::invalid(
                    "custom kernel",
                    format!("addressing refers to missing input {slot}"),
                ));
            }
        }
        self.outputs
            .iter()
            .map(|out| match &out.rule {
                OutputRule::Fixed(ty) => Ok(ty.clone()),
                OutputRule::LikeInput(slot) => inputs
                    .get(*slot)
                    .map(|ty| (*ty).clone())
                    .ok_or_else(|| {
                        GraphError::invalid(
                            "custom kernel",
                            format!("output `{}` follows missing input {slot}", out.name),
                        )
                    }),
            })
            .collect()
    }
}

/// One call site of a registered template.
#[derive(Debug, Clone)]
pub struct KernelInstance {
    pub template: TemplateId,
    pub inputs: Vec<NodeRef>,
    /// Output nodes in output order.
    pub outputs: Vec<NodeRef>,
}
