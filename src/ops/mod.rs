//! TL-009: Op kernels — the executor collaborator and its reference CPU
//! implementation.
//!
//! The session delegates all numeric work through `OpExecutor`:
//! `parameterize` binds resolved input values to an op, `compute` runs it.
//! `CpuExecutor` dispatches on op type to the per-category kernel modules.

pub mod arithmetic;
pub mod compare;
pub mod control;
pub mod reduce;
pub mod shape;
pub mod tensor;

use crate::core::graph::{Graph, Op};
use crate::core::types::{OpType, Value, VarKind};
use self::tensor::Tensor;

/// The op execution collaborator. The session never computes values itself.
pub trait OpExecutor {
    /// A fully parameterized, ready-to-run op.
    type Executable;

    /// Fetch the stored value of a constant or variable.
    fn constant_or_variable(&self, name: &str) -> Result<Value, String>;

    /// Bind resolved input values to an op.
    fn parameterize(&self, op: &Op, inputs: Vec<Value>) -> Result<Self::Executable, String>;

    /// Run the op, producing one value per declared output.
    fn compute(&self, executable: Self::Executable) -> Result<Vec<Value>, String>;
}

/// A parameterized op ready for the reference executor.
#[derive(Debug, Clone)]
pub struct Executable {
    pub op_name: String,
    pub op_type: OpType,
    pub inputs: Vec<Value>,
}

/// Reference single-threaded CPU executor over the minimal tensor type.
pub struct CpuExecutor<'g> {
    graph: &'g Graph,
}

impl<'g> CpuExecutor<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        Self { graph }
    }
}

impl OpExecutor for CpuExecutor<'_> {
    type Executable = Executable;

    fn constant_or_variable(&self, name: &str) -> Result<Value, String> {
        let var = self
            .graph
            .variable(name)
            .ok_or_else(|| format!("unknown variable '{}'", name))?;
        match (var.kind, &var.value) {
            (VarKind::Constant | VarKind::Variable, Some(tensor)) => {
                Ok(Value::Tensor(tensor.clone()))
            }
            _ => Err(format!("variable '{}' has no stored value", name)),
        }
    }

    fn parameterize(&self, op: &Op, inputs: Vec<Value>) -> Result<Executable, String> {
        if inputs.len() != op.inputs.len() {
            return Err(format!(
                "op '{}' declares {} input(s), resolved {}",
                op.name,
                op.inputs.len(),
                inputs.len()
            ));
        }
        // Only merge tolerates an absent input (the unproduced side)
        if op.op_type != OpType::Merge {
            if let Some(index) = inputs.iter().position(Value::is_absent) {
                return Err(format!(
                    "op '{}': input '{}' is absent",
                    op.name, op.inputs[index]
                ));
            }
        }
        Ok(Executable {
            op_name: op.name.clone(),
            op_type: op.op_type,
            inputs,
        })
    }

    fn compute(&self, executable: Executable) -> Result<Vec<Value>, String> {
        match executable.op_type {
            OpType::Add | OpType::Sub | OpType::Mul | OpType::Div | OpType::Neg => {
                arithmetic::execute(&executable)
            }
            OpType::Less | OpType::LessEqual | OpType::Greater | OpType::Equal => {
                compare::execute(&executable)
            }
            OpType::Sum | OpType::Min | OpType::Max => reduce::execute(&executable),
            OpType::Identity | OpType::Size | OpType::Concat => shape::execute(&executable),
            OpType::Switch
            | OpType::Merge
            | OpType::Enter
            | OpType::Exit
            | OpType::NextIteration
            | OpType::LoopCond
            | OpType::While => control::execute(&executable),
        }
    }
}

/// Fetch input `index` as a tensor, with a kernel-style error otherwise.
pub(crate) fn tensor_arg<'a>(
    executable: &'a Executable,
    index: usize,
) -> Result<&'a Tensor, String> {
    let value = executable.inputs.get(index).ok_or_else(|| {
        format!(
            "op '{}' ({}) missing input {}",
            executable.op_name, executable.op_type, index
        )
    })?;
    value.tensor().ok_or_else(|| {
        format!(
            "op '{}' ({}) input {} is not a tensor",
            executable.op_name, executable.op_type, index
        )
    })
}

#[cfg(test)]
pub(crate) fn exec(op_type: OpType, inputs: Vec<Value>) -> Executable {
    Executable {
        op_name: format!("test-{}", op_type),
        op_type,
        inputs,
    }
}
