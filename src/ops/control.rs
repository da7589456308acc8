//! TL-014: Control-flow kernels — value-level semantics only.
//!
//! Frame/iteration bookkeeping lives in the session; these kernels just
//! route values. Switch emits its data input on exactly one of two outputs
//! (index 0 when the predicate is false, index 1 when true). Merge forwards
//! whichever of its two inputs is present. Enter, exit, next_iteration,
//! loop_cond and while forward their input unchanged.

use super::{tensor_arg, Executable};
use crate::core::types::{OpType, Value};

pub fn execute(executable: &Executable) -> Result<Vec<Value>, String> {
    match executable.op_type {
        OpType::Switch => {
            let data = executable.inputs.first().cloned().ok_or_else(|| {
                format!("op '{}' (switch) missing data input", executable.op_name)
            })?;
            let taken = tensor_arg(executable, 1)?
                .truthy()
                .map_err(|e| format!("op '{}': {}", executable.op_name, e))?;
            if taken {
                Ok(vec![Value::Absent, data])
            } else {
                Ok(vec![data, Value::Absent])
            }
        }
        OpType::Merge => {
            let present = executable.inputs.iter().find(|v| !v.is_absent());
            match present {
                Some(value) => Ok(vec![value.clone()]),
                None => Err(format!(
                    "op '{}' (merge) has no available input",
                    executable.op_name
                )),
            }
        }
        OpType::Enter
        | OpType::Exit
        | OpType::NextIteration
        | OpType::LoopCond
        | OpType::While => {
            let input = executable.inputs.first().cloned().ok_or_else(|| {
                format!(
                    "op '{}' ({}) missing input",
                    executable.op_name, executable.op_type
                )
            })?;
            Ok(vec![input])
        }
        other => Err(format!("not a control-flow op: {}", other)),
    }
}
