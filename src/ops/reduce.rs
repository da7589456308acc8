//! TL-012: Reduction kernels (sum, min, max) — full reduction to a scalar.

use super::{tensor_arg, Executable};
use crate::core::types::{OpType, Value};
use crate::ops::tensor::Tensor;

pub fn execute(executable: &Executable) -> Result<Vec<Value>, String> {
    let input = tensor_arg(executable, 0)?;
    let result = match executable.op_type {
        OpType::Sum => input.data.iter().sum(),
        OpType::Min | OpType::Max => {
            if input.is_empty() {
                return Err(format!(
                    "op '{}': cannot reduce an empty tensor",
                    executable.op_name
                ));
            }
            let fold: fn(f32, f32) -> f32 = if executable.op_type == OpType::Min {
                f32::min
            } else {
                f32::max
            };
            input.data.iter().copied().reduce(fold).unwrap_or(0.0)
        }
        other => return Err(format!("not a reduction op: {}", other)),
    };
    Ok(vec![Value::Tensor(Tensor::scalar(result))])
}
