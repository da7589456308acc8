//! TL-013: Shape/util kernels (identity, size, concat).

use super::{tensor_arg, Executable};
use crate::core::types::{OpType, Value};
use crate::ops::tensor::Tensor;

pub fn execute(executable: &Executable) -> Result<Vec<Value>, String> {
    match executable.op_type {
        // Identity forwards any value kind unchanged, lists included
        OpType::Identity => {
            let input = executable.inputs.first().ok_or_else(|| {
                format!("op '{}' (identity) missing input", executable.op_name)
            })?;
            Ok(vec![input.clone()])
        }
        OpType::Size => {
            let input = tensor_arg(executable, 0)?;
            Ok(vec![Value::Tensor(Tensor::scalar(input.len() as f32))])
        }
        // Concatenate flattened inputs into one vector
        OpType::Concat => {
            let mut data = Vec::new();
            for index in 0..executable.inputs.len() {
                data.extend_from_slice(&tensor_arg(executable, index)?.data);
            }
            Ok(vec![Value::Tensor(Tensor::vector(data))])
        }
        other => Err(format!("not a shape op: {}", other)),
    }
}
