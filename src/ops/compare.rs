//! TL-011: Comparison kernels (less, less_equal, greater, equal).
//!
//! Results are 1.0/0.0 tensors — predicates downstream (switch, loop_cond)
//! read any nonzero single element as true.

use super::{tensor_arg, Executable};
use crate::core::types::{OpType, Value};
use crate::ops::tensor::Tensor;

pub fn execute(executable: &Executable) -> Result<Vec<Value>, String> {
    let result = match executable.op_type {
        OpType::Less => binary(executable, |a, b| a < b)?,
        OpType::LessEqual => binary(executable, |a, b| a <= b)?,
        OpType::Greater => binary(executable, |a, b| a > b)?,
        OpType::Equal => binary(executable, |a, b| a == b)?,
        other => return Err(format!("not a comparison op: {}", other)),
    };
    Ok(vec![Value::Tensor(result)])
}

fn binary<F: Fn(f32, f32) -> bool>(executable: &Executable, f: F) -> Result<Tensor, String> {
    let lhs = tensor_arg(executable, 0)?;
    let rhs = tensor_arg(executable, 1)?;
    lhs.zip_map(rhs, |a, b| if f(a, b) { 1.0 } else { 0.0 })
        .map_err(|e| format!("op '{}': {}", executable.op_name, e))
}
