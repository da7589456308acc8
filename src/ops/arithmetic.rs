//! TL-010: Arithmetic kernels (add, sub, mul, div, neg).

use super::{tensor_arg, Executable};
use crate::core::types::{OpType, Value};

/// Execute an arithmetic op. Binary ops broadcast a one-element tensor on
/// either side; division by zero follows IEEE 754 (inf/nan), as tensors do.
pub fn execute(executable: &Executable) -> Result<Vec<Value>, String> {
    let result = match executable.op_type {
        OpType::Add => binary(executable, |a, b| a + b)?,
        OpType::Sub => binary(executable, |a, b| a - b)?,
        OpType::Mul => binary(executable, |a, b| a * b)?,
        OpType::Div => binary(executable, |a, b| a / b)?,
        OpType::Neg => tensor_arg(executable, 0)?.map(|v| -v),
        other => return Err(format!("not an arithmetic op: {}", other)),
    };
    Ok(vec![Value::Tensor(result)])
}

fn binary<F: Fn(f32, f32) -> f32>(
    executable: &Executable,
    f: F,
) -> Result<crate::ops::tensor::Tensor, String> {
    let lhs = tensor_arg(executable, 0)?;
    let rhs = tensor_arg(executable, 1)?;
    lhs.zip_map(rhs, f)
        .map_err(|e| format!("op '{}': {}", executable.op_name, e))
}
