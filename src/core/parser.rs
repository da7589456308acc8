//! TL-002: YAML parsing and validation.
//!
//! Parses telar.yaml and validates structural constraints:
//! - Version must be "1.0"
//! - Input/output/control references must resolve
//! - No duplicate producers for a variable
//! - Arity and attributes per op type

use super::types::*;
use std::collections::HashSet;
use std::path::Path;

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

fn error(errors: &mut Vec<ValidationError>, message: String) {
    errors.push(ValidationError { message });
}

/// Parse a telar.yaml file from disk.
pub fn parse_graph_file(path: &Path) -> Result<GraphConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    parse_graph(&content)
}

/// Parse a telar.yaml from a string.
pub fn parse_graph(yaml: &str) -> Result<GraphConfig, String> {
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))
}

/// Validate a parsed graph config. Returns a list of errors (empty = valid).
pub fn validate_graph(config: &GraphConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    // Version check
    if config.version != "1.0" {
        error(
            &mut errors,
            format!("version must be \"1.0\", got \"{}\"", config.version),
        );
    }

    // Name check
    if config.name.is_empty() {
        error(&mut errors, "name must not be empty".to_string());
    }

    // Every referenceable variable name: declared leaves + op outputs
    let mut known: HashSet<&str> = config.variables.keys().map(String::as_str).collect();
    let mut producers: HashSet<&str> = HashSet::new();
    for (op_id, op) in &config.ops {
        for output in &op.outputs {
            if config.variables.contains_key(output) {
                error(
                    &mut errors,
                    format!(
                        "op '{}' output '{}' collides with a declared variable",
                        op_id, output
                    ),
                );
            }
            if !producers.insert(output.as_str()) {
                error(
                    &mut errors,
                    format!("output '{}' is produced by more than one op", output),
                );
            }
            known.insert(output.as_str());
        }
    }

    // Validate each declared variable
    for (id, var) in &config.variables {
        match var.kind {
            VarKind::Array => error(
                &mut errors,
                format!("variable '{}': kind 'array' is reserved for op outputs", id),
            ),
            VarKind::Constant | VarKind::Variable => {
                if var.value.is_none() {
                    error(&mut errors, format!("{} '{}' has no value", var.kind, id));
                } else if let Some(value) = &var.value {
                    if let Err(e) = value.to_tensor() {
                        error(&mut errors, format!("{} '{}': {}", var.kind, id, e));
                    }
                }
            }
            VarKind::Placeholder => {
                if var.value.is_some() {
                    error(
                        &mut errors,
                        format!("placeholder '{}' must not carry a value", id),
                    );
                }
            }
        }
        for dep in &var.control_deps {
            if !config.ops.contains_key(dep) {
                error(
                    &mut errors,
                    format!("variable '{}' has control dep on unknown op '{}'", id, dep),
                );
            }
        }
    }

    // Validate each op
    for (id, op) in &config.ops {
        for input in op
            .inputs
            .iter()
            .chain(op.control_deps.iter())
            .chain(op.var_control_deps.iter())
        {
            if !known.contains(input.as_str()) {
                error(
                    &mut errors,
                    format!("op '{}' references unknown variable '{}'", id, input),
                );
            }
        }

        if op.constant && op.op_type != OpType::Enter {
            error(
                &mut errors,
                format!("op '{}': 'constant' is only valid on enter ops", id),
            );
        }
        if op.frame.is_some() && op.op_type != OpType::Enter {
            error(
                &mut errors,
                format!("op '{}': 'frame' is only valid on enter ops", id),
            );
        }

        // Arity per op type
        let arity = |errors: &mut Vec<ValidationError>, inputs: usize, outputs: usize| {
            if op.inputs.len() != inputs {
                error(
                    errors,
                    format!(
                        "op '{}' ({}) needs {} input(s), has {}",
                        id,
                        op.op_type,
                        inputs,
                        op.inputs.len()
                    ),
                );
            }
            if op.outputs.len() != outputs {
                error(
                    errors,
                    format!(
                        "op '{}' ({}) needs {} output(s), has {}",
                        id,
                        op.op_type,
                        outputs,
                        op.outputs.len()
                    ),
                );
            }
        };
        match op.op_type {
            OpType::Switch => arity(&mut errors, 2, 2),
            OpType::Merge => arity(&mut errors, 2, 1),
            OpType::Enter | OpType::Exit | OpType::NextIteration | OpType::LoopCond => {
                arity(&mut errors, 1, 1);
                if op.op_type == OpType::Enter && op.frame.is_none() {
                    error(&mut errors, format!("enter op '{}' has no frame", id));
                }
            }
            OpType::Neg | OpType::Identity | OpType::Size | OpType::Sum | OpType::Min
            | OpType::Max => arity(&mut errors, 1, 1),
            OpType::Add
            | OpType::Sub
            | OpType::Mul
            | OpType::Div
            | OpType::Less
            | OpType::LessEqual
            | OpType::Greater
            | OpType::Equal => arity(&mut errors, 2, 1),
            // concat takes any number of inputs; while is validated by its kernel
            OpType::Concat | OpType::While => {
                if op.outputs.len() != 1 {
                    error(
                        &mut errors,
                        format!("op '{}' ({}) needs 1 output", id, op.op_type),
                    );
                }
            }
        }
    }

    errors
}
