//! TL-003: Compiled graph — read-only variable/op metadata with reverse
//! indexes.
//!
//! Compilation turns a parsed `GraphConfig` into the lookup structure the
//! planner and session work against: every op output becomes a computed
//! variable, and the cross-references (consuming ops per variable, control
//! dependency reverse edges) are materialized once up front.

use super::types::{GraphConfig, OpType, VarKind};
use crate::ops::tensor::Tensor;
use crate::trace::hasher;
use indexmap::IndexMap;

/// A variable in the compiled graph. Immutable during execution.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub kind: VarKind,

    /// Initial value (constants and stored variables)
    pub value: Option<Tensor>,

    /// The op producing this variable, if computed
    pub output_of_op: Option<String>,

    /// Ops consuming this variable as a data input
    pub inputs_for_op: Vec<String>,

    /// Ops that must execute before this variable is available
    pub control_deps: Vec<String>,

    /// Ops that list this variable as a variable-level control dependency
    pub control_dep_for_ops: Vec<String>,
}

/// An op in the compiled graph. Immutable during execution.
#[derive(Debug, Clone)]
pub struct Op {
    pub name: String,
    pub op_type: OpType,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,

    /// Variables that must be computed before this op runs
    pub control_deps: Vec<String>,

    /// Variables whose production triggers registration of this op
    pub var_control_deps: Vec<String>,

    /// Variables whose availability gates on this op having executed
    pub control_dep_for: Vec<String>,

    /// Target frame name (enter ops)
    pub frame: Option<String>,

    /// Loop-invariant enter
    pub is_constant_enter: bool,
}

/// The compiled, read-only graph definition store.
#[derive(Debug, Clone)]
pub struct Graph {
    pub name: String,
    pub variables: IndexMap<String, Variable>,
    pub ops: IndexMap<String, Op>,
}

impl Graph {
    /// Compile a parsed config into the lookup structure. The config should
    /// already have passed validation; structural problems still error here.
    pub fn compile(config: &GraphConfig) -> Result<Self, String> {
        let mut variables: IndexMap<String, Variable> = IndexMap::new();
        let mut ops: IndexMap<String, Op> = IndexMap::new();

        for (name, decl) in &config.variables {
            if decl.kind == VarKind::Array {
                return Err(format!(
                    "variable '{}': kind 'array' is reserved for op outputs",
                    name
                ));
            }
            let value = match (&decl.value, decl.kind) {
                (Some(v), VarKind::Constant | VarKind::Variable) => Some(v.to_tensor()?),
                (None, VarKind::Constant | VarKind::Variable) => {
                    return Err(format!("{} '{}' has no value", decl.kind, name));
                }
                (Some(_), _) => {
                    return Err(format!("{} '{}' must not carry a value", decl.kind, name));
                }
                (None, _) => None,
            };
            variables.insert(
                name.clone(),
                Variable {
                    name: name.clone(),
                    kind: decl.kind,
                    value,
                    output_of_op: None,
                    inputs_for_op: Vec::new(),
                    control_deps: decl.control_deps.clone(),
                    control_dep_for_ops: Vec::new(),
                },
            );
        }

        // Register ops and their implicit output variables
        for (name, decl) in &config.ops {
            if decl.op_type == OpType::Enter && decl.frame.is_none() {
                return Err(format!("enter op '{}' has no frame attribute", name));
            }
            for output in &decl.outputs {
                if let Some(existing) = variables.get(output) {
                    let producer = existing
                        .output_of_op
                        .as_deref()
                        .unwrap_or("a variable declaration");
                    return Err(format!(
                        "output '{}' of op '{}' is already produced by {}",
                        output, name, producer
                    ));
                }
                variables.insert(
                    output.clone(),
                    Variable {
                        name: output.clone(),
                        kind: VarKind::Array,
                        value: None,
                        output_of_op: Some(name.clone()),
                        inputs_for_op: Vec::new(),
                        control_deps: Vec::new(),
                        control_dep_for_ops: Vec::new(),
                    },
                );
            }
            ops.insert(
                name.clone(),
                Op {
                    name: name.clone(),
                    op_type: decl.op_type,
                    inputs: decl.inputs.clone(),
                    outputs: decl.outputs.clone(),
                    control_deps: decl.control_deps.clone(),
                    var_control_deps: decl.var_control_deps.clone(),
                    control_dep_for: Vec::new(),
                    frame: decl.frame.clone(),
                    is_constant_enter: decl.op_type == OpType::Enter && decl.constant,
                },
            );
        }

        // Reverse indexes, now that every variable exists
        for (op_name, decl) in &config.ops {
            for input in decl.inputs.iter().chain(decl.control_deps.iter()) {
                let var = variables.get_mut(input).ok_or_else(|| {
                    format!("op '{}' references unknown variable '{}'", op_name, input)
                })?;
                // an op consuming the same variable twice is listed once
                if decl.inputs.contains(input) && !var.inputs_for_op.contains(op_name) {
                    var.inputs_for_op.push(op_name.clone());
                }
            }
            for var_name in &decl.var_control_deps {
                let var = variables.get_mut(var_name).ok_or_else(|| {
                    format!(
                        "op '{}' has var control dep on unknown variable '{}'",
                        op_name, var_name
                    )
                })?;
                var.control_dep_for_ops.push(op_name.clone());
            }
        }
        for (var_name, decl) in &config.variables {
            for op_name in &decl.control_deps {
                let op = ops.get_mut(op_name).ok_or_else(|| {
                    format!(
                        "variable '{}' has control dep on unknown op '{}'",
                        var_name, op_name
                    )
                })?;
                op.control_dep_for.push(var_name.clone());
            }
        }

        Ok(Self {
            name: config.name.clone(),
            variables,
            ops,
        })
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    pub fn op(&self, name: &str) -> Option<&Op> {
        self.ops.get(name)
    }

    /// The op producing a variable, if any.
    pub fn producing_op(&self, var_name: &str) -> Option<&Op> {
        self.variables
            .get(var_name)
            .and_then(|v| v.output_of_op.as_deref())
            .and_then(|op| self.ops.get(op))
    }

    /// Declared placeholder names, in declaration order.
    pub fn placeholders(&self) -> Vec<&str> {
        self.variables
            .values()
            .filter(|v| v.kind == VarKind::Placeholder)
            .map(|v| v.name.as_str())
            .collect()
    }

    /// BLAKE3 fingerprint of the graph structure.
    pub fn fingerprint(&self) -> String {
        let mut components = vec![hasher::hash_string(&self.name)];
        for (name, var) in &self.variables {
            components.push(hasher::hash_string(&format!("var:{}:{}", name, var.kind)));
        }
        for (name, op) in &self.ops {
            components.push(hasher::hash_string(&format!(
                "op:{}:{}:{}>{}",
                name,
                op.op_type,
                op.inputs.join(","),
                op.outputs.join(",")
            )));
        }
        let refs: Vec<&str> = components.iter().map(|s| s.as_str()).collect();
        hasher::composite_hash(&refs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser;

    fn compile(yaml: &str) -> Result<Graph, String> {
        let config = parser::parse_graph(yaml)?;
        Graph::compile(&config)
    }

    const SUM_GRAPH: &str = r#"
version: "1.0"
name: sum-graph
variables:
  x: {kind: placeholder}
  two: {kind: constant, value: 2.0}
ops:
  add:
    type: add
    inputs: [x, two]
    outputs: [y]
"#;

    #[test]
    fn test_tl003_compile_basic() {
        let graph = compile(SUM_GRAPH).unwrap();
        assert_eq!(graph.variables.len(), 3);
        assert_eq!(graph.variables["y"].kind, VarKind::Array);
        assert_eq!(graph.variables["y"].output_of_op.as_deref(), Some("add"));
        assert_eq!(graph.variables["x"].inputs_for_op, vec!["add"]);
        assert_eq!(graph.variables["two"].inputs_for_op, vec!["add"]);
        assert_eq!(graph.producing_op("y").unwrap().name, "add");
        assert!(graph.producing_op("x").is_none());
    }

    #[test]
    fn test_tl003_placeholders() {
        let graph = compile(SUM_GRAPH).unwrap();
        assert_eq!(graph.placeholders(), vec!["x"]);
    }

    #[test]
    fn test_tl003_duplicate_output() {
        let yaml = r#"
version: "1.0"
name: dup
variables:
  x: {kind: placeholder}
ops:
  a:
    type: neg
    inputs: [x]
    outputs: [y]
  b:
    type: neg
    inputs: [x]
    outputs: [y]
"#;
        let err = compile(yaml).unwrap_err();
        assert!(err.contains("already produced"));
    }

    #[test]
    fn test_tl003_unknown_input() {
        let yaml = r#"
version: "1.0"
name: bad
ops:
  a:
    type: neg
    inputs: [ghost]
    outputs: [y]
"#;
        let err = compile(yaml).unwrap_err();
        assert!(err.contains("unknown variable 'ghost'"));
    }

    #[test]
    fn test_tl003_constant_without_value() {
        let yaml = r#"
version: "1.0"
name: bad
variables:
  c: {kind: constant}
"#;
        let err = compile(yaml).unwrap_err();
        assert!(err.contains("has no value"));
    }

    #[test]
    fn test_tl003_placeholder_with_value() {
        let yaml = r#"
version: "1.0"
name: bad
variables:
  p: {kind: placeholder, value: 1.0}
"#;
        let err = compile(yaml).unwrap_err();
        assert!(err.contains("must not carry a value"));
    }

    #[test]
    fn test_tl003_enter_without_frame() {
        let yaml = r#"
version: "1.0"
name: bad
variables:
  x: {kind: constant, value: 1.0}
ops:
  e:
    type: enter
    inputs: [x]
    outputs: [x_in]
"#;
        let err = compile(yaml).unwrap_err();
        assert!(err.contains("no frame attribute"));
    }

    #[test]
    fn test_tl003_constant_enter_flag() {
        let yaml = r#"
version: "1.0"
name: g
variables:
  x: {kind: constant, value: 1.0}
ops:
  e:
    type: enter
    inputs: [x]
    outputs: [x_in]
    frame: loop
    constant: true
"#;
        let graph = compile(yaml).unwrap();
        assert!(graph.op("e").unwrap().is_constant_enter);
    }

    #[test]
    fn test_tl003_control_dep_cross_refs() {
        let yaml = r#"
version: "1.0"
name: g
variables:
  x: {kind: placeholder}
  c: {kind: constant, value: 1.0, control_deps: [gate]}
ops:
  gate:
    type: identity
    inputs: [x]
    outputs: [gated]
  use:
    type: add
    inputs: [gated, c]
    outputs: [y]
    var_control_deps: [c]
"#;
        let graph = compile(yaml).unwrap();
        assert_eq!(graph.ops["gate"].control_dep_for, vec!["c"]);
        assert_eq!(graph.variables["c"].control_dep_for_ops, vec!["use"]);
        assert_eq!(graph.variables["c"].control_deps, vec!["gate"]);
    }

    #[test]
    fn test_tl003_fingerprint_deterministic() {
        let g1 = compile(SUM_GRAPH).unwrap();
        let g2 = compile(SUM_GRAPH).unwrap();
        assert_eq!(g1.fingerprint(), g2.fingerprint());
        assert!(g1.fingerprint().starts_with("blake3:"));

        let other = compile(
            r#"
version: "1.0"
name: sum-graph
variables:
  x: {kind: placeholder}
  two: {kind: constant, value: 2.0}
ops:
  add:
    type: mul
    inputs: [x, two]
    outputs: [y]
"#,
        )
        .unwrap();
        assert_ne!(g1.fingerprint(), other.fingerprint());
    }
}
