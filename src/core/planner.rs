//! TL-005: Subgraph planning — backward reachability from requested outputs.
//!
//! Works out which variables and ops might need to execute to produce the
//! requested outputs. The result is a superset of what actually runs: switch
//! ops can still prune whole branches at execution time.

use super::graph::Graph;
use indexmap::IndexSet;
use std::collections::VecDeque;

/// The minimal static closure needed for a set of requested outputs.
#[derive(Debug, Clone, Default)]
pub struct SubgraphPlan {
    /// Variables that might be needed (insertion-ordered)
    pub variables: IndexSet<String>,

    /// Ops that might be needed
    pub ops: IndexSet<String>,

    /// Ops with no data inputs — readiness is input-driven, so these must be
    /// seeded explicitly
    pub zero_input_ops: IndexSet<String>,
}

/// Plan the subgraph for the given required variable names (requested
/// outputs plus required activations). Unknown names are fatal.
pub fn plan(graph: &Graph, required: &[String]) -> Result<SubgraphPlan, String> {
    let mut plan = SubgraphPlan::default();
    let mut queue: VecDeque<String> = required.iter().cloned().collect();

    while let Some(name) = queue.pop_front() {
        // Renamed/aliased references resolve through the producing op's
        // first declared output
        let var = match graph.variable(&name) {
            Some(v) => v,
            None => {
                let op = graph.op(&name).ok_or_else(|| {
                    format!("variable '{}' does not exist in graph '{}'", name, graph.name)
                })?;
                let first = op
                    .outputs
                    .first()
                    .ok_or_else(|| format!("op '{}' has no outputs", name))?;
                graph
                    .variable(first)
                    .ok_or_else(|| format!("variable '{}' does not exist", first))?
            }
        };

        if !plan.variables.contains(&var.name) {
            let producing = graph.producing_op(&var.name);
            let num_inputs = producing.map(|op| op.inputs.len()).unwrap_or(0)
                + var.control_deps.len();
            if num_inputs == 0 {
                if let Some(op) = producing {
                    plan.zero_input_ops.insert(op.name.clone());
                }
            }

            plan.variables.insert(var.name.clone());
            if let Some(op) = producing {
                plan.ops.insert(op.name.clone());
            }

            // A variable gated by control deps is not available until those
            // ops run; chase them too (op names resolve via the alias
            // fallback above)
            for dep in &var.control_deps {
                if !plan.variables.contains(dep) {
                    queue.push_back(dep.clone());
                }
            }
        }

        if let Some(op) = graph.producing_op(&var.name) {
            for input in op.inputs.iter().chain(op.control_deps.iter()) {
                if !plan.variables.contains(input) {
                    queue.push_back(input.clone());
                }
            }
        }
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser;

    fn graph(yaml: &str) -> Graph {
        Graph::compile(&parser::parse_graph(yaml).unwrap()).unwrap()
    }

    fn names(set: &IndexSet<String>) -> Vec<&str> {
        set.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_tl005_chain_closure() {
        let g = graph(
            r#"
version: "1.0"
name: g
variables:
  x: {kind: placeholder}
  two: {kind: constant, value: 2.0}
ops:
  a:
    type: add
    inputs: [x, two]
    outputs: [mid]
  b:
    type: mul
    inputs: [mid, two]
    outputs: [y]
"#,
        );
        let plan = plan(&g, &["y".to_string()]).unwrap();
        assert_eq!(names(&plan.variables), vec!["y", "mid", "two", "x"]);
        assert_eq!(names(&plan.ops), vec!["b", "a"]);
        assert!(plan.zero_input_ops.is_empty());
    }

    #[test]
    fn test_tl005_irrelevant_branch_excluded() {
        let g = graph(
            r#"
version: "1.0"
name: g
variables:
  x: {kind: placeholder}
  unrelated: {kind: placeholder}
ops:
  wanted:
    type: neg
    inputs: [x]
    outputs: [y]
  ignored:
    type: neg
    inputs: [unrelated]
    outputs: [z]
"#,
        );
        let plan = plan(&g, &["y".to_string()]).unwrap();
        assert!(plan.variables.contains("x"));
        assert!(!plan.variables.contains("unrelated"));
        assert!(!plan.ops.contains("ignored"));
    }

    #[test]
    fn test_tl005_unknown_name_fatal() {
        let g = graph(
            r#"
version: "1.0"
name: g
variables:
  x: {kind: placeholder}
"#,
        );
        let err = plan(&g, &["ghost".to_string()]).unwrap_err();
        assert!(err.contains("'ghost' does not exist"));
    }

    #[test]
    fn test_tl005_alias_resolves_through_op() {
        // Requesting by op name falls back to the op's first output
        let g = graph(
            r#"
version: "1.0"
name: g
variables:
  x: {kind: placeholder}
ops:
  producer:
    type: neg
    inputs: [x]
    outputs: [y]
"#,
        );
        let plan = plan(&g, &["producer".to_string()]).unwrap();
        assert!(plan.variables.contains("y"));
        assert!(plan.ops.contains("producer"));
    }

    #[test]
    fn test_tl005_leaf_only_request() {
        let g = graph(
            r#"
version: "1.0"
name: g
variables:
  c: {kind: constant, value: 7.0}
"#,
        );
        let plan = plan(&g, &["c".to_string()]).unwrap();
        assert_eq!(names(&plan.variables), vec!["c"]);
        assert!(plan.ops.is_empty());
    }

    #[test]
    fn test_tl005_control_deps_chased() {
        let g = graph(
            r#"
version: "1.0"
name: g
variables:
  x: {kind: placeholder}
  c: {kind: constant, value: 1.0, control_deps: [gate]}
ops:
  gate:
    type: neg
    inputs: [x]
    outputs: [gated]
  use:
    type: add
    inputs: [c, gated]
    outputs: [y]
"#,
        );
        let plan = plan(&g, &["y".to_string()]).unwrap();
        // c's control dep pulls in the gate op via the alias fallback
        assert!(plan.ops.contains("gate"));
        assert!(plan.variables.contains("x"));
    }

    #[test]
    fn test_tl005_zero_input_op_tracked() {
        let g = graph(
            r#"
version: "1.0"
name: g
ops:
  source:
    type: concat
    outputs: [y]
"#,
        );
        let plan = plan(&g, &["y".to_string()]).unwrap();
        assert_eq!(names(&plan.zero_input_ops), vec!["source"]);
    }

    #[test]
    fn test_tl005_diamond_visited_once() {
        let g = graph(
            r#"
version: "1.0"
name: g
variables:
  x: {kind: placeholder}
ops:
  top:
    type: neg
    inputs: [x]
    outputs: [t]
  left:
    type: neg
    inputs: [t]
    outputs: [l]
  right:
    type: neg
    inputs: [t]
    outputs: [r]
  bottom:
    type: add
    inputs: [l, r]
    outputs: [y]
"#,
        );
        let plan = plan(&g, &["y".to_string()]).unwrap();
        assert_eq!(plan.ops.len(), 4);
        assert_eq!(plan.variables.len(), 5);
    }
}
