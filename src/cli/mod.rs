//! TL-017: CLI subcommands — validate, plan, run, inspect.

use crate::core::executor::{RunConfig, Session};
use crate::core::graph::Graph;
use crate::core::types::{GraphConfig, VarKind};
use crate::core::{parser, planner};
use crate::ops::tensor::Tensor;
use crate::ops::CpuExecutor;
use clap::Subcommand;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate telar.yaml without executing anything
    Validate {
        /// Path to telar.yaml
        #[arg(short, long, default_value = "telar.yaml")]
        file: PathBuf,
    },

    /// Show the subgraph selected for the requested outputs
    Plan {
        /// Path to telar.yaml
        #[arg(short, long, default_value = "telar.yaml")]
        file: PathBuf,

        /// Output variable (repeatable)
        #[arg(short, long = "output", required = true)]
        outputs: Vec<String>,
    },

    /// Execute a forward pass and print the requested outputs
    Run {
        /// Path to telar.yaml
        #[arg(short, long, default_value = "telar.yaml")]
        file: PathBuf,

        /// Output variable (repeatable)
        #[arg(short, long = "output", required = true)]
        outputs: Vec<String>,

        /// Placeholder value, name=scalar or name=[v1,v2,...] (repeatable)
        #[arg(short, long = "input")]
        inputs: Vec<String>,

        /// Activation to compute but not print (repeatable)
        #[arg(long = "required")]
        required: Vec<String>,

        /// Write a JSONL run event log under this directory
        #[arg(long)]
        trace_dir: Option<PathBuf>,
    },

    /// Show a graph summary: counts by kind and the BLAKE3 fingerprint
    Inspect {
        /// Path to telar.yaml
        #[arg(short, long, default_value = "telar.yaml")]
        file: PathBuf,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Plan { file, outputs } => cmd_plan(&file, &outputs),
        Commands::Run {
            file,
            outputs,
            inputs,
            required,
            trace_dir,
        } => cmd_run(&file, &outputs, &inputs, &required, trace_dir.as_deref()),
        Commands::Inspect { file } => cmd_inspect(&file),
    }
}

fn cmd_validate(file: &Path) -> Result<(), String> {
    let config = parser::parse_graph_file(file)?;
    let errors = parser::validate_graph(&config);

    if errors.is_empty() {
        println!(
            "OK: {} ({} variables, {} ops)",
            config.name,
            config.variables.len(),
            config.ops.len()
        );
        Ok(())
    } else {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        Err(format!("{} validation error(s)", errors.len()))
    }
}

fn cmd_plan(file: &Path, outputs: &[String]) -> Result<(), String> {
    let graph = load_graph(file)?;
    let plan = planner::plan(&graph, outputs)?;

    println!(
        "Plan for [{}]: {} variable(s), {} op(s)",
        outputs.join(", "),
        plan.variables.len(),
        plan.ops.len()
    );
    for op in &plan.ops {
        let marker = if plan.zero_input_ops.contains(op) {
            " (zero-input)"
        } else {
            ""
        };
        println!("  op {}{}", op, marker);
    }
    for var in &plan.variables {
        println!("  var {}", var);
    }
    Ok(())
}

fn cmd_run(
    file: &Path,
    outputs: &[String],
    inputs: &[String],
    required: &[String],
    trace_dir: Option<&Path>,
) -> Result<(), String> {
    let graph = load_graph(file)?;

    let mut placeholders: IndexMap<String, Tensor> = IndexMap::new();
    for input in inputs {
        let (name, tensor) = parse_input(input)?;
        if placeholders.insert(name.clone(), tensor).is_some() {
            return Err(format!("input '{}' given more than once", name));
        }
    }

    let mut session = Session::new(&graph, CpuExecutor::new(&graph));
    let value_placeholders = IndexMap::new();
    let result = session.run(&RunConfig {
        outputs,
        placeholders: &placeholders,
        value_placeholders: &value_placeholders,
        required,
        trace_dir,
    })?;

    for (name, value) in &result.outputs {
        println!("{} = {}", name, value);
    }
    for name in &result.missing {
        println!("{} = <no value>", name);
    }
    println!(
        "({} step(s), {} output(s), {} missing)",
        result.steps_executed,
        result.outputs.len(),
        result.missing.len()
    );
    Ok(())
}

fn cmd_inspect(file: &Path) -> Result<(), String> {
    let config = parser::parse_graph_file(file)?;
    let graph = compile_validated(&config)?;

    let count = |kind: VarKind| {
        graph
            .variables
            .values()
            .filter(|v| v.kind == kind)
            .count()
    };
    println!("Graph: {}", graph.name);
    if let Some(desc) = &config.description {
        println!("  {}", desc);
    }
    println!(
        "  variables: {} ({} placeholder, {} constant, {} stored, {} computed)",
        graph.variables.len(),
        count(VarKind::Placeholder),
        count(VarKind::Constant),
        count(VarKind::Variable),
        count(VarKind::Array),
    );
    let control = graph
        .ops
        .values()
        .filter(|op| op.op_type.is_control_flow())
        .count();
    println!(
        "  ops: {} ({} control-flow)",
        graph.ops.len(),
        control
    );
    println!("  fingerprint: {}", graph.fingerprint());
    Ok(())
}

/// Parse, validate, and compile a graph file.
fn load_graph(file: &Path) -> Result<Graph, String> {
    let config = parser::parse_graph_file(file)?;
    compile_validated(&config)
}

fn compile_validated(config: &GraphConfig) -> Result<Graph, String> {
    let errors = parser::validate_graph(config);
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        return Err("validation failed".to_string());
    }
    Graph::compile(config)
}

/// Parse a `name=value` input: a bare scalar or a `[v1,v2,...]` vector.
fn parse_input(input: &str) -> Result<(String, Tensor), String> {
    let (name, value) = input
        .split_once('=')
        .ok_or_else(|| format!("invalid input '{}': expected name=value", input))?;
    if name.is_empty() {
        return Err(format!("invalid input '{}': empty name", input));
    }

    let value = value.trim();
    let tensor = if let Some(list) = value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
        let mut data = Vec::new();
        for part in list.split(',').filter(|p| !p.trim().is_empty()) {
            let v: f32 = part
                .trim()
                .parse()
                .map_err(|_| format!("invalid number '{}' in input '{}'", part.trim(), name))?;
            data.push(v);
        }
        Tensor::vector(data)
    } else {
        let v: f32 = value
            .parse()
            .map_err(|_| format!("invalid number '{}' for input '{}'", value, name))?;
        Tensor::scalar(v)
    };
    Ok((name.to_string(), tensor))
}
