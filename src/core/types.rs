//! TL-001: All types from the telar graph schema and execution model.
//!
//! Defines the YAML schema types for graph definitions (variables, ops) and
//! the runtime identity types the scheduler keys on: frame/iteration chains,
//! variable instances, execution steps, values, and run events.

use crate::ops::tensor::Tensor;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the main/outer frame. All execution happens in a frame; loops
/// nest their own frames inside this one.
pub const OUTER_FRAME: &str = "main";

// ============================================================================
// Top-level telar.yaml
// ============================================================================

/// Root graph definition — the static computation graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Schema version (must be "1.0")
    pub version: String,

    /// Human-readable graph name
    pub name: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Declared leaf variables (placeholders, constants, stored variables).
    /// Op outputs are implicit and must not be declared here.
    #[serde(default)]
    pub variables: IndexMap<String, VarDecl>,

    /// Op declarations (order-preserving)
    #[serde(default)]
    pub ops: IndexMap<String, OpDecl>,
}

/// A declared leaf variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarDecl {
    /// Variable kind
    pub kind: VarKind,

    /// Initial value — required for constants and stored variables
    #[serde(default)]
    pub value: Option<ConstValue>,

    /// Ops that must execute before this variable is available
    #[serde(default)]
    pub control_deps: Vec<String>,
}

/// Variable kind enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarKind {
    /// Stored array (e.g., a model parameter) — carries a value
    Variable,
    Constant,
    Placeholder,
    /// Computed op output; assigned during graph compilation, not declarable
    Array,
}

impl fmt::Display for VarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Variable => write!(f, "variable"),
            Self::Constant => write!(f, "constant"),
            Self::Placeholder => write!(f, "placeholder"),
            Self::Array => write!(f, "array"),
        }
    }
}

/// Inline tensor literal — scalar, flat vector, or shaped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConstValue {
    Scalar(f32),
    Flat(Vec<f32>),
    Shaped { shape: Vec<usize>, data: Vec<f32> },
}

impl ConstValue {
    /// Materialize the literal as a tensor.
    pub fn to_tensor(&self) -> Result<Tensor, String> {
        match self {
            Self::Scalar(v) => Ok(Tensor::scalar(*v)),
            Self::Flat(data) => Ok(Tensor::vector(data.clone())),
            Self::Shaped { shape, data } => Tensor::new(shape.clone(), data.clone()),
        }
    }
}

/// A single op declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpDecl {
    /// Op type (kernel or control-flow primitive)
    #[serde(rename = "type")]
    pub op_type: OpType,

    /// Ordered input variable names
    #[serde(default)]
    pub inputs: Vec<String>,

    /// Ordered output variable names (implicitly declared by this op)
    #[serde(default)]
    pub outputs: Vec<String>,

    /// Variables that must be computed before this op runs (control only)
    #[serde(default)]
    pub control_deps: Vec<String>,

    /// Variable-level control dependencies — this op is registered for
    /// execution when any of these variables is produced
    #[serde(default)]
    pub var_control_deps: Vec<String>,

    // -- Enter fields --
    /// Target frame name (enter ops only)
    #[serde(default)]
    pub frame: Option<String>,

    /// Loop-invariant enter: output available at every iteration
    #[serde(default)]
    pub constant: bool,
}

/// Op type enum — kernels plus the control-flow primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpType {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Neg,
    // Comparison
    Less,
    LessEqual,
    Greater,
    Equal,
    // Reduction
    Sum,
    Min,
    Max,
    // Shape / util
    Identity,
    Size,
    Concat,
    // Control flow
    Switch,
    Merge,
    Enter,
    Exit,
    NextIteration,
    LoopCond,
    While,
}

impl OpType {
    /// True for the control-flow primitives that get frame-aware handling.
    pub fn is_control_flow(&self) -> bool {
        matches!(
            self,
            Self::Switch
                | Self::Merge
                | Self::Enter
                | Self::Exit
                | Self::NextIteration
                | Self::LoopCond
                | Self::While
        )
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Neg => "neg",
            Self::Less => "less",
            Self::LessEqual => "less_equal",
            Self::Greater => "greater",
            Self::Equal => "equal",
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
            Self::Identity => "identity",
            Self::Size => "size",
            Self::Concat => "concat",
            Self::Switch => "switch",
            Self::Merge => "merge",
            Self::Enter => "enter",
            Self::Exit => "exit",
            Self::NextIteration => "next_iteration",
            Self::LoopCond => "loop_cond",
            Self::While => "while",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// Frame / iteration identity
// ============================================================================

/// Identifies one loop-scope instance: a frame name, an iteration counter,
/// and the parent chain. Frames nest — the chain is part of the identity, so
/// two loops reusing a frame name under different parents never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrameIter {
    pub frame: String,
    pub iteration: u32,
    pub parent: Option<Box<FrameIter>>,
}

impl FrameIter {
    pub fn new(frame: &str, iteration: u32, parent: Option<FrameIter>) -> Self {
        Self {
            frame: frame.to_string(),
            iteration,
            parent: parent.map(Box::new),
        }
    }

    /// The root frame: ("main", 0, no parent).
    pub fn outer() -> Self {
        Self::new(OUTER_FRAME, 0, None)
    }

    /// Qualify a variable name with this frame/iteration.
    pub fn var_id(&self, name: &str) -> VarId {
        VarId {
            name: name.to_string(),
            frame_iter: self.clone(),
        }
    }
}

impl fmt::Display for FrameIter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(parent) = &self.parent {
            write!(f, "{}/", parent)?;
        }
        write!(f, "{}:{}", self.frame, self.iteration)
    }
}

/// A variable name qualified by frame/iteration — the value-storage key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VarId {
    pub name: String,
    pub frame_iter: FrameIter,
}

impl VarId {
    pub fn new(name: &str, frame_iter: FrameIter) -> Self {
        Self {
            name: name.to_string(),
            frame_iter,
        }
    }

    /// A VarId in the outer frame, iteration 0.
    pub fn outer(name: &str) -> Self {
        Self::new(name, FrameIter::outer())
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.frame_iter)
    }
}

// ============================================================================
// Execution steps
// ============================================================================

/// Discriminator for one schedulable unit of work.
///
/// SwitchLeft/SwitchRight exist because only one switch branch is ever
/// produced; depending on the switch op itself would wake consumers of both
/// branches. ExecStart is the seeding sentinel. ControlDep is a frame-less
/// step for control dependencies that cross loop scopes without an
/// enter/exit pair — satisfied the first time the op runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    Op,
    Variable,
    Constant,
    Placeholder,
    SwitchLeft,
    SwitchRight,
    ExecStart,
    ControlDep,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Op => write!(f, "OP"),
            Self::Variable => write!(f, "VARIABLE"),
            Self::Constant => write!(f, "CONSTANT"),
            Self::Placeholder => write!(f, "PLACEHOLDER"),
            Self::SwitchLeft => write!(f, "SWITCH_L"),
            Self::SwitchRight => write!(f, "SWITCH_R"),
            Self::ExecStart => write!(f, "EXEC_START"),
            Self::ControlDep => write!(f, "CONTROL_DEP"),
        }
    }
}

/// One execution step: a kind, a name, and the frame/iteration it runs at.
/// ExecStart and ControlDep steps carry no frame. Equality is structural
/// over all three fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExecStep {
    pub kind: StepKind,
    pub name: String,
    pub frame_iter: Option<FrameIter>,
}

impl ExecStep {
    pub fn new(kind: StepKind, name: &str, frame_iter: Option<FrameIter>) -> Self {
        Self {
            kind,
            name: name.to_string(),
            frame_iter,
        }
    }
}

impl fmt::Display for ExecStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.frame_iter {
            Some(fi) => write!(f, "{}(\"{}\",{})", self.kind, self.name, fi),
            None => write!(f, "{}(\"{}\")", self.kind, self.name),
        }
    }
}

// ============================================================================
// Values
// ============================================================================

/// A computed value. Absent is meaningful: the unselected switch branch, or
/// an unprovided optional placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Tensor(Tensor),
    List(Vec<Tensor>),
    Dict(IndexMap<String, Tensor>),
    Absent,
}

impl Value {
    pub fn scalar(v: f32) -> Self {
        Self::Tensor(Tensor::scalar(v))
    }

    pub fn tensor(&self) -> Option<&Tensor> {
        match self {
            Self::Tensor(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tensor(t) => write!(f, "{}", t),
            Self::List(l) => write!(f, "list({})", l.len()),
            Self::Dict(d) => write!(f, "dict({})", d.len()),
            Self::Absent => write!(f, "absent"),
        }
    }
}

// ============================================================================
// Run result
// ============================================================================

/// Result of one forward pass.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Computed values for the requested outputs (possibly partial)
    pub outputs: IndexMap<String, Value>,

    /// Requested outputs that could not be reached (e.g., behind an
    /// untaken conditional branch)
    pub missing: Vec<String>,

    /// Number of execution steps performed
    pub steps_executed: usize,
}

// ============================================================================
// Run events
// ============================================================================

/// Provenance event for the JSONL run log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        graph: String,
        run_id: String,
        fingerprint: String,
        requested: Vec<String>,
    },
    StepExecuted {
        step: String,
        kind: String,
        frame: String,
        iteration: u32,
    },
    OutputUnreachable {
        variable: String,
    },
    RunCompleted {
        run_id: String,
        steps_executed: u32,
        outputs_computed: u32,
        outputs_missing: u32,
        total_seconds: f64,
    },
}

/// Timestamped event wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub ts: String,
    #[serde(flatten)]
    pub event: RunEvent,
}

// ============================================================================
// Tests
// ============================================================================
