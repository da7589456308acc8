//! TL-007: Session — the forward-pass execution loop.
//!
//! Runs the selected subgraph step by step: seed → pop a ready step →
//! dispatch by kind → store outputs → propagate to dependents. Control-flow
//! ops get frame-aware handling: enter/exit move values between frames,
//! next_iteration realizes the loop back-edge, merge fires on either input,
//! and switch prunes the untaken branch so its consumers are never
//! scheduled. All scheduling state lives in a per-run context, so a session
//! can serve sequential requests without any explicit reset.

use super::graph::{Graph, Op, Variable};
use super::planner::{self, SubgraphPlan};
use super::state::ValueStore;
use super::tracker::DependencyTracker;
use super::types::{
    ExecStep, FrameIter, OpType, RunEvent, RunResult, StepKind, Value, VarId, VarKind,
};
use crate::ops::tensor::Tensor;
use crate::ops::OpExecutor;
use crate::trace::eventlog;
use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHashSet;
use std::path::Path;
use std::time::Instant;

/// Configuration for one forward pass.
pub struct RunConfig<'a> {
    /// Variables to compute and return
    pub outputs: &'a [String],

    /// Placeholder values, typed-tensor channel
    pub placeholders: &'a IndexMap<String, Tensor>,

    /// Placeholder values, generic-value channel (lists etc.)
    pub value_placeholders: &'a IndexMap<String, Value>,

    /// Activations to compute but not return
    pub required: &'a [String],

    /// Where to write the JSONL run event log; None disables tracing
    pub trace_dir: Option<&'a Path>,
}

/// Per-request scheduling state. Built fresh at `run()` entry so requests
/// never observe each other's state.
struct RunContext {
    plan: SubgraphPlan,
    tracker: DependencyTracker,
    values: ValueStore,
    placeholder_values: IndexMap<String, Value>,
    requested: IndexSet<String>,
    required: IndexSet<String>,
    executed_required: FxHashSet<String>,
    outputs: IndexMap<String, Value>,
    steps_executed: usize,
}

/// Record a stored value against the requested/required bookkeeping.
fn record(ctx: &mut RunContext, name: &str, value: &Value) {
    if ctx.requested.contains(name) {
        ctx.outputs.insert(name.to_string(), value.clone());
    }
    if ctx.required.contains(name) {
        ctx.executed_required.insert(name.to_string());
    }
}

/// A forward-pass session over one graph and one op executor.
pub struct Session<'g, E: OpExecutor> {
    graph: &'g Graph,
    executor: E,
    values: ValueStore,
}

impl<'g, E: OpExecutor> Session<'g, E> {
    pub fn new(graph: &'g Graph, executor: E) -> Self {
        Self {
            graph,
            executor,
            values: ValueStore::new(),
        }
    }

    /// Perform a forward pass. Fatal (Err) for unknown requested names,
    /// missing required placeholders, or invariant violations; outputs
    /// behind untaken branches come back as `missing` with a warning.
    pub fn run(&mut self, cfg: &RunConfig) -> Result<RunResult, String> {
        let start_time = Instant::now();
        if cfg.outputs.is_empty() && cfg.required.is_empty() {
            return Err("nothing to execute: no outputs or required activations given".to_string());
        }

        // Merge the placeholder channels, typed tensors first; the same
        // name arriving via both is ambiguous
        let mut placeholder_values: IndexMap<String, Value> = IndexMap::new();
        for (name, tensor) in cfg.placeholders {
            placeholder_values.insert(name.clone(), Value::Tensor(tensor.clone()));
        }
        for (name, value) in cfg.value_placeholders {
            if placeholder_values.contains_key(name) {
                return Err(format!("placeholder '{}' supplied via both channels", name));
            }
            placeholder_values.insert(name.clone(), value.clone());
        }

        // Requested names must exist before anything executes
        for name in cfg.outputs {
            if self.graph.variable(name).is_none() && self.graph.op(name).is_none() {
                return Err(format!(
                    "requested output '{}' does not exist in graph '{}'",
                    name, self.graph.name
                ));
            }
        }

        let requested: IndexSet<String> = cfg.outputs.iter().cloned().collect();
        let mut required = requested.clone();
        required.extend(cfg.required.iter().cloned());
        let all_required: Vec<String> = required.iter().cloned().collect();
        let plan = planner::plan(self.graph, &all_required)?;

        // Pre-flight: a placeholder is required when requested or feeding a
        // subgraph op
        for ph in self.graph.placeholders() {
            let needed = requested.contains(ph)
                || self
                    .graph
                    .variable(ph)
                    .is_some_and(|v| v.inputs_for_op.iter().any(|op| plan.ops.contains(op)));
            if needed && !placeholder_values.contains_key(ph) {
                return Err(format!(
                    "placeholder '{}' is required to calculate the requested outputs \
                     but no value was provided",
                    ph
                ));
            }
        }

        let run_id = eventlog::generate_run_id();
        self.trace(
            cfg.trace_dir,
            RunEvent::RunStarted {
                graph: self.graph.name.clone(),
                run_id: run_id.clone(),
                fingerprint: self.graph.fingerprint(),
                requested: cfg.outputs.to_vec(),
            },
        );

        let mut ctx = RunContext {
            plan,
            tracker: DependencyTracker::new(),
            values: ValueStore::new(),
            placeholder_values,
            requested,
            required,
            executed_required: FxHashSet::default(),
            outputs: IndexMap::new(),
            steps_executed: 0,
        };
        self.seed(&mut ctx);

        // Main loop: prefer ready steps in the current frame/iteration,
        // switch frames only when none match. A drained queue with
        // requirements outstanding ends the run cleanly.
        let mut current = FrameIter::outer();
        let mut missing = Vec::new();
        while ctx.executed_required.len() < ctx.required.len() {
            if !ctx.tracker.has_ready() {
                missing = self.exec_failed(&ctx, cfg.trace_dir);
                break;
            }
            let step = match ctx
                .tracker
                .take_ready_matching(|s| s.frame_iter.as_ref() == Some(&current))
            {
                Some(step) => step,
                None => match ctx.tracker.take_ready() {
                    Some(step) => step,
                    None => break,
                },
            };
            if let Some(fi) = &step.frame_iter {
                current = fi.clone();
            }

            match step.kind {
                StepKind::Constant | StepKind::Variable => self.exec_value_step(&mut ctx, &step)?,
                StepKind::Placeholder => self.exec_placeholder(&mut ctx, &step)?,
                StepKind::Op => self.exec_op(&mut ctx, &step)?,
                _ => return Err(format!("unexpected step in ready queue: {}", step)),
            }
            ctx.steps_executed += 1;

            if cfg.trace_dir.is_some() {
                if let Some(fi) = &step.frame_iter {
                    self.trace(
                        cfg.trace_dir,
                        RunEvent::StepExecuted {
                            step: step.name.clone(),
                            kind: step.kind.to_string(),
                            frame: fi.frame.clone(),
                            iteration: fi.iteration,
                        },
                    );
                }
            }
        }

        self.trace(
            cfg.trace_dir,
            RunEvent::RunCompleted {
                run_id,
                steps_executed: ctx.steps_executed as u32,
                outputs_computed: ctx.outputs.len() as u32,
                outputs_missing: missing.len() as u32,
                total_seconds: start_time.elapsed().as_secs_f64(),
            },
        );

        self.values = ctx.values;
        Ok(RunResult {
            outputs: ctx.outputs,
            missing,
            steps_executed: ctx.steps_executed,
        })
    }

    /// True if an instance of the variable was stored during the last run.
    pub fn contains(
        &self,
        name: &str,
        frame: &str,
        iteration: u32,
        parent: Option<FrameIter>,
    ) -> bool {
        self.values
            .contains(&VarId::new(name, FrameIter::new(frame, iteration, parent)))
    }

    /// Fetch a stored instance of a variable from the last run.
    pub fn get(
        &self,
        name: &str,
        frame: &str,
        iteration: u32,
        parent: Option<FrameIter>,
    ) -> Option<&Value> {
        self.values
            .get(&VarId::new(name, FrameIter::new(frame, iteration, parent)))
    }

    /// Seed the tracker: every declared leaf variable and every zero-input
    /// op depends only on the start sentinel (plus any variable control
    /// deps), so they become ready the moment the sentinel is satisfied.
    fn seed(&self, ctx: &mut RunContext) {
        let RunContext { tracker, plan, .. } = ctx;
        let start = ExecStep::new(StepKind::ExecStart, "", None);
        for var in self.graph.variables.values() {
            let kind = match var.kind {
                VarKind::Variable => StepKind::Variable,
                VarKind::Constant => StepKind::Constant,
                VarKind::Placeholder => StepKind::Placeholder,
                VarKind::Array => continue,
            };
            let step = ExecStep::new(kind, &var.name, Some(FrameIter::outer()));
            tracker.add_dependency(&step, &start);
            Self::add_var_control_deps(tracker, &step, var);
        }
        for op_name in &plan.zero_input_ops {
            let step = ExecStep::new(StepKind::Op, op_name, Some(FrameIter::outer()));
            tracker.add_dependency(&step, &start);
        }
        tracker.mark_satisfied(&start);
    }

    /// A variable gated by control deps waits on frame-less CONTROL_DEP
    /// steps, satisfied when the gating ops first run.
    fn add_var_control_deps(tracker: &mut DependencyTracker, step: &ExecStep, var: &Variable) {
        for gate in &var.control_deps {
            let control = ExecStep::new(StepKind::ControlDep, gate, None);
            tracker.add_dependency(step, &control);
        }
    }

    fn exec_value_step(&self, ctx: &mut RunContext, step: &ExecStep) -> Result<(), String> {
        let value = self.executor.constant_or_variable(&step.name)?;
        ctx.values.put(VarId::outer(&step.name), value.clone())?;
        record(ctx, &step.name, &value);
        self.update_descendant_deps(ctx, step, &FrameIter::outer())?;
        ctx.tracker.mark_satisfied(step);
        Ok(())
    }

    fn exec_placeholder(&self, ctx: &mut RunContext, step: &ExecStep) -> Result<(), String> {
        // Unprovided (and unrequired, per pre-flight) placeholders are
        // recorded as absent
        let value = ctx
            .placeholder_values
            .get(&step.name)
            .cloned()
            .unwrap_or(Value::Absent);
        ctx.values.put(VarId::outer(&step.name), value.clone())?;
        if !value.is_absent() {
            record(ctx, &step.name, &value);
        }
        self.update_descendant_deps(ctx, step, &FrameIter::outer())?;
        ctx.tracker.mark_satisfied(step);
        Ok(())
    }

    fn exec_op(&self, ctx: &mut RunContext, step: &ExecStep) -> Result<(), String> {
        let op = self
            .graph
            .op(&step.name)
            .ok_or_else(|| format!("unknown op '{}'", step.name))?;
        let step_frame = step
            .frame_iter
            .clone()
            .ok_or_else(|| format!("op step {} has no frame", step))?;

        // Output frame per the control-flow resolution rules. A
        // next_iteration step is already registered at the incremented
        // iteration, so its own frame is the output frame.
        let out_frame = match op.op_type {
            OpType::Enter => {
                let frame = op
                    .frame
                    .as_deref()
                    .ok_or_else(|| format!("enter op '{}' has no frame attribute", op.name))?;
                FrameIter::new(frame, 0, Some(step_frame.clone()))
            }
            OpType::Exit => step_frame
                .parent
                .as_deref()
                .cloned()
                .ok_or_else(|| format!("exit op '{}' executed at the outer frame", op.name))?,
            _ => step_frame.clone(),
        };

        let inputs = self.resolve_inputs(ctx, op, step)?;
        let executable = self.executor.parameterize(op, inputs)?;
        let outputs = self.executor.compute(executable)?;
        if outputs.len() != op.outputs.len() {
            return Err(format!(
                "op '{}' produced {} output(s), {} declared",
                op.name,
                outputs.len(),
                op.outputs.len()
            ));
        }

        for (name, value) in op.outputs.iter().zip(outputs.iter()) {
            if value.is_absent() {
                // only switch legitimately leaves an output unproduced
                if op.op_type != OpType::Switch {
                    return Err(format!(
                        "op '{}' produced an absent output '{}'",
                        op.name, name
                    ));
                }
                continue;
            }
            ctx.values
                .put(VarId::new(name, out_frame.clone()), value.clone())?;
            record(ctx, name, value);
        }

        // Switch, enter and exit defer propagation: their dependents hang
        // off a synthesized step instead of the op step itself
        let mut defer = false;
        match op.op_type {
            OpType::Switch => {
                let live: Vec<bool> = outputs.iter().map(|v| !v.is_absent()).collect();
                let live_count = live.iter().filter(|b| **b).count();
                if live_count != 1 {
                    return Err(format!(
                        "switch op '{}' produced {} live output(s), expected exactly one",
                        op.name, live_count
                    ));
                }
                let kind = if live[0] {
                    StepKind::SwitchLeft
                } else {
                    StepKind::SwitchRight
                };
                let branch = ExecStep::new(kind, &op.name, Some(step_frame.clone()));
                self.update_descendant_deps(ctx, &branch, &out_frame)?;
                ctx.tracker.mark_satisfied(&branch);
                defer = true;
            }
            OpType::Enter | OpType::Exit => {
                // same-frame propagation cannot discover a frame that did
                // not exist before; synthesize the op step there
                let moved = ExecStep::new(StepKind::Op, &op.name, Some(out_frame.clone()));
                self.update_descendant_deps(ctx, &moved, &out_frame)?;
                ctx.tracker.mark_satisfied(&moved);
                defer = true;
            }
            _ => {}
        }

        // Control dependencies crossing loop scopes without an enter/exit
        // pair resolve at first execution (equivalent to iteration 0)
        if !op.control_dep_for.is_empty() {
            let control = ExecStep::new(StepKind::ControlDep, &op.name, None);
            if !ctx.tracker.is_satisfied(&control) {
                ctx.tracker.mark_satisfied(&control);
            }
        }

        if !defer {
            self.update_descendant_deps(ctx, step, &out_frame)?;
            ctx.tracker.mark_satisfied(step);
        }
        Ok(())
    }

    /// Resolve an op's declared inputs to concrete values via the dependency
    /// edges actually registered for this step — enter/exit/merge inputs can
    /// live in frames other than the step's own.
    fn resolve_inputs(
        &self,
        ctx: &RunContext,
        op: &Op,
        step: &ExecStep,
    ) -> Result<Vec<Value>, String> {
        if op.inputs.is_empty() {
            return Ok(Vec::new());
        }

        let mut candidates: Vec<VarId> = Vec::new();
        let mut outer_names: Vec<String> = Vec::new();
        let and_deps = ctx.tracker.dependencies_of(step).to_vec();
        let or_deps: Vec<ExecStep> = ctx
            .tracker
            .or_dependencies_of(step)
            .iter()
            .flat_map(|(a, b)| [a.clone(), b.clone()])
            .collect();

        for dep in and_deps.iter().chain(or_deps.iter()) {
            match dep.kind {
                StepKind::Op | StepKind::SwitchLeft | StepKind::SwitchRight => {
                    let dep_op = self
                        .graph
                        .op(&dep.name)
                        .ok_or_else(|| format!("unknown op '{}' in dependency", dep.name))?;
                    let Some(dep_frame) = dep.frame_iter.clone() else {
                        continue;
                    };
                    for name in &op.inputs {
                        if dep_op.outputs.contains(name) {
                            candidates.push(VarId::new(name, dep_frame.clone()));
                        }
                    }
                }
                StepKind::Variable => candidates.push(VarId::outer(&dep.name)),
                StepKind::Constant | StepKind::Placeholder => outer_names.push(dep.name.clone()),
                StepKind::ExecStart | StepKind::ControlDep => {}
            }
        }

        let mut values = Vec::with_capacity(op.inputs.len());
        for name in &op.inputs {
            let mut found: Option<Value> = None;
            for vid in candidates.iter().filter(|v| v.name == *name) {
                if let Some(value) = ctx.values.get(vid) {
                    if !value.is_absent() {
                        found = Some(value.clone());
                        break;
                    }
                }
            }
            if found.is_none() && outer_names.iter().any(|n| n == name) {
                if let Some(value) = ctx.values.get(&VarId::outer(name)) {
                    if !value.is_absent() {
                        found = Some(value.clone());
                    }
                }
            }
            match found {
                Some(value) => values.push(value),
                // merge tolerates the unproduced side
                None if op.op_type == OpType::Merge => values.push(Value::Absent),
                None => {
                    return Err(format!(
                        "no value available for input '{}' of op '{}'",
                        name, op.name
                    ))
                }
            }
        }
        Ok(values)
    }

    /// After a step finishes, register the full dependency set of every
    /// subgraph op consuming what it produced, at the output frame.
    fn update_descendant_deps(
        &self,
        ctx: &mut RunContext,
        just_executed: &ExecStep,
        out_frame: &FrameIter,
    ) -> Result<(), String> {
        match just_executed.kind {
            StepKind::Op => {
                let op = self
                    .graph
                    .op(&just_executed.name)
                    .ok_or_else(|| format!("unknown op '{}'", just_executed.name))?;
                for out_name in &op.outputs {
                    let Some(var) = self.graph.variable(out_name) else {
                        continue;
                    };
                    for consumer in var
                        .inputs_for_op
                        .iter()
                        .chain(var.control_dep_for_ops.iter())
                    {
                        if ctx.plan.ops.contains(consumer) {
                            self.add_dependencies_for_op(ctx, consumer, out_frame)?;
                        }
                    }
                }
            }
            StepKind::Variable | StepKind::Constant | StepKind::Placeholder => {
                if let Some(var) = self.graph.variable(&just_executed.name) {
                    for consumer in &var.inputs_for_op {
                        if ctx.plan.ops.contains(consumer) {
                            self.add_dependencies_for_op(ctx, consumer, out_frame)?;
                        }
                    }
                }
            }
            StepKind::SwitchLeft | StepKind::SwitchRight => {
                // only the taken branch's consumers are registered
                let op = self
                    .graph
                    .op(&just_executed.name)
                    .ok_or_else(|| format!("unknown op '{}'", just_executed.name))?;
                let index = if just_executed.kind == StepKind::SwitchLeft {
                    0
                } else {
                    1
                };
                let branch_name = op.outputs.get(index).ok_or_else(|| {
                    format!("switch op '{}' missing output {}", op.name, index)
                })?;
                if let Some(var) = self.graph.variable(branch_name) {
                    for consumer in &var.inputs_for_op {
                        if ctx.plan.ops.contains(consumer) {
                            self.add_dependencies_for_op(ctx, consumer, out_frame)?;
                        }
                    }
                }
            }
            _ => {
                return Err(format!(
                    "cannot propagate from step {}",
                    just_executed
                ))
            }
        }
        Ok(())
    }

    /// Register the complete dependency set for one op at one frame — not
    /// just the edge that triggered it. Idempotent per frame/iteration,
    /// except next_iteration which re-registers per new iteration.
    fn add_dependencies_for_op(
        &self,
        ctx: &mut RunContext,
        op_name: &str,
        frame: &FrameIter,
    ) -> Result<(), String> {
        let op = self
            .graph
            .op(op_name)
            .ok_or_else(|| format!("unknown op '{}'", op_name))?;
        let mut step = ExecStep::new(StepKind::Op, op_name, Some(frame.clone()));
        if op.op_type != OpType::NextIteration && ctx.tracker.has_dependency(&step) {
            return Ok(());
        }

        match op.op_type {
            OpType::Merge => {
                // merge runs with either input available
                if op.inputs.len() != 2 {
                    return Err(format!("merge op '{}' must have two inputs", op_name));
                }
                let a = self.exec_step_for_var(&op.inputs[0], frame)?;
                let b = self.exec_step_for_var(&op.inputs[1], frame)?;
                ctx.tracker.add_or_dependency(&step, &a, &b);
            }
            OpType::NextIteration => {
                // the loop back-edge: inputs at iteration k feed the step at
                // iteration k + 1
                let mut next = frame.clone();
                next.iteration += 1;
                step = ExecStep::new(StepKind::Op, op_name, Some(next));
                for input in &op.inputs {
                    let req = self.exec_step_for_var(input, frame)?;
                    ctx.tracker.add_dependency(&step, &req);
                }
            }
            _ => {
                for input in &op.inputs {
                    let req = self.exec_step_for_var(input, frame)?;
                    ctx.tracker.add_dependency(&step, &req);
                }
            }
        }

        for dep in &op.control_deps {
            let req = self.exec_step_for_var(dep, frame)?;
            ctx.tracker.add_dependency(&step, &req);
        }
        Ok(())
    }

    /// The step that produces a variable, as seen from the given frame.
    fn exec_step_for_var(&self, var_name: &str, frame: &FrameIter) -> Result<ExecStep, String> {
        let var = match self.graph.variable(var_name) {
            Some(v) => v,
            None => {
                // renamed reference: resolve through the producing op's
                // first declared output
                let op = self
                    .graph
                    .op(var_name)
                    .ok_or_else(|| format!("variable '{}' not found", var_name))?;
                let first = op
                    .outputs
                    .first()
                    .ok_or_else(|| format!("op '{}' has no outputs", var_name))?;
                self.graph
                    .variable(first)
                    .ok_or_else(|| format!("variable '{}' not found", first))?
            }
        };

        match var.kind {
            VarKind::Variable => Ok(ExecStep::new(
                StepKind::Variable,
                &var.name,
                Some(FrameIter::outer()),
            )),
            VarKind::Constant => Ok(ExecStep::new(
                StepKind::Constant,
                &var.name,
                Some(FrameIter::outer()),
            )),
            VarKind::Placeholder => Ok(ExecStep::new(
                StepKind::Placeholder,
                &var.name,
                Some(FrameIter::outer()),
            )),
            VarKind::Array => {
                let op_name = var.output_of_op.as_deref().ok_or_else(|| {
                    format!("computed variable '{}' has no producing op", var.name)
                })?;
                let op = self
                    .graph
                    .op(op_name)
                    .ok_or_else(|| format!("unknown op '{}'", op_name))?;
                match op.op_type {
                    OpType::Switch => {
                        // branches are tracked separately; depending on the
                        // op itself would wake consumers of the untaken side
                        match op.outputs.iter().position(|o| o == &var.name) {
                            Some(0) => Ok(ExecStep::new(
                                StepKind::SwitchLeft,
                                op_name,
                                Some(frame.clone()),
                            )),
                            Some(1) => Ok(ExecStep::new(
                                StepKind::SwitchRight,
                                op_name,
                                Some(frame.clone()),
                            )),
                            _ => Err(format!(
                                "variable '{}' is not an output of switch op '{}'",
                                var.name, op_name
                            )),
                        }
                    }
                    OpType::Enter if op.is_constant_enter => {
                        // loop-invariant enter: available at every iteration,
                        // so the edge points at iteration 0 — and for chains
                        // of constant enters, iteration 0 up the parent chain
                        let mut fi = frame.clone();
                        fi.iteration = 0;
                        let mut in_name = op.inputs.first().cloned();
                        let mut cursor = fi.parent.as_deref_mut();
                        while let Some(parent) = cursor {
                            let inner = in_name.as_ref().and_then(|n| self.graph.producing_op(n));
                            match inner {
                                Some(inner_op)
                                    if inner_op.op_type == OpType::Enter
                                        && inner_op.is_constant_enter =>
                                {
                                    parent.iteration = 0;
                                    in_name = inner_op.inputs.first().cloned();
                                    cursor = parent.parent.as_deref_mut();
                                }
                                _ => break,
                            }
                        }
                        Ok(ExecStep::new(StepKind::Op, op_name, Some(fi)))
                    }
                    _ => Ok(ExecStep::new(StepKind::Op, op_name, Some(frame.clone()))),
                }
            }
        }
    }

    /// Nothing left to execute with requirements outstanding. Expected when
    /// outputs sit behind untaken branches: warn and return the gaps.
    fn exec_failed(&self, ctx: &RunContext, trace_dir: Option<&Path>) -> Vec<String> {
        let missing: Vec<String> = ctx
            .requested
            .iter()
            .filter(|n| !ctx.outputs.contains_key(*n))
            .cloned()
            .collect();
        let outstanding = ctx.required.len() - ctx.executed_required.len();
        eprintln!(
            "WARN: nothing left to execute at step {} with {} required value(s) \
             outstanding; unreachable outputs: [{}]",
            ctx.steps_executed,
            outstanding,
            missing.join(", ")
        );
        for name in &missing {
            self.trace(
                trace_dir,
                RunEvent::OutputUnreachable {
                    variable: name.clone(),
                },
            );
        }
        missing
    }

    fn trace(&self, trace_dir: Option<&Path>, event: RunEvent) {
        if let Some(dir) = trace_dir {
            // trace failures never fail a run
            let _ = eventlog::append_event(dir, &self.graph.name, event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser;
    use crate::ops::CpuExecutor;
    use proptest::prelude::*;

    fn compile(yaml: &str) -> Graph {
        Graph::compile(&parser::parse_graph(yaml).unwrap()).unwrap()
    }

    fn run_simple(
        yaml: &str,
        outputs: &[&str],
        placeholders: &[(&str, f32)],
    ) -> Result<RunResult, String> {
        let graph = compile(yaml);
        let mut session = Session::new(&graph, CpuExecutor::new(&graph));
        let outs: Vec<String> = outputs.iter().map(|s| s.to_string()).collect();
        let ph: IndexMap<String, Tensor> = placeholders
            .iter()
            .map(|(k, v)| (k.to_string(), Tensor::scalar(*v)))
            .collect();
        let values = IndexMap::new();
        session.run(&RunConfig {
            outputs: &outs,
            placeholders: &ph,
            value_placeholders: &values,
            required: &[],
            trace_dir: None,
        })
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
    fn test_tl007_placeholder_plus_constant() {
        let result = run_simple(SUM_GRAPH, &["y"], &[("x", 3.0)]).unwrap();
        assert_eq!(result.outputs["y"], Value::scalar(5.0));
        assert!(result.missing.is_empty());
    }

    #[test]
    fn test_tl007_request_constant_directly() {
        let result = run_simple(SUM_GRAPH, &["two"], &[("x", 1.0)]).unwrap();
        assert_eq!(result.outputs["two"], Value::scalar(2.0));
    }

    #[test]
    fn test_tl007_request_placeholder_directly() {
        let result = run_simple(SUM_GRAPH, &["x"], &[("x", 9.0)]).unwrap();
        assert_eq!(result.outputs["x"], Value::scalar(9.0));
    }

    #[test]
    fn test_tl007_unknown_output_fatal() {
        let err = run_simple(SUM_GRAPH, &["ghost"], &[("x", 1.0)]).unwrap_err();
        assert!(err.contains("'ghost' does not exist"));
    }

    #[test]
    fn test_tl007_missing_required_placeholder_fatal() {
        let err = run_simple(SUM_GRAPH, &["y"], &[]).unwrap_err();
        assert!(err.contains("placeholder 'x' is required"));
    }

    #[test]
    fn test_tl007_unneeded_placeholder_may_be_absent() {
        // x feeds nothing we asked for
        let result = run_simple(SUM_GRAPH, &["two"], &[]).unwrap();
        assert_eq!(result.outputs["two"], Value::scalar(2.0));
    }

    #[test]
    fn test_tl007_placeholder_via_both_channels_fatal() {
        let graph = compile(SUM_GRAPH);
        let mut session = Session::new(&graph, CpuExecutor::new(&graph));
        let outs = vec!["y".to_string()];
        let mut ph = IndexMap::new();
        ph.insert("x".to_string(), Tensor::scalar(1.0));
        let mut values = IndexMap::new();
        values.insert("x".to_string(), Value::scalar(2.0));
        let err = session
            .run(&RunConfig {
                outputs: &outs,
                placeholders: &ph,
                value_placeholders: &values,
                required: &[],
                trace_dir: None,
            })
            .unwrap_err();
        assert!(err.contains("both channels"));
    }

    #[test]
    fn test_tl007_value_placeholder_channel() {
        let graph = compile(SUM_GRAPH);
        let mut session = Session::new(&graph, CpuExecutor::new(&graph));
        let outs = vec!["y".to_string()];
        let ph = IndexMap::new();
        let mut values = IndexMap::new();
        values.insert("x".to_string(), Value::scalar(4.0));
        let result = session
            .run(&RunConfig {
                outputs: &outs,
                placeholders: &ph,
                value_placeholders: &values,
                required: &[],
                trace_dir: None,
            })
            .unwrap();
        assert_eq!(result.outputs["y"], Value::scalar(6.0));
    }

    #[test]
    fn test_tl007_chain_executes_in_dependency_order() {
        let yaml = r#"
version: "1.0"
name: chain
variables:
  x: {kind: placeholder}
  three: {kind: constant, value: 3.0}
ops:
  square_ish:
    type: mul
    inputs: [x, x]
    outputs: [xx]
  scaled:
    type: mul
    inputs: [xx, three]
    outputs: [y]
"#;
        let result = run_simple(yaml, &["y"], &[("x", 2.0)]).unwrap();
        assert_eq!(result.outputs["y"], Value::scalar(12.0));
    }

    // -- conditionals --------------------------------------------------

    const COND_GRAPH: &str = r#"
version: "1.0"
name: cond
variables:
  x: {kind: placeholder}
  pred: {kind: placeholder}
ops:
  sw:
    type: switch
    inputs: [x, pred]
    outputs: [on_false, on_true]
  negate:
    type: neg
    inputs: [on_false]
    outputs: [negated]
  pass:
    type: identity
    inputs: [on_true]
    outputs: [passed]
  join:
    type: merge
    inputs: [negated, passed]
    outputs: [y]
"#;

    #[test]
    fn test_tl007_switch_true_branch() {
        let result = run_simple(COND_GRAPH, &["y"], &[("x", 5.0), ("pred", 1.0)]).unwrap();
        assert_eq!(result.outputs["y"], Value::scalar(5.0));
    }

    #[test]
    fn test_tl007_switch_false_branch() {
        let result = run_simple(COND_GRAPH, &["y"], &[("x", 5.0), ("pred", 0.0)]).unwrap();
        assert_eq!(result.outputs["y"], Value::scalar(-5.0));
    }

    #[test]
    fn test_tl007_untaken_branch_is_partial_not_fatal() {
        // negated is only reachable when pred is false
        let result = run_simple(COND_GRAPH, &["negated"], &[("x", 5.0), ("pred", 1.0)]).unwrap();
        assert!(result.outputs.is_empty());
        assert_eq!(result.missing, vec!["negated"]);
    }

    #[test]
    fn test_tl007_untaken_branch_op_never_runs() {
        let graph = compile(COND_GRAPH);
        let mut session = Session::new(&graph, CpuExecutor::new(&graph));
        let outs = vec!["y".to_string()];
        let ph: IndexMap<String, Tensor> = [
            ("x".to_string(), Tensor::scalar(5.0)),
            ("pred".to_string(), Tensor::scalar(1.0)),
        ]
        .into_iter()
        .collect();
        let values = IndexMap::new();
        session
            .run(&RunConfig {
                outputs: &outs,
                placeholders: &ph,
                value_placeholders: &values,
                required: &[],
                trace_dir: None,
            })
            .unwrap();
        // the false branch's consumer output was never stored anywhere
        assert!(!session.contains("negated", "main", 0, None));
        assert!(session.contains("passed", "main", 0, None));
    }

    #[test]
    fn test_tl007_merge_fires_on_single_input() {
        // join has two declared inputs; only one is ever produced
        let result = run_simple(COND_GRAPH, &["y"], &[("x", 2.0), ("pred", 0.0)]).unwrap();
        assert_eq!(result.outputs["y"], Value::scalar(-2.0));
    }

    // -- loops ---------------------------------------------------------

    const COUNTER_GRAPH: &str = r#"
version: "1.0"
name: counter
variables:
  zero: {kind: constant, value: 0.0}
  one: {kind: constant, value: 1.0}
  limit: {kind: constant, value: 3.0}
ops:
  enter_i:
    type: enter
    inputs: [zero]
    outputs: [i_enter]
    frame: loop
  enter_one:
    type: enter
    inputs: [one]
    outputs: [one_loop]
    frame: loop
    constant: true
  enter_limit:
    type: enter
    inputs: [limit]
    outputs: [limit_loop]
    frame: loop
    constant: true
  merge_i:
    type: merge
    inputs: [i_enter, i_next]
    outputs: [i]
  still_counting:
    type: less
    inputs: [i, limit_loop]
    outputs: [keep_going]
  cond:
    type: loop_cond
    inputs: [keep_going]
    outputs: [cond_out]
  switch_i:
    type: switch
    inputs: [i, cond_out]
    outputs: [i_done, i_body]
  exit_i:
    type: exit
    inputs: [i_done]
    outputs: [result]
  body:
    type: add
    inputs: [i_body, one_loop]
    outputs: [i_plus]
  next_i:
    type: next_iteration
    inputs: [i_plus]
    outputs: [i_next]
"#;

    #[test]
    fn test_tl007_while_loop_counts_to_three() {
        let graph = compile(COUNTER_GRAPH);
        let mut session = Session::new(&graph, CpuExecutor::new(&graph));
        let outs = vec!["result".to_string()];
        let ph = IndexMap::new();
        let values = IndexMap::new();
        let result = session
            .run(&RunConfig {
                outputs: &outs,
                placeholders: &ph,
                value_placeholders: &values,
                required: &[],
                trace_dir: None,
            })
            .unwrap();
        assert_eq!(result.outputs["result"], Value::scalar(3.0));
        assert!(result.missing.is_empty());

        // exactly three body iterations (0, 1, 2), none at 3
        let outer = FrameIter::outer();
        for iteration in 0..3 {
            assert!(
                session.contains("i_plus", "loop", iteration, Some(outer.clone())),
                "body output missing at iteration {}",
                iteration
            );
        }
        assert!(!session.contains("i_plus", "loop", 3, Some(outer.clone())));
        assert!(!session.contains("i_next", "loop", 4, Some(outer.clone())));

        // loop-local values live at the loop frame, the result at the outer
        assert_eq!(
            session.get("i", "loop", 2, Some(outer.clone())),
            Some(&Value::scalar(2.0))
        );
        assert_eq!(
            session.get("result", "main", 0, None),
            Some(&Value::scalar(3.0))
        );
    }

    #[test]
    fn test_tl007_while_loop_zero_iterations() {
        let yaml = COUNTER_GRAPH.replace("limit: {kind: constant, value: 3.0}",
            "limit: {kind: constant, value: 0.0}");
        let graph = compile(&yaml);
        let mut session = Session::new(&graph, CpuExecutor::new(&graph));
        let outs = vec!["result".to_string()];
        let ph = IndexMap::new();
        let values = IndexMap::new();
        let result = session
            .run(&RunConfig {
                outputs: &outs,
                placeholders: &ph,
                value_placeholders: &values,
                required: &[],
                trace_dir: None,
            })
            .unwrap();
        assert_eq!(result.outputs["result"], Value::scalar(0.0));
        let outer = FrameIter::outer();
        assert!(!session.contains("i_plus", "loop", 0, Some(outer)));
    }

    // -- control dependencies ------------------------------------------

    #[test]
    fn test_tl007_variable_control_dep_waits_for_op() {
        let yaml = r#"
version: "1.0"
name: gated
variables:
  x: {kind: placeholder}
  c: {kind: constant, value: 10.0, control_deps: [gate]}
ops:
  gate:
    type: neg
    inputs: [x]
    outputs: [gated]
  use:
    type: add
    inputs: [c, gated]
    outputs: [y]
"#;
        let result = run_simple(yaml, &["y"], &[("x", 4.0)]).unwrap();
        assert_eq!(result.outputs["y"], Value::scalar(6.0));
    }

    #[test]
    fn test_tl007_op_control_dep() {
        let yaml = r#"
version: "1.0"
name: op-gated
variables:
  x: {kind: placeholder}
  c: {kind: constant, value: 1.0}
ops:
  first:
    type: neg
    inputs: [x]
    outputs: [nx]
  second:
    type: add
    inputs: [c, c]
    outputs: [y]
    control_deps: [nx]
"#;
        let result = run_simple(yaml, &["y"], &[("x", 1.0)]).unwrap();
        assert_eq!(result.outputs["y"], Value::scalar(2.0));
    }

    // -- determinism ---------------------------------------------------

    #[test]
    fn test_tl007_identical_runs_identical_results() {
        let r1 = run_simple(SUM_GRAPH, &["y"], &[("x", 3.0)]).unwrap();
        let r2 = run_simple(SUM_GRAPH, &["y"], &[("x", 3.0)]).unwrap();
        assert_eq!(r1.outputs, r2.outputs);
        assert_eq!(r1.steps_executed, r2.steps_executed);
    }

    #[test]
    fn test_tl007_declaration_order_does_not_change_results() {
        // same graph, independent ops declared in opposite orders — ready
        // queue ordering differs, results must not
        let forward = r#"
version: "1.0"
name: order
variables:
  x: {kind: placeholder}
ops:
  a:
    type: neg
    inputs: [x]
    outputs: [na]
  b:
    type: mul
    inputs: [x, x]
    outputs: [xx]
  joinv:
    type: add
    inputs: [na, xx]
    outputs: [y]
"#;
        let backward = r#"
version: "1.0"
name: order
variables:
  x: {kind: placeholder}
ops:
  b:
    type: mul
    inputs: [x, x]
    outputs: [xx]
  a:
    type: neg
    inputs: [x]
    outputs: [na]
  joinv:
    type: add
    inputs: [na, xx]
    outputs: [y]
"#;
        let r1 = run_simple(forward, &["y"], &[("x", 3.0)]).unwrap();
        let r2 = run_simple(backward, &["y"], &[("x", 3.0)]).unwrap();
        assert_eq!(r1.outputs, r2.outputs);
        assert_eq!(r1.steps_executed, r2.steps_executed);
    }

    #[test]
    fn test_tl007_required_activations_computed_but_not_returned() {
        let graph = compile(SUM_GRAPH);
        let mut session = Session::new(&graph, CpuExecutor::new(&graph));
        let outs: Vec<String> = vec![];
        let required = vec!["y".to_string()];
        let ph: IndexMap<String, Tensor> =
            [("x".to_string(), Tensor::scalar(1.0))].into_iter().collect();
        let values = IndexMap::new();
        let result = session
            .run(&RunConfig {
                outputs: &outs,
                placeholders: &ph,
                value_placeholders: &values,
                required: &required,
                trace_dir: None,
            })
            .unwrap();
        assert!(result.outputs.is_empty());
        assert!(session.contains("y", "main", 0, None));
    }

    #[test]
    fn test_tl007_trace_events_written() {
        let dir = tempfile::tempdir().unwrap();
        let graph = compile(SUM_GRAPH);
        let mut session = Session::new(&graph, CpuExecutor::new(&graph));
        let outs = vec!["y".to_string()];
        let ph: IndexMap<String, Tensor> =
            [("x".to_string(), Tensor::scalar(3.0))].into_iter().collect();
        let values = IndexMap::new();
        session
            .run(&RunConfig {
                outputs: &outs,
                placeholders: &ph,
                value_placeholders: &values,
                required: &[],
                trace_dir: Some(dir.path()),
            })
            .unwrap();

        let log = std::fs::read_to_string(dir.path().join("sum-graph/events.jsonl")).unwrap();
        assert!(log.contains("run_started"));
        assert!(log.contains("step_executed"));
        assert!(log.contains("run_completed"));
        assert!(log.contains("blake3:"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn test_tl007_chain_determinism(consts in prop::collection::vec(-10.0f32..10.0, 1..8)) {
            let mut yaml = String::from(
                "version: \"1.0\"\nname: chain\nvariables:\n  x: {kind: placeholder}\n",
            );
            for (i, c) in consts.iter().enumerate() {
                yaml += &format!("  c{}: {{kind: constant, value: {:?}}}\n", i, c);
            }
            yaml += "ops:\n";
            let mut prev = "x".to_string();
            for i in 0..consts.len() {
                yaml += &format!(
                    "  op{}:\n    type: add\n    inputs: [{}, c{}]\n    outputs: [y{}]\n",
                    i, prev, i, i
                );
                prev = format!("y{}", i);
            }

            let last = format!("y{}", consts.len() - 1);
            let r1 = run_simple(&yaml, &[last.as_str()], &[("x", 0.0)]).unwrap();
            let r2 = run_simple(&yaml, &[last.as_str()], &[("x", 0.0)]).unwrap();
            prop_assert_eq!(&r1.outputs[&last], &r2.outputs[&last]);
            prop_assert_eq!(r1.steps_executed, r2.steps_executed);

            let expected = consts.iter().fold(0.0f32, |acc, &c| acc + c);
            prop_assert_eq!(&r1.outputs[&last], &Value::scalar(expected));
        }
    }
}
