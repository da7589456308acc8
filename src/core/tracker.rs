//! TL-004: Dependency tracker — generic "ready when prerequisites satisfied"
//! engine.
//!
//! Tracks AND edges (the default) and 2-way OR groups (merge ops only)
//! between execution steps. Marking a step satisfied pushes every dependent
//! whose full prerequisite set is now met onto a FIFO ready queue. An empty
//! ready queue with requirements outstanding is a normal terminal state for
//! the caller, not an error here.

use super::types::ExecStep;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;

/// Readiness tracking over execution steps.
#[derive(Debug, Default)]
pub struct DependencyTracker {
    /// target -> AND prerequisites
    dependencies: FxHashMap<ExecStep, Vec<ExecStep>>,

    /// target -> OR groups; a group is met when either member is satisfied
    or_dependencies: FxHashMap<ExecStep, Vec<(ExecStep, ExecStep)>>,

    /// source -> targets depending on it (AND and OR edges)
    dependents: FxHashMap<ExecStep, Vec<ExecStep>>,

    satisfied: FxHashSet<ExecStep>,
    ready: VecDeque<ExecStep>,
    queued: FxHashSet<ExecStep>,
}

impl DependencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an AND edge: `target` cannot run until `source` is satisfied.
    /// Idempotent. If `target` was already queued as ready and `source` is
    /// not yet satisfied, `target` is pulled back out of the queue.
    pub fn add_dependency(&mut self, target: &ExecStep, source: &ExecStep) {
        let deps = self.dependencies.entry(target.clone()).or_default();
        if deps.contains(source) {
            return;
        }
        deps.push(source.clone());
        self.dependents
            .entry(source.clone())
            .or_default()
            .push(target.clone());
        if !self.satisfied.contains(source) {
            self.unqueue(target);
        }
    }

    /// Record a 2-way OR group: `target` can run once either `a` or `b` is
    /// satisfied. Idempotent.
    pub fn add_or_dependency(&mut self, target: &ExecStep, a: &ExecStep, b: &ExecStep) {
        let groups = self.or_dependencies.entry(target.clone()).or_default();
        if groups.iter().any(|(x, y)| x == a && y == b) {
            return;
        }
        groups.push((a.clone(), b.clone()));
        for source in [a, b] {
            self.dependents
                .entry(source.clone())
                .or_default()
                .push(target.clone());
        }
        if !self.satisfied.contains(a) && !self.satisfied.contains(b) {
            self.unqueue(target);
        }
    }

    /// True if any dependencies have been registered for `target`.
    pub fn has_dependency(&self, target: &ExecStep) -> bool {
        self.dependencies.contains_key(target) || self.or_dependencies.contains_key(target)
    }

    /// The AND prerequisites registered for `target`.
    pub fn dependencies_of(&self, target: &ExecStep) -> &[ExecStep] {
        self.dependencies
            .get(target)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The OR groups registered for `target`.
    pub fn or_dependencies_of(&self, target: &ExecStep) -> &[(ExecStep, ExecStep)] {
        self.or_dependencies
            .get(target)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_satisfied(&self, step: &ExecStep) -> bool {
        self.satisfied.contains(step)
    }

    /// Mark `step` satisfied (write-once; repeat calls are no-ops) and queue
    /// every dependent whose prerequisites are now all met.
    pub fn mark_satisfied(&mut self, step: &ExecStep) {
        if !self.satisfied.insert(step.clone()) {
            return;
        }
        let Some(targets) = self.dependents.get(step) else {
            return;
        };
        let targets: Vec<ExecStep> = targets.clone();
        for target in targets {
            if self.satisfied.contains(&target) || self.queued.contains(&target) {
                continue;
            }
            if self.all_satisfied(&target) {
                self.queued.insert(target.clone());
                self.ready.push_back(target);
            }
        }
    }

    pub fn has_ready(&self) -> bool {
        !self.ready.is_empty()
    }

    /// Pop the oldest ready step.
    pub fn take_ready(&mut self) -> Option<ExecStep> {
        let step = self.ready.pop_front()?;
        self.queued.remove(&step);
        Some(step)
    }

    /// Pop the oldest ready step matching `predicate`, leaving others queued.
    pub fn take_ready_matching<F>(&mut self, predicate: F) -> Option<ExecStep>
    where
        F: Fn(&ExecStep) -> bool,
    {
        let index = self.ready.iter().position(|s| predicate(s))?;
        let step = self.ready.remove(index)?;
        self.queued.remove(&step);
        Some(step)
    }

    /// Drop all state. Sessions build a fresh tracker per request; this
    /// exists for callers that reuse one.
    pub fn clear(&mut self) {
        self.dependencies.clear();
        self.or_dependencies.clear();
        self.dependents.clear();
        self.satisfied.clear();
        self.ready.clear();
        self.queued.clear();
    }

    fn all_satisfied(&self, target: &ExecStep) -> bool {
        if let Some(deps) = self.dependencies.get(target) {
            if !deps.iter().all(|d| self.satisfied.contains(d)) {
                return false;
            }
        }
        if let Some(groups) = self.or_dependencies.get(target) {
            if !groups
                .iter()
                .all(|(a, b)| self.satisfied.contains(a) || self.satisfied.contains(b))
            {
                return false;
            }
        }
        true
    }

    fn unqueue(&mut self, target: &ExecStep) {
        if self.queued.remove(target) {
            self.ready.retain(|s| s != target);
        }
    }
}
