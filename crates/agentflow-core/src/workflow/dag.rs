//! Dependency-graph helpers over a workflow's steps.
//!
//! Uses `petgraph` to model step dependencies as a directed graph with an edge
//! from each dependency to its dependent. Topological sort detects cycles when
//! a step is inserted; reachability walks answer "what is downstream of this
//! failure" and "why is this step not being admitted".

use std::collections::{HashMap, HashSet};

use agentflow_types::error::WorkflowError;
use agentflow_types::workflow::{BlockedStep, Step, StepStatus};
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Insertion-time validation
// ---------------------------------------------------------------------------

/// Validate the dependencies of a step about to be added to a workflow.
///
/// Every dependency must name one of `existing` (the workflow's current
/// steps), and the graph including the new step must stay acyclic.
///
/// A fresh step that only depends on existing steps cannot close a loop, so
/// the acyclicity check only fires when `existing` already holds a cycle,
/// e.g. rows written to the store outside the engine.
pub fn validate_new_step(
    existing: &[Step],
    new_step_id: Uuid,
    dependencies: &[Uuid],
) -> Result<(), WorkflowError> {
    let known: HashSet<Uuid> = existing.iter().map(|s| s.id).collect();
    for dep in dependencies {
        if !known.contains(dep) {
            return Err(WorkflowError::MissingReference(format!(
                "dependency {dep} is not a step of this workflow"
            )));
        }
    }

    let mut edges: Vec<(Uuid, &[Uuid])> = existing
        .iter()
        .map(|s| (s.id, s.dependencies.as_slice()))
        .collect();
    edges.push((new_step_id, dependencies));
    check_acyclic(&edges)
}

/// Fail with `CycleDetected` if the `(step, dependencies)` list has a cycle.
///
/// Dependencies that name no listed step are ignored here; reference checks
/// happen separately.
pub fn check_acyclic(edges: &[(Uuid, &[Uuid])]) -> Result<(), WorkflowError> {
    let mut graph = DiGraph::<Uuid, ()>::new();
    let idx: HashMap<Uuid, _> = edges
        .iter()
        .map(|(id, _)| (*id, graph.add_node(*id)))
        .collect();

    for (id, deps) in edges {
        for dep in deps.iter() {
            if let Some(from) = idx.get(dep) {
                graph.add_edge(*from, idx[id], ());
            }
        }
    }

    toposort(&graph, None).map_err(|cycle| {
        let node_id = graph[cycle.node_id()];
        WorkflowError::CycleDetected(format!("cycle detected involving step {node_id}"))
    })?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Reachability
// ---------------------------------------------------------------------------

/// All steps that transitively depend on any of `roots`, excluding the roots.
pub fn transitive_dependents(steps: &[Step], roots: &[Uuid]) -> HashSet<Uuid> {
    let mut dependents_of: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for step in steps {
        for dep in &step.dependencies {
            dependents_of.entry(*dep).or_default().push(step.id);
        }
    }

    let mut visited = HashSet::new();
    let mut stack: Vec<Uuid> = roots.to_vec();
    while let Some(current) = stack.pop() {
        if let Some(children) = dependents_of.get(&current) {
            for child in children {
                if visited.insert(*child) {
                    stack.push(*child);
                }
            }
        }
    }

    for root in roots {
        visited.remove(root);
    }
    visited
}

/// Pending steps that can never be admitted because a FAILED or SKIPPED step
/// sits somewhere upstream of them.
///
/// The walk goes through pending dependencies only: an upstream step that is
/// completed or in flight can still unblock its dependents.
pub fn blocked_steps(steps: &[Step]) -> Vec<BlockedStep> {
    let by_id: HashMap<Uuid, &Step> = steps.iter().map(|s| (s.id, s)).collect();

    let mut blocked = Vec::new();
    for step in steps.iter().filter(|s| s.status == StepStatus::Pending) {
        let mut blockers = HashSet::new();
        let mut visited = HashSet::new();
        let mut stack: Vec<Uuid> = step.dependencies.clone();

        while let Some(dep_id) = stack.pop() {
            if !visited.insert(dep_id) {
                continue;
            }
            let Some(dep) = by_id.get(&dep_id) else {
                continue;
            };
            match dep.status {
                StepStatus::Failed | StepStatus::Skipped => {
                    blockers.insert(dep_id);
                }
                StepStatus::Pending => stack.extend(dep.dependencies.iter().copied()),
                StepStatus::Scheduled
                | StepStatus::Running
                | StepStatus::Waiting
                | StepStatus::Completed => {}
            }
        }

        if !blockers.is_empty() {
            let mut blocked_by: Vec<Uuid> = blockers.into_iter().collect();
            blocked_by.sort();
            blocked.push(BlockedStep {
                step_id: step.id,
                name: step.name.clone(),
                blocked_by,
            });
        }
    }
    blocked
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
