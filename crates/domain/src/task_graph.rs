//! Next-task link analysis over an explicit adjacency map.

use std::collections::{BTreeMap, BTreeSet};

use changeflow_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::{FlowMarker, Task, TaskId};

/// Non-blocking findings of a connectivity pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityReport {
    /// Tasks with no incoming link, no outgoing link, and no end marker.
    pub isolated: Vec<TaskId>,
}

impl ConnectivityReport {
    /// Returns whether no warning was found.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.isolated.is_empty()
    }

    /// Returns one human-readable warning per finding.
    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        self.isolated
            .iter()
            .map(|task_id| format!("task '{task_id}' is not linked to any other task"))
            .collect()
    }
}

/// Adjacency view of a task map, borrowed from the snapshot.
#[derive(Debug, Clone)]
pub struct TaskGraph<'a> {
    tasks: &'a BTreeMap<TaskId, Task>,
    successors: BTreeMap<&'a TaskId, Vec<&'a TaskId>>,
    predecessors: BTreeMap<&'a TaskId, BTreeSet<&'a TaskId>>,
}

impl<'a> TaskGraph<'a> {
    /// Builds the adjacency maps of a task snapshot.
    #[must_use]
    pub fn from_tasks(tasks: &'a BTreeMap<TaskId, Task>) -> Self {
        let mut successors: BTreeMap<&TaskId, Vec<&TaskId>> = BTreeMap::new();
        let mut predecessors: BTreeMap<&TaskId, BTreeSet<&TaskId>> = BTreeMap::new();

        for task in tasks.values() {
            let outgoing: Vec<&TaskId> = task.successors().collect();
            for target in &outgoing {
                predecessors.entry(*target).or_default().insert(task.id());
            }
            successors.insert(task.id(), outgoing);
        }

        Self {
            tasks,
            successors,
            predecessors,
        }
    }

    /// Returns the outgoing links of a task.
    #[must_use]
    pub fn successors(&self, task_id: &TaskId) -> &[&'a TaskId] {
        self.successors
            .get(task_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns the distinct tasks linking to `task_id`.
    #[must_use]
    pub fn predecessors(&self, task_id: &TaskId) -> Vec<&'a TaskId> {
        self.predecessors
            .get(task_id)
            .map(|values| values.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Fails for every link whose target is not in the snapshot.
    pub fn validate_links(&self) -> AppResult<()> {
        AppError::from_many(
            self.successors
                .iter()
                .flat_map(|(source, targets)| targets.iter().map(move |target| (*source, *target)))
                .filter(|(_, target)| !self.tasks.contains_key(*target))
                .map(|(source, target)| {
                    AppError::DanglingReference(format!(
                        "task '{source}' links to missing task '{target}'"
                    ))
                })
                .collect(),
        )
    }

    /// Fails when any task can reach itself through next-task links.
    ///
    /// Walks start from tasks nobody links to, then from whatever is left
    /// unvisited so cycles without an entry point are found too. The
    /// visited set is shared across walks; the path is per walk.
    pub fn validate_acyclic(&self) -> AppResult<()> {
        let mut visited: BTreeSet<&TaskId> = BTreeSet::new();
        let mut cycles: Vec<Vec<&TaskId>> = Vec::new();

        let tasks: &'a BTreeMap<TaskId, Task> = self.tasks;
        let starts = tasks
            .keys()
            .filter(|task_id| !self.predecessors.contains_key(task_id));
        let roots: Vec<&'a TaskId> = starts.chain(tasks.keys()).collect();

        for root in roots {
            if visited.contains(root) {
                continue;
            }
            self.walk(root, &mut visited, &mut cycles);
        }

        let mut reported: BTreeSet<BTreeSet<&TaskId>> = BTreeSet::new();
        AppError::from_many(
            cycles
                .into_iter()
                .filter(|cycle| reported.insert(cycle.iter().copied().collect()))
                .map(|cycle| {
                    AppError::CircularDependency(format!(
                        "task links form a cycle: {}",
                        join_path(&cycle)
                    ))
                })
                .collect(),
        )
    }

    /// Lists tasks that are linked to nothing.
    ///
    /// A single-task pattern is connected by definition.
    #[must_use]
    pub fn validate_connectivity(&self) -> ConnectivityReport {
        if self.tasks.len() <= 1 {
            return ConnectivityReport::default();
        }

        let isolated = self
            .tasks
            .values()
            .filter(|task| task.flow_marker() != Some(FlowMarker::End))
            .filter(|task| task.successors().next().is_none())
            .filter(|task| !self.predecessors.contains_key(task.id()))
            .map(|task| task.id().clone())
            .collect();

        ConnectivityReport { isolated }
    }

    /// Checks split and end markers against the links.
    pub fn validate_markers(&self) -> AppResult<()> {
        let mut errors = Vec::new();
        for task in self.tasks.values() {
            let outgoing = self.successors(task.id()).len();
            match task.flow_marker() {
                Some(FlowMarker::End) if outgoing > 0 => {
                    errors.push(AppError::Validation(format!(
                        "task '{}' is marked as end but links to {outgoing} task(s)",
                        task.id()
                    )));
                }
                Some(FlowMarker::Split) => {}
                _ if outgoing > 1 => {
                    errors.push(AppError::Validation(format!(
                        "task '{}' has {outgoing} next tasks and must be marked as split",
                        task.id()
                    )));
                }
                _ => {}
            }
        }

        AppError::from_many(errors)
    }

    /// Returns whether the task can be removed without repointing links.
    #[must_use]
    pub fn safe_to_delete(&self, task_id: &TaskId) -> bool {
        self.tasks.contains_key(task_id) && self.predecessors(task_id).len() <= 1
    }

    /// Returns whether `to` is reachable from `from` through existing links.
    #[must_use]
    pub fn reaches(&self, from: &TaskId, to: &TaskId) -> bool {
        let mut stack: Vec<&TaskId> = vec![from];
        let mut seen: BTreeSet<&TaskId> = BTreeSet::new();

        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if seen.insert(current) {
                stack.extend(self.successors(current).iter().copied());
            }
        }

        false
    }

    /// Checks that linking `source` to `target` keeps the graph acyclic.
    pub fn check_next_task(&self, source: &TaskId, target: &TaskId) -> AppResult<()> {
        if source == target {
            return Err(AppError::CircularDependency(format!(
                "task '{source}' cannot be its own next task"
            )));
        }

        for task_id in [source, target] {
            if !self.tasks.contains_key(task_id) {
                return Err(AppError::DanglingReference(format!(
                    "task '{task_id}' does not exist"
                )));
            }
        }

        if self.reaches(target, source) {
            return Err(AppError::CircularDependency(format!(
                "linking '{source}' to '{target}' closes a cycle: '{target}' already reaches '{source}'"
            )));
        }

        Ok(())
    }

    fn walk(
        &self,
        root: &'a TaskId,
        visited: &mut BTreeSet<&'a TaskId>,
        cycles: &mut Vec<Vec<&'a TaskId>>,
    ) {
        // Each frame is a task on the current path and its next unexplored link.
        let mut frames: Vec<(&'a TaskId, usize)> = vec![(root, 0)];
        let mut on_path: BTreeSet<&'a TaskId> = BTreeSet::from([root]);

        while let Some((node, cursor)) = frames.last_mut() {
            let node = *node;
            let Some(next) = self.successors(node).get(*cursor).copied() else {
                frames.pop();
                on_path.remove(node);
                visited.insert(node);
                continue;
            };
            *cursor += 1;

            if on_path.contains(next) {
                let cycle: Vec<&TaskId> = frames
                    .iter()
                    .map(|(task_id, _)| *task_id)
                    .skip_while(|task_id| *task_id != next)
                    .chain([next])
                    .collect();
                cycles.push(cycle);
                continue;
            }
            if self.tasks.contains_key(next) && !visited.contains(next) {
                on_path.insert(next);
                frames.push((next, 0));
            }
        }
    }
}

/// Fails when any task can reach itself through next-task links.
pub fn validate_acyclic(tasks: &BTreeMap<TaskId, Task>) -> AppResult<()> {
    TaskGraph::from_tasks(tasks).validate_acyclic()
}

/// Lists tasks that are linked to nothing.
#[must_use]
pub fn validate_connectivity(tasks: &BTreeMap<TaskId, Task>) -> ConnectivityReport {
    TaskGraph::from_tasks(tasks).validate_connectivity()
}

/// Returns whether the task has at most one predecessor.
#[must_use]
pub fn safe_to_delete(task_id: &TaskId, tasks: &BTreeMap<TaskId, Task>) -> bool {
    TaskGraph::from_tasks(tasks).safe_to_delete(task_id)
}

fn join_path(path: &[&TaskId]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use changeflow_core::{AppError, ErrorKind};
    use proptest::prelude::*;

    use super::{TaskGraph, safe_to_delete, validate_acyclic, validate_connectivity};
    use crate::{FlowMarker, Task, TaskId, TaskInput, TaskStatus};

    fn task_id(value: &str) -> TaskId {
        TaskId::new(value).unwrap_or_else(|_| unreachable!())
    }

    fn task(id: &str, next: &[&str], flow_marker: Option<FlowMarker>) -> Task {
        let (next_task_id, next_task_ids) = match next {
            [single] => (Some((*single).to_owned()), Vec::new()),
            many => (None, many.iter().map(|value| (*value).to_owned()).collect()),
        };
        Task::new(TaskInput {
            id: id.to_owned(),
            name: id.to_owned(),
            binding: None,
            next_task_id,
            next_task_ids,
            flow_marker,
            trigger_condition: None,
            status: TaskStatus::Pending,
        })
        .unwrap_or_else(|_| unreachable!())
    }

    fn map(tasks: Vec<Task>) -> BTreeMap<TaskId, Task> {
        tasks
            .into_iter()
            .map(|task| (task.id().clone(), task))
            .collect()
    }

    fn chain() -> BTreeMap<TaskId, Task> {
        map(vec![
            task("T1", &["T2"], None),
            task("T2", &["T3"], None),
            task("T3", &[], None),
        ])
    }

    #[test]
    fn linear_chain_is_acyclic_and_closing_it_is_rejected() {
        let tasks = chain();
        assert!(validate_acyclic(&tasks).is_ok());

        let graph = TaskGraph::from_tasks(&tasks);
        let result = graph.check_next_task(&task_id("T3"), &task_id("T1"));
        assert_eq!(
            result.map_err(|error| error.kind()),
            Err(ErrorKind::CircularDependency)
        );
        assert!(graph.check_next_task(&task_id("T1"), &task_id("T3")).is_ok());
    }

    #[test]
    fn self_link_is_rejected() {
        let tasks = chain();
        let graph = TaskGraph::from_tasks(&tasks);

        assert_eq!(
            graph
                .check_next_task(&task_id("T2"), &task_id("T2"))
                .map_err(|error| error.kind()),
            Err(ErrorKind::CircularDependency)
        );
    }

    #[test]
    fn cycle_without_entry_point_is_found_and_named() {
        let tasks = map(vec![
            task("A", &["B"], None),
            task("B", &["C"], None),
            task("C", &["A"], None),
        ]);

        let result = validate_acyclic(&tasks);
        assert!(
            matches!(result, Err(AppError::CircularDependency(ref message)) if message.contains("A -> B -> C -> A"))
        );
    }

    #[test]
    fn branches_from_different_roots_into_shared_cycle_are_caught() {
        let tasks = map(vec![
            task("S1", &["X"], None),
            task("S2", &["Y"], None),
            task("X", &["Y"], None),
            task("Y", &["Z"], None),
            task("Z", &["X"], None),
        ]);

        let result = validate_acyclic(&tasks);
        assert_eq!(
            result.map_err(|error| error.kind()),
            Err(ErrorKind::CircularDependency)
        );
    }

    #[test]
    fn very_long_chain_is_walked_without_recursion() {
        let length = 100_000;
        let mut tasks: Vec<Task> = (0..length)
            .map(|index| {
                let next = format!("T{}", index + 1);
                task(&format!("T{index}"), &[next.as_str()], None)
            })
            .collect();
        tasks.push(task(&format!("T{length}"), &[], None));
        let mut tasks = map(tasks);
        assert!(validate_acyclic(&tasks).is_ok());

        tasks.insert(
            task_id(&format!("T{length}")),
            task(&format!("T{length}"), &["T0"], None),
        );
        assert_eq!(
            validate_acyclic(&tasks).map_err(|error| error.kind()),
            Err(ErrorKind::CircularDependency)
        );
    }

    #[test]
    fn diamond_join_is_not_a_cycle() {
        let tasks = map(vec![
            task("Start", &["Left", "Right"], Some(FlowMarker::Split)),
            task("Left", &["Join"], None),
            task("Right", &["Join"], None),
            task("Join", &[], Some(FlowMarker::Join)),
        ]);
        let graph = TaskGraph::from_tasks(&tasks);

        assert!(graph.validate_acyclic().is_ok());
        assert!(graph.validate_markers().is_ok());
        assert_eq!(graph.predecessors(&task_id("Join")).len(), 2);
    }

    #[test]
    fn fan_out_without_split_marker_is_rejected() {
        let tasks = map(vec![
            task("Start", &["Left", "Right"], None),
            task("Left", &[], None),
            task("Right", &[], Some(FlowMarker::End)),
        ]);

        assert!(TaskGraph::from_tasks(&tasks).validate_markers().is_err());
    }

    #[test]
    fn dangling_links_are_reported() {
        let tasks = map(vec![task("T1", &["Ghost"], None)]);

        assert_eq!(
            TaskGraph::from_tasks(&tasks)
                .validate_links()
                .map_err(|error| error.kind()),
            Err(ErrorKind::DanglingReference)
        );
        assert!(validate_acyclic(&tasks).is_ok());
    }

    #[test]
    fn isolated_tasks_are_warnings_unless_single_or_terminal() {
        let single = map(vec![task("Only", &[], None)]);
        assert!(validate_connectivity(&single).is_connected());

        let mut tasks = chain();
        tasks.insert(task_id("Loose"), task("Loose", &[], None));
        tasks.insert(task_id("Done"), task("Done", &[], Some(FlowMarker::End)));

        let report = validate_connectivity(&tasks);
        assert_eq!(report.isolated, vec![task_id("Loose")]);
        assert_eq!(report.warnings().len(), 1);
    }

    #[test]
    fn task_with_two_predecessors_is_not_safe_to_delete() {
        let mut tasks = map(vec![
            task("T0a", &["T1"], None),
            task("T0b", &["T1"], None),
            task("T1", &[], None),
        ]);
        assert!(!safe_to_delete(&task_id("T1"), &tasks));

        if let Some(predecessor) = tasks.get_mut(&task_id("T0b")) {
            predecessor.set_next_task_id(None);
        }
        assert!(safe_to_delete(&task_id("T1"), &tasks));
        assert!(!safe_to_delete(&task_id("Ghost"), &tasks));
    }

    fn self_reachable(next: &[Vec<usize>]) -> bool {
        (0..next.len()).any(|start| {
            let mut frontier = next[start].clone();
            let mut seen = vec![false; next.len()];
            while let Some(node) = frontier.pop() {
                if node == start {
                    return true;
                }
                if !seen[node] {
                    seen[node] = true;
                    frontier.extend(next[node].iter().copied());
                }
            }
            false
        })
    }

    proptest! {
        #[test]
        fn acyclic_iff_no_task_reaches_itself(
            raw in proptest::collection::vec(proptest::collection::vec(0usize..7, 0..3), 1..7)
        ) {
            let size = raw.len();
            let next: Vec<Vec<usize>> = raw
                .iter()
                .enumerate()
                .map(|(index, targets)| {
                    let mut targets: Vec<usize> = targets
                        .iter()
                        .map(|target| target % size)
                        .filter(|target| *target != index)
                        .collect();
                    targets.sort_unstable();
                    targets.dedup();
                    targets
                })
                .collect();

            let names: Vec<String> = (0..size).map(|index| format!("T{index}")).collect();
            let tasks = map(
                next.iter()
                    .enumerate()
                    .map(|(index, targets)| {
                        let targets: Vec<&str> =
                            targets.iter().map(|target| names[*target].as_str()).collect();
                        task(&names[index], &targets, Some(FlowMarker::Split))
                    })
                    .collect(),
            );

            prop_assert_eq!(validate_acyclic(&tasks).is_err(), self_reachable(&next));
        }
    }
}
