use std::collections::BTreeMap;

use changeflow_core::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    AllocationValidator, ConnectivityReport, FlowMarker, PatternId, ResourceId, ResourceStatus,
    RoleId, Task, TaskBinding, TaskGraph, TaskId, TaskStatus,
};

/// Change pattern payload in its persisted shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePatternInput {
    /// Stable pattern identifier, generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    /// Display name; may be blank while drafting.
    #[serde(default)]
    pub name: String,
    /// Tasks keyed by their identifier.
    #[serde(default)]
    pub tasks: BTreeMap<String, Task>,
    /// Pattern-level role.
    #[serde(default)]
    pub role_id: Option<String>,
    /// Pattern-level resource.
    #[serde(default)]
    pub resource_id: Option<String>,
    /// Creation timestamp, defaults to now.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Last mutation timestamp, defaults to the creation timestamp.
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}

/// Named bundle of linked tasks with role and resource bindings.
///
/// Mutating methods validate against the current task map first and
/// leave the pattern untouched when they fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ChangePatternInput", into = "ChangePatternInput")]
pub struct ChangePattern {
    id: PatternId,
    name: String,
    tasks: BTreeMap<TaskId, Task>,
    role_id: Option<RoleId>,
    resource_id: Option<ResourceId>,
    created_at: DateTime<Utc>,
    last_modified: DateTime<Utc>,
}

impl ChangePattern {
    /// Creates a pattern from its persisted shape.
    pub fn new(input: ChangePatternInput) -> AppResult<Self> {
        let ChangePatternInput {
            id,
            name,
            tasks,
            role_id,
            resource_id,
            created_at,
            last_modified,
        } = input;

        let id = match id.filter(|value| !value.trim().is_empty()) {
            Some(id) => PatternId::new(id)?,
            None => PatternId::generate(),
        };

        let mut keyed = BTreeMap::new();
        for (key, task) in tasks {
            if key != task.id().as_str() {
                return Err(AppError::Validation(format!(
                    "task keyed as '{key}' declares id '{}'",
                    task.id()
                )));
            }
            keyed.insert(task.id().clone(), task);
        }

        let created_at = created_at.unwrap_or_else(Utc::now);

        Ok(Self {
            id,
            name: name.trim().to_owned(),
            tasks: keyed,
            role_id: role_id
                .filter(|value| !value.trim().is_empty())
                .map(RoleId::new)
                .transpose()?,
            resource_id: resource_id
                .filter(|value| !value.trim().is_empty())
                .map(ResourceId::new)
                .transpose()?,
            created_at,
            last_modified: last_modified.unwrap_or(created_at),
        })
    }

    /// Creates an empty pattern with a generated identifier.
    #[must_use]
    pub fn draft(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: PatternId::generate(),
            name: name.into().trim().to_owned(),
            tasks: BTreeMap::new(),
            role_id: None,
            resource_id: None,
            created_at: now,
            last_modified: now,
        }
    }

    /// Returns the pattern identifier.
    #[must_use]
    pub fn id(&self) -> &PatternId {
        &self.id
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the task map.
    #[must_use]
    pub fn tasks(&self) -> &BTreeMap<TaskId, Task> {
        &self.tasks
    }

    /// Returns one task.
    #[must_use]
    pub fn task(&self, task_id: &TaskId) -> Option<&Task> {
        self.tasks.get(task_id)
    }

    /// Returns the pattern-level role.
    #[must_use]
    pub fn role_id(&self) -> Option<&RoleId> {
        self.role_id.as_ref()
    }

    /// Returns the pattern-level resource.
    #[must_use]
    pub fn resource_id(&self) -> Option<&ResourceId> {
        self.resource_id.as_ref()
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the last mutation timestamp.
    #[must_use]
    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    /// Returns the adjacency view of the current tasks.
    #[must_use]
    pub fn graph(&self) -> TaskGraph<'_> {
        TaskGraph::from_tasks(&self.tasks)
    }

    /// Renames the pattern.
    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into().trim().to_owned();
        self.touch();
    }

    /// Sets the pattern-level role and resource.
    pub fn assign(&mut self, role_id: Option<RoleId>, resource_id: Option<ResourceId>) {
        self.role_id = role_id;
        self.resource_id = resource_id;
        self.touch();
    }

    /// Adds a task whose links and binding keep the pattern valid.
    pub fn add_task(&mut self, task: Task, validator: &AllocationValidator<'_>) -> AppResult<()> {
        if self.tasks.contains_key(task.id()) {
            return Err(AppError::Validation(format!(
                "task '{}' already exists in pattern '{}'",
                task.id(),
                self.id
            )));
        }

        if let Some(binding) = task.binding() {
            validator
                .check_binding(&self.tasks, task.id(), binding)
                .map_err(|error| error.context(&format!("task '{}'", task.id())))?;
        }

        let mut candidate = self.tasks.clone();
        candidate.insert(task.id().clone(), task);
        let graph = TaskGraph::from_tasks(&candidate);
        graph.validate_links()?;
        graph.validate_acyclic()?;

        self.tasks = candidate;
        self.touch();
        Ok(())
    }

    /// Replaces a task's binding after shape and capacity checks.
    pub fn bind_task(
        &mut self,
        task_id: &TaskId,
        binding: TaskBinding,
        validator: &AllocationValidator<'_>,
    ) -> AppResult<()> {
        self.require_task(task_id)?;
        validator.check_binding(&self.tasks, task_id, &binding)?;

        if let Some(task) = self.tasks.get_mut(task_id) {
            task.set_binding(Some(binding));
        }
        self.touch();
        Ok(())
    }

    /// Releases a task's binding.
    pub fn unbind_task(&mut self, task_id: &TaskId) -> AppResult<Option<TaskBinding>> {
        self.require_task(task_id)?;

        let previous = self.tasks.get_mut(task_id).and_then(|task| {
            let previous = task.binding().cloned();
            task.set_binding(None);
            previous
        });
        self.touch();
        Ok(previous)
    }

    /// Points `source` at `target` as its single next task.
    pub fn set_next_task(&mut self, source: &TaskId, target: &TaskId) -> AppResult<()> {
        self.graph().check_next_task(source, target)?;

        if let Some(task) = self.tasks.get_mut(source) {
            task.set_next_task_id(Some(target.clone()));
        }
        self.touch();
        Ok(())
    }

    /// Adds `target` as one more parallel successor of `source`.
    pub fn add_parallel_next(&mut self, source: &TaskId, target: &TaskId) -> AppResult<()> {
        self.graph().check_next_task(source, target)?;

        if let Some(task) = self.tasks.get_mut(source) {
            task.add_parallel_next(target.clone());
        }
        self.touch();
        Ok(())
    }

    /// Removes every outgoing link of `source`.
    pub fn clear_next_task(&mut self, source: &TaskId) -> AppResult<()> {
        self.require_task(source)?;

        if let Some(task) = self.tasks.get_mut(source) {
            task.set_next_task_id(None);
        }
        self.touch();
        Ok(())
    }

    /// Sets or clears a task's structural marker.
    pub fn set_flow_marker(
        &mut self,
        task_id: &TaskId,
        flow_marker: Option<FlowMarker>,
    ) -> AppResult<()> {
        self.require_task(task_id)?;

        if let Some(task) = self.tasks.get_mut(task_id) {
            task.set_flow_marker(flow_marker);
        }
        self.touch();
        Ok(())
    }

    /// Deletes a task with at most one predecessor, unlinking that predecessor.
    pub fn remove_task(&mut self, task_id: &TaskId) -> AppResult<Task> {
        self.require_task(task_id)?;

        let predecessors: Vec<TaskId> = self
            .graph()
            .predecessors(task_id)
            .into_iter()
            .cloned()
            .collect();
        if predecessors.len() > 1 {
            return Err(AppError::Validation(format!(
                "task '{task_id}' has {} predecessors ({}); repoint them before deleting",
                predecessors.len(),
                predecessors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        for predecessor in &predecessors {
            if let Some(task) = self.tasks.get_mut(predecessor) {
                task.forget_successor(task_id);
            }
        }

        let removed = self
            .tasks
            .remove(task_id)
            .ok_or_else(|| AppError::Internal(format!("task '{task_id}' vanished during delete")))?;
        self.touch();
        Ok(removed)
    }

    /// Moves a task to a new status when the transition is allowed.
    pub fn set_task_status(&mut self, task_id: &TaskId, status: TaskStatus) -> AppResult<TaskStatus> {
        let current = self.require_task(task_id)?.status();
        let next = current
            .transition(status)
            .map_err(|error| error.context(&format!("task '{task_id}'")))?;

        if let Some(task) = self.tasks.get_mut(task_id) {
            task.set_status(next);
        }
        self.touch();
        Ok(next)
    }

    /// Derives resource statuses from this pattern's bindings.
    #[must_use]
    pub fn resource_statuses(
        &self,
        validator: &AllocationValidator<'_>,
    ) -> BTreeMap<ResourceId, ResourceStatus> {
        validator.resource_statuses(&self.tasks)
    }

    /// Checks everything required before the pattern may be persisted.
    ///
    /// Hard failures are aggregated into one error; isolated tasks are
    /// returned as warnings and never block.
    pub fn validate_for_save(
        &self,
        validator: &AllocationValidator<'_>,
    ) -> AppResult<ConnectivityReport> {
        let mut errors = Vec::new();

        if self.name.is_empty() {
            errors.push(AppError::Validation(format!(
                "pattern '{}' requires a name",
                self.id
            )));
        }

        if self.tasks.is_empty() {
            errors.push(AppError::Validation(format!(
                "pattern '{}' requires at least one task",
                self.id
            )));
        }

        if self.role_id.is_none() && self.resource_id.is_none() {
            errors.push(AppError::Validation(format!(
                "pattern '{}' requires a pattern-level role or resource",
                self.id
            )));
        }
        if let Some(role_id) = &self.role_id
            && let Err(error) = validator.resolve_role(role_id)
        {
            errors.push(error);
        }
        if let Some(resource_id) = &self.resource_id
            && let Err(error) = validator.resolve_resource(resource_id)
        {
            errors.push(error);
        }

        let graph = self.graph();
        for check in [
            graph.validate_links(),
            graph.validate_acyclic(),
            graph.validate_markers(),
            validator.audit(&self.tasks),
        ] {
            if let Err(error) = check {
                errors.push(error);
            }
        }

        AppError::from_many(errors)?;
        Ok(graph.validate_connectivity())
    }

    fn require_task(&self, task_id: &TaskId) -> AppResult<&Task> {
        self.tasks.get(task_id).ok_or_else(|| {
            AppError::NotFound(format!(
                "task '{task_id}' does not exist in pattern '{}'",
                self.id
            ))
        })
    }

    fn touch(&mut self) {
        self.last_modified = Utc::now().max(self.last_modified);
    }
}

impl TryFrom<ChangePatternInput> for ChangePattern {
    type Error = AppError;

    fn try_from(value: ChangePatternInput) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ChangePattern> for ChangePatternInput {
    fn from(value: ChangePattern) -> Self {
        Self {
            id: Some(value.id.into()),
            name: value.name,
            tasks: value
                .tasks
                .into_iter()
                .map(|(task_id, task)| (task_id.into(), task))
                .collect(),
            role_id: value.role_id.map(String::from),
            resource_id: value.resource_id.map(String::from),
            created_at: Some(value.created_at),
            last_modified: Some(value.last_modified),
        }
    }
}
