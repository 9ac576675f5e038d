use std::collections::{BTreeMap, BTreeSet};

use changeflow_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};

use crate::{ResourceId, RoleId, TaskId};

/// Cardinality contract between a task's roles and resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AllocationType {
    /// One role, one resource.
    OneToOne,
    /// One role, one or more resources.
    OneToMany,
    /// Several roles, each with its own resources.
    ManyToMany,
}

impl AllocationType {
    /// Returns a stable storage value for this allocation type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneToOne => "OneToOne",
            Self::OneToMany => "OneToMany",
            Self::ManyToMany => "ManyToMany",
        }
    }
}

/// Role and resource binding of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskBinding {
    /// Declared cardinality.
    pub allocation_type: AllocationType,
    /// Single role for `OneToOne` and `OneToMany`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_id: Option<RoleId>,
    /// Role set for `ManyToMany`.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub role_ids: BTreeSet<RoleId>,
    /// Single resource for `OneToOne`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<ResourceId>,
    /// Resource set for `OneToMany`.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub resource_ids: BTreeSet<ResourceId>,
    /// Per-role resource subsets for `ManyToMany`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub role_resources: BTreeMap<RoleId, BTreeSet<ResourceId>>,
}

impl TaskBinding {
    /// Binds one role to one resource.
    #[must_use]
    pub fn one_to_one(role_id: RoleId, resource_id: ResourceId) -> Self {
        Self {
            role_id: Some(role_id),
            resource_id: Some(resource_id),
            ..Self::empty(AllocationType::OneToOne)
        }
    }

    /// Binds one role to several resources.
    #[must_use]
    pub fn one_to_many(
        role_id: RoleId,
        resource_ids: impl IntoIterator<Item = ResourceId>,
    ) -> Self {
        Self {
            role_id: Some(role_id),
            resource_ids: resource_ids.into_iter().collect(),
            ..Self::empty(AllocationType::OneToMany)
        }
    }

    /// Binds several roles, each to its own resources.
    #[must_use]
    pub fn many_to_many(role_resources: BTreeMap<RoleId, BTreeSet<ResourceId>>) -> Self {
        Self {
            role_ids: role_resources.keys().cloned().collect(),
            role_resources,
            ..Self::empty(AllocationType::ManyToMany)
        }
    }

    fn empty(allocation_type: AllocationType) -> Self {
        Self {
            allocation_type,
            role_id: None,
            role_ids: BTreeSet::new(),
            resource_id: None,
            resource_ids: BTreeSet::new(),
            role_resources: BTreeMap::new(),
        }
    }

    /// Checks the binding against its declared allocation type.
    pub fn validate_shape(&self) -> AppResult<()> {
        let kind = self.allocation_type.as_str();
        let mut problems: Vec<String> = Vec::new();

        match self.allocation_type {
            AllocationType::OneToOne => {
                if self.role_id.is_none() {
                    problems.push(format!("{kind} requires a role"));
                }
                if self.resource_id.is_none() {
                    problems.push(format!("{kind} requires a resource"));
                }
                if !self.resource_ids.is_empty() {
                    problems.push(format!("{kind} accepts exactly one resource"));
                }
                if !self.role_ids.is_empty() || !self.role_resources.is_empty() {
                    problems.push(format!("{kind} accepts exactly one role"));
                }
            }
            AllocationType::OneToMany => {
                if self.role_id.is_none() {
                    problems.push(format!("{kind} requires a role"));
                }
                if self.resource_ids.is_empty() {
                    problems.push(format!("{kind} requires at least one resource"));
                }
                if self.resource_id.is_some() {
                    problems.push(format!("{kind} lists its resources in resourceIds"));
                }
                if !self.role_ids.is_empty() || !self.role_resources.is_empty() {
                    problems.push(format!("{kind} accepts exactly one role"));
                }
            }
            AllocationType::ManyToMany => {
                if self.role_ids.is_empty() {
                    problems.push(format!("{kind} requires at least one role"));
                }
                if self.role_id.is_some() {
                    problems.push(format!("{kind} lists its roles in roleIds"));
                }
                if self.resource_id.is_some() || !self.resource_ids.is_empty() {
                    problems.push(format!("{kind} maps resources through roleResources"));
                }
                for role_id in &self.role_ids {
                    match self.role_resources.get(role_id) {
                        None => problems.push(format!(
                            "{kind} role '{role_id}' has no roleResources entry"
                        )),
                        Some(resources) if resources.is_empty() => problems.push(format!(
                            "{kind} role '{role_id}' must map to at least one resource"
                        )),
                        Some(_) => {}
                    }
                }
                for role_id in self.role_resources.keys() {
                    if !self.role_ids.contains(role_id) {
                        problems.push(format!(
                            "{kind} roleResources names role '{role_id}' missing from roleIds"
                        ));
                    }
                }
            }
        }

        AppError::from_many(problems.into_iter().map(AppError::Shape).collect())
    }

    /// Returns every resource named by the binding, each once.
    #[must_use]
    pub fn resources(&self) -> BTreeSet<&ResourceId> {
        self.resource_id
            .iter()
            .chain(self.resource_ids.iter())
            .chain(self.role_resources.values().flatten())
            .collect()
    }

    /// Returns every role named by the binding, each once.
    #[must_use]
    pub fn roles(&self) -> BTreeSet<&RoleId> {
        self.role_id
            .iter()
            .chain(self.role_ids.iter())
            .chain(self.role_resources.keys())
            .collect()
    }
}

/// Execution status advanced by external monitors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    /// Not started.
    #[default]
    Pending,
    /// Running.
    InProgress,
    /// Finished successfully.
    Completed,
    /// Finished unsuccessfully.
    Failed,
}

impl TaskStatus {
    /// Returns a stable storage value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "inProgress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Moves to `next` when the transition is allowed.
    pub fn transition(self, next: Self) -> AppResult<Self> {
        match (self, next) {
            (Self::Pending, Self::InProgress)
            | (Self::InProgress, Self::Completed | Self::Failed)
            | (Self::Completed | Self::Failed, Self::Pending) => Ok(next),
            _ => Err(AppError::Validation(format!(
                "task status cannot move from '{}' to '{}'",
                self.as_str(),
                next.as_str()
            ))),
        }
    }
}

/// Structural marker on a task in the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FlowMarker {
    /// Opens parallel branches.
    Split,
    /// Closes parallel branches.
    Join,
    /// Explicit end of the chain.
    End,
}

/// Task payload in its persisted shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInput {
    /// Stable task identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Optional role/resource binding.
    #[serde(default)]
    pub binding: Option<TaskBinding>,
    /// Sequential successor.
    #[serde(default)]
    pub next_task_id: Option<String>,
    /// Parallel successors.
    #[serde(default)]
    pub next_task_ids: Vec<String>,
    /// Optional structural marker.
    #[serde(default)]
    pub flow_marker: Option<FlowMarker>,
    /// Opaque trigger condition expression.
    #[serde(default)]
    pub trigger_condition: Option<String>,
    /// Execution status.
    #[serde(default)]
    pub status: TaskStatus,
}

/// One step of a change pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TaskInput", into = "TaskInput")]
pub struct Task {
    id: TaskId,
    name: NonEmptyString,
    binding: Option<TaskBinding>,
    next_task_id: Option<TaskId>,
    next_task_ids: BTreeSet<TaskId>,
    flow_marker: Option<FlowMarker>,
    trigger_condition: Option<String>,
    status: TaskStatus,
}

impl Task {
    /// Creates a validated task.
    pub fn new(input: TaskInput) -> AppResult<Self> {
        let TaskInput {
            id,
            name,
            binding,
            next_task_id,
            next_task_ids,
            flow_marker,
            trigger_condition,
            status,
        } = input;

        let id = TaskId::new(id)?;
        let next_task_id = next_task_id
            .filter(|value| !value.trim().is_empty())
            .map(TaskId::new)
            .transpose()?;
        let next_task_ids = next_task_ids
            .into_iter()
            .map(TaskId::new)
            .collect::<AppResult<BTreeSet<_>>>()?;

        if next_task_id.is_some() && !next_task_ids.is_empty() {
            return Err(AppError::Validation(format!(
                "task '{id}' must use either nextTaskId or nextTaskIds"
            )));
        }

        if next_task_id.as_ref() == Some(&id) || next_task_ids.contains(&id) {
            return Err(AppError::CircularDependency(format!(
                "task '{id}' cannot be its own next task"
            )));
        }

        let trigger_condition = trigger_condition.and_then(|value| {
            let trimmed = value.trim().to_owned();
            (!trimmed.is_empty()).then_some(trimmed)
        });

        Ok(Self {
            id,
            name: NonEmptyString::new(name.trim())?,
            binding,
            next_task_id,
            next_task_ids,
            flow_marker,
            trigger_condition,
            status,
        })
    }

    /// Creates an unbound, unlinked task.
    pub fn named(id: impl Into<String>, name: impl Into<String>) -> AppResult<Self> {
        Self::new(TaskInput {
            id: id.into(),
            name: name.into(),
            binding: None,
            next_task_id: None,
            next_task_ids: Vec::new(),
            flow_marker: None,
            trigger_condition: None,
            status: TaskStatus::Pending,
        })
    }

    /// Returns the task identifier.
    #[must_use]
    pub fn id(&self) -> &TaskId {
        &self.id
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &NonEmptyString {
        &self.name
    }

    /// Returns the current binding, if any.
    #[must_use]
    pub fn binding(&self) -> Option<&TaskBinding> {
        self.binding.as_ref()
    }

    /// Returns the sequential successor, if any.
    #[must_use]
    pub fn next_task_id(&self) -> Option<&TaskId> {
        self.next_task_id.as_ref()
    }

    /// Returns the parallel successors.
    #[must_use]
    pub fn next_task_ids(&self) -> &BTreeSet<TaskId> {
        &self.next_task_ids
    }

    /// Returns every outgoing link.
    pub fn successors(&self) -> impl Iterator<Item = &TaskId> {
        self.next_task_id.iter().chain(self.next_task_ids.iter())
    }

    /// Returns the structural marker, if any.
    #[must_use]
    pub fn flow_marker(&self) -> Option<FlowMarker> {
        self.flow_marker
    }

    /// Returns the opaque trigger condition.
    #[must_use]
    pub fn trigger_condition(&self) -> Option<&str> {
        self.trigger_condition.as_deref()
    }

    /// Returns the execution status.
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Returns resources held by this task.
    #[must_use]
    pub fn bound_resources(&self) -> BTreeSet<&ResourceId> {
        self.binding
            .as_ref()
            .map(TaskBinding::resources)
            .unwrap_or_default()
    }

    /// Returns whether the task holds `resource_id`.
    #[must_use]
    pub fn holds(&self, resource_id: &ResourceId) -> bool {
        self.bound_resources().contains(resource_id)
    }

    pub(crate) fn set_binding(&mut self, binding: Option<TaskBinding>) {
        self.binding = binding;
    }

    pub(crate) fn set_next_task_id(&mut self, next_task_id: Option<TaskId>) {
        self.next_task_ids.clear();
        self.next_task_id = next_task_id;
        if self.flow_marker == Some(FlowMarker::Split) {
            self.flow_marker = None;
        }
    }

    pub(crate) fn add_parallel_next(&mut self, next_task_id: TaskId) {
        if let Some(current) = self.next_task_id.take() {
            self.next_task_ids.insert(current);
        }
        self.next_task_ids.insert(next_task_id);
        if self.next_task_ids.len() > 1 {
            self.flow_marker = Some(FlowMarker::Split);
        }
    }

    pub(crate) fn forget_successor(&mut self, task_id: &TaskId) -> bool {
        if self.next_task_id.as_ref() == Some(task_id) {
            self.next_task_id = None;
            return true;
        }
        self.next_task_ids.remove(task_id)
    }

    pub(crate) fn set_flow_marker(&mut self, flow_marker: Option<FlowMarker>) {
        self.flow_marker = flow_marker;
    }

    pub(crate) fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
    }
}

impl TryFrom<TaskInput> for Task {
    type Error = AppError;

    fn try_from(value: TaskInput) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Task> for TaskInput {
    fn from(value: Task) -> Self {
        Self {
            id: value.id.into(),
            name: value.name.into(),
            binding: value.binding,
            next_task_id: value.next_task_id.map(String::from),
            next_task_ids: value.next_task_ids.into_iter().map(String::from).collect(),
            flow_marker: value.flow_marker,
            trigger_condition: value.trigger_condition,
            status: value.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use changeflow_core::{AppError, ErrorKind};

    use super::{AllocationType, Task, TaskBinding, TaskInput, TaskStatus};
    use crate::{ResourceId, RoleId};

    fn role(value: &str) -> RoleId {
        RoleId::new(value).unwrap_or_else(|_| unreachable!())
    }

    fn resource(value: &str) -> ResourceId {
        ResourceId::new(value).unwrap_or_else(|_| unreachable!())
    }

    #[test]
    fn one_to_one_requires_role_and_resource() {
        let binding = TaskBinding {
            allocation_type: AllocationType::OneToOne,
            role_id: Some(role("R1")),
            role_ids: BTreeSet::new(),
            resource_id: None,
            resource_ids: BTreeSet::new(),
            role_resources: BTreeMap::new(),
        };

        assert_eq!(
            binding.validate_shape().map_err(|error| error.kind()),
            Err(ErrorKind::Shape)
        );
        assert!(TaskBinding::one_to_one(role("R1"), resource("X")).validate_shape().is_ok());
    }

    #[test]
    fn one_to_many_requires_resources() {
        let empty = TaskBinding::one_to_many(role("R1"), Vec::new());
        let filled = TaskBinding::one_to_many(role("R1"), [resource("X"), resource("Y")]);

        assert!(empty.validate_shape().is_err());
        assert!(filled.validate_shape().is_ok());
    }

    #[test]
    fn many_to_many_with_missing_role_entry_is_shape_error() {
        let binding = TaskBinding {
            role_ids: BTreeSet::from([role("R1"), role("R2")]),
            ..TaskBinding::many_to_many(BTreeMap::from([(role("R1"), BTreeSet::new())]))
        };

        let result = binding.validate_shape();
        assert!(matches!(result, Err(AppError::Multiple(ref errors)) if errors.len() == 2));
        assert_eq!(result.map_err(|error| error.kind()), Err(ErrorKind::Shape));
    }

    #[test]
    fn many_to_many_counts_each_resource_once() {
        let binding = TaskBinding::many_to_many(BTreeMap::from([
            (role("R1"), BTreeSet::from([resource("X"), resource("Y")])),
            (role("R2"), BTreeSet::from([resource("X")])),
        ]));

        assert!(binding.validate_shape().is_ok());
        assert_eq!(binding.resources().len(), 2);
        assert_eq!(binding.roles().len(), 2);
    }

    #[test]
    fn status_follows_lifecycle() {
        assert_eq!(
            TaskStatus::Pending.transition(TaskStatus::InProgress),
            Ok(TaskStatus::InProgress)
        );
        assert!(TaskStatus::InProgress.transition(TaskStatus::Failed).is_ok());
        assert!(TaskStatus::Completed.transition(TaskStatus::Pending).is_ok());
        assert!(TaskStatus::Pending.transition(TaskStatus::Completed).is_err());
        assert!(TaskStatus::Completed.transition(TaskStatus::InProgress).is_err());
    }

    #[test]
    fn task_rejects_self_link_and_mixed_successors() {
        let base = TaskInput {
            id: "T1".to_owned(),
            name: "Review".to_owned(),
            binding: None,
            next_task_id: Some("T1".to_owned()),
            next_task_ids: Vec::new(),
            flow_marker: None,
            trigger_condition: None,
            status: TaskStatus::Pending,
        };
        assert_eq!(
            Task::new(base.clone()).map_err(|error| error.kind()).err(),
            Some(ErrorKind::CircularDependency)
        );

        let mixed = Task::new(TaskInput {
            next_task_id: Some("T2".to_owned()),
            next_task_ids: vec!["T3".to_owned()],
            ..base
        });
        assert_eq!(
            mixed.map_err(|error| error.kind()).err(),
            Some(ErrorKind::Validation)
        );
    }

    #[test]
    fn task_deserializes_camel_case_shape() {
        let task: Result<Task, _> = serde_json::from_value(serde_json::json!({
            "id": "T1",
            "name": "Prepare",
            "binding": {
                "allocationType": "OneToMany",
                "roleId": "Engineer",
                "resourceIds": ["laptop", "vpn"]
            },
            "nextTaskId": "T2",
            "triggerCondition": "  approvals >= 2 ",
            "status": "inProgress"
        }));
        assert!(task.is_ok());
        let task = task.unwrap_or_else(|_| unreachable!());

        assert_eq!(task.bound_resources().len(), 2);
        assert_eq!(task.trigger_condition(), Some("approvals >= 2"));
        assert_eq!(task.status(), TaskStatus::InProgress);
        assert_eq!(task.successors().count(), 1);
    }
}
