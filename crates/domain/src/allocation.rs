//! Exclusive and shared resource capacity checks over a task snapshot.

use std::collections::{BTreeMap, BTreeSet};

use changeflow_core::{AppError, AppResult};

use crate::{
    Resource, ResourceAvailability, ResourceId, ResourceRegistry, ResourceStatus, RoleHierarchy,
    RoleId, Task, TaskBinding, TaskId,
};

/// Decides whether role/resource bindings are admissible.
///
/// Every check is a pure function of the registry and the task map it is
/// given; committing a binding is the caller's job.
#[derive(Debug, Clone, Copy)]
pub struct AllocationValidator<'a> {
    resources: &'a ResourceRegistry,
    roles: Option<&'a RoleHierarchy>,
}

impl<'a> AllocationValidator<'a> {
    /// Creates a validator over a resource snapshot.
    #[must_use]
    pub fn new(resources: &'a ResourceRegistry) -> Self {
        Self {
            resources,
            roles: None,
        }
    }

    /// Also rejects bindings naming roles absent from `roles`.
    #[must_use]
    pub fn with_roles(mut self, roles: &'a RoleHierarchy) -> Self {
        self.roles = Some(roles);
        self
    }

    /// Returns the tasks other than `excluding` that hold `resource_id`.
    ///
    /// A task counts once per resource even when several of its roles map
    /// to it.
    #[must_use]
    pub fn holders<'t>(
        tasks: &'t BTreeMap<TaskId, Task>,
        resource_id: &ResourceId,
        excluding: Option<&TaskId>,
    ) -> Vec<&'t TaskId> {
        tasks
            .values()
            .filter(|task| Some(task.id()) != excluding)
            .filter(|task| task.holds(resource_id))
            .map(Task::id)
            .collect()
    }

    /// Returns how many tasks other than `excluding` hold `resource_id`.
    #[must_use]
    pub fn usage_count(
        tasks: &BTreeMap<TaskId, Task>,
        resource_id: &ResourceId,
        excluding: Option<&TaskId>,
    ) -> usize {
        Self::holders(tasks, resource_id, excluding).len()
    }

    /// Checks a candidate binding for `candidate_task_id`.
    ///
    /// The candidate's own current binding is never counted, so re-saving
    /// an accepted binding always passes. Shape errors are reported before
    /// any capacity check runs; otherwise every conflict is collected.
    pub fn check_binding(
        &self,
        tasks: &BTreeMap<TaskId, Task>,
        candidate_task_id: &TaskId,
        binding: &TaskBinding,
    ) -> AppResult<()> {
        binding.validate_shape()?;

        let already_held: BTreeSet<&ResourceId> = tasks
            .get(candidate_task_id)
            .and_then(Task::binding)
            .map(TaskBinding::resources)
            .unwrap_or_default();

        let mut errors = self.dangling_roles(binding);
        for resource_id in binding.resources() {
            let Some(resource) = self.resources.get(resource_id) else {
                errors.push(AppError::DanglingReference(format!(
                    "resource '{resource_id}' does not exist"
                )));
                continue;
            };

            if resource.availability() == ResourceAvailability::Unavailable
                && !already_held.contains(resource_id)
            {
                errors.push(AppError::Capacity(format!(
                    "resource '{resource_id}' is marked unavailable"
                )));
                continue;
            }

            let holders = Self::holders(tasks, resource_id, Some(candidate_task_id));
            if holders.len() >= resource.capacity() {
                errors.push(capacity_error(resource, &holders));
            }
        }

        AppError::from_many(errors)
    }

    /// Checks every binding of a task map at once.
    ///
    /// Over-booked resources are reported once each, naming all holders.
    pub fn audit(&self, tasks: &BTreeMap<TaskId, Task>) -> AppResult<()> {
        let mut errors = Vec::new();
        let mut holders: BTreeMap<&ResourceId, Vec<&TaskId>> = BTreeMap::new();

        for task in tasks.values() {
            let Some(binding) = task.binding() else {
                continue;
            };

            let context = format!("task '{}'", task.id());
            if let Err(error) = binding.validate_shape() {
                errors.push(error.context(&context));
            }
            errors.extend(
                self.dangling_roles(binding)
                    .into_iter()
                    .map(|error| error.context(&context)),
            );

            for resource_id in binding.resources() {
                holders.entry(resource_id).or_default().push(task.id());
            }
        }

        for (resource_id, task_ids) in holders {
            match self.resources.get(resource_id) {
                None => errors.push(AppError::DanglingReference(format!(
                    "resource '{resource_id}' bound by {} does not exist",
                    join_ids(&task_ids)
                ))),
                Some(resource) if task_ids.len() > resource.capacity() => {
                    errors.push(AppError::Capacity(format!(
                        "resource '{resource_id}' is held by {} task(s) but allows {}: {}",
                        task_ids.len(),
                        resource.capacity(),
                        join_ids(&task_ids)
                    )));
                }
                Some(_) => {}
            }
        }

        AppError::from_many(errors)
    }

    /// Derives the status of one resource from current allocations.
    pub fn resource_status(
        &self,
        tasks: &BTreeMap<TaskId, Task>,
        resource_id: &ResourceId,
    ) -> AppResult<ResourceStatus> {
        let resource = self.resolve_resource(resource_id)?;

        Ok(derive_status(
            resource,
            Self::usage_count(tasks, resource_id, None),
        ))
    }

    /// Derives the status of every registered resource.
    #[must_use]
    pub fn resource_statuses(
        &self,
        tasks: &BTreeMap<TaskId, Task>,
    ) -> BTreeMap<ResourceId, ResourceStatus> {
        self.resources
            .resources()
            .map(|resource| {
                let usage = Self::usage_count(tasks, resource.id(), None);
                (resource.id().clone(), derive_status(resource, usage))
            })
            .collect()
    }

    /// Fails when the resource is not registered.
    pub fn resolve_resource(&self, resource_id: &ResourceId) -> AppResult<&'a Resource> {
        self.resources.get(resource_id).ok_or_else(|| {
            AppError::DanglingReference(format!("resource '{resource_id}' does not exist"))
        })
    }

    /// Fails when roles were supplied and the role is not among them.
    pub fn resolve_role(&self, role_id: &RoleId) -> AppResult<()> {
        match self.roles {
            Some(roles) if !roles.contains(role_id) => Err(AppError::DanglingReference(format!(
                "role '{role_id}' does not exist"
            ))),
            _ => Ok(()),
        }
    }

    fn dangling_roles(&self, binding: &TaskBinding) -> Vec<AppError> {
        let Some(roles) = self.roles else {
            return Vec::new();
        };

        binding
            .roles()
            .into_iter()
            .filter(|role_id| !roles.contains(role_id))
            .map(|role_id| AppError::DanglingReference(format!("role '{role_id}' does not exist")))
            .collect()
    }
}

fn derive_status(resource: &Resource, usage: usize) -> ResourceStatus {
    if resource.availability() == ResourceAvailability::Unavailable {
        ResourceStatus::Unavailable
    } else if usage >= resource.capacity() {
        ResourceStatus::Occupied
    } else {
        ResourceStatus::Available
    }
}

fn capacity_error(resource: &Resource, holders: &[&TaskId]) -> AppError {
    if resource.is_shared() {
        AppError::Capacity(format!(
            "shared resource '{}' already has {} of {} shares taken by {}",
            resource.id(),
            holders.len(),
            resource.capacity(),
            join_ids(holders)
        ))
    } else {
        AppError::Capacity(format!(
            "exclusive resource '{}' is already held by {}",
            resource.id(),
            join_ids(holders)
        ))
    }
}

fn join_ids(task_ids: &[&TaskId]) -> String {
    task_ids
        .iter()
        .map(|task_id| format!("'{task_id}'"))
        .collect::<Vec<_>>()
        .join(", ")
}
