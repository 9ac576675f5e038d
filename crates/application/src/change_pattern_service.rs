use std::collections::BTreeMap;
use std::sync::Arc;

use changeflow_core::{AppError, AppResult};
use changeflow_domain::{
    AllocationValidator, ChangePattern, ChangePatternInput, ConnectivityReport, FlowMarker,
    PatternId, ResourceId, ResourceRegistry, ResourceStatus, RoleHierarchy, Task, TaskBinding,
    TaskId, TaskInput, TaskStatus,
};
use tracing::{debug, info, warn};

use crate::{ChangePatternRepository, ResourceRepository, RoleRepository};

/// Application service for change pattern editing and persistence.
///
/// Every operation loads a fresh role and resource snapshot, validates the
/// edit in the domain, and writes the pattern back only when it passed.
#[derive(Clone)]
pub struct ChangePatternService {
    repository: Arc<dyn ChangePatternRepository>,
    role_repository: Arc<dyn RoleRepository>,
    resource_repository: Arc<dyn ResourceRepository>,
}

impl ChangePatternService {
    /// Creates a new service from required dependencies.
    #[must_use]
    pub fn new(
        repository: Arc<dyn ChangePatternRepository>,
        role_repository: Arc<dyn RoleRepository>,
        resource_repository: Arc<dyn ResourceRepository>,
    ) -> Self {
        Self {
            repository,
            role_repository,
            resource_repository,
        }
    }

    /// Lists stored patterns.
    pub async fn list_patterns(&self) -> AppResult<Vec<ChangePattern>> {
        self.repository.list_patterns().await
    }

    /// Returns one pattern or fails when it does not exist.
    pub async fn find_pattern(&self, pattern_id: &PatternId) -> AppResult<ChangePattern> {
        self.repository
            .find_pattern(pattern_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("pattern '{pattern_id}' does not exist")))
    }

    /// Builds a pattern from its persisted shape and saves it.
    pub async fn create_pattern(
        &self,
        input: ChangePatternInput,
    ) -> AppResult<(ChangePattern, ConnectivityReport)> {
        let pattern = ChangePattern::new(input)?;
        let report = self.save_pattern(pattern.clone()).await?;
        Ok((pattern, report))
    }

    /// Runs save validation and persists the pattern when it passes.
    ///
    /// Connectivity findings are logged and returned but never block.
    pub async fn save_pattern(&self, pattern: ChangePattern) -> AppResult<ConnectivityReport> {
        let report = self.check(&pattern).await?;
        self.repository.save_pattern(pattern.clone()).await?;
        info!(
            pattern_id = %pattern.id(),
            tasks = pattern.tasks().len(),
            "change pattern saved"
        );

        Ok(report)
    }

    /// Runs save validation on a stored pattern without writing it.
    pub async fn validate_pattern(&self, pattern_id: &PatternId) -> AppResult<ConnectivityReport> {
        let pattern = self.find_pattern(pattern_id).await?;
        self.check(&pattern).await
    }

    /// Deletes a stored pattern.
    pub async fn delete_pattern(&self, pattern_id: &PatternId) -> AppResult<()> {
        self.find_pattern(pattern_id).await?;
        self.repository.delete_pattern(pattern_id).await?;
        info!(pattern_id = %pattern_id, "change pattern deleted");
        Ok(())
    }

    /// Adds a task to a stored pattern.
    pub async fn add_task(&self, pattern_id: &PatternId, input: TaskInput) -> AppResult<Task> {
        let task = Task::new(input)?;
        let task_id = task.id().clone();
        self.edit(pattern_id, move |pattern, validator| {
            pattern.add_task(task, validator)?;
            pattern.task(&task_id).cloned().ok_or_else(|| {
                AppError::Internal(format!("task '{task_id}' vanished after insert"))
            })
        })
        .await
    }

    /// Binds a task to roles and resources after shape and capacity checks.
    pub async fn bind_task(
        &self,
        pattern_id: &PatternId,
        task_id: &TaskId,
        binding: TaskBinding,
    ) -> AppResult<()> {
        self.edit(pattern_id, move |pattern, validator| {
            pattern.bind_task(task_id, binding, validator)
        })
        .await
    }

    /// Releases a task's binding and returns the previous one.
    pub async fn unbind_task(
        &self,
        pattern_id: &PatternId,
        task_id: &TaskId,
    ) -> AppResult<Option<TaskBinding>> {
        self.edit(pattern_id, |pattern, _| pattern.unbind_task(task_id))
            .await
    }

    /// Points `source` at `target` as its single next task.
    pub async fn set_next_task(
        &self,
        pattern_id: &PatternId,
        source: &TaskId,
        target: &TaskId,
    ) -> AppResult<()> {
        self.edit(pattern_id, |pattern, _| pattern.set_next_task(source, target))
            .await
    }

    /// Adds a parallel successor to `source`.
    pub async fn add_parallel_next(
        &self,
        pattern_id: &PatternId,
        source: &TaskId,
        target: &TaskId,
    ) -> AppResult<()> {
        self.edit(pattern_id, |pattern, _| {
            pattern.add_parallel_next(source, target)
        })
        .await
    }

    /// Removes every outgoing link of `source`.
    pub async fn clear_next_task(&self, pattern_id: &PatternId, source: &TaskId) -> AppResult<()> {
        self.edit(pattern_id, |pattern, _| pattern.clear_next_task(source))
            .await
    }

    /// Sets or clears a task's flow marker.
    pub async fn set_flow_marker(
        &self,
        pattern_id: &PatternId,
        task_id: &TaskId,
        flow_marker: Option<FlowMarker>,
    ) -> AppResult<()> {
        self.edit(pattern_id, |pattern, _| {
            pattern.set_flow_marker(task_id, flow_marker)
        })
        .await
    }

    /// Deletes a task when at most one predecessor points at it.
    pub async fn remove_task(&self, pattern_id: &PatternId, task_id: &TaskId) -> AppResult<Task> {
        self.edit(pattern_id, |pattern, _| pattern.remove_task(task_id))
            .await
    }

    /// Moves a task to a new execution status.
    pub async fn set_task_status(
        &self,
        pattern_id: &PatternId,
        task_id: &TaskId,
        status: TaskStatus,
    ) -> AppResult<TaskStatus> {
        self.edit(pattern_id, |pattern, _| {
            pattern.set_task_status(task_id, status)
        })
        .await
    }

    /// Derives the status of every registered resource from one pattern.
    pub async fn resource_statuses(
        &self,
        pattern_id: &PatternId,
    ) -> AppResult<BTreeMap<ResourceId, ResourceStatus>> {
        let pattern = self.find_pattern(pattern_id).await?;
        let resources = self.load_resources().await?;
        Ok(pattern.resource_statuses(&AllocationValidator::new(&resources)))
    }

    async fn load_resources(&self) -> AppResult<ResourceRegistry> {
        Ok(ResourceRegistry::from_resources(
            self.resource_repository.list_resources().await?,
        ))
    }

    async fn load_roles(&self) -> AppResult<RoleHierarchy> {
        Ok(RoleHierarchy::from_roles(
            self.role_repository.list_roles().await?,
        ))
    }

    async fn check(&self, pattern: &ChangePattern) -> AppResult<ConnectivityReport> {
        let roles = self.load_roles().await?;
        let resources = self.load_resources().await?;
        let validator = AllocationValidator::new(&resources).with_roles(&roles);

        let report = pattern.validate_for_save(&validator).inspect_err(|error| {
            warn!(
                pattern_id = %pattern.id(),
                kind = error.kind().as_str(),
                error = %error,
                "change pattern rejected"
            );
        })?;

        for warning in report.warnings() {
            warn!(pattern_id = %pattern.id(), "{warning}");
        }

        Ok(report)
    }

    async fn edit<T, F>(&self, pattern_id: &PatternId, apply: F) -> AppResult<T>
    where
        F: FnOnce(&mut ChangePattern, &AllocationValidator<'_>) -> AppResult<T> + Send,
        T: Send,
    {
        let mut pattern = self.find_pattern(pattern_id).await?;
        let roles = self.load_roles().await?;
        let resources = self.load_resources().await?;
        let validator = AllocationValidator::new(&resources).with_roles(&roles);

        let value = apply(&mut pattern, &validator).inspect_err(|error| {
            debug!(
                pattern_id = %pattern_id,
                kind = error.kind().as_str(),
                error = %error,
                "change pattern edit rejected"
            );
        })?;

        self.repository.save_pattern(pattern).await?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests;
