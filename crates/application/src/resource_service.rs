use std::sync::Arc;

use changeflow_core::{AppError, AppResult};
use changeflow_domain::{
    Resource, ResourceAvailability, ResourceId, ResourceInput, ResourceRegistry,
};
use tracing::{info, warn};

use crate::{ChangePatternRepository, ResourceRepository};

/// Application service for the resource registry.
#[derive(Clone)]
pub struct ResourceService {
    repository: Arc<dyn ResourceRepository>,
    pattern_repository: Arc<dyn ChangePatternRepository>,
}

impl ResourceService {
    /// Creates a new service from required dependencies.
    #[must_use]
    pub fn new(
        repository: Arc<dyn ResourceRepository>,
        pattern_repository: Arc<dyn ChangePatternRepository>,
    ) -> Self {
        Self {
            repository,
            pattern_repository,
        }
    }

    /// Loads every stored resource as one registry snapshot.
    pub async fn load_registry(&self) -> AppResult<ResourceRegistry> {
        Ok(ResourceRegistry::from_resources(
            self.repository.list_resources().await?,
        ))
    }

    /// Lists stored resources.
    pub async fn list_resources(&self) -> AppResult<Vec<Resource>> {
        self.repository.list_resources().await
    }

    /// Returns one resource or fails when it does not exist.
    pub async fn find_resource(&self, resource_id: &ResourceId) -> AppResult<Resource> {
        self.repository
            .find_resource(resource_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("resource '{resource_id}' does not exist")))
    }

    /// Registers a resource under a new identifier.
    pub async fn register_resource(&self, input: ResourceInput) -> AppResult<Resource> {
        let resource = Resource::new(input)?;
        let mut registry = self.load_registry().await?;
        registry.register(resource.clone())?;

        self.repository.save_resource(resource.clone()).await?;
        info!(
            resource_id = %resource.id(),
            is_shared = resource.is_shared(),
            capacity = resource.capacity(),
            "resource registered"
        );

        Ok(resource)
    }

    /// Removes a resource no stored pattern is bound to.
    pub async fn remove_resource(&self, resource_id: &ResourceId) -> AppResult<Resource> {
        let mut registry = self.load_registry().await?;
        let removed = registry.remove(resource_id)?;

        let mut holders = Vec::new();
        for pattern in self.pattern_repository.list_patterns().await? {
            holders.extend(
                pattern
                    .tasks()
                    .values()
                    .filter(|task| task.holds(resource_id))
                    .map(|task| format!("{}/{}", pattern.id(), task.id())),
            );
        }

        if !holders.is_empty() {
            warn!(resource_id = %resource_id, holders = holders.len(), "resource still bound");
            return Err(AppError::Conflict(format!(
                "resource '{resource_id}' is still bound by tasks: {}",
                holders.join(", ")
            )));
        }

        self.repository.delete_resource(resource_id).await?;
        info!(resource_id = %resource_id, "resource removed");

        Ok(removed)
    }

    /// Flips the manual availability flag of a resource.
    pub async fn toggle_availability(
        &self,
        resource_id: &ResourceId,
    ) -> AppResult<ResourceAvailability> {
        let mut registry = self.load_registry().await?;
        let availability = registry.toggle_availability(resource_id)?;

        let resource = registry.get(resource_id).cloned().ok_or_else(|| {
            AppError::Internal(format!("resource '{resource_id}' vanished during toggle"))
        })?;
        self.repository.save_resource(resource).await?;
        info!(
            resource_id = %resource_id,
            availability = availability.as_str(),
            "resource availability toggled"
        );

        Ok(availability)
    }
}

#[cfg(test)]
mod tests;
