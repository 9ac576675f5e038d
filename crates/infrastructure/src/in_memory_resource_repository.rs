use std::collections::HashMap;

use async_trait::async_trait;
use changeflow_application::ResourceRepository;
use changeflow_core::{AppError, AppResult};
use changeflow_domain::{Resource, ResourceId};
use tokio::sync::RwLock;

/// In-memory resource repository implementation.
#[derive(Debug, Default)]
pub struct InMemoryResourceRepository {
    resources: RwLock<HashMap<ResourceId, Resource>>,
}

impl InMemoryResourceRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResourceRepository for InMemoryResourceRepository {
    async fn list_resources(&self) -> AppResult<Vec<Resource>> {
        let mut resources: Vec<Resource> =
            self.resources.read().await.values().cloned().collect();
        resources.sort_by(|left, right| left.id().cmp(right.id()));
        Ok(resources)
    }

    async fn find_resource(&self, resource_id: &ResourceId) -> AppResult<Option<Resource>> {
        Ok(self.resources.read().await.get(resource_id).cloned())
    }

    async fn save_resource(&self, resource: Resource) -> AppResult<()> {
        self.resources
            .write()
            .await
            .insert(resource.id().clone(), resource);
        Ok(())
    }

    async fn delete_resource(&self, resource_id: &ResourceId) -> AppResult<()> {
        self.resources
            .write()
            .await
            .remove(resource_id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("resource '{resource_id}' does not exist")))
    }
}
