use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use changeflow_core::{AppResult, ErrorKind};
use changeflow_domain::{
    AllocationValidator, ChangePattern, PatternId, Resource, ResourceAvailability, ResourceId,
    ResourceInput, ResourceRegistry, RoleId, Task, TaskBinding, TaskId,
};

use crate::{ChangePatternRepository, ResourceRepository};

use super::ResourceService;

#[derive(Default)]
struct FakeResourceRepository {
    resources: Mutex<BTreeMap<ResourceId, Resource>>,
}

#[async_trait]
impl ResourceRepository for FakeResourceRepository {
    async fn list_resources(&self) -> AppResult<Vec<Resource>> {
        Ok(self.resources.lock().await.values().cloned().collect())
    }

    async fn find_resource(&self, resource_id: &ResourceId) -> AppResult<Option<Resource>> {
        Ok(self.resources.lock().await.get(resource_id).cloned())
    }

    async fn save_resource(&self, resource: Resource) -> AppResult<()> {
        self.resources
            .lock()
            .await
            .insert(resource.id().clone(), resource);
        Ok(())
    }

    async fn delete_resource(&self, resource_id: &ResourceId) -> AppResult<()> {
        self.resources.lock().await.remove(resource_id);
        Ok(())
    }
}

#[derive(Default)]
struct FakeChangePatternRepository {
    patterns: Mutex<BTreeMap<PatternId, ChangePattern>>,
}

#[async_trait]
impl ChangePatternRepository for FakeChangePatternRepository {
    async fn list_patterns(&self) -> AppResult<Vec<ChangePattern>> {
        Ok(self.patterns.lock().await.values().cloned().collect())
    }

    async fn find_pattern(&self, pattern_id: &PatternId) -> AppResult<Option<ChangePattern>> {
        Ok(self.patterns.lock().await.get(pattern_id).cloned())
    }

    async fn save_pattern(&self, pattern: ChangePattern) -> AppResult<()> {
        self.patterns
            .lock()
            .await
            .insert(pattern.id().clone(), pattern);
        Ok(())
    }

    async fn delete_pattern(&self, pattern_id: &PatternId) -> AppResult<()> {
        self.patterns.lock().await.remove(pattern_id);
        Ok(())
    }
}

fn resource_id(value: &str) -> ResourceId {
    ResourceId::new(value).unwrap_or_else(|_| unreachable!())
}

fn input(id: &str, is_shared: bool, max_shares: u32) -> ResourceInput {
    ResourceInput {
        id: id.to_owned(),
        name: None,
        description: Some(format!("{id} for tests")),
        is_shared,
        max_shares,
        status: ResourceAvailability::Available,
    }
}

fn service() -> (ResourceService, Arc<FakeChangePatternRepository>) {
    let patterns = Arc::new(FakeChangePatternRepository::default());
    (
        ResourceService::new(Arc::new(FakeResourceRepository::default()), patterns.clone()),
        patterns,
    )
}

#[tokio::test]
async fn register_rejects_duplicate_identifier() {
    let (service, _) = service();

    assert!(service.register_resource(input("R1", false, 1)).await.is_ok());
    let duplicate = service.register_resource(input("R1", true, 3)).await;
    assert_eq!(
        duplicate.map_err(|error| error.kind()).err(),
        Some(ErrorKind::Validation)
    );

    let listed = service.list_resources().await.unwrap_or_default();
    assert_eq!(listed.len(), 1);
    assert!(!listed[0].is_shared());
}

#[tokio::test]
async fn register_rejects_zero_shares() {
    let (service, _) = service();

    let result = service.register_resource(input("R2", true, 0)).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn toggle_availability_round_trips_and_persists() {
    let (service, _) = service();
    assert!(service.register_resource(input("R1", false, 1)).await.is_ok());

    assert_eq!(
        service.toggle_availability(&resource_id("R1")).await,
        Ok(ResourceAvailability::Unavailable)
    );
    let stored = service.find_resource(&resource_id("R1")).await;
    assert_eq!(
        stored.map(|resource| resource.availability()),
        Ok(ResourceAvailability::Unavailable)
    );
    assert_eq!(
        service.toggle_availability(&resource_id("R1")).await,
        Ok(ResourceAvailability::Available)
    );
}

#[tokio::test]
async fn missing_resource_is_not_found() {
    let (service, _) = service();

    let toggled = service.toggle_availability(&resource_id("Ghost")).await;
    assert_eq!(
        toggled.map_err(|error| error.kind()).err(),
        Some(ErrorKind::NotFound)
    );
    assert!(service.find_resource(&resource_id("Ghost")).await.is_err());
}

#[tokio::test]
async fn bound_resource_cannot_be_removed() {
    let (service, patterns) = service();
    let registered = service.register_resource(input("R1", false, 1)).await;
    assert!(registered.is_ok());

    let registry =
        ResourceRegistry::from_resources([registered.unwrap_or_else(|_| unreachable!())]);
    let validator = AllocationValidator::new(&registry);
    let mut pattern = ChangePattern::draft("Patch rollout");
    let task = Task::named("T1", "Patch").unwrap_or_else(|_| unreachable!());
    assert!(pattern.add_task(task, &validator).is_ok());
    let bound = pattern.bind_task(
        &TaskId::new("T1").unwrap_or_else(|_| unreachable!()),
        TaskBinding::one_to_one(
            RoleId::new("Admin").unwrap_or_else(|_| unreachable!()),
            resource_id("R1"),
        ),
        &validator,
    );
    assert!(bound.is_ok());
    assert!(patterns.save_pattern(pattern).await.is_ok());

    let removed = service.remove_resource(&resource_id("R1")).await;
    assert_eq!(
        removed.map_err(|error| error.kind()).err(),
        Some(ErrorKind::Conflict)
    );
    assert!(service.find_resource(&resource_id("R1")).await.is_ok());
}

#[tokio::test]
async fn unbound_resource_is_removed() {
    let (service, _) = service();
    assert!(service.register_resource(input("R1", false, 1)).await.is_ok());

    assert!(service.remove_resource(&resource_id("R1")).await.is_ok());
    assert!(service.list_resources().await.unwrap_or_default().is_empty());
}
