use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use changeflow_core::{AppResult, ErrorKind};
use changeflow_domain::{
    ChangePattern, ChangePatternInput, PatternId, Resource, ResourceId, ResourceStatus, Role,
    RoleId, RoleInput, TaskBinding, TaskId, TaskInput, TaskStatus,
};

use crate::{ChangePatternRepository, ResourceRepository, RoleRepository};

use super::ChangePatternService;

#[derive(Default)]
struct FakeStore {
    roles: Mutex<BTreeMap<RoleId, Role>>,
    resources: Mutex<BTreeMap<ResourceId, Resource>>,
    patterns: Mutex<BTreeMap<PatternId, ChangePattern>>,
}

#[async_trait]
impl RoleRepository for FakeStore {
    async fn list_roles(&self) -> AppResult<Vec<Role>> {
        Ok(self.roles.lock().await.values().cloned().collect())
    }

    async fn find_role(&self, role_id: &RoleId) -> AppResult<Option<Role>> {
        Ok(self.roles.lock().await.get(role_id).cloned())
    }

    async fn save_role(&self, role: Role) -> AppResult<()> {
        self.roles.lock().await.insert(role.id().clone(), role);
        Ok(())
    }

    async fn delete_role(&self, role_id: &RoleId) -> AppResult<()> {
        self.roles.lock().await.remove(role_id);
        Ok(())
    }
}

#[async_trait]
impl ResourceRepository for FakeStore {
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

#[async_trait]
impl ChangePatternRepository for FakeStore {
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

fn task_id(value: &str) -> TaskId {
    TaskId::new(value).unwrap_or_else(|_| unreachable!())
}

fn role_id(value: &str) -> RoleId {
    RoleId::new(value).unwrap_or_else(|_| unreachable!())
}

fn resource_id(value: &str) -> ResourceId {
    ResourceId::new(value).unwrap_or_else(|_| unreachable!())
}

fn task_input(id: &str) -> TaskInput {
    let parsed: Result<TaskInput, _> =
        serde_json::from_value(serde_json::json!({"id": id, "name": format!("Step {id}")}));
    parsed.unwrap_or_else(|_| unreachable!())
}

async fn seeded_service() -> (ChangePatternService, Arc<FakeStore>, PatternId) {
    let store = Arc::new(FakeStore::default());
    let admin = Role::new(RoleInput {
        id: "Admin".to_owned(),
        name: "Administrator".to_owned(),
        parent_role: None,
        permissions: Vec::new(),
        mutually_exclusive_roles: Vec::new(),
        max_members: None,
        inherit_child_permissions: true,
    });
    assert!(store.save_role(admin.unwrap_or_else(|_| unreachable!())).await.is_ok());
    for resource in [
        Resource::exclusive("R1"),
        Resource::shared("R2", 2),
    ] {
        let saved = store
            .save_resource(resource.unwrap_or_else(|_| unreachable!()))
            .await;
        assert!(saved.is_ok());
    }

    let service = ChangePatternService::new(store.clone(), store.clone(), store.clone());
    let created = service
        .create_pattern(ChangePatternInput {
            id: Some("server-migration".to_owned()),
            name: "Server migration".to_owned(),
            tasks: BTreeMap::new(),
            role_id: Some("Admin".to_owned()),
            resource_id: None,
            created_at: None,
            last_modified: None,
        })
        .await;
    assert_eq!(
        created.map_err(|error| error.kind()).err(),
        Some(ErrorKind::Validation)
    );

    let pattern = ChangePattern::new(ChangePatternInput {
        id: Some("server-migration".to_owned()),
        name: "Server migration".to_owned(),
        tasks: BTreeMap::new(),
        role_id: Some("Admin".to_owned()),
        resource_id: None,
        created_at: None,
        last_modified: None,
    })
    .unwrap_or_else(|_| unreachable!());
    let pattern_id = pattern.id().clone();
    assert!(store.save_pattern(pattern).await.is_ok());

    for id in ["T1", "T2", "T3"] {
        assert!(service.add_task(&pattern_id, task_input(id)).await.is_ok());
    }

    (service, store, pattern_id)
}

fn uses(resource: &str) -> TaskBinding {
    TaskBinding::one_to_one(role_id("Admin"), resource_id(resource))
}

#[tokio::test]
async fn chain_is_saved_and_closing_link_is_rejected() {
    let (service, store, pattern_id) = seeded_service().await;

    assert!(
        service
            .set_next_task(&pattern_id, &task_id("T1"), &task_id("T2"))
            .await
            .is_ok()
    );
    assert!(
        service
            .set_next_task(&pattern_id, &task_id("T2"), &task_id("T3"))
            .await
            .is_ok()
    );

    let closing = service
        .set_next_task(&pattern_id, &task_id("T3"), &task_id("T1"))
        .await;
    assert_eq!(
        closing.map_err(|error| error.kind()).err(),
        Some(ErrorKind::CircularDependency)
    );

    let stored = store.patterns.lock().await.get(&pattern_id).cloned();
    let stored = stored.unwrap_or_else(|| unreachable!());
    assert_eq!(
        stored.task(&task_id("T3")).map(|task| task.next_task_id().is_none()),
        Some(true)
    );

    let report = service.validate_pattern(&pattern_id).await;
    assert_eq!(report.map(|value| value.is_connected()), Ok(true));
}

#[tokio::test]
async fn shared_capacity_is_enforced_across_edits() {
    let (service, _, pattern_id) = seeded_service().await;

    assert!(service.bind_task(&pattern_id, &task_id("T1"), uses("R2")).await.is_ok());
    assert!(service.bind_task(&pattern_id, &task_id("T2"), uses("R2")).await.is_ok());

    let third = service.bind_task(&pattern_id, &task_id("T3"), uses("R2")).await;
    assert_eq!(
        third.map_err(|error| error.kind()).err(),
        Some(ErrorKind::Capacity)
    );

    let statuses = service.resource_statuses(&pattern_id).await.unwrap_or_default();
    assert_eq!(statuses.get(&resource_id("R2")), Some(&ResourceStatus::Occupied));
    assert_eq!(statuses.get(&resource_id("R1")), Some(&ResourceStatus::Available));

    let released = service.unbind_task(&pattern_id, &task_id("T1")).await;
    assert_eq!(released.map(|binding| binding.is_some()), Ok(true));
    assert!(service.bind_task(&pattern_id, &task_id("T3"), uses("R2")).await.is_ok());
}

#[tokio::test]
async fn unknown_role_in_binding_is_dangling() {
    let (service, _, pattern_id) = seeded_service().await;

    let result = service
        .bind_task(
            &pattern_id,
            &task_id("T1"),
            TaskBinding::one_to_one(role_id("Ghost"), resource_id("R1")),
        )
        .await;
    assert_eq!(
        result.map_err(|error| error.kind()).err(),
        Some(ErrorKind::DanglingReference)
    );
}

#[tokio::test]
async fn isolated_tasks_warn_without_blocking_save() {
    let (service, store, pattern_id) = seeded_service().await;
    assert!(
        service
            .set_next_task(&pattern_id, &task_id("T1"), &task_id("T2"))
            .await
            .is_ok()
    );

    let pattern = service.find_pattern(&pattern_id).await;
    assert!(pattern.is_ok());
    let report = service
        .save_pattern(pattern.unwrap_or_else(|_| unreachable!()))
        .await;
    assert_eq!(report.map(|value| value.isolated), Ok(vec![task_id("T3")]));
    assert_eq!(store.patterns.lock().await.len(), 1);
}

#[tokio::test]
async fn task_with_two_predecessors_is_kept_until_repointed() {
    let (service, _, pattern_id) = seeded_service().await;
    assert!(
        service
            .set_next_task(&pattern_id, &task_id("T1"), &task_id("T3"))
            .await
            .is_ok()
    );
    assert!(
        service
            .set_next_task(&pattern_id, &task_id("T2"), &task_id("T3"))
            .await
            .is_ok()
    );

    assert!(service.remove_task(&pattern_id, &task_id("T3")).await.is_err());
    assert!(service.clear_next_task(&pattern_id, &task_id("T2")).await.is_ok());
    assert!(service.remove_task(&pattern_id, &task_id("T3")).await.is_ok());

    let pattern = service.find_pattern(&pattern_id).await;
    assert_eq!(pattern.map(|value| value.tasks().len()), Ok(2));
}

#[tokio::test]
async fn status_transitions_are_persisted() {
    let (service, _, pattern_id) = seeded_service().await;

    assert_eq!(
        service
            .set_task_status(&pattern_id, &task_id("T1"), TaskStatus::InProgress)
            .await,
        Ok(TaskStatus::InProgress)
    );
    assert!(
        service
            .set_task_status(&pattern_id, &task_id("T1"), TaskStatus::Pending)
            .await
            .is_err()
    );

    let pattern = service.find_pattern(&pattern_id).await;
    assert_eq!(
        pattern.map(|value| value.task(&task_id("T1")).map(|task| task.status())),
        Ok(Some(TaskStatus::InProgress))
    );
}

#[tokio::test]
async fn added_task_with_dangling_link_is_not_persisted() {
    let (service, store, pattern_id) = seeded_service().await;
    let parsed: Result<TaskInput, _> = serde_json::from_value(serde_json::json!({
        "id": "T4",
        "name": "Cutover",
        "nextTaskId": "Ghost"
    }));

    let result = service
        .add_task(&pattern_id, parsed.unwrap_or_else(|_| unreachable!()))
        .await;
    assert_eq!(
        result.map_err(|error| error.kind()).err(),
        Some(ErrorKind::DanglingReference)
    );

    let stored = store.patterns.lock().await.get(&pattern_id).cloned();
    assert_eq!(stored.map(|pattern| pattern.tasks().len()), Some(3));
}

#[tokio::test]
async fn missing_pattern_is_not_found() {
    let (service, _, _) = seeded_service().await;
    let missing = PatternId::new("missing").unwrap_or_else(|_| unreachable!());

    assert_eq!(
        service
            .delete_pattern(&missing)
            .await
            .map_err(|error| error.kind()),
        Err(ErrorKind::NotFound)
    );
    assert!(
        service
            .add_task(&missing, task_input("T9"))
            .await
            .is_err()
    );
}
