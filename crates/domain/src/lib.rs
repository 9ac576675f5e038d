//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod allocation;
mod change_pattern;
mod ids;
mod resource;
mod role;
mod role_hierarchy;
mod task;
mod task_graph;

pub use allocation::AllocationValidator;
pub use change_pattern::{ChangePattern, ChangePatternInput};
pub use ids::{PatternId, ResourceId, RoleId, TaskId};
pub use resource::{
    Resource, ResourceAvailability, ResourceInput, ResourceRegistry, ResourceStatus,
};
pub use role::{Permission, Role, RoleInput};
pub use role_hierarchy::{
    InheritanceMode, RoleDeletionPolicy, RoleHierarchy, RolePermissions, RoleTreeNode,
};
pub use task::{AllocationType, FlowMarker, Task, TaskBinding, TaskInput, TaskStatus};
pub use task_graph::{
    ConnectivityReport, TaskGraph, safe_to_delete, validate_acyclic, validate_connectivity,
};
