//! Role forest with permission propagation and cycle detection.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use changeflow_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::{Permission, Role, RoleId};

/// Direction in which non-private permissions travel through the hierarchy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InheritanceMode {
    /// A role collects the permissions of its descendants.
    #[default]
    ChildToParent,
    /// A role collects the permissions of its ancestors.
    TopDown,
}

impl InheritanceMode {
    /// Returns a stable storage value for this mode.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChildToParent => "child_to_parent",
            Self::TopDown => "top_down",
        }
    }
}

impl FromStr for InheritanceMode {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "child_to_parent" => Ok(Self::ChildToParent),
            "top_down" => Ok(Self::TopDown),
            _ => Err(AppError::Validation(format!(
                "unknown inheritance mode '{value}'"
            ))),
        }
    }
}

/// What happens to the children of a deleted role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleDeletionPolicy {
    /// Refuse to delete a role that still has children.
    #[default]
    RejectIfHasChildren,
    /// Children take the deleted role's parent.
    ReassignToGrandparent,
    /// Children become roots.
    DetachToRoot,
}

impl RoleDeletionPolicy {
    /// Returns a stable storage value for this policy.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RejectIfHasChildren => "reject_if_has_children",
            Self::ReassignToGrandparent => "reassign_to_grandparent",
            Self::DetachToRoot => "detach_to_root",
        }
    }
}

impl FromStr for RoleDeletionPolicy {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "reject_if_has_children" => Ok(Self::RejectIfHasChildren),
            "reassign_to_grandparent" => Ok(Self::ReassignToGrandparent),
            "detach_to_root" => Ok(Self::DetachToRoot),
            _ => Err(AppError::Validation(format!(
                "unknown role deletion policy '{value}'"
            ))),
        }
    }
}

/// Permissions of one role split by origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePermissions {
    /// The role's own permissions, private ones included.
    pub direct: Vec<Permission>,
    /// Non-private permissions received through the hierarchy.
    pub inherited: Vec<Permission>,
}

/// One node of the rendered role forest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleTreeNode {
    /// Role identifier.
    pub role_id: RoleId,
    /// Role name.
    pub name: String,
    /// Child roles ordered by identifier.
    pub children: Vec<RoleTreeNode>,
}

/// Collects permissions keeping the first grant seen per resource name.
#[derive(Default)]
struct PermissionCollector {
    seen: BTreeSet<String>,
    permissions: Vec<Permission>,
}

impl PermissionCollector {
    fn push(&mut self, permission: &Permission) {
        if self.seen.insert(permission.resource.clone()) {
            self.permissions.push(permission.clone());
        }
    }
}

/// Snapshot of all roles keyed by identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleHierarchy {
    roles: BTreeMap<RoleId, Role>,
}

impl RoleHierarchy {
    /// Creates an empty hierarchy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads roles without checking cross-role invariants.
    ///
    /// Snapshots coming from the store may violate them; call
    /// [`RoleHierarchy::validate`] to find out.
    #[must_use]
    pub fn from_roles(roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            roles: roles
                .into_iter()
                .map(|role| (role.id().clone(), role))
                .collect(),
        }
    }

    /// Returns one role.
    #[must_use]
    pub fn get(&self, role_id: &RoleId) -> Option<&Role> {
        self.roles.get(role_id)
    }

    /// Returns whether the role exists.
    #[must_use]
    pub fn contains(&self, role_id: &RoleId) -> bool {
        self.roles.contains_key(role_id)
    }

    /// Returns all roles ordered by identifier.
    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.values()
    }

    /// Returns the number of roles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Returns whether no role is defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Returns the roles whose parent is `role_id`.
    pub fn children_of<'a>(&'a self, role_id: &'a RoleId) -> impl Iterator<Item = &'a Role> {
        self.roles
            .values()
            .filter(move |role| role.parent_role_id() == Some(role_id))
    }

    /// Inserts or replaces a role after checking hierarchy invariants.
    pub fn create_or_update_role(&mut self, role: Role) -> AppResult<()> {
        if let Some(parent_role_id) = role.parent_role_id() {
            self.ensure_parent_keeps_forest(role.id(), parent_role_id)?;
        }

        if let Some(other) = self.roles.values().find(|other| {
            other.id() != role.id()
                && (other.id().as_str() == role.name().as_str()
                    || other.name().as_str() == role.name().as_str())
        }) {
            return Err(AppError::Validation(format!(
                "role name '{}' is already used by role '{}'",
                role.name(),
                other.id()
            )));
        }

        AppError::from_many(
            role.mutually_exclusive_role_ids()
                .iter()
                .filter(|excluded| !self.roles.contains_key(*excluded))
                .map(|excluded| {
                    AppError::DanglingReference(format!(
                        "mutually exclusive role '{excluded}' of role '{}' does not exist",
                        role.id()
                    ))
                })
                .collect(),
        )?;

        self.roles.insert(role.id().clone(), role);
        Ok(())
    }

    /// Removes a role, applying `policy` to its children.
    pub fn delete_role(&mut self, role_id: &RoleId, policy: RoleDeletionPolicy) -> AppResult<Role> {
        let Some(parent_role_id) = self
            .roles
            .get(role_id)
            .map(|role| role.parent_role_id().cloned())
        else {
            return Err(AppError::NotFound(format!("role '{role_id}' does not exist")));
        };

        let child_ids: Vec<RoleId> = self
            .children_of(role_id)
            .map(|child| child.id().clone())
            .collect();

        let new_parent = match policy {
            RoleDeletionPolicy::RejectIfHasChildren if !child_ids.is_empty() => {
                return Err(AppError::Validation(format!(
                    "cannot delete role '{role_id}' with child roles: {}",
                    child_ids
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ")
                )));
            }
            RoleDeletionPolicy::RejectIfHasChildren | RoleDeletionPolicy::DetachToRoot => None,
            RoleDeletionPolicy::ReassignToGrandparent => parent_role_id,
        };

        for child_id in &child_ids {
            if let Some(child) = self.roles.get_mut(child_id) {
                child.set_parent_role_id(new_parent.clone());
            }
        }

        for role in self.roles.values_mut() {
            role.forget_exclusion(role_id);
        }

        self.roles
            .remove(role_id)
            .ok_or_else(|| AppError::Internal(format!("role '{role_id}' vanished during delete")))
    }

    /// Returns direct and inherited permissions of one role.
    pub fn permissions(&self, role_id: &RoleId, mode: InheritanceMode) -> AppResult<RolePermissions> {
        let role = self
            .roles
            .get(role_id)
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' does not exist")))?;

        let mut collector = PermissionCollector::default();
        self.visit_inherited(role, mode, &mut |permission: &Permission| {
            collector.push(permission);
        });

        Ok(RolePermissions {
            direct: role.permissions().to_vec(),
            inherited: collector.permissions,
        })
    }

    /// Returns sorted `resource:action` strings of all effective permissions.
    ///
    /// Unlike [`RolePermissions::inherited`], every action of every inherited
    /// grant is kept, even when an earlier grant named the same resource.
    pub fn flattened_permissions(
        &self,
        role_id: &RoleId,
        mode: InheritanceMode,
    ) -> AppResult<Vec<String>> {
        let role = self
            .roles
            .get(role_id)
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' does not exist")))?;

        let mut flattened = BTreeSet::new();
        let mut add = |permission: &Permission| {
            for action in &permission.actions {
                flattened.insert(format!("{}:{action}", permission.resource));
            }
        };
        for permission in role.permissions() {
            add(permission);
        }
        self.visit_inherited(role, mode, &mut add);

        Ok(flattened.into_iter().collect())
    }

    /// Groups roles into a forest by parent.
    ///
    /// Roles without a parent or with an unresolved parent are roots.
    #[must_use]
    pub fn build_hierarchy_tree(&self) -> Vec<RoleTreeNode> {
        let mut guard = BTreeSet::new();
        self.roles
            .values()
            .filter(|role| {
                role.parent_role_id()
                    .is_none_or(|parent_role_id| !self.roles.contains_key(parent_role_id))
            })
            .filter_map(|role| self.build_node(role, &mut guard))
            .collect()
    }

    /// Reports parent cycles and unresolved exclusion references.
    pub fn validate(&self) -> AppResult<()> {
        let mut errors = Vec::new();
        let mut reported: BTreeSet<BTreeSet<RoleId>> = BTreeSet::new();

        for role in self.roles.values() {
            if let Some(cycle) = self.parent_cycle_through(role.id()) {
                let members: BTreeSet<RoleId> = cycle.iter().cloned().collect();
                if reported.insert(members) {
                    errors.push(AppError::CircularDependency(format!(
                        "role parent chain forms a cycle: {}",
                        join_ids(&cycle)
                    )));
                }
            }

            for excluded in role.mutually_exclusive_role_ids() {
                if !self.roles.contains_key(excluded) {
                    errors.push(AppError::DanglingReference(format!(
                        "mutually exclusive role '{excluded}' of role '{}' does not exist",
                        role.id()
                    )));
                }
            }
        }

        AppError::from_many(errors)
    }

    /// Returns whether either role declares the other as mutually exclusive.
    #[must_use]
    pub fn are_mutually_exclusive(&self, left: &RoleId, right: &RoleId) -> bool {
        let declares = |from: &RoleId, to: &RoleId| {
            self.roles
                .get(from)
                .is_some_and(|role| role.mutually_exclusive_role_ids().contains(to))
        };

        declares(left, right) || declares(right, left)
    }

    /// Fails when `member_count` exceeds the role's membership cap.
    pub fn check_member_count(&self, role_id: &RoleId, member_count: u32) -> AppResult<()> {
        let role = self
            .roles
            .get(role_id)
            .ok_or_else(|| AppError::DanglingReference(format!("role '{role_id}' does not exist")))?;

        match role.max_members() {
            Some(max_members) if member_count > max_members => Err(AppError::Validation(format!(
                "role '{role_id}' allows at most {max_members} members, got {member_count}"
            ))),
            _ => Ok(()),
        }
    }

    fn ensure_parent_keeps_forest(&self, role_id: &RoleId, parent_role_id: &RoleId) -> AppResult<()> {
        let mut chain = vec![role_id.clone()];
        let mut current = Some(parent_role_id);
        let mut walked = BTreeSet::new();

        while let Some(ancestor_id) = current {
            chain.push(ancestor_id.clone());
            if ancestor_id == role_id {
                return Err(AppError::CircularDependency(format!(
                    "assigning parent '{parent_role_id}' to role '{role_id}' closes a cycle: {}",
                    join_ids(&chain)
                )));
            }

            // Existing cycles elsewhere must not spin this walk forever.
            if !walked.insert(ancestor_id) {
                break;
            }

            current = self
                .roles
                .get(ancestor_id)
                .and_then(|ancestor| ancestor.parent_role_id());
        }

        Ok(())
    }

    fn parent_cycle_through(&self, role_id: &RoleId) -> Option<Vec<RoleId>> {
        let mut chain = vec![role_id.clone()];
        let mut walked = BTreeSet::from([role_id]);
        let mut current = self.roles.get(role_id)?.parent_role_id();

        while let Some(ancestor_id) = current {
            chain.push(ancestor_id.clone());
            if ancestor_id == role_id {
                return Some(chain);
            }
            if !walked.insert(ancestor_id) {
                return None;
            }
            current = self
                .roles
                .get(ancestor_id)
                .and_then(|ancestor| ancestor.parent_role_id());
        }

        None
    }

    fn visit_inherited(
        &self,
        role: &Role,
        mode: InheritanceMode,
        visit: &mut dyn FnMut(&Permission),
    ) {
        if !role.inherit_child_permissions() {
            return;
        }

        let mut guard = BTreeSet::from([role.id().clone()]);
        match mode {
            InheritanceMode::ChildToParent => {
                self.collect_from_descendants(role.id(), &mut guard, visit);
            }
            InheritanceMode::TopDown => self.collect_from_ancestors(role, &mut guard, visit),
        }
    }

    fn collect_from_descendants(
        &self,
        role_id: &RoleId,
        guard: &mut BTreeSet<RoleId>,
        visit: &mut dyn FnMut(&Permission),
    ) {
        let children: Vec<&Role> = self.children_of(role_id).collect();
        for child in children {
            if !guard.insert(child.id().clone()) {
                continue;
            }

            for permission in child.public_permissions() {
                visit(permission);
            }

            if child.inherit_child_permissions() {
                self.collect_from_descendants(child.id(), guard, visit);
            }
        }
    }

    fn collect_from_ancestors(
        &self,
        role: &Role,
        guard: &mut BTreeSet<RoleId>,
        visit: &mut dyn FnMut(&Permission),
    ) {
        let mut current = role
            .parent_role_id()
            .and_then(|parent_role_id| self.roles.get(parent_role_id));

        while let Some(ancestor) = current {
            if !guard.insert(ancestor.id().clone()) {
                break;
            }

            for permission in ancestor.public_permissions() {
                visit(permission);
            }

            if !ancestor.inherit_child_permissions() {
                break;
            }

            current = ancestor
                .parent_role_id()
                .and_then(|parent_role_id| self.roles.get(parent_role_id));
        }
    }

    fn build_node(&self, role: &Role, guard: &mut BTreeSet<RoleId>) -> Option<RoleTreeNode> {
        if !guard.insert(role.id().clone()) {
            return None;
        }

        let children: Vec<&Role> = self.children_of(role.id()).collect();
        Some(RoleTreeNode {
            role_id: role.id().clone(),
            name: role.name().as_str().to_owned(),
            children: children
                .into_iter()
                .filter_map(|child| self.build_node(child, guard))
                .collect(),
        })
    }
}

fn join_ids<T: std::fmt::Display>(ids: &[T]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}
