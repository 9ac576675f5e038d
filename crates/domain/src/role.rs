use std::collections::BTreeSet;

use changeflow_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};

use crate::RoleId;

/// Grant of actions on a named resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// Resource name the grant applies to.
    pub resource: String,
    /// Actions allowed on the resource.
    #[serde(default)]
    pub actions: Vec<String>,
    /// Private grants are never propagated through the hierarchy.
    #[serde(default)]
    pub is_private: bool,
}

impl Permission {
    /// Creates a public permission for the given actions.
    #[must_use]
    pub fn public(resource: impl Into<String>, actions: &[&str]) -> Self {
        Self {
            resource: resource.into(),
            actions: actions.iter().map(|action| (*action).to_owned()).collect(),
            is_private: false,
        }
    }

    /// Creates a private permission for the given actions.
    #[must_use]
    pub fn private(resource: impl Into<String>, actions: &[&str]) -> Self {
        Self {
            is_private: true,
            ..Self::public(resource, actions)
        }
    }

    fn normalized(self) -> AppResult<Self> {
        let resource = self.resource.trim().to_owned();
        if resource.is_empty() {
            return Err(AppError::Validation(
                "permission resource must not be empty".to_owned(),
            ));
        }

        let mut actions: Vec<String> = Vec::with_capacity(self.actions.len());
        for action in self.actions {
            let action = action.trim().to_owned();
            if action.is_empty() {
                return Err(AppError::Validation(format!(
                    "permission on '{resource}' contains an empty action"
                )));
            }
            if !actions.contains(&action) {
                actions.push(action);
            }
        }

        Ok(Self {
            resource,
            actions,
            is_private: self.is_private,
        })
    }
}

/// Role payload in its persisted shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleInput {
    /// Stable role identifier.
    pub id: String,
    /// Unique role name.
    pub name: String,
    /// Optional parent role identifier.
    #[serde(default)]
    pub parent_role: Option<String>,
    /// Ordered permission grants.
    #[serde(default)]
    pub permissions: Vec<Permission>,
    /// Roles that may not be held together with this one.
    #[serde(default)]
    pub mutually_exclusive_roles: Vec<String>,
    /// Optional membership cap.
    #[serde(default)]
    pub max_members: Option<u32>,
    /// Whether permissions flow into this role through the hierarchy.
    #[serde(default = "default_inherit")]
    pub inherit_child_permissions: bool,
}

fn default_inherit() -> bool {
    true
}

/// Organizational role with hierarchy and constraint declarations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RoleInput", into = "RoleInput")]
pub struct Role {
    id: RoleId,
    name: NonEmptyString,
    parent_role_id: Option<RoleId>,
    permissions: Vec<Permission>,
    mutually_exclusive_role_ids: BTreeSet<RoleId>,
    max_members: Option<u32>,
    inherit_child_permissions: bool,
}

impl Role {
    /// Creates a validated role.
    pub fn new(input: RoleInput) -> AppResult<Self> {
        let RoleInput {
            id,
            name,
            parent_role,
            permissions,
            mutually_exclusive_roles,
            max_members,
            inherit_child_permissions,
        } = input;

        let id = RoleId::new(id)?;
        let name = NonEmptyString::new(name.trim())?;

        let parent_role_id = parent_role
            .filter(|value| !value.trim().is_empty())
            .map(RoleId::new)
            .transpose()?;
        if parent_role_id.as_ref() == Some(&id) {
            return Err(AppError::CircularDependency(format!(
                "role '{id}' cannot be its own parent"
            )));
        }

        let permissions = permissions
            .into_iter()
            .map(Permission::normalized)
            .collect::<AppResult<Vec<_>>>()?;

        let mutually_exclusive_role_ids = mutually_exclusive_roles
            .into_iter()
            .map(RoleId::new)
            .collect::<AppResult<BTreeSet<_>>>()?;
        if mutually_exclusive_role_ids.contains(&id) {
            return Err(AppError::Validation(format!(
                "role '{id}' cannot be mutually exclusive with itself"
            )));
        }

        if max_members == Some(0) {
            return Err(AppError::Validation(
                "max_members must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            id,
            name,
            parent_role_id,
            permissions,
            mutually_exclusive_role_ids,
            max_members,
            inherit_child_permissions,
        })
    }

    /// Returns the role identifier.
    #[must_use]
    pub fn id(&self) -> &RoleId {
        &self.id
    }

    /// Returns the role name.
    #[must_use]
    pub fn name(&self) -> &NonEmptyString {
        &self.name
    }

    /// Returns the declared parent role, if any.
    #[must_use]
    pub fn parent_role_id(&self) -> Option<&RoleId> {
        self.parent_role_id.as_ref()
    }

    /// Returns the role's own permissions in declaration order.
    #[must_use]
    pub fn permissions(&self) -> &[Permission] {
        &self.permissions
    }

    /// Returns the declared mutually exclusive roles.
    #[must_use]
    pub fn mutually_exclusive_role_ids(&self) -> &BTreeSet<RoleId> {
        &self.mutually_exclusive_role_ids
    }

    /// Returns the optional membership cap.
    #[must_use]
    pub fn max_members(&self) -> Option<u32> {
        self.max_members
    }

    /// Returns whether hierarchy permissions flow into this role.
    #[must_use]
    pub fn inherit_child_permissions(&self) -> bool {
        self.inherit_child_permissions
    }

    /// Returns the permissions that may be propagated to other roles.
    pub fn public_permissions(&self) -> impl Iterator<Item = &Permission> {
        self.permissions
            .iter()
            .filter(|permission| !permission.is_private)
    }

    pub(crate) fn set_parent_role_id(&mut self, parent_role_id: Option<RoleId>) {
        self.parent_role_id = parent_role_id;
    }

    pub(crate) fn forget_exclusion(&mut self, role_id: &RoleId) -> bool {
        self.mutually_exclusive_role_ids.remove(role_id)
    }
}

impl TryFrom<RoleInput> for Role {
    type Error = AppError;

    fn try_from(value: RoleInput) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Role> for RoleInput {
    fn from(value: Role) -> Self {
        Self {
            id: value.id.into(),
            name: value.name.into(),
            parent_role: value.parent_role_id.map(String::from),
            permissions: value.permissions,
            mutually_exclusive_roles: value
                .mutually_exclusive_role_ids
                .into_iter()
                .map(String::from)
                .collect(),
            max_members: value.max_members,
            inherit_child_permissions: value.inherit_child_permissions,
        }
    }
}
