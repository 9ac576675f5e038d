use std::collections::BTreeMap;

use changeflow_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};

use crate::ResourceId;

/// Manual availability flag toggled by operators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceAvailability {
    /// Resource may be allocated.
    #[default]
    Available,
    /// Resource is out of service and accepts no new allocation.
    Unavailable,
}

impl ResourceAvailability {
    /// Returns a stable storage value for this flag.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Unavailable => "unavailable",
        }
    }

    /// Returns the opposite flag.
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Self::Available => Self::Unavailable,
            Self::Unavailable => Self::Available,
        }
    }
}

/// Status derived from current allocations, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Free capacity remains.
    Available,
    /// Usage reached capacity.
    Occupied,
    /// Marked out of service.
    Unavailable,
}

impl ResourceStatus {
    /// Returns a stable storage value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Occupied => "occupied",
            Self::Unavailable => "unavailable",
        }
    }
}

/// Resource payload in its persisted shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInput {
    /// Stable resource identifier.
    pub id: String,
    /// Display name, defaults to the identifier.
    #[serde(default)]
    pub name: Option<String>,
    /// Optional free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Whether several tasks may hold the resource at once.
    #[serde(default)]
    pub is_shared: bool,
    /// Maximum concurrent holders of a shared resource.
    #[serde(default = "default_max_shares")]
    pub max_shares: u32,
    /// Manual availability flag.
    #[serde(default)]
    pub status: ResourceAvailability,
}

fn default_max_shares() -> u32 {
    1
}

/// Physical or human resource that tasks bind to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ResourceInput", into = "ResourceInput")]
pub struct Resource {
    id: ResourceId,
    name: NonEmptyString,
    description: Option<String>,
    is_shared: bool,
    max_shares: u32,
    availability: ResourceAvailability,
}

impl Resource {
    /// Creates a validated resource.
    pub fn new(input: ResourceInput) -> AppResult<Self> {
        let ResourceInput {
            id,
            name,
            description,
            is_shared,
            max_shares,
            status,
        } = input;

        let id = ResourceId::new(id)?;
        let name = match name.filter(|value| !value.trim().is_empty()) {
            Some(name) => NonEmptyString::new(name.trim())?,
            None => NonEmptyString::new(id.as_str())?,
        };

        if is_shared && max_shares == 0 {
            return Err(AppError::Validation(format!(
                "resource '{id}' max_shares must be greater than zero"
            )));
        }

        let description = description.and_then(|value| {
            let trimmed = value.trim().to_owned();
            (!trimmed.is_empty()).then_some(trimmed)
        });

        Ok(Self {
            id,
            name,
            description,
            is_shared,
            max_shares,
            availability: status,
        })
    }

    /// Creates an available exclusive resource.
    pub fn exclusive(id: impl Into<String>) -> AppResult<Self> {
        Self::new(ResourceInput {
            id: id.into(),
            name: None,
            description: None,
            is_shared: false,
            max_shares: 1,
            status: ResourceAvailability::Available,
        })
    }

    /// Creates an available shared resource.
    pub fn shared(id: impl Into<String>, max_shares: u32) -> AppResult<Self> {
        Self::new(ResourceInput {
            id: id.into(),
            name: None,
            description: None,
            is_shared: true,
            max_shares,
            status: ResourceAvailability::Available,
        })
    }

    /// Returns the resource identifier.
    #[must_use]
    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &NonEmptyString {
        &self.name
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns whether the resource is shared.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        self.is_shared
    }

    /// Returns the configured share cap; only meaningful for shared resources.
    #[must_use]
    pub fn max_shares(&self) -> u32 {
        self.max_shares
    }

    /// Returns the manual availability flag.
    #[must_use]
    pub fn availability(&self) -> ResourceAvailability {
        self.availability
    }

    /// Returns how many tasks may hold the resource at once.
    #[must_use]
    pub fn capacity(&self) -> usize {
        if self.is_shared {
            self.max_shares as usize
        } else {
            1
        }
    }

    pub(crate) fn set_availability(&mut self, availability: ResourceAvailability) {
        self.availability = availability;
    }
}

impl TryFrom<ResourceInput> for Resource {
    type Error = AppError;

    fn try_from(value: ResourceInput) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Resource> for ResourceInput {
    fn from(value: Resource) -> Self {
        Self {
            id: value.id.into(),
            name: Some(value.name.into()),
            description: value.description,
            is_shared: value.is_shared,
            max_shares: value.max_shares,
            status: value.availability,
        }
    }
}

/// Snapshot of all resources keyed by identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceRegistry {
    resources: BTreeMap<ResourceId, Resource>,
}

impl ResourceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads resources, keeping the last entry per identifier.
    #[must_use]
    pub fn from_resources(resources: impl IntoIterator<Item = Resource>) -> Self {
        Self {
            resources: resources
                .into_iter()
                .map(|resource| (resource.id().clone(), resource))
                .collect(),
        }
    }

    /// Adds a resource with a new identifier.
    pub fn register(&mut self, resource: Resource) -> AppResult<()> {
        if self.resources.contains_key(resource.id()) {
            return Err(AppError::Validation(format!(
                "resource '{}' already exists",
                resource.id()
            )));
        }

        self.resources.insert(resource.id().clone(), resource);
        Ok(())
    }

    /// Removes a resource.
    pub fn remove(&mut self, resource_id: &ResourceId) -> AppResult<Resource> {
        self.resources
            .remove(resource_id)
            .ok_or_else(|| AppError::NotFound(format!("resource '{resource_id}' does not exist")))
    }

    /// Flips the manual availability flag and returns the new value.
    pub fn toggle_availability(
        &mut self,
        resource_id: &ResourceId,
    ) -> AppResult<ResourceAvailability> {
        let resource = self
            .resources
            .get_mut(resource_id)
            .ok_or_else(|| AppError::NotFound(format!("resource '{resource_id}' does not exist")))?;

        let availability = resource.availability().toggled();
        resource.set_availability(availability);
        Ok(availability)
    }

    /// Returns one resource.
    #[must_use]
    pub fn get(&self, resource_id: &ResourceId) -> Option<&Resource> {
        self.resources.get(resource_id)
    }

    /// Returns whether the resource exists.
    #[must_use]
    pub fn contains(&self, resource_id: &ResourceId) -> bool {
        self.resources.contains_key(resource_id)
    }

    /// Returns all resources ordered by identifier.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }
}
