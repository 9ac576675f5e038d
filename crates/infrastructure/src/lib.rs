//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_change_pattern_repository;
mod in_memory_resource_repository;
mod in_memory_role_repository;
mod json_snapshot_file;

pub use in_memory_change_pattern_repository::InMemoryChangePatternRepository;
pub use in_memory_resource_repository::InMemoryResourceRepository;
pub use in_memory_role_repository::InMemoryRoleRepository;
pub use json_snapshot_file::JsonSnapshotFile;
