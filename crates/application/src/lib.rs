//! Application services and ports.

#![forbid(unsafe_code)]

mod change_pattern_ports;
mod change_pattern_service;
mod resource_ports;
mod resource_service;
mod role_ports;
mod role_service;
mod settings;
mod snapshot;

pub use change_pattern_ports::ChangePatternRepository;
pub use change_pattern_service::ChangePatternService;
pub use resource_ports::ResourceRepository;
pub use resource_service::ResourceService;
pub use role_ports::RoleRepository;
pub use role_service::RoleService;
pub use settings::ServiceSettings;
pub use snapshot::Snapshot;
