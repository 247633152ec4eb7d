//! Infrastructure layer: stores, configuration, role/user directory.

pub mod config;
pub mod directory;
pub mod store;

pub use config::{AccessConfig, ConfigError, RoleSeed, SUPER_ADMIN_ROLE, default_role_seeds};
pub use directory::{
    AuditRecord, Directory, DirectoryError, DirectoryResult, InMemoryDirectory, NewRole, NewUser,
    RoleChanges, RoleSummary,
};
pub use store::{InMemoryStore, Store};
