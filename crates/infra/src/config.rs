//! Access configuration: owner exceptions, seed roles, log filter.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use journal_auth::{OwnerPolicy, PermissionParseError, PermissionSet};

/// Environment variable naming the JSON config file.
pub const CONFIG_PATH_ENV: &str = "JOURNAL_ACCESS_CONFIG";

pub const SUPER_ADMIN_ROLE: &str = "Super Admin";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("seed role '{role}' has an invalid permission: {source}")]
    InvalidSeed {
        role: String,
        #[source]
        source: PermissionParseError,
    },

    #[error("seed roles must include a system role holding SYSTEM.ADMIN")]
    MissingAdminSeed,
}

/// A role created at bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSeed {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_system: bool,
    /// Raw `resource.ACTION` strings, validated by [`RoleSeed::permission_set`].
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl RoleSeed {
    fn new(name: &str, description: &str, is_system: bool, permissions: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            description: Some(description.to_string()),
            is_system,
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn permission_set(&self) -> Result<PermissionSet, ConfigError> {
        PermissionSet::parse_all(&self.permissions).map_err(|source| ConfigError::InvalidSeed {
            role: self.name.clone(),
            source,
        })
    }
}

/// Roles every journal starts with.
pub fn default_role_seeds() -> Vec<RoleSeed> {
    vec![
        RoleSeed::new(SUPER_ADMIN_ROLE, "Unrestricted administrator", true, &["SYSTEM.ADMIN"]),
        RoleSeed::new(
            "Editor",
            "Manages journal content and the editorial board",
            false,
            &[
                "article.ALL",
                "author.ALL",
                "callforpapers.ALL",
                "journalissue.ALL",
                "editorialboardmember.ALL",
                "media.ALL",
                "notification.ALL",
            ],
        ),
        RoleSeed::new(
            "Author",
            "Writes articles and uploads media",
            false,
            &[
                "article.CREATE",
                "article.READ",
                "media.CREATE",
                "media.READ",
                "notification.READ",
            ],
        ),
        RoleSeed::new(
            "Reader",
            "Read-only access to published content",
            false,
            &[
                "article.READ",
                "journalissue.READ",
                "callforpapers.READ",
                "editorialboardmember.READ",
            ],
        ),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    pub owner_exceptions: OwnerPolicy,
    pub roles: Vec<RoleSeed>,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: Option<String>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            owner_exceptions: OwnerPolicy::journal_default(),
            roles: default_role_seeds(),
            log_filter: None,
        }
    }
}

impl AccessConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Load from the file named by `JOURNAL_ACCESS_CONFIG`, or defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(&path)
                .with_context(|| format!("loading access config from {CONFIG_PATH_ENV}={path}")),
            Err(_) => {
                tracing::warn!("{CONFIG_PATH_ENV} not set; using built-in access defaults");
                Ok(Self::default())
            }
        }
    }

    /// Install the log subscriber, using `log_filter` when `RUST_LOG` is unset.
    pub fn init_logging(&self) {
        journal_observability::init_with_filter(self.log_filter.as_deref().unwrap_or("info"));
    }

    /// Every seed parses and at least one system seed holds `SYSTEM.ADMIN`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut has_admin = false;
        for seed in &self.roles {
            let set = seed.permission_set()?;
            has_admin |= seed.is_system && set.has_system_admin();
        }
        if !has_admin {
            return Err(ConfigError::MissingAdminSeed);
        }
        Ok(())
    }
}
