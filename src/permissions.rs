//! Role table and document permission resolution.
//!
//! A document's level is resolved in order:
//!
//! 1. the level asserted by the connector, if any;
//! 2. the first configured rule whose glob matches the document id;
//! 3. `permissions.default_level`.
//!
//! If none applies, resolution fails and the caller restricts the document
//! to the highest configured level (fail closed).

use anyhow::{Context, Result};
use globset::{Glob, GlobMatcher};

use liveindex_core::models::Role;

use crate::config::PermissionsConfig;
use crate::error::{QueryError, SyncError};

pub struct Permissions {
    roles: Vec<Role>,
    rules: Vec<(GlobMatcher, u32)>,
    default_level: Option<u32>,
}

impl Permissions {
    pub fn from_config(config: &PermissionsConfig) -> Result<Self> {
        let mut roles: Vec<Role> = config
            .roles
            .iter()
            .map(|r| Role::new(r.name.clone(), r.level))
            .collect();
        roles.sort_by_key(|r| r.level);

        let rules = config
            .rules
            .iter()
            .map(|rule| {
                let glob = Glob::new(&rule.pattern)
                    .with_context(|| format!("Invalid permission rule glob: {}", rule.pattern))?;
                Ok((glob.compile_matcher(), rule.level))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            roles,
            rules,
            default_level: config.default_level,
        })
    }

    /// Roles ordered by ascending level.
    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    /// Look up a role by name (case-insensitive).
    pub fn role(&self, name: &str) -> Result<Role, QueryError> {
        self.roles
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(name))
            .cloned()
            .ok_or_else(|| QueryError::UnknownRole(name.to_string()))
    }

    /// Role for an explicit numeric level, named after the configured role
    /// at that level when one exists.
    pub fn role_for_level(&self, level: u32) -> Role {
        self.roles
            .iter()
            .find(|r| r.level == level)
            .cloned()
            .unwrap_or_else(|| Role::new(format!("level-{}", level), level))
    }

    /// The least privileged role; used when a caller names none.
    pub fn default_role(&self) -> Role {
        self.roles
            .first()
            .cloned()
            .unwrap_or_else(|| Role::new("anonymous", 1))
    }

    /// Highest configured role level.
    pub fn max_level(&self) -> u32 {
        self.roles.iter().map(|r| r.level).max().unwrap_or(1)
    }

    /// Resolve the permission level of a document.
    pub fn resolve(&self, doc_id: &str, asserted: Option<u32>) -> Result<u32, SyncError> {
        if let Some(level) = asserted {
            return Ok(level);
        }
        if let Some((_, level)) = self.rules.iter().find(|(m, _)| m.is_match(doc_id)) {
            return Ok(*level);
        }
        self.default_level.ok_or_else(|| {
            SyncError::PermissionConfig(format!("no permission rule matches {}", doc_id))
        })
    }

    /// [`resolve`](Self::resolve), falling back to [`max_level`](Self::max_level)
    /// with a warning when nothing applies.
    pub fn resolve_or_restrict(&self, doc_id: &str, asserted: Option<u32>) -> u32 {
        match self.resolve(doc_id, asserted) {
            Ok(level) => level,
            Err(e) => {
                let level = self.max_level();
                tracing::warn!(doc_id, error = %e, level, "restricting document to highest role");
                level
            }
        }
    }
}
