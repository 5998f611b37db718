//! Authenticated caller context
//!
//! The hosting platform authenticates requests; the engine only sees
//! this value, threaded through every operation and checked at entry.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::ids::{BranchId, OrganizationId};

/// Permission strings checked at component entry
pub mod permissions {
    pub const SHIFTS_WRITE: &str = "shifts:write";
    pub const MATCHES_RUN: &str = "matches:run";
    pub const PROPOSALS_RESPOND: &str = "proposals:respond";
    pub const BULK_RUN: &str = "bulk:run";
    pub const CONFIG_WRITE: &str = "config:write";
    pub const PREFERENCES_WRITE: &str = "preferences:write";
    pub const METRICS_READ: &str = "metrics:read";
}

/// The authenticated caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: Uuid,
    pub organization_id: OrganizationId,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub branch_ids: Vec<BranchId>,
}

impl UserContext {
    /// Caller with every permission; for tests and trusted internal use
    pub fn admin(organization_id: OrganizationId) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            organization_id,
            roles: vec!["admin".to_string()],
            permissions: Vec::new(),
            branch_ids: Vec::new(),
        }
    }

    /// Require a permission; the admin role implies all of them
    pub fn require(&self, permission: &str) -> EngineResult<()> {
        if self.roles.iter().any(|r| r == "admin") {
            return Ok(());
        }
        if self.permissions.iter().any(|p| p == permission) {
            return Ok(());
        }
        Err(EngineError::Unauthorized(format!(
            "missing permission {}",
            permission
        )))
    }

    /// Require that the target entity belongs to the caller's organization
    pub fn require_same_organization(&self, organization_id: OrganizationId) -> EngineResult<()> {
        if self.organization_id == organization_id {
            Ok(())
        } else {
            Err(EngineError::Unauthorized(
                "entity belongs to another organization".to_string(),
            ))
        }
    }
}
