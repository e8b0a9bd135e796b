//! Authorization decision engine.
//!
//! # Algorithm
//! ```text
//! user_id
//!     → UserRoleStore        (role ids; none → DENY)
//!     → RolePermissionStore  (permission ids; none → DENY)
//!     → PermissionStore      (rows with id ∈ ids, pair ∈ required, not deleted)
//!     → ALLOW iff any row matched
//! ```
//!
//! A multi-entry requirement list is satisfied by ANY entry (OR semantics).

use std::sync::Arc;

use crate::authz::model::{Permission, UserId};
use crate::authz::store::{
    PermissionCriteria, PermissionStore, RolePermissionStore, StoreError, UserRoleStore,
};

/// Evaluates whether a user's roles grant a required permission set.
#[derive(Clone)]
pub struct Authorizer {
    user_roles: Arc<dyn UserRoleStore>,
    role_permissions: Arc<dyn RolePermissionStore>,
    permissions: Arc<dyn PermissionStore>,
}

impl Authorizer {
    pub fn new(
        user_roles: Arc<dyn UserRoleStore>,
        role_permissions: Arc<dyn RolePermissionStore>,
        permissions: Arc<dyn PermissionStore>,
    ) -> Self {
        Self {
            user_roles,
            role_permissions,
            permissions,
        }
    }

    /// Build from a single store implementing all three lookups.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: UserRoleStore + RolePermissionStore + PermissionStore + 'static,
    {
        Self {
            user_roles: store.clone(),
            role_permissions: store.clone(),
            permissions: store,
        }
    }

    pub async fn check_permissions(
        &self,
        user_id: UserId,
        required: &[Permission],
    ) -> Result<bool, StoreError> {
        let role_ids = self.user_roles.find(user_id).await?;
        if role_ids.is_empty() {
            tracing::debug!(user_id, "User has no roles");
            return Ok(false);
        }

        let mut permission_ids = self.role_permissions.find(&role_ids).await?;
        if permission_ids.is_empty() {
            tracing::debug!(user_id, roles = ?role_ids, "Roles grant no permissions");
            return Ok(false);
        }
        permission_ids.sort_unstable();
        permission_ids.dedup();

        if required.is_empty() {
            return Ok(false);
        }

        let criteria = PermissionCriteria {
            ids: permission_ids,
            any_of: required.to_vec(),
            include_deleted: false,
        };
        let matched = self.permissions.find(&criteria).await?;

        tracing::debug!(
            user_id,
            required = ?required.iter().map(ToString::to_string).collect::<Vec<_>>(),
            matched = matched.len(),
            "Permission check evaluated"
        );
        Ok(!matched.is_empty())
    }

    /// String entry point. Entries that are not a well-formed, known
    /// `Resource.action` pair never match.
    pub async fn check_permission_names(
        &self,
        user_id: UserId,
        required: &[&str],
    ) -> Result<bool, StoreError> {
        let parsed: Vec<Permission> = required
            .iter()
            .filter_map(|name| match name.parse() {
                Ok(p) => Some(p),
                Err(e) => {
                    tracing::warn!(permission = %name, error = %e, "Ignoring unparseable permission");
                    None
                }
            })
            .collect();
        self.check_permissions(user_id, &parsed).await
    }
}
