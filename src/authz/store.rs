//! Collaborator interfaces over the relational RBAC model, plus an
//! in-memory implementation backed by `DashMap`.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicI64, Ordering};
use thiserror::Error;

use crate::authz::model::{
    Permission, PermissionId, PermissionParseError, PermissionRecord, Role, RoleId, UserId,
};
use crate::config::schema::RoleSeed;

/// Errors surfaced by store collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("constraint violated: {0}")]
    Conflict(String),

    #[error("record not found: {0}")]
    NotFound(String),
}

/// Filter for [`PermissionStore::find`].
#[derive(Debug, Clone, Default)]
pub struct PermissionCriteria {
    /// Row ids to consider.
    pub ids: Vec<PermissionId>,
    /// A row matches if its pair equals any of these.
    pub any_of: Vec<Permission>,
    pub include_deleted: bool,
}

impl PermissionCriteria {
    pub fn matches(&self, record: &PermissionRecord) -> bool {
        (self.include_deleted || record.is_active())
            && self.ids.contains(&record.id)
            && self.any_of.contains(&record.permission)
    }
}

#[async_trait]
pub trait UserRoleStore: Send + Sync {
    /// Role ids assigned to `user_id`.
    async fn find(&self, user_id: UserId) -> Result<Vec<RoleId>, StoreError>;
}

#[async_trait]
pub trait RolePermissionStore: Send + Sync {
    /// Permission ids linked to any of `role_ids`.
    async fn find(&self, role_ids: &[RoleId]) -> Result<Vec<PermissionId>, StoreError>;
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn find(&self, criteria: &PermissionCriteria) -> Result<Vec<PermissionRecord>, StoreError>;
}

/// In-memory RBAC tables. Edge sets enforce pair uniqueness.
#[derive(Debug, Default)]
pub struct MemoryRbacStore {
    roles: DashMap<RoleId, Role>,
    permissions: DashMap<PermissionId, PermissionRecord>,
    role_permissions: DashMap<RoleId, BTreeSet<PermissionId>>,
    user_roles: DashMap<UserId, BTreeSet<RoleId>>,
    next_id: AtomicI64,
}

impl MemoryRbacStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn add_role(&self, name: impl Into<String>) -> RoleId {
        let id = self.allocate_id();
        self.roles.insert(id, Role { id, name: name.into() });
        id
    }

    pub fn role_by_name(&self, name: &str) -> Option<Role> {
        self.roles
            .iter()
            .find(|r| r.value().name == name)
            .map(|r| r.value().clone())
    }

    /// Insert a permission row. The (resource, action) pair must be unique.
    pub fn add_permission(&self, permission: Permission) -> Result<PermissionId, StoreError> {
        if self.permission_id(permission).is_some() {
            return Err(StoreError::Conflict(format!("permission {permission} already exists")));
        }
        let id = self.allocate_id();
        self.permissions.insert(
            id,
            PermissionRecord {
                id,
                permission,
                deleted_at: None,
            },
        );
        Ok(id)
    }

    /// Get-or-create for seeding.
    pub fn ensure_permission(&self, permission: Permission) -> PermissionId {
        match self.permission_id(permission) {
            Some(id) => id,
            None => {
                let id = self.allocate_id();
                self.permissions.insert(
                    id,
                    PermissionRecord {
                        id,
                        permission,
                        deleted_at: None,
                    },
                );
                id
            }
        }
    }

    fn permission_id(&self, permission: Permission) -> Option<PermissionId> {
        self.permissions
            .iter()
            .find(|r| r.value().permission == permission)
            .map(|r| *r.key())
    }

    /// Link a permission to a role. Returns false if the edge already existed.
    pub fn grant(&self, role_id: RoleId, permission_id: PermissionId) -> Result<bool, StoreError> {
        if !self.roles.contains_key(&role_id) {
            return Err(StoreError::NotFound(format!("role {role_id}")));
        }
        if !self.permissions.contains_key(&permission_id) {
            return Err(StoreError::NotFound(format!("permission {permission_id}")));
        }
        Ok(self.role_permissions.entry(role_id).or_default().insert(permission_id))
    }

    /// Assign a role to a user. Returns false if the edge already existed.
    pub fn assign(&self, user_id: UserId, role_id: RoleId) -> Result<bool, StoreError> {
        if !self.roles.contains_key(&role_id) {
            return Err(StoreError::NotFound(format!("role {role_id}")));
        }
        Ok(self.user_roles.entry(user_id).or_default().insert(role_id))
    }

    /// Create roles, permissions and memberships from configuration.
    /// Existing roles are reused by name.
    pub fn seed(&self, roles: &[RoleSeed]) -> Result<(), PermissionParseError> {
        for seed in roles {
            let role_id = match self.role_by_name(&seed.name) {
                Some(role) => role.id,
                None => self.add_role(seed.name.clone()),
            };
            for name in &seed.permissions {
                let permission_id = self.ensure_permission(name.parse()?);
                self.role_permissions
                    .entry(role_id)
                    .or_default()
                    .insert(permission_id);
            }
            for &user_id in &seed.users {
                self.user_roles.entry(user_id).or_default().insert(role_id);
            }
            tracing::debug!(role = %seed.name, permissions = seed.permissions.len(), users = seed.users.len(), "Seeded role");
        }
        Ok(())
    }

    pub fn soft_delete_permission(&self, permission_id: PermissionId) -> bool {
        match self.permissions.get_mut(&permission_id) {
            Some(mut record) => {
                record.deleted_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl UserRoleStore for MemoryRbacStore {
    async fn find(&self, user_id: UserId) -> Result<Vec<RoleId>, StoreError> {
        Ok(self
            .user_roles
            .get(&user_id)
            .map(|roles| roles.iter().copied().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl RolePermissionStore for MemoryRbacStore {
    async fn find(&self, role_ids: &[RoleId]) -> Result<Vec<PermissionId>, StoreError> {
        let mut ids = BTreeSet::new();
        for role_id in role_ids {
            if let Some(edges) = self.role_permissions.get(role_id) {
                ids.extend(edges.iter().copied());
            }
        }
        Ok(ids.into_iter().collect())
    }
}

#[async_trait]
impl PermissionStore for MemoryRbacStore {
    async fn find(&self, criteria: &PermissionCriteria) -> Result<Vec<PermissionRecord>, StoreError> {
        Ok(self
            .permissions
            .iter()
            .filter(|r| criteria.matches(r.value()))
            .map(|r| r.value().clone())
            .collect())
    }
}
