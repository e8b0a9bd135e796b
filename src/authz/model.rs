//! RBAC data model: typed permissions, roles and stored permission rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub type UserId = i64;
pub type RoleId = i64;
pub type PermissionId = i64;

/// Resource kinds a permission can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceType {
    User,
    Role,
    Permission,
    Manual,
    Order,
    Notification,
    Session,
    Tenant,
}

impl ResourceType {
    pub const ALL: [ResourceType; 8] = [
        ResourceType::User,
        ResourceType::Role,
        ResourceType::Permission,
        ResourceType::Manual,
        ResourceType::Order,
        ResourceType::Notification,
        ResourceType::Session,
        ResourceType::Tenant,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::User => "User",
            ResourceType::Role => "Role",
            ResourceType::Permission => "Permission",
            ResourceType::Manual => "Manual",
            ResourceType::Order => "Order",
            ResourceType::Notification => "Notification",
            ResourceType::Session => "Session",
            ResourceType::Tenant => "Tenant",
        }
    }
}

impl FromStr for ResourceType {
    type Err = PermissionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| PermissionParseError::UnknownResource(s.to_string()))
    }
}

/// Actions a permission can grant on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Create,
    Read,
    Update,
    Delete,
    List,
    Manage,
}

impl ActionType {
    pub const ALL: [ActionType; 6] = [
        ActionType::Create,
        ActionType::Read,
        ActionType::Update,
        ActionType::Delete,
        ActionType::List,
        ActionType::Manage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Create => "create",
            ActionType::Read => "read",
            ActionType::Update => "update",
            ActionType::Delete => "delete",
            ActionType::List => "list",
            ActionType::Manage => "manage",
        }
    }
}

impl FromStr for ActionType {
    type Err = PermissionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| PermissionParseError::UnknownAction(s.to_string()))
    }
}

/// Errors produced while parsing a `Resource.action` declaration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionParseError {
    #[error("permission '{0}' must have the form Resource.action")]
    Malformed(String),

    #[error("unknown resource type '{0}'")]
    UnknownResource(String),

    #[error("unknown action type '{0}'")]
    UnknownAction(String),
}

/// A (resource, action) pair, written `Manual.update` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Permission {
    pub resource: ResourceType,
    pub action: ActionType,
}

impl Permission {
    pub const fn new(resource: ResourceType, action: ActionType) -> Self {
        Self { resource, action }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource.as_str(), self.action.as_str())
    }
}

impl FromStr for Permission {
    type Err = PermissionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(resource), Some(action), None) if !resource.is_empty() && !action.is_empty() => {
                Ok(Self {
                    resource: resource.parse()?,
                    action: action.parse()?,
                })
            }
            _ => Err(PermissionParseError::Malformed(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
}

/// A stored permission row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRecord {
    pub id: PermissionId,
    pub permission: Permission,
    /// Soft-delete marker. Deleted rows never grant access.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl PermissionRecord {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// The authenticated caller of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
}
