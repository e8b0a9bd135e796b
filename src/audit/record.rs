//! The audit record published for every request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Success,
    Failure,
}

/// Immutable once built. Serialized in camelCase for the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub resource: String,
    pub ip_address: Option<String>,
    pub status: AuditStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl AuditRecord {
    fn new(
        method: impl Into<String>,
        resource: impl Into<String>,
        ip_address: Option<String>,
        status: AuditStatus,
        error: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            method: method.into(),
            resource: resource.into(),
            ip_address,
            status,
            error,
            details: None,
        }
    }

    pub fn success(
        method: impl Into<String>,
        resource: impl Into<String>,
        ip_address: Option<String>,
    ) -> Self {
        Self::new(method, resource, ip_address, AuditStatus::Success, None)
    }

    pub fn failure(
        method: impl Into<String>,
        resource: impl Into<String>,
        ip_address: Option<String>,
        error: impl Into<String>,
    ) -> Self {
        Self::new(
            method,
            resource,
            ip_address,
            AuditStatus::Failure,
            Some(error.into()),
        )
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}
