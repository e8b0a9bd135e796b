//! Per-operation authorization check run by the dispatcher.

use crate::authz::engine::Authorizer;
use crate::authz::model::{Permission, Principal};
use crate::http::error::GatewayError;
use crate::observability::metrics;

/// Enforce an operation's declared permission set.
///
/// An empty set always passes. Otherwise a principal is required
/// (`Unauthenticated`) and must hold at least one listed permission
/// (`Forbidden`).
pub async fn authorize(
    authorizer: &Authorizer,
    operation: &str,
    required: &[Permission],
    principal: Option<&Principal>,
) -> Result<(), GatewayError> {
    if required.is_empty() {
        return Ok(());
    }

    let Some(principal) = principal else {
        tracing::info!(operation, "Rejecting anonymous call to protected operation");
        metrics::record_authz_decision(false);
        return Err(GatewayError::Unauthenticated);
    };

    if authorizer
        .check_permissions(principal.user_id, required)
        .await?
    {
        metrics::record_authz_decision(true);
        Ok(())
    } else {
        tracing::warn!(
            operation,
            user_id = principal.user_id,
            "Permission denied"
        );
        metrics::record_authz_decision(false);
        Err(GatewayError::Forbidden)
    }
}
