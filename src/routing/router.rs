//! Operation registration and lookup.
//!
//! # Responsibilities
//! - Hold every operation's method, path, permission set and envelope mode
//! - Parse permission declarations once, at startup
//! - Resolve an incoming method and path to its operation
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Unknown permission names fail startup, never a request
//! - Most literal segments wins; ties keep registration order
//! - Explicit `None` rather than a silent default

use axum::http::Method;
use thiserror::Error;

use crate::authz::model::{Permission, PermissionParseError};
use crate::routing::matcher::{PathTemplate, TemplateError};

/// How bodies are treated on an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvelopeMode {
    /// Plain JSON in and out.
    #[default]
    Plain,
    /// Plain request; response sealed when the session has a public key.
    SealedResponse,
    /// Request must be an envelope; response sealed as above.
    Sealed,
}

impl EnvelopeMode {
    pub fn decodes_request(&self) -> bool {
        matches!(self, EnvelopeMode::Sealed)
    }

    pub fn encodes_response(&self) -> bool {
        !matches!(self, EnvelopeMode::Plain)
    }
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error(transparent)]
    InvalidPath(#[from] TemplateError),

    #[error("operation {operation}: {source}")]
    UnknownPermission {
        operation: String,
        #[source]
        source: PermissionParseError,
    },

    #[error("operation {0} registered twice")]
    Duplicate(String),
}

/// Declaration of an operation, before validation.
#[derive(Debug, Clone)]
pub struct OperationSpec {
    method: Method,
    path: String,
    declared: Vec<String>,
    typed: Vec<Permission>,
    envelope: EnvelopeMode,
}

impl OperationSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            declared: Vec::new(),
            typed: Vec::new(),
            envelope: EnvelopeMode::Plain,
        }
    }

    /// Require a permission by its `Resource.action` name.
    pub fn requires(mut self, declaration: &str) -> Self {
        self.declared.push(declaration.to_string());
        self
    }

    pub fn requires_permission(mut self, permission: Permission) -> Self {
        self.typed.push(permission);
        self
    }

    pub fn sealed(mut self) -> Self {
        self.envelope = EnvelopeMode::Sealed;
        self
    }

    pub fn sealed_response(mut self) -> Self {
        self.envelope = EnvelopeMode::SealedResponse;
        self
    }
}

/// A registered operation.
#[derive(Debug, Clone)]
pub struct Operation {
    id: String,
    method: Method,
    template: PathTemplate,
    required: Vec<Permission>,
    envelope: EnvelopeMode,
}

impl Operation {
    /// e.g. `PUT /manuals/{id}`
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        self.template.as_str()
    }

    /// Any one of these suffices. Empty means public.
    pub fn required(&self) -> &[Permission] {
        &self.required
    }

    pub fn envelope(&self) -> EnvelopeMode {
        self.envelope
    }
}

#[derive(Debug, Default)]
pub struct OperationTable {
    operations: Vec<Operation>,
}

impl OperationTable {
    pub fn build(specs: impl IntoIterator<Item = OperationSpec>) -> Result<Self, RegistrationError> {
        let mut operations: Vec<Operation> = Vec::new();

        for spec in specs {
            let template = PathTemplate::parse(&spec.path)?;
            let id = format!("{} {}", spec.method, template.as_str());
            if operations.iter().any(|op| op.id == id) {
                return Err(RegistrationError::Duplicate(id));
            }

            let mut required = spec.typed;
            for declaration in &spec.declared {
                let permission = declaration.parse::<Permission>().map_err(|source| {
                    RegistrationError::UnknownPermission {
                        operation: id.clone(),
                        source,
                    }
                })?;
                if !required.contains(&permission) {
                    required.push(permission);
                }
            }

            tracing::debug!(operation = %id, permissions = required.len(), envelope = ?spec.envelope, "Registered operation");
            operations.push(Operation {
                id,
                method: spec.method,
                template,
                required,
                envelope: spec.envelope,
            });
        }

        // stable sort keeps registration order among equals
        operations.sort_by(|a, b| b.template.specificity().cmp(&a.template.specificity()));
        Ok(Self { operations })
    }

    pub fn resolve(&self, method: &Method, path: &str) -> Option<&Operation> {
        self.operations
            .iter()
            .find(|op| op.method == *method && op.template.matches(path).is_some())
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::model::{ActionType, ResourceType};

    #[test]
    fn test_build_and_resolve() {
        let table = OperationTable::build([
            OperationSpec::new(Method::GET, "/manuals/{id}"),
            OperationSpec::new(Method::GET, "/manuals/latest"),
            OperationSpec::new(Method::PUT, "/manuals/{id}")
                .requires("Manual.update")
                .sealed(),
        ])
        .unwrap();

        let op = table.resolve(&Method::PUT, "/manuals/9").unwrap();
        assert_eq!(op.id(), "PUT /manuals/{id}");
        assert_eq!(
            op.required(),
            &[Permission::new(ResourceType::Manual, ActionType::Update)]
        );
        assert_eq!(op.envelope(), EnvelopeMode::Sealed);

        // literal beats parameter regardless of registration order
        assert_eq!(
            table.resolve(&Method::GET, "/manuals/latest").unwrap().path(),
            "/manuals/latest"
        );
        assert!(table.resolve(&Method::DELETE, "/manuals/9").is_none());
    }

    #[test]
    fn test_unknown_permission_fails_registration() {
        let err = OperationTable::build([
            OperationSpec::new(Method::PUT, "/manuals/{id}").requires("Manual.fly"),
        ])
        .unwrap_err();
        assert!(matches!(err, RegistrationError::UnknownPermission { ref operation, .. } if operation == "PUT /manuals/{id}"));
    }

    #[test]
    fn test_duplicate_operation() {
        let err = OperationTable::build([
            OperationSpec::new(Method::GET, "/health"),
            OperationSpec::new(Method::GET, "/health"),
        ])
        .unwrap_err();
        assert!(matches!(err, RegistrationError::Duplicate(_)));
    }
}
