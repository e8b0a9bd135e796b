//! Path template matching.
//!
//! # Design Decisions
//! - Templates are split into segments once, at registration
//! - `{name}` matches exactly one non-empty segment
//! - No regex; matching is a single pass over the segments
//! - Path matching is case-sensitive

use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid path template '{template}': {reason}")]
pub struct TemplateError {
    pub template: String,
    pub reason: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A compiled path such as `/manuals/{id}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        let err = |reason| TemplateError {
            template: template.to_string(),
            reason,
        };
        let rest = template.strip_prefix('/').ok_or_else(|| err("must start with '/'"))?;

        let mut segments = Vec::new();
        if !rest.is_empty() {
            for seg in rest.split('/') {
                if seg.is_empty() {
                    return Err(err("empty segment"));
                }
                match seg.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                    Some("") => return Err(err("empty parameter name")),
                    Some(name) => segments.push(Segment::Param(name.to_string())),
                    None if seg.contains(['{', '}']) => return Err(err("unbalanced braces")),
                    None => segments.push(Segment::Literal(seg.to_string())),
                }
            }
        }

        Ok(Self {
            raw: template.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Number of literal segments; more literals means more specific.
    pub fn specificity(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count()
    }

    /// Captured parameters if `path` matches. A single trailing slash is
    /// ignored.
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let path = path.strip_prefix('/')?;
        let path = path.strip_suffix('/').unwrap_or(path);
        let parts: Vec<&str> = if path.is_empty() {
            Vec::new()
        } else {
            path.split('/').collect()
        };
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(lit) if lit == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(_) if part.is_empty() => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), part.to_string());
                }
            }
        }
        Some(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_and_param() {
        let t = PathTemplate::parse("/manuals/{id}").unwrap();
        let params = t.matches("/manuals/42").unwrap();
        assert_eq!(params["id"], "42");

        assert!(t.matches("/manuals/42/").is_some());
        assert!(t.matches("/manuals").is_none());
        assert!(t.matches("/Manuals/42").is_none());
        assert!(t.matches("/manuals/42/pages").is_none());
        assert_eq!(t.specificity(), 1);
    }

    #[test]
    fn test_root() {
        let t = PathTemplate::parse("/").unwrap();
        assert!(t.matches("/").is_some());
        assert!(t.matches("/x").is_none());
    }

    #[test]
    fn test_rejects_bad_templates() {
        assert!(PathTemplate::parse("manuals").is_err());
        assert!(PathTemplate::parse("/a//b").is_err());
        assert!(PathTemplate::parse("/a/{}").is_err());
        assert!(PathTemplate::parse("/a/{id").is_err());
    }
}
