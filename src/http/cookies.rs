//! Cookie header parsing.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderMap, Request},
};
use std::collections::HashMap;

use crate::pipeline::gate::{Gate, GateResult, Proceed};

/// Parsed request cookies, stored as a request extension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cookies(HashMap<String, String>);

impl Cookies {
    /// Later duplicates of a name are ignored.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut map = HashMap::new();
        for value in headers.get_all(header::COOKIE) {
            let Ok(value) = value.to_str() else { continue };
            for pair in value.split(';') {
                if let Some((name, val)) = pair.trim().split_once('=') {
                    let name = name.trim();
                    if !name.is_empty() {
                        map.entry(name.to_string())
                            .or_insert_with(|| val.trim().trim_matches('"').to_string());
                    }
                }
            }
        }
        Self(map)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

pub struct CookieGate;

#[async_trait]
impl Gate for CookieGate {
    fn name(&self) -> &'static str {
        "cookies"
    }

    async fn apply(&self, mut req: Request<Body>, next: Proceed<'_>) -> GateResult {
        let cookies = Cookies::from_headers(req.headers());
        req.extensions_mut().insert(cookies);
        next.run(req).await
    }
}
