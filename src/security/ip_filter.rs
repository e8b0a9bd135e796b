//! Client address allow/deny filtering.
//!
//! Rules live behind an `ArcSwap` so a config reload replaces them without
//! blocking in-flight requests.

use arc_swap::ArcSwap;
use async_trait::async_trait;
use axum::{body::Body, http::Request};
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::config::schema::IpFilterConfig;
use crate::http::error::GatewayError;
use crate::http::request::ClientAddr;
use crate::observability::metrics;
use crate::pipeline::gate::{Gate, GateResult, Proceed};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid IP rule '{0}'")]
pub struct IpRuleError(pub String);

/// A single address or a CIDR block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpRule {
    Exact(IpAddr),
    Cidr { network: IpAddr, prefix: u8 },
}

impl FromStr for IpRule {
    type Err = IpRuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || IpRuleError(s.to_string());
        let Some((addr, prefix)) = s.trim().split_once('/') else {
            return s.trim().parse().map(IpRule::Exact).map_err(|_| err());
        };

        let network: IpAddr = addr.parse().map_err(|_| err())?;
        let prefix: u8 = prefix.parse().map_err(|_| err())?;
        let max = if network.is_ipv4() { 32 } else { 128 };
        if prefix > max {
            return Err(err());
        }
        Ok(IpRule::Cidr { network, prefix })
    }
}

impl IpRule {
    pub fn matches(&self, ip: IpAddr) -> bool {
        match *self {
            IpRule::Exact(addr) => addr == ip,
            IpRule::Cidr { network: IpAddr::V4(net), prefix } => match ip {
                IpAddr::V4(ip) => {
                    let mask = u32::MAX.checked_shl(32 - prefix as u32).unwrap_or(0);
                    u32::from(net) & mask == u32::from(ip) & mask
                }
                IpAddr::V6(_) => false,
            },
            IpRule::Cidr { network: IpAddr::V6(net), prefix } => match ip {
                IpAddr::V6(ip) => {
                    let mask = u128::MAX.checked_shl(128 - prefix as u32).unwrap_or(0);
                    u128::from(net) & mask == u128::from(ip) & mask
                }
                IpAddr::V4(_) => false,
            },
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IpRules {
    allow: Vec<IpRule>,
    deny: Vec<IpRule>,
}

impl IpRules {
    pub fn from_config(config: &IpFilterConfig) -> Result<Self, IpRuleError> {
        let parse = |list: &[String]| list.iter().map(|s| s.parse()).collect::<Result<Vec<_>, _>>();
        Ok(Self {
            allow: parse(&config.allow)?,
            deny: parse(&config.deny)?,
        })
    }

    /// Deny wins. A non-empty allow list admits only its members.
    pub fn permits(&self, ip: IpAddr) -> bool {
        if self.deny.iter().any(|r| r.matches(ip)) {
            return false;
        }
        self.allow.is_empty() || self.allow.iter().any(|r| r.matches(ip))
    }

    pub fn is_empty(&self) -> bool {
        self.allow.is_empty() && self.deny.is_empty()
    }
}

pub struct IpFilterGate {
    rules: Arc<ArcSwap<IpRules>>,
}

impl IpFilterGate {
    pub fn new(rules: Arc<ArcSwap<IpRules>>) -> Self {
        Self { rules }
    }
}

#[async_trait]
impl Gate for IpFilterGate {
    fn name(&self) -> &'static str {
        "ip_filter"
    }

    async fn apply(&self, req: Request<Body>, next: Proceed<'_>) -> GateResult {
        let client = req.extensions().get::<ClientAddr>().and_then(|c| c.0);
        let verdict = {
            let rules = self.rules.load();
            match client {
                _ if rules.is_empty() => Ok(()),
                Some(ip) if rules.permits(ip) => Ok(()),
                Some(ip) => Err(ip.to_string()),
                // unknown peers can't be checked against an allow list
                None if rules.allow.is_empty() => Ok(()),
                None => Err("unknown".to_string()),
            }
        };

        if let Err(client) = verdict {
            tracing::warn!(client = %client, "Client address blocked");
            metrics::record_gate_rejection(self.name());
            return Err(GatewayError::IpBlocked(client));
        }
        next.run(req).await
    }
}
