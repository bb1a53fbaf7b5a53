//! Host matching rules, most to least specific.

use crate::http::types::Host;
use std::collections::{HashMap, HashSet};

/// A matching rule over the request's [`Host`], from exact to wildcard.
///
/// Resolution always prefers the most specific rule that matches:
/// `Exact` over [`AnyPort`](HostPattern::AnyPort) over
/// [`AnyHost`](HostPattern::AnyHost) over [`Any`](HostPattern::Any).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HostPattern {
    /// This name on this port only.
    Exact { name: String, port: u16 },
    /// This name, whatever the port (including requests without one).
    AnyPort { name: String },
    /// Any name, but only this port.
    AnyHost { port: u16 },
    /// Matches every request.
    Any,
}

impl HostPattern {
    pub fn exact(name: impl Into<String>, port: u16) -> Self {
        Self::Exact {
            name: name.into().to_ascii_lowercase(),
            port,
        }
    }

    pub fn any_port(name: impl Into<String>) -> Self {
        Self::AnyPort {
            name: name.into().to_ascii_lowercase(),
        }
    }

    pub const fn any_host(port: u16) -> Self {
        Self::AnyHost { port }
    }

    /// Specificity rank, 0 being the most specific. Resolution walks ranks
    /// in ascending order.
    pub(crate) const fn tier(&self) -> usize {
        match self {
            Self::Exact { .. } => 0,
            Self::AnyPort { .. } => 1,
            Self::AnyHost { .. } => 2,
            Self::Any => 3,
        }
    }

    pub(crate) fn matches(&self, host: &Host) -> bool {
        match self {
            Self::Exact { name, port } => {
                host.name() == name && host.port() == Some(*port)
            }
            Self::AnyPort { name } => host.name() == name,
            Self::AnyHost { port } => host.port() == Some(*port),
            Self::Any => true,
        }
    }
}

impl Default for HostPattern {
    fn default() -> Self {
        Self::Any
    }
}

/// Host name to tenant-set mapping, for multi-tenant deployments.
///
/// Tenancy sits on top of host resolution, not inside it: routes stay
/// host-pattern based, while handlers consult this map to scope their data
/// per tenant. Populated at startup, read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct TenantMap {
    tenants: HashMap<String, HashSet<String>>,
}

impl TenantMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates a tenant with a host name. Idempotent.
    pub fn assign(&mut self, host_name: impl Into<String>, tenant: impl Into<String>) {
        self.tenants
            .entry(host_name.into().to_ascii_lowercase())
            .or_default()
            .insert(tenant.into());
    }

    /// Tenants configured for the host the request was addressed to.
    pub fn tenants_for(&self, host: &Host) -> impl Iterator<Item = &str> {
        self.tenants
            .get(host.name())
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }
}
