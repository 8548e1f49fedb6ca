//! Network interface snapshot for the status and help pages
//!
//! Enumeration goes through `sysinfo`; the result is cached behind a mutex
//! and refreshed once it is older than the TTL.

use parking_lot::Mutex;
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;
use sysinfo::Networks;
use tokio::time::Instant;

pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// One interface with its routable addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub name: String,
    pub addresses: Vec<IpAddr>,
}

impl fmt::Display for InterfaceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let addresses: Vec<String> = self.addresses.iter().map(IpAddr::to_string).collect();
        write!(f, "{}\t{}", self.name, addresses.join(", "))
    }
}

type Source = Box<dyn Fn() -> Vec<InterfaceInfo> + Send + Sync>;

pub struct NetworkInspector {
    ttl: Duration,
    source: Source,
    cache: Mutex<Option<(Instant, Vec<InterfaceInfo>)>>,
}

impl NetworkInspector {
    /// Inspector backed by the host's interfaces
    pub fn new(ttl: Duration) -> Self {
        Self::with_source(ttl, system_interfaces)
    }

    pub fn with_source<F>(ttl: Duration, source: F) -> Self
    where
        F: Fn() -> Vec<InterfaceInfo> + Send + Sync + 'static,
    {
        Self {
            ttl,
            source: Box::new(source),
            cache: Mutex::new(None),
        }
    }

    /// Interfaces with at least one routable address, sorted by name
    pub fn snapshot(&self) -> Vec<InterfaceInfo> {
        let mut cache = self.cache.lock();
        if let Some((taken_at, interfaces)) = cache.as_ref()
            && taken_at.elapsed() < self.ttl
        {
            return interfaces.clone();
        }

        let interfaces = (self.source)();
        tracing::debug!(count = interfaces.len(), "Network snapshot refreshed");
        *cache = Some((Instant::now(), interfaces.clone()));
        interfaces
    }
}

impl Default for NetworkInspector {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl fmt::Debug for NetworkInspector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkInspector")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

fn system_interfaces() -> Vec<InterfaceInfo> {
    let networks = Networks::new_with_refreshed_list();
    let mut interfaces: Vec<InterfaceInfo> = networks
        .iter()
        .filter_map(|(name, data)| {
            let addresses: Vec<IpAddr> = data
                .ip_networks()
                .iter()
                .map(|net| net.addr)
                .filter(is_routable)
                .collect();
            (!addresses.is_empty()).then(|| InterfaceInfo {
                name: name.clone(),
                addresses,
            })
        })
        .collect();
    interfaces.sort_by(|a, b| a.name.cmp(&b.name));
    interfaces
}

fn is_routable(addr: &IpAddr) -> bool {
    if addr.is_loopback() || addr.is_unspecified() || addr.is_multicast() {
        return false;
    }
    match addr {
        IpAddr::V4(v4) => !v4.is_link_local(),
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) != 0xfe80,
    }
}
