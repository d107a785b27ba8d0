use crate::models::UNKNOWN_DEVICE;
use std::collections::HashMap;
use std::io;
use std::net::IpAddr;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, trace};

/// Reverse lookup of an address to host names.
pub trait Resolver: Send + Sync {
    fn lookup(&self, addr: IpAddr) -> io::Result<Vec<String>>;
}

/// Resolver backed by the platform's `getnameinfo`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn lookup(&self, addr: IpAddr) -> io::Result<Vec<String>> {
        dns_lookup::lookup_addr(&addr).map(|name| hostnames(addr, name))
    }
}

// getnameinfo falls back to the numeric form when there is no PTR record.
fn hostnames(addr: IpAddr, name: String) -> Vec<String> {
    let name = name.trim_end_matches('.');
    if name.is_empty() || name.parse::<IpAddr>().is_ok_and(|parsed| parsed == addr) {
        return Vec::new();
    }
    vec![name.to_string()]
}

/// Memoizes address to display-name resolution for one capture session.
///
/// Failed and empty lookups are cached as `"Unknown"` and never retried. Two
/// threads missing on the same address may both hit the resolver; the first
/// insert wins.
#[derive(Clone)]
pub struct DeviceCache {
    names: Arc<RwLock<HashMap<IpAddr, String>>>,
    resolver: Arc<dyn Resolver>,
}

impl DeviceCache {
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        Self {
            names: Arc::new(RwLock::new(HashMap::new())),
            resolver,
        }
    }

    pub fn resolve(&self, addr: IpAddr) -> String {
        if let Some(name) = self
            .names
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&addr)
        {
            trace!(%addr, name = %name, "device name cache hit");
            return name.clone();
        }

        let name = match self.resolver.lookup(addr) {
            Ok(names) => names
                .into_iter()
                .next()
                .unwrap_or_else(|| UNKNOWN_DEVICE.to_string()),
            Err(e) => {
                debug!(%addr, error = %e, "hostname lookup failed");
                UNKNOWN_DEVICE.to_string()
            }
        };

        self.names
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(addr)
            .or_insert(name)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.names.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
