use garnet_binary::MacAddr;
use std::net::Ipv4Addr;

/// A router interface. The set of interfaces is fixed at startup.
#[derive(Debug, Clone)]
pub struct Interface {
    pub name: String,
    pub ip: Ipv4Addr,
    pub mac: MacAddr,
}

impl Interface {
    pub fn new(name: impl Into<String>, ip: Ipv4Addr, mac: MacAddr) -> Self {
        Self {
            name: name.into(),
            ip,
            mac,
        }
    }
}
