//! Bind address resolution
//!
//! Expands a configured listen address into the concrete addresses each
//! protocol engine binds. A wildcard address (`:port`) becomes one entry per
//! usable local interface address so that every listener knows the exact
//! local IP it serves, which FTP passive replies depend on.

use std::io;
use std::net::IpAddr;

use log::{debug, warn};

use crate::error::BindError;

/// One local network interface and the result of listing its addresses.
#[derive(Debug)]
pub struct NetInterface {
    pub name: String,
    pub addrs: io::Result<Vec<IpAddr>>,
}

/// Source of local interfaces, in the order the host reports them.
pub trait InterfaceSource {
    fn interfaces(&self) -> io::Result<Vec<NetInterface>>;
}

/// Interfaces of the running host
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemInterfaces;

impl InterfaceSource for SystemInterfaces {
    fn interfaces(&self) -> io::Result<Vec<NetInterface>> {
        let mut interfaces: Vec<NetInterface> = Vec::new();
        for iface in if_addrs::get_if_addrs()? {
            let ip = iface.ip();
            match interfaces.iter_mut().find(|known| known.name == iface.name) {
                Some(NetInterface { addrs: Ok(addrs), .. }) => addrs.push(ip),
                Some(_) => {}
                None => interfaces.push(NetInterface {
                    name: iface.name,
                    addrs: Ok(vec![ip]),
                }),
            }
        }
        Ok(interfaces)
    }
}

/// Resolve `addr` against the host's interfaces.
pub fn describe_address(addr: &str) -> Result<Vec<String>, BindError> {
    describe_address_with(addr, &SystemInterfaces)
}

/// Resolve `addr` against an explicit interface source.
///
/// Non-wildcard addresses are returned unchanged without touching the
/// interface source. Results keep interface order, then address order, and are
/// neither sorted nor deduplicated.
pub fn describe_address_with<S: InterfaceSource>(
    addr: &str,
    source: &S,
) -> Result<Vec<String>, BindError> {
    if !is_wildcard(addr) {
        return Ok(vec![addr.to_string()]);
    }

    let interfaces = source.interfaces().map_err(BindError::Interfaces)?;
    let mut bindable = Vec::with_capacity(interfaces.len());

    for iface in interfaces {
        let addrs = match iface.addrs {
            Ok(addrs) => addrs,
            Err(e) => {
                warn!("Error getting addresses for interface {}: {}", iface.name, e);
                continue;
            }
        };

        for ip in addrs {
            if !is_bindable(&ip) {
                debug!("Skipping {} on interface {}", ip, iface.name);
                continue;
            }
            bindable.push(format_bind_address(ip, addr));
        }
    }

    Ok(bindable)
}

/// A wildcard bind has an empty host in front of the port.
pub fn is_wildcard(addr: &str) -> bool {
    addr.starts_with(':')
}

/// Multicast and link-local addresses are never bind targets.
pub fn is_bindable(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => !(v4.is_multicast() || v4.is_link_local()),
        IpAddr::V6(v6) => {
            let link_local_unicast = (v6.segments()[0] & 0xffc0) == 0xfe80;
            !(v6.is_multicast() || link_local_unicast)
        }
    }
}

/// `port_suffix` is the wildcard text itself, e.g. `:21`.
fn format_bind_address(ip: IpAddr, port_suffix: &str) -> String {
    match ip {
        IpAddr::V4(v4) => format!("{v4}{port_suffix}"),
        IpAddr::V6(v6) => format!("[{v6}]{port_suffix}"),
    }
}
