use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener};

use serde::Serialize;

use crate::error::{Error, Result};

/// Port the server should listen on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Port {
    /// Probe the OS for a free port right before launch.
    Auto,
    Fixed(u16),
}

/// Validated bind address and port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkOptions {
    bind_ip: String,
    port: Port,
}

impl NetworkOptions {
    /// `port` of 0 or `None` means auto-assign; anything else must be in 1..=65535.
    pub fn new(bind_ip: &str, port: Option<u32>) -> Result<Self> {
        let bind_ip = bind_ip.trim();
        if bind_ip.is_empty() {
            return Err(Error::InvalidBindAddress("bind address must not be empty".to_string()));
        }
        if bind_ip != "localhost" && bind_ip.parse::<IpAddr>().is_err() {
            return Err(Error::InvalidBindAddress(bind_ip.to_string()));
        }

        let port = match port {
            None | Some(0) => Port::Auto,
            Some(p) if p <= u16::MAX as u32 => Port::Fixed(p as u16),
            Some(p) => return Err(Error::InvalidPort(p)),
        };

        Ok(Self {
            bind_ip: bind_ip.to_string(),
            port,
        })
    }

    /// Loopback on an auto-assigned port.
    pub fn loopback() -> Self {
        Self {
            bind_ip: Ipv4Addr::LOCALHOST.to_string(),
            port: Port::Auto,
        }
    }

    pub fn bind_ip(&self) -> &str {
        &self.bind_ip
    }

    pub fn port(&self) -> Port {
        self.port
    }

    pub fn is_ipv6(&self) -> bool {
        matches!(self.ip(), IpAddr::V6(_))
    }

    pub(crate) fn ip(&self) -> IpAddr {
        if self.bind_ip == "localhost" {
            return IpAddr::V4(Ipv4Addr::LOCALHOST);
        }
        self.bind_ip.parse().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }

    /// Address clients should dial; wildcard binds are reached over loopback.
    pub fn connect_ip(&self) -> IpAddr {
        match self.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            ip => ip,
        }
    }

    /// Resolve the port to bind, probing for a free one when auto-assigned.
    pub fn resolve_port(&self) -> Result<u16> {
        match self.port {
            Port::Fixed(port) => Ok(port),
            Port::Auto => free_server_port(self.ip()),
        }
    }
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self::loopback()
    }
}

/// Ask the OS for a free port on `ip`.
///
/// The listener is dropped before returning, so another process may still
/// grab the port before `mongod` binds it.
pub fn free_server_port(ip: IpAddr) -> Result<u16> {
    let listener = TcpListener::bind(SocketAddr::new(ip, 0)).inspect_err(|e| {
        tracing::error!("Could not get free server port: {}", e);
    })?;
    Ok(listener.local_addr()?.port())
}
