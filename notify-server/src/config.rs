//! Configuration for the event notification server.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Configuration for the [`EventServer`](crate::EventServer).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to. This must be reachable from the
    /// devices that will deliver NOTIFY requests, since it is also what the
    /// `CALLBACK` subscription header advertises.
    pub listen_host: IpAddr,

    /// Port the HTTP listener binds to. Port 0 asks the OS for a free port.
    pub listen_port: u16,

    /// Grace period given to outstanding connections during shutdown before
    /// they are forced closed.
    /// Default: 5 seconds
    pub drain_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            listen_port: 3400,
            drain_timeout: Duration::from_secs(5),
        }
    }
}
