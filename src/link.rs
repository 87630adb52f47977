//! Network uplink used for time sync. Out of reach after the retry budget
//! means offline mode with the configuration portal.

use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::thread;
use std::time::Duration;

use log::{info, warn};
use thiserror::Error;

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct WifiCredentials {
    pub ssid: String,
    pub passwd: String,
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("network '{ssid}' not reachable after {attempts} attempts")]
    Unreachable { ssid: String, attempts: u32 },
}

pub trait NetworkLink {
    /// Tries up to the configured retry count. `on_retry` receives the
    /// attempts left after each failure.
    fn connect(
        &mut self,
        credentials: &WifiCredentials,
        on_retry: &mut dyn FnMut(u32),
    ) -> Result<(), LinkError>;

    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;
}

/// Host stand-in: the link is up when a route to the probe address exists.
pub struct HostLink {
    probe: String,
    retries: u32,
    retry_delay: Duration,
    connected: bool,
}

impl HostLink {
    pub fn new(probe: impl Into<String>, retries: u32, retry_delay: Duration) -> Self {
        Self {
            probe: probe.into(),
            retries,
            retry_delay,
            connected: false,
        }
    }

    fn route_exists(&self) -> bool {
        let Some(target) = resolve(&self.probe) else {
            return false;
        };
        let Ok(socket) = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)) else {
            return false;
        };
        socket.connect(target).is_ok()
    }
}

fn resolve(probe: &str) -> Option<SocketAddr> {
    probe.to_socket_addrs().ok()?.find(SocketAddr::is_ipv4)
}

impl NetworkLink for HostLink {
    fn connect(
        &mut self,
        credentials: &WifiCredentials,
        on_retry: &mut dyn FnMut(u32),
    ) -> Result<(), LinkError> {
        let mut remaining = self.retries;
        loop {
            if self.route_exists() {
                self.connected = true;
                info!("link up via '{}' (probe {})", credentials.ssid, self.probe);
                return Ok(());
            }
            if remaining == 0 {
                self.connected = false;
                warn!("link to '{}' failed", credentials.ssid);
                return Err(LinkError::Unreachable {
                    ssid: credentials.ssid.clone(),
                    attempts: self.retries + 1,
                });
            }
            remaining -= 1;
            on_retry(remaining);
            thread::sleep(self.retry_delay);
        }
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
