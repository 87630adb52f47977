//! Minimal SNTP v3 client over a blocking UDP socket.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use log::{debug, info};

use crate::time_provider::{NetworkTime, TimeSyncError};

pub const NTP_PACKET_SIZE: usize = 48;
/// Seconds between 1900-01-01 and 1970-01-01.
pub const NTP_UNIX_OFFSET: i64 = 2_208_988_800;

/// LI=0, VN=3, Mode=3 (client).
const CLIENT_REQUEST: u8 = 0x1B;
const MAX_STRATUM: u8 = 15;
const TRANSMIT_TIMESTAMP_OFFSET: usize = 40;

pub fn request_packet() -> [u8; NTP_PACKET_SIZE] {
    let mut packet = [0u8; NTP_PACKET_SIZE];
    packet[0] = CLIENT_REQUEST;
    packet
}

/// Extracts the transmit timestamp as unix seconds.
pub fn parse_sntp_response(response: &[u8]) -> Result<i64, TimeSyncError> {
    if response.len() < NTP_PACKET_SIZE {
        return Err(TimeSyncError::ShortResponse {
            len: response.len(),
        });
    }
    let stratum = response[1];
    if stratum == 0 || stratum > MAX_STRATUM {
        return Err(TimeSyncError::Stratum { stratum });
    }
    let at = TRANSMIT_TIMESTAMP_OFFSET;
    let seconds = u32::from_be_bytes([
        response[at],
        response[at + 1],
        response[at + 2],
        response[at + 3],
    ]);
    Ok(i64::from(seconds) - NTP_UNIX_OFFSET)
}

pub struct SntpSource {
    server: SocketAddr,
    timeout: Duration,
}

impl SntpSource {
    /// Resolves `server` and performs one exchange to prove it answers.
    pub fn try_new(server: &str, timeout: Duration) -> Result<Self, TimeSyncError> {
        let addr = resolve(server)?;
        let mut source = Self {
            server: addr,
            timeout,
        };
        let epoch = source.fetch_epoch_seconds()?;
        info!("time server {server} ({addr}) answered with epoch {epoch}");
        Ok(source)
    }

    fn exchange(&self) -> Result<i64, TimeSyncError> {
        let bind_addr: SocketAddr = if self.server.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind_addr)?;
        socket.set_read_timeout(Some(self.timeout))?;
        socket.connect(self.server)?;
        socket.send(&request_packet())?;

        let mut response = [0u8; NTP_PACKET_SIZE];
        let len = socket.recv(&mut response).map_err(|err| match err.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {
                TimeSyncError::Timeout {
                    server: self.server,
                    timeout_ms: self.timeout.as_millis(),
                }
            }
            _ => TimeSyncError::Socket(err),
        })?;
        debug!("received {len} bytes from {}", self.server);
        parse_sntp_response(&response[..len])
    }
}

impl NetworkTime for SntpSource {
    fn fetch_epoch_seconds(&mut self) -> Result<i64, TimeSyncError> {
        self.exchange()
    }

    fn label(&self) -> &'static str {
        "SNTP"
    }
}

fn resolve(server: &str) -> Result<SocketAddr, TimeSyncError> {
    let mut addrs = server
        .to_socket_addrs()
        .map_err(|source| TimeSyncError::Resolve {
            server: server.to_string(),
            source: Some(source),
        })?;
    addrs.next().ok_or_else(|| TimeSyncError::Resolve {
        server: server.to_string(),
        source: None,
    })
}
