use std::io::Read;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use log::{info, warn};
use mdns_sd::{ServiceDaemon, ServiceInfo};
use serde::Serialize;
use tiny_http::{Header, Method, Response, Server, StatusCode};

use crate::link::WifiCredentials;

const MDNS_SERVICE_TYPE: &str = "_http._tcp.local.";

const SETUP_PAGE_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Alarm clock setup</title></head>
<body>
<h1>Network setup</h1>
<form method="POST" action="/setWifi">
<label>SSID <input name="ssid"></label><br>
<label>Password <input name="passwd" type="password"></label><br>
<button type="submit">Connect</button>
</form>
</body>
</html>
"#;

#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub bind_addr: String,
    pub port: u16,
    pub mdns_enabled: bool,
    pub hostname: String,
}

/// Snapshot served on `GET /status`.
#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct PortalStatus {
    pub hostname: String,
    pub offline: bool,
    pub time: String,
    pub next_alarm: Option<String>,
    pub dismiss_pending: bool,
    pub sound: String,
}

/// What the portal needs from the device.
pub trait PortalHandler {
    fn status(&self) -> PortalStatus;
    /// Returns whether the link came up with the new credentials.
    fn set_wifi(&mut self, credentials: WifiCredentials) -> bool;
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum PortalBody {
    Text(String),
    Html(&'static str),
    Json(String),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PortalResponse {
    pub status: u16,
    pub body: PortalBody,
}

impl PortalResponse {
    fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            body: PortalBody::Text(body.to_string()),
        }
    }
}

/// Configuration web page served while the device is offline. Requests are
/// handled on the caller's thread through [`ConfigPortal::poll`].
pub struct ConfigPortal {
    server: Server,
    address: SocketAddr,
    mdns: Option<ServiceDaemon>,
}

impl ConfigPortal {
    pub fn start(config: &PortalConfig) -> Result<Self> {
        let bind = format!("{}:{}", config.bind_addr, config.port);
        let server = Server::http(&bind)
            .map_err(|err| anyhow::anyhow!("failed to start portal on {bind}: {err}"))?;
        let address = server
            .server_addr()
            .to_ip()
            .ok_or_else(|| anyhow::anyhow!("portal on {bind} is not bound to an IP socket"))?;

        let mdns = if config.mdns_enabled {
            match start_mdns_advertisement(address.port(), &config.hostname) {
                Ok(daemon) => Some(daemon),
                Err(err) => {
                    warn!("mDNS advertisement disabled: {err}");
                    None
                }
            }
        } else {
            None
        };

        info!("configuration portal listening on {address}");
        Ok(Self {
            server,
            address,
            mdns,
        })
    }

    #[cfg(test)]
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Address to show on the display: the routed LAN address when the
    /// portal listens on every interface.
    pub fn display_address(&self) -> String {
        let ip = if self.address.ip().is_unspecified() {
            detect_lan_addresses()
                .first()
                .copied()
                .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
        } else {
            self.address.ip()
        };
        format!("{ip}:{}", self.address.port())
    }

    /// Serves at most one request. Returns whether one was handled.
    pub fn poll(&self, timeout: Duration, handler: &mut dyn PortalHandler) -> bool {
        match self.server.recv_timeout(timeout) {
            Ok(Some(request)) => {
                handle_request(request, handler);
                true
            }
            Ok(None) => false,
            Err(err) => {
                warn!("portal receive failed: {err}");
                false
            }
        }
    }
}

impl Drop for ConfigPortal {
    fn drop(&mut self) {
        if let Some(mdns) = self.mdns.take() {
            let _ = mdns.shutdown();
        }
    }
}

fn handle_request(mut request: tiny_http::Request, handler: &mut dyn PortalHandler) {
    let method = request.method().clone();
    let url = request.url().to_string();
    let mut body = String::new();
    if let Err(err) = request.as_reader().read_to_string(&mut body) {
        warn!("portal could not read body of {method} {url}: {err}");
        let _ = send_text(request, StatusCode(400), "unreadable body");
        return;
    }

    let response = route(&method, &url, &body, handler);
    info!("portal {method} {url} -> {}", response.status);
    let status = StatusCode(response.status);
    let sent = match response.body {
        PortalBody::Text(text) => send_text(request, status, &text),
        PortalBody::Html(html) => send_html(request, status, html),
        PortalBody::Json(json) => send_json(request, status, json),
    };
    if let Err(err) = sent {
        warn!("portal response to {url} failed: {err}");
    }
}

pub fn route(
    method: &Method,
    url: &str,
    body: &str,
    handler: &mut dyn PortalHandler,
) -> PortalResponse {
    let (path, query) = split_path_query(url);
    match path {
        "/" if method == &Method::Get => PortalResponse {
            status: 200,
            body: PortalBody::Html(SETUP_PAGE_HTML),
        },
        "/status" if method == &Method::Get => match serde_json::to_string(&handler.status()) {
            Ok(json) => PortalResponse {
                status: 200,
                body: PortalBody::Json(json),
            },
            Err(err) => PortalResponse::text(500, &format!("status encoding failed: {err}")),
        },
        "/setWifi" => {
            if method != &Method::Post {
                return PortalResponse::text(405, "Method not allowed");
            }
            let field = |key: &str| form_param(body, key).or_else(|| form_param(query, key));
            let (Some(ssid), Some(passwd)) = (field("ssid"), field("passwd")) else {
                return PortalResponse::text(400, "Missing parameters");
            };
            if handler.set_wifi(WifiCredentials { ssid, passwd }) {
                PortalResponse::text(200, "OK")
            } else {
                PortalResponse::text(500, "Could not connect to the network")
            }
        }
        "/" | "/status" => PortalResponse::text(405, "Method not allowed"),
        _ => PortalResponse::text(404, "not found"),
    }
}

fn start_mdns_advertisement(port: u16, hostname: &str) -> Result<ServiceDaemon> {
    let daemon = ServiceDaemon::new()
        .map_err(|err| anyhow::anyhow!("could not create mDNS daemon: {err}"))?;

    let host_name = format!("{hostname}.local.");
    let mut addresses = detect_lan_addresses();
    if addresses.is_empty() {
        addresses.push(Ipv4Addr::LOCALHOST.into());
    }

    let service = ServiceInfo::new(
        MDNS_SERVICE_TYPE,
        hostname,
        &host_name,
        addresses.as_slice(),
        port,
        None,
    )
    .map_err(|err| anyhow::anyhow!("could not create mDNS service info: {err}"))?;
    daemon
        .register(service)
        .map_err(|err| anyhow::anyhow!("could not register mDNS service: {err}"))?;
    Ok(daemon)
}

fn detect_lan_addresses() -> Vec<IpAddr> {
    let mut addresses = Vec::<IpAddr>::new();
    if let Ok(socket) = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        && socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80)).is_ok()
        && let Ok(local) = socket.local_addr()
    {
        let ip = local.ip();
        if ip.is_ipv4() && !ip.is_loopback() {
            addresses.push(ip);
        }
    }
    addresses
}

fn send_json(request: tiny_http::Request, status: StatusCode, body: String) -> Result<()> {
    let content_type = Header::from_str("Content-Type: application/json; charset=utf-8")
        .map_err(|_| anyhow::anyhow!("failed to build content-type header"))?;
    request.respond(
        Response::from_string(body)
            .with_status_code(status)
            .with_header(content_type),
    )?;
    Ok(())
}

fn send_text(request: tiny_http::Request, status: StatusCode, body: &str) -> Result<()> {
    let content_type = Header::from_str("Content-Type: text/plain; charset=utf-8")
        .map_err(|_| anyhow::anyhow!("failed to build content-type header"))?;
    request.respond(
        Response::from_string(body.to_string())
            .with_status_code(status)
            .with_header(content_type),
    )?;
    Ok(())
}

fn send_html(request: tiny_http::Request, status: StatusCode, body: &str) -> Result<()> {
    let content_type = Header::from_str("Content-Type: text/html; charset=utf-8")
        .map_err(|_| anyhow::anyhow!("failed to build content-type header"))?;
    request.respond(
        Response::from_string(body.to_string())
            .with_status_code(status)
            .with_header(content_type),
    )?;
    Ok(())
}

fn split_path_query(url: &str) -> (&str, &str) {
    match url.split_once('?') {
        Some((path, query)) => (path, query),
        None => (url, ""),
    }
}

/// Decoded value of `key` in an `application/x-www-form-urlencoded` string.
fn form_param(encoded: &str, key: &str) -> Option<String> {
    for pair in encoded.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (k, v) = match pair.split_once('=') {
            Some((k, v)) => (k, v),
            None => (pair, ""),
        };
        if form_decode(k) == key {
            return Some(form_decode(v));
        }
    }
    None
}

fn form_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'+' => decoded.push(b' '),
            b'%' if index + 2 < bytes.len() => {
                match (hex_value(bytes[index + 1]), hex_value(bytes[index + 2])) {
                    (Some(high), Some(low)) => {
                        decoded.push(high << 4 | low);
                        index += 2;
                    }
                    _ => decoded.push(b'%'),
                }
            }
            byte => decoded.push(byte),
        }
        index += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

fn hex_value(digit: u8) -> Option<u8> {
    char::from(digit).to_digit(16).map(|value| value as u8)
}
