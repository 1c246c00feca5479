#![forbid(unsafe_code)]

//! Control service: accept loop and per-connection handling.
//!
//! The service accepts short-lived connections on a fixed port, parses one
//! text command per connection, invokes the proxy, and writes one small
//! response. Each connection gets its own handler thread so a slow or
//! malformed client cannot block others. There is no shutdown path: the
//! accept loop runs for the life of the process.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Serialize;

use crate::http::{self, Request, Response};
use crate::proxy::LocationProxy;
use locshim_core::ParseError;

/// Fixed port the control service listens on.
pub const CONTROL_PORT: u16 = 9247;

/// Runtime configuration for the control service.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Address to bind the listener to.
    pub bind_addr: SocketAddr,
    /// Maximum bytes read from one request head before giving up.
    pub max_request_bytes: usize,
    /// Socket read timeout for one request.
    pub read_timeout: Duration,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], CONTROL_PORT)),
            max_request_bytes: 8 * 1024,
            read_timeout: Duration::from_secs(5),
        }
    }
}

impl ControlConfig {
    /// Loopback on an OS-assigned port, for tests.
    #[must_use]
    pub fn ephemeral() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            ..Self::default()
        }
    }
}

/// Accept connections until the listener dies with the process.
pub(crate) fn run_accept_loop(
    listener: TcpListener,
    proxy: Arc<LocationProxy>,
    config: ControlConfig,
) {
    loop {
        match listener.accept() {
            Ok((stream, peer)) => {
                let proxy = Arc::clone(&proxy);
                let config = config.clone();
                let spawned = thread::Builder::new()
                    .name("locshim-conn".into())
                    .spawn(move || handle_connection(stream, peer, &proxy, &config));
                if let Err(error) = spawned {
                    tracing::warn!(%error, "failed to spawn connection handler");
                }
            }
            Err(error) => {
                // Transient accept failures (e.g. fd exhaustion); back off
                // briefly and keep serving.
                tracing::warn!(%error, "accept failed");
                thread::sleep(Duration::from_millis(50));
            }
        }
    }
}

fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    proxy: &LocationProxy,
    config: &ControlConfig,
) {
    if let Err(error) = serve_one(stream, peer, proxy, config) {
        tracing::debug!(%peer, %error, "connection ended with error");
    }
}

/// Read one request, dispatch it, write one response, close.
fn serve_one(
    mut stream: TcpStream,
    peer: SocketAddr,
    proxy: &LocationProxy,
    config: &ControlConfig,
) -> io::Result<()> {
    stream.set_read_timeout(Some(config.read_timeout))?;
    stream.set_nodelay(true)?;

    let raw = http::read_request(&mut stream, config.max_request_bytes)?;
    let response = match http::parse_request(&raw) {
        Ok(request) => dispatch(&request, proxy),
        Err(error) => {
            tracing::warn!(%peer, %error, "malformed control request");
            Response::bad_request(&error.to_string())
        }
    };
    response.write_to(&mut stream)
}

fn dispatch(request: &Request, proxy: &LocationProxy) -> Response {
    match request.path() {
        "/setlocation" => set_location(request, proxy),
        "/getip" => get_ip(proxy),
        "/status" => status(proxy),
        "/" | "/index.html" => Response::html(http::CONTROL_PAGE),
        _ => Response::not_found(),
    }
}

fn coordinate_params(request: &Request) -> Result<(f64, f64, f64), ParseError> {
    Ok((
        request.float_param("lat")?,
        request.float_param("lon")?,
        request.float_param("acc")?,
    ))
}

fn set_location(request: &Request, proxy: &LocationProxy) -> Response {
    let (lat, lon, acc) = match coordinate_params(request) {
        Ok(triple) => triple,
        Err(error) => return Response::bad_request(&error.to_string()),
    };
    match proxy.set_location(lat, lon, acc) {
        Ok(()) => Response::html(confirmation_page(lat, lon, acc)),
        Err(error) => Response::bad_request(&error.to_string()),
    }
}

fn get_ip(proxy: &LocationProxy) -> Response {
    match proxy.current_outbound_ip() {
        Some(ip) => Response::text(format!("{ip}\n")),
        None => Response::not_found(),
    }
}

#[derive(Serialize)]
struct StatusBody {
    latitude: f64,
    longitude: f64,
    horizontal_accuracy: f64,
}

fn status(proxy: &LocationProxy) -> Response {
    let current = proxy.current_position();
    let body = StatusBody {
        latitude: current.latitude(),
        longitude: current.longitude(),
        horizontal_accuracy: current.horizontal_accuracy(),
    };
    match serde_json::to_string(&body) {
        Ok(json) => Response::json(json),
        Err(error) => {
            tracing::warn!(%error, "status serialization failed");
            Response::bad_request("status unavailable")
        }
    }
}

fn confirmation_page(lat: f64, lon: f64, acc: f64) -> String {
    format!(
        "<!DOCTYPE html>\n<html><body><p>location set to {lat}, {lon} (accuracy {acc})</p>\n\
         <p><a href=\"/\">back</a></p></body></html>\n"
    )
}
