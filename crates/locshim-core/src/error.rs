//! Error taxonomy for the override subsystem.
//!
//! Nothing here is fatal to the host process: every variant degrades to
//! "override not applied for this request/session". Validation failures
//! leave proxy state untouched; a bind failure leaves the control service
//! stopped while the application keeps running.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Rejected coordinate input. The fake position is unchanged and no
/// listener is notified when one of these is returned.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ValidationError {
    #[error("latitude out of range [-90, 90]: {0}")]
    LatitudeOutOfRange(f64),

    #[error("longitude out of range [-180, 180]: {0}")]
    LongitudeOutOfRange(f64),

    #[error("horizontal accuracy must be non-negative: {0}")]
    NegativeAccuracy(f64),

    #[error("{field} is not a finite number")]
    NotFinite { field: &'static str },
}

/// Malformed control request text. Treated as a no-op plus an error
/// response; never a partial state mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed request line")]
    MalformedRequest,

    #[error("missing required parameter: {0}")]
    MissingParam(&'static str),

    #[error("parameter {param} is not a number: {value:?}")]
    InvalidNumber { param: &'static str, value: String },

    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),
}

/// The control service could not acquire its listening address. The server
/// stays stopped; a later start attempt may succeed.
#[derive(Debug, Error)]
#[error("failed to bind control service on {addr}: {source}")]
pub struct BindError {
    pub addr: SocketAddr,
    #[source]
    pub source: io::Error,
}
