#![forbid(unsafe_code)]

//! Core data model for locshim: fake positions and their validation, the
//! provider seams application code talks through, the per-instance property
//! store, and the error taxonomy shared across the workspace.
//!
//! This crate is deliberately leaf-level: no networking, no global state.
//! The proxy singleton, interception registry, and control service live in
//! the `locshim` crate and are built on top of these types.

pub mod error;
pub mod position;
pub mod provider;
pub mod store;

pub use error::{BindError, ParseError, ValidationError};
pub use position::FakePosition;
pub use provider::{AuthorizationStatus, Heading, LocationBackend, LocationListener, NoopBackend};
pub use store::{InstanceId, InstanceProperty, PropertyStore};
