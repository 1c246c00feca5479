#![forbid(unsafe_code)]

//! Remote-controlled fake location delivery for applications under test.
//!
//! An application that constructs [`LocationManager`] instances can be fed
//! fabricated positions over the local network: [`install`] redirects every
//! manager constructed afterwards through a shared [`LocationProxy`], and
//! the proxy's control service accepts simple HTTP commands
//! (`/setlocation?lat=..&lon=..&acc=..`) that move the fake position and
//! fan it out to every registered listener.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use locshim::{FakePosition, LocationListener, LocationManager, LocationProxy};
//!
//! struct Tracker;
//!
//! impl LocationListener for Tracker {
//!     fn on_location_update(&self, new: &FakePosition, _previous: &FakePosition) {
//!         println!("moved to {}, {}", new.latitude(), new.longitude());
//!     }
//! }
//!
//! locshim::install();
//! LocationProxy::shared().start_server().expect("bind control port");
//!
//! let manager = LocationManager::new();
//! let tracker = Arc::new(Tracker);
//! manager.set_listener(&tracker);
//! manager.start_location_updates();
//! // Now point a browser at http://<device>:9247/ and move the device.
//! ```
//!
//! Hosts with a primary-context loop should call
//! [`LocationProxy::install_pump`] and drain the returned
//! [`NotificationPump`] from that loop, so listener callbacks run where the
//! platform contract expects them instead of on connection threads.

pub mod control;
pub mod dispatch;
pub mod http;
pub mod intercept;
pub mod netinfo;
pub mod proxy;

pub use control::{CONTROL_PORT, ControlConfig};
pub use dispatch::{Dispatcher, NotificationPump};
pub use intercept::{LocationManager, install, register_system_backend};
pub use proxy::LocationProxy;

pub use locshim_core::{
    AuthorizationStatus, BindError, FakePosition, Heading, InstanceId, InstanceProperty,
    LocationBackend, LocationListener, NoopBackend, ParseError, PropertyStore, ValidationError,
};
