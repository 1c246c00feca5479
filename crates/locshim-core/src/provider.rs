//! Seams between application code and the location subsystem.
//!
//! The platform's provider type cannot be extended or patched in place, so
//! the manager type delegates every operation through [`LocationBackend`],
//! and the interception layer decides which implementation newly
//! constructed managers receive. Application callbacks arrive through
//! [`LocationListener`], mirroring the platform's delegate contract.

use std::sync::Weak;

use crate::position::FakePosition;

/// Heading snapshot delivered to [`LocationListener::on_heading_update`].
///
/// Nothing currently fabricates headings; the type exists so the listener
/// contract matches the platform delegate it stands in for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Heading {
    pub magnetic_heading: f64,
    pub true_heading: f64,
    pub accuracy: f64,
}

/// Authorization state reported by the location subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthorizationStatus {
    #[default]
    NotDetermined,
    Authorized,
    Denied,
}

/// Callback set an application registers against a location manager.
///
/// Implementations must be `Send + Sync`: the triggering mutation arrives
/// on a network-handling thread, and delivery is marshaled to whatever
/// context the host runs its notification pump on.
pub trait LocationListener: Send + Sync {
    /// A new fix is available. `previous` is the last fix delivered before
    /// it, matching the native "location changed" callback shape.
    fn on_location_update(&self, new: &FakePosition, previous: &FakePosition);

    /// Heading changed. Defaults to ignoring, since most listeners only
    /// track position.
    fn on_heading_update(&self, _heading: &Heading) {}
}

/// The location subsystem behind one manager instance.
///
/// System implementations talk to real hardware; the shim implementation
/// reroutes to the shared proxy. Any operation the interception layer does
/// not explicitly override must behave exactly as the system
/// implementation would.
pub trait LocationBackend: Send + Sync {
    fn start_location_updates(&self);
    fn stop_location_updates(&self);
    fn start_heading_updates(&self);
    fn stop_heading_updates(&self);

    /// Register the callback set. Backends hold the listener weakly; the
    /// application keeps ownership.
    fn set_listener(&self, listener: Weak<dyn LocationListener>);

    /// Last fix this backend delivered, if any.
    fn last_position(&self) -> Option<FakePosition>;

    fn authorization_status(&self) -> AuthorizationStatus {
        AuthorizationStatus::default()
    }

    fn location_services_enabled(&self) -> bool {
        true
    }
}

/// Backend used when the host registers no system implementation: every
/// operation is accepted and nothing is ever delivered.
#[derive(Debug, Default)]
pub struct NoopBackend;

impl LocationBackend for NoopBackend {
    fn start_location_updates(&self) {}
    fn stop_location_updates(&self) {}
    fn start_heading_updates(&self) {}
    fn stop_heading_updates(&self) {}
    fn set_listener(&self, _listener: Weak<dyn LocationListener>) {}

    fn last_position(&self) -> Option<FakePosition> {
        None
    }
}
