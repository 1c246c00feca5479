#![forbid(unsafe_code)]

//! Interception of the location-provider construction path.
//!
//! The platform provider type cannot be patched in place, so consumers go
//! through a process-wide factory instead: [`LocationManager::new`] asks
//! the registry for a backend. [`install`] swaps that factory exactly once,
//! after which every manager constructed anywhere in the process — and
//! every redirected operation on it — routes through the shared
//! [`LocationProxy`] instead of the system provider. Operations that are
//! not redirected (authorization state, service availability) pass through
//! to the captured system backend unchanged.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use arc_swap::ArcSwap;

use locshim_core::{
    AuthorizationStatus, FakePosition, InstanceId, LocationBackend, LocationListener, NoopBackend,
};

use crate::proxy::LocationProxy;

type SystemFactory = dyn Fn() -> Arc<dyn LocationBackend> + Send + Sync;

struct FactoryCell {
    make: Box<dyn Fn() -> Arc<dyn LocationBackend> + Send + Sync>,
}

fn factory_cell() -> &'static ArcSwap<FactoryCell> {
    static FACTORY: OnceLock<ArcSwap<FactoryCell>> = OnceLock::new();
    FACTORY.get_or_init(|| {
        ArcSwap::from_pointee(FactoryCell {
            make: Box::new(system_backend),
        })
    })
}

static SYSTEM: OnceLock<Box<SystemFactory>> = OnceLock::new();

/// Register the factory producing the real platform backend.
///
/// Managers constructed before [`install`], and pass-through operations
/// afterwards, use backends from this factory. Only the first registration
/// sticks; later calls are ignored.
pub fn register_system_backend(
    factory: impl Fn() -> Arc<dyn LocationBackend> + Send + Sync + 'static,
) {
    let _ = SYSTEM.set(Box::new(factory));
}

fn system_backend() -> Arc<dyn LocationBackend> {
    match SYSTEM.get() {
        Some(factory) => factory(),
        None => Arc::new(NoopBackend),
    }
}

/// Route every manager constructed from now on through the shared proxy.
///
/// Idempotent and process-wide: the first call applies the redirection and
/// returns `true`; every later call is a silent no-op returning `false`,
/// leaving the redirection exactly as the first call left it.
pub fn install() -> bool {
    static INSTALLED: AtomicBool = AtomicBool::new(false);
    if INSTALLED.swap(true, Ordering::SeqCst) {
        tracing::debug!("location interception already installed; ignoring");
        return false;
    }
    factory_cell().store(Arc::new(FactoryCell {
        make: Box::new(|| {
            let proxy = Arc::clone(LocationProxy::shared());
            Arc::new(ShimBackend::attach(proxy, system_backend()))
        }),
    }));
    tracing::info!("location provider interception installed");
    true
}

/// Backend that reroutes one intercepted instance to the shared proxy.
///
/// Holds the captured system backend for pass-through operations and
/// deregisters its property-store entry when the instance is destroyed.
struct ShimBackend {
    id: InstanceId,
    proxy: Arc<LocationProxy>,
    system: Arc<dyn LocationBackend>,
}

impl ShimBackend {
    fn attach(proxy: Arc<LocationProxy>, system: Arc<dyn LocationBackend>) -> Self {
        let id = proxy.store().register();
        Self { id, proxy, system }
    }
}

impl LocationBackend for ShimBackend {
    fn start_location_updates(&self) {
        self.proxy.store().set_location_updates_enabled(self.id, true);
    }

    fn stop_location_updates(&self) {
        self.proxy
            .store()
            .set_location_updates_enabled(self.id, false);
    }

    fn start_heading_updates(&self) {
        self.proxy.store().set_heading_updates_enabled(self.id, true);
    }

    fn stop_heading_updates(&self) {
        self.proxy
            .store()
            .set_heading_updates_enabled(self.id, false);
    }

    fn set_listener(&self, listener: Weak<dyn LocationListener>) {
        self.proxy.store().set_listener(self.id, listener);
    }

    fn last_position(&self) -> Option<FakePosition> {
        Some(self.proxy.current_position())
    }

    fn authorization_status(&self) -> AuthorizationStatus {
        self.system.authorization_status()
    }

    fn location_services_enabled(&self) -> bool {
        self.system.location_services_enabled()
    }
}

impl Drop for ShimBackend {
    fn drop(&mut self) {
        self.proxy.store().remove(self.id);
    }
}

/// Drop-in stand-in for the platform's location manager.
///
/// Everything delegates to the backend the registry produced at
/// construction time; application code never learns whether that backend
/// is the system provider or the shim.
pub struct LocationManager {
    backend: Arc<dyn LocationBackend>,
}

impl LocationManager {
    /// Construct through the process-wide factory. After [`install`] this
    /// yields an intercepted instance.
    #[must_use]
    pub fn new() -> Self {
        let backend = (factory_cell().load().make)();
        Self { backend }
    }

    /// Register the callback set. Held weakly; the caller keeps ownership
    /// of the listener.
    pub fn set_listener(&self, listener: &Arc<impl LocationListener + 'static>) {
        let weak: Weak<dyn LocationListener> = Arc::downgrade(listener) as _;
        self.backend.set_listener(weak);
    }

    pub fn start_location_updates(&self) {
        self.backend.start_location_updates();
    }

    pub fn stop_location_updates(&self) {
        self.backend.stop_location_updates();
    }

    pub fn start_heading_updates(&self) {
        self.backend.start_heading_updates();
    }

    pub fn stop_heading_updates(&self) {
        self.backend.stop_heading_updates();
    }

    /// Last fix delivered to this instance's backend, if any.
    #[must_use]
    pub fn location(&self) -> Option<FakePosition> {
        self.backend.last_position()
    }

    #[must_use]
    pub fn authorization_status(&self) -> AuthorizationStatus {
        self.backend.authorization_status()
    }

    #[must_use]
    pub fn location_services_enabled(&self) -> bool {
        self.backend.location_services_enabled()
    }
}

impl Default for LocationManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Dispatcher;
    use std::sync::Mutex;

    struct Recorder {
        calls: Mutex<Vec<(f64, f64, f64)>>,
    }

    impl LocationListener for Recorder {
        fn on_location_update(&self, new: &FakePosition, _previous: &FakePosition) {
            self.calls.lock().unwrap().push(new.triple());
        }
    }

    #[test]
    fn shim_backend_registers_and_cleans_up_its_entry() {
        let proxy = Arc::new(LocationProxy::new(Dispatcher::inline()));
        let backend = ShimBackend::attach(Arc::clone(&proxy), Arc::new(NoopBackend));
        assert_eq!(proxy.store().len(), 1);

        backend.stop_location_updates();
        assert!(!proxy.property_for(backend.id).location_updates_enabled);

        drop(backend);
        assert_eq!(proxy.store().len(), 0);
    }

    #[test]
    fn shim_backend_routes_listeners_to_the_proxy() {
        let proxy = Arc::new(LocationProxy::new(Dispatcher::inline()));
        let backend = ShimBackend::attach(Arc::clone(&proxy), Arc::new(NoopBackend));

        let recorder = Arc::new(Recorder {
            calls: Mutex::new(Vec::new()),
        });
        let weak: Weak<dyn LocationListener> = Arc::downgrade(&recorder) as _;
        backend.set_listener(weak);

        proxy.set_location(48.8566, 2.3522, 12.0).unwrap();
        assert_eq!(*recorder.calls.lock().unwrap(), vec![(48.8566, 2.3522, 12.0)]);
    }

    #[test]
    fn shim_backend_reports_the_fake_position() {
        let proxy = Arc::new(LocationProxy::new(Dispatcher::inline()));
        let backend = ShimBackend::attach(Arc::clone(&proxy), Arc::new(NoopBackend));
        proxy.set_location(1.5, 2.5, 3.5).unwrap();
        assert_eq!(backend.last_position().unwrap().triple(), (1.5, 2.5, 3.5));
    }

    #[test]
    fn pass_through_operations_reach_the_system_backend() {
        struct DeniedBackend;

        impl LocationBackend for DeniedBackend {
            fn start_location_updates(&self) {}
            fn stop_location_updates(&self) {}
            fn start_heading_updates(&self) {}
            fn stop_heading_updates(&self) {}
            fn set_listener(&self, _listener: Weak<dyn LocationListener>) {}
            fn last_position(&self) -> Option<FakePosition> {
                None
            }
            fn authorization_status(&self) -> AuthorizationStatus {
                AuthorizationStatus::Denied
            }
            fn location_services_enabled(&self) -> bool {
                false
            }
        }

        let proxy = Arc::new(LocationProxy::new(Dispatcher::inline()));
        let backend = ShimBackend::attach(proxy, Arc::new(DeniedBackend));
        assert_eq!(backend.authorization_status(), AuthorizationStatus::Denied);
        assert!(!backend.location_services_enabled());
    }
}
