#![forbid(unsafe_code)]

//! Process-wide authority over the fake position.
//!
//! The proxy owns the current/previous position pair, the per-instance
//! property store, the notification dispatcher, and the control service
//! lifecycle. All mutation funnels through [`LocationProxy::set_location`],
//! which treats mutate-plus-notify as one logical operation: a concurrent
//! call can never interleave its fields into another call's fan-out.

use std::net::{IpAddr, SocketAddr, TcpListener};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;

use locshim_core::{
    BindError, FakePosition, InstanceId, InstanceProperty, PropertyStore, ValidationError,
};

use crate::control::{self, ControlConfig};
use crate::dispatch::{Dispatcher, NotificationBatch, NotificationPump};
use crate::netinfo;

/// Control-server lifecycle. `Running` is terminal by design: there is no
/// stop operation, the service lives as long as the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerState {
    Stopped,
    Starting,
    Running(SocketAddr),
}

struct Positions {
    current: FakePosition,
    previous: FakePosition,
}

pub struct LocationProxy {
    positions: Mutex<Positions>,
    /// Serializes whole `set_location` operations (mutate + notify).
    /// Kept separate from `positions` so listeners invoked inline can
    /// still read position snapshots.
    update: Mutex<()>,
    server: Mutex<ServerState>,
    store: PropertyStore,
    dispatcher: Mutex<Dispatcher>,
}

impl LocationProxy {
    /// The process-wide proxy, constructed on first use.
    ///
    /// Starts with inline notification delivery; a host that owns a main
    /// loop switches to queued delivery via [`LocationProxy::install_pump`].
    pub fn shared() -> &'static Arc<LocationProxy> {
        static SHARED: OnceLock<Arc<LocationProxy>> = OnceLock::new();
        SHARED.get_or_init(|| Arc::new(LocationProxy::new(Dispatcher::inline())))
    }

    /// Non-global constructor, used by tests and embedders that manage
    /// their own instance.
    #[must_use]
    pub fn new(dispatcher: Dispatcher) -> Self {
        let origin = FakePosition::origin();
        Self {
            positions: Mutex::new(Positions {
                current: origin,
                previous: origin,
            }),
            update: Mutex::new(()),
            server: Mutex::new(ServerState::Stopped),
            store: PropertyStore::new(),
            dispatcher: Mutex::new(dispatcher),
        }
    }

    /// Replace the delivery mode with a queued channel and hand back the
    /// pump the host's primary context should drain.
    pub fn install_pump(&self) -> NotificationPump {
        let (dispatcher, pump) = Dispatcher::channel();
        *self.dispatcher.lock().unwrap() = dispatcher;
        pump
    }

    /// Install a new fake position and fan it out.
    ///
    /// Validation happens first; on rejection nothing changes and nobody is
    /// notified. On success the current position rotates into `previous`,
    /// the new position becomes current, and every registered instance with
    /// location updates enabled receives exactly one
    /// `(new, previous)` callback through the dispatcher.
    pub fn set_location(
        &self,
        latitude: f64,
        longitude: f64,
        accuracy: f64,
    ) -> Result<(), ValidationError> {
        let new = FakePosition::new(latitude, longitude, accuracy)?;

        let _operation = self.update.lock().unwrap();
        let previous = {
            let mut positions = self.positions.lock().unwrap();
            positions.previous = positions.current;
            positions.current = new;
            positions.previous
        };
        let recipients = self.store.location_recipients();
        tracing::debug!(
            latitude,
            longitude,
            accuracy,
            recipients = recipients.len(),
            "fake position updated"
        );
        self.dispatcher.lock().unwrap().dispatch(NotificationBatch {
            new,
            previous,
            recipients,
        });
        Ok(())
    }

    /// Start the control service on the fixed port. Idempotent: a second
    /// call while running (or mid-start) succeeds with no side effects.
    pub fn start_server(self: &Arc<Self>) -> Result<(), BindError> {
        self.start_server_with(ControlConfig::default()).map(|_| ())
    }

    /// [`start_server`](Self::start_server) with an explicit config; tests
    /// bind port 0 and read back the assigned address.
    pub fn start_server_with(
        self: &Arc<Self>,
        config: ControlConfig,
    ) -> Result<SocketAddr, BindError> {
        {
            let mut state = self.server.lock().unwrap();
            match *state {
                ServerState::Running(addr) => return Ok(addr),
                // A concurrent starter owns the bind; report its intent.
                ServerState::Starting => return Ok(config.bind_addr),
                ServerState::Stopped => *state = ServerState::Starting,
            }
        }

        let listener = match TcpListener::bind(config.bind_addr) {
            Ok(listener) => listener,
            Err(source) => {
                *self.server.lock().unwrap() = ServerState::Stopped;
                return Err(BindError {
                    addr: config.bind_addr,
                    source,
                });
            }
        };
        let local_addr = listener.local_addr().map_err(|source| {
            *self.server.lock().unwrap() = ServerState::Stopped;
            BindError {
                addr: config.bind_addr,
                source,
            }
        })?;

        let proxy = Arc::clone(self);
        let bind_addr = config.bind_addr;
        let spawned = thread::Builder::new()
            .name("locshim-control".into())
            .spawn(move || control::run_accept_loop(listener, proxy, config));
        if let Err(source) = spawned {
            *self.server.lock().unwrap() = ServerState::Stopped;
            return Err(BindError {
                addr: bind_addr,
                source,
            });
        }

        *self.server.lock().unwrap() = ServerState::Running(local_addr);
        tracing::info!(addr = %local_addr, "control service listening");
        Ok(local_addr)
    }

    /// Whether the control service is accepting connections.
    #[must_use]
    pub fn server_running(&self) -> bool {
        matches!(*self.server.lock().unwrap(), ServerState::Running(_))
    }

    /// Address the control service is bound to, once running.
    #[must_use]
    pub fn server_addr(&self) -> Option<SocketAddr> {
        match *self.server.lock().unwrap() {
            ServerState::Running(addr) => Some(addr),
            _ => None,
        }
    }

    /// The per-instance property store backing the interception layer.
    #[must_use]
    pub fn store(&self) -> &PropertyStore {
        &self.store
    }

    /// Override record for one intercepted instance, created with defaults
    /// on first access.
    #[must_use]
    pub fn property_for(&self, id: InstanceId) -> InstanceProperty {
        self.store.properties_for(id)
    }

    #[must_use]
    pub fn current_position(&self) -> FakePosition {
        self.positions.lock().unwrap().current
    }

    #[must_use]
    pub fn previous_position(&self) -> FakePosition {
        self.positions.lock().unwrap().previous
    }

    /// Best-effort lookup of the device's active network address, shown to
    /// users configuring a remote client.
    #[must_use]
    pub fn current_outbound_ip(&self) -> Option<IpAddr> {
        netinfo::outbound_ip()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use locshim_core::LocationListener;
    use std::sync::Weak;

    struct Recorder {
        calls: Mutex<Vec<((f64, f64, f64), (f64, f64, f64))>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<((f64, f64, f64), (f64, f64, f64))> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl LocationListener for Recorder {
        fn on_location_update(&self, new: &FakePosition, previous: &FakePosition) {
            self.calls
                .lock()
                .unwrap()
                .push((new.triple(), previous.triple()));
        }
    }

    fn attach(proxy: &LocationProxy, recorder: &Arc<Recorder>) -> InstanceId {
        let id = proxy.store().register();
        let weak: Weak<dyn LocationListener> = Arc::downgrade(recorder) as _;
        proxy.store().set_listener(id, weak);
        id
    }

    #[test]
    fn set_location_rotates_current_into_previous() {
        let proxy = LocationProxy::new(Dispatcher::inline());
        proxy.set_location(10.0, 20.0, 1.0).unwrap();
        proxy.set_location(30.0, 40.0, 2.0).unwrap();
        assert_eq!(proxy.current_position().triple(), (30.0, 40.0, 2.0));
        assert_eq!(proxy.previous_position().triple(), (10.0, 20.0, 1.0));
    }

    #[test]
    fn listeners_receive_exactly_one_call_per_update() {
        let proxy = LocationProxy::new(Dispatcher::inline());
        let recorder = Recorder::new();
        attach(&proxy, &recorder);

        proxy.set_location(35.6895, 139.6917, 5.0).unwrap();

        let calls = recorder.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, (35.6895, 139.6917, 5.0));
        assert_eq!(calls[0].1, (0.0, 0.0, 0.0));
    }

    #[test]
    fn previous_value_in_the_callback_is_the_prior_fake_fix() {
        let proxy = LocationProxy::new(Dispatcher::inline());
        let recorder = Recorder::new();
        attach(&proxy, &recorder);

        proxy.set_location(1.0, 2.0, 3.0).unwrap();
        proxy.set_location(4.0, 5.0, 6.0).unwrap();

        let calls = recorder.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1], ((4.0, 5.0, 6.0), (1.0, 2.0, 3.0)));
    }

    #[test]
    fn invalid_input_changes_nothing_and_notifies_nobody() {
        let proxy = LocationProxy::new(Dispatcher::inline());
        let recorder = Recorder::new();
        attach(&proxy, &recorder);
        proxy.set_location(10.0, 20.0, 1.0).unwrap();

        assert!(proxy.set_location(200.0, 0.0, 1.0).is_err());
        assert!(proxy.set_location(0.0, 999.0, 1.0).is_err());
        assert!(proxy.set_location(0.0, 0.0, -5.0).is_err());

        assert_eq!(proxy.current_position().triple(), (10.0, 20.0, 1.0));
        assert_eq!(recorder.calls().len(), 1);
    }

    #[test]
    fn disabled_listeners_are_skipped() {
        let proxy = LocationProxy::new(Dispatcher::inline());
        let recorder = Recorder::new();
        let id = attach(&proxy, &recorder);
        proxy.store().set_location_updates_enabled(id, false);

        proxy.set_location(1.0, 1.0, 1.0).unwrap();
        assert!(recorder.calls().is_empty());
    }

    #[test]
    fn concurrent_updates_never_interleave() {
        let proxy = Arc::new(LocationProxy::new(Dispatcher::inline()));
        let recorder = Recorder::new();
        attach(&proxy, &recorder);

        let first = {
            let proxy = Arc::clone(&proxy);
            thread::spawn(move || proxy.set_location(11.0, 12.0, 13.0).unwrap())
        };
        let second = {
            let proxy = Arc::clone(&proxy);
            thread::spawn(move || proxy.set_location(21.0, 22.0, 23.0).unwrap())
        };
        first.join().unwrap();
        second.join().unwrap();

        let calls = recorder.calls();
        assert_eq!(calls.len(), 2);
        for (new, _previous) in &calls {
            assert!(
                *new == (11.0, 12.0, 13.0) || *new == (21.0, 22.0, 23.0),
                "hybrid payload observed: {new:?}"
            );
        }
        // Whichever ran second saw the other's payload as its previous fix.
        let (last_new, last_previous) = calls[1];
        let (first_new, _) = calls[0];
        assert_eq!(last_previous, first_new);
        assert_ne!(last_new, first_new);
    }

    #[test]
    fn queued_delivery_waits_for_the_host_pump() {
        let (dispatcher, pump) = Dispatcher::channel();
        let proxy = LocationProxy::new(dispatcher);
        let recorder = Recorder::new();
        attach(&proxy, &recorder);

        proxy.set_location(7.0, 8.0, 9.0).unwrap();
        assert!(recorder.calls().is_empty());
        assert_eq!(pump.pump_pending(), 1);
        assert_eq!(recorder.calls().len(), 1);
    }

    #[test]
    fn start_server_twice_is_idempotent() {
        let proxy = Arc::new(LocationProxy::new(Dispatcher::inline()));
        let config = ControlConfig::ephemeral();
        let first = proxy.start_server_with(config.clone()).unwrap();
        let second = proxy.start_server_with(config).unwrap();
        assert_eq!(first, second);
        assert!(proxy.server_running());
        assert_eq!(proxy.server_addr(), Some(first));
    }

    #[test]
    fn bind_failure_reports_and_leaves_server_stopped() {
        let blocker = Arc::new(LocationProxy::new(Dispatcher::inline()));
        let occupied = blocker
            .start_server_with(ControlConfig::ephemeral())
            .unwrap();

        let proxy = Arc::new(LocationProxy::new(Dispatcher::inline()));
        let mut config = ControlConfig::ephemeral();
        config.bind_addr = occupied;
        let error = proxy.start_server_with(config).unwrap_err();
        assert_eq!(error.addr, occupied);
        assert!(!proxy.server_running());

        // A later attempt on a free port still succeeds.
        proxy.start_server_with(ControlConfig::ephemeral()).unwrap();
        assert!(proxy.server_running());
    }
}
