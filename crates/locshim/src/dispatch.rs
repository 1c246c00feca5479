#![forbid(unsafe_code)]

//! Cross-context delivery of listener notifications.
//!
//! `set_location` arrives on control-service threads, but listener
//! callbacks must run on whatever context the platform contract promises
//! for location callbacks (usually the application's primary context).
//! Notifications are therefore handed off as explicit batches instead of
//! invoked across threads:
//!
//! - [`Dispatcher::inline`] delivers on the calling thread, for headless
//!   hosts and tests that have no separate primary context.
//! - [`Dispatcher::channel`] queues batches on an `mpsc` channel; the host
//!   drains them from its own loop through [`NotificationPump`].
//!
//! A batch carries the position snapshot and the resolved recipient set,
//! so delivery never observes mutations that happen after enqueue and two
//! batches can never interleave their fields.

use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use locshim_core::{FakePosition, LocationListener};

/// One `set_location`'s worth of fan-out, resolved at enqueue time.
pub struct NotificationBatch {
    pub new: FakePosition,
    pub previous: FakePosition,
    pub recipients: Vec<Arc<dyn LocationListener>>,
}

impl NotificationBatch {
    fn deliver(&self) {
        for listener in &self.recipients {
            listener.on_location_update(&self.new, &self.previous);
        }
    }
}

enum Mode {
    Inline,
    Channel(mpsc::Sender<NotificationBatch>),
}

/// Sending half of the notification handoff, owned by the proxy.
pub struct Dispatcher {
    mode: Mode,
}

impl Dispatcher {
    /// Deliver batches synchronously on the dispatching thread.
    ///
    /// The caller is responsible for serializing dispatches; the proxy
    /// already does this under its update lock.
    #[must_use]
    pub fn inline() -> Self {
        Self { mode: Mode::Inline }
    }

    /// Queue batches for a host-driven pump.
    #[must_use]
    pub fn channel() -> (Self, NotificationPump) {
        let (sender, receiver) = mpsc::channel();
        (
            Self {
                mode: Mode::Channel(sender),
            },
            NotificationPump { receiver },
        )
    }

    pub(crate) fn dispatch(&self, batch: NotificationBatch) {
        match &self.mode {
            Mode::Inline => batch.deliver(),
            Mode::Channel(sender) => {
                if sender.send(batch).is_err() {
                    tracing::warn!("notification pump dropped; location update discarded");
                }
            }
        }
    }
}

/// Receiving half of the handoff. The host's primary context drains it.
pub struct NotificationPump {
    receiver: mpsc::Receiver<NotificationBatch>,
}

impl NotificationPump {
    /// Deliver everything currently queued without blocking. Returns the
    /// number of batches delivered.
    pub fn pump_pending(&self) -> usize {
        let mut delivered = 0;
        while let Ok(batch) = self.receiver.try_recv() {
            batch.deliver();
            delivered += 1;
        }
        delivered
    }

    /// Deliver the next batch, waiting up to `timeout` for one to arrive.
    /// Returns whether a batch was delivered.
    pub fn pump_one(&self, timeout: Duration) -> bool {
        match self.receiver.recv_timeout(timeout) {
            Ok(batch) => {
                batch.deliver();
                true
            }
            Err(_) => false,
        }
    }

    /// Block delivering batches until every sender is gone.
    pub fn run(&self) {
        while let Ok(batch) = self.receiver.recv() {
            batch.deliver();
        }
    }
}
