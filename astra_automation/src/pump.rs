use crate::error::AutomationResult;
use crate::protocol::HostEvent;
use crate::session::Shared;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Background thread that drains host events into the shared session.
pub struct EventPump {
    shutdown: Arc<AtomicBool>,
    join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl EventPump {
    pub(crate) fn spawn(
        events: Receiver<HostEvent>,
        shared: Arc<Shared>,
        poll_interval: Duration,
    ) -> AutomationResult<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_for_thread = Arc::clone(&shutdown);

        let join_handle = thread::Builder::new()
            .name("astra-event-pump".to_string())
            .spawn(move || run_pump(events, shared, shutdown_for_thread, poll_interval))?;

        Ok(Self {
            shutdown,
            join_handle: Mutex::new(Some(join_handle)),
        })
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Ok(mut h) = self.join_handle.lock() {
            if let Some(h) = h.take() {
                let _ = h.join();
            }
        }
    }
}

impl Drop for EventPump {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_pump(
    events: Receiver<HostEvent>,
    shared: Arc<Shared>,
    shutdown: Arc<AtomicBool>,
    poll_interval: Duration,
) {
    debug!("event pump started");
    while !shutdown.load(Ordering::Relaxed) {
        match events.recv_timeout(poll_interval) {
            Ok(event) => shared.dispatch(event),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                warn!("host event channel closed; event pump stopping");
                return;
            }
        }
    }
    debug!("event pump stopped");
}
