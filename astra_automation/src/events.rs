use crate::protocol::CANCEL_POLL;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Named conditions set by host events and consumed by waiters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitFlag {
    InstrumentsDetected,
    ExperimentReady,
    ExperimentRead,
    ExperimentWrite,
    ExperimentRun,
    ExperimentClosed,
    PreparingForCollection,
    WaitingForAutoInject,
    CollectionStarted,
    CollectionFinished,
}

impl WaitFlag {
    pub const ALL: [WaitFlag; 10] = [
        WaitFlag::InstrumentsDetected,
        WaitFlag::ExperimentReady,
        WaitFlag::ExperimentRead,
        WaitFlag::ExperimentWrite,
        WaitFlag::ExperimentRun,
        WaitFlag::ExperimentClosed,
        WaitFlag::PreparingForCollection,
        WaitFlag::WaitingForAutoInject,
        WaitFlag::CollectionStarted,
        WaitFlag::CollectionFinished,
    ];

    pub fn label(self) -> &'static str {
        match self {
            WaitFlag::InstrumentsDetected => "instrument detection",
            WaitFlag::ExperimentReady => "experiment ready",
            WaitFlag::ExperimentRead => "experiment read",
            WaitFlag::ExperimentWrite => "experiment write",
            WaitFlag::ExperimentRun => "experiment run",
            WaitFlag::ExperimentClosed => "experiment closed",
            WaitFlag::PreparingForCollection => "preparing for collection",
            WaitFlag::WaitingForAutoInject => "waiting for auto-inject",
            WaitFlag::CollectionStarted => "collection started",
            WaitFlag::CollectionFinished => "collection finished",
        }
    }

    fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

impl fmt::Display for WaitFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WaitError {
    #[error("timed out after {waited:?} waiting for {condition}")]
    Timeout {
        condition: &'static str,
        waited: Duration,
    },
    #[error("wait for {condition} was cancelled")]
    Cancelled { condition: &'static str },
}

/// Shared cancellation switch for every wait of one client. Once cancelled it stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Deadline bookkeeping shared by condvar waits and polling waits.
pub(crate) struct WaitClock {
    condition: &'static str,
    started: Instant,
    deadline: Option<Instant>,
}

impl WaitClock {
    pub(crate) fn start(condition: &'static str, timeout: Duration) -> Self {
        let started = Instant::now();
        Self {
            condition,
            started,
            deadline: started.checked_add(timeout),
        }
    }

    /// Time left before the deadline, or the reason the wait must stop.
    pub(crate) fn remaining(&self, cancel: &CancelToken) -> Result<Duration, WaitError> {
        if cancel.is_cancelled() {
            return Err(WaitError::Cancelled {
                condition: self.condition,
            });
        }
        let now = Instant::now();
        match self.deadline {
            Some(deadline) if now >= deadline => Err(WaitError::Timeout {
                condition: self.condition,
                waited: now.saturating_duration_since(self.started),
            }),
            Some(deadline) => Ok(deadline.saturating_duration_since(now)),
            None => Ok(Duration::MAX),
        }
    }
}

#[derive(Debug, Default)]
pub struct EventBridge {
    flags: Mutex<u16>,
    signal: Condvar,
}

impl EventBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, flag: WaitFlag) {
        *self.lock_flags() |= flag.bit();
        self.signal.notify_all();
    }

    pub fn clear(&self, flag: WaitFlag) {
        *self.lock_flags() &= !flag.bit();
    }

    pub fn is_set(&self, flag: WaitFlag) -> bool {
        *self.lock_flags() & flag.bit() != 0
    }

    /// Clears every experiment flag. Instrument detection happens once per host session and
    /// survives.
    pub fn reset(&self) {
        *self.lock_flags() &= WaitFlag::InstrumentsDetected.bit();
    }

    /// Blocks until `flag` is set, then consumes it.
    pub fn wait(
        &self,
        flag: WaitFlag,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<(), WaitError> {
        let clock = WaitClock::start(flag.label(), timeout);
        let mut flags = self.lock_flags();
        loop {
            if *flags & flag.bit() != 0 {
                *flags &= !flag.bit();
                return Ok(());
            }
            let slice = clock.remaining(cancel)?.min(CANCEL_POLL);
            flags = match self.signal.wait_timeout(flags, slice) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    fn lock_flags(&self) -> MutexGuard<'_, u16> {
        self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn flag_set_before_wait_is_consumed() {
        let bridge = EventBridge::new();
        bridge.set(WaitFlag::ExperimentRun);
        bridge
            .wait(WaitFlag::ExperimentRun, Duration::from_millis(10), &CancelToken::new())
            .expect("latched flag");
        assert!(!bridge.is_set(WaitFlag::ExperimentRun));
    }

    #[test]
    fn wait_times_out_when_flag_never_arrives() {
        let bridge = EventBridge::new();
        let err = bridge
            .wait(WaitFlag::ExperimentWrite, Duration::from_millis(30), &CancelToken::new())
            .expect_err("no event");
        match err {
            WaitError::Timeout { condition, waited } => {
                assert_eq!(condition, "experiment write");
                assert!(waited >= Duration::from_millis(30));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn setter_on_another_thread_wakes_waiter() {
        let bridge = Arc::new(EventBridge::new());
        let setter = Arc::clone(&bridge);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            setter.set(WaitFlag::CollectionFinished);
        });
        bridge
            .wait(WaitFlag::CollectionFinished, Duration::from_secs(5), &CancelToken::new())
            .expect("woken");
        handle.join().expect("setter thread");
    }

    #[test]
    fn cancel_interrupts_a_long_wait() {
        let bridge = EventBridge::new();
        let cancel = CancelToken::new();
        let remote = cancel.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });
        let started = Instant::now();
        let err = bridge
            .wait(WaitFlag::ExperimentClosed, Duration::from_secs(30), &cancel)
            .expect_err("cancelled");
        assert_eq!(
            err,
            WaitError::Cancelled {
                condition: "experiment closed"
            }
        );
        assert!(started.elapsed() < Duration::from_secs(5));
        handle.join().expect("cancel thread");
    }

    #[test]
    fn reset_keeps_instrument_detection() {
        let bridge = EventBridge::new();
        for flag in WaitFlag::ALL {
            bridge.set(flag);
        }
        bridge.reset();
        for flag in WaitFlag::ALL {
            assert_eq!(bridge.is_set(flag), flag == WaitFlag::InstrumentsDetected, "{flag}");
        }
    }

    #[test]
    fn waiting_on_one_flag_leaves_others_alone() {
        let bridge = EventBridge::new();
        bridge.set(WaitFlag::ExperimentRead);
        bridge.set(WaitFlag::ExperimentRun);
        bridge
            .wait(WaitFlag::ExperimentRead, Duration::from_millis(10), &CancelToken::new())
            .expect("read");
        assert!(bridge.is_set(WaitFlag::ExperimentRun));
    }
}
