//! Edge watchdog.
//!
//! Spawns a thread that waits for edge notifications on a bounded channel and
//! calls the timeout handler whenever the window elapses without one. The
//! window re-arms after every firing, so a stopped fan keeps producing
//! timeouts until the watchdog is disarmed.
//!
//! Each `Watchdog` owns exactly one thread, joined on `disarm()` or drop.
use crossbeam_channel as xch;
use fanctl_traits::WatchdogHandler;
use std::time::Duration;

use crate::error::{HwError, Result};

enum Signal {
    Edge,
    Stop,
}

/// Cloneable handle used by edge handlers to reset the watchdog window.
#[derive(Clone)]
pub struct WatchdogFeeder {
    tx: xch::Sender<Signal>,
}

impl WatchdogFeeder {
    /// Never blocks; a pending notification already resets the window.
    pub fn feed(&self) {
        let _ = self.tx.try_send(Signal::Edge);
    }
}

pub struct Watchdog {
    tx: xch::Sender<Signal>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl Watchdog {
    pub fn arm(timeout: Duration, mut on_timeout: WatchdogHandler) -> Result<Self> {
        let (tx, rx) = xch::bounded(1);
        let join_handle = std::thread::Builder::new()
            .name("fanctl-watchdog".into())
            .spawn(move || {
                loop {
                    match rx.recv_timeout(timeout) {
                        Ok(Signal::Edge) => continue,
                        Ok(Signal::Stop) => break,
                        Err(xch::RecvTimeoutError::Timeout) => on_timeout(),
                        Err(xch::RecvTimeoutError::Disconnected) => break,
                    }
                }
                tracing::trace!("watchdog thread exiting cleanly");
            })
            .map_err(|e| HwError::Watchdog(e.to_string()))?;
        tracing::debug!(timeout_ms = timeout.as_millis() as u64, "watchdog armed");
        Ok(Self {
            tx,
            join_handle: Some(join_handle),
        })
    }

    pub fn feeder(&self) -> WatchdogFeeder {
        WatchdogFeeder {
            tx: self.tx.clone(),
        }
    }

    /// Stop the timer thread. Later calls are no-ops.
    pub fn disarm(&mut self) {
        let Some(handle) = self.join_handle.take() else {
            return;
        };
        // Blocking send: a queued edge notification may occupy the slot.
        let _ = self.tx.send(Signal::Stop);
        match handle.join() {
            Ok(()) => tracing::debug!("watchdog disarmed"),
            Err(e) => tracing::warn!(?e, "watchdog thread panicked during shutdown"),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.join_handle.is_some()
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.disarm();
    }
}
