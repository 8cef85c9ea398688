//! Activity tracking and idle shutdown

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::state::DaemonState;

/// Last activity time plus the number of open connections
#[derive(Debug)]
pub struct ActivityTracker {
    last_activity: Mutex<Instant>,
    connections: watch::Sender<usize>,
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityTracker {
    pub fn new() -> Self {
        let (connections, _) = watch::channel(0);
        Self {
            last_activity: Mutex::new(Instant::now()),
            connections,
        }
    }

    /// Restart the idle countdown
    pub fn touch(&self) {
        *self.last() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last().elapsed()
    }

    pub fn open_connections(&self) -> usize {
        *self.connections.borrow()
    }

    /// Count a connection until the returned guard is dropped
    pub fn connection_opened(self: &Arc<Self>) -> ConnectionGuard {
        self.connections.send_modify(|n| *n += 1);
        self.touch();
        ConnectionGuard {
            tracker: Arc::clone(self),
        }
    }

    /// Resolve once no connection is open
    pub async fn wait_drained(&self) {
        let mut rx = self.connections.subscribe();
        // The sender lives in `self`, so the channel cannot close under us
        let _ = rx.wait_for(|open| *open == 0).await;
    }

    fn last(&self) -> MutexGuard<'_, Instant> {
        self.last_activity
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Decrements the open-connection count on drop
#[derive(Debug)]
pub struct ConnectionGuard {
    tracker: Arc<ActivityTracker>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.tracker
            .connections
            .send_modify(|n| *n = n.saturating_sub(1));
        self.tracker.touch();
    }
}

/// Sleep until the idle deadline, recheck, and shut down once it has passed
pub async fn run_watchdog(state: Arc<DaemonState>, idle_timeout: Duration) {
    let mut shutdown = state.subscribe_shutdown();
    loop {
        if state.is_shutting_down() {
            return;
        }
        let idle = state.activity().idle_for();
        if idle >= idle_timeout {
            info!("Idle for {:?}, shutting down", idle);
            state.trigger_shutdown();
            return;
        }
        let remaining = idle_timeout - idle;
        debug!("Watchdog sleeping for {:?}", remaining);
        tokio::select! {
            _ = tokio::time::sleep(remaining) => {}
            _ = shutdown.changed() => {}
        }
    }
}
