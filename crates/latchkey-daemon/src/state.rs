//! Shared daemon state

use latchkey_core::Session;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

use crate::watchdog::ActivityTracker;

/// Everything connection handlers share
///
/// The session mutex is held across a whole operation, including the save
/// that follows a mutation.
pub struct DaemonState {
    session: Arc<Mutex<Session>>,
    activity: Arc<ActivityTracker>,
    shutdown: watch::Sender<bool>,
}

impl DaemonState {
    pub fn new(session: Session) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            session: Arc::new(Mutex::new(session)),
            activity: Arc::new(ActivityTracker::new()),
            shutdown,
        }
    }

    pub fn session(&self) -> Arc<Mutex<Session>> {
        Arc::clone(&self.session)
    }

    pub fn activity(&self) -> &Arc<ActivityTracker> {
        &self.activity
    }

    /// Ask the accept loop, handlers and watchdog to wind down
    pub fn trigger_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.subscribe_shutdown();
        let _ = rx.wait_for(|stopping| *stopping).await;
    }
}
