//! Session spawning

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::error;

use crate::{Dialer, RelaySession, SessionConfig, Transport};

/// Creates relay sessions for accepted transport connections.
///
/// Cheap to clone; every clone shares the dialer, the config and the live
/// session counter.
pub struct Relay<D: Dialer> {
    config: Arc<SessionConfig>,
    dialer: Arc<D>,
    active: Arc<AtomicUsize>,
}

impl<D: Dialer> Clone for Relay<D> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            dialer: Arc::clone(&self.dialer),
            active: Arc::clone(&self.active),
        }
    }
}

impl<D: Dialer> Relay<D> {
    pub fn new(config: SessionConfig, dialer: D) -> Self {
        Self {
            config: Arc::new(config),
            dialer: Arc::new(dialer),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Sessions currently running
    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Spawn a session that owns `transport` until it closes.
    ///
    /// Outcomes are reported through logs and the transport's close status.
    /// A panic inside the session ends only that session; its connections
    /// are dropped with it.
    pub fn create_session<T: Transport>(&self, transport: T) -> JoinHandle<()> {
        let session = RelaySession::new(transport, Arc::clone(&self.dialer), Arc::clone(&self.config));
        let id = session.id().to_string();
        let guard = ActiveGuard::enter(Arc::clone(&self.active));

        tokio::spawn(async move {
            let _guard = guard;
            if let Err(panic) = AssertUnwindSafe(session.run()).catch_unwind().await {
                error!("Session {} panicked: {}", id, panic_message(panic.as_ref()));
            }
        })
    }
}

/// Counts a session as live until dropped
struct ActiveGuard {
    active: Arc<AtomicUsize>,
}

impl ActiveGuard {
    fn enter(active: Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::Relaxed);
        Self { active }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic>"
    }
}
