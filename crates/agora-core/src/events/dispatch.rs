//! Dispatching events to hooks with fault isolation.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::hooks::EventHook;
use super::types::PlatformEvent;

/// Upper bound on a single hook invocation.
pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// A fixed set of hooks sharing one dispatch policy.
///
/// The set is assembled once at startup, so dispatch needs no locking. Each
/// matching hook runs in its own spawned task with a timeout and panic
/// recovery; a slow, failing, or panicking hook never affects the emitter or
/// its sibling hooks.
pub struct HookSet {
    hooks: Vec<Arc<dyn EventHook>>,
    timeout: Duration,
}

impl HookSet {
    pub fn new() -> Self {
        Self {
            hooks: Vec::new(),
            timeout: DEFAULT_HOOK_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn EventHook>) -> Self {
        debug!(hook = hook.name(), "Adding event hook");
        self.hooks.push(hook);
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Fan one event out to every hook that wants it.
    ///
    /// Returns immediately; the hooks run in spawned tasks.
    pub fn dispatch(&self, event: &PlatformEvent) {
        for hook in self.hooks.iter().filter(|h| h.wants(event)) {
            tokio::spawn(invoke(Arc::clone(hook), event.clone(), self.timeout));
        }
    }

    /// Drive the set from a broadcast receiver until the channel closes.
    ///
    /// A receiver that lags logs the number of dropped events and keeps
    /// going. Typically wired as
    /// `hook_set.listen(broadcaster.subscribe())` during startup.
    pub fn listen(self, mut rx: broadcast::Receiver<PlatformEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => self.dispatch(&event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Hook listener lagged, events were dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Event channel closed, hook listener stopping");
        })
    }
}

impl Default for HookSet {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HookSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookSet")
            .field("hooks", &self.hooks.iter().map(|h| h.name()).collect::<Vec<_>>())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Run one hook against one event, containing every failure mode.
async fn invoke(hook: Arc<dyn EventHook>, event: PlatformEvent, timeout: Duration) {
    let guarded = AssertUnwindSafe(hook.handle(&event)).catch_unwind();
    match tokio::time::timeout(timeout, guarded).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => {
            warn!(hook = hook.name(), error = %e, "Hook failed");
        }
        Ok(Err(panic)) => {
            error!(hook = hook.name(), panic = %panic_message(panic), "Hook panicked");
        }
        Err(_) => {
            error!(
                hook = hook.name(),
                timeout_secs = timeout.as_secs(),
                "Hook timed out"
            );
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
