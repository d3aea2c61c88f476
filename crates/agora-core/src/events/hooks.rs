//! The [`EventHook`] trait: a background consumer of platform events.

use async_trait::async_trait;

use super::types::PlatformEvent;

/// Error returned by a hook's `handle`.
///
/// Hook errors never reach the emitter; the dispatcher logs them with the
/// hook's name and moves on.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("hook execution failed: {0}")]
    Execution(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HookError {
    pub fn execution(msg: impl Into<String>) -> Self {
        HookError::Execution(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        HookError::Storage(msg.into())
    }
}

/// A consumer that reacts to platform events off the request path.
///
/// Hooks are assembled into a [`HookSet`](super::HookSet) at startup. The
/// dispatcher calls [`wants`](EventHook::wants) first and only invokes
/// [`handle`](EventHook::handle) for events the hook asked for, each call in
/// its own task under a timeout, so implementations may do real work such as
/// cache writes or outbound notifications. They should still return promptly;
/// anything slower than the dispatch timeout gets cut off.
#[async_trait]
pub trait EventHook: Send + Sync {
    /// Stable name, used in logs when the hook fails or times out.
    fn name(&self) -> &str;

    /// Event filter. The default accepts everything; most hooks narrow this
    /// to one event family with a `matches!` on the variant.
    fn wants(&self, _event: &PlatformEvent) -> bool {
        true
    }

    async fn handle(&self, event: &PlatformEvent) -> Result<(), HookError>;
}
