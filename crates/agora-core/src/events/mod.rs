//! Platform events.
//!
//! Subsystems that need to react to each other's activity do so through
//! typed events on a broadcast bus instead of direct calls: the metering
//! service and webhook processor emit [`BillingEvent`]s, the session store
//! emits [`SessionEvent`]s, and any interested party subscribes through the
//! shared [`EventBroadcaster`].
//!
//! Consumers that do real work implement [`EventHook`] and are collected
//! into a [`HookSet`], which runs each hook in its own task with a timeout
//! and panic recovery. The cache crate's subscription-change invalidation
//! hook is the canonical example; an upgrade-prompt notifier watching
//! `usage_limit_exceeded` would be wired the same way.

pub mod broadcaster;
pub mod dispatch;
pub mod hooks;
pub mod types;

pub use broadcaster::EventBroadcaster;
pub use dispatch::{DEFAULT_HOOK_TIMEOUT, HookSet};
pub use hooks::{EventHook, HookError};
pub use types::{BillingEvent, BillingEventType, PlatformEvent, SessionEvent, SessionEventType};
