//! Lifecycle hook contracts for observing turn execution.
//!
//! ```rust
//! use axchat::{NoopTurnLifecycleHooks, TurnLifecycleHooks};
//!
//! fn accepts_hooks(_hooks: &dyn TurnLifecycleHooks) {}
//!
//! let hooks = NoopTurnLifecycleHooks;
//! accepts_hooks(&hooks);
//! ```

use std::time::Duration;

use axcommon::{SessionId, TurnId};
use axstore::MessageStatus;

use crate::ChatError;

pub trait TurnLifecycleHooks: Send + Sync {
    fn on_turn_start(&self, _session_id: &SessionId, _turn_id: &TurnId) {}

    /// Called once the assistant message reached its final `status`.
    fn on_turn_complete(
        &self,
        _session_id: &SessionId,
        _turn_id: &TurnId,
        _status: MessageStatus,
        _elapsed: Duration,
    ) {
    }

    /// Called when the turn could not be started or its result could not be persisted.
    fn on_turn_failure(&self, _session_id: &SessionId, _turn_id: &TurnId, _error: &ChatError) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTurnLifecycleHooks;

impl TurnLifecycleHooks for NoopTurnLifecycleHooks {}
