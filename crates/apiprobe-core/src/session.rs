//! Live session state owned by one adapter.

use crate::metrics::SessionMetrics;
use crate::types::SessionState;

/// Transport handle plus lifecycle state of one adapter instance.
///
/// The handle exists exactly while the state is not [`SessionState::Closed`].
/// Adapters never reopen a session implicitly; after `close` every call
/// except `connect` must fail with `NotConnected`.
#[derive(Debug)]
pub struct ClientSession<H> {
    handle: Option<H>,
    state: SessionState,
    metrics: SessionMetrics,
}

impl<H> Default for ClientSession<H> {
    fn default() -> Self {
        Self {
            handle: None,
            state: SessionState::Closed,
            metrics: SessionMetrics::default(),
        }
    }
}

impl<H> ClientSession<H> {
    /// Creates a closed session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a freshly opened transport handle.
    pub fn open(&mut self, handle: H) {
        self.handle = Some(handle);
        self.state = SessionState::Open;
        self.metrics.connections = self.metrics.connections.saturating_add(1);
        self.metrics.touch();
    }

    /// Returns `true` unless closed.
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Returns `true` only for an open, non-degraded session.
    pub fn is_healthy(&self) -> bool {
        self.handle.is_some() && self.state == SessionState::Open
    }

    /// Current lifecycle state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Mutable access to the transport handle.
    pub fn handle_mut(&mut self) -> Option<&mut H> {
        self.handle.as_mut()
    }

    /// Shared access to the transport handle.
    pub fn handle(&self) -> Option<&H> {
        self.handle.as_ref()
    }

    /// Removes the handle and closes the session.
    pub fn take(&mut self) -> Option<H> {
        self.state = SessionState::Closed;
        self.handle.take()
    }

    /// Marks an open session as no longer trustworthy.
    ///
    /// Has no effect on a closed session. The first reason is kept.
    pub fn mark_degraded(&mut self, reason: impl Into<String>) {
        if self.state == SessionState::Open {
            self.state = SessionState::Degraded {
                reason: reason.into(),
            };
        }
    }

    /// Counters.
    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    /// Mutable counters.
    pub fn metrics_mut(&mut self) -> &mut SessionMetrics {
        &mut self.metrics
    }
}
