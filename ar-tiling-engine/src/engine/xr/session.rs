use super::entry_gate::{ArEntryFailure, classify_start_error};
use bevy::prelude::*;
use constants::xr::SESSION_END_WAIT_SECS;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    NoSession,
    Requesting,
    Active,
    /// Waiting for the `end` event; `restart` re-requests afterwards.
    Ending { restart: bool, since: f64 },
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoSession => "no_session",
            Self::Requesting => "requesting",
            Self::Active => "active",
            Self::Ending { .. } => "ending",
        }
    }
}

/// What the platform layer must do after a lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// Request a new session from the browser.
    Request,
    /// Ask the running session to end.
    End,
}

/// AR session lifecycle: no-session, requesting, active, ending.
#[derive(Resource, Debug, Clone)]
pub struct ArSession {
    state: SessionState,
    end_wait: f64,
    last_failure: Option<ArEntryFailure>,
    /// Restart asked for while the request was still in flight.
    restart_queued: bool,
}

impl Default for ArSession {
    fn default() -> Self {
        Self {
            state: SessionState::NoSession,
            end_wait: SESSION_END_WAIT_SECS,
            last_failure: None,
            restart_queued: false,
        }
    }
}

impl ArSession {
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn last_failure(&self) -> Option<ArEntryFailure> {
        self.last_failure
    }

    pub fn start(&mut self) -> Option<SessionCommand> {
        if self.state != SessionState::NoSession {
            return None;
        }
        self.state = SessionState::Requesting;
        self.last_failure = None;
        Some(SessionCommand::Request)
    }

    pub fn on_started(&mut self) -> bool {
        if self.state != SessionState::Requesting {
            return false;
        }
        self.state = SessionState::Active;
        info!("[XR] Session active");
        true
    }

    /// Gate rejection before a request was made, or a rejected request.
    pub fn on_unavailable(&mut self, failure: ArEntryFailure) {
        self.state = SessionState::NoSession;
        self.restart_queued = false;
        self.last_failure = Some(failure);
        warn!("[XR] AR unavailable: {}", failure.code());
    }

    pub fn on_start_failed(&mut self, error_name: &str) -> ArEntryFailure {
        let failure = classify_start_error(error_name);
        self.on_unavailable(failure);
        failure
    }

    pub fn stop(&mut self, now: f64) -> Option<SessionCommand> {
        self.restart_queued = false;
        self.begin_end(false, now)
    }

    /// Full teardown followed by a fresh request. Starts directly when no
    /// session is running; while a request is in flight the restart runs
    /// once that session is active.
    pub fn restart(&mut self, now: f64) -> Option<SessionCommand> {
        match self.state {
            SessionState::NoSession => self.start(),
            SessionState::Requesting => {
                info!("[XR] Restart queued until the session is active");
                self.restart_queued = true;
                None
            }
            SessionState::Ending { since, .. } => {
                self.state = SessionState::Ending { restart: true, since };
                None
            }
            _ => self.begin_end(true, now),
        }
    }

    /// Runs a restart queued during the request. Call after `on_started`.
    pub fn take_queued_restart(&mut self, now: f64) -> Option<SessionCommand> {
        if !self.restart_queued || self.state != SessionState::Active {
            return None;
        }
        self.restart_queued = false;
        self.begin_end(true, now)
    }

    fn begin_end(&mut self, restart: bool, now: f64) -> Option<SessionCommand> {
        if self.state != SessionState::Active {
            return None;
        }
        self.state = SessionState::Ending { restart, since: now };
        Some(SessionCommand::End)
    }

    /// The browser fired `end`, or the session died on its own.
    pub fn on_ended(&mut self) -> Option<SessionCommand> {
        match self.state {
            SessionState::Ending { restart: true, .. } => {
                self.state = SessionState::Requesting;
                Some(SessionCommand::Request)
            }
            SessionState::Ending { .. } | SessionState::Active => {
                self.state = SessionState::NoSession;
                None
            }
            // Late `end` from a session already given up on.
            SessionState::Requesting | SessionState::NoSession => None,
        }
    }

    /// Gives up waiting for `end` after the bounded wait.
    pub fn tick(&mut self, now: f64) -> Option<SessionCommand> {
        match self.state {
            SessionState::Ending { since, .. } if now - since >= self.end_wait => {
                warn!("[XR] No end event after {:.1}s, continuing", self.end_wait);
                self.on_ended()
            }
            _ => None,
        }
    }
}
