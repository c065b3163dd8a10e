//! Completion handles for queued device commands.

use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Execution status of a queued command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventStatus {
    Queued,
    Running,
    Complete,
    Failed(String),
}

impl EventStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventStatus::Complete | EventStatus::Failed(_))
    }
}

/// Drives completion for backends whose events only advance when the host
/// polls the device.
pub trait EventPump: Send + Sync {
    /// Process finished work. With `block` set, wait until at least the
    /// oldest outstanding submission has finished.
    fn pump(&self, block: bool);
}

#[derive(Debug)]
struct EventState {
    status: EventStatus,
    started: Option<Instant>,
    finished: Option<Instant>,
    elapsed: Option<Duration>,
}

struct EventInner {
    state: Mutex<EventState>,
    done: Condvar,
}

/// Handle to one queued command.
///
/// Cloning yields another handle to the same command. Status queries never
/// block; [`wait`](Self::wait) blocks until the command reaches a terminal
/// state and is cheap once it has.
#[derive(Clone)]
pub struct Event {
    inner: Arc<EventInner>,
    pump: Option<Arc<dyn EventPump>>,
}

impl Event {
    /// A new event in the `Queued` state, completed by whoever holds it.
    pub fn user() -> Self {
        Self {
            inner: Arc::new(EventInner {
                state: Mutex::new(EventState {
                    status: EventStatus::Queued,
                    started: None,
                    finished: None,
                    elapsed: None,
                }),
                done: Condvar::new(),
            }),
            pump: None,
        }
    }

    /// A queued event whose progress depends on `pump`.
    pub fn pumped(pump: Arc<dyn EventPump>) -> Self {
        let mut event = Self::user();
        event.pump = Some(pump);
        event
    }

    /// An event that has already failed.
    pub fn failed<S: Into<String>>(message: S) -> Self {
        let event = Self::user();
        event.set_failed(message);
        event
    }

    pub fn set_running(&self) {
        let mut state = self.inner.state.lock();
        if state.status == EventStatus::Queued {
            state.status = EventStatus::Running;
            state.started = Some(Instant::now());
        }
    }

    /// Mark complete; elapsed time is measured from [`set_running`](Self::set_running).
    pub fn set_complete(&self) {
        let mut state = self.inner.state.lock();
        if state.status.is_terminal() {
            return;
        }
        let now = Instant::now();
        let elapsed = state.started.map(|t| now - t).unwrap_or_default();
        state.status = EventStatus::Complete;
        state.finished = Some(now);
        state.elapsed = Some(elapsed);
        self.inner.done.notify_all();
    }

    /// Mark complete with an explicitly profiled duration.
    pub fn set_complete_with_elapsed(&self, elapsed: Duration) {
        let mut state = self.inner.state.lock();
        if state.status.is_terminal() {
            return;
        }
        state.status = EventStatus::Complete;
        state.finished = Some(Instant::now());
        state.elapsed = Some(elapsed);
        self.inner.done.notify_all();
    }

    pub fn set_failed<S: Into<String>>(&self, message: S) {
        let mut state = self.inner.state.lock();
        if state.status.is_terminal() {
            return;
        }
        state.status = EventStatus::Failed(message.into());
        state.finished = Some(Instant::now());
        self.inner.done.notify_all();
    }

    pub fn status(&self) -> EventStatus {
        if let Some(pump) = &self.pump {
            if !self.inner.state.lock().status.is_terminal() {
                pump.pump(false);
            }
        }
        self.inner.state.lock().status.clone()
    }

    /// Non-blocking: true once the command finished, successfully or not.
    pub fn is_complete(&self) -> bool {
        self.status().is_terminal()
    }

    /// Block until the command finishes and surface its failure, if any.
    pub fn wait(&self) -> Result<()> {
        loop {
            {
                let mut state = self.inner.state.lock();
                if !state.status.is_terminal() && self.pump.is_none() {
                    self.inner.done.wait(&mut state);
                }
                match &state.status {
                    EventStatus::Complete => return Ok(()),
                    EventStatus::Failed(message) => return Err(Error::Hardware(message.clone())),
                    _ => {}
                }
            }
            if let Some(pump) = &self.pump {
                pump.pump(true);
            }
        }
    }

    /// Host time the command started running, if it has.
    pub fn started_at(&self) -> Option<Instant> {
        self.inner.state.lock().started
    }

    /// Host time the command reached a terminal state, if it has.
    pub fn finished_at(&self) -> Option<Instant> {
        self.inner.state.lock().finished
    }

    /// Profiled execution time, available once complete.
    pub fn elapsed(&self) -> Option<Duration> {
        let state = self.inner.state.lock();
        match state.status {
            EventStatus::Complete => state.elapsed,
            _ => None,
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("status", &self.inner.state.lock().status)
            .field("pumped", &self.pump.is_some())
            .finish()
    }
}
