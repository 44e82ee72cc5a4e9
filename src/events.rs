//! Events reported to the caller during a run, and run cancellation
//!
//! The pipeline runs on its own worker thread and reports through an
//! [`EventSink`]. The usual sink is the sending half of an
//! `std::sync::mpsc` channel; the UI drains the receiver on its own thread.
//! Events arrive in emission order: a command's events strictly after that
//! command and before the next command's.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use crate::state::{CommandResult, LogEntry};
use crate::types::SetupStatus;

/// Something that happened during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum InstallEvent {
    /// Progress after a command finished
    Progress {
        operation: String,
        percentage: u8,
        detail: String,
    },
    /// A log entry appended to the state
    Log(LogEntry),
    StatusChanged(SetupStatus),
    /// Terminal event with the overall outcome
    Finished {
        success: bool,
        status: SetupStatus,
        results: Vec<CommandResult>,
    },
}

/// Receiver of pipeline events
pub trait EventSink: Send {
    fn emit(&self, event: InstallEvent);
}

impl EventSink for Sender<InstallEvent> {
    fn emit(&self, event: InstallEvent) {
        // The UI may have gone away; the run still completes
        let _ = self.send(event);
    }
}

/// Discards all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: InstallEvent) {}
}

/// Keeps every event in memory
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    events: Arc<Mutex<Vec<InstallEvent>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events received so far
    pub fn events(&self) -> Vec<InstallEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Percentages of all progress events, in order
    pub fn percentages(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                InstallEvent::Progress { percentage, .. } => Some(percentage),
                _ => None,
            })
            .collect()
    }

    /// Statuses of all status-change events, in order
    pub fn statuses(&self) -> Vec<SetupStatus> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                InstallEvent::StatusChanged(status) => Some(status),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: InstallEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Cooperative cancellation flag shared between the UI and the worker.
///
/// The pipeline checks it before each phase and between commands; a command
/// that already started always runs to completion.
#[derive(Debug, Default, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
