//! Event sinks.

use std::sync::mpsc::Sender;
use std::sync::{Mutex, PoisonError};

use crate::error::{ArborError, Result};
use crate::events::EngineEvent;

/// Destination for engine notifications.
///
/// Called after the student's record is persisted. An error is logged by
/// the engine and otherwise ignored.
pub trait EventSink: Send + Sync {
    /// Deliver one event.
    fn publish(&self, event: &EngineEvent) -> Result<()>;
}

/// Forwards events over a std channel.
#[derive(Debug)]
pub struct ChannelSink {
    sender: Mutex<Sender<EngineEvent>>,
}

impl ChannelSink {
    /// Wrap the sending half of a channel.
    pub fn new(sender: Sender<EngineEvent>) -> Self {
        Self {
            sender: Mutex::new(sender),
        }
    }
}

impl EventSink for ChannelSink {
    fn publish(&self, event: &EngineEvent) -> Result<()> {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(event.clone())
            .map_err(|_| ArborError::invalid_state("event receiver disconnected"))
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<EngineEvent>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything published so far.
    pub fn events(&self) -> Vec<EngineEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl EventSink for MemorySink {
    fn publish(&self, event: &EngineEvent) -> Result<()> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}

impl<T: EventSink + ?Sized> EventSink for std::sync::Arc<T> {
    fn publish(&self, event: &EngineEvent) -> Result<()> {
        (**self).publish(event)
    }
}
