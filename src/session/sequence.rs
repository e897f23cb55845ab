//! Per-session sequence numbers for encrypted commands.
//!
//! The TV tracks the sequence number of every encrypted command it accepts, so the
//! local counter must only count commands that were actually delivered. Sends go
//! through a [`SequenceReservation`]: the increment is kept when the reservation is
//! committed and undone when it is dropped without a commit.

use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SequenceError {
    #[error("sequence counter already initialized")]
    AlreadyInitialized,
    #[error("sequence counter used before the session was established")]
    SessionNotEstablished,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SequenceCounter {
    start: Option<u64>,
    value: Option<u64>,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initialize(&mut self, start: u64) -> Result<(), SequenceError> {
        if self.value.is_some() {
            return Err(SequenceError::AlreadyInitialized);
        }
        self.start = Some(start);
        self.value = Some(start);
        Ok(())
    }

    /// Forgets the current value so a new handshake can initialize it again.
    pub fn reset(&mut self) {
        self.start = None;
        self.value = None;
    }

    pub fn current(&self) -> Option<u64> {
        self.value
    }

    /// Advances the counter and returns the number to put on the wire.
    pub fn next_for_send(&mut self) -> Result<u64, SequenceError> {
        let value = self.value.ok_or(SequenceError::SessionNotEstablished)?;
        let next = value.wrapping_add(1);
        self.value = Some(next);
        Ok(next)
    }

    /// Undoes one unacknowledged `next_for_send`. Never goes below the start value.
    pub fn rollback(&mut self) {
        if let (Some(start), Some(value)) = (self.start, self.value) {
            if value > start {
                self.value = Some(value - 1);
            }
        }
    }

    /// Advances the counter, handing back a guard that rolls the increment back
    /// unless [`SequenceReservation::commit`] is called.
    pub fn reserve(&mut self) -> Result<SequenceReservation<'_>, SequenceError> {
        let value = self.next_for_send()?;
        Ok(SequenceReservation {
            counter: self,
            value,
            committed: false,
        })
    }
}

/// Speculative sequence increment tied to one in-flight command.
#[derive(Debug)]
#[must_use = "dropping a reservation rolls the sequence number back"]
pub struct SequenceReservation<'a> {
    counter: &'a mut SequenceCounter,
    value: u64,
    committed: bool,
}

impl SequenceReservation<'_> {
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Marks the command as delivered and keeps the increment.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for SequenceReservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            warn!(seq = self.value, "encrypted command not delivered; rolling back sequence number");
            self.counter.rollback();
        }
    }
}
