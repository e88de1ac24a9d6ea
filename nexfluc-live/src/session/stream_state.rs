//! Per-stream debounce and supersession state
//!
//! `Idle → Pending(epoch) → Deriving(epoch) → Published(epoch)`
//!
//! Every qualifying input bumps the epoch and restarts the debounce
//! deadline. A derivation result is accepted only if its epoch is still the
//! stream's current epoch when it resolves.

use nexfluc_common::events::DerivationStream;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "epoch", rename_all = "lowercase")]
pub enum StreamState {
    Idle,
    Pending(u64),
    Deriving(u64),
    Published(u64),
}

/// Outcome of a resolved derivation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Publication {
    Accepted,
    /// Superseded by a newer epoch
    Discarded { current_epoch: u64 },
}

/// Debounce/epoch controller for one derivation stream
#[derive(Debug)]
pub struct StreamController {
    stream: DerivationStream,
    debounce: Duration,
    min_chars: usize,
    epoch: u64,
    state: StreamState,
    last_trigger: Option<String>,
    pending_input: Option<String>,
    deadline: Option<Instant>,
    in_flight: usize,
}

impl StreamController {
    pub fn new(stream: DerivationStream, debounce: Duration, min_chars: usize) -> Self {
        Self {
            stream,
            debounce,
            min_chars,
            epoch: 0,
            state: StreamState::Idle,
            last_trigger: None,
            pending_input: None,
            deadline: None,
            in_flight: 0,
        }
    }

    pub fn stream(&self) -> DerivationStream {
        self.stream
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Offer new stream input
    ///
    /// Qualifying input (long enough, different from the last trigger)
    /// bumps the epoch and restarts the debounce. Returns whether it qualified.
    pub fn offer(&mut self, input: String, now: Instant) -> bool {
        if input.trim().chars().count() < self.min_chars {
            return false;
        }
        if self.last_trigger.as_deref() == Some(input.as_str()) {
            return false;
        }

        self.epoch += 1;
        self.state = StreamState::Pending(self.epoch);
        self.deadline = Some(now + self.debounce);
        self.last_trigger = Some(input.clone());
        self.pending_input = Some(input);
        true
    }

    /// Debounce deadline elapsed: move to `Deriving` and hand out the captured input
    pub fn fire(&mut self) -> Option<(u64, String)> {
        self.deadline = None;
        let input = self.pending_input.take()?;
        self.state = StreamState::Deriving(self.epoch);
        self.in_flight += 1;
        Some((self.epoch, input))
    }

    /// A derivation for `epoch` (of the current generation) resolved
    pub fn resolve(&mut self, epoch: u64) -> Publication {
        self.in_flight = self.in_flight.saturating_sub(1);

        if epoch == self.epoch && self.state == StreamState::Deriving(epoch) {
            self.state = StreamState::Published(epoch);
            Publication::Accepted
        } else {
            Publication::Discarded {
                current_epoch: self.epoch,
            }
        }
    }

    /// Disconnect/reconnect: counters to zero, back to `Idle`
    pub fn reset(&mut self) {
        self.epoch = 0;
        self.state = StreamState::Idle;
        self.last_trigger = None;
        self.pending_input = None;
        self.deadline = None;
        self.in_flight = 0;
    }
}
