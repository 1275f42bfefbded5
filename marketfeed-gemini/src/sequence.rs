//! Passive observation of per-connection ordering.
//!
//! Gemini numbers every frame on a socket with `socket_sequence` (+1 per
//! frame, heartbeats included) and stamps book changes with a
//! non-decreasing `eventId`. The tracker only reports what it sees; it
//! never drops or reorders anything.

/// Result of observing one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// First frame on the connection, or exactly the expected successor
    InOrder,
    /// One or more frames were skipped
    Gap { expected: u32, received: u32 },
    /// Sequence went backwards or repeated
    Replayed { last: u32, received: u32 },
    /// `eventId` went backwards while the socket sequence was fine
    EventIdRegression { last: u64, received: u64 },
}

impl SequenceCheck {
    pub fn is_anomaly(&self) -> bool {
        !matches!(self, SequenceCheck::InOrder)
    }
}

/// Tracks the last socket sequence and event id seen on one connection
#[derive(Debug, Default)]
pub struct SequenceTracker {
    last_sequence: Option<u32>,
    last_event_id: Option<u64>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything; call on every new connection.
    pub fn reset(&mut self) {
        self.last_sequence = None;
        self.last_event_id = None;
    }

    /// Observe a frame. Pass `event_id = None` for frames that carry none
    /// (heartbeats).
    pub fn observe(&mut self, socket_sequence: u32, event_id: Option<u64>) -> SequenceCheck {
        let seq_check = match self.last_sequence {
            None => SequenceCheck::InOrder,
            Some(last) if socket_sequence == last.wrapping_add(1) => SequenceCheck::InOrder,
            Some(last) if socket_sequence > last => SequenceCheck::Gap {
                expected: last.wrapping_add(1),
                received: socket_sequence,
            },
            Some(last) => SequenceCheck::Replayed {
                last,
                received: socket_sequence,
            },
        };
        self.last_sequence = Some(socket_sequence);

        let mut check = seq_check;
        if let Some(id) = event_id {
            if let Some(last) = self.last_event_id {
                if id < last && !check.is_anomaly() {
                    check = SequenceCheck::EventIdRegression { last, received: id };
                }
            }
            self.last_event_id = Some(self.last_event_id.map_or(id, |last| last.max(id)));
        }

        check
    }
}
