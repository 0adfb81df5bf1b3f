//! FIFO buffer of events waiting to be published

use crate::core::PendingEvent;
use std::collections::VecDeque;

/// Unbounded FIFO of normalized events
///
/// Appends never block or reject. Events leave only through
/// [`drain_all`](EventBuffer::drain_all), oldest first.
#[derive(Debug, Default)]
pub struct EventBuffer {
    events: VecDeque<PendingEvent>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn append(&mut self, event: PendingEvent) {
        self.events.push_back(event);
    }

    /// Yield events oldest first, removing each as it is taken
    ///
    /// Events not taken before the iterator is dropped stay buffered.
    pub fn drain_all(&mut self) -> DrainAll<'_> {
        DrainAll { buffer: self }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

pub struct DrainAll<'a> {
    buffer: &'a mut EventBuffer,
}

impl Iterator for DrainAll<'_> {
    type Item = PendingEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.buffer.events.pop_front()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.buffer.len();
        (len, Some(len))
    }
}
