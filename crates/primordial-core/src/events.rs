use crate::genome::Archetype;
use serde::{Deserialize, Serialize};

/// Observable moments in the world, surfaced to the host between ticks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Event {
    Birth { index: u32, generation: u32 },
    Death { index: u32, archetype: Archetype },
    Colony { archetype: Archetype, mass: f32 },
    Alliance { archetype: Archetype, count: u32 },
    Fusion { archetype: Archetype, mass: f32 },
    Absorption { mass: f32 },
    Assimilation { predator: Archetype, prey: Archetype },
    Milestone(String),
}

/// Bounded event queue. Events are pushed synchronously during a tick and
/// drained by the host afterwards; overflow is counted, not stored, so a
/// host that stops draining cannot grow the queue without bound.
pub struct EventQueue {
    buf: Vec<Event>,
    capacity: usize,
    dropped: u64,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    pub fn push(&mut self, event: Event) {
        if self.buf.len() >= self.capacity {
            self.dropped += 1;
            return;
        }
        self.buf.push(event);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Events dropped on overflow since construction.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Hand all pending events to the host, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<Event> {
        self.buf.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_empties_the_queue_in_order() {
        let mut q = EventQueue::new(8);
        q.push(Event::Milestone("first".into()));
        q.push(Event::Absorption { mass: 2.0 });
        let drained = q.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0], Event::Milestone("first".into()));
        assert!(q.is_empty());
    }

    #[test]
    fn overflow_is_counted_not_stored() {
        let mut q = EventQueue::new(2);
        for i in 0..5 {
            q.push(Event::Birth {
                index: i,
                generation: 1,
            });
        }
        assert_eq!(q.len(), 2);
        assert_eq!(q.dropped(), 3);
        q.drain();
        q.push(Event::Milestone("room again".into()));
        assert_eq!(q.len(), 1);
    }
}
