// Copyright (c) 2026-present Welt Engine contributors.
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! The time-ordered event queue: nondecreasing timestamp order, insertion
//! order as the tie-break.

use crate::{field::FieldValue, node::WeakNode};
use std::{cmp::Ordering, collections::BinaryHeap};

/// One pending delivery.
pub struct Event {
    pub timestamp: f64,
    pub target: WeakNode,
    pub event_in: String,
    pub value: FieldValue,
}

struct QueuedEvent {
    seq: u64,
    event: Event,
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueuedEvent {}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the earliest timestamp (and,
        // within a timestamp, the earliest insertion) pops first. Timestamps
        // are never NaN, they come from the simulation clock.
        other
            .event
            .timestamp
            .partial_cmp(&self.event.timestamp)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// See module docs.
#[derive(Default)]
pub struct EventQueue {
    heap: BinaryHeap<QueuedEvent>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: Event) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(QueuedEvent { seq, event });
    }

    /// Pops the next event due at or before `now`.
    pub fn pop_due(&mut self, now: f64) -> Option<Event> {
        if self
            .heap
            .peek()
            .is_some_and(|queued| queued.event.timestamp <= now)
        {
            self.heap.pop().map(|queued| queued.event)
        } else {
            None
        }
    }

    /// Discards every event due at or before `now`; returns how many were
    /// dropped. Used when the per-tick delivery cap trips.
    pub fn discard_due(&mut self, now: f64) -> usize {
        let mut dropped = 0;
        while self.pop_due(now).is_some() {
            dropped += 1;
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

#[cfg(test)]
mod test {
    use super::{Event, EventQueue};
    use crate::{field::FieldValue, node::WeakNode};

    fn dangling() -> WeakNode {
        WeakNode::dangling()
    }

    fn event(timestamp: f64, tag: i32) -> Event {
        Event {
            timestamp,
            target: dangling(),
            event_in: String::new(),
            value: FieldValue::SfInt32(tag),
        }
    }

    #[test]
    fn equal_timestamps_pop_in_insertion_order() {
        let mut queue = EventQueue::new();
        for tag in 0..5 {
            queue.push(event(1.0, tag));
        }
        for expected in 0..5 {
            let popped = queue.pop_due(1.0).unwrap();
            assert_eq!(popped.value, FieldValue::SfInt32(expected));
        }
    }

    #[test]
    fn earlier_timestamp_pops_first() {
        let mut queue = EventQueue::new();
        queue.push(event(2.0, 2));
        queue.push(event(1.0, 1));
        queue.push(event(3.0, 3));
        assert_eq!(queue.pop_due(3.0).unwrap().value, FieldValue::SfInt32(1));
        assert_eq!(queue.pop_due(3.0).unwrap().value, FieldValue::SfInt32(2));
        assert_eq!(queue.pop_due(3.0).unwrap().value, FieldValue::SfInt32(3));
    }

    #[test]
    fn future_events_stay_queued() {
        let mut queue = EventQueue::new();
        queue.push(event(5.0, 1));
        assert!(queue.pop_due(4.0).is_none());
        assert_eq!(queue.len(), 1);
        assert!(queue.pop_due(5.0).is_some());
    }
}
