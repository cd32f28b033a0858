//! The tag-ordered event queue, and the channel type carrying
//! asynchronously produced physical events into the scheduler.

use std::{any::Any, collections::BinaryHeap};

use gyre_core::{
    keys::ActionKey,
    time::{Tag, Timestamp},
};

/// An event on the logical timeline: at `tag`, make `trigger` present,
/// optionally carrying a value.
pub struct TaggedEvent {
    pub tag: Tag,
    pub trigger: ActionKey,
    pub value: Option<Box<dyn Any + Send>>,
}

impl std::fmt::Debug for TaggedEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaggedEvent")
            .field("tag", &self.tag)
            .field("trigger", &self.trigger)
            .field("has_value", &self.value.is_some())
            .finish()
    }
}

impl std::fmt::Display for TaggedEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L[tag={},trigger={}]", self.tag, self.trigger)
    }
}

struct HeapEntry {
    event: TaggedEvent,
    /// Insertion sequence; ties at one tag resolve in arrival order.
    seq: u64,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.event.tag == other.event.tag && self.seq == other.seq
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap is a max-heap; reverse for min-heap behavior
        self.event
            .tag
            .cmp(&other.event.tag)
            .then(self.seq.cmp(&other.seq))
            .reverse()
    }
}

/// Min-heap of [`TaggedEvent`]s ordered by tag, then insertion order.
#[derive(Default)]
pub(crate) struct EventQueue {
    heap: BinaryHeap<HeapEntry>,
    next_seq: u64,
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue")
            .field("len", &self.heap.len())
            .field("next_tag", &self.peek_tag())
            .finish()
    }
}

impl EventQueue {
    pub fn push(&mut self, event: TaggedEvent) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(HeapEntry { event, seq });
    }

    /// The smallest tag currently queued.
    pub fn peek_tag(&self) -> Option<Tag> {
        self.heap.peek().map(|entry| entry.event.tag)
    }

    pub fn pop(&mut self) -> Option<TaggedEvent> {
        self.heap.pop().map(|entry| entry.event)
    }

    /// Drain every event at exactly `tag`, in insertion order.
    pub fn pop_all_at(&mut self, tag: Tag) -> Vec<TaggedEvent> {
        let mut out = Vec::new();
        while self.peek_tag() == Some(tag) {
            out.push(self.pop().expect("peeked event vanished"));
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

/// An event produced outside the scheduler thread.
#[derive(Debug)]
pub(crate) enum PhysicalEvent {
    /// Trigger `action` at the tag derived from the wall-clock time `when`.
    Trigger {
        when: Timestamp,
        action: ActionKey,
        value: Option<Box<dyn Any + Send>>,
    },
    /// Cooperative stop request.
    Stop,
}

impl PhysicalEvent {
    pub fn trigger(when: Timestamp, action: ActionKey, value: Option<Box<dyn Any + Send>>) -> Self {
        Self::Trigger {
            when,
            action,
            value,
        }
    }

    pub fn stop() -> Self {
        Self::Stop
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_event_queue_order() {
        let mut queue = EventQueue::default();
        queue.push(TaggedEvent {
            tag: Tag::new(Duration::from_secs(1), 0),
            trigger: ActionKey::default(),
            value: None,
        });
        queue.push(TaggedEvent {
            tag: Tag::new(Duration::from_secs(0), 1),
            trigger: ActionKey::default(),
            value: None,
        });
        queue.push(TaggedEvent {
            tag: Tag::new(Duration::from_secs(0), 0),
            trigger: ActionKey::default(),
            value: None,
        });

        assert_eq!(queue.pop().unwrap().tag, Tag::new(Duration::ZERO, 0));
        assert_eq!(queue.pop().unwrap().tag, Tag::new(Duration::ZERO, 1));
        assert_eq!(queue.pop().unwrap().tag, Tag::new(Duration::from_secs(1), 0));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_same_tag_insertion_order() {
        let mut map: slotmap::SlotMap<ActionKey, ()> = slotmap::SlotMap::with_key();
        let a = map.insert(());
        let b = map.insert(());
        let tag = Tag::new(Duration::from_millis(1), 0);

        let mut queue = EventQueue::default();
        queue.push(TaggedEvent {
            tag,
            trigger: a,
            value: None,
        });
        queue.push(TaggedEvent {
            tag,
            trigger: b,
            value: None,
        });

        let drained = queue.pop_all_at(tag);
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].trigger, a);
        assert_eq!(drained[1].trigger, b);
        assert!(queue.is_empty());
    }
}
