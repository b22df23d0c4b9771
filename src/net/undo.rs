use std::collections::VecDeque;

use crate::net::structure::Place;

/// Deep copy of one place taken right before a colored firing.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceSnapshot {
    pub place_id: String,
    pub place: Place,
}

/// Snapshots of every place one colored firing touched, inputs first.
pub type UndoEntry = Vec<PlaceSnapshot>;

/// LIFO of colored-firing snapshots, optionally bounded; the oldest entry is
/// dropped once the bound is exceeded.
#[derive(Debug, Clone, Default)]
pub struct UndoStack {
    entries: VecDeque<UndoEntry>,
    depth: Option<usize>,
}

impl UndoStack {
    pub fn new(depth: Option<usize>) -> Self {
        Self {
            entries: VecDeque::new(),
            depth,
        }
    }

    pub fn push(&mut self, entry: UndoEntry) {
        self.entries.push_back(entry);
        if let Some(depth) = self.depth {
            while self.entries.len() > depth {
                self.entries.pop_front();
                log::debug!("undo stack full ({depth}), dropped oldest entry");
            }
        }
    }

    pub fn pop(&mut self) -> Option<UndoEntry> {
        self.entries.pop_back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> UndoEntry {
        vec![PlaceSnapshot {
            place_id: name.to_uppercase(),
            place: Place::new(name),
        }]
    }

    #[test]
    fn pops_most_recent_first() {
        let mut stack = UndoStack::new(None);
        stack.push(entry("a"));
        stack.push(entry("b"));
        assert_eq!(stack.pop(), Some(entry("b")));
        assert_eq!(stack.pop(), Some(entry("a")));
        assert_eq!(stack.pop(), None);
    }

    #[test]
    fn bounded_depth_drops_oldest() {
        let mut stack = UndoStack::new(Some(2));
        for name in ["a", "b", "c"] {
            stack.push(entry(name));
        }
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.pop(), Some(entry("c")));
        assert_eq!(stack.pop(), Some(entry("b")));
        assert!(stack.is_empty());
    }
}
