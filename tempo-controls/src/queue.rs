use std::sync::Arc;

use rand::{Rng, seq::SliceRandom};
use snafu::ensure;
use tempo_models::{Item, Uid};

use crate::{
    Result,
    error::{CorruptSnapshotSnafu, IndexOutOfRangeSnafu, InvalidQueueSnafu},
};

/// What a queue mutation did to the current item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Entries were added, removed or moved. The current item is unchanged.
    Mapping,
    /// The current item is unchanged but now sits at another index.
    Index,
    /// The current item itself changed.
    Song,
    /// The whole order was regenerated by a shuffle toggle.
    Reordered,
}

/// How a list consumer should splice its copy of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateInstructions {
    Diff,
    Replace { from: usize },
    Add { at: usize, size: usize },
    Move { from: usize, to: usize },
    Remove { at: usize, size: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Change {
    pub kind: ChangeKind,
    /// `None` when the list content did not change.
    pub instructions: Option<UpdateInstructions>,
}

impl Change {
    pub fn new(kind: ChangeKind, instructions: UpdateInstructions) -> Self {
        Self {
            kind,
            instructions: Some(instructions),
        }
    }

    pub fn navigation() -> Self {
        Self {
            kind: ChangeKind::Song,
            instructions: None,
        }
    }
}

/// Immutable view of the queue handed to consumers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueSnapshot {
    pub items: Arc<[Item]>,
    pub index: Option<usize>,
    pub shuffled: bool,
}

impl QueueSnapshot {
    pub fn current(&self) -> Option<&Item> {
        self.index.and_then(|index| self.items.get(index))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// The playback queue.
///
/// `heap` keeps items in insertion order and `order` indexes into it. While
/// not shuffled `order` is always the identity permutation, so moves and
/// insertions edit the heap directly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Queue {
    heap: Vec<Item>,
    order: Vec<usize>,
    index: usize,
    shuffled: bool,
}

impl Queue {
    pub fn new() -> Self {
        Default::default()
    }

    /// Rebuilds a queue from its raw parts, dropping heap entries that are
    /// `None`. Returns the queue and the number of dropped entries.
    ///
    /// When the current entry is dropped the next surviving entry becomes
    /// current, clamped to the last one.
    pub fn from_parts(
        heap: Vec<Option<Item>>,
        order: Vec<usize>,
        index: usize,
        shuffled: bool,
    ) -> Result<(Self, usize)> {
        ensure!(
            heap.len() == order.len(),
            CorruptSnapshotSnafu {
                reason: format!("order has {} entries for {} items", order.len(), heap.len()),
            }
        );

        let mut seen = vec![false; heap.len()];
        for &entry in &order {
            ensure!(
                entry < heap.len() && !seen[entry],
                CorruptSnapshotSnafu {
                    reason: format!("order entry {entry} is not a permutation index"),
                }
            );
            seen[entry] = true;
        }

        ensure!(
            shuffled || order.iter().enumerate().all(|(i, &entry)| i == entry),
            CorruptSnapshotSnafu {
                reason: "unshuffled order is not the identity",
            }
        );

        ensure!(
            index < order.len() || (order.is_empty() && index == 0),
            CorruptSnapshotSnafu {
                reason: format!("index {index} is out of range for {} items", order.len()),
            }
        );

        let mut remap = vec![None; heap.len()];
        let mut survivors = Vec::with_capacity(heap.len());
        for (old, item) in heap.into_iter().enumerate() {
            if let Some(item) = item {
                remap[old] = Some(survivors.len());
                survivors.push(item);
            }
        }

        let dropped = remap.iter().filter(|entry| entry.is_none()).count();
        let new_order: Vec<usize> = order.iter().filter_map(|&entry| remap[entry]).collect();

        let new_index = if new_order.is_empty() {
            0
        } else {
            let kept_before = order[..index]
                .iter()
                .filter(|&&entry| remap[entry].is_some())
                .count();
            kept_before.min(new_order.len() - 1)
        };

        let queue = Self {
            heap: survivors,
            order: new_order,
            index: new_index,
            shuffled,
        };
        queue.assert_invariants();

        Ok((queue, dropped))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn index(&self) -> Option<usize> {
        if self.order.is_empty() {
            None
        } else {
            Some(self.index)
        }
    }

    pub fn is_shuffled(&self) -> bool {
        self.shuffled
    }

    pub fn current(&self) -> Option<&Item> {
        self.index().map(|index| &self.heap[self.order[index]])
    }

    pub fn get(&self, index: usize) -> Option<&Item> {
        self.order.get(index).map(|&entry| &self.heap[entry])
    }

    pub fn resolve(&self) -> Vec<Item> {
        self.order.iter().map(|&entry| self.heap[entry].clone()).collect()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            items: self.resolve().into(),
            index: self.index(),
            shuffled: self.shuffled,
        }
    }

    pub(crate) fn heap(&self) -> &[Item] {
        &self.heap
    }

    pub(crate) fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn replace<R: Rng + ?Sized>(
        &mut self,
        items: Vec<Item>,
        start: usize,
        shuffled: bool,
        rng: &mut R,
    ) -> Result<()> {
        ensure!(!items.is_empty(), InvalidQueueSnafu);
        ensure!(
            start < items.len(),
            IndexOutOfRangeSnafu {
                index: start,
                len: items.len(),
            }
        );

        self.order = (0..items.len()).collect();
        self.heap = items;
        self.index = start;
        self.shuffled = false;

        if shuffled {
            self.set_shuffled(true, rng);
        }

        self.assert_invariants();
        Ok(())
    }

    pub fn goto(&mut self, index: usize) -> Result<()> {
        self.ensure_in_range(index)?;
        self.index = index;
        Ok(())
    }

    pub fn remove(&mut self, at: usize) -> Result<Change> {
        self.ensure_in_range(at)?;
        let before = self.current_uid();

        let entry = self.order.remove(at);
        self.heap.remove(entry);
        for other in self.order.iter_mut() {
            if *other > entry {
                *other -= 1;
            }
        }

        let kind = match at.cmp(&self.index) {
            std::cmp::Ordering::Less => {
                self.index -= 1;
                ChangeKind::Mapping
            }
            std::cmp::Ordering::Equal => {
                // The next entry slid into the current slot.
                self.index = self.index.min(self.order.len().saturating_sub(1));

                if self.current_uid() == before {
                    ChangeKind::Mapping
                } else {
                    ChangeKind::Song
                }
            }
            std::cmp::Ordering::Greater => ChangeKind::Mapping,
        };

        self.assert_invariants();
        Ok(Change::new(kind, UpdateInstructions::Remove { at, size: 1 }))
    }

    pub fn move_item(&mut self, from: usize, to: usize) -> Result<Change> {
        self.ensure_in_range(from)?;
        self.ensure_in_range(to)?;

        if self.shuffled {
            let entry = self.order.remove(from);
            self.order.insert(to, entry);
        } else {
            let item = self.heap.remove(from);
            self.heap.insert(to, item);
        }

        let kind = if self.index == from {
            self.index = to;
            if from == to {
                ChangeKind::Mapping
            } else {
                ChangeKind::Index
            }
        } else {
            if from < self.index && to >= self.index {
                self.index -= 1;
            } else if from > self.index && to <= self.index {
                self.index += 1;
            }
            ChangeKind::Mapping
        };

        self.assert_invariants();
        Ok(Change::new(kind, UpdateInstructions::Move { from, to }))
    }

    /// Inserts items directly after the current one.
    pub fn insert_after_current(&mut self, items: Vec<Item>) -> Change {
        let at = self.index().map_or(0, |index| index + 1);
        self.insert(at, items)
    }

    /// Inserts items at the end of the playback order.
    pub fn append(&mut self, items: Vec<Item>) -> Change {
        let at = self.order.len();
        self.insert(at, items)
    }

    fn insert(&mut self, at: usize, items: Vec<Item>) -> Change {
        let size = items.len();
        let was_empty = self.order.is_empty();

        if self.shuffled {
            let start = self.heap.len();
            self.heap.extend(items);
            self.order.splice(at..at, start..start + size);
        } else {
            self.heap.splice(at..at, items);
            self.order = (0..self.heap.len()).collect();
        }

        if !was_empty && at <= self.index {
            self.index += size;
        }

        self.assert_invariants();
        Change::new(ChangeKind::Mapping, UpdateInstructions::Add { at, size })
    }

    /// Turning shuffle on keeps the current item playing by moving it to the
    /// front of a fresh permutation. Turning it off returns to insertion order.
    pub fn set_shuffled<R: Rng + ?Sized>(&mut self, shuffled: bool, rng: &mut R) -> Change {
        let current = self.index().map(|index| self.order[index]);

        if shuffled {
            let mut rest: Vec<usize> = (0..self.heap.len())
                .filter(|&entry| Some(entry) != current)
                .collect();
            rest.shuffle(rng);

            self.order = current.into_iter().chain(rest).collect();
            self.index = 0;
        } else {
            self.order = (0..self.heap.len()).collect();
            self.index = current.unwrap_or(0);
        }

        self.shuffled = shuffled;
        self.assert_invariants();

        Change::new(ChangeKind::Reordered, UpdateInstructions::Replace { from: 0 })
    }

    fn current_uid(&self) -> Option<Uid> {
        self.current().map(|item| item.uid.clone())
    }

    fn ensure_in_range(&self, index: usize) -> Result<()> {
        ensure!(
            index < self.order.len(),
            IndexOutOfRangeSnafu {
                index,
                len: self.order.len(),
            }
        );
        Ok(())
    }

    fn assert_invariants(&self) {
        assert_eq!(
            self.order.len(),
            self.heap.len(),
            "queue order and heap diverged"
        );
        assert!(
            self.index < self.order.len() || (self.order.is_empty() && self.index == 0),
            "queue index {} out of bounds for {} items",
            self.index,
            self.order.len()
        );
        debug_assert!(
            self.shuffled || self.order.iter().enumerate().all(|(i, &entry)| i == entry),
            "unshuffled queue order is not the identity"
        );
    }
}
