//! The ordered-sequence adapter: a `Vec<T>`-like container whose structural
//! mutations are captured as reversible range operations on the ambient
//! history.

use std::cell::RefCell;
use std::rc::Rc;

use crate::action::{impl_any_upcast, Action};
use crate::ambient;
use crate::error::{Error, Result};
use crate::event::EventSink;

/// A notification emitted by a [`Sequence`] as its contents change.
#[derive(Debug, Clone, PartialEq)]
pub enum SequenceEvent<T> {
    /// `items`, starting at `index`, were inserted.
    ItemsAdded {
        /// The index the first new item now occupies.
        index: usize,
        /// The inserted items, in order.
        items: Vec<T>,
    },
    /// `items`, starting at `index`, were removed.
    ItemsRemoved {
        /// The index the first removed item used to occupy.
        index: usize,
        /// The removed items, in order.
        items: Vec<T>,
    },
    /// The items starting at `index` were replaced, whole-sale (a single
    /// [`Sequence::set`] call replaces one item; [`Sequence::replace_all`]
    /// replaces the entire contents, with `index == 0`).
    ItemsReplaced {
        /// The index the first replaced item occupies.
        index: usize,
        /// The items previously there.
        old: Vec<T>,
        /// The items now there.
        new: Vec<T>,
    },
    /// The sequence was emptied; `old` holds what it contained.
    ListCleared {
        /// The items that were cleared.
        old: Vec<T>,
    },
}

/// An ordered container of `T` mirroring standard list operations, where
/// every structural mutator produces a reversible action on the ambient
/// history.
///
/// Constructed read-only, a `Sequence` rejects every mutator with
/// [`Error::ReadOnly`] while still allowing non-mutating reads.
pub struct Sequence<T> {
    items: Rc<RefCell<Vec<T>>>,
    read_only: bool,
    events: Rc<RefCell<EventSink<SequenceEvent<T>>>>,
}

impl<T> Sequence<T> {
    /// Creates an empty, writable sequence.
    pub fn new() -> Self {
        Sequence::from_vec(Vec::new(), false)
    }

    /// Creates a sequence seeded with `items`.
    pub fn from_vec(items: Vec<T>, read_only: bool) -> Self {
        Sequence {
            items: Rc::new(RefCell::new(items)),
            read_only,
            events: Rc::new(RefCell::new(EventSink::new())),
        }
    }

    /// Creates an empty, read-only sequence. Useless on its own, but mirrors
    /// [`from_vec`](Self::from_vec) for symmetry; prefer `from_vec` with
    /// seed data for a read-only view over existing content.
    pub fn read_only(items: Vec<T>) -> Self {
        Sequence::from_vec(items, true)
    }

    /// The number of items.
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    /// `true` if there are no items.
    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// `true` if this sequence rejects structural mutation.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Connects an observer for this sequence's [`SequenceEvent`]s, returning
    /// the previously connected one if any.
    pub fn connect(
        &self,
        f: impl FnMut(SequenceEvent<T>) -> Result<()> + 'static,
    ) -> Option<Box<dyn FnMut(SequenceEvent<T>) -> Result<()>>>
    where
        T: 'static,
    {
        self.events.borrow_mut().connect(f)
    }

    /// Removes and returns the connected observer, if any.
    pub fn disconnect(&self) -> Option<Box<dyn FnMut(SequenceEvent<T>) -> Result<()>>>
    where
        T: 'static,
    {
        self.events.borrow_mut().disconnect()
    }

    fn check_read_only(&self) -> Result<()> {
        if self.read_only {
            Err(Error::ReadOnly)
        } else {
            Ok(())
        }
    }

    fn check_index(&self, index: usize, len: usize) -> Result<()> {
        if index > len {
            Err(Error::OutOfRange { index, len })
        } else {
            Ok(())
        }
    }
}

impl<T: Clone> Sequence<T> {
    /// Returns a clone of the item at `index`, or `None` if out of range.
    pub fn get(&self, index: usize) -> Option<T> {
        self.items.borrow().get(index).cloned()
    }

    /// A snapshot of the full contents, oldest-index-first.
    pub fn to_array(&self) -> Vec<T> {
        self.items.borrow().clone()
    }

    /// Copies the contents into `dest`, failing with [`Error::OutOfRange`] if
    /// `dest` is shorter than this sequence.
    pub fn copy_to_slice(&self, dest: &mut [T]) -> Result<()> {
        let items = self.items.borrow();
        if dest.len() < items.len() {
            return Err(Error::OutOfRange {
                index: items.len(),
                len: dest.len(),
            });
        }
        dest[..items.len()].clone_from_slice(&items);
        Ok(())
    }
}

impl<T: PartialEq> Sequence<T> {
    /// `true` if some item equals `x`.
    pub fn contains(&self, x: &T) -> bool {
        self.items.borrow().contains(x)
    }

    /// The index of the first item equal to `x`, by forward scan.
    pub fn index_of(&self, x: &T) -> Option<usize> {
        self.items.borrow().iter().position(|item| item == x)
    }
}

impl<T: Clone + PartialEq + 'static> Sequence<T> {
    /// Inserts `x` at `index`.
    pub fn insert(&self, index: usize, x: T) -> Result<()> {
        self.insert_range(index, vec![x])
    }

    /// Inserts `xs` starting at `index`, preserving their order.
    pub fn insert_range(&self, index: usize, xs: Vec<T>) -> Result<()> {
        self.check_read_only()?;
        self.check_index(index, self.len())?;
        if xs.is_empty() {
            return Ok(());
        }
        let action = Insert {
            items: self.items.clone(),
            events: self.events.clone(),
            index,
            inserted: xs,
        };
        ambient::add_action(action)
    }

    /// Appends `x` to the end.
    pub fn add(&self, x: T) -> Result<()> {
        self.insert(self.len(), x)
    }

    /// Appends `xs` to the end, preserving their order.
    pub fn add_range(&self, xs: Vec<T>) -> Result<()> {
        self.insert_range(self.len(), xs)
    }

    /// Removes the item at `index`.
    pub fn remove_at(&self, index: usize) -> Result<()> {
        self.remove_range(index, 1)
    }

    /// Removes `count` items starting at `index`.
    pub fn remove_range(&self, index: usize, count: usize) -> Result<()> {
        self.check_read_only()?;
        let len = self.len();
        if count == 0 {
            self.check_index(index, len)?;
            return Ok(());
        }
        let end = index
            .checked_add(count)
            .filter(|&end| end <= len)
            .ok_or(Error::OutOfRange { index, len })?;
        let removed = self.items.borrow()[index..end].to_vec();
        let action = Remove {
            items: self.items.clone(),
            events: self.events.clone(),
            index,
            removed,
        };
        ambient::add_action(action)
    }

    /// Removes the first item equal to `x`, found by forward scan. Returns
    /// `false` without recording or emitting anything if no item matches.
    pub fn remove(&self, x: &T) -> Result<bool> {
        let index = self.index_of(x);
        match index {
            Some(index) => {
                self.remove_at(index)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Replaces the item at `index` with `x`.
    pub fn set(&self, index: usize, x: T) -> Result<()> {
        self.check_read_only()?;
        let len = self.len();
        if index >= len {
            return Err(Error::OutOfRange { index, len });
        }
        let old = self.items.borrow()[index].clone();
        let action = ReplaceItem {
            items: self.items.clone(),
            events: self.events.clone(),
            index,
            old,
            new: x,
        };
        ambient::add_action(action)
    }

    /// Replaces the entire contents with `xs`.
    pub fn replace_all(&self, xs: Vec<T>) -> Result<()> {
        self.check_read_only()?;
        let old = self.items.borrow().clone();
        let action = ReplaceList {
            items: self.items.clone(),
            events: self.events.clone(),
            old,
            new: xs,
        };
        ambient::add_action(action)
    }

    /// Empties the sequence.
    pub fn clear(&self) -> Result<()> {
        self.check_read_only()?;
        if self.is_empty() {
            return Ok(());
        }
        let old = self.items.borrow().clone();
        let action = Clear {
            items: self.items.clone(),
            events: self.events.clone(),
            old,
        };
        ambient::add_action(action)
    }
}

impl<T> Default for Sequence<T> {
    fn default() -> Self {
        Sequence::new()
    }
}

struct Insert<T> {
    items: Rc<RefCell<Vec<T>>>,
    events: Rc<RefCell<EventSink<SequenceEvent<T>>>>,
    index: usize,
    inserted: Vec<T>,
}

impl<T: Clone + 'static> Action for Insert<T> {
    fn apply(&mut self) -> Result<()> {
        {
            let mut items = self.items.borrow_mut();
            items.splice(self.index..self.index, self.inserted.iter().cloned());
        }
        if let Err(err) = self.events.borrow_mut().emit(SequenceEvent::ItemsAdded {
            index: self.index,
            items: self.inserted.clone(),
        }) {
            let mut items = self.items.borrow_mut();
            items.drain(self.index..self.index + self.inserted.len());
            return Err(err);
        }
        Ok(())
    }

    fn revert(&mut self) -> Result<()> {
        let removed: Vec<T> = {
            let mut items = self.items.borrow_mut();
            items
                .drain(self.index..self.index + self.inserted.len())
                .collect()
        };
        if let Err(err) = self.events.borrow_mut().emit(SequenceEvent::ItemsRemoved {
            index: self.index,
            items: removed.clone(),
        }) {
            let mut items = self.items.borrow_mut();
            items.splice(self.index..self.index, removed);
            return Err(err);
        }
        Ok(())
    }

    impl_any_upcast!();
}

struct Remove<T> {
    items: Rc<RefCell<Vec<T>>>,
    events: Rc<RefCell<EventSink<SequenceEvent<T>>>>,
    index: usize,
    removed: Vec<T>,
}

impl<T: Clone + 'static> Action for Remove<T> {
    fn apply(&mut self) -> Result<()> {
        {
            let mut items = self.items.borrow_mut();
            items.drain(self.index..self.index + self.removed.len());
        }
        if let Err(err) = self.events.borrow_mut().emit(SequenceEvent::ItemsRemoved {
            index: self.index,
            items: self.removed.clone(),
        }) {
            let mut items = self.items.borrow_mut();
            items.splice(self.index..self.index, self.removed.iter().cloned());
            return Err(err);
        }
        Ok(())
    }

    fn revert(&mut self) -> Result<()> {
        {
            let mut items = self.items.borrow_mut();
            items.splice(self.index..self.index, self.removed.iter().cloned());
        }
        if let Err(err) = self.events.borrow_mut().emit(SequenceEvent::ItemsAdded {
            index: self.index,
            items: self.removed.clone(),
        }) {
            let mut items = self.items.borrow_mut();
            items.drain(self.index..self.index + self.removed.len());
            return Err(err);
        }
        Ok(())
    }

    impl_any_upcast!();
}

struct ReplaceItem<T> {
    items: Rc<RefCell<Vec<T>>>,
    events: Rc<RefCell<EventSink<SequenceEvent<T>>>>,
    index: usize,
    old: T,
    new: T,
}

impl<T: Clone + 'static> Action for ReplaceItem<T> {
    fn apply(&mut self) -> Result<()> {
        self.items.borrow_mut()[self.index] = self.new.clone();
        if let Err(err) = self.events.borrow_mut().emit(SequenceEvent::ItemsReplaced {
            index: self.index,
            old: vec![self.old.clone()],
            new: vec![self.new.clone()],
        }) {
            self.items.borrow_mut()[self.index] = self.old.clone();
            return Err(err);
        }
        Ok(())
    }

    fn revert(&mut self) -> Result<()> {
        self.items.borrow_mut()[self.index] = self.old.clone();
        if let Err(err) = self.events.borrow_mut().emit(SequenceEvent::ItemsReplaced {
            index: self.index,
            old: vec![self.new.clone()],
            new: vec![self.old.clone()],
        }) {
            self.items.borrow_mut()[self.index] = self.new.clone();
            return Err(err);
        }
        Ok(())
    }

    impl_any_upcast!();
}

struct ReplaceList<T> {
    items: Rc<RefCell<Vec<T>>>,
    events: Rc<RefCell<EventSink<SequenceEvent<T>>>>,
    old: Vec<T>,
    new: Vec<T>,
}

impl<T: Clone + 'static> Action for ReplaceList<T> {
    fn apply(&mut self) -> Result<()> {
        *self.items.borrow_mut() = self.new.clone();
        if let Err(err) = self.events.borrow_mut().emit(SequenceEvent::ItemsReplaced {
            index: 0,
            old: self.old.clone(),
            new: self.new.clone(),
        }) {
            *self.items.borrow_mut() = self.old.clone();
            return Err(err);
        }
        Ok(())
    }

    fn revert(&mut self) -> Result<()> {
        *self.items.borrow_mut() = self.old.clone();
        if let Err(err) = self.events.borrow_mut().emit(SequenceEvent::ItemsReplaced {
            index: 0,
            old: self.new.clone(),
            new: self.old.clone(),
        }) {
            *self.items.borrow_mut() = self.new.clone();
            return Err(err);
        }
        Ok(())
    }

    impl_any_upcast!();
}

struct Clear<T> {
    items: Rc<RefCell<Vec<T>>>,
    events: Rc<RefCell<EventSink<SequenceEvent<T>>>>,
    old: Vec<T>,
}

impl<T: Clone + 'static> Action for Clear<T> {
    fn apply(&mut self) -> Result<()> {
        self.items.borrow_mut().clear();
        if let Err(err) = self
            .events
            .borrow_mut()
            .emit(SequenceEvent::ListCleared { old: self.old.clone() })
        {
            *self.items.borrow_mut() = self.old.clone();
            return Err(err);
        }
        Ok(())
    }

    fn revert(&mut self) -> Result<()> {
        *self.items.borrow_mut() = self.old.clone();
        if let Err(err) = self.events.borrow_mut().emit(SequenceEvent::ItemsAdded {
            index: 0,
            items: self.old.clone(),
        }) {
            self.items.borrow_mut().clear();
            return Err(err);
        }
        Ok(())
    }

    impl_any_upcast!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::History;

    #[test]
    fn insert_and_remove_round_trip() {
        let history: History<&str> = History::new();
        let seq = Sequence::from_vec(vec![1, 2, 3], false);

        history.begin_command("x").unwrap();
        seq.remove_at(0).unwrap();
        seq.insert(1, 9).unwrap();
        history.end_command(false).unwrap();

        assert_eq!(seq.to_array(), vec![2, 9, 3]);
        history.undo().unwrap();
        assert_eq!(seq.to_array(), vec![1, 2, 3]);
        history.redo().unwrap();
        assert_eq!(seq.to_array(), vec![2, 9, 3]);
    }

    #[test]
    fn cancel_restores_contents() {
        let history: History<&str> = History::new();
        let seq: Sequence<i32> = Sequence::new();

        history.begin_command("a").unwrap();
        seq.add(10).unwrap();
        seq.add(20).unwrap();
        history.cancel_command().unwrap();

        assert!(seq.is_empty());
        assert_eq!(history.count(), 0);
    }

    #[test]
    fn remove_by_value_scans_forward() {
        let history: History<&str> = History::new();
        let seq = Sequence::from_vec(vec![5, 6, 7], false);

        history.begin_command("a").unwrap();
        let found = seq.remove(&6).unwrap();
        history.end_command(false).unwrap();

        assert!(found);
        assert_eq!(seq.to_array(), vec![5, 7]);
    }

    #[test]
    fn remove_missing_value_is_a_no_op() {
        let history: History<&str> = History::new();
        let seq = Sequence::from_vec(vec![5, 6, 7], false);

        history.begin_command("a").unwrap();
        let found = seq.remove(&99).unwrap();
        history.end_command(false).unwrap();

        assert!(!found);
        assert_eq!(history.count(), 0);
    }

    #[test]
    fn replace_all_and_set_round_trip() {
        let history: History<&str> = History::new();
        let seq = Sequence::from_vec(vec![1, 2, 3], false);

        history.begin_command("a").unwrap();
        seq.set(1, 20).unwrap();
        history.end_command(false).unwrap();
        assert_eq!(seq.to_array(), vec![1, 20, 3]);

        history.begin_command("b").unwrap();
        seq.replace_all(vec![7, 8]).unwrap();
        history.end_command(false).unwrap();
        assert_eq!(seq.to_array(), vec![7, 8]);

        history.undo().unwrap();
        assert_eq!(seq.to_array(), vec![1, 20, 3]);
        history.undo().unwrap();
        assert_eq!(seq.to_array(), vec![1, 2, 3]);
    }

    #[test]
    fn clear_then_undo_restores_contents() {
        let history: History<&str> = History::new();
        let seq = Sequence::from_vec(vec![1, 2, 3], false);

        history.begin_command("a").unwrap();
        seq.clear().unwrap();
        history.end_command(false).unwrap();

        assert!(seq.is_empty());
        history.undo().unwrap();
        assert_eq!(seq.to_array(), vec![1, 2, 3]);
    }

    #[test]
    fn read_only_rejects_mutation() {
        let seq = Sequence::from_vec(vec![1, 2, 3], true);
        assert!(matches!(seq.add(4), Err(Error::ReadOnly)));
        assert!(matches!(seq.remove_at(0), Err(Error::ReadOnly)));
        assert!(matches!(seq.set(0, 9), Err(Error::ReadOnly)));
        assert!(matches!(seq.clear(), Err(Error::ReadOnly)));
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let seq = Sequence::from_vec(vec![1, 2, 3], false);
        assert!(matches!(
            seq.insert(10, 0),
            Err(Error::OutOfRange { index: 10, len: 3 })
        ));
        assert!(matches!(
            seq.set(10, 0),
            Err(Error::OutOfRange { index: 10, len: 3 })
        ));
    }

    #[test]
    fn reads_never_touch_history() {
        let history: History<&str> = History::new();
        let seq = Sequence::from_vec(vec![1, 2, 3], false);
        assert_eq!(seq.get(1), Some(2));
        assert!(seq.contains(&3));
        assert_eq!(seq.index_of(&3), Some(2));
        assert_eq!(history.count(), 0);
        assert!(!history.is_command_started());
    }
}
