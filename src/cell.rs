//! The scalar adapter: a single value whose writes participate in the
//! ambient history, coalescing repeated writes within one command into a
//! single reversible edit.

use std::cell::RefCell;
use std::rc::Rc;

use crate::action::{impl_any_upcast, Action};
use crate::ambient;
use crate::error::Result;
use crate::event::EventSink;

/// Recognized [`Cell`] flags.
///
/// Only one is defined: whether serialization should persist the cell's
/// *initial* value rather than its live one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellFlags {
    /// If set, persistence writes `initial` instead of the current value.
    pub do_not_persist_current_value: bool,
}

/// A notification emitted by a [`Cell`] as its value changes.
#[derive(Debug, Clone, PartialEq)]
pub enum CellEvent<T> {
    /// The cell's value changed from `old` to `new`, whether by a fresh
    /// write or by undo/redo replaying a recorded one.
    ValueChanged {
        /// The value before the change.
        old: T,
        /// The value after the change.
        new: T,
    },
}

/// A scalar slot of type `T` whose [`set`](Cell::set) installs a reversible
/// write into whatever command is current on the ambient history.
pub struct Cell<T> {
    value: Rc<RefCell<T>>,
    initial: T,
    flags: CellFlags,
    events: Rc<RefCell<EventSink<CellEvent<T>>>>,
}

impl<T: Clone> Cell<T> {
    /// Creates a cell holding `initial`, with no flags set.
    pub fn new(initial: T) -> Self {
        Cell::with_flags(initial, CellFlags::default())
    }

    /// Creates a cell holding `initial`, with the given flags.
    pub fn with_flags(initial: T, flags: CellFlags) -> Self {
        Cell {
            value: Rc::new(RefCell::new(initial.clone())),
            initial,
            flags,
            events: Rc::new(RefCell::new(EventSink::new())),
        }
    }

    /// The current value.
    pub fn get(&self) -> T {
        self.value.borrow().clone()
    }

    /// The value this cell was constructed with, regardless of any writes
    /// or undo/redo since.
    pub fn initial(&self) -> &T {
        &self.initial
    }

    /// The value that a persistence hook should write: `initial` if
    /// [`CellFlags::do_not_persist_current_value`] is set, the live value
    /// otherwise.
    pub fn persisted_value(&self) -> T {
        if self.flags.do_not_persist_current_value {
            self.initial.clone()
        } else {
            self.get()
        }
    }

    /// The cell's flags.
    pub fn flags(&self) -> CellFlags {
        self.flags
    }

    /// Replaces the cell's flags.
    pub fn set_flags(&mut self, flags: CellFlags) {
        self.flags = flags;
    }

    /// Connects an observer for this cell's [`CellEvent`]s, returning the
    /// previously connected one if any.
    pub fn connect(
        &self,
        f: impl FnMut(CellEvent<T>) -> Result<()> + 'static,
    ) -> Option<Box<dyn FnMut(CellEvent<T>) -> Result<()>>>
    where
        T: 'static,
    {
        self.events.borrow_mut().connect(f)
    }

    /// Removes and returns the connected observer, if any.
    pub fn disconnect(&self) -> Option<Box<dyn FnMut(CellEvent<T>) -> Result<()>>>
    where
        T: 'static,
    {
        self.events.borrow_mut().disconnect()
    }
}

impl<T: Clone + 'static> Cell<T> {
    /// Sets the value, recording a reversible edit on the ambient history.
    ///
    /// If the ambient command's last action is already a [`CellWrite`]
    /// targeting this cell, its recorded `new` value is updated and it is
    /// re-applied in place (the pre-command `old` value it captured on
    /// first write is untouched) — this is what coalesces a run of writes
    /// within one command into a single reversible edit. Otherwise a fresh
    /// `CellWrite` capturing the current value as `old` is submitted.
    ///
    /// With no command in progress (or a suspended one), the write still
    /// happens immediately; it is simply not recorded.
    pub fn set(&self, v: T) -> Result<()> {
        let coalesced = ambient::last_action_mut(|action| -> Option<Result<()>> {
            let action = action?;
            let write = action.downcast_mut::<CellWrite<T>>()?;
            if !Rc::ptr_eq(&write.value, &self.value) {
                return None;
            }
            write.new = v.clone();
            Some(write.apply())
        });

        match coalesced {
            Some(result) => result,
            None => {
                let old = self.value.borrow().clone();
                let write = CellWrite {
                    value: self.value.clone(),
                    events: self.events.clone(),
                    old,
                    new: v,
                };
                ambient::add_action(write)
            }
        }
    }
}

/// The reversible action recorded by [`Cell::set`].
struct CellWrite<T> {
    value: Rc<RefCell<T>>,
    events: Rc<RefCell<EventSink<CellEvent<T>>>>,
    old: T,
    new: T,
}

impl<T: Clone + 'static> Action for CellWrite<T> {
    fn apply(&mut self) -> Result<()> {
        let previous = self.value.borrow().clone();
        *self.value.borrow_mut() = self.new.clone();
        if let Err(err) = self.events.borrow_mut().emit(CellEvent::ValueChanged {
            old: self.old.clone(),
            new: self.new.clone(),
        }) {
            *self.value.borrow_mut() = previous;
            return Err(err);
        }
        Ok(())
    }

    fn revert(&mut self) -> Result<()> {
        let previous = self.value.borrow().clone();
        *self.value.borrow_mut() = self.old.clone();
        if let Err(err) = self.events.borrow_mut().emit(CellEvent::ValueChanged {
            old: self.new.clone(),
            new: self.old.clone(),
        }) {
            *self.value.borrow_mut() = previous;
            return Err(err);
        }
        Ok(())
    }

    impl_any_upcast!();
}

#[cfg(feature = "serde")]
impl<T> serde_crate::Serialize for Cell<T>
where
    T: serde_crate::Serialize + Clone,
{
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde_crate::Serializer,
    {
        self.persisted_value().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::History;
    use std::cell::Cell as StdCell;

    #[test]
    fn basic_set_get_undo_redo() {
        let history: History<&str> = History::new();
        let cell = Cell::new(0);

        history.begin_command("a").unwrap();
        cell.set(1).unwrap();
        history.end_command(false).unwrap();

        assert_eq!(cell.get(), 1);
        history.undo().unwrap();
        assert_eq!(cell.get(), 0);
        history.redo().unwrap();
        assert_eq!(cell.get(), 1);
    }

    #[test]
    fn coalescing_within_command() {
        let history: History<&str> = History::new();
        let cell = Cell::new(0);

        history.begin_command("a").unwrap();
        cell.set(1).unwrap();
        cell.set(2).unwrap();
        cell.set(3).unwrap();
        history.end_command(false).unwrap();

        assert_eq!(history.count(), 1);
        assert_eq!(cell.get(), 3);
        history.undo().unwrap();
        assert_eq!(cell.get(), 0);
        history.redo().unwrap();
        assert_eq!(cell.get(), 3);
    }

    #[test]
    fn set_without_command_is_unrecorded() {
        let cell = Cell::new(0);
        cell.set(5).unwrap();
        assert_eq!(cell.get(), 5);
    }

    #[test]
    fn observer_failure_rolls_back_value() {
        let history: History<&str> = History::new();
        let cell = Cell::new(0);
        cell.connect(|_| Err(crate::error::Error::observer_message("boom")));

        history.begin_command("a").unwrap();
        let result = cell.set(1);
        assert!(result.is_err());
        // The notification failed, so the write must not have stuck.
        assert_eq!(cell.get(), 0);
    }

    #[test]
    fn notifies_observer_on_apply_and_revert() {
        let history: History<&str> = History::new();
        let cell = Cell::new(0);
        let seen = Rc::new(StdCell::new(Vec::new()));
        let seen2 = seen.clone();
        cell.connect(move |event| {
            let CellEvent::ValueChanged { old, new } = event;
            let mut log = seen2.take();
            log.push((old, new));
            seen2.set(log);
            Ok(())
        });

        history.begin_command("a").unwrap();
        cell.set(1).unwrap();
        history.end_command(false).unwrap();
        history.undo().unwrap();

        assert_eq!(seen.take(), vec![(0, 1), (1, 0)]);
    }

    #[test]
    fn persisted_value_respects_do_not_persist_flag() {
        let cell = Cell::with_flags(
            0,
            CellFlags {
                do_not_persist_current_value: true,
            },
        );
        cell.set(42).unwrap();
        assert_eq!(cell.get(), 42);
        assert_eq!(cell.persisted_value(), 0);
    }
}
