use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::ambient::{self, AmbientTarget};
use crate::command::Command;
use crate::error::{Error, Result};

/// Submits an action to whatever command is current on this thread's ambient
/// history. See [`crate::ambient::add_action`] for the full fire-and-forget
/// contract when no command (or no history) is active.
pub use crate::ambient::add_action;

/// Runs a visitor against the ambient current command's last action, or
/// `None` if there is none. See [`crate::ambient::last_action_mut`].
pub use crate::ambient::last_action_mut as last_action;

/// A cursor value that can never equal a real position, used to mark a
/// save-point whose command was evicted from the history.
const SAVE_POINT_POISON: isize = -2;

/// A notification emitted by a [`History`] as its commands are created,
/// finalized, traversed, or discarded.
///
/// Every variant carries the affected command's identifier (cloned), rather
/// than its index, since merging and eviction make indices unstable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event<Id> {
    /// `begin_command` started a new command.
    CommandStarted {
        /// The new command's identifier.
        id: Option<Id>,
    },
    /// `end_command` finished building a command (merged, appended, or
    /// elided for having zero actions).
    CommandEnded {
        /// The command's identifier.
        id: Option<Id>,
    },
    /// `cancel_command` discarded the command in progress.
    CommandCancelled {
        /// The cancelled command's identifier.
        id: Option<Id>,
    },
    /// A command's actions are now in their applied state (after being
    /// built, redone, or crossed forward during a position change).
    CommandExecuted {
        /// The executed command's identifier.
        id: Option<Id>,
    },
    /// A command's actions are now in their reverted state (after being
    /// undone, or crossed backward during a position change).
    CommandRolledBack {
        /// The rolled-back command's identifier.
        id: Option<Id>,
    },
    /// A command was evicted from the history because it grew past the
    /// size limit.
    CommandDiscarded {
        /// The discarded command's identifier.
        id: Option<Id>,
    },
}

struct Shared<Id> {
    commands: VecDeque<Command<Id>>,
    cursor: isize,
    size_limit: usize,
    save_point: isize,
    current: Option<Command<Id>>,
    suspend_depth: u32,
    is_undoing: bool,
    is_redoing: bool,
}

impl<Id> Shared<Id> {
    fn new() -> Self {
        Shared {
            commands: VecDeque::new(),
            cursor: -1,
            size_limit: 0,
            save_point: -1,
            current: None,
            suspend_depth: 0,
            is_undoing: false,
            is_redoing: false,
        }
    }
}

/// The undo/redo engine: a command buffer with cursor-based traversal,
/// bounded capacity, save-point tracking, and the ambient "current history"
/// binding described in `spec.md` §4.3.
///
/// `History` is a cheap, `Clone`-able handle (internally `Rc<RefCell<..>>>`);
/// cloning it gives you another reference to the same underlying engine,
/// which is how it can install itself into the thread-local ambient slot
/// and still be reachable from the call that installed it.
pub struct History<Id = String> {
    shared: Rc<RefCell<Shared<Id>>>,
    events: Rc<RefCell<Option<Box<dyn FnMut(Event<Id>) -> Result<()>>>>>,
}

impl<Id> Clone for History<Id> {
    fn clone(&self) -> Self {
        History {
            shared: self.shared.clone(),
            events: self.events.clone(),
        }
    }
}

impl<Id: Clone + PartialEq + 'static> History<Id> {
    /// Creates a fresh, empty history.
    pub fn new() -> Self {
        History {
            shared: Rc::new(RefCell::new(Shared::new())),
            events: Rc::new(RefCell::new(None)),
        }
    }

    /// Connects an observer for this history's events, returning the
    /// previously connected observer if any.
    pub fn connect(
        &self,
        f: impl FnMut(Event<Id>) -> Result<()> + 'static,
    ) -> Option<Box<dyn FnMut(Event<Id>) -> Result<()>>> {
        self.events.borrow_mut().replace(Box::new(f))
    }

    /// Removes and returns the connected observer, if any.
    pub fn disconnect(&self) -> Option<Box<dyn FnMut(Event<Id>) -> Result<()>>> {
        self.events.borrow_mut().take()
    }

    fn emit(&self, event: Event<Id>) -> Result<()> {
        let mut slot = self.events.borrow_mut().take();
        let result = match slot.as_mut() {
            Some(f) => f(event),
            None => Ok(()),
        };
        *self.events.borrow_mut() = slot;
        result
    }

    fn as_ambient_target(&self) -> Rc<dyn AmbientTarget> {
        Rc::new(self.clone())
    }

    /// The number of commands currently in the history.
    pub fn count(&self) -> usize {
        self.shared.borrow().commands.len()
    }

    /// The cursor: index of the topmost applied command, or `-1` if nothing
    /// is applied.
    pub fn position(&self) -> isize {
        self.shared.borrow().cursor
    }

    /// The capacity limit (`0` means unbounded).
    pub fn size(&self) -> usize {
        self.shared.borrow().size_limit
    }

    /// `true` if there is at least one command to undo.
    pub fn can_undo(&self) -> bool {
        self.shared.borrow().cursor >= 0
    }

    /// `true` if there is at least one command to redo.
    pub fn can_redo(&self) -> bool {
        let s = self.shared.borrow();
        s.cursor < s.commands.len() as isize - 1
    }

    /// `true` if the observable state differs from the state at the last
    /// [`set_save_point`](Self::set_save_point) call.
    pub fn has_unsaved_changes(&self) -> bool {
        let s = self.shared.borrow();
        s.save_point != s.cursor
    }

    /// `true` if a command is currently being built (between
    /// `begin_command` and `end_command`/`cancel_command`).
    pub fn is_command_started(&self) -> bool {
        self.shared.borrow().current.is_some()
    }

    /// `true` if the command in progress is currently suspended.
    pub fn is_command_suspended(&self) -> bool {
        self.shared.borrow().suspend_depth > 0
    }

    /// `true` only during the dynamic extent of a call to [`undo`](Self::undo).
    pub fn is_undoing(&self) -> bool {
        self.shared.borrow().is_undoing
    }

    /// `true` only during the dynamic extent of a call to [`redo`](Self::redo).
    pub fn is_redoing(&self) -> bool {
        self.shared.borrow().is_redoing
    }

    /// The identifier of the command currently being built, if any.
    pub fn current_command_id(&self) -> Option<Id> {
        self.shared
            .borrow()
            .current
            .as_ref()
            .and_then(|c| c.identifier().cloned())
    }

    /// The identifiers of every command in the history, oldest first.
    pub fn commands(&self) -> Vec<Option<Id>> {
        self.shared
            .borrow()
            .commands
            .iter()
            .map(|c| c.identifier().cloned())
            .collect()
    }

    /// The identifier of the command at `index`, if any.
    pub fn identifier_at(&self, index: usize) -> Option<Id> {
        self.shared
            .borrow()
            .commands
            .get(index)
            .and_then(|c| c.identifier().cloned())
    }

    /// Begins a new command with the given identifier.
    ///
    /// Fails with [`Error::BusyHistory`] if any history in this thread
    /// already has a command in progress.
    pub fn begin_command(&self, id: impl Into<Id>) -> Result<()> {
        self.begin_command_with(Some(id.into()))
    }

    /// Begins a new command with no identifier.
    pub fn begin_anonymous_command(&self) -> Result<()> {
        self.begin_command_with(None)
    }

    fn begin_command_with(&self, id: Option<Id>) -> Result<()> {
        ambient::try_install(self.as_ambient_target())?;
        self.shared.borrow_mut().current = Some(Command::new(id.clone()));
        if let Err(err) = self.emit(Event::CommandStarted { id }) {
            // Roll the half-started command back out so the history is left
            // exactly as it was before this failed call.
            self.shared.borrow_mut().current = None;
            ambient::clear();
            return Err(err);
        }
        Ok(())
    }

    /// Finishes the command in progress.
    ///
    /// If `mergeable` is `true` and the command on top of the cursor shares
    /// this command's identifier, the two are merged instead of being kept
    /// as separate entries. Fails with [`Error::NoCurrentCommand`] if no
    /// command is in progress.
    pub fn end_command(&self, mergeable: bool) -> Result<()> {
        let id = {
            let s = self.shared.borrow();
            let current = s.current.as_ref().ok_or(Error::NoCurrentCommand)?;
            current.identifier().cloned()
        };

        // `command-ended` fires while the command is still installed as
        // current, so a late-adding observer can still mutate it through
        // the ambient `add_action`/`last_action` free functions.
        self.emit(Event::CommandEnded { id: id.clone() })?;

        let mut current = {
            let mut s = self.shared.borrow_mut();
            s.current
                .take()
                .expect("current command remains present for the duration of end_command")
        };

        ambient::clear();
        self.shared.borrow_mut().suspend_depth = 0;

        if current.is_empty() {
            self.emit(Event::CommandExecuted { id })?;
            return Ok(());
        }

        let discarded_id = {
            let mut s = self.shared.borrow_mut();
            let can_merge = mergeable
                && s.cursor >= 0
                && s.commands[s.cursor as usize].identifier() == current.identifier();

            if can_merge {
                let top = s.cursor as usize;
                s.commands[top].merge(current);
                None
            } else {
                let keep = (s.cursor + 1) as usize;
                s.commands.truncate(keep);
                s.commands.push_back(current);
                s.cursor = s.commands.len() as isize - 1;

                let mut discarded_id = None;
                if s.size_limit > 0 && s.commands.len() > s.size_limit {
                    let evicted = s.commands.pop_front().expect("just checked len > limit > 0");
                    discarded_id = Some(evicted.identifier().cloned());
                    s.cursor -= 1;
                    if s.save_point == 0 {
                        s.save_point = SAVE_POINT_POISON;
                    } else if s.save_point > 0 {
                        s.save_point -= 1;
                    }
                }
                discarded_id
            }
        };

        if let Some(discarded_id) = discarded_id {
            self.emit(Event::CommandDiscarded { id: discarded_id })?;
        }
        self.emit(Event::CommandExecuted { id })?;
        Ok(())
    }

    /// Cancels the command in progress, rolling back everything it has done
    /// so far. Fails with [`Error::NoCurrentCommand`] if no command is in
    /// progress.
    pub fn cancel_command(&self) -> Result<()> {
        let id = {
            let s = self.shared.borrow();
            let current = s.current.as_ref().ok_or(Error::NoCurrentCommand)?;
            current.identifier().cloned()
        };

        self.emit(Event::CommandCancelled { id })?;

        let mut current = {
            let mut s = self.shared.borrow_mut();
            s.current
                .take()
                .expect("current command remains present for the duration of cancel_command")
        };
        let result = current.rollback();

        ambient::clear();
        self.shared.borrow_mut().suspend_depth = 0;

        result
    }

    /// Marks the command in progress as suspended: further actions added
    /// through the ambient `add_action` apply irrevocably and are not
    /// recorded. A no-op if no command is in progress.
    pub fn suspend_command(&self) {
        let mut s = self.shared.borrow_mut();
        if s.current.is_some() {
            s.suspend_depth = s.suspend_depth.saturating_add(1);
        }
    }

    /// Reverses one level of [`suspend_command`](Self::suspend_command). A
    /// no-op if no command is in progress; saturates at zero.
    pub fn resume_command(&self) {
        let mut s = self.shared.borrow_mut();
        if s.current.is_some() {
            s.suspend_depth = s.suspend_depth.saturating_sub(1);
        }
    }

    /// Undoes the topmost applied command.
    ///
    /// Fails with [`Error::NothingToUndo`] if the cursor is already at `-1`.
    pub fn undo(&self) -> Result<()> {
        let cursor = self.shared.borrow().cursor;
        if cursor < 0 {
            return Err(Error::NothingToUndo);
        }
        self.shared.borrow_mut().is_undoing = true;
        let result = self.move_to(cursor - 1);
        self.shared.borrow_mut().is_undoing = false;
        result
    }

    /// Redoes the next command past the cursor.
    ///
    /// Fails with [`Error::NothingToRedo`] if the cursor is already at the
    /// newest command.
    pub fn redo(&self) -> Result<()> {
        let (cursor, len) = {
            let s = self.shared.borrow();
            (s.cursor, s.commands.len() as isize)
        };
        if cursor >= len - 1 {
            return Err(Error::NothingToRedo);
        }
        self.shared.borrow_mut().is_redoing = true;
        let result = self.move_to(cursor + 1);
        self.shared.borrow_mut().is_redoing = false;
        result
    }

    /// Moves the cursor to `target`, clamped to `[-1, count() - 1]`,
    /// replaying `execute`/`rollback` on every command crossed.
    ///
    /// Fails with [`Error::BusyHistory`] if a command is currently in
    /// progress on this history, or if another history in this thread is
    /// mid-traversal. If a crossed command fails, the traversal stops and
    /// the cursor reflects the last successfully crossed command.
    pub fn set_position(&self, target: isize) -> Result<()> {
        if self.shared.borrow().current.is_some() {
            return Err(Error::BusyHistory);
        }
        self.move_to(target)
    }

    fn move_to(&self, target: isize) -> Result<()> {
        ambient::try_install(self.as_ambient_target())?;
        let result = self.move_to_inner(target);
        ambient::clear();
        result
    }

    fn move_to_inner(&self, target: isize) -> Result<()> {
        let (cursor, len) = {
            let s = self.shared.borrow();
            (s.cursor, s.commands.len() as isize)
        };
        let clamped = target.clamp(-1, len - 1);

        if clamped > cursor {
            for i in (cursor + 1)..=clamped {
                let idx = i as usize;
                let id = {
                    let s = self.shared.borrow();
                    s.commands[idx].identifier().cloned()
                };
                // Move the command out from behind `shared` before running
                // it: `execute` fires observer notifications synchronously,
                // and those observers may legitimately read this history
                // (e.g. `has_unsaved_changes`) or add an action through the
                // ambient binding, both of which need `shared` free.
                let mut cmd = {
                    let mut s = self.shared.borrow_mut();
                    std::mem::replace(&mut s.commands[idx], Command::new(id.clone()))
                };
                let result = cmd.execute();
                {
                    let mut s = self.shared.borrow_mut();
                    s.commands[idx] = cmd;
                    if result.is_ok() {
                        s.cursor = i;
                    }
                }
                result?;
                self.emit(Event::CommandExecuted { id })?;
            }
        } else if clamped < cursor {
            for i in (clamped + 1..=cursor).rev() {
                let idx = i as usize;
                let id = {
                    let s = self.shared.borrow();
                    s.commands[idx].identifier().cloned()
                };
                let mut cmd = {
                    let mut s = self.shared.borrow_mut();
                    std::mem::replace(&mut s.commands[idx], Command::new(id.clone()))
                };
                let result = cmd.rollback();
                {
                    let mut s = self.shared.borrow_mut();
                    s.commands[idx] = cmd;
                    if result.is_ok() {
                        s.cursor = i - 1;
                    }
                }
                result?;
                self.emit(Event::CommandRolledBack { id })?;
            }
        }
        Ok(())
    }

    /// Sets the capacity limit. `0` means unbounded. If the new limit is
    /// smaller than the current command count, the oldest commands are
    /// dropped (without being undone) until the count fits.
    pub fn set_size(&self, n: usize) {
        let mut s = self.shared.borrow_mut();
        s.size_limit = n;
        if n > 0 && s.commands.len() > n {
            let delta = s.commands.len() - n;
            for _ in 0..delta {
                s.commands.pop_front();
            }
            if s.save_point >= 0 {
                if (s.save_point as usize) < delta {
                    s.save_point = SAVE_POINT_POISON;
                } else {
                    s.save_point -= delta as isize;
                }
            }
            s.cursor = (s.cursor - delta as isize).max(-1);
            let max_cursor = s.commands.len() as isize - 1;
            if s.cursor > max_cursor {
                s.cursor = max_cursor;
            }
        }
    }

    /// Empties the history without undoing anything, resetting the cursor
    /// and save-point to `-1`.
    pub fn clear(&self) {
        let mut s = self.shared.borrow_mut();
        s.commands.clear();
        s.cursor = -1;
        s.save_point = -1;
    }

    /// Records the current cursor position as the save-point.
    pub fn set_save_point(&self) {
        let mut s = self.shared.borrow_mut();
        s.save_point = s.cursor;
    }
}

impl<Id: Clone + PartialEq + 'static> AmbientTarget for History<Id> {
    fn dispatch_add_action(&self, action: Box<dyn crate::action::Action>) -> Result<()> {
        let recording = {
            let s = self.shared.borrow();
            s.current.is_some() && s.suspend_depth == 0
        };
        if recording {
            // Take the command out from behind `shared` before calling
            // `apply`: it notifies observers synchronously, and those
            // observers may read this history or add another action through
            // the ambient binding, both of which need `shared` free (mirrors
            // how `end_command` releases its borrow before `emit`).
            let mut cmd = self
                .shared
                .borrow_mut()
                .current
                .take()
                .expect("checked current.is_some() above");
            cmd.add_action(action);
            let result = cmd
                .last_action_mut()
                .expect("an action was just pushed")
                .apply();
            self.shared.borrow_mut().current = Some(cmd);
            result
        } else {
            let mut action = action;
            action.apply()
        }
    }

    fn dispatch_last_action(
        &self,
        f: &mut dyn FnMut(Option<&mut dyn crate::action::Action>),
    ) {
        let suspended = self.shared.borrow().suspend_depth > 0;
        if suspended {
            f(None);
            return;
        }
        // As in `dispatch_add_action`, the command is taken out from behind
        // `shared` before `f` runs: `f` typically calls `apply`/`revert` on
        // the last action (see `Cell::set`'s coalescing path), which
        // notifies observers synchronously.
        let mut cmd = self.shared.borrow_mut().current.take();
        match cmd.as_mut().and_then(|c| c.last_action_mut()) {
            Some(action) => f(Some(action.as_mut())),
            None => f(None),
        }
        self.shared.borrow_mut().current = cmd;
    }
}

impl Default for History<String> {
    fn default() -> Self {
        History::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{impl_any_upcast, Action};
    use std::cell::RefCell as StdRefCell;

    struct Push {
        log: Rc<StdRefCell<Vec<i32>>>,
        value: i32,
    }

    impl Action for Push {
        fn apply(&mut self) -> Result<()> {
            self.log.borrow_mut().push(self.value);
            Ok(())
        }
        fn revert(&mut self) -> Result<()> {
            self.log.borrow_mut().pop();
            Ok(())
        }
        impl_any_upcast!();
    }

    #[test]
    fn basic_begin_end_undo_redo() {
        let history: History<&str> = History::new();
        let log = Rc::new(StdRefCell::new(Vec::new()));

        history.begin_command("a").unwrap();
        ambient::add_action(Push {
            log: log.clone(),
            value: 1,
        })
        .unwrap();
        history.end_command(false).unwrap();

        assert_eq!(*log.borrow(), vec![1]);
        assert_eq!(history.count(), 1);
        assert_eq!(history.position(), 0);

        history.undo().unwrap();
        assert!(log.borrow().is_empty());
        assert_eq!(history.position(), -1);

        history.redo().unwrap();
        assert_eq!(*log.borrow(), vec![1]);
        assert_eq!(history.position(), 0);
    }

    #[test]
    fn empty_command_is_elided() {
        let history: History<&str> = History::new();
        history.begin_command("a").unwrap();
        history.end_command(false).unwrap();
        assert_eq!(history.count(), 0);
        assert_eq!(history.position(), -1);
    }

    #[test]
    fn cancel_rolls_back_and_is_neutral() {
        let history: History<&str> = History::new();
        let log = Rc::new(StdRefCell::new(Vec::new()));

        history.begin_command("a").unwrap();
        ambient::add_action(Push {
            log: log.clone(),
            value: 1,
        })
        .unwrap();
        ambient::add_action(Push {
            log: log.clone(),
            value: 2,
        })
        .unwrap();
        history.cancel_command().unwrap();

        assert!(log.borrow().is_empty());
        assert_eq!(history.count(), 0);
        assert_eq!(history.position(), -1);
    }

    #[test]
    fn merge_concatenates_into_one_command() {
        let history: History<&str> = History::new();
        let log = Rc::new(StdRefCell::new(Vec::new()));

        history.begin_command("edit").unwrap();
        ambient::add_action(Push {
            log: log.clone(),
            value: 1,
        })
        .unwrap();
        history.end_command(true).unwrap();

        history.begin_command("edit").unwrap();
        ambient::add_action(Push {
            log: log.clone(),
            value: 2,
        })
        .unwrap();
        history.end_command(true).unwrap();

        assert_eq!(history.count(), 1);
        history.undo().unwrap();
        assert!(log.borrow().is_empty());
        history.redo().unwrap();
        assert_eq!(*log.borrow(), vec![1, 2]);
    }

    /// An action modeling a single scalar assignment, the shape S7 in
    /// `spec.md` §8 actually exercises (unlike `Push`, which models a
    /// growing log and so can't distinguish "reverted" from "never
    /// recorded" once two writes touch the same slot).
    struct Assign {
        cell: Rc<StdRefCell<i32>>,
        old: i32,
        new: i32,
    }

    impl Action for Assign {
        fn apply(&mut self) -> Result<()> {
            *self.cell.borrow_mut() = self.new;
            Ok(())
        }
        fn revert(&mut self) -> Result<()> {
            *self.cell.borrow_mut() = self.old;
            Ok(())
        }
        impl_any_upcast!();
    }

    #[test]
    fn suspend_is_fire_and_forget() {
        let history: History<&str> = History::new();
        let cell = Rc::new(StdRefCell::new(0));

        history.begin_command("a").unwrap();
        ambient::add_action(Assign {
            cell: cell.clone(),
            old: 0,
            new: 1,
        })
        .unwrap();
        history.suspend_command();
        ambient::add_action(Assign {
            cell: cell.clone(),
            old: 1,
            new: 2,
        })
        .unwrap();
        history.resume_command();
        ambient::add_action(Assign {
            cell: cell.clone(),
            old: 2,
            new: 3,
        })
        .unwrap();
        history.end_command(false).unwrap();

        assert_eq!(*cell.borrow(), 3);
        history.undo().unwrap();
        // The suspended write (to 2) survives undo: only the recorded
        // 0->1 and 2->3 edits are reverted, in reverse order, landing back
        // on the value the suspended write produced.
        assert_eq!(*cell.borrow(), 2);
    }

    #[test]
    fn eviction_adjusts_cursor_and_save_point() {
        let history: History<&str> = History::new();
        history.set_size(2);
        let log = Rc::new(StdRefCell::new(Vec::new()));

        for v in 1..=3 {
            history.begin_command("c").unwrap();
            ambient::add_action(Push {
                log: log.clone(),
                value: v,
            })
            .unwrap();
            history.end_command(false).unwrap();
            if v == 2 {
                history.set_save_point();
            }
        }

        assert_eq!(history.count(), 2);
        assert_eq!(history.position(), 1);
        assert!(history.has_unsaved_changes());

        history.undo().unwrap();
        assert_eq!(history.position(), 0);
        assert!(!history.has_unsaved_changes());
    }

    #[test]
    fn cursor_consistency_after_many_operations() {
        let history: History<&str> = History::new();
        let log = Rc::new(StdRefCell::new(Vec::new()));
        for v in 0..5 {
            history.begin_command("c").unwrap();
            ambient::add_action(Push {
                log: log.clone(),
                value: v,
            })
            .unwrap();
            history.end_command(false).unwrap();
        }
        for _ in 0..3 {
            history.undo().unwrap();
        }
        assert!(history.position() >= -1 && history.position() < history.count() as isize);
        assert_eq!(history.can_undo(), history.position() >= 0);
        assert_eq!(
            history.can_redo(),
            history.position() < history.count() as isize - 1
        );
    }

    #[test]
    fn begin_command_twice_is_busy() {
        let history: History<&str> = History::new();
        history.begin_command("a").unwrap();
        assert!(matches!(
            history.begin_command("b"),
            Err(Error::BusyHistory)
        ));
        history.cancel_command().unwrap();
    }

    #[test]
    fn end_without_begin_fails() {
        let history: History<&str> = History::new();
        assert!(matches!(
            history.end_command(false),
            Err(Error::NoCurrentCommand)
        ));
    }
}
