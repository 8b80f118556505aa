use crate::action::Action;
use crate::error::Result;

/// An ordered group of [`Action`]s sharing one identifier, treated as a
/// single undo/redo unit.
///
/// A `Command` is populated while it is the current command of a
/// [`History`](crate::History), then finalized by `end_command` (added to
/// the history, or merged into the command on top of the cursor) or
/// discarded by `cancel_command`.
pub struct Command<Id> {
    identifier: Option<Id>,
    actions: Vec<Box<dyn Action>>,
}

impl<Id> Command<Id> {
    /// Creates a new, empty command with the given identifier.
    pub fn new(identifier: Option<Id>) -> Self {
        Command {
            identifier,
            actions: Vec::new(),
        }
    }

    /// The command's identifier, if any.
    pub fn identifier(&self) -> Option<&Id> {
        self.identifier.as_ref()
    }

    /// The number of actions recorded in this command.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// `true` if no action has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Appends an already-applied action to this command.
    pub fn add_action(&mut self, action: Box<dyn Action>) {
        self.actions.push(action);
    }

    /// Returns the most recently recorded action, if any.
    pub fn last_action_mut(&mut self) -> Option<&mut Box<dyn Action>> {
        self.actions.last_mut()
    }

    /// Replays every action forward, in insertion order.
    ///
    /// If `apply` fails at index `k`, every action before it (`k-1..0`, in
    /// reverse order) is reverted before the original failure is propagated,
    /// so that a partially-applied command never lingers in the history.
    pub fn execute(&mut self) -> Result<()> {
        for k in 0..self.actions.len() {
            if let Err(err) = self.actions[k].apply() {
                for j in (0..k).rev() {
                    // Best-effort unwind: a failure here would leave the
                    // command in a state no rollback can fully describe, but
                    // there is nothing safer to do than surface the
                    // original error and stop.
                    let _ = self.actions[j].revert();
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// Replays every action in reverse, undoing the command as a whole.
    ///
    /// If `revert` fails at index `k` (counting from the end), every action
    /// after it is re-applied forward before the original failure is
    /// propagated.
    pub fn rollback(&mut self) -> Result<()> {
        let len = self.actions.len();
        for i in (0..len).rev() {
            if let Err(err) = self.actions[i].revert() {
                for j in (i + 1)..len {
                    let _ = self.actions[j].apply();
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// Appends another command's actions to this one. Used when finalizing a
    /// mergeable command with a matching identifier on top of the cursor.
    pub fn merge(&mut self, other: Command<Id>) {
        self.actions.extend(other.actions);
    }
}
