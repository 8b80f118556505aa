//! The thread-local "ambient current history" binding.
//!
//! Decoupled code (the [`Cell`](crate::Cell)/[`Sequence`](crate::Sequence)
//! adapters, or a host's own actions) calls [`add_action`]/[`last_action_mut`]
//! without holding a reference to any particular [`History`](crate::History).
//! Those free functions consult this thread-local slot, which a `History`
//! installs itself into for the duration of a command-in-progress or a
//! cursor move.

use std::cell::RefCell;
use std::rc::Rc;

use crate::action::Action;
use crate::error::{Error, Result};

/// A type-erased handle to whichever `History<Id>` currently occupies the
/// ambient slot. Kept crate-private: hosts never see this trait, only the
/// free functions below.
pub(crate) trait AmbientTarget {
    fn dispatch_add_action(&self, action: Box<dyn Action>) -> Result<()>;
    fn dispatch_last_action(&self, f: &mut dyn FnMut(Option<&mut dyn Action>));
}

thread_local! {
    static CURRENT: RefCell<Option<Rc<dyn AmbientTarget>>> = const { RefCell::new(None) };
}

/// Installs `target` as the ambient history for this thread.
///
/// Fails with [`Error::BusyHistory`] if some history (this one or another)
/// is already installed.
pub(crate) fn try_install(target: Rc<dyn AmbientTarget>) -> Result<()> {
    CURRENT.with(|cur| {
        let mut cur = cur.borrow_mut();
        if cur.is_some() {
            return Err(Error::BusyHistory);
        }
        *cur = Some(target);
        Ok(())
    })
}

/// `true` if some history currently occupies the ambient slot.
pub(crate) fn is_busy() -> bool {
    CURRENT.with(|cur| cur.borrow().is_some())
}

/// Clears the ambient slot unconditionally. Called on every exit path of a
/// command-in-progress or cursor move, including failure.
pub(crate) fn clear() {
    CURRENT.with(|cur| {
        *cur.borrow_mut() = None;
    });
}

/// Submits `action` to whatever command is currently in progress on the
/// ambient history, applying it immediately.
///
/// If no history is ambient, the action is simply applied and not recorded
/// (fire-and-forget). The same happens if the ambient history has no current
/// command, or if it is suspended — see
/// [`History::add_action`](crate::History::add_action) for the full contract.
pub fn add_action(action: impl Action + 'static) -> Result<()> {
    CURRENT.with(|cur| {
        let target = cur.borrow().clone();
        match target {
            Some(target) => target.dispatch_add_action(Box::new(action)),
            None => {
                let mut action = action;
                action.apply()
            }
        }
    })
}

/// Runs `f` with the ambient current command's last action, or `None` if
/// there is no ambient history, no current command, or it is suspended.
pub fn last_action_mut<R>(f: impl FnOnce(Option<&mut dyn Action>) -> R) -> R {
    let mut f = Some(f);
    let mut out = None;
    let mut call = |action: Option<&mut dyn Action>| {
        if let Some(f) = f.take() {
            out = Some(f(action));
        }
    };

    CURRENT.with(|cur| {
        let target = cur.borrow().clone();
        match target {
            Some(target) => target.dispatch_last_action(&mut call),
            None => call(None),
        }
    });

    out.expect("the visitor closure is always invoked exactly once")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;
    impl AmbientTarget for Noop {
        fn dispatch_add_action(&self, mut action: Box<dyn Action>) -> Result<()> {
            action.apply()
        }
        fn dispatch_last_action(&self, f: &mut dyn FnMut(Option<&mut dyn Action>)) {
            f(None)
        }
    }

    #[test]
    fn install_then_install_again_is_busy() {
        clear();
        let target: Rc<dyn AmbientTarget> = Rc::new(Noop);
        assert!(try_install(target.clone()).is_ok());
        assert!(matches!(try_install(target), Err(Error::BusyHistory)));
        clear();
    }

    #[test]
    fn clear_frees_the_slot() {
        clear();
        let target: Rc<dyn AmbientTarget> = Rc::new(Noop);
        try_install(target).unwrap();
        assert!(is_busy());
        clear();
        assert!(!is_busy());
    }
}
