use std::any::Any;

use crate::error::Result;

/// An atomic, reversible mutation.
///
/// Concrete actions capture whatever inverse state they need at construction
/// (or at first [`apply`](Action::apply)) so that [`revert`](Action::revert)
/// can restore it without consulting anything else. The engine never calls
/// `apply` twice in a row on the same action without an intervening `revert`,
/// and vice versa.
///
/// Both methods may fail. An implementation that notifies observers as part
/// of `apply`/`revert` must restore its pre-mutation state before propagating
/// an observer failure, so that the state the engine believes is present
/// never diverges from the state observers actually saw.
pub trait Action: Any {
    /// Performs the forward mutation.
    fn apply(&mut self) -> Result<()>;

    /// Performs the inverse mutation.
    fn revert(&mut self) -> Result<()>;

    /// Upcasts to `&dyn Any` so that adapters (e.g. [`Cell`](crate::Cell))
    /// can recognize and coalesce their own previously-recorded actions.
    fn as_any(&self) -> &dyn Any;

    /// Upcasts to `&mut dyn Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl dyn Action {
    /// Attempts to downcast the action to a concrete type.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }

    /// Attempts to downcast the action to a concrete type, mutably.
    pub fn downcast_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut()
    }
}

/// Implements the `as_any`/`as_any_mut` boilerplate for a concrete [`Action`].
macro_rules! impl_any_upcast {
    () => {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    };
}

pub(crate) use impl_any_upcast;

/// A boxed, type-erased action wrapping a plain closure pair, for callers who
/// would rather not define a named type for a one-off reversible mutation.
pub struct FnAction<A, R> {
    apply: A,
    revert: R,
}

impl<A, R> FnAction<A, R>
where
    A: FnMut() -> Result<()> + 'static,
    R: FnMut() -> Result<()> + 'static,
{
    /// Builds an action from a forward closure and an inverse closure.
    pub fn new(apply: A, revert: R) -> Self {
        FnAction { apply, revert }
    }
}

impl<A, R> Action for FnAction<A, R>
where
    A: FnMut() -> Result<()> + 'static,
    R: FnMut() -> Result<()> + 'static,
{
    fn apply(&mut self) -> Result<()> {
        (self.apply)()
    }

    fn revert(&mut self) -> Result<()> {
        (self.revert)()
    }

    impl_any_upcast!();
}
