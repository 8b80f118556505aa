use crate::error::Result;

/// A single-slot notification channel.
///
/// Modeled on `History::connect`/`disconnect` in the `redo` family of crates,
/// but fallible: a connected sink returns a [`Result`] so that observer
/// failure can participate in the crash-rollback contract (see `spec.md`
/// §4.1/§4.4/§4.5).
pub struct EventSink<E> {
    slot: Option<Box<dyn FnMut(E) -> Result<()>>>,
}

impl<E> EventSink<E> {
    /// Returns an empty sink.
    pub fn new() -> Self {
        EventSink { slot: None }
    }

    /// Connects a new observer, returning the previous one if any.
    pub fn connect(
        &mut self,
        sink: impl FnMut(E) -> Result<()> + 'static,
    ) -> Option<Box<dyn FnMut(E) -> Result<()>>> {
        self.slot.replace(Box::new(sink))
    }

    /// Removes and returns the connected observer, if any.
    pub fn disconnect(&mut self) -> Option<Box<dyn FnMut(E) -> Result<()>>> {
        self.slot.take()
    }

    /// Returns `true` if an observer is connected.
    pub fn is_connected(&self) -> bool {
        self.slot.is_some()
    }

    /// Emits an event to the connected observer, if any.
    ///
    /// The slot is removed before the observer runs and restored afterward,
    /// so a reentrant call made from inside the observer (which the engine
    /// otherwise forbids, see `spec.md` §5) observes an *empty* sink rather
    /// than panicking on a held `RefCell` borrow.
    pub fn emit(&mut self, event: E) -> Result<()> {
        let mut slot = self.slot.take();
        let result = match slot.as_mut() {
            Some(f) => f(event),
            None => Ok(()),
        };
        self.slot = slot;
        result
    }
}

impl<E> Default for EventSink<E> {
    fn default() -> Self {
        EventSink::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn emits_to_connected_observer() {
        let seen = Rc::new(Cell::new(0));
        let seen2 = seen.clone();
        let mut sink = EventSink::new();
        sink.connect(move |n: i32| {
            seen2.set(seen2.get() + n);
            Ok(())
        });
        sink.emit(3).unwrap();
        sink.emit(4).unwrap();
        assert_eq!(seen.get(), 7);
    }

    #[test]
    fn disconnect_removes_observer() {
        let mut sink: EventSink<i32> = EventSink::new();
        sink.connect(|_| Ok(()));
        assert!(sink.is_connected());
        sink.disconnect();
        assert!(!sink.is_connected());
    }

    #[test]
    fn emit_without_observer_is_ok() {
        let mut sink: EventSink<i32> = EventSink::new();
        assert!(sink.emit(1).is_ok());
    }
}
