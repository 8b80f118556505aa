use std::fmt;

/// The error type returned by every fallible operation in this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A command is already in progress on this history (or on some history
    /// in this thread), and the attempted operation requires exclusive
    /// access to the ambient slot.
    #[error("a command is already in progress on this history")]
    BusyHistory,
    /// `end_command`/`cancel_command` was called with no command in
    /// progress.
    #[error("no command is currently in progress")]
    NoCurrentCommand,
    /// `undo` was called with the cursor already at the oldest position.
    #[error("there is nothing to undo")]
    NothingToUndo,
    /// `redo` was called with the cursor already at the newest position.
    #[error("there is nothing to redo")]
    NothingToRedo,
    /// A structural mutation was attempted on a read-only `Sequence`.
    #[error("the sequence is read-only")]
    ReadOnly,
    /// An index argument fell outside a `Sequence`'s valid range.
    #[error("index {index} is out of range for a sequence of length {len}")]
    OutOfRange {
        /// The offending index.
        index: usize,
        /// The length of the sequence at the time of the call.
        len: usize,
    },
    /// An observer callback returned an error. The mutation that triggered
    /// the callback has already been rolled back by the time this is
    /// returned to the caller.
    #[error("an observer failed: {0}")]
    ObserverFailure(#[source] BoxedObserverError),
}

/// A type-erased observer error, boxed so that observers can report whatever
/// error type is convenient for them.
pub type BoxedObserverError = Box<dyn std::error::Error + 'static>;

impl Error {
    /// Wraps an arbitrary observer error as an [`Error::ObserverFailure`].
    pub fn observer_failure<E>(err: E) -> Error
    where
        E: std::error::Error + 'static,
    {
        Error::ObserverFailure(Box::new(err))
    }

    /// Wraps a plain message as an [`Error::ObserverFailure`].
    pub fn observer_message(msg: impl Into<String>) -> Error {
        Error::ObserverFailure(Box::new(Message(msg.into())))
    }
}

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Message {}

/// A specialized `Result` alias for this crate's operations.
pub type Result<T> = std::result::Result<T, Error>;
