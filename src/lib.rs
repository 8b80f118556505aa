//! **A general-purpose undo/redo engine for interactive applications.**
//!
//! [`History`] records reversible mutations grouped into atomic, named
//! commands, and lets a caller traverse them linearly with [`History::undo`]
//! and [`History::redo`]. Decoupled code contributes actions to whatever
//! command is in progress through a thread-local ambient binding — see the
//! [`history`] module's free functions — rather than threading a `&mut
//! History` through every call site.
//!
//! Two adapters let ordinary state participate without hand-written
//! [`Action`] implementations: [`Cell<T>`] for a single coalescing value, and
//! [`Sequence<T>`] for an ordered list whose structural mutations become
//! reversible range operations.
//!
//! # Example
//!
//! ```
//! use undoable::{Cell, History};
//!
//! let history: History<&str> = History::new();
//! let cell = Cell::new(0);
//!
//! history.begin_command("set to one").unwrap();
//! cell.set(1).unwrap();
//! history.end_command(false).unwrap();
//! assert_eq!(cell.get(), 1);
//!
//! history.undo().unwrap();
//! assert_eq!(cell.get(), 0);
//! history.redo().unwrap();
//! assert_eq!(cell.get(), 1);
//! ```

#![doc(html_root_url = "https://docs.rs/undoable")]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

mod action;
mod ambient;

/// The history engine, plus the ambient `add_action`/`last_action` free
/// functions bound to whatever history is current on this thread.
pub mod history;

mod cell;
mod command;
mod error;
mod event;
mod sequence;

pub use action::{Action, FnAction};
pub use cell::{Cell, CellEvent, CellFlags};
pub use error::{BoxedObserverError, Error, Result};
pub use history::{Event, History};
pub use sequence::{Sequence, SequenceEvent};
