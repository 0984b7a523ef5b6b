//! MetaTrader terminal side of the hub.
//!
//! Terminals push [`Signal`](sighub_core::Signal)s over their session; the
//! [`SignalDispatcher`] routes each one to the engine services or to the
//! in-process collaborators kept here.

pub mod dispatcher;
pub mod log;
pub mod registry;

pub use dispatcher::{Collaborators, DispatchError, SignalDispatcher};
pub use log::MemoryLog;
pub use registry::{LevelsBook, SignalQueue, TerminalRegistry, DEFAULT_QUEUE_LIMIT};
