//! Swap processing
//!
//! Inbound transactions are verified and registered by the [`SwapAcceptor`].
//! The [`Scheduler`] polls pending swaps per direction and hands each one to
//! the [`SwapWorker`], which builds, signs and broadcasts the matching
//! outbound transaction exactly once.

mod accept;
mod history;
mod scheduler;
mod swap;

pub use accept::SwapAcceptor;
pub use history::{HistoryEntry, SwapHistory, DEFAULT_HISTORY_CAPACITY};
pub use scheduler::Scheduler;
pub use swap::SwapWorker;
