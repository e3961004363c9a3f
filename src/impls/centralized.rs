//! An in-process chain: a memory ledger and a synchronizer that applies events to it directly.

/// In-memory ledger.
pub mod ledger;
/// Local synchronizer.
pub mod sync;

pub use ledger::MemoryLedger;
pub use sync::{LocalSynchronizer, SyncStatus};
