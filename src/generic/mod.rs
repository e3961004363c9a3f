/// Data vector aggregation.
pub mod aggregate;
/// Ledger records and queries.
pub mod ledger;
/// Incremental Merkle trees.
pub mod merkle;
/// Basic protocol objects.
pub mod object;
/// The proving backend seam.
pub mod prover;
/// The synchronizer seam.
pub mod sync;
/// Replaying state, epoch and history trees.
pub mod trees;
/// The user state engine.
pub mod user;
/// Circuit inputs.
pub mod witness;
