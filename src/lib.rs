//! Client side user state for the Unirep reputation protocol.
//!
//! A user holds a single [`Identity`]. From it and a replayed ledger of attester events
//! (signups, attestations, user state transitions, ended epochs), the [`UserState`] engine
//! derives everything the user needs to act pseudonymously: epoch keys, aggregated reputation
//! data, the state, epoch and history trees of each attester, and the witnesses of the six
//! protocol circuits.
//!
//! The crate is split the usual way:
//! - [`crypto`]: hash traits, identities and the protocol hashes.
//! - [`generic`]: the traits at the seams ([`generic::ledger::Ledger`],
//!   [`generic::sync::Synchronizer`], [`generic::prover::Prover`]) and the engine built on them.
//! - [`impls`]: Poseidon, an in-memory ledger, a local synchronizer and a native circuit emulator.
//! - [`proofs`]: typed views over the public signals of each circuit.
#![allow(async_fn_in_trait)]

pub mod config;
pub mod crypto;
pub mod error;
pub mod generic;
pub mod impls;
pub mod proofs;
mod util;

/// The scalar field of BN254, which the circuits work over.
pub type Fr = ark_bn254::Fr;

/// The hash every protocol value is computed with.
#[cfg(not(feature = "circposeidon"))]
pub type ProtocolHash = impls::hash::Poseidon<2>;

/// The hash every protocol value is computed with, matching the deployed circuits.
#[cfg(feature = "circposeidon")]
pub type ProtocolHash = impls::hash::CircPoseidon;

pub use crypto::identity::Identity;
pub use error::{Error, Result, SyncGap};
pub use generic::user::UserState;
