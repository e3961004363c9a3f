//! The hashes every replayed structure is built from.
//!
//! These must agree exactly with what the circuits compute. A mismatch does not fail here; it
//! surfaces later as a proof that does not verify.

use crate::crypto::hash::FieldHash;
use crate::error::Error;
use crate::generic::object::{EpochKey, Epoch, Nonce, Nul};
use ark_ff::PrimeField;

/// `H(secret, attester, epoch, nonce)`. No range check on the nonce.
pub fn epoch_key<F: PrimeField, H: FieldHash<F>>(
    secret: F,
    attester_id: F,
    epoch: Epoch,
    nonce: u64,
) -> EpochKey<F> {
    H::hash(&[secret, attester_id, F::from(epoch), F::from(nonce)])
}

/// [`epoch_key`] for a nonce that must lie in `[0, nonce_count)`.
pub fn checked_epoch_key<F: PrimeField, H: FieldHash<F>>(
    secret: F,
    attester_id: F,
    epoch: Epoch,
    nonce: u64,
    nonce_count: u8,
) -> Result<EpochKey<F>, Error> {
    check_nonce(nonce, nonce_count)?;
    Ok(epoch_key::<F, H>(secret, attester_id, epoch, nonce))
}

pub fn check_nonce(nonce: u64, nonce_count: u8) -> Result<Nonce, Error> {
    if nonce >= nonce_count as u64 {
        return Err(Error::InvalidNonce {
            nonce,
            max: nonce_count,
        });
    }
    Ok(nonce as Nonce)
}

/// Nullifiers that mark a transition out of `epoch`.
///
/// Either the nonce 0 key or the key at `nonce_count` (one past the usable range) may be recorded
/// as the nullifier, so both have to be checked.
pub fn nullifier_candidates<F: PrimeField, H: FieldHash<F>>(
    secret: F,
    attester_id: F,
    epoch: Epoch,
    nonce_count: u8,
) -> [Nul<F>; 2] {
    [
        epoch_key::<F, H>(secret, attester_id, epoch, 0),
        epoch_key::<F, H>(secret, attester_id, epoch, nonce_count as u64),
    ]
}

/// `H(secret, attester, epoch, data..)`.
pub fn state_tree_leaf<F: PrimeField, H: FieldHash<F>>(
    secret: F,
    attester_id: F,
    epoch: Epoch,
    data: &[F],
) -> F {
    let mut input = Vec::with_capacity(3 + data.len());
    input.extend([secret, attester_id, F::from(epoch)]);
    input.extend_from_slice(data);
    H::hash(&input)
}

/// `H(epoch_key, data..)`.
pub fn epoch_tree_leaf<F: PrimeField, H: FieldHash<F>>(epoch_key: F, data: &[F]) -> F {
    let mut input = Vec::with_capacity(1 + data.len());
    input.push(epoch_key);
    input.extend_from_slice(data);
    H::hash(&input)
}

/// `H(state_root, epoch_root)`.
pub fn history_tree_leaf<F: PrimeField, H: FieldHash<F>>(state_root: F, epoch_root: F) -> F {
    H::hash(&[state_root, epoch_root])
}
