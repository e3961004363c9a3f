//! Packed control words.
//!
//! Circuits pack several small public values into one field element to save public inputs. The
//! offsets and widths here are fixed by the circuits.

use crate::generic::object::{AttesterId, Epoch, Nonce};
use crate::util::to_biguint;
use crate::Fr;
use num_bigint::BigUint;

fn mask(width: u64) -> BigUint {
    (BigUint::from(1u8) << width) - 1u8
}

fn put(control: &mut BigUint, value: impl Into<BigUint>, offset: u64, width: u64) {
    *control |= (value.into() & mask(width)) << offset;
}

fn take(control: &BigUint, offset: u64, width: u64) -> BigUint {
    (control >> offset) & mask(width)
}

fn take_u64(control: &BigUint, offset: u64, width: u64) -> u64 {
    take(control, offset, width)
        .iter_u64_digits()
        .next()
        .unwrap_or(0)
}

const EPOCH_BITS: u64 = 48;
const CHAIN_ID_BITS: u64 = 36;

/// Control word shared by the epoch key, epoch key lite, reputation and data proofs.
///
/// | bits | value |
/// |---|---|
/// | `[0, 8)` | nonce, zeroed unless revealed |
/// | `[8, 56)` | epoch |
/// | `[56, 216)` | attester id |
/// | `216` | reveal nonce |
/// | `[217, 253)` | chain id |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochKeyControl {
    pub nonce: Nonce,
    pub epoch: Epoch,
    pub attester_id: AttesterId,
    pub reveal_nonce: bool,
    pub chain_id: u64,
}

impl EpochKeyControl {
    pub fn build(&self) -> Fr {
        let mut control = BigUint::default();
        if self.reveal_nonce {
            put(&mut control, self.nonce, 0, 8);
        }
        put(&mut control, self.epoch, 8, EPOCH_BITS);
        put(&mut control, self.attester_id.to_biguint(), 56, AttesterId::BITS);
        put(&mut control, self.reveal_nonce as u8, 216, 1);
        put(&mut control, self.chain_id, 217, CHAIN_ID_BITS);
        Fr::from(control)
    }

    pub fn decode(control: Fr) -> Self {
        let control = to_biguint(&control);
        Self {
            nonce: take_u64(&control, 0, 8) as Nonce,
            epoch: take_u64(&control, 8, EPOCH_BITS),
            attester_id: AttesterId::from(take(&control, 56, AttesterId::BITS)),
            reveal_nonce: take_u64(&control, 216, 1) == 1,
            chain_id: take_u64(&control, 217, CHAIN_ID_BITS),
        }
    }
}

/// Second control word of the reputation proof.
///
/// `min_rep` in `[0, 64)`, `max_rep` in `[64, 128)`, then one bit each for `prove_min_rep`,
/// `prove_max_rep`, `prove_zero_rep` and `prove_graffiti` from bit 128.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReputationControl {
    pub min_rep: u64,
    pub max_rep: u64,
    pub prove_min_rep: bool,
    pub prove_max_rep: bool,
    pub prove_zero_rep: bool,
    pub prove_graffiti: bool,
}

impl ReputationControl {
    pub fn build(&self) -> Fr {
        let mut control = BigUint::default();
        put(&mut control, self.min_rep, 0, 64);
        put(&mut control, self.max_rep, 64, 64);
        put(&mut control, self.prove_min_rep as u8, 128, 1);
        put(&mut control, self.prove_max_rep as u8, 129, 1);
        put(&mut control, self.prove_zero_rep as u8, 130, 1);
        put(&mut control, self.prove_graffiti as u8, 131, 1);
        Fr::from(control)
    }

    pub fn decode(control: Fr) -> Self {
        let control = to_biguint(&control);
        Self {
            min_rep: take_u64(&control, 0, 64),
            max_rep: take_u64(&control, 64, 64),
            prove_min_rep: take_u64(&control, 128, 1) == 1,
            prove_max_rep: take_u64(&control, 129, 1) == 1,
            prove_zero_rep: take_u64(&control, 130, 1) == 1,
            prove_graffiti: take_u64(&control, 131, 1) == 1,
        }
    }
}

/// Control word of the signup and user state transition proofs: attester id in `[0, 160)`,
/// epoch in `[160, 208)`, chain id in `[208, 244)`.
///
/// For a transition the epoch is the epoch transitioned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttesterControl {
    pub attester_id: AttesterId,
    pub epoch: Epoch,
    pub chain_id: u64,
}

impl AttesterControl {
    pub fn build(&self) -> Fr {
        let mut control = BigUint::default();
        put(&mut control, self.attester_id.to_biguint(), 0, AttesterId::BITS);
        put(&mut control, self.epoch, 160, EPOCH_BITS);
        put(&mut control, self.chain_id, 208, CHAIN_ID_BITS);
        Fr::from(control)
    }

    pub fn decode(control: Fr) -> Self {
        let control = to_biguint(&control);
        Self {
            attester_id: AttesterId::from(take(&control, 0, AttesterId::BITS)),
            epoch: take_u64(&control, 160, EPOCH_BITS),
            chain_id: take_u64(&control, 208, CHAIN_ID_BITS),
        }
    }
}
