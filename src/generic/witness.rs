//! Circuit inputs.
//!
//! Field names are the input signal names of the circuits and must not be renamed. Field elements
//! serialize as decimal strings, nested the way the circuit declares its input arrays.

use crate::generic::object::{AttesterId, Epoch, Nonce};
use crate::generic::prover::{Circuit, ProverError};
use crate::util::decimal;
use crate::Fr;
use serde::Serialize;

/// A serializable set of inputs for one circuit.
pub trait Witness: Serialize {
    const CIRCUIT: Circuit;

    fn to_json(&self) -> Result<serde_json::Value, ProverError> {
        Ok(serde_json::to_value(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignupWitness {
    pub epoch: Epoch,
    #[serde(serialize_with = "decimal")]
    pub identity_nullifier: Fr,
    #[serde(serialize_with = "decimal")]
    pub identity_trapdoor: Fr,
    pub attester_id: AttesterId,
}

impl Witness for SignupWitness {
    const CIRCUIT: Circuit = Circuit::Signup;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EpochKeyWitness {
    #[serde(serialize_with = "decimal")]
    pub identity_secret: Fr,
    #[serde(serialize_with = "decimal")]
    pub data: Vec<Fr>,
    #[serde(serialize_with = "decimal")]
    pub sig_data: Fr,
    #[serde(serialize_with = "decimal")]
    pub state_tree_elements: Vec<Vec<Fr>>,
    pub state_tree_indexes: Vec<usize>,
    pub epoch: Epoch,
    pub nonce: Nonce,
    pub attester_id: AttesterId,
    pub reveal_nonce: u8,
}

impl Witness for EpochKeyWitness {
    const CIRCUIT: Circuit = Circuit::EpochKey;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EpochKeyLiteWitness {
    #[serde(serialize_with = "decimal")]
    pub identity_secret: Fr,
    #[serde(serialize_with = "decimal")]
    pub sig_data: Fr,
    pub epoch: Epoch,
    pub nonce: Nonce,
    pub attester_id: AttesterId,
    pub reveal_nonce: u8,
}

impl Witness for EpochKeyLiteWitness {
    const CIRCUIT: Circuit = Circuit::EpochKeyLite;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReputationWitness {
    #[serde(serialize_with = "decimal")]
    pub identity_secret: Fr,
    pub state_tree_indexes: Vec<usize>,
    #[serde(serialize_with = "decimal")]
    pub state_tree_elements: Vec<Vec<Fr>>,
    #[serde(serialize_with = "decimal")]
    pub data: Vec<Fr>,
    pub prove_graffiti: u8,
    #[serde(serialize_with = "decimal")]
    pub graffiti_pre_image: Fr,
    pub reveal_nonce: u8,
    pub attester_id: AttesterId,
    pub epoch: Epoch,
    pub nonce: Nonce,
    pub min_rep: u64,
    pub max_rep: u64,
    pub prove_min_rep: u8,
    pub prove_max_rep: u8,
    pub prove_zero_rep: u8,
    #[serde(serialize_with = "decimal")]
    pub sig_data: Fr,
}

impl Witness for ReputationWitness {
    const CIRCUIT: Circuit = Circuit::Reputation;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserStateTransitionWitness {
    pub from_epoch: Epoch,
    pub to_epoch: Epoch,
    #[serde(serialize_with = "decimal")]
    pub identity_secret: Fr,
    pub state_tree_indexes: Vec<usize>,
    #[serde(serialize_with = "decimal")]
    pub state_tree_elements: Vec<Vec<Fr>>,
    pub attester_id: AttesterId,
    pub history_tree_indices: Vec<usize>,
    #[serde(serialize_with = "decimal")]
    pub history_tree_elements: Vec<Vec<Fr>>,
    #[serde(serialize_with = "decimal")]
    pub data: Vec<Fr>,
    /// One data vector per epoch key nonce.
    #[serde(serialize_with = "decimal")]
    pub new_data: Vec<Vec<Fr>>,
    /// Per nonce, the write position of each replace field (see
    /// [`Aggregator::replace_positions`](crate::generic::aggregate::Aggregator::replace_positions)).
    pub replace_positions: Vec<Vec<u64>>,
    #[serde(serialize_with = "decimal")]
    pub epoch_tree_elements: Vec<Vec<Vec<Fr>>>,
    pub epoch_tree_indices: Vec<Vec<usize>>,
    #[serde(serialize_with = "decimal")]
    pub epoch_tree_root: Fr,
}

impl Witness for UserStateTransitionWitness {
    const CIRCUIT: Circuit = Circuit::UserStateTransition;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProveDataWitness {
    #[serde(serialize_with = "decimal")]
    pub identity_secret: Fr,
    pub state_tree_indexes: Vec<usize>,
    #[serde(serialize_with = "decimal")]
    pub state_tree_elements: Vec<Vec<Fr>>,
    #[serde(serialize_with = "decimal")]
    pub data: Vec<Fr>,
    pub epoch: Epoch,
    pub nonce: Nonce,
    pub attester_id: AttesterId,
    pub reveal_nonce: u8,
}

impl Witness for ProveDataWitness {
    const CIRCUIT: Circuit = Circuit::ProveData;
}
