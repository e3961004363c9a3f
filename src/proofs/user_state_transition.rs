use crate::generic::object::{AttesterId, Epoch, Nul};
use crate::generic::prover::{Circuit, SnarkProof};
use crate::proofs::{check_len, AttesterControl, ProofError, ProofWrapper};
use crate::Fr;

/// Output of a user state transition.
///
/// The signals are `[history_tree_root, state_tree_leaf, epoch_keys.., control]`, with one epoch
/// key per nonce of the epoch transitioned out of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserStateTransitionProof {
    pub history_tree_root: Fr,
    pub state_tree_leaf: Fr,
    pub epoch_keys: Vec<Fr>,
    pub control: Fr,
    pub attester_id: AttesterId,
    pub to_epoch: Epoch,
    pub chain_id: u64,
    pub public_signals: Vec<Fr>,
    pub proof: SnarkProof,
}

impl UserStateTransitionProof {
    /// The nullifier the transition spends: the nonce 0 epoch key of the epoch left behind.
    pub fn nullifier(&self) -> Nul<Fr> {
        self.epoch_keys[0]
    }
}

impl ProofWrapper for UserStateTransitionProof {
    const CIRCUIT: Circuit = Circuit::UserStateTransition;

    fn decode(public_signals: Vec<Fr>, proof: SnarkProof) -> Result<Self, ProofError> {
        check_len(Self::CIRCUIT, &public_signals, 4)?;
        let last = public_signals.len() - 1;
        let control = AttesterControl::decode(public_signals[last]);
        Ok(Self {
            history_tree_root: public_signals[0],
            state_tree_leaf: public_signals[1],
            epoch_keys: public_signals[2..last].to_vec(),
            control: public_signals[last],
            attester_id: control.attester_id,
            to_epoch: control.epoch,
            chain_id: control.chain_id,
            public_signals,
            proof,
        })
    }

    fn public_signals(&self) -> &[Fr] {
        &self.public_signals
    }

    fn proof(&self) -> &SnarkProof {
        &self.proof
    }
}
