use crate::generic::object::{AttesterId, Epoch, Nonce};
use crate::generic::prover::{Circuit, SnarkProof};
use crate::proofs::{check_len, EpochKeyControl, ProofError, ProofWrapper};
use crate::Fr;

/// Proof that the prover owns `epoch_key` and has a leaf in the state tree with root
/// `state_tree_root`. `sig_data` binds arbitrary data to the proof.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochKeyProof {
    pub epoch_key: Fr,
    pub state_tree_root: Fr,
    pub control: Fr,
    pub sig_data: Fr,
    pub nonce: Nonce,
    pub epoch: Epoch,
    pub attester_id: AttesterId,
    pub reveal_nonce: bool,
    pub chain_id: u64,
    pub public_signals: Vec<Fr>,
    pub proof: SnarkProof,
}

impl ProofWrapper for EpochKeyProof {
    const CIRCUIT: Circuit = Circuit::EpochKey;

    fn decode(public_signals: Vec<Fr>, proof: SnarkProof) -> Result<Self, ProofError> {
        check_len(Self::CIRCUIT, &public_signals, 4)?;
        let control = EpochKeyControl::decode(public_signals[2]);
        Ok(Self {
            epoch_key: public_signals[0],
            state_tree_root: public_signals[1],
            control: public_signals[2],
            sig_data: public_signals[3],
            nonce: control.nonce,
            epoch: control.epoch,
            attester_id: control.attester_id,
            reveal_nonce: control.reveal_nonce,
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
