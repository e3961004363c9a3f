use crate::generic::object::{AttesterId, Epoch};
use crate::generic::prover::{Circuit, SnarkProof};
use crate::proofs::{check_len, AttesterControl, ProofError, ProofWrapper};
use crate::Fr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignupProof {
    pub identity_commitment: Fr,
    /// The leaf to insert into the attester's state tree for `epoch`.
    pub state_tree_leaf: Fr,
    pub control: Fr,
    pub attester_id: AttesterId,
    pub epoch: Epoch,
    pub chain_id: u64,
    pub public_signals: Vec<Fr>,
    pub proof: SnarkProof,
}

impl ProofWrapper for SignupProof {
    const CIRCUIT: Circuit = Circuit::Signup;

    fn decode(public_signals: Vec<Fr>, proof: SnarkProof) -> Result<Self, ProofError> {
        check_len(Self::CIRCUIT, &public_signals, 3)?;
        let control = AttesterControl::decode(public_signals[2]);
        Ok(Self {
            identity_commitment: public_signals[0],
            state_tree_leaf: public_signals[1],
            control: public_signals[2],
            attester_id: control.attester_id,
            epoch: control.epoch,
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
