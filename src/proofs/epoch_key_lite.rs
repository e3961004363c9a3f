use crate::generic::object::{AttesterId, Epoch, Nonce};
use crate::generic::prover::{Circuit, SnarkProof};
use crate::proofs::{check_len, EpochKeyControl, ProofError, ProofWrapper};
use crate::Fr;

/// Ownership of an epoch key, with no claim about the state tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochKeyLiteProof {
    pub control: Fr,
    pub epoch_key: Fr,
    pub sig_data: Fr,
    pub nonce: Nonce,
    pub epoch: Epoch,
    pub attester_id: AttesterId,
    pub reveal_nonce: bool,
    pub chain_id: u64,
    pub public_signals: Vec<Fr>,
    pub proof: SnarkProof,
}

impl ProofWrapper for EpochKeyLiteProof {
    const CIRCUIT: Circuit = Circuit::EpochKeyLite;

    fn decode(public_signals: Vec<Fr>, proof: SnarkProof) -> Result<Self, ProofError> {
        check_len(Self::CIRCUIT, &public_signals, 3)?;
        let control = EpochKeyControl::decode(public_signals[0]);
        Ok(Self {
            control: public_signals[0],
            epoch_key: public_signals[1],
            sig_data: public_signals[2],
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
