use crate::generic::object::{AttesterId, Epoch, Nonce};
use crate::generic::prover::{Circuit, SnarkProof};
use crate::proofs::{check_len, EpochKeyControl, ProofError, ProofWrapper, ReputationControl};
use crate::Fr;

/// Proof of reputation bounds for the holder of `epoch_key`.
///
/// Each bound is only enforced when its `prove_*` flag is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReputationProof {
    pub epoch_key: Fr,
    pub state_tree_root: Fr,
    pub control0: Fr,
    pub control1: Fr,
    pub graffiti: Fr,
    pub sig_data: Fr,
    pub nonce: Nonce,
    pub epoch: Epoch,
    pub attester_id: AttesterId,
    pub reveal_nonce: bool,
    pub chain_id: u64,
    pub min_rep: u64,
    pub max_rep: u64,
    pub prove_min_rep: bool,
    pub prove_max_rep: bool,
    pub prove_zero_rep: bool,
    pub prove_graffiti: bool,
    pub public_signals: Vec<Fr>,
    pub proof: SnarkProof,
}

impl ProofWrapper for ReputationProof {
    const CIRCUIT: Circuit = Circuit::Reputation;

    fn decode(public_signals: Vec<Fr>, proof: SnarkProof) -> Result<Self, ProofError> {
        check_len(Self::CIRCUIT, &public_signals, 6)?;
        let c0 = EpochKeyControl::decode(public_signals[2]);
        let c1 = ReputationControl::decode(public_signals[3]);
        Ok(Self {
            epoch_key: public_signals[0],
            state_tree_root: public_signals[1],
            control0: public_signals[2],
            control1: public_signals[3],
            graffiti: public_signals[4],
            sig_data: public_signals[5],
            nonce: c0.nonce,
            epoch: c0.epoch,
            attester_id: c0.attester_id,
            reveal_nonce: c0.reveal_nonce,
            chain_id: c0.chain_id,
            min_rep: c1.min_rep,
            max_rep: c1.max_rep,
            prove_min_rep: c1.prove_min_rep,
            prove_max_rep: c1.prove_max_rep,
            prove_zero_rep: c1.prove_zero_rep,
            prove_graffiti: c1.prove_graffiti,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpacks_both_control_words() {
        let c0 = EpochKeyControl {
            nonce: 0,
            epoch: 9,
            attester_id: AttesterId::from(77u64),
            reveal_nonce: false,
            chain_id: 0,
        };
        let c1 = ReputationControl {
            min_rep: 10,
            max_rep: 0,
            prove_min_rep: true,
            prove_graffiti: true,
            ..Default::default()
        };
        let signals = vec![
            Fr::from(1u64),
            Fr::from(2u64),
            c0.build(),
            c1.build(),
            Fr::from(123u64),
            Fr::from(0u64),
        ];
        let proof = ReputationProof::decode(signals, SnarkProof::default()).unwrap();
        assert_eq!(proof.epoch, 9);
        assert_eq!(proof.attester_id, AttesterId::from(77u64));
        assert_eq!(proof.min_rep, 10);
        assert!(proof.prove_min_rep);
        assert!(!proof.prove_max_rep);
        assert!(proof.prove_graffiti);
        assert_eq!(proof.graffiti, Fr::from(123u64));
    }
}
