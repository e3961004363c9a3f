//! Typed views over proof outputs.
//!
//! A wrapper names the public signals of one circuit and unpacks its control words. Decoding only
//! reads positions; whether the signals are genuine is up to [`ProofWrapper::verify`].

use crate::generic::prover::{Circuit, ProofOutput, Prover, ProverError, SnarkProof};
use crate::Fr;
use thiserror::Error;

/// Control word layouts.
pub mod control;
/// Data proofs.
pub mod data;
/// Epoch key proofs.
pub mod epoch_key;
/// Epoch key proofs without a state tree path.
pub mod epoch_key_lite;
/// Reputation proofs.
pub mod reputation;
/// Signup proofs.
pub mod signup;
/// User state transition proofs.
pub mod user_state_transition;

pub use control::{AttesterControl, EpochKeyControl, ReputationControl};
pub use data::DataProof;
pub use epoch_key::EpochKeyProof;
pub use epoch_key_lite::EpochKeyLiteProof;
pub use reputation::ReputationProof;
pub use signup::SignupProof;
pub use user_state_transition::UserStateTransitionProof;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProofError {
    #[error("{circuit} proof needs at least {expected} public signals, got {got}")]
    MissingSignal {
        circuit: Circuit,
        expected: usize,
        got: usize,
    },
}

pub(crate) fn check_len(circuit: Circuit, signals: &[Fr], expected: usize) -> Result<(), ProofError> {
    if signals.len() < expected {
        return Err(ProofError::MissingSignal {
            circuit,
            expected,
            got: signals.len(),
        });
    }
    Ok(())
}

pub trait ProofWrapper: Sized {
    const CIRCUIT: Circuit;

    /// Names the public signals. Fails if there are fewer than the circuit outputs.
    fn decode(public_signals: Vec<Fr>, proof: SnarkProof) -> Result<Self, ProofError>;

    fn public_signals(&self) -> &[Fr];

    fn proof(&self) -> &SnarkProof;

    fn from_output(output: ProofOutput) -> Result<Self, ProofError> {
        Self::decode(output.public_signals, output.proof)
    }

    /// Asks `prover` whether the proof is valid for these public signals.
    async fn verify<P: Prover>(&self, prover: &P) -> Result<bool, ProverError> {
        prover
            .verify_proof(Self::CIRCUIT, self.public_signals(), self.proof())
            .await
    }
}
