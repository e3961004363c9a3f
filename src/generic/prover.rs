use crate::Fr;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProverError {
    #[error("could not encode witness: {0}")]
    Witness(#[from] serde_json::Error),
    #[error("prover failed on {circuit}: {reason}")]
    Failure { circuit: Circuit, reason: String },
}

/// The circuits a witness can be built for. The wire names are what the proving backend keys its
/// artifacts by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Circuit {
    #[serde(rename = "signup")]
    Signup,
    #[serde(rename = "epochKey")]
    EpochKey,
    #[serde(rename = "epochKeyLite")]
    EpochKeyLite,
    #[serde(rename = "proveReputation")]
    Reputation,
    #[serde(rename = "userStateTransition")]
    UserStateTransition,
    #[serde(rename = "proveData")]
    ProveData,
}

impl Circuit {
    pub fn name(&self) -> &'static str {
        match self {
            Circuit::Signup => "signup",
            Circuit::EpochKey => "epochKey",
            Circuit::EpochKeyLite => "epochKeyLite",
            Circuit::Reputation => "proveReputation",
            Circuit::UserStateTransition => "userStateTransition",
            Circuit::ProveData => "proveData",
        }
    }
}

impl fmt::Display for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A Groth16 proof in the JSON shape snarkjs emits. Coordinates are decimal strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnarkProof {
    pub pi_a: Vec<String>,
    pub pi_b: Vec<Vec<String>>,
    pub pi_c: Vec<String>,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub curve: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofOutput {
    pub proof: SnarkProof,
    pub public_signals: Vec<Fr>,
}

/// The proving backend.
///
/// Witnesses are handed over as JSON objects keyed by circuit input name; the backend owns the
/// circuit artifacts and any timeouts.
pub trait Prover: Send + Sync {
    async fn gen_proof_and_public_signals(
        &self,
        circuit: Circuit,
        witness: serde_json::Value,
    ) -> Result<ProofOutput, ProverError>;

    async fn verify_proof(
        &self,
        circuit: Circuit,
        public_signals: &[Fr],
        proof: &SnarkProof,
    ) -> Result<bool, ProverError>;
}
