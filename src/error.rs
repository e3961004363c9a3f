use crate::config::ConfigError;
use crate::generic::ledger::LedgerError;
use crate::generic::merkle::MerkleError;
use crate::generic::object::{AttesterId, Epoch};
use crate::generic::prover::{Circuit, ProverError};
use crate::proofs::ProofError;
use thiserror::Error;

/// What the engine could not find in the replayed ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncGap {
    /// No synchronizer is attached to the engine.
    Detached,
    /// The user's state tree leaf for `epoch` has not been replayed yet.
    StateTreeLeaf { attester_id: AttesterId, epoch: Epoch },
    /// The history tree holds fewer leaves than the epoch being transitioned from requires.
    HistoryTree { attester_id: AttesterId, epoch: Epoch },
    /// The ledger has no signup for this identity with the attester.
    NotSignedUp { attester_id: AttesterId },
    /// The user already transitioned past `epoch`, so their leaf there is no longer provable.
    EpochSuperseded {
        attester_id: AttesterId,
        epoch: Epoch,
        latest: Epoch,
    },
}

impl std::fmt::Display for SyncGap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncGap::Detached => write!(f, "no synchronizer attached"),
            SyncGap::StateTreeLeaf { attester_id, epoch } => write!(
                f,
                "state tree leaf for attester {attester_id} epoch {epoch} not replayed"
            ),
            SyncGap::HistoryTree { attester_id, epoch } => write!(
                f,
                "history tree for attester {attester_id} not replayed up to epoch {epoch}"
            ),
            SyncGap::NotSignedUp { attester_id } => {
                write!(f, "user has not signed up with attester {attester_id}")
            }
            SyncGap::EpochSuperseded {
                attester_id,
                epoch,
                latest,
            } => write!(
                f,
                "epoch {epoch} of attester {attester_id} superseded by transition into {latest}"
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("not synchronized: {0}")]
    NotSynchronized(SyncGap),
    #[error("attester {0} is not tracked by this synchronizer")]
    UnknownAttester(AttesterId),
    #[error("epoch key nonce {nonce} out of range, must be below {max}")]
    InvalidNonce { nonce: u64, max: u8 },
    #[error("cannot transition from epoch {0} into itself")]
    SameEpochTransition(Epoch),
    #[error("field index {index} out of range for {field_count} fields")]
    FieldIndexOutOfRange { index: usize, field_count: usize },
    #[error("synchronizer stopped")]
    Stopped,
    #[error("attester {attester_id} is at epoch {expected}, got {got}")]
    EpochMismatch {
        attester_id: AttesterId,
        expected: Epoch,
        got: Epoch,
    },
    #[error("identity commitment already signed up with attester {0}")]
    AlreadySignedUp(AttesterId),
    #[error("nullifier already spent")]
    NullifierSpent,
    #[error("history tree root unknown to attester {0}")]
    UnknownHistoryRoot(AttesterId),
    #[error("{0} proof rejected by the prover")]
    InvalidProof(Circuit),
    #[error(transparent)]
    Merkle(#[from] MerkleError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Prover(#[from] ProverError),
    #[error(transparent)]
    Proof(#[from] ProofError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Whether waiting for the synchronizer and retrying may succeed.
    ///
    /// Only gaps in replayed state are transient. A detached engine, bad arguments and broken
    /// invariants fail the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::NotSynchronized(SyncGap::StateTreeLeaf { .. })
                | Error::NotSynchronized(SyncGap::HistoryTree { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
