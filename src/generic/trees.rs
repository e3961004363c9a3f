use crate::config::Settings;
use crate::crypto::hash::FieldHash;
use crate::crypto::protocol;
use crate::error::{Error, SyncGap};
use crate::generic::aggregate::Aggregator;
use crate::generic::ledger::{
    Attestation, HistoryTreeLeaf, Ledger, Order, Query, StateTreeLeaf,
};
use crate::generic::merkle::{IncrementalMerkleTree, MerkleProof};
use crate::generic::object::{AttesterId, DataVector, Epoch};
use crate::Fr;
use std::marker::PhantomData;

/// Whether a path ends in a leaf the chain already holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    /// The leaf was replayed from the ledger.
    Confirmed,
    /// The leaf was appended locally because its epoch has not been sealed on chain. The path is
    /// only valid if the chain appends the same leaf next.
    Speculative,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryPath {
    pub proof: MerkleProof<Fr>,
    pub leaf_index: usize,
    pub kind: PathKind,
}

/// An epoch tree together with the epoch keys of its leaves, in leaf order.
#[derive(Debug, Clone)]
pub struct EpochTree<H> {
    pub tree: IncrementalMerkleTree<Fr, H>,
    pub epoch_keys: Vec<Fr>,
    pub data: Vec<DataVector<Fr>>,
}

impl<H: FieldHash<Fr>> EpochTree<H> {
    /// Leaf index of `epoch_key`, if it was attested to in this epoch.
    pub fn index_of(&self, epoch_key: &Fr) -> Option<usize> {
        self.epoch_keys.iter().position(|k| k == epoch_key)
    }

    pub fn root(&self) -> Fr {
        self.tree.root()
    }
}

/// Distinct epoch keys in the order they were first attested to.
pub fn distinct_epoch_keys<'a>(attestations: impl IntoIterator<Item = &'a Attestation>) -> Vec<Fr> {
    let mut keys: Vec<Fr> = Vec::new();
    for a in attestations {
        if !keys.contains(&a.epoch_key) {
            keys.push(a.epoch_key);
        }
    }
    keys
}

/// Rebuilds an attester's trees from the replayed ledger.
///
/// Each call starts from an empty tree, so a tree never outlives the call that built it and two
/// builds over the same ledger contents agree exactly.
pub struct TreeBuilder<'a, L, H> {
    ledger: &'a L,
    settings: &'a Settings,
    _hash: PhantomData<H>,
}

impl<'a, L: Ledger, H: FieldHash<Fr>> TreeBuilder<'a, L, H> {
    pub fn new(ledger: &'a L, settings: &'a Settings) -> Self {
        Self {
            ledger,
            settings,
            _hash: PhantomData,
        }
    }

    /// The attester's state tree for `epoch`: every state leaf of the epoch, in insertion order.
    pub async fn state_tree(
        &self,
        attester_id: AttesterId,
        epoch: Epoch,
    ) -> Result<IncrementalMerkleTree<Fr, H>, Error> {
        let leaves = self
            .ledger
            .find_many::<StateTreeLeaf>(
                &Query::new()
                    .eq("attesterId", attester_id)
                    .eq("epoch", epoch)
                    .order_by("index", Order::Asc),
            )
            .await?;
        tracing::debug!(%attester_id, epoch, leaves = leaves.len(), "replaying state tree");

        let mut tree = IncrementalMerkleTree::new(self.settings.state_tree_depth);
        for leaf in leaves {
            tree.insert(leaf.hash)?;
        }
        Ok(tree)
    }

    /// The attester's epoch tree for `epoch`.
    ///
    /// There is one leaf per distinct epoch key attested to in the epoch, in order of the key's
    /// first attestation, committing to that key's aggregated data.
    pub async fn epoch_tree(
        &self,
        attester_id: AttesterId,
        epoch: Epoch,
    ) -> Result<EpochTree<H>, Error> {
        let attestations = self
            .ledger
            .find_many::<Attestation>(
                &Query::new()
                    .eq("attesterId", attester_id)
                    .eq("epoch", epoch)
                    .order_by("index", Order::Asc),
            )
            .await?;
        tracing::debug!(
            %attester_id,
            epoch,
            attestations = attestations.len(),
            "replaying epoch tree"
        );

        let aggregator = Aggregator::new(
            self.settings.field_count,
            self.settings.sum_field_count,
        );
        let mut epoch_keys: Vec<Fr> = Vec::new();
        let mut data: Vec<DataVector<Fr>> = Vec::new();
        for a in &attestations {
            let i = match epoch_keys.iter().position(|k| k == &a.epoch_key) {
                Some(i) => i,
                None => {
                    epoch_keys.push(a.epoch_key);
                    data.push(aggregator.zero());
                    epoch_keys.len() - 1
                }
            };
            aggregator.apply(&mut data[i], a.field_index, a.change)?;
        }

        let mut tree = IncrementalMerkleTree::with_arity(
            self.settings.epoch_tree_depth,
            self.settings.epoch_tree_arity,
            Fr::from(0u64),
        )?;
        for (key, d) in epoch_keys.iter().zip(&data) {
            tree.insert(protocol::epoch_tree_leaf::<Fr, H>(*key, d))?;
        }
        Ok(EpochTree {
            tree,
            epoch_keys,
            data,
        })
    }

    /// The attester's history tree: one `H(state_root, epoch_root)` leaf per sealed epoch.
    pub async fn history_tree(
        &self,
        attester_id: AttesterId,
    ) -> Result<IncrementalMerkleTree<Fr, H>, Error> {
        let leaves = self
            .ledger
            .find_many::<HistoryTreeLeaf>(
                &Query::new()
                    .eq("attesterId", attester_id)
                    .order_by("index", Order::Asc),
            )
            .await?;

        let mut tree = IncrementalMerkleTree::new(self.settings.history_tree_depth);
        for leaf in leaves {
            tree.insert(leaf.leaf)?;
        }
        Ok(tree)
    }

    /// Path to the history leaf of `epoch` with the given roots.
    ///
    /// If the leaf has not been replayed and `sealed` is false, it is appended locally where the
    /// chain will put it when the epoch ends. A sealed epoch whose leaf is missing means the
    /// replay is behind.
    pub async fn history_path(
        &self,
        attester_id: AttesterId,
        epoch: Epoch,
        state_root: Fr,
        epoch_root: Fr,
        sealed: bool,
    ) -> Result<HistoryPath, Error> {
        let leaf = protocol::history_tree_leaf::<Fr, H>(state_root, epoch_root);
        let mut tree = self.history_tree(attester_id).await?;

        let found = self
            .ledger
            .find_one::<HistoryTreeLeaf>(
                &Query::new()
                    .eq("attesterId", attester_id)
                    .eq("leaf", leaf),
            )
            .await?;

        match found {
            Some(record) => {
                let leaf_index = record.index as usize;
                Ok(HistoryPath {
                    proof: tree.create_proof(leaf_index)?,
                    leaf_index,
                    kind: PathKind::Confirmed,
                })
            }
            None if sealed => Err(Error::NotSynchronized(SyncGap::HistoryTree {
                attester_id,
                epoch,
            })),
            None => {
                let leaf_index = tree.insert(leaf)?;
                tracing::warn!(
                    %attester_id,
                    epoch,
                    leaf_index,
                    "history leaf not on chain yet, using a speculative path"
                );
                Ok(HistoryPath {
                    proof: tree.create_proof(leaf_index)?,
                    leaf_index,
                    kind: PathKind::Speculative,
                })
            }
        }
    }
}
