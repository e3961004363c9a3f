use crate::config::{Settings, SyncConfig};
use crate::crypto::identity::Identity;
use crate::crypto::protocol;
use crate::error::Error;
use crate::generic::ledger::{
    Attestation, HistoryTreeLeaf, Ledger, Nullifier, Query, StateTreeLeaf, UserSignUp,
};
use crate::generic::object::{AttesterId, Com, DataVector, Epoch, EpochKey, Nul, MAX_EPOCH};
use crate::generic::prover::Prover;
use crate::generic::sync::Synchronizer;
use crate::generic::trees::TreeBuilder;
use crate::generic::user::UserState;
use crate::impls::centralized::ledger::MemoryLedger;
use crate::proofs::{ProofWrapper, SignupProof, UserStateTransitionProof};
use crate::{Fr, ProtocolHash};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{watch, Mutex, MutexGuard};

/// Unix seconds.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

fn system_clock() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Replay progress. `height` counts the events applied so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncStatus {
    pub height: u64,
    pub running: bool,
}

#[derive(Debug, Default)]
struct ChainState {
    epochs: HashMap<AttesterId, Epoch>,
    history_roots: HashMap<AttesterId, HashSet<Fr>>,
    attestations: u64,
}

/// A synchronizer that plays the chain itself.
///
/// Events go straight into a [`MemoryLedger`], with the checks the chain would make. Every event
/// first advances the attester to the epoch of its clock, sealing the epoch being left: the
/// leaf `H(state_root, epoch_root)` of that epoch is appended to the history tree. Epochs with no
/// event in them are skipped without a leaf.
///
/// Events are serialized by an internal lock and are only accepted between [`Synchronizer::start`]
/// and [`Synchronizer::stop`].
pub struct LocalSynchronizer<P> {
    config: SyncConfig,
    attester_ids: Vec<AttesterId>,
    ledger: MemoryLedger,
    prover: P,
    clock: Clock,
    chain: Mutex<ChainState>,
    status: watch::Sender<SyncStatus>,
}

impl<P> fmt::Debug for LocalSynchronizer<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSynchronizer")
            .field("attester_ids", &self.attester_ids)
            .field("status", &*self.status.borrow())
            .finish_non_exhaustive()
    }
}

impl<P: Prover> LocalSynchronizer<P> {
    pub fn new(config: SyncConfig, prover: P) -> Result<Self, Error> {
        config.validate()?;
        let attester_ids = config.attesters.iter().map(|a| a.attester_id).collect();
        let (status, _) = watch::channel(SyncStatus::default());
        Ok(Self {
            config,
            attester_ids,
            ledger: MemoryLedger::new(),
            prover,
            clock: Arc::new(system_clock),
            chain: Mutex::new(ChainState::default()),
            status,
        })
    }

    /// Replaces the wall clock.
    pub fn with_clock(mut self, clock: impl Fn() -> u64 + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    /// Takes the chain lock and moves the attester up to its clock's epoch.
    async fn begin(&self, attester_id: AttesterId) -> Result<(MutexGuard<'_, ChainState>, Epoch), Error> {
        if !self.status.borrow().running {
            return Err(Error::Stopped);
        }
        self.check_attester_id(&attester_id)?;
        let mut chain = self.chain.lock().await;
        let epoch = self.advance(&mut chain, attester_id).await?;
        Ok((chain, epoch))
    }

    fn commit(&self) -> u64 {
        let mut height = 0;
        self.status.send_modify(|s| {
            s.height += 1;
            height = s.height;
        });
        height
    }

    async fn advance(&self, chain: &mut ChainState, attester_id: AttesterId) -> Result<Epoch, Error> {
        let current = chain.epochs.get(&attester_id).copied().unwrap_or(0);
        let now = self.calc_current_epoch(&attester_id)?;
        if now <= current {
            return Ok(current);
        }

        let builder = TreeBuilder::<_, ProtocolHash>::new(&self.ledger, &self.config.settings);
        let state_root = builder.state_tree(attester_id, current).await?.root();
        let epoch_root = builder.epoch_tree(attester_id, current).await?.root();
        let index = self
            .ledger
            .count::<HistoryTreeLeaf>(&Query::new().eq("attesterId", attester_id))
            .await? as u64;
        self.ledger
            .insert(HistoryTreeLeaf {
                attester_id,
                leaf: protocol::history_tree_leaf::<Fr, ProtocolHash>(state_root, epoch_root),
                index,
            })
            .await;
        let history_root = builder.history_tree(attester_id).await?.root();
        chain
            .history_roots
            .entry(attester_id)
            .or_default()
            .insert(history_root);
        chain.epochs.insert(attester_id, now);

        tracing::info!(%attester_id, sealed = current, epoch = now, "epoch ended");
        Ok(now)
    }

    fn check_epoch(attester_id: AttesterId, expected: Epoch, got: Epoch) -> Result<(), Error> {
        if expected != got {
            return Err(Error::EpochMismatch {
                attester_id,
                expected,
                got,
            });
        }
        Ok(())
    }

    async fn insert_state_leaf(&self, attester_id: AttesterId, epoch: Epoch, hash: Fr) -> Result<u64, Error> {
        let index = self
            .ledger
            .count::<StateTreeLeaf>(&Query::new().eq("attesterId", attester_id).eq("epoch", epoch))
            .await? as u64;
        self.ledger
            .insert(StateTreeLeaf {
                epoch,
                attester_id,
                hash,
                index,
            })
            .await;
        Ok(index)
    }

    /// Registers `commitment` in `epoch`, which must be the attester's current epoch. Returns the
    /// index of `leaf` in the epoch's state tree.
    pub async fn user_signed_up(
        &self,
        attester_id: AttesterId,
        commitment: Com<Fr>,
        epoch: Epoch,
        leaf: Fr,
    ) -> Result<u64, Error> {
        self.manual_user_signed_up(attester_id, commitment, epoch, leaf, &[])
            .await
    }

    /// A signup carrying initial data. Each non-zero field is recorded as an attestation to the
    /// commitment at [`MAX_EPOCH`], and `leaf` is expected to commit to that data.
    #[tracing::instrument(skip_all, fields(%attester_id, epoch = epoch))]
    pub async fn manual_user_signed_up(
        &self,
        attester_id: AttesterId,
        commitment: Com<Fr>,
        epoch: Epoch,
        leaf: Fr,
        initial_data: &[Fr],
    ) -> Result<u64, Error> {
        let (mut chain, current) = self.begin(attester_id).await?;
        Self::check_epoch(attester_id, current, epoch)?;

        let field_count = self.config.settings.field_count;
        if initial_data.len() > field_count {
            return Err(Error::FieldIndexOutOfRange {
                index: initial_data.len() - 1,
                field_count,
            });
        }
        let existing = self
            .ledger
            .find_one::<UserSignUp>(
                &Query::new()
                    .eq("commitment", commitment)
                    .eq("attesterId", attester_id),
            )
            .await?;
        if existing.is_some() {
            return Err(Error::AlreadySignedUp(attester_id));
        }

        for (field_index, change) in initial_data.iter().enumerate() {
            if *change == Fr::from(0u64) {
                continue;
            }
            self.ledger
                .insert(Attestation {
                    epoch: MAX_EPOCH,
                    epoch_key: commitment,
                    attester_id,
                    field_index,
                    change: *change,
                    index: chain.attestations,
                })
                .await;
            chain.attestations += 1;
        }
        self.ledger
            .insert(UserSignUp {
                commitment,
                attester_id,
                epoch,
            })
            .await;
        let index = self.insert_state_leaf(attester_id, epoch, leaf).await?;
        drop(chain);

        let height = self.commit();
        tracing::info!(index, height, "user signed up");
        Ok(index)
    }

    /// Records `change` to field `field_index` of `epoch_key` in the attester's current epoch.
    /// Returns the attestation's global index.
    pub async fn attest(
        &self,
        attester_id: AttesterId,
        epoch: Epoch,
        epoch_key: EpochKey<Fr>,
        field_index: usize,
        change: Fr,
    ) -> Result<u64, Error> {
        let (mut chain, current) = self.begin(attester_id).await?;
        Self::check_epoch(attester_id, current, epoch)?;
        let field_count = self.config.settings.field_count;
        if field_index >= field_count {
            return Err(Error::FieldIndexOutOfRange {
                index: field_index,
                field_count,
            });
        }

        let index = chain.attestations;
        self.ledger
            .insert(Attestation {
                epoch,
                epoch_key,
                attester_id,
                field_index,
                change,
                index,
            })
            .await;
        chain.attestations += 1;
        drop(chain);

        let height = self.commit();
        tracing::debug!(%attester_id, epoch, field_index, index, height, "attestation");
        Ok(index)
    }

    /// Records a transition into `to_epoch`, spending `nullifier`. Returns the index of `leaf` in
    /// the state tree of `to_epoch`.
    #[tracing::instrument(skip_all, fields(%attester_id, to_epoch = to_epoch))]
    pub async fn user_state_transitioned(
        &self,
        attester_id: AttesterId,
        to_epoch: Epoch,
        leaf: Fr,
        nullifier: Nul<Fr>,
    ) -> Result<u64, Error> {
        let (chain, current) = self.begin(attester_id).await?;
        Self::check_epoch(attester_id, current, to_epoch)?;

        let spent = self
            .ledger
            .find_one::<Nullifier>(
                &Query::new()
                    .eq("attesterId", attester_id)
                    .eq("nullifier", nullifier),
            )
            .await?;
        if spent.is_some() {
            return Err(Error::NullifierSpent);
        }

        self.ledger
            .insert(Nullifier {
                epoch: to_epoch,
                attester_id,
                nullifier,
            })
            .await;
        let index = self.insert_state_leaf(attester_id, to_epoch, leaf).await?;
        drop(chain);

        let height = self.commit();
        tracing::info!(index, height, "user state transitioned");
        Ok(index)
    }

    /// Moves the attester to its clock's epoch, sealing the epoch it was in. Returns the new
    /// epoch.
    pub async fn end_epoch(&self, attester_id: AttesterId) -> Result<Epoch, Error> {
        let (chain, epoch) = self.begin(attester_id).await?;
        drop(chain);
        self.commit();
        Ok(epoch)
    }

    /// Checks a signup proof and applies it.
    pub async fn submit_signup(&self, proof: &SignupProof) -> Result<u64, Error> {
        if !proof.verify(&self.prover).await? {
            return Err(Error::InvalidProof(SignupProof::CIRCUIT));
        }
        self.user_signed_up(
            proof.attester_id,
            proof.identity_commitment,
            proof.epoch,
            proof.state_tree_leaf,
        )
        .await
    }

    /// Checks a transition proof against the attester's history roots and applies it.
    pub async fn submit_user_state_transition(
        &self,
        proof: &UserStateTransitionProof,
    ) -> Result<u64, Error> {
        if !proof.verify(&self.prover).await? {
            return Err(Error::InvalidProof(UserStateTransitionProof::CIRCUIT));
        }
        let attester_id = proof.attester_id;
        {
            let (chain, _) = self.begin(attester_id).await?;
            let known = chain
                .history_roots
                .get(&attester_id)
                .is_some_and(|roots| roots.contains(&proof.history_tree_root));
            if !known {
                return Err(Error::UnknownHistoryRoot(attester_id));
            }
        }
        self.user_state_transitioned(
            attester_id,
            proof.to_epoch,
            proof.state_tree_leaf,
            proof.nullifier(),
        )
        .await
    }
}

impl<P: Prover> Synchronizer for LocalSynchronizer<P> {
    type Ledger = MemoryLedger;
    type Prover = P;

    fn settings(&self) -> &Settings {
        &self.config.settings
    }

    fn attester_ids(&self) -> &[AttesterId] {
        &self.attester_ids
    }

    fn default_attester_id(&self) -> AttesterId {
        self.attester_ids[0]
    }

    fn ledger(&self) -> &MemoryLedger {
        &self.ledger
    }

    fn prover(&self) -> &P {
        &self.prover
    }

    fn calc_current_epoch(&self, attester_id: &AttesterId) -> Result<Epoch, Error> {
        let attester = self
            .config
            .attester(attester_id)
            .ok_or(Error::UnknownAttester(*attester_id))?;
        Ok(attester.epoch_at((self.clock)()))
    }

    async fn load_current_epoch(&self, attester_id: &AttesterId) -> Result<Epoch, Error> {
        self.check_attester_id(attester_id)?;
        Ok(self
            .chain
            .lock()
            .await
            .epochs
            .get(attester_id)
            .copied()
            .unwrap_or(0))
    }

    async fn wait_for_sync(&self, height: Option<u64>) -> Result<(), Error> {
        let Some(height) = height else {
            return Ok(());
        };
        let mut rx = self.status.subscribe();
        let status = *rx
            .wait_for(|s| s.height >= height || !s.running)
            .await
            .map_err(|_| Error::Stopped)?;
        if status.height >= height {
            Ok(())
        } else {
            Err(Error::Stopped)
        }
    }

    async fn start(&self) -> Result<(), Error> {
        self.status.send_modify(|s| s.running = true);
        tracing::info!(attesters = self.attester_ids.len(), "synchronizer started");
        Ok(())
    }

    async fn stop(&self) {
        self.status.send_modify(|s| s.running = false);
        tracing::info!("synchronizer stopped");
    }
}

impl<P: Prover> UserState<LocalSynchronizer<P>> {
    /// A user state over a fresh [`LocalSynchronizer`].
    pub fn from_config(config: SyncConfig, identity: Identity, prover: P) -> Result<Self, Error> {
        Ok(Self::from_synchronizer(
            LocalSynchronizer::new(config, prover)?,
            identity,
        ))
    }
}

/// The data an honest signup with `initial_data` commits to, padded to `field_count`.
pub fn signup_leaf(
    identity: &Identity,
    attester_id: AttesterId,
    epoch: Epoch,
    initial_data: &[Fr],
    field_count: usize,
) -> Fr {
    let mut data: DataVector<Fr> = initial_data.to_vec();
    data.resize(field_count, Fr::from(0u64));
    protocol::state_tree_leaf::<Fr, ProtocolHash>(identity.secret(), attester_id.to_field(), epoch, &data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generic::user::SignupOptions;
    use crate::impls::dummy::DummyProver;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const CONFIG: &str = r#"{
        "settings": {
            "fieldCount": 4,
            "sumFieldCount": 2,
            "numEpochKeyNoncePerEpoch": 2,
            "stateTreeDepth": 5,
            "epochTreeDepth": 3,
            "historyTreeDepth": 4
        },
        "attesters": [
            { "attesterId": "0xabcd", "startTimestamp": 0, "epochLength": 1000000000000 }
        ]
    }"#;

    #[tokio::test]
    async fn user_state_from_config_owns_its_synchronizer() {
        let config = SyncConfig::from_json_str(CONFIG).unwrap();
        let prover = DummyProver::new(config.settings.clone());
        let identity = Identity::new(&mut StdRng::seed_from_u64(7));
        let user = UserState::from_config(config, identity, prover).unwrap();
        user.start().await.unwrap();

        let sync = user.synchronizer().unwrap();
        assert_eq!(sync.default_attester_id(), AttesterId::from(0xabcdu64));
        assert!(!user.has_signed_up(None).await.unwrap());

        let proof = user.gen_signup_proof(SignupOptions::default()).await.unwrap();
        sync.submit_signup(&proof).await.unwrap();
        assert!(user.has_signed_up(None).await.unwrap());
        assert_eq!(user.latest_state_tree_leaf_index(None, None).await.unwrap(), Some(0));
    }
}
