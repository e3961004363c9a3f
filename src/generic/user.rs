use crate::crypto::identity::Identity;
use crate::crypto::protocol;
use crate::error::{Error, SyncGap};
use crate::generic::aggregate::Aggregator;
use crate::generic::ledger::{Attestation, Ledger, Nullifier, Order, Query, StateTreeLeaf, UserSignUp};
use crate::generic::merkle::MerkleProof;
use crate::generic::object::{has_changes, AttesterId, DataVector, Epoch, EpochKey, MAX_EPOCH};
use crate::generic::prover::Prover;
use crate::generic::sync::Synchronizer;
use crate::generic::trees::{PathKind, TreeBuilder};
use crate::generic::witness::{
    EpochKeyLiteWitness, EpochKeyWitness, ProveDataWitness, ReputationWitness, SignupWitness,
    UserStateTransitionWitness, Witness,
};
use crate::proofs::{
    DataProof, EpochKeyLiteProof, EpochKeyProof, ProofWrapper, ReputationProof, SignupProof,
    UserStateTransitionProof,
};
use crate::{Fr, ProtocolHash};
use futures_util::future::try_join_all;
use std::collections::HashSet;

/// Options for a signup proof.
#[derive(Debug, Clone, Default)]
pub struct SignupOptions {
    /// Signup epoch. Defaults to the attester's current epoch.
    pub epoch: Option<Epoch>,
    pub attester_id: Option<AttesterId>,
}

/// Options for the epoch key and epoch key lite proofs.
#[derive(Debug, Clone, Default)]
pub struct EpochKeyOptions {
    pub nonce: u64,
    /// Defaults to the latest transitioned epoch.
    pub epoch: Option<Epoch>,
    pub attester_id: Option<AttesterId>,
    /// Data the proof is bound to, such as a message hash.
    pub sig_data: Option<Fr>,
    pub reveal_nonce: bool,
}

/// Options for a reputation proof.
///
/// A bound of zero is not enforced: `prove_min_rep` and `prove_max_rep` are set exactly when the
/// corresponding bound is non-zero.
#[derive(Debug, Clone, Default)]
pub struct ReputationOptions {
    pub nonce: u64,
    pub attester_id: Option<AttesterId>,
    pub min_rep: Option<u64>,
    pub max_rep: Option<u64>,
    /// Proven only when present and non-zero.
    pub graffiti_pre_image: Option<Fr>,
    pub prove_zero_rep: bool,
    pub reveal_nonce: bool,
    pub sig_data: Option<Fr>,
}

/// Options for a user state transition proof.
#[derive(Debug, Clone, Default)]
pub struct TransitionOptions {
    /// Defaults to the attester's current epoch.
    pub to_epoch: Option<Epoch>,
    pub attester_id: Option<AttesterId>,
}

/// Options for a data proof.
#[derive(Debug, Clone, Default)]
pub struct DataOptions {
    pub nonce: u64,
    /// Defaults to the latest transitioned epoch.
    pub epoch: Option<Epoch>,
    pub attester_id: Option<AttesterId>,
    pub reveal_nonce: bool,
}

/// What a transition carries over from one epoch key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochKeyTransition {
    pub epoch_key: EpochKey<Fr>,
    /// Data attested to this key alone during the epoch.
    pub new_data: DataVector<Fr>,
    /// Write positions of the replace fields within the epoch.
    pub replace_positions: Vec<u64>,
    pub has_changes: bool,
    /// Leaf index in the epoch tree, `None` if the key was never attested to.
    pub leaf_index: Option<usize>,
}

/// A user state transition witness with the bookkeeping behind it.
#[derive(Debug, Clone)]
pub struct TransitionInputs {
    pub witness: UserStateTransitionWitness,
    /// Whether the history path ends in a replayed leaf or a locally appended one.
    pub history: PathKind,
    pub history_leaf_index: usize,
    /// One entry per nonce, in nonce order.
    pub epoch_keys: Vec<EpochKeyTransition>,
}

/// The state of a single user, rebuilt from a synchronizer's ledger.
///
/// A user state holds an [`Identity`] and a handle to a [`Synchronizer`]. It keeps no state of its
/// own beyond that: every query replays the relevant records from the ledger, so the answers are
/// always those of the ledger at call time, and concurrent calls on a shared user state are fine.
///
/// The user state answers status queries (has the user signed up, which epoch did they last
/// transition into, what data can they currently prove) and builds the witnesses for each proof
/// the user can make. Each witness builder has a `gen_*` counterpart which hands the witness to
/// the synchronizer's prover and wraps the result.
///
/// # Attesters
///
/// Every operation takes an optional attester id. `None` means the synchronizer's default
/// attester; an explicit id must be one the synchronizer tracks, otherwise the call fails with
/// [`Error::UnknownAttester`].
///
/// # Synchronization
///
/// Proofs over the state tree need the user's latest state tree leaf to have been replayed. Until
/// it has, these calls fail with [`Error::NotSynchronized`] and [`Error::is_retryable`] returns
/// true: wait for the synchronizer and try again. A user who never signed up, or who asks for an
/// epoch they already transitioned out of, gets a gap that is not retryable.
///
/// # Example
///
/// ```no_run
/// # use unirep_state::{UserState, Identity};
/// # use unirep_state::config::SyncConfig;
/// # use unirep_state::impls::dummy::DummyProver;
/// # use unirep_state::generic::user::EpochKeyOptions;
/// # async fn run(config: SyncConfig) -> unirep_state::Result<()> {
/// let identity = Identity::new(&mut rand::thread_rng());
/// let prover = DummyProver::new(config.settings.clone());
/// let user = UserState::from_config(config, identity, prover)?;
/// user.start().await?;
///
/// if user.has_signed_up(None).await? {
///     let data = user.get_provable_data(None).await?;
///     let proof = user.gen_epoch_key_proof(EpochKeyOptions::default()).await?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct UserState<S> {
    identity: Identity,
    sync: Option<S>,
}

impl<S: Synchronizer> UserState<S> {
    pub fn from_synchronizer(sync: S, identity: Identity) -> Self {
        Self {
            identity,
            sync: Some(sync),
        }
    }

    /// A user state with no synchronizer. Anything that reads the ledger fails with
    /// [`SyncGap::Detached`] until one is attached.
    pub fn detached(identity: Identity) -> Self {
        Self {
            identity,
            sync: None,
        }
    }

    /// Attaches a synchronizer, returning the previous one.
    pub fn attach(&mut self, sync: S) -> Option<S> {
        self.sync.replace(sync)
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn commitment(&self) -> Fr {
        self.identity.commitment()
    }

    pub fn synchronizer(&self) -> Result<&S, Error> {
        self.sync
            .as_ref()
            .ok_or(Error::NotSynchronized(SyncGap::Detached))
    }

    pub async fn start(&self) -> Result<(), Error> {
        self.synchronizer()?.start().await
    }

    pub async fn stop(&self) -> Result<(), Error> {
        self.synchronizer()?.stop().await;
        Ok(())
    }

    pub async fn wait_for_sync(&self, height: Option<u64>) -> Result<(), Error> {
        self.synchronizer()?.wait_for_sync(height).await
    }

    /// Resolves an optional attester id against the synchronizer.
    pub fn resolve_attester(&self, attester_id: Option<AttesterId>) -> Result<AttesterId, Error> {
        let sync = self.synchronizer()?;
        match attester_id {
            None => Ok(sync.default_attester_id()),
            Some(id) => {
                sync.check_attester_id(&id)?;
                Ok(id)
            }
        }
    }

    fn builder<'a>(&self, sync: &'a S) -> TreeBuilder<'a, S::Ledger, ProtocolHash> {
        TreeBuilder::new(sync.ledger(), sync.settings())
    }

    fn aggregator(sync: &S) -> Aggregator {
        let settings = sync.settings();
        Aggregator::new(settings.field_count, settings.sum_field_count)
    }

    fn epoch_key_at(&self, attester_id: AttesterId, epoch: Epoch, nonce: u64) -> EpochKey<Fr> {
        protocol::epoch_key::<Fr, ProtocolHash>(
            self.identity.secret(),
            attester_id.to_field(),
            epoch,
            nonce,
        )
    }

    fn epoch_keys_at(&self, sync: &S, attester_id: AttesterId, epoch: Epoch) -> Vec<EpochKey<Fr>> {
        (0..sync.settings().num_epoch_key_nonce_per_epoch as u64)
            .map(|nonce| self.epoch_key_at(attester_id, epoch, nonce))
            .collect()
    }

    async fn signup_record(
        &self,
        sync: &S,
        attester_id: AttesterId,
    ) -> Result<Option<UserSignUp>, Error> {
        Ok(sync
            .ledger()
            .find_one::<UserSignUp>(
                &Query::new()
                    .eq("commitment", self.commitment())
                    .eq("attesterId", attester_id),
            )
            .await?)
    }

    /// Whether the ledger holds a signup of this user with the attester.
    pub async fn has_signed_up(&self, attester_id: Option<AttesterId>) -> Result<bool, Error> {
        let attester_id = self.resolve_attester(attester_id)?;
        let sync = self.synchronizer()?;
        Ok(self.signup_record(sync, attester_id).await?.is_some())
    }

    /// The epoch whose state tree holds the leaf currently representing this user.
    ///
    /// Scans down from the attester's confirmed epoch for the newest spent nullifier of this
    /// user and returns the epoch that transition went into. With no transitions this is the
    /// signup epoch, and 0 for a user that never signed up.
    pub async fn latest_transitioned_epoch(
        &self,
        attester_id: Option<AttesterId>,
    ) -> Result<Epoch, Error> {
        let attester_id = self.resolve_attester(attester_id)?;
        let sync = self.synchronizer()?;
        self.latest_transitioned_epoch_of(sync, attester_id).await
    }

    async fn latest_transitioned_epoch_of(
        &self,
        sync: &S,
        attester_id: AttesterId,
    ) -> Result<Epoch, Error> {
        let current = sync.load_current_epoch(&attester_id).await?;
        let secret = self.identity.secret();
        let nonce_count = sync.settings().num_epoch_key_nonce_per_epoch;

        for x in (0..=current).rev() {
            let candidates = protocol::nullifier_candidates::<Fr, ProtocolHash>(
                secret,
                attester_id.to_field(),
                x,
                nonce_count,
            );
            let spent = sync
                .ledger()
                .find_one::<Nullifier>(
                    &Query::new()
                        .eq("attesterId", attester_id)
                        .one_of("nullifier", candidates),
                )
                .await?;
            if let Some(n) = spent {
                if n.epoch != 0 {
                    return Ok(n.epoch);
                }
                break;
            }
        }

        Ok(self
            .signup_record(sync, attester_id)
            .await?
            .map(|s| s.epoch)
            .unwrap_or(0))
    }

    /// Index of the user's leaf in the state tree of `epoch` (default: the current epoch).
    ///
    /// `None` means the leaf cannot be proven yet: the user has not signed up, has not
    /// transitioned into `epoch`, or the leaf has not been replayed. Only the last case resolves
    /// by waiting for the synchronizer.
    pub async fn latest_state_tree_leaf_index(
        &self,
        epoch: Option<Epoch>,
        attester_id: Option<AttesterId>,
    ) -> Result<Option<usize>, Error> {
        let attester_id = self.resolve_attester(attester_id)?;
        let sync = self.synchronizer()?;
        let epoch = match epoch {
            Some(epoch) => epoch,
            None => sync.calc_current_epoch(&attester_id)?,
        };
        self.state_tree_leaf_index_of(sync, attester_id, epoch).await
    }

    async fn state_tree_leaf_index_of(
        &self,
        sync: &S,
        attester_id: AttesterId,
        epoch: Epoch,
    ) -> Result<Option<usize>, Error> {
        if self.signup_record(sync, attester_id).await?.is_none() {
            return Ok(None);
        }
        let latest = self.latest_transitioned_epoch_of(sync, attester_id).await?;
        if latest != epoch {
            return Ok(None);
        }

        // the leaf commits to what was provable when it was inserted
        let data = self
            .data_through(sync, attester_id, latest.checked_sub(1))
            .await?;
        let leaf = protocol::state_tree_leaf::<Fr, ProtocolHash>(
            self.identity.secret(),
            attester_id.to_field(),
            latest,
            &data,
        );
        let found = sync
            .ledger()
            .find_one::<StateTreeLeaf>(
                &Query::new()
                    .eq("attesterId", attester_id)
                    .eq("epoch", epoch)
                    .eq("hash", leaf),
            )
            .await?;
        Ok(found.map(|l| l.index as usize))
    }

    /// The user's data, aggregated over every epoch up to and including `to_epoch` (default: the
    /// latest transitioned epoch).
    ///
    /// Only epochs the user held a state leaf in count: the signup epoch and every epoch a
    /// transition went into. Attestations made at signup always count.
    pub async fn get_data(
        &self,
        to_epoch: Option<Epoch>,
        attester_id: Option<AttesterId>,
    ) -> Result<DataVector<Fr>, Error> {
        let attester_id = self.resolve_attester(attester_id)?;
        let sync = self.synchronizer()?;
        let to_epoch = match to_epoch {
            // nothing can be attested past the current epoch
            Some(epoch) => epoch.min(sync.load_current_epoch(&attester_id).await?),
            None => self.latest_transitioned_epoch_of(sync, attester_id).await?,
        };
        self.data_through(sync, attester_id, Some(to_epoch)).await
    }

    /// Data the user can prove right now: everything before the latest transitioned epoch.
    pub async fn get_provable_data(
        &self,
        attester_id: Option<AttesterId>,
    ) -> Result<DataVector<Fr>, Error> {
        let attester_id = self.resolve_attester(attester_id)?;
        let sync = self.synchronizer()?;
        let latest = self.latest_transitioned_epoch_of(sync, attester_id).await?;
        self.data_through(sync, attester_id, latest.checked_sub(1))
            .await
    }

    /// Aggregates through `to_epoch`. `None` stands for "before epoch 0", which leaves only the
    /// attestations made at signup.
    async fn data_through(
        &self,
        sync: &S,
        attester_id: AttesterId,
        to_epoch: Option<Epoch>,
    ) -> Result<DataVector<Fr>, Error> {
        let aggregator = Self::aggregator(sync);
        let signup = self.signup_record(sync, attester_id).await?;

        let mut clauses = Vec::new();
        if let Some(signup) = &signup {
            clauses.push(
                Query::new()
                    .eq("epochKey", signup.commitment)
                    .eq("epoch", MAX_EPOCH),
            );
        }

        let first = signup.as_ref().map(|s| s.epoch).unwrap_or(0);
        if let Some(to_epoch) = to_epoch.filter(|to| *to >= first) {
            let secret = self.identity.secret();
            let nonce_count = sync.settings().num_epoch_key_nonce_per_epoch;
            let candidates = (first..=to_epoch)
                .flat_map(|x| {
                    protocol::nullifier_candidates::<Fr, ProtocolHash>(
                        secret,
                        attester_id.to_field(),
                        x,
                        nonce_count,
                    )
                })
                .collect::<Vec<_>>();
            let entered = sync
                .ledger()
                .find_many::<Nullifier>(
                    &Query::new()
                        .eq("attesterId", attester_id)
                        .one_of("nullifier", candidates),
                )
                .await?
                .into_iter()
                .map(|n| n.epoch)
                .collect::<HashSet<_>>();

            for x in first..=to_epoch {
                let signed_up_in_x = signup.as_ref().is_some_and(|s| s.epoch == x);
                if !entered.contains(&x) && !signed_up_in_x {
                    continue;
                }
                clauses.push(
                    Query::new()
                        .one_of("epochKey", self.epoch_keys_at(sync, attester_id, x))
                        .eq("epoch", x),
                );
            }
        }

        if clauses.is_empty() {
            return Ok(aggregator.zero());
        }

        let attestations = sync
            .ledger()
            .find_many::<Attestation>(
                &Query::new()
                    .or(clauses)
                    .eq("attesterId", attester_id)
                    .order_by("index", Order::Asc),
            )
            .await?;
        tracing::debug!(
            %attester_id,
            ?to_epoch,
            attestations = attestations.len(),
            "aggregating user data"
        );
        aggregator.aggregate(attestations.into_iter().map(|a| (a.field_index, a.change)))
    }

    /// Data attested to a single epoch key during `epoch`.
    pub async fn get_data_by_epoch_key(
        &self,
        epoch_key: EpochKey<Fr>,
        epoch: Epoch,
        attester_id: Option<AttesterId>,
    ) -> Result<DataVector<Fr>, Error> {
        let attester_id = self.resolve_attester(attester_id)?;
        let sync = self.synchronizer()?;
        self.data_by_epoch_key_of(sync, attester_id, epoch, epoch_key)
            .await
    }

    async fn data_by_epoch_key_of(
        &self,
        sync: &S,
        attester_id: AttesterId,
        epoch: Epoch,
        epoch_key: EpochKey<Fr>,
    ) -> Result<DataVector<Fr>, Error> {
        let attestations = self
            .attestations_to_key(sync, attester_id, epoch, epoch_key)
            .await?;
        Self::aggregator(sync)
            .aggregate(attestations.into_iter().map(|a| (a.field_index, a.change)))
    }

    async fn attestations_to_key(
        &self,
        sync: &S,
        attester_id: AttesterId,
        epoch: Epoch,
        epoch_key: EpochKey<Fr>,
    ) -> Result<Vec<Attestation>, Error> {
        Ok(sync
            .ledger()
            .find_many::<Attestation>(
                &Query::new()
                    .eq("epoch", epoch)
                    .eq("epochKey", epoch_key)
                    .eq("attesterId", attester_id)
                    .order_by("index", Order::Asc),
            )
            .await?)
    }

    /// The epoch key for `nonce` in `epoch` (default: the current epoch).
    pub fn get_epoch_key(
        &self,
        epoch: Option<Epoch>,
        nonce: u64,
        attester_id: Option<AttesterId>,
    ) -> Result<EpochKey<Fr>, Error> {
        let attester_id = self.resolve_attester(attester_id)?;
        let sync = self.synchronizer()?;
        let epoch = match epoch {
            Some(epoch) => epoch,
            None => sync.calc_current_epoch(&attester_id)?,
        };
        protocol::checked_epoch_key::<Fr, ProtocolHash>(
            self.identity.secret(),
            attester_id.to_field(),
            epoch,
            nonce,
            sync.settings().num_epoch_key_nonce_per_epoch,
        )
    }

    /// Every epoch key of `epoch` (default: the current epoch), in nonce order.
    pub fn get_epoch_keys(
        &self,
        epoch: Option<Epoch>,
        attester_id: Option<AttesterId>,
    ) -> Result<Vec<EpochKey<Fr>>, Error> {
        let attester_id = self.resolve_attester(attester_id)?;
        let sync = self.synchronizer()?;
        let epoch = match epoch {
            Some(epoch) => epoch,
            None => sync.calc_current_epoch(&attester_id)?,
        };
        Ok(self.epoch_keys_at(sync, attester_id, epoch))
    }

    /// Position of `epoch_key` among the distinct keys attested to during `epoch`, in order of
    /// first attestation. This is the key's leaf index in the epoch tree; `None` if the key
    /// received nothing.
    pub async fn get_epoch_key_index(
        &self,
        epoch: Epoch,
        epoch_key: EpochKey<Fr>,
        attester_id: Option<AttesterId>,
    ) -> Result<Option<usize>, Error> {
        let attester_id = self.resolve_attester(attester_id)?;
        let sync = self.synchronizer()?;
        let attestations = sync
            .ledger()
            .find_many::<Attestation>(
                &Query::new()
                    .eq("epoch", epoch)
                    .eq("attesterId", attester_id)
                    .order_by("index", Order::Asc),
            )
            .await?;
        Ok(crate::generic::trees::distinct_epoch_keys(&attestations)
            .iter()
            .position(|k| *k == epoch_key))
    }

    /// State tree path to the user's leaf in `epoch`.
    async fn state_path(
        &self,
        sync: &S,
        attester_id: AttesterId,
        epoch: Epoch,
    ) -> Result<MerkleProof<Fr>, Error> {
        let index = match self.state_tree_leaf_index_of(sync, attester_id, epoch).await? {
            Some(index) => index,
            None => return Err(self.missing_leaf(sync, attester_id, epoch).await?),
        };
        let tree = self.builder(sync).state_tree(attester_id, epoch).await?;
        Ok(tree.create_proof(index)?)
    }

    /// Why the user has no provable state leaf in `epoch`. Only a leaf the synchronizer has yet
    /// to replay is worth waiting for.
    async fn missing_leaf(
        &self,
        sync: &S,
        attester_id: AttesterId,
        epoch: Epoch,
    ) -> Result<Error, Error> {
        if self.signup_record(sync, attester_id).await?.is_none() {
            return Ok(Error::NotSynchronized(SyncGap::NotSignedUp { attester_id }));
        }
        let latest = self.latest_transitioned_epoch_of(sync, attester_id).await?;
        let gap = if epoch < latest {
            SyncGap::EpochSuperseded {
                attester_id,
                epoch,
                latest,
            }
        } else {
            SyncGap::StateTreeLeaf { attester_id, epoch }
        };
        Ok(Error::NotSynchronized(gap))
    }

    #[tracing::instrument(skip_all)]
    pub async fn build_signup_witness(&self, options: SignupOptions) -> Result<SignupWitness, Error> {
        let attester_id = self.resolve_attester(options.attester_id)?;
        let sync = self.synchronizer()?;
        let epoch = match options.epoch {
            Some(epoch) => epoch,
            None => sync.calc_current_epoch(&attester_id)?,
        };
        Ok(SignupWitness {
            epoch,
            identity_nullifier: self.identity.nullifier,
            identity_trapdoor: self.identity.trapdoor,
            attester_id,
        })
    }

    pub async fn gen_signup_proof(&self, options: SignupOptions) -> Result<SignupProof, Error> {
        let witness = self.build_signup_witness(options).await?;
        self.prove(&witness).await
    }

    #[tracing::instrument(skip_all)]
    pub async fn build_epoch_key_witness(
        &self,
        options: EpochKeyOptions,
    ) -> Result<EpochKeyWitness, Error> {
        let attester_id = self.resolve_attester(options.attester_id)?;
        let sync = self.synchronizer()?;
        let nonce = protocol::check_nonce(options.nonce, sync.settings().num_epoch_key_nonce_per_epoch)?;
        let epoch = match options.epoch {
            Some(epoch) => epoch,
            None => self.latest_transitioned_epoch_of(sync, attester_id).await?,
        };

        let path = self.state_path(sync, attester_id, epoch).await?;
        let data = self
            .data_through(sync, attester_id, epoch.checked_sub(1))
            .await?;
        Ok(EpochKeyWitness {
            identity_secret: self.identity.secret(),
            data,
            sig_data: options.sig_data.unwrap_or_default(),
            state_tree_elements: path.siblings,
            state_tree_indexes: path.path_indices,
            epoch,
            nonce,
            attester_id,
            reveal_nonce: options.reveal_nonce as u8,
        })
    }

    pub async fn gen_epoch_key_proof(&self, options: EpochKeyOptions) -> Result<EpochKeyProof, Error> {
        let witness = self.build_epoch_key_witness(options).await?;
        self.prove(&witness).await
    }

    #[tracing::instrument(skip_all)]
    pub async fn build_epoch_key_lite_witness(
        &self,
        options: EpochKeyOptions,
    ) -> Result<EpochKeyLiteWitness, Error> {
        let attester_id = self.resolve_attester(options.attester_id)?;
        let sync = self.synchronizer()?;
        let nonce = protocol::check_nonce(options.nonce, sync.settings().num_epoch_key_nonce_per_epoch)?;
        let epoch = match options.epoch {
            Some(epoch) => epoch,
            None => self.latest_transitioned_epoch_of(sync, attester_id).await?,
        };
        Ok(EpochKeyLiteWitness {
            identity_secret: self.identity.secret(),
            sig_data: options.sig_data.unwrap_or_default(),
            epoch,
            nonce,
            attester_id,
            reveal_nonce: options.reveal_nonce as u8,
        })
    }

    pub async fn gen_epoch_key_lite_proof(
        &self,
        options: EpochKeyOptions,
    ) -> Result<EpochKeyLiteProof, Error> {
        let witness = self.build_epoch_key_lite_witness(options).await?;
        self.prove(&witness).await
    }

    /// Reputation witness at the latest transitioned epoch.
    #[tracing::instrument(skip_all)]
    pub async fn build_reputation_witness(
        &self,
        options: ReputationOptions,
    ) -> Result<ReputationWitness, Error> {
        let attester_id = self.resolve_attester(options.attester_id)?;
        let sync = self.synchronizer()?;
        let nonce = protocol::check_nonce(options.nonce, sync.settings().num_epoch_key_nonce_per_epoch)?;
        let epoch = self.latest_transitioned_epoch_of(sync, attester_id).await?;

        let path = self.state_path(sync, attester_id, epoch).await?;
        let data = self
            .data_through(sync, attester_id, epoch.checked_sub(1))
            .await?;

        let min_rep = options.min_rep.unwrap_or(0);
        let max_rep = options.max_rep.unwrap_or(0);
        let graffiti = options.graffiti_pre_image.unwrap_or_default();
        Ok(ReputationWitness {
            identity_secret: self.identity.secret(),
            state_tree_indexes: path.path_indices,
            state_tree_elements: path.siblings,
            data,
            prove_graffiti: (graffiti != Fr::from(0u64)) as u8,
            graffiti_pre_image: graffiti,
            reveal_nonce: options.reveal_nonce as u8,
            attester_id,
            epoch,
            nonce,
            min_rep,
            max_rep,
            prove_min_rep: (min_rep != 0) as u8,
            prove_max_rep: (max_rep != 0) as u8,
            prove_zero_rep: options.prove_zero_rep as u8,
            sig_data: options.sig_data.unwrap_or_default(),
        })
    }

    pub async fn gen_reputation_proof(
        &self,
        options: ReputationOptions,
    ) -> Result<ReputationProof, Error> {
        let witness = self.build_reputation_witness(options).await?;
        self.prove(&witness).await
    }

    /// Builds the witness moving the user from their latest transitioned epoch to
    /// `options.to_epoch`.
    ///
    /// The steps are:
    /// 1. The source epoch is the latest transitioned epoch, and the carried data is what was
    ///    provable there.
    /// 2. The state and epoch trees of the source epoch are replayed.
    /// 3. The history leaf `H(state_root, epoch_root)` of the source epoch is located. If the
    ///    epoch has not been sealed yet, the leaf is appended locally and the path is marked
    ///    [`PathKind::Speculative`].
    /// 4. For each epoch key of the source epoch, the data attested to it and its epoch tree
    ///    path are collected. Keys that received nothing get the path of the first slot and a
    ///    zero data vector.
    /// 5. The path to the user's current state leaf is taken from the source state tree.
    #[tracing::instrument(skip_all)]
    pub async fn build_user_state_transition_witness(
        &self,
        options: TransitionOptions,
    ) -> Result<TransitionInputs, Error> {
        let attester_id = self.resolve_attester(options.attester_id)?;
        let sync = self.synchronizer()?;

        // (1)
        let from_epoch = self.latest_transitioned_epoch_of(sync, attester_id).await?;
        let data = self
            .data_through(sync, attester_id, from_epoch.checked_sub(1))
            .await?;
        let to_epoch = match options.to_epoch {
            Some(epoch) => epoch,
            None => sync.calc_current_epoch(&attester_id)?,
        };
        if to_epoch == from_epoch {
            return Err(Error::SameEpochTransition(from_epoch));
        }

        // (2)
        let builder = self.builder(sync);
        let epoch_tree = builder.epoch_tree(attester_id, from_epoch).await?;
        let state_tree = builder.state_tree(attester_id, from_epoch).await?;

        // (3)
        let sealed = sync.load_current_epoch(&attester_id).await? > from_epoch;
        let history = builder
            .history_path(
                attester_id,
                from_epoch,
                state_tree.root(),
                epoch_tree.root(),
                sealed,
            )
            .await?;

        // (4)
        let epoch_keys = self.epoch_keys_at(sync, attester_id, from_epoch);
        let per_key = try_join_all(epoch_keys.iter().map(|&epoch_key| {
            let epoch_tree = &epoch_tree;
            async move {
                let attestations = self
                    .attestations_to_key(sync, attester_id, from_epoch, epoch_key)
                    .await?;
                let aggregator = Self::aggregator(sync);
                let replace_positions = aggregator
                    .replace_positions(attestations.iter().map(|a| (a.field_index, a.index)));
                let new_data = aggregator
                    .aggregate(attestations.into_iter().map(|a| (a.field_index, a.change)))?;
                let leaf_index = epoch_tree.index_of(&epoch_key);
                let path = match leaf_index {
                    Some(i) => epoch_tree.tree.create_proof(i)?,
                    None => epoch_tree.tree.padded_proof(0)?,
                };
                Ok::<_, Error>((
                    EpochKeyTransition {
                        epoch_key,
                        has_changes: has_changes(&new_data),
                        new_data,
                        replace_positions,
                        leaf_index,
                    },
                    path,
                ))
            }
        }))
        .await?;

        // (5)
        let state_index = match self
            .state_tree_leaf_index_of(sync, attester_id, from_epoch)
            .await?
        {
            Some(index) => index,
            None => return Err(self.missing_leaf(sync, attester_id, from_epoch).await?),
        };
        let state_path = state_tree.create_proof(state_index)?;

        tracing::info!(
            %attester_id,
            from_epoch,
            to_epoch,
            history = ?history.kind,
            changed = per_key.iter().filter(|(k, _)| k.has_changes).count(),
            "built user state transition witness"
        );

        let (epoch_keys, paths): (Vec<_>, Vec<_>) = per_key.into_iter().unzip();
        let witness = UserStateTransitionWitness {
            from_epoch,
            to_epoch,
            identity_secret: self.identity.secret(),
            state_tree_indexes: state_path.path_indices,
            state_tree_elements: state_path.siblings,
            attester_id,
            history_tree_indices: history.proof.path_indices,
            history_tree_elements: history.proof.siblings,
            data,
            new_data: epoch_keys.iter().map(|k| k.new_data.clone()).collect(),
            replace_positions: epoch_keys
                .iter()
                .map(|k| k.replace_positions.clone())
                .collect(),
            epoch_tree_elements: paths.iter().map(|p| p.siblings.clone()).collect(),
            epoch_tree_indices: paths.into_iter().map(|p| p.path_indices).collect(),
            epoch_tree_root: epoch_tree.root(),
        };
        Ok(TransitionInputs {
            witness,
            history: history.kind,
            history_leaf_index: history.leaf_index,
            epoch_keys,
        })
    }

    /// Proves a user state transition. The returned [`PathKind`] says whether the proof relies on
    /// a history leaf the chain has not appended yet.
    pub async fn gen_user_state_transition_proof(
        &self,
        options: TransitionOptions,
    ) -> Result<(UserStateTransitionProof, PathKind), Error> {
        let inputs = self.build_user_state_transition_witness(options).await?;
        let proof = self.prove(&inputs.witness).await?;
        Ok((proof, inputs.history))
    }

    #[tracing::instrument(skip_all)]
    pub async fn build_data_witness(&self, options: DataOptions) -> Result<ProveDataWitness, Error> {
        let attester_id = self.resolve_attester(options.attester_id)?;
        let sync = self.synchronizer()?;
        let nonce = protocol::check_nonce(options.nonce, sync.settings().num_epoch_key_nonce_per_epoch)?;
        let epoch = match options.epoch {
            Some(epoch) => epoch,
            None => self.latest_transitioned_epoch_of(sync, attester_id).await?,
        };

        let path = self.state_path(sync, attester_id, epoch).await?;
        let data = self
            .data_through(sync, attester_id, epoch.checked_sub(1))
            .await?;
        Ok(ProveDataWitness {
            identity_secret: self.identity.secret(),
            state_tree_indexes: path.path_indices,
            state_tree_elements: path.siblings,
            data,
            epoch,
            nonce,
            attester_id,
            reveal_nonce: options.reveal_nonce as u8,
        })
    }

    pub async fn gen_data_proof(&self, options: DataOptions) -> Result<DataProof, Error> {
        let witness = self.build_data_witness(options).await?;
        self.prove(&witness).await
    }

    async fn prove<W: Witness, P: ProofWrapper>(&self, witness: &W) -> Result<P, Error> {
        let sync = self.synchronizer()?;
        let output = sync
            .prover()
            .gen_proof_and_public_signals(W::CIRCUIT, witness.to_json()?)
            .await?;
        tracing::info!(circuit = %W::CIRCUIT, signals = output.public_signals.len(), "proof generated");
        Ok(P::from_output(output)?)
    }
}
