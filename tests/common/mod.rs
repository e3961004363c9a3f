#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use unirep_state::config::{AttesterConfig, Settings, SyncConfig};
use unirep_state::generic::object::AttesterId;
use unirep_state::generic::sync::Synchronizer;
use unirep_state::generic::trees::PathKind;
use unirep_state::generic::user::{SignupOptions, TransitionOptions};
use unirep_state::impls::centralized::LocalSynchronizer;
use unirep_state::impls::dummy::DummyProver;
use unirep_state::proofs::UserStateTransitionProof;
use unirep_state::{Identity, UserState};

pub const START: u64 = 1_000;
pub const EPOCH_LENGTH: u64 = 100;

pub type SharedSync = Arc<LocalSynchronizer<DummyProver>>;
pub type User = UserState<SharedSync>;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Four fields: positive and negative reputation are summed, graffiti and a timestamp are
/// replaced.
pub fn settings() -> Settings {
    Settings {
        field_count: 4,
        sum_field_count: 2,
        num_epoch_key_nonce_per_epoch: 2,
        state_tree_depth: 5,
        epoch_tree_depth: 3,
        epoch_tree_arity: 2,
        history_tree_depth: 4,
        chain_id: 1,
    }
}

pub fn attester() -> AttesterId {
    AttesterId::from(0x1234u64)
}

pub fn other_attester() -> AttesterId {
    AttesterId::from(0x5678u64)
}

pub fn config() -> SyncConfig {
    SyncConfig {
        settings: settings(),
        attesters: vec![
            AttesterConfig {
                attester_id: attester(),
                start_timestamp: START,
                epoch_length: EPOCH_LENGTH,
            },
            AttesterConfig {
                attester_id: other_attester(),
                start_timestamp: START,
                epoch_length: EPOCH_LENGTH * 2,
            },
        ],
    }
}

pub fn identity(seed: u64) -> Identity {
    Identity::new(&mut StdRng::seed_from_u64(seed))
}

/// A started local chain with a hand-driven clock.
pub struct Chain {
    pub sync: SharedSync,
    pub clock: Arc<AtomicU64>,
}

impl Chain {
    pub async fn new() -> Self {
        Self::with_prover(DummyProver::new(settings())).await
    }

    pub async fn with_prover(prover: DummyProver) -> Self {
        init_tracing();
        let clock = Arc::new(AtomicU64::new(START));
        let now = clock.clone();
        let sync = LocalSynchronizer::new(config(), prover)
            .unwrap()
            .with_clock(move || now.load(Ordering::SeqCst));
        let sync = Arc::new(sync);
        sync.start().await.unwrap();
        Self { sync, clock }
    }

    pub fn user(&self, seed: u64) -> User {
        UserState::from_synchronizer(self.sync.clone(), identity(seed))
    }

    /// Moves the wall clock forward by whole epochs of the default attester.
    pub fn pass_epochs(&self, n: u64) {
        self.clock.fetch_add(n * EPOCH_LENGTH, Ordering::SeqCst);
    }

    pub async fn sign_up(&self, user: &User) -> u64 {
        let proof = user.gen_signup_proof(SignupOptions::default()).await.unwrap();
        self.sync.submit_signup(&proof).await.unwrap()
    }

    pub async fn transition(&self, user: &User) -> (UserStateTransitionProof, PathKind) {
        let (proof, kind) = user
            .gen_user_state_transition_proof(TransitionOptions::default())
            .await
            .unwrap();
        self.sync.submit_user_state_transition(&proof).await.unwrap();
        (proof, kind)
    }
}
