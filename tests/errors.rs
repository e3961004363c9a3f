mod common;

use common::{attester, identity, other_attester, settings, Chain, SharedSync};
use unirep_state::error::{Error, SyncGap};
use unirep_state::generic::object::AttesterId;
use unirep_state::generic::prover::{Circuit, ProverError};
use unirep_state::generic::sync::Synchronizer;
use unirep_state::generic::user::{EpochKeyOptions, SignupOptions, TransitionOptions};
use unirep_state::impls::dummy::DummyProver;
use unirep_state::{Fr, UserState};

#[tokio::test]
async fn detached_engine_is_not_retryable() {
    let chain = Chain::new().await;
    let mut user = UserState::<SharedSync>::detached(identity(1));

    let err = user.has_signed_up(None).await.unwrap_err();
    assert!(matches!(err, Error::NotSynchronized(SyncGap::Detached)));
    assert!(!err.is_retryable());
    assert!(user.get_epoch_keys(Some(0), None).is_err());

    assert!(user.attach(chain.sync.clone()).is_none());
    assert!(!user.has_signed_up(None).await.unwrap());
}

#[tokio::test]
async fn unknown_attester_is_rejected_everywhere() {
    let chain = Chain::new().await;
    let user = chain.user(1);
    let stranger = AttesterId::from(99u64);

    assert!(matches!(
        user.resolve_attester(Some(stranger)),
        Err(Error::UnknownAttester(id)) if id == stranger
    ));
    assert!(matches!(
        user.get_data(None, Some(stranger)).await,
        Err(Error::UnknownAttester(_))
    ));
    assert!(matches!(
        chain.sync.attest(stranger, 0, Fr::from(1u64), 0, Fr::from(1u64)).await,
        Err(Error::UnknownAttester(_))
    ));
    assert_eq!(user.resolve_attester(None).unwrap(), attester());
    assert_eq!(user.resolve_attester(Some(other_attester())).unwrap(), other_attester());
}

#[tokio::test]
async fn nonce_must_stay_below_the_per_epoch_count() {
    let chain = Chain::new().await;
    let user = chain.user(1);
    chain.sign_up(&user).await;

    assert!(matches!(
        user.get_epoch_key(None, 2, None),
        Err(Error::InvalidNonce { nonce: 2, max: 2 })
    ));
    let err = user
        .gen_epoch_key_proof(EpochKeyOptions {
            nonce: 2,
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidNonce { .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn proving_an_epoch_not_yet_entered_is_retryable() {
    let chain = Chain::new().await;
    let user = chain.user(1);
    chain.sign_up(&user).await;
    chain.pass_epochs(1);

    let err = user
        .gen_epoch_key_proof(EpochKeyOptions {
            epoch: Some(1),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::NotSynchronized(SyncGap::StateTreeLeaf { epoch: 1, .. })
    ));
    assert!(err.is_retryable());

    chain.transition(&user).await;
    user.gen_epoch_key_proof(EpochKeyOptions {
        epoch: Some(1),
        ..Default::default()
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn transition_needs_a_later_epoch() {
    let chain = Chain::new().await;
    let user = chain.user(1);
    chain.sign_up(&user).await;

    let err = user
        .gen_user_state_transition_proof(TransitionOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SameEpochTransition(0)));
}

#[tokio::test]
async fn a_nullifier_is_spent_once() {
    let chain = Chain::new().await;
    let user = chain.user(1);
    chain.sign_up(&user).await;
    chain.pass_epochs(1);

    let (proof, _) = chain.transition(&user).await;
    assert!(matches!(
        chain.sync.submit_user_state_transition(&proof).await,
        Err(Error::NullifierSpent)
    ));
}

#[tokio::test]
async fn chain_rejects_bad_events() {
    let chain = Chain::new().await;
    let user = chain.user(1);
    chain.sign_up(&user).await;

    let proof = user.gen_signup_proof(SignupOptions::default()).await.unwrap();
    assert!(matches!(
        chain.sync.submit_signup(&proof).await,
        Err(Error::AlreadySignedUp(_))
    ));

    let mut forged = chain.user(2).gen_signup_proof(SignupOptions::default()).await.unwrap();
    forged.public_signals[1] = Fr::from(1u64);
    assert!(matches!(
        chain.sync.submit_signup(&forged).await,
        Err(Error::InvalidProof(Circuit::Signup))
    ));

    let epk = user.get_epoch_key(None, 0, None).unwrap();
    assert!(matches!(
        chain.sync.attest(attester(), 0, epk, settings().field_count, Fr::from(1u64)).await,
        Err(Error::FieldIndexOutOfRange { .. })
    ));

    chain.pass_epochs(1);
    assert!(matches!(
        chain.sync.attest(attester(), 0, epk, 0, Fr::from(1u64)).await,
        Err(Error::EpochMismatch { expected: 1, got: 0, .. })
    ));
}

#[tokio::test]
async fn stopped_synchronizer_takes_no_events() {
    let chain = Chain::new().await;
    let user = chain.user(1);
    chain.sync.stop().await;

    let proof = user.gen_signup_proof(SignupOptions::default()).await.unwrap();
    assert!(matches!(
        chain.sync.submit_signup(&proof).await,
        Err(Error::Stopped)
    ));
    assert!(matches!(chain.sync.end_epoch(attester()).await, Err(Error::Stopped)));
    assert!(matches!(
        user.wait_for_sync(Some(1)).await,
        Err(Error::Stopped)
    ));

    user.start().await.unwrap();
    chain.sign_up(&user).await;
    user.wait_for_sync(Some(1)).await.unwrap();
}

#[tokio::test]
async fn prover_failures_surface_as_errors() {
    let chain = Chain::with_prover(DummyProver::failing(settings(), "out of memory")).await;
    let user = chain.user(1);

    let err = user
        .gen_epoch_key_lite_proof(EpochKeyOptions::default())
        .await
        .unwrap_err();
    match err {
        Error::Prover(ProverError::Failure { circuit, reason }) => {
            assert_eq!(circuit, Circuit::EpochKeyLite);
            assert_eq!(reason, "out of memory");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(chain.sync.prover().witnesses().len(), 1);
}

#[tokio::test]
async fn missing_signup_is_not_worth_waiting_for() {
    let chain = Chain::new().await;
    let user = chain.user(1);

    let err = user
        .gen_epoch_key_proof(EpochKeyOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::NotSynchronized(SyncGap::NotSignedUp { attester_id }) if attester_id == attester()
    ));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn epochs_left_behind_are_not_provable() {
    let chain = Chain::new().await;
    let user = chain.user(1);
    chain.sign_up(&user).await;
    chain.pass_epochs(1);
    chain.transition(&user).await;

    let err = user
        .gen_epoch_key_proof(EpochKeyOptions {
            epoch: Some(0),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::NotSynchronized(SyncGap::EpochSuperseded { epoch: 0, latest: 1, .. })
    ));
    assert!(!err.is_retryable());
}
