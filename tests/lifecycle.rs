mod common;

use common::{attester, settings, Chain};
use unirep_state::crypto::hash::HasherZK;
use unirep_state::error::Error;
use unirep_state::generic::ledger::{Ledger, Nullifier, Query};
use unirep_state::generic::prover::ProverError;
use unirep_state::generic::sync::Synchronizer;
use unirep_state::generic::trees::{PathKind, TreeBuilder};
use unirep_state::generic::user::{
    DataOptions, EpochKeyOptions, ReputationOptions, TransitionOptions,
};
use unirep_state::proofs::ProofWrapper;
use unirep_state::{Fr, ProtocolHash};

fn zeros() -> Vec<Fr> {
    vec![Fr::from(0u64); settings().field_count]
}

#[tokio::test]
async fn signup_makes_the_user_provable() {
    let chain = Chain::new().await;
    let user = chain.user(1);

    assert!(!user.has_signed_up(None).await.unwrap());
    assert_eq!(user.latest_state_tree_leaf_index(None, None).await.unwrap(), None);

    assert_eq!(chain.sign_up(&user).await, 0);
    let other = chain.user(2);
    assert_eq!(chain.sign_up(&other).await, 1);

    assert!(user.has_signed_up(None).await.unwrap());
    assert_eq!(user.latest_transitioned_epoch(None).await.unwrap(), 0);
    assert_eq!(user.latest_state_tree_leaf_index(None, None).await.unwrap(), Some(0));
    assert_eq!(other.latest_state_tree_leaf_index(None, None).await.unwrap(), Some(1));
    assert_eq!(user.get_data(None, None).await.unwrap(), zeros());
    assert_eq!(user.get_provable_data(None).await.unwrap(), zeros());
}

#[tokio::test]
async fn epoch_key_proof_opens_the_state_tree() {
    let chain = Chain::new().await;
    let user = chain.user(1);
    chain.sign_up(&user).await;

    let proof = user
        .gen_epoch_key_proof(EpochKeyOptions {
            nonce: 1,
            sig_data: Some(Fr::from(77u64)),
            reveal_nonce: true,
            ..Default::default()
        })
        .await
        .unwrap();

    let state_tree = TreeBuilder::<_, ProtocolHash>::new(chain.sync.ledger(), chain.sync.settings())
        .state_tree(attester(), 0)
        .await
        .unwrap();
    assert_eq!(proof.state_tree_root, state_tree.root());
    assert_eq!(proof.epoch_key, user.get_epoch_key(Some(0), 1, None).unwrap());
    assert_eq!(proof.nonce, 1);
    assert!(proof.reveal_nonce);
    assert_eq!(proof.epoch, 0);
    assert_eq!(proof.attester_id, attester());
    assert_eq!(proof.chain_id, 1);
    assert_eq!(proof.sig_data, Fr::from(77u64));
    assert!(proof.verify(chain.sync.prover()).await.unwrap());

    let hidden = user
        .gen_epoch_key_proof(EpochKeyOptions {
            nonce: 1,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(hidden.nonce, 0);
    assert!(!hidden.reveal_nonce);
    assert_eq!(hidden.epoch_key, proof.epoch_key);
}

#[tokio::test]
async fn lite_proof_needs_no_state_leaf() {
    let chain = Chain::new().await;
    let user = chain.user(3);

    let proof = user
        .gen_epoch_key_lite_proof(EpochKeyOptions::default())
        .await
        .unwrap();
    assert_eq!(proof.epoch_key, user.get_epoch_key(Some(0), 0, None).unwrap());
    assert_eq!(proof.sig_data, Fr::from(0u64));
    assert!(proof.verify(chain.sync.prover()).await.unwrap());
}

#[tokio::test]
async fn attestations_become_provable_after_transition() {
    let chain = Chain::new().await;
    let user = chain.user(1);
    chain.sign_up(&user).await;

    let [epk0, epk1] = <[Fr; 2]>::try_from(user.get_epoch_keys(None, None).unwrap()).unwrap();
    chain.sync.attest(attester(), 0, epk0, 0, Fr::from(5u64)).await.unwrap();
    chain.sync.attest(attester(), 0, epk0, 2, Fr::from(9u64)).await.unwrap();
    chain.sync.attest(attester(), 0, epk1, 1, Fr::from(2u64)).await.unwrap();
    chain.sync.attest(attester(), 0, epk1, 0, Fr::from(1u64)).await.unwrap();

    let expected = vec![Fr::from(6u64), Fr::from(2u64), Fr::from(9u64), Fr::from(0u64)];
    assert_eq!(user.get_data(None, None).await.unwrap(), expected);
    assert_eq!(user.get_provable_data(None).await.unwrap(), zeros());
    assert_eq!(
        user.get_data_by_epoch_key(epk1, 0, None).await.unwrap(),
        vec![Fr::from(1u64), Fr::from(2u64), Fr::from(0u64), Fr::from(0u64)]
    );

    chain.pass_epochs(1);
    assert_eq!(user.latest_state_tree_leaf_index(None, None).await.unwrap(), None);

    let inputs = user
        .build_user_state_transition_witness(TransitionOptions::default())
        .await
        .unwrap();
    assert_eq!(inputs.witness.from_epoch, 0);
    assert_eq!(inputs.witness.to_epoch, 1);
    assert_eq!(inputs.history, PathKind::Speculative);
    assert_eq!(inputs.history_leaf_index, 0);
    assert_eq!(inputs.epoch_keys.len(), 2);
    assert_eq!(inputs.epoch_keys[0].leaf_index, Some(0));
    assert_eq!(inputs.epoch_keys[1].leaf_index, Some(1));
    assert!(inputs.epoch_keys.iter().all(|k| k.has_changes));

    let (proof, kind) = chain.transition(&user).await;
    assert_eq!(kind, PathKind::Speculative);
    assert_eq!(proof.to_epoch, 1);
    assert_eq!(proof.epoch_keys, vec![epk0, epk1]);

    let history = TreeBuilder::<_, ProtocolHash>::new(chain.sync.ledger(), chain.sync.settings())
        .history_tree(attester())
        .await
        .unwrap();
    assert_eq!(history.root(), proof.history_tree_root);

    let spent = chain
        .sync
        .ledger()
        .find_one::<Nullifier>(&Query::new().eq("nullifier", proof.nullifier()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(spent.epoch, 1);

    assert_eq!(user.latest_transitioned_epoch(None).await.unwrap(), 1);
    assert_eq!(user.get_provable_data(None).await.unwrap(), expected);
    assert_eq!(user.latest_state_tree_leaf_index(None, None).await.unwrap(), Some(0));
}

#[tokio::test]
async fn sealed_epoch_gives_a_confirmed_path() {
    let chain = Chain::new().await;
    let user = chain.user(4);
    chain.sign_up(&user).await;

    chain.pass_epochs(1);
    assert_eq!(chain.sync.end_epoch(attester()).await.unwrap(), 1);
    assert_eq!(chain.sync.load_current_epoch(&attester()).await.unwrap(), 1);

    let inputs = user
        .build_user_state_transition_witness(TransitionOptions::default())
        .await
        .unwrap();
    assert_eq!(inputs.history, PathKind::Confirmed);
    assert!(inputs.epoch_keys.iter().all(|k| !k.has_changes && k.leaf_index.is_none()));

    let (_, kind) = chain.transition(&user).await;
    assert_eq!(kind, PathKind::Confirmed);
    assert_eq!(user.latest_transitioned_epoch(None).await.unwrap(), 1);
}

#[tokio::test]
async fn skipped_epochs_contribute_nothing() {
    let chain = Chain::new().await;
    let user = chain.user(5);
    chain.sign_up(&user).await;

    let epk = user.get_epoch_key(None, 0, None).unwrap();
    chain.sync.attest(attester(), 0, epk, 0, Fr::from(3u64)).await.unwrap();
    chain.pass_epochs(1);
    chain.transition(&user).await;

    let epk = user.get_epoch_key(None, 1, None).unwrap();
    chain.sync.attest(attester(), 1, epk, 1, Fr::from(1u64)).await.unwrap();

    chain.pass_epochs(2);
    let (proof, _) = chain.transition(&user).await;
    assert_eq!(proof.to_epoch, 3);
    assert_eq!(user.latest_transitioned_epoch(None).await.unwrap(), 3);
    assert_eq!(
        user.get_provable_data(None).await.unwrap(),
        vec![Fr::from(3u64), Fr::from(1u64), Fr::from(0u64), Fr::from(0u64)]
    );
    assert_eq!(user.latest_state_tree_leaf_index(Some(3), None).await.unwrap(), Some(0));
    assert_eq!(user.latest_state_tree_leaf_index(Some(1), None).await.unwrap(), None);
}

#[tokio::test]
async fn reputation_proof_checks_bounds_and_graffiti() {
    let chain = Chain::new().await;
    let user = chain.user(6);
    chain.sign_up(&user).await;

    let pre_image = Fr::from(4242u64);
    let graffiti = <ProtocolHash as HasherZK<Fr>>::hash(&[pre_image]);
    let epk = user.get_epoch_key(None, 0, None).unwrap();
    chain.sync.attest(attester(), 0, epk, 0, Fr::from(10u64)).await.unwrap();
    chain.sync.attest(attester(), 0, epk, 1, Fr::from(3u64)).await.unwrap();
    chain.sync.attest(attester(), 0, epk, 2, graffiti).await.unwrap();
    chain.pass_epochs(1);
    chain.transition(&user).await;

    let witness = user
        .build_reputation_witness(ReputationOptions {
            min_rep: Some(7),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(witness.prove_min_rep, 1);
    assert_eq!(witness.prove_max_rep, 0);
    assert_eq!(witness.prove_graffiti, 0);
    assert_eq!(witness.epoch, 1);

    let proof = user
        .gen_reputation_proof(ReputationOptions {
            nonce: 1,
            min_rep: Some(7),
            graffiti_pre_image: Some(pre_image),
            reveal_nonce: true,
            sig_data: Some(Fr::from(5u64)),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(proof.min_rep, 7);
    assert!(proof.prove_min_rep);
    assert!(!proof.prove_max_rep);
    assert!(proof.prove_graffiti);
    assert_eq!(proof.graffiti, pre_image);
    assert_eq!(proof.nonce, 1);
    assert_eq!(proof.epoch, 1);
    assert_eq!(proof.epoch_key, user.get_epoch_key(Some(1), 1, None).unwrap());
    assert!(proof.verify(chain.sync.prover()).await.unwrap());

    let zero_bound = user
        .build_reputation_witness(ReputationOptions {
            min_rep: Some(0),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(zero_bound.prove_min_rep, 0);

    let err = user
        .gen_reputation_proof(ReputationOptions {
            min_rep: Some(8),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Prover(ProverError::Failure { .. })));
}

#[tokio::test]
async fn data_proof_reveals_provable_data() {
    let chain = Chain::new().await;
    let user = chain.user(7);
    chain.sign_up(&user).await;

    let epk = user.get_epoch_key(None, 1, None).unwrap();
    chain.sync.attest(attester(), 0, epk, 3, Fr::from(1700u64)).await.unwrap();
    chain.sync.attest(attester(), 0, epk, 3, Fr::from(1800u64)).await.unwrap();
    chain.pass_epochs(1);
    chain.transition(&user).await;

    let proof = user
        .gen_data_proof(DataOptions {
            nonce: 1,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(
        proof.data,
        vec![Fr::from(0u64), Fr::from(0u64), Fr::from(0u64), Fr::from(1800u64)]
    );
    assert_eq!(proof.data, user.get_provable_data(None).await.unwrap());
    assert_eq!(proof.epoch, 1);
    assert!(!proof.reveal_nonce);
    assert!(proof.verify(chain.sync.prover()).await.unwrap());
}

#[tokio::test]
async fn attesters_keep_separate_state() {
    let chain = Chain::new().await;
    let user = chain.user(8);
    chain.sign_up(&user).await;

    assert!(user.has_signed_up(Some(attester())).await.unwrap());
    assert!(!user.has_signed_up(Some(common::other_attester())).await.unwrap());
    assert_ne!(
        user.get_epoch_key(Some(0), 0, None).unwrap(),
        user.get_epoch_key(Some(0), 0, Some(common::other_attester())).unwrap()
    );
}

#[tokio::test]
async fn latest_replace_write_wins_across_nonces() {
    let chain = Chain::new().await;
    let user = chain.user(1);
    chain.sign_up(&user).await;

    let [epk0, epk1] = <[Fr; 2]>::try_from(user.get_epoch_keys(None, None).unwrap()).unwrap();
    chain.sync.attest(attester(), 0, epk1, 2, Fr::from(9u64)).await.unwrap();
    let last = chain.sync.attest(attester(), 0, epk0, 2, Fr::from(5u64)).await.unwrap();

    chain.pass_epochs(1);
    let inputs = user
        .build_user_state_transition_witness(TransitionOptions::default())
        .await
        .unwrap();
    assert_eq!(inputs.epoch_keys[0].replace_positions, vec![last + 1, 0]);
    chain.transition(&user).await;

    let expected = vec![Fr::from(0u64), Fr::from(0u64), Fr::from(5u64), Fr::from(0u64)];
    assert_eq!(user.get_provable_data(None).await.unwrap(), expected);
    assert_eq!(user.latest_state_tree_leaf_index(None, None).await.unwrap(), Some(0));
    user.gen_epoch_key_proof(EpochKeyOptions::default()).await.unwrap();
}

#[tokio::test]
async fn zero_replace_write_still_overwrites() {
    let chain = Chain::new().await;
    let user = chain.user(1);
    chain.sign_up(&user).await;

    let [epk0, epk1] = <[Fr; 2]>::try_from(user.get_epoch_keys(None, None).unwrap()).unwrap();
    chain.sync.attest(attester(), 0, epk0, 3, Fr::from(7u64)).await.unwrap();
    chain.sync.attest(attester(), 0, epk1, 3, Fr::from(0u64)).await.unwrap();

    chain.pass_epochs(1);
    let inputs = user
        .build_user_state_transition_witness(TransitionOptions::default())
        .await
        .unwrap();
    assert!(!inputs.epoch_keys[1].has_changes);
    assert_eq!(inputs.epoch_keys[1].leaf_index, Some(1));
    chain.transition(&user).await;

    assert_eq!(user.get_provable_data(None).await.unwrap(), zeros());
    assert_eq!(user.latest_state_tree_leaf_index(None, None).await.unwrap(), Some(0));
    user.gen_reputation_proof(ReputationOptions::default()).await.unwrap();
}

#[tokio::test]
async fn data_past_the_current_epoch_is_the_current_data() {
    let chain = Chain::new().await;
    let user = chain.user(1);
    chain.sign_up(&user).await;

    let epk = user.get_epoch_key(None, 0, None).unwrap();
    chain.sync.attest(attester(), 0, epk, 0, Fr::from(5u64)).await.unwrap();

    let current = user.get_data(Some(0), None).await.unwrap();
    assert_eq!(current[0], Fr::from(5u64));
    assert_eq!(user.get_data(Some(u64::MAX), None).await.unwrap(), current);
}
