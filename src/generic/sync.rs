use crate::config::Settings;
use crate::error::Error;
use crate::generic::ledger::Ledger;
use crate::generic::object::{AttesterId, Epoch};
use crate::generic::prover::Prover;
use std::sync::Arc;

/// Keeps a ledger in step with the chain.
///
/// The engine only reads through a synchronizer: protocol settings, the epoch clocks of the
/// attesters it tracks, and the replayed ledger. Ingesting chain events is the synchronizer's
/// business, and so is serializing those writes.
pub trait Synchronizer: Send + Sync {
    type Ledger: Ledger;
    type Prover: Prover;

    fn settings(&self) -> &Settings;

    /// Attesters whose events this synchronizer replays. Never empty.
    fn attester_ids(&self) -> &[AttesterId];

    /// The attester used when a call does not name one.
    fn default_attester_id(&self) -> AttesterId;

    fn ledger(&self) -> &Self::Ledger;

    fn prover(&self) -> &Self::Prover;

    fn check_attester_id(&self, attester_id: &AttesterId) -> Result<(), Error> {
        if self.attester_ids().contains(attester_id) {
            Ok(())
        } else {
            Err(Error::UnknownAttester(*attester_id))
        }
    }

    /// Epoch by the attester's wall clock.
    fn calc_current_epoch(&self, attester_id: &AttesterId) -> Result<Epoch, Error>;

    /// Epoch the chain has confirmed for the attester. May lag [`Self::calc_current_epoch`].
    async fn load_current_epoch(&self, attester_id: &AttesterId) -> Result<Epoch, Error>;

    /// Resolves once the replay has reached `height`, or right away for `None`.
    async fn wait_for_sync(&self, height: Option<u64>) -> Result<(), Error>;

    async fn start(&self) -> Result<(), Error>;

    async fn stop(&self);
}

impl<S: Synchronizer> Synchronizer for Arc<S> {
    type Ledger = S::Ledger;
    type Prover = S::Prover;

    fn settings(&self) -> &Settings {
        (**self).settings()
    }

    fn attester_ids(&self) -> &[AttesterId] {
        (**self).attester_ids()
    }

    fn default_attester_id(&self) -> AttesterId {
        (**self).default_attester_id()
    }

    fn ledger(&self) -> &Self::Ledger {
        (**self).ledger()
    }

    fn prover(&self) -> &Self::Prover {
        (**self).prover()
    }

    fn check_attester_id(&self, attester_id: &AttesterId) -> Result<(), Error> {
        (**self).check_attester_id(attester_id)
    }

    fn calc_current_epoch(&self, attester_id: &AttesterId) -> Result<Epoch, Error> {
        (**self).calc_current_epoch(attester_id)
    }

    async fn load_current_epoch(&self, attester_id: &AttesterId) -> Result<Epoch, Error> {
        (**self).load_current_epoch(attester_id).await
    }

    async fn wait_for_sync(&self, height: Option<u64>) -> Result<(), Error> {
        (**self).wait_for_sync(height).await
    }

    async fn start(&self) -> Result<(), Error> {
        (**self).start().await
    }

    async fn stop(&self) {
        (**self).stop().await
    }
}
