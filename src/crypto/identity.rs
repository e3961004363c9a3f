use crate::crypto::hash::FieldHash;
use crate::generic::object::Com;
use crate::util::to_dec_string;
use crate::{Fr, ProtocolHash};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize, SerializationError};
use rand::{CryptoRng, Rng, RngCore};
use std::fmt;

/// A long lived user identity.
///
/// The identity is the only secret a user holds. Everything else the user needs (epoch keys,
/// nullifiers, state tree leaves) is derived from [`Identity::secret`] together with public data,
/// so the identity alone is enough to rebuild a user's state from a replayed ledger.
///
/// The public half is the [`Identity::commitment`], which is what gets registered with an
/// attester on signup.
#[derive(Clone, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct Identity {
    pub nullifier: Fr,
    pub trapdoor: Fr,
}

impl Identity {
    /// Samples a fresh identity.
    pub fn new(rng: &mut (impl CryptoRng + RngCore)) -> Self {
        Self {
            nullifier: rng.gen(),
            trapdoor: rng.gen(),
        }
    }

    pub fn from_parts(nullifier: Fr, trapdoor: Fr) -> Self {
        Self {
            nullifier,
            trapdoor,
        }
    }

    /// `H(nullifier, trapdoor)` under the protocol hash.
    pub fn secret(&self) -> Fr {
        self.secret_with::<ProtocolHash>()
    }

    /// `H(secret)` under the protocol hash.
    pub fn commitment(&self) -> Com<Fr> {
        self.commitment_with::<ProtocolHash>()
    }

    pub fn secret_with<H: FieldHash<Fr>>(&self) -> Fr {
        H::hash(&[self.nullifier, self.trapdoor])
    }

    pub fn commitment_with<H: FieldHash<Fr>>(&self) -> Com<Fr> {
        H::hash(&[self.secret_with::<H>()])
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SerializationError> {
        let mut bytes = Vec::with_capacity(self.compressed_size());
        self.serialize_compressed(&mut bytes)?;
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SerializationError> {
        Self::deserialize_compressed(bytes)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("commitment", &to_dec_string(&self.commitment()))
            .finish_non_exhaustive()
    }
}
