use crate::util::{to_biguint, to_dec_string};
use crate::Fr;
use ark_ff::PrimeField;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use num_bigint::BigUint;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// An epoch key: an unlinkable per-epoch, per-nonce pseudonym.
pub type EpochKey<F> = F;
/// A nullifier, recorded once a user transitions into an epoch.
pub type Nul<F> = F;
/// A public commitment to an identity.
pub type Com<F> = F;
/// A reputation data vector: `fieldCount` field elements.
pub type DataVector<F> = Vec<F>;
/// Epoch number. Epochs are counted per attester from its start timestamp.
pub type Epoch = u64;
/// Epoch key nonce, always below `numEpochKeyNoncePerEpoch`.
pub type Nonce = u8;

/// Sentinel epoch under which attestations made at signup time are stored.
pub const MAX_EPOCH: Epoch = (1 << 48) - 1;

/// Attesters are identified by a 160 bit integer (an address). It is carried as a field element,
/// since it is hashed into every epoch key and state tree leaf.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, CanonicalSerialize, CanonicalDeserialize,
)]
pub struct AttesterId(pub Fr);

impl AttesterId {
    /// Bits an attester id occupies in packed control words.
    pub const BITS: u64 = 160;

    pub fn to_field(&self) -> Fr {
        self.0
    }

    pub fn to_biguint(&self) -> BigUint {
        to_biguint(&self.0)
    }

    /// Whether the id fits in [`AttesterId::BITS`] bits.
    pub fn is_valid(&self) -> bool {
        self.to_biguint().bits() <= Self::BITS
    }
}

impl From<u64> for AttesterId {
    fn from(value: u64) -> Self {
        Self(Fr::from(value))
    }
}

impl From<BigUint> for AttesterId {
    fn from(value: BigUint) -> Self {
        Self(Fr::from(value))
    }
}

impl fmt::Display for AttesterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", to_dec_string(&self.0))
    }
}

impl FromStr for AttesterId {
    type Err = String;

    /// Parses a decimal or `0x` prefixed hexadecimal id.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = match s.strip_prefix("0x") {
            Some(hex) => BigUint::parse_bytes(hex.as_bytes(), 16),
            None => BigUint::parse_bytes(s.as_bytes(), 10),
        };
        let value = parsed.ok_or_else(|| format!("invalid attester id: {s}"))?;
        if value >= Fr::MODULUS.into() {
            return Err(format!("attester id out of field range: {s}"));
        }
        Ok(Self::from(value))
    }
}

impl Serialize for AttesterId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AttesterId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Num(u64),
            Str(String),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Num(n) => Ok(Self::from(n)),
            Repr::Str(s) => s.parse().map_err(de::Error::custom),
        }
    }
}

/// Whether any entry of a data vector is non-zero.
pub fn has_changes<F: PrimeField>(data: &[F]) -> bool {
    data.iter().any(|x| !x.is_zero())
}
