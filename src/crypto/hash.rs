use ark_ff::PrimeField;
use ark_r1cs_std::{fields::fp::FpVar, prelude::AllocVar};
use ark_relations::r1cs::SynthesisError;

/// Trait for hashing, which can also be represented in zero knowledge.
///
/// The hasher allows one to hash an arbitrary length message into an output. Along with this,
/// one can generate the constraints for a hash computation in zero-knowledge, so the native hash
/// used to rebuild trees off-chain can be checked against the one the circuits enforce.
pub trait HasherZK<F: PrimeField>: Send + Sync {
    /// Message unit type to be hashed.
    type M;
    /// Output type from the hash.
    type C;
    /// Zero-knowledge representation of the message.
    type MV: AllocVar<Self::M, F>;
    /// Zero-knowledge representation of the output.
    type CV: AllocVar<Self::C, F>;

    /// Takes in an arbitrary length message and hashes it down to an output.
    fn hash(data: &[Self::M]) -> Self::C;

    /// Takes in a message in zero-knowledge and produces the output.
    fn hash_in_zk(data: &[Self::MV]) -> Result<Self::CV, SynthesisError>;
}

/// Hash from a prime field to the same field.
///
/// Every protocol value (epoch keys, tree nodes, state leaves, commitments) is produced by a
/// `FieldHash`, so swapping the implementation swaps the whole protocol's hash consistently.
pub trait FieldHash<F: PrimeField>:
    HasherZK<F, C = F, M = F, MV = FpVar<F>, CV = FpVar<F>> + Clone
{
}
