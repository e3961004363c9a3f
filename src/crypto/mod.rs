/// Hash traits shared by native code and in-circuit gadgets.
pub mod hash;
/// User identities.
pub mod identity;
/// Epoch keys, nullifiers and tree leaves.
pub mod protocol;
