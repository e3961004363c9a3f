/// Everything needed to run the engine without a chain.
pub mod centralized;
/// A native circuit emulator standing in for the proving backend.
pub mod dummy;
/// Poseidon hashing.
pub mod hash;
