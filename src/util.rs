use ark_crypto_primitives::sponge::poseidon::find_poseidon_ark_and_mds;
use ark_crypto_primitives::sponge::poseidon::{PoseidonConfig, PoseidonDefaultConfigEntry};
use ark_ff::PrimeField;
use num_bigint::BigUint;
use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

// Generates Poseidon params for a prime field. This is copied from
//     https://github.com/arkworks-rs/crypto-primitives/blob/54b3ac24b8943fbd984863558c749997e96ff399/src/sponge/poseidon/traits.rs#L69
// and
//     https://github.com/arkworks-rs/crypto-primitives/blob/54b3ac24b8943fbd984863558c749997e96ff399/src/sponge/test.rs
pub(crate) fn gen_poseidon_params<F: PrimeField>(
    rate: usize,
    optimized_for_weights: bool,
) -> PoseidonConfig<F> {
    let params_set = if !optimized_for_weights {
        [
            PoseidonDefaultConfigEntry::new(2, 17, 8, 31, 0),
            PoseidonDefaultConfigEntry::new(3, 5, 8, 56, 0),
            PoseidonDefaultConfigEntry::new(4, 5, 8, 56, 0),
            PoseidonDefaultConfigEntry::new(5, 5, 8, 57, 0),
            PoseidonDefaultConfigEntry::new(6, 5, 8, 57, 0),
            PoseidonDefaultConfigEntry::new(7, 5, 8, 57, 0),
            PoseidonDefaultConfigEntry::new(8, 5, 8, 57, 0),
        ]
    } else {
        [
            PoseidonDefaultConfigEntry::new(2, 257, 8, 13, 0),
            PoseidonDefaultConfigEntry::new(3, 257, 8, 13, 0),
            PoseidonDefaultConfigEntry::new(4, 257, 8, 13, 0),
            PoseidonDefaultConfigEntry::new(5, 257, 8, 13, 0),
            PoseidonDefaultConfigEntry::new(6, 257, 8, 13, 0),
            PoseidonDefaultConfigEntry::new(7, 257, 8, 13, 0),
            PoseidonDefaultConfigEntry::new(8, 257, 8, 13, 0),
        ]
    };

    for param in params_set.iter() {
        if param.rate == rate {
            let (ark, mds) = find_poseidon_ark_and_mds::<F>(
                F::MODULUS_BIT_SIZE as u64,
                rate,
                param.full_rounds as u64,
                param.partial_rounds as u64,
                param.skip_matrices as u64,
            );

            return PoseidonConfig {
                full_rounds: param.full_rounds,
                partial_rounds: param.partial_rounds,
                alpha: param.alpha as u64,
                ark,
                mds,
                rate: param.rate,
                capacity: 1,
            };
        }
    }

    panic!("could not generate poseidon params");
}

type ParamCache = Mutex<HashMap<(TypeId, usize), Box<dyn Any + Send + Sync>>>;

static POSEIDON_PARAMS: OnceLock<ParamCache> = OnceLock::new();
static CIRCOM_PARAMS: OnceLock<ParamCache> = OnceLock::new();

fn memoized<F: PrimeField>(
    cache: &OnceLock<ParamCache>,
    key: usize,
    generate: impl FnOnce() -> PoseidonConfig<F>,
) -> PoseidonConfig<F> {
    let cache = cache.get_or_init(|| Mutex::new(HashMap::new()));
    let mut guard = cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let key = (TypeId::of::<F>(), key);

    if let Some(params) = guard
        .get(&key)
        .and_then(|p| p.downcast_ref::<PoseidonConfig<F>>())
    {
        return params.clone();
    }

    let params = generate();
    guard.insert(key, Box::new(params.clone()));
    params
}

/// Poseidon params for `rate`, generated once per (field, rate) pair.
///
/// Round constant search is expensive and every tree node is a hash, so the params are memoized
/// for the lifetime of the process.
pub(crate) fn poseidon_params<F: PrimeField>(rate: usize) -> PoseidonConfig<F> {
    memoized(&POSEIDON_PARAMS, rate, || gen_poseidon_params::<F>(rate, false))
}

/// Most inputs a single circomlib Poseidon call takes.
pub(crate) const CIRCOM_MAX_INPUTS: usize = 16;

/// Partial rounds circomlib uses for 1 through 16 inputs.
const CIRCOM_PARTIAL_ROUNDS: [usize; CIRCOM_MAX_INPUTS] =
    [56, 57, 56, 60, 60, 63, 64, 63, 60, 66, 60, 65, 70, 60, 64, 68];

/// circomlib's Poseidon params for `inputs` elements, a state of width `inputs + 1`.
///
/// circomlib draws its constants from the Grain LFSR with 8 full rounds, alpha 5 and the first
/// Cauchy matrix, which is exactly what `find_poseidon_ark_and_mds` produces. `inputs` must be in
/// `1..=CIRCOM_MAX_INPUTS`.
pub(crate) fn circom_poseidon_params<F: PrimeField>(inputs: usize) -> PoseidonConfig<F> {
    memoized(&CIRCOM_PARAMS, inputs, || {
        let partial_rounds = CIRCOM_PARTIAL_ROUNDS[inputs - 1];
        let (ark, mds) = find_poseidon_ark_and_mds::<F>(
            F::MODULUS_BIT_SIZE as u64,
            inputs,
            8,
            partial_rounds as u64,
            0,
        );
        PoseidonConfig {
            full_rounds: 8,
            partial_rounds,
            alpha: 5,
            ark,
            mds,
            rate: inputs,
            capacity: 1,
        }
    })
}

/// Field element as an unsigned integer.
pub fn to_biguint<F: PrimeField>(f: &F) -> BigUint {
    (*f).into()
}

/// Decimal string form of a field element, the encoding the proving backend and the ledger use.
pub fn to_dec_string<F: PrimeField>(f: &F) -> String {
    to_biguint(f).to_string()
}

/// Values that serialize as decimal strings (or nested lists of them).
pub trait DecimalSer {
    fn serialize_decimal<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error>;
}

struct Decimal<'a, T>(&'a T);

impl<T: DecimalSer> Serialize for Decimal<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize_decimal(serializer)
    }
}

impl DecimalSer for ark_bn254::Fr {
    fn serialize_decimal<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&to_biguint(self))
    }
}

impl<T: DecimalSer> DecimalSer for Vec<T> {
    fn serialize_decimal<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for v in self {
            seq.serialize_element(&Decimal(v))?;
        }
        seq.end()
    }
}

/// `serialize_with` target for witness fields holding field elements.
pub fn decimal<T: DecimalSer, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    value.serialize_decimal(serializer)
}
