use crate::crypto::hash::FieldHash;
use crate::crypto::hash::HasherZK;
use crate::util::{circom_poseidon_params, poseidon_params, CIRCOM_MAX_INPUTS};
use ark_crypto_primitives::crh::{poseidon, poseidon::CRH, CRHScheme, CRHSchemeGadget};
use ark_crypto_primitives::sponge::poseidon::PoseidonConfig;
use ark_crypto_primitives::sponge::Absorb;
use ark_ff::{Field, PrimeField};
use ark_r1cs_std::fields::{fp::FpVar, FieldVar};
use ark_relations::r1cs::SynthesisError;
use std::convert::Infallible;

/// Poseidon over the arkworks sponge with rate `R`.
#[derive(Clone, Debug, Default)]
pub struct Poseidon<const R: usize>();

impl<F: PrimeField + Absorb, const R: usize> HasherZK<F> for Poseidon<R> {
    type M = F;
    type C = F;
    type MV = FpVar<F>;
    type CV = FpVar<F>;

    fn hash(data: &[F]) -> F {
        CRH::evaluate(&poseidon_params(R), data).unwrap()
    }

    fn hash_in_zk(data: &[FpVar<F>]) -> Result<FpVar<F>, SynthesisError> {
        let params = poseidon_params(R);
        let params_var = poseidon::constraints::CRHParametersVar { parameters: params };

        poseidon::constraints::CRHGadget::evaluate(&params_var, data)
    }
}

impl<F: PrimeField + Absorb, const R: usize> FieldHash<F> for Poseidon<R> {}

/// Poseidon as circomlib computes it, so hashes agree with the Unirep circuits and contracts.
///
/// Each call uses the state width for its input count. The inputs follow a zero capacity
/// element and the first state element is the output. Messages longer than
/// [`CIRCOM_MAX_INPUTS`] are absorbed in chunks, each chunk hashed together with the previous
/// output; an empty message hashes as a single zero.
#[derive(Clone, Debug, Default)]
pub struct CircPoseidon;

fn absorb_chunks<T: Clone, E>(
    data: &[T],
    zero: T,
    mut permute: impl FnMut(Vec<T>) -> Result<T, E>,
) -> Result<T, E> {
    if data.is_empty() {
        return permute(vec![zero]);
    }
    let (head, rest) = data.split_at(data.len().min(CIRCOM_MAX_INPUTS));
    let mut acc = permute(head.to_vec())?;
    for chunk in rest.chunks(CIRCOM_MAX_INPUTS - 1) {
        let mut inputs = Vec::with_capacity(chunk.len() + 1);
        inputs.push(acc);
        inputs.extend_from_slice(chunk);
        acc = permute(inputs)?;
    }
    Ok(acc)
}

fn is_full_round<F: PrimeField>(params: &PoseidonConfig<F>, round: usize) -> bool {
    let half = params.full_rounds / 2;
    round < half || round >= half + params.partial_rounds
}

fn permute<F: PrimeField>(inputs: Vec<F>) -> F {
    let params = circom_poseidon_params::<F>(inputs.len());
    let mut state = Vec::with_capacity(inputs.len() + 1);
    state.push(F::zero());
    state.extend(inputs);

    for (round, ark) in params.ark.iter().enumerate() {
        for (s, c) in state.iter_mut().zip(ark) {
            *s += c;
        }
        if is_full_round(&params, round) {
            for s in state.iter_mut() {
                *s = s.pow([params.alpha]);
            }
        } else {
            state[0] = state[0].pow([params.alpha]);
        }
        state = params
            .mds
            .iter()
            .map(|row| row.iter().zip(&state).map(|(m, s)| *m * s).sum())
            .collect();
    }
    state[0]
}

fn permute_var<F: PrimeField>(inputs: Vec<FpVar<F>>) -> Result<FpVar<F>, SynthesisError> {
    let params = circom_poseidon_params::<F>(inputs.len());
    let mut state = Vec::with_capacity(inputs.len() + 1);
    state.push(FpVar::zero());
    state.extend(inputs);

    for (round, ark) in params.ark.iter().enumerate() {
        for (s, c) in state.iter_mut().zip(ark) {
            *s += *c;
        }
        if is_full_round(&params, round) {
            for s in state.iter_mut() {
                *s = s.pow_by_constant([params.alpha])?;
            }
        } else {
            state[0] = state[0].pow_by_constant([params.alpha])?;
        }
        state = params
            .mds
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&state)
                    .fold(FpVar::zero(), |acc, (m, s)| acc + s * *m)
            })
            .collect();
    }
    Ok(state.swap_remove(0))
}

impl<F: PrimeField> HasherZK<F> for CircPoseidon {
    type M = F;
    type C = F;
    type MV = FpVar<F>;
    type CV = FpVar<F>;

    fn hash(data: &[F]) -> F {
        absorb_chunks(data, F::zero(), |inputs| Ok::<_, Infallible>(permute(inputs)))
            .unwrap_or_else(|never| match never {})
    }

    fn hash_in_zk(data: &[FpVar<F>]) -> Result<FpVar<F>, SynthesisError> {
        absorb_chunks(data, FpVar::zero(), permute_var)
    }
}

impl<F: PrimeField> FieldHash<F> for CircPoseidon {}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_bn254::Fr;
    use ark_r1cs_std::{alloc::AllocVar, R1CSVar};
    use ark_relations::r1cs::ConstraintSystem;
    use std::str::FromStr;

    #[test]
    fn native_hash_is_deterministic() {
        let input = [Fr::from(1u64), Fr::from(2u64)];
        let a = <Poseidon<2> as HasherZK<Fr>>::hash(&input);
        let b = <Poseidon<2> as HasherZK<Fr>>::hash(&input);
        assert_eq!(a, b);

        let swapped = <Poseidon<2> as HasherZK<Fr>>::hash(&[input[1], input[0]]);
        assert_ne!(a, swapped);
    }

    fn circom(data: &[u64]) -> Fr {
        let data = data.iter().map(|x| Fr::from(*x)).collect::<Vec<_>>();
        <CircPoseidon as HasherZK<Fr>>::hash(&data)
    }

    fn dec(s: &str) -> Fr {
        Fr::from_str(s).unwrap()
    }

    #[test]
    fn circom_poseidon_matches_circomlib() {
        assert_eq!(
            circom(&[1]),
            dec("18586133768512220936620570745912940619677854269274689475585506675881198879027")
        );
        assert_eq!(
            circom(&[1, 2]),
            dec("7853200120776062878684798364095072458815029376092732009249414926327459813530")
        );
        assert_eq!(
            circom(&[1, 2, 3, 4]),
            dec("18821383157269793795438455681495246036402687001665670618754263018637548127333")
        );
        assert_eq!(
            circom(&[1, 2, 3, 4, 5]),
            dec("6183221330272524995739186171720101788151706631170188140075976616310159254464")
        );
    }

    #[test]
    fn long_messages_chain_through_full_calls() {
        let data = (1..=20).collect::<Vec<u64>>();
        let head = circom(&data[..16]);
        let mut tail = vec![head];
        tail.extend(data[16..].iter().map(|x| Fr::from(*x)));
        assert_eq!(circom(&data), <CircPoseidon as HasherZK<Fr>>::hash(&tail));
        assert_eq!(circom(&[]), circom(&[0]));
    }

    #[test]
    fn circom_gadget_matches_native_hash() {
        let cs = ConstraintSystem::<Fr>::new_ref();
        let input = (3u64..22).map(Fr::from).collect::<Vec<Fr>>();
        let vars = input
            .iter()
            .map(|x| FpVar::new_witness(cs.clone(), || Ok(*x)))
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        let out = <CircPoseidon as HasherZK<Fr>>::hash_in_zk(&vars).unwrap();
        assert_eq!(out.value().unwrap(), <CircPoseidon as HasherZK<Fr>>::hash(&input));
        assert!(cs.is_satisfied().unwrap());
    }

    #[test]
    fn gadget_matches_native_hash() {
        let cs = ConstraintSystem::<Fr>::new_ref();
        let input = vec![Fr::from(7u64), Fr::from(11u64), Fr::from(13u64)];
        let vars = input
            .iter()
            .map(|x| FpVar::new_witness(cs.clone(), || Ok(*x)))
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        let out = <Poseidon<2> as HasherZK<Fr>>::hash_in_zk(&vars).unwrap();
        assert_eq!(out.value().unwrap(), <Poseidon<2> as HasherZK<Fr>>::hash(&input));
        assert!(cs.is_satisfied().unwrap());
    }
}
