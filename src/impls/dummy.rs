use crate::config::Settings;
use crate::crypto::hash::HasherZK;
use crate::crypto::identity::Identity;
use crate::crypto::protocol;
use crate::generic::merkle::MerkleProof;
use crate::generic::object::{AttesterId, DataVector, Epoch, Nonce};
use crate::generic::prover::{Circuit, ProofOutput, Prover, ProverError, SnarkProof};
use crate::proofs::{AttesterControl, EpochKeyControl, ReputationControl};
use crate::util::{to_biguint, to_dec_string};
use crate::{Fr, ProtocolHash};
use num_bigint::BigUint;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Mutex;

/// A prover that runs the circuits natively instead of proving them.
///
/// Each circuit's constraints are checked against the witness and its public signals are
/// computed the way the circuit would. The "proof" only binds the signals: `pi_a[0]` is the hash
/// of the public signals, which is all [`Prover::verify_proof`] checks. Good for exercising the
/// engine end to end; it proves nothing.
///
/// Every witness handed in is kept and can be inspected with [`DummyProver::witnesses`].
#[derive(Debug)]
pub struct DummyProver {
    settings: Settings,
    failure: Option<String>,
    witnesses: Mutex<Vec<(Circuit, Value)>>,
}

impl DummyProver {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            failure: None,
            witnesses: Mutex::new(Vec::new()),
        }
    }

    /// A prover that rejects every witness with `reason`.
    pub fn failing(settings: Settings, reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::new(settings)
        }
    }

    /// Witnesses received so far, oldest first.
    pub fn witnesses(&self) -> Vec<(Circuit, Value)> {
        match self.witnesses.lock() {
            Ok(w) => w.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn record(&self, circuit: Circuit, witness: &Value) {
        let mut w = match self.witnesses.lock() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        };
        w.push((circuit, witness.clone()));
    }

    fn signals(&self, circuit: Circuit, w: &Inputs) -> Result<Vec<Fr>, ProverError> {
        match circuit {
            Circuit::Signup => self.signup(w),
            Circuit::EpochKey => self.epoch_key(w),
            Circuit::EpochKeyLite => self.epoch_key_lite(w),
            Circuit::Reputation => self.reputation(w),
            Circuit::UserStateTransition => self.user_state_transition(w),
            Circuit::ProveData => self.prove_data(w),
        }
    }

    fn signup(&self, w: &Inputs) -> Result<Vec<Fr>, ProverError> {
        let identity = Identity::from_parts(w.field("identity_nullifier")?, w.field("identity_trapdoor")?);
        let attester_id = w.attester_id()?;
        let epoch = w.int("epoch")?;
        let zero = vec![Fr::from(0u64); self.settings.field_count];
        let leaf = protocol::state_tree_leaf::<Fr, ProtocolHash>(
            identity.secret(),
            attester_id.to_field(),
            epoch,
            &zero,
        );
        let control = AttesterControl {
            attester_id,
            epoch,
            chain_id: self.settings.chain_id,
        };
        Ok(vec![identity.commitment(), leaf, control.build()])
    }

    /// Epoch key, state tree root and control word shared by the state tree circuits.
    fn epoch_key_parts(&self, w: &Inputs, data: &[Fr]) -> Result<(Fr, Fr, Fr), ProverError> {
        let secret = w.field("identity_secret")?;
        let attester_id = w.attester_id()?;
        let epoch = w.int("epoch")?;
        let nonce = self.nonce(w)?;

        let leaf = protocol::state_tree_leaf::<Fr, ProtocolHash>(
            secret,
            attester_id.to_field(),
            epoch,
            data,
        );
        let path = MerkleProof {
            root: Fr::from(0u64),
            leaf,
            siblings: w.matrix("state_tree_elements")?,
            path_indices: w.indices("state_tree_indexes")?,
        };
        let root = path
            .compute_root::<ProtocolHash>()
            .ok_or_else(|| w.fail("malformed state tree path"))?;

        let control = self.epoch_key_control(w, nonce, epoch, attester_id)?;
        let epoch_key =
            protocol::epoch_key::<Fr, ProtocolHash>(secret, attester_id.to_field(), epoch, nonce as u64);
        Ok((epoch_key, root, control))
    }

    fn epoch_key_control(
        &self,
        w: &Inputs,
        nonce: Nonce,
        epoch: Epoch,
        attester_id: AttesterId,
    ) -> Result<Fr, ProverError> {
        Ok(EpochKeyControl {
            nonce,
            epoch,
            attester_id,
            reveal_nonce: w.int("reveal_nonce")? != 0,
            chain_id: self.settings.chain_id,
        }
        .build())
    }

    fn nonce(&self, w: &Inputs) -> Result<Nonce, ProverError> {
        let nonce = w.int("nonce")?;
        if nonce >= self.settings.num_epoch_key_nonce_per_epoch as u64 {
            return Err(w.fail("nonce out of range"));
        }
        Ok(nonce as Nonce)
    }

    fn data(&self, w: &Inputs) -> Result<DataVector<Fr>, ProverError> {
        let data = w.fields("data")?;
        if data.len() != self.settings.field_count {
            return Err(w.fail("data vector has the wrong length"));
        }
        Ok(data)
    }

    fn epoch_key(&self, w: &Inputs) -> Result<Vec<Fr>, ProverError> {
        let data = self.data(w)?;
        let (epoch_key, root, control) = self.epoch_key_parts(w, &data)?;
        Ok(vec![epoch_key, root, control, w.field("sig_data")?])
    }

    fn epoch_key_lite(&self, w: &Inputs) -> Result<Vec<Fr>, ProverError> {
        let secret = w.field("identity_secret")?;
        let attester_id = w.attester_id()?;
        let epoch = w.int("epoch")?;
        let nonce = self.nonce(w)?;
        let control = self.epoch_key_control(w, nonce, epoch, attester_id)?;
        let epoch_key =
            protocol::epoch_key::<Fr, ProtocolHash>(secret, attester_id.to_field(), epoch, nonce as u64);
        Ok(vec![control, epoch_key, w.field("sig_data")?])
    }

    fn reputation(&self, w: &Inputs) -> Result<Vec<Fr>, ProverError> {
        let data = self.data(w)?;
        let (epoch_key, root, control0) = self.epoch_key_parts(w, &data)?;

        let rep = ReputationControl {
            min_rep: w.int("min_rep")?,
            max_rep: w.int("max_rep")?,
            prove_min_rep: w.int("prove_min_rep")? != 0,
            prove_max_rep: w.int("prove_max_rep")? != 0,
            prove_zero_rep: w.int("prove_zero_rep")? != 0,
            prove_graffiti: w.int("prove_graffiti")? != 0,
        };
        let pos = data.first().map(to_biguint).unwrap_or_default();
        let neg = data.get(1).map(to_biguint).unwrap_or_default();
        if rep.prove_min_rep && pos < neg.clone() + rep.min_rep {
            return Err(w.fail("reputation below min_rep"));
        }
        if rep.prove_max_rep && neg < pos.clone() + rep.max_rep {
            return Err(w.fail("reputation above max_rep"));
        }
        if rep.prove_zero_rep && pos != neg {
            return Err(w.fail("reputation is not zero"));
        }

        let pre_image = w.field("graffiti_pre_image")?;
        let graffiti = if rep.prove_graffiti {
            let stored = data.get(self.settings.sum_field_count).copied();
            if stored != Some(<ProtocolHash as HasherZK<Fr>>::hash(&[pre_image])) {
                return Err(w.fail("graffiti pre-image mismatch"));
            }
            pre_image
        } else {
            Fr::from(0u64)
        };
        Ok(vec![
            epoch_key,
            root,
            control0,
            rep.build(),
            graffiti,
            w.field("sig_data")?,
        ])
    }

    fn user_state_transition(&self, w: &Inputs) -> Result<Vec<Fr>, ProverError> {
        let secret = w.field("identity_secret")?;
        let attester_id = w.attester_id()?;
        let from_epoch = w.int("from_epoch")?;
        let to_epoch = w.int("to_epoch")?;
        if to_epoch <= from_epoch {
            return Err(w.fail("to_epoch must follow from_epoch"));
        }
        let data = self.data(w)?;

        let leaf = protocol::state_tree_leaf::<Fr, ProtocolHash>(
            secret,
            attester_id.to_field(),
            from_epoch,
            &data,
        );
        let state_root = MerkleProof {
            root: Fr::from(0u64),
            leaf,
            siblings: w.matrix("state_tree_elements")?,
            path_indices: w.indices("state_tree_indexes")?,
        }
        .compute_root::<ProtocolHash>()
        .ok_or_else(|| w.fail("malformed state tree path"))?;

        let epoch_tree_root = w.field("epoch_tree_root")?;
        let history_root = MerkleProof {
            root: Fr::from(0u64),
            leaf: protocol::history_tree_leaf::<Fr, ProtocolHash>(state_root, epoch_tree_root),
            siblings: w.matrix("history_tree_elements")?,
            path_indices: w.indices("history_tree_indices")?,
        }
        .compute_root::<ProtocolHash>()
        .ok_or_else(|| w.fail("malformed history tree path"))?;

        let nonce_count = self.settings.num_epoch_key_nonce_per_epoch as usize;
        let new_data = w.matrix("new_data")?;
        let elements = w.tensor3("epoch_tree_elements")?;
        let indices = w.index_matrix("epoch_tree_indices")?;
        let positions = w.index_matrix("replace_positions")?;
        if new_data.len() != nonce_count
            || elements.len() != nonce_count
            || indices.len() != nonce_count
            || positions.len() != nonce_count
        {
            return Err(w.fail("one epoch tree entry per nonce expected"));
        }

        let sum_fields = self.settings.sum_field_count;
        let replace_fields = self.settings.field_count.saturating_sub(sum_fields);
        let mut final_data = data;
        let mut latest = vec![0; replace_fields];
        let mut epoch_keys = Vec::with_capacity(nonce_count);
        for (nonce, (((key_data, siblings), path_indices), key_positions)) in new_data
            .into_iter()
            .zip(elements)
            .zip(indices)
            .zip(positions)
            .enumerate()
        {
            let epoch_key = protocol::epoch_key::<Fr, ProtocolHash>(
                secret,
                attester_id.to_field(),
                from_epoch,
                nonce as u64,
            );
            epoch_keys.push(epoch_key);
            if key_data.len() != self.settings.field_count {
                return Err(w.fail("epoch key data vector has the wrong length"));
            }
            if key_positions.len() != replace_fields {
                return Err(w.fail("replace positions have the wrong length"));
            }
            let written = key_positions.iter().any(|p| *p != 0);
            if !written && key_data.iter().all(|x| *x == Fr::from(0u64)) {
                continue;
            }

            let root = MerkleProof {
                root: Fr::from(0u64),
                leaf: protocol::epoch_tree_leaf::<Fr, ProtocolHash>(epoch_key, &key_data),
                siblings,
                path_indices,
            }
            .compute_root::<ProtocolHash>();
            if root != Some(epoch_tree_root) {
                return Err(w.fail("epoch tree leaf not in epoch tree"));
            }

            for (i, change) in key_data.into_iter().enumerate() {
                if i < sum_fields {
                    final_data[i] += change;
                } else if key_positions[i - sum_fields] > latest[i - sum_fields] {
                    latest[i - sum_fields] = key_positions[i - sum_fields];
                    final_data[i] = change;
                }
            }
        }

        let new_leaf = protocol::state_tree_leaf::<Fr, ProtocolHash>(
            secret,
            attester_id.to_field(),
            to_epoch,
            &final_data,
        );
        let control = AttesterControl {
            attester_id,
            epoch: to_epoch,
            chain_id: self.settings.chain_id,
        };

        let mut signals = Vec::with_capacity(nonce_count + 3);
        signals.push(history_root);
        signals.push(new_leaf);
        signals.extend(epoch_keys);
        signals.push(control.build());
        Ok(signals)
    }

    fn prove_data(&self, w: &Inputs) -> Result<Vec<Fr>, ProverError> {
        let data = self.data(w)?;
        let (epoch_key, root, control) = self.epoch_key_parts(w, &data)?;
        let mut signals = vec![epoch_key, root, control];
        signals.extend(data);
        Ok(signals)
    }
}

fn binding(signals: &[Fr]) -> String {
    to_dec_string(&<ProtocolHash as HasherZK<Fr>>::hash(signals))
}

impl Prover for DummyProver {
    async fn gen_proof_and_public_signals(
        &self,
        circuit: Circuit,
        witness: Value,
    ) -> Result<ProofOutput, ProverError> {
        self.record(circuit, &witness);
        if let Some(reason) = &self.failure {
            return Err(ProverError::Failure {
                circuit,
                reason: reason.clone(),
            });
        }

        let public_signals = self.signals(circuit, &Inputs { circuit, witness: &witness })?;
        let proof = SnarkProof {
            pi_a: vec![binding(&public_signals), "1".into(), "1".into()],
            pi_b: vec![vec!["0".into(); 2]; 3],
            pi_c: vec!["0".into(), "0".into(), "1".into()],
            protocol: "groth16".into(),
            curve: "bn128".into(),
        };
        Ok(ProofOutput {
            proof,
            public_signals,
        })
    }

    async fn verify_proof(
        &self,
        _circuit: Circuit,
        public_signals: &[Fr],
        proof: &SnarkProof,
    ) -> Result<bool, ProverError> {
        Ok(proof.pi_a.first() == Some(&binding(public_signals)))
    }
}

/// Typed access to a witness object.
struct Inputs<'a> {
    circuit: Circuit,
    witness: &'a Value,
}

impl Inputs<'_> {
    fn fail(&self, reason: &str) -> ProverError {
        ProverError::Failure {
            circuit: self.circuit,
            reason: reason.to_string(),
        }
    }

    fn get(&self, key: &str) -> Result<&Value, ProverError> {
        self.witness
            .get(key)
            .ok_or_else(|| self.fail(&format!("missing input {key}")))
    }

    fn to_field(&self, key: &str, v: &Value) -> Result<Fr, ProverError> {
        let n = match v {
            Value::String(s) => BigUint::from_str(s).ok(),
            Value::Number(n) => n.as_u64().map(BigUint::from),
            _ => None,
        };
        n.map(Fr::from)
            .ok_or_else(|| self.fail(&format!("input {key} is not a field element")))
    }

    fn list<'v>(&self, key: &str, v: &'v Value) -> Result<&'v Vec<Value>, ProverError> {
        v.as_array()
            .ok_or_else(|| self.fail(&format!("input {key} is not an array")))
    }

    fn field(&self, key: &str) -> Result<Fr, ProverError> {
        self.to_field(key, self.get(key)?)
    }

    fn fields(&self, key: &str) -> Result<Vec<Fr>, ProverError> {
        self.fields_of(key, self.get(key)?)
    }

    fn fields_of(&self, key: &str, v: &Value) -> Result<Vec<Fr>, ProverError> {
        self.list(key, v)?
            .iter()
            .map(|x| self.to_field(key, x))
            .collect()
    }

    fn matrix(&self, key: &str) -> Result<Vec<Vec<Fr>>, ProverError> {
        self.matrix_of(key, self.get(key)?)
    }

    fn matrix_of(&self, key: &str, v: &Value) -> Result<Vec<Vec<Fr>>, ProverError> {
        self.list(key, v)?
            .iter()
            .map(|row| self.fields_of(key, row))
            .collect()
    }

    fn tensor3(&self, key: &str) -> Result<Vec<Vec<Vec<Fr>>>, ProverError> {
        self.list(key, self.get(key)?)?
            .iter()
            .map(|m| self.matrix_of(key, m))
            .collect()
    }

    fn indices_of(&self, key: &str, v: &Value) -> Result<Vec<usize>, ProverError> {
        self.list(key, v)?
            .iter()
            .map(|x| {
                x.as_u64()
                    .map(|i| i as usize)
                    .ok_or_else(|| self.fail(&format!("input {key} is not an index")))
            })
            .collect()
    }

    fn indices(&self, key: &str) -> Result<Vec<usize>, ProverError> {
        self.indices_of(key, self.get(key)?)
    }

    fn index_matrix(&self, key: &str) -> Result<Vec<Vec<usize>>, ProverError> {
        self.list(key, self.get(key)?)?
            .iter()
            .map(|row| self.indices_of(key, row))
            .collect()
    }

    fn int(&self, key: &str) -> Result<u64, ProverError> {
        match self.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
        .ok_or_else(|| self.fail(&format!("input {key} is not an integer")))
    }

    fn attester_id(&self) -> Result<AttesterId, ProverError> {
        let id = AttesterId(self.field("attester_id")?);
        if !id.is_valid() {
            return Err(self.fail("attester id out of range"));
        }
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generic::witness::{EpochKeyLiteWitness, SignupWitness, Witness};
    use crate::proofs::{EpochKeyLiteProof, ProofWrapper, SignupProof};

    #[tokio::test]
    async fn lite_signals_follow_the_witness() {
        let prover = DummyProver::new(Settings::default());
        let witness = EpochKeyLiteWitness {
            identity_secret: Fr::from(42u64),
            sig_data: Fr::from(7u64),
            epoch: 3,
            nonce: 2,
            attester_id: AttesterId::from(11u64),
            reveal_nonce: 1,
        };
        let output = prover
            .gen_proof_and_public_signals(Circuit::EpochKeyLite, witness.to_json().unwrap())
            .await
            .unwrap();
        let proof = EpochKeyLiteProof::from_output(output).unwrap();

        let expected =
            protocol::epoch_key::<Fr, ProtocolHash>(Fr::from(42u64), Fr::from(11u64), 3, 2);
        assert_eq!(proof.epoch_key, expected);
        assert_eq!(proof.nonce, 2);
        assert_eq!(proof.epoch, 3);
        assert_eq!(proof.sig_data, Fr::from(7u64));
        assert!(proof.verify(&prover).await.unwrap());
        assert_eq!(prover.witnesses().len(), 1);
    }

    #[tokio::test]
    async fn tampered_signals_do_not_verify() {
        let prover = DummyProver::new(Settings::default());
        let witness = SignupWitness {
            epoch: 0,
            identity_nullifier: Fr::from(1u64),
            identity_trapdoor: Fr::from(2u64),
            attester_id: AttesterId::from(5u64),
        };
        let output = prover
            .gen_proof_and_public_signals(Circuit::Signup, witness.to_json().unwrap())
            .await
            .unwrap();
        let mut proof = SignupProof::from_output(output).unwrap();
        assert_eq!(
            proof.identity_commitment,
            Identity::from_parts(Fr::from(1u64), Fr::from(2u64)).commitment()
        );
        assert!(proof.verify(&prover).await.unwrap());

        proof.public_signals[0] = Fr::from(3u64);
        assert!(!proof.verify(&prover).await.unwrap());
    }

    #[tokio::test]
    async fn rejects_out_of_range_nonce() {
        let prover = DummyProver::new(Settings::default());
        let witness = EpochKeyLiteWitness {
            identity_secret: Fr::from(42u64),
            sig_data: Fr::from(0u64),
            epoch: 0,
            nonce: 3,
            attester_id: AttesterId::from(11u64),
            reveal_nonce: 0,
        };
        let err = prover
            .gen_proof_and_public_signals(Circuit::EpochKeyLite, witness.to_json().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ProverError::Failure { circuit: Circuit::EpochKeyLite, .. }));
    }
}
