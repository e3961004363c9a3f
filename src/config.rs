use crate::generic::object::AttesterId;
use serde::{Deserialize, Serialize};
use std::io::Read;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("sumFieldCount ({sum}) exceeds fieldCount ({total})")]
    SumFieldCount { sum: usize, total: usize },
    #[error("numEpochKeyNoncePerEpoch must be at least 1")]
    NoNonces,
    #[error("tree arity must be at least 2, got {0}")]
    Arity(usize),
    #[error("{name} depth must be at least 1")]
    Depth { name: &'static str },
    #[error("epochLength must be non-zero for attester {0}")]
    EpochLength(AttesterId),
    #[error("attester id {0} does not fit in 160 bits")]
    AttesterIdRange(AttesterId),
    #[error("no attesters configured")]
    NoAttesters,
}

/// Protocol parameters shared by every attester on a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub field_count: usize,
    pub sum_field_count: usize,
    pub num_epoch_key_nonce_per_epoch: u8,
    pub state_tree_depth: usize,
    pub epoch_tree_depth: usize,
    #[serde(default = "default_arity")]
    pub epoch_tree_arity: usize,
    pub history_tree_depth: usize,
    #[serde(default)]
    pub chain_id: u64,
}

fn default_arity() -> usize {
    2
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            field_count: 6,
            sum_field_count: 4,
            num_epoch_key_nonce_per_epoch: 3,
            state_tree_depth: 12,
            epoch_tree_depth: 4,
            epoch_tree_arity: 2,
            history_tree_depth: 9,
            chain_id: 0,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sum_field_count > self.field_count {
            return Err(ConfigError::SumFieldCount {
                sum: self.sum_field_count,
                total: self.field_count,
            });
        }
        if self.num_epoch_key_nonce_per_epoch == 0 {
            return Err(ConfigError::NoNonces);
        }
        if self.epoch_tree_arity < 2 {
            return Err(ConfigError::Arity(self.epoch_tree_arity));
        }
        for (name, depth) in [
            ("state tree", self.state_tree_depth),
            ("epoch tree", self.epoch_tree_depth),
            ("history tree", self.history_tree_depth),
        ] {
            if depth == 0 {
                return Err(ConfigError::Depth { name });
            }
        }
        Ok(())
    }
}

/// Per-attester clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttesterConfig {
    pub attester_id: AttesterId,
    /// Unix seconds at which epoch 0 began.
    pub start_timestamp: u64,
    /// Epoch length in seconds.
    pub epoch_length: u64,
}

impl AttesterConfig {
    /// `floor((now - start) / epochLength)`, saturating at 0 before the attester starts.
    pub fn epoch_at(&self, now: u64) -> u64 {
        now.saturating_sub(self.start_timestamp) / self.epoch_length
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    #[serde(default)]
    pub settings: Settings,
    pub attesters: Vec<AttesterConfig>,
}

impl SyncConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.settings.validate()?;
        if self.attesters.is_empty() {
            return Err(ConfigError::NoAttesters);
        }
        for attester in &self.attesters {
            if !attester.attester_id.is_valid() {
                return Err(ConfigError::AttesterIdRange(attester.attester_id));
            }
            if attester.epoch_length == 0 {
                return Err(ConfigError::EpochLength(attester.attester_id));
            }
        }
        Ok(())
    }

    pub fn attester(&self, id: &AttesterId) -> Option<&AttesterConfig> {
        self.attesters.iter().find(|a| &a.attester_id == id)
    }
}
