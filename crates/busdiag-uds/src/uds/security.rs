//! SecurityAccess (0x27) helpers

use serde::{Deserialize, Serialize};

use super::DiagError;

/// Seed request sub-functions are odd, the matching key sub-function is `level + 1`
pub fn key_sub_function(level: u8) -> Result<u8, DiagError> {
    check_level(level)?;
    Ok(level + 1)
}

pub fn check_level(level: u8) -> Result<(), DiagError> {
    if level % 2 == 0 || level == 0x7F {
        return Err(DiagError::InvalidArgument(format!(
            "security level 0x{:02X} must be odd and below 0x7F",
            level
        )));
    }
    Ok(())
}

/// An empty or all-zero seed means the level is already unlocked
pub fn seed_means_unlocked(seed: &[u8]) -> bool {
    seed.iter().all(|b| *b == 0)
}

/// How a key is derived from a seed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "lowercase")]
pub enum KeyAlgorithm {
    /// `key[i] = seed[i] ^ secret[i % secret.len()]`
    Xor { secret: Vec<u8> },
}

impl KeyAlgorithm {
    pub fn xor(secret: impl Into<Vec<u8>>) -> Self {
        KeyAlgorithm::Xor {
            secret: secret.into(),
        }
    }

    pub fn compute_key(&self, seed: &[u8]) -> Vec<u8> {
        match self {
            KeyAlgorithm::Xor { secret } if secret.is_empty() => seed.to_vec(),
            KeyAlgorithm::Xor { secret } => seed
                .iter()
                .enumerate()
                .map(|(i, b)| b ^ secret[i % secret.len()])
                .collect(),
        }
    }
}
