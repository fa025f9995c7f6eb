//! Salted password hashing using Argon2

use argon2::password_hash::Output;
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::domain::DomainError;
use crate::domain::user::PasswordCredential;

const SALT_BYTES: usize = 16;
const HASH_BYTES: usize = 32;

/// Argon2 variant used for credential hashing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Argon2id,
    Argon2i,
    Argon2d,
}

impl From<HashAlgorithm> for Algorithm {
    fn from(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Argon2id => Algorithm::Argon2id,
            HashAlgorithm::Argon2i => Algorithm::Argon2i,
            HashAlgorithm::Argon2d => Algorithm::Argon2d,
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Argon2id => write!(f, "argon2id"),
            Self::Argon2i => write!(f, "argon2i"),
            Self::Argon2d => write!(f, "argon2d"),
        }
    }
}

impl std::str::FromStr for HashAlgorithm {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "argon2id" => Ok(Self::Argon2id),
            "argon2i" => Ok(Self::Argon2i),
            "argon2d" => Ok(Self::Argon2d),
            _ => Err(DomainError::configuration(format!(
                "Unknown hash algorithm: {}. Valid algorithms: argon2id, argon2i, argon2d",
                s
            ))),
        }
    }
}

/// Fixed hashing policy: variant, iteration count and memory cost
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashPolicy {
    pub algorithm: HashAlgorithm,
    /// Argon2 time cost
    pub iterations: u32,
    /// Argon2 memory cost in KiB
    pub memory_kib: u32,
}

impl HashPolicy {
    pub const DEFAULT_ITERATIONS: u32 = Params::DEFAULT_T_COST;
    pub const DEFAULT_MEMORY_KIB: u32 = Params::DEFAULT_M_COST;

    pub fn new(algorithm: HashAlgorithm, iterations: u32, memory_kib: u32) -> Self {
        Self {
            algorithm,
            iterations,
            memory_kib,
        }
    }

    fn argon2(&self) -> Result<Argon2<'static>, DomainError> {
        let params = Params::new(self.memory_kib, self.iterations, 1, Some(HASH_BYTES))
            .map_err(|e| DomainError::configuration(format!("Invalid hash policy: {}", e)))?;

        Ok(Argon2::new(self.algorithm.into(), Version::V0x13, params))
    }
}

impl Default for HashPolicy {
    fn default() -> Self {
        Self::new(
            HashAlgorithm::default(),
            Self::DEFAULT_ITERATIONS,
            Self::DEFAULT_MEMORY_KIB,
        )
    }
}

/// Hash `plaintext` with `salt` under `policy`, returning lowercase hex
///
/// Same inputs always give the same output.
pub fn hash_password(
    plaintext: &str,
    salt: &str,
    policy: &HashPolicy,
) -> Result<String, DomainError> {
    let mut out = [0u8; HASH_BYTES];

    policy
        .argon2()?
        .hash_password_into(plaintext.as_bytes(), salt.as_bytes(), &mut out)
        .map_err(|e| DomainError::internal(format!("Failed to hash password: {}", e)))?;

    Ok(hex::encode(out))
}

/// Trait for credential issuance and verification
pub trait PasswordHasher: Send + Sync + Debug {
    /// Fresh random salt, string encoded
    fn generate_salt(&self) -> String;

    /// Hash a non-empty plaintext with the given salt
    fn hash(&self, plaintext: &str, salt: &str) -> Result<String, DomainError>;

    /// Generate a salt and hash the plaintext with it
    fn issue(&self, plaintext: &str) -> Result<PasswordCredential, DomainError> {
        let salt = self.generate_salt();
        let password_hash = self.hash(plaintext, &salt)?;
        Ok(PasswordCredential::new(salt, password_hash))
    }

    /// Check a plaintext against a stored credential
    fn verify(&self, plaintext: &str, credential: &PasswordCredential) -> bool {
        let Ok(candidate) = self.hash(plaintext, credential.salt()) else {
            return false;
        };

        // Output compares in constant time
        match (
            hex::decode(candidate),
            hex::decode(credential.password_hash()),
        ) {
            (Ok(candidate), Ok(stored)) => match (Output::new(&candidate), Output::new(&stored)) {
                (Ok(candidate), Ok(stored)) => candidate == stored,
                _ => false,
            },
            _ => false,
        }
    }
}

/// Argon2-based password hasher with a fixed policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Argon2Hasher {
    policy: HashPolicy,
}

impl Argon2Hasher {
    /// Create a hasher; the policy cannot be changed afterwards
    pub fn new(policy: HashPolicy) -> Result<Self, DomainError> {
        policy.argon2()?;
        Ok(Self { policy })
    }

    pub fn policy(&self) -> &HashPolicy {
        &self.policy
    }
}

impl PasswordHasher for Argon2Hasher {
    fn generate_salt(&self) -> String {
        let mut bytes = [0u8; SALT_BYTES];
        OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    fn hash(&self, plaintext: &str, salt: &str) -> Result<String, DomainError> {
        hash_password(plaintext, salt, &self.policy)
    }
}
