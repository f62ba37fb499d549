//! Storage key strategies for role names.
//!
//! Changing the strategy or the secret after assignments exist orphans every
//! stored key. No migration is attempted here.

use std::fmt::Write;
use std::str::FromStr;
use std::sync::Arc;

use rolebind_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// How role names are represented in the `role_key` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStorage {
    /// The key is the role name.
    #[default]
    Plain,
    /// The key is a one-way SHA-256 digest of the name and a secret.
    Hashed,
    /// The key is a reversible ciphertext of the name.
    Encrypted,
}

impl KeyStorage {
    /// Returns a stable configuration value for this strategy.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Hashed => "hashed",
            Self::Encrypted => "encrypted",
        }
    }
}

impl FromStr for KeyStorage {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "plain" => Ok(Self::Plain),
            "hashed" => Ok(Self::Hashed),
            "encrypted" => Ok(Self::Encrypted),
            _ => Err(AppError::Validation(format!(
                "unknown key storage value '{value}'"
            ))),
        }
    }
}

/// Reversible cipher used by the `encrypted` strategy.
///
/// Implementations must be deterministic for a given key so that a role name
/// always maps to the same stored value.
pub trait RoleKeyCipher: Send + Sync {
    /// Encrypts a role name into a storage-safe string.
    fn encrypt(&self, plaintext: &str) -> AppResult<String>;

    /// Decrypts a stored key, returning `AppError::InvalidRoleKey` when it is malformed.
    fn decrypt(&self, stored_key: &str) -> AppResult<String>;
}

/// Translates role names into storage keys and back.
#[derive(Clone)]
pub struct RoleKeyCodec {
    storage: KeyStorage,
    secret: String,
    cipher: Option<Arc<dyn RoleKeyCipher>>,
}

impl RoleKeyCodec {
    /// Codec that stores role names as-is.
    #[must_use]
    pub fn plain() -> Self {
        Self {
            storage: KeyStorage::Plain,
            secret: String::new(),
            cipher: None,
        }
    }

    /// Codec that stores `SHA-256(name ++ secret)`.
    pub fn hashed(secret: impl Into<String>) -> AppResult<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(AppError::Validation(
                "hashed key storage requires a non-empty secret".to_owned(),
            ));
        }

        Ok(Self {
            storage: KeyStorage::Hashed,
            secret,
            cipher: None,
        })
    }

    /// Codec that stores ciphertexts produced by `cipher`.
    #[must_use]
    pub fn encrypted(cipher: Arc<dyn RoleKeyCipher>) -> Self {
        Self {
            storage: KeyStorage::Encrypted,
            secret: String::new(),
            cipher: Some(cipher),
        }
    }

    /// Returns the configured strategy.
    #[must_use]
    pub fn storage(&self) -> KeyStorage {
        self.storage
    }

    /// Derives the storage key for a role name.
    pub fn derive_key(&self, name: &str) -> AppResult<String> {
        match self.storage {
            KeyStorage::Plain => Ok(name.to_owned()),
            KeyStorage::Hashed => Ok(hash_role_name(name, self.secret.as_str())),
            KeyStorage::Encrypted => self.cipher()?.encrypt(name),
        }
    }

    /// Recovers the role name directly from a key when the strategy is reversible.
    ///
    /// Returns `None` for `hashed` keys, which can only be matched against known names.
    pub fn reverse(&self, stored_key: &str) -> AppResult<Option<String>> {
        match self.storage {
            KeyStorage::Plain => Ok(Some(stored_key.to_owned())),
            KeyStorage::Hashed => Ok(None),
            KeyStorage::Encrypted => self.cipher()?.decrypt(stored_key).map(Some),
        }
    }

    fn cipher(&self) -> AppResult<&Arc<dyn RoleKeyCipher>> {
        self.cipher.as_ref().ok_or_else(|| {
            AppError::Internal("encrypted key storage has no cipher configured".to_owned())
        })
    }
}

impl std::fmt::Debug for RoleKeyCodec {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RoleKeyCodec")
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}

fn hash_role_name(name: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(secret.as_bytes());
    let digest = hasher.finalize();

    digest
        .iter()
        .fold(String::with_capacity(64), |mut acc, byte| {
            let _ = write!(acc, "{byte:02x}");
            acc
        })
}
