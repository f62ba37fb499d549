//! AES-256-GCM cipher for encrypted role key storage.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rolebind_core::{AppError, AppResult};
use rolebind_domain::RoleKeyCipher;
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;

/// AES-256-GCM cipher producing deterministic, reversible role keys.
///
/// The nonce is derived from the key and the role name, so a role always maps
/// to the same stored key and stored keys can be matched with plain equality.
#[derive(Clone)]
pub struct AesRoleKeyCipher {
    cipher: Aes256Gcm,
    nonce_seed: [u8; 32],
}

impl AesRoleKeyCipher {
    /// Creates a new cipher from a 32-byte key.
    pub fn new(key_bytes: &[u8; 32]) -> Self {
        let cipher = Aes256Gcm::new(key_bytes.into());
        let nonce_seed = Sha256::new()
            .chain_update(b"rolebind-role-key-nonce")
            .chain_update(key_bytes)
            .finalize()
            .into();

        Self { cipher, nonce_seed }
    }

    /// Creates a new cipher from a hex-encoded 32-byte key.
    pub fn from_hex(hex_key: &str) -> AppResult<Self> {
        let decoded = hex::decode(hex_key).map_err(|error| {
            AppError::Validation(format!("invalid ROLEBIND_KEY_ENCRYPTION_KEY hex: {error}"))
        })?;

        let key: [u8; 32] = decoded.as_slice().try_into().map_err(|_| {
            AppError::Validation(
                "ROLEBIND_KEY_ENCRYPTION_KEY must be exactly 32 bytes (64 hex chars)".to_owned(),
            )
        })?;

        Ok(Self::new(&key))
    }

    fn nonce_for(&self, plaintext: &str) -> [u8; NONCE_LEN] {
        let digest = Sha256::new()
            .chain_update(self.nonce_seed)
            .chain_update(plaintext.as_bytes())
            .finalize();

        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&digest[..NONCE_LEN]);
        nonce
    }
}

impl RoleKeyCipher for AesRoleKeyCipher {
    fn encrypt(&self, plaintext: &str) -> AppResult<String> {
        let nonce_bytes = self.nonce_for(plaintext);
        let ciphertext = self
            .cipher
            .encrypt(&Nonce::from(nonce_bytes), plaintext.as_bytes())
            .map_err(|error| AppError::Internal(format!("failed to encrypt role key: {error}")))?;

        let mut stored = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        stored.extend_from_slice(&nonce_bytes);
        stored.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(stored))
    }

    fn decrypt(&self, stored_key: &str) -> AppResult<String> {
        let decoded = URL_SAFE_NO_PAD.decode(stored_key).map_err(|error| {
            AppError::InvalidRoleKey(format!("role key is not valid base64: {error}"))
        })?;

        if decoded.len() <= NONCE_LEN {
            return Err(AppError::InvalidRoleKey(
                "role key too short: missing nonce".to_owned(),
            ));
        }

        let (nonce_bytes, encrypted) = decoded.split_at(NONCE_LEN);
        let nonce_array: [u8; NONCE_LEN] = nonce_bytes
            .try_into()
            .map_err(|_| AppError::InvalidRoleKey("nonce must be exactly 12 bytes".to_owned()))?;

        let plaintext = self
            .cipher
            .decrypt(&Nonce::from(nonce_array), encrypted)
            .map_err(|_| AppError::InvalidRoleKey("role key failed authentication".to_owned()))?;

        String::from_utf8(plaintext)
            .map_err(|_| AppError::InvalidRoleKey("role key is not valid utf-8".to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rolebind_core::{AppError, AppResult};
    use rolebind_domain::{RoleIdentity, RoleKeyCipher, RoleKeyCodec, RoleRegistry};

    use super::AesRoleKeyCipher;

    #[test]
    fn encrypt_decrypt_roundtrip() -> AppResult<()> {
        let cipher = AesRoleKeyCipher::new(&[42u8; 32]);

        let stored = cipher.encrypt("manager")?;

        assert_ne!(stored, "manager");
        assert_eq!(cipher.decrypt(&stored)?, "manager");
        Ok(())
    }

    #[test]
    fn same_name_encrypts_to_same_key() -> AppResult<()> {
        let cipher = AesRoleKeyCipher::new(&[7u8; 32]);

        assert_eq!(cipher.encrypt("editor")?, cipher.encrypt("editor")?);
        assert_ne!(cipher.encrypt("editor")?, cipher.encrypt("viewer")?);
        Ok(())
    }

    #[test]
    fn decrypt_with_wrong_key_fails() -> AppResult<()> {
        let first = AesRoleKeyCipher::new(&[42u8; 32]);
        let second = AesRoleKeyCipher::new(&[99u8; 32]);

        let stored = first.encrypt("manager")?;
        assert!(matches!(
            second.decrypt(&stored),
            Err(AppError::InvalidRoleKey(_))
        ));
        Ok(())
    }

    #[test]
    fn corrupt_keys_are_invalid() {
        let cipher = AesRoleKeyCipher::new(&[1u8; 32]);

        assert!(matches!(
            cipher.decrypt("not base64!"),
            Err(AppError::InvalidRoleKey(_))
        ));
        assert!(matches!(
            cipher.decrypt("c2hvcnQ"),
            Err(AppError::InvalidRoleKey(_))
        ));
    }

    #[test]
    fn from_hex_requires_32_bytes() {
        assert!(AesRoleKeyCipher::from_hex("abcd").is_err());
        assert!(AesRoleKeyCipher::from_hex("zz").is_err());
        assert!(AesRoleKeyCipher::from_hex(&"ab".repeat(32)).is_ok());
    }

    #[test]
    fn registry_resolves_encrypted_keys() -> AppResult<()> {
        let cipher = Arc::new(AesRoleKeyCipher::from_hex(&"0f".repeat(32))?);
        let registry = RoleRegistry::new(
            vec![RoleIdentity::new("viewer", 10)?, RoleIdentity::new("owner", 90)?],
            RoleKeyCodec::encrypted(cipher),
        )?;

        let stored = registry.storage_key("owner")?.to_owned();

        assert_eq!(registry.require_key(&stored)?.name(), "owner");
        Ok(())
    }
}
