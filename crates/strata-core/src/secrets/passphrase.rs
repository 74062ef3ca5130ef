//! Passphrase-based secrets provider
//!
//! Derives a 256-bit key from the workspace passphrase and the stack's salt
//! with PBKDF2-HMAC-SHA256, then seals values with ChaCha20-Poly1305.
//! Ciphertext format: `v1:<nonce b64>:<sealed b64>`.

use super::{SecretsConfig, SecretsProvider};
use crate::error::{Result, StrataError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use parking_lot::Mutex;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, CHACHA20_POLY1305, NONCE_LEN};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use std::collections::HashMap;
use std::num::NonZeroU32;

/// Provider id stored in stack settings
pub const PASSPHRASE_PROVIDER: &str = "passphrase";

const CIPHERTEXT_VERSION: &str = "v1";
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;
const DEFAULT_ITERATIONS: u32 = 100_000;

/// Passphrase secrets provider
pub struct PassphraseSecretsProvider {
    /// None when no passphrase is configured; every operation then fails
    passphrase: Option<String>,

    /// PBKDF2 iteration count
    iterations: NonZeroU32,

    /// Derived keys by salt
    keys: Mutex<HashMap<String, [u8; KEY_LEN]>>,

    rng: SystemRandom,
}

impl PassphraseSecretsProvider {
    /// Create a provider with the given passphrase
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self::build(Some(passphrase.into()), DEFAULT_ITERATIONS)
    }

    /// Create a provider that refuses to encrypt (no passphrase configured)
    pub fn unconfigured() -> Self {
        Self::build(None, DEFAULT_ITERATIONS)
    }

    /// Override the PBKDF2 iteration count (tests use a low count)
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = NonZeroU32::new(iterations.max(1)).unwrap_or(NonZeroU32::MIN);
        self.keys.lock().clear();
        self
    }

    fn build(passphrase: Option<String>, iterations: u32) -> Self {
        Self {
            passphrase,
            iterations: NonZeroU32::new(iterations).unwrap_or(NonZeroU32::MIN),
            keys: Mutex::new(HashMap::new()),
            rng: SystemRandom::new(),
        }
    }

    fn key_for(&self, config: &SecretsConfig) -> Result<LessSafeKey> {
        if config.provider != PASSPHRASE_PROVIDER {
            return Err(StrataError::secrets(format!(
                "stack uses secrets provider '{}', workspace provides '{}'",
                config.provider, PASSPHRASE_PROVIDER
            )));
        }
        let passphrase = self.passphrase.as_deref().ok_or_else(|| {
            StrataError::secrets(
                "no passphrase configured; set STRATA_CONFIG_PASSPHRASE or [secrets].passphrase",
            )
        })?;
        let salt = config
            .salt
            .as_deref()
            .ok_or_else(|| StrataError::secrets("stack has no encryption salt"))?;

        let mut keys = self.keys.lock();
        let key_bytes = match keys.get(salt) {
            Some(bytes) => *bytes,
            None => {
                let salt_bytes = STANDARD
                    .decode(salt)
                    .map_err(|e| StrataError::secrets(format!("invalid encryption salt: {}", e)))?;
                let mut bytes = [0u8; KEY_LEN];
                pbkdf2::derive(
                    pbkdf2::PBKDF2_HMAC_SHA256,
                    self.iterations,
                    &salt_bytes,
                    passphrase.as_bytes(),
                    &mut bytes,
                );
                keys.insert(salt.to_string(), bytes);
                bytes
            }
        };

        let unbound = UnboundKey::new(&CHACHA20_POLY1305, &key_bytes)
            .map_err(|_| StrataError::secrets("failed to build encryption key"))?;
        Ok(LessSafeKey::new(unbound))
    }
}

impl SecretsProvider for PassphraseSecretsProvider {
    fn id(&self) -> &str {
        PASSPHRASE_PROVIDER
    }

    fn new_config(&self) -> Result<SecretsConfig> {
        let mut salt = [0u8; SALT_LEN];
        self.rng
            .fill(&mut salt)
            .map_err(|_| StrataError::secrets("system random source unavailable"))?;
        Ok(SecretsConfig {
            provider: PASSPHRASE_PROVIDER.to_string(),
            salt: Some(STANDARD.encode(salt)),
        })
    }

    fn encrypt(&self, plaintext: &str, config: &SecretsConfig) -> Result<String> {
        let key = self.key_for(config)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| StrataError::secrets("system random source unavailable"))?;

        let mut in_out = plaintext.as_bytes().to_vec();
        key.seal_in_place_append_tag(
            Nonce::assume_unique_for_key(nonce_bytes),
            Aad::empty(),
            &mut in_out,
        )
        .map_err(|_| StrataError::secrets("encryption failed"))?;

        Ok(format!(
            "{}:{}:{}",
            CIPHERTEXT_VERSION,
            STANDARD.encode(nonce_bytes),
            STANDARD.encode(&in_out)
        ))
    }

    fn decrypt(&self, ciphertext: &str, config: &SecretsConfig) -> Result<String> {
        let mut parts = ciphertext.splitn(3, ':');
        let (Some(version), Some(nonce_b64), Some(sealed_b64)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(StrataError::secrets("malformed ciphertext"));
        };
        if version != CIPHERTEXT_VERSION {
            return Err(StrataError::secrets(format!(
                "unsupported ciphertext version '{}'",
                version
            )));
        }

        let nonce_bytes = STANDARD
            .decode(nonce_b64)
            .map_err(|e| StrataError::secrets(format!("malformed nonce: {}", e)))?;
        let nonce = Nonce::try_assume_unique_for_key(&nonce_bytes)
            .map_err(|_| StrataError::secrets("malformed nonce"))?;
        let mut sealed = STANDARD
            .decode(sealed_b64)
            .map_err(|e| StrataError::secrets(format!("malformed ciphertext: {}", e)))?;

        let key = self.key_for(config)?;
        let plain = key
            .open_in_place(nonce, Aad::empty(), &mut sealed)
            .map_err(|_| StrataError::secrets("incorrect passphrase or corrupted ciphertext"))?;

        String::from_utf8(plain.to_vec())
            .map_err(|_| StrataError::secrets("decrypted value is not valid UTF-8"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(passphrase: &str) -> PassphraseSecretsProvider {
        PassphraseSecretsProvider::new(passphrase).with_iterations(16)
    }

    #[test]
    fn test_encrypt_decrypt() {
        let secrets = provider("correct horse");
        let config = secrets.new_config().unwrap();

        let ciphertext = secrets.encrypt("hunter2", &config).unwrap();
        assert!(ciphertext.starts_with("v1:"));
        assert!(!ciphertext.contains("hunter2"));
        assert_eq!(secrets.decrypt(&ciphertext, &config).unwrap(), "hunter2");
    }

    #[test]
    fn test_fresh_nonce_per_encryption() {
        let secrets = provider("pw");
        let config = secrets.new_config().unwrap();
        let a = secrets.encrypt("same", &config).unwrap();
        let b = secrets.encrypt("same", &config).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_salt_or_passphrase_fails() {
        let secrets = provider("pw");
        let config = secrets.new_config().unwrap();
        let other = secrets.new_config().unwrap();
        let ciphertext = secrets.encrypt("value", &config).unwrap();

        assert!(matches!(
            secrets.decrypt(&ciphertext, &other),
            Err(StrataError::Secrets(_))
        ));
        assert!(provider("not pw").decrypt(&ciphertext, &config).is_err());
    }

    #[test]
    fn test_unconfigured_provider_refuses() {
        let secrets = PassphraseSecretsProvider::unconfigured();
        let config = secrets.new_config().unwrap();
        assert!(matches!(
            secrets.encrypt("x", &config),
            Err(StrataError::Secrets(_))
        ));
    }

    #[test]
    fn test_foreign_provider_rejected() {
        let secrets = provider("pw");
        let config = SecretsConfig {
            provider: "awskms".into(),
            salt: None,
        };
        assert!(secrets.encrypt("x", &config).is_err());
    }
}
