//! Secrets encryption for config values
//!
//! Secret config values are encrypted at rest through a [`SecretsProvider`].
//! The provider is chosen at workspace level; each stack carries its own
//! [`SecretsConfig`] (provider id plus salt) in its settings file and in
//! exported deployments.

mod passphrase;

pub use passphrase::{PassphraseSecretsProvider, PASSPHRASE_PROVIDER};

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Per-stack secrets provider state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretsConfig {
    /// Provider id (e.g. "passphrase")
    pub provider: String,

    /// Base64 salt for key derivation
    #[serde(default)]
    pub salt: Option<String>,
}

/// Encrypts and decrypts secret config values
pub trait SecretsProvider: Send + Sync {
    /// Provider id written into stack settings
    fn id(&self) -> &str;

    /// Fresh provider state for a new stack
    fn new_config(&self) -> Result<SecretsConfig>;

    /// Encrypt a plaintext value under the stack's provider state
    fn encrypt(&self, plaintext: &str, config: &SecretsConfig) -> Result<String>;

    /// Decrypt a ciphertext produced by [`SecretsProvider::encrypt`]
    fn decrypt(&self, ciphertext: &str, config: &SecretsConfig) -> Result<String>;
}

/// Thread-safe shared provider
pub type SharedSecretsProvider = Arc<dyn SecretsProvider>;
