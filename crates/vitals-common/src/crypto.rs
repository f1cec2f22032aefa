//! RSA-OAEP/SHA-256 body encryption and PEM key loading.
//!
//! The agent encrypts request bodies with the server's public key; the server
//! decrypts with its private key. Key files may be PKCS#8 ("PUBLIC KEY" /
//! "PRIVATE KEY") or PKCS#1 ("RSA PUBLIC KEY" / "RSA PRIVATE KEY") PEM.

use anyhow::{bail, Context, Result};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::sha2::Sha256;
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use std::path::Path;

const SHA256_LEN: usize = 32;

pub fn load_public_key(path: &Path) -> Result<RsaPublicKey> {
    let pem = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read public key file {}", path.display()))?;
    RsaPublicKey::from_public_key_pem(&pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(&pem))
        .with_context(|| format!("failed to parse public key from {}", path.display()))
}

pub fn load_private_key(path: &Path) -> Result<RsaPrivateKey> {
    let pem = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read private key file {}", path.display()))?;
    RsaPrivateKey::from_pkcs8_pem(&pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(&pem))
        .with_context(|| format!("failed to parse private key from {}", path.display()))
}

/// Largest plaintext the OAEP padding leaves room for under `key`.
pub fn max_plaintext_len(key: &RsaPublicKey) -> usize {
    key.size().saturating_sub(2 * SHA256_LEN + 2)
}

pub fn encrypt(plaintext: &[u8], key: &RsaPublicKey) -> Result<Vec<u8>> {
    let limit = max_plaintext_len(key);
    if plaintext.len() > limit {
        bail!(
            "plaintext of {} bytes exceeds the {} byte OAEP limit for this key",
            plaintext.len(),
            limit
        );
    }
    let mut rng = rand::thread_rng();
    key.encrypt(&mut rng, Oaep::new::<Sha256>(), plaintext)
        .context("RSA encryption failed")
}

pub fn decrypt(ciphertext: &[u8], key: &RsaPrivateKey) -> Result<Vec<u8>> {
    key.decrypt(Oaep::new::<Sha256>(), ciphertext)
        .context("RSA decryption failed")
}
