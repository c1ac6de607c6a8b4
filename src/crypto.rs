// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Crypto gateway: authority public-key handling and payload encryption.
//!
//! The authority mandates RSA-OAEP with a SHA-1 digest for every encrypted
//! payload (Aadhaar number, OTP, mobile number). SHA-1 here is an
//! interoperability constraint of the external protocol; a stronger digest
//! would be rejected by the authority.
//!
//! Also hosts the at-rest helpers used by the transaction store: AES-256-GCM
//! sealing of the sensitive input plus a deterministic SHA-256 lookup hash.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use axum::http::StatusCode;
use base64ct::{Base64, Encoding};
use rand::Rng;
use rsa::{pkcs1::DecodeRsaPublicKey, pkcs8::DecodePublicKey, Oaep, RsaPublicKey};
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::authority::AuthorityClient;
use crate::error::AppError;

const NONCE_LEN: usize = 12;

/// Fetch and parse the authority's current RSA public key.
///
/// A malformed key endpoint is a configuration/availability fault, not a
/// transient one; there is no retry.
pub async fn fetch_public_key(authority: &AuthorityClient) -> Result<RsaPublicKey, AppError> {
    let pem_text = authority.fetch_certificate().await?;
    parse_public_key(&pem_text)
}

/// Parse a PEM-encoded RSA public key (SPKI or PKCS#1).
pub fn parse_public_key(pem_text: &str) -> Result<RsaPublicKey, AppError> {
    let block = pem::parse(pem_text.trim()).map_err(|e| {
        AppError::internal("PUBLIC_KEY_PARSE_FAILED", "authority key is not valid PEM")
            .with_cause(e)
    })?;

    match block.tag() {
        "PUBLIC KEY" => RsaPublicKey::from_public_key_der(block.contents()).map_err(|e| {
            AppError::internal(
                "PUBLIC_KEY_PARSE_FAILED",
                "authority key is not an RSA public key",
            )
            .with_cause(e)
        }),
        "RSA PUBLIC KEY" => RsaPublicKey::from_pkcs1_der(block.contents()).map_err(|e| {
            AppError::internal(
                "PUBLIC_KEY_PARSE_FAILED",
                "authority key is not an RSA public key",
            )
            .with_cause(e)
        }),
        other => Err(AppError::internal(
            "PUBLIC_KEY_PARSE_FAILED",
            format!("unexpected PEM block `{other}`"),
        )),
    }
}

/// RSA-OAEP(SHA-1) encrypt `plaintext` and return the ciphertext base64.
///
/// Pure transformation given the key. Fails only on padding/key-size errors,
/// e.g. plaintext too long for the modulus.
pub fn encrypt_with_public_key(key: &RsaPublicKey, plaintext: &str) -> Result<String, AppError> {
    let mut rng = rand::thread_rng();
    let ciphertext = key
        .encrypt(&mut rng, Oaep::new::<Sha1>(), plaintext.as_bytes())
        .map_err(|e| {
            AppError::internal("ENCRYPT_FAILED", "payload encryption failed").with_cause(e)
        })?;
    Ok(Base64::encode_string(&ciphertext))
}

/// Deterministic lookup hash of a plaintext secret (SHA-256, hex).
///
/// Used as the transaction store's unique key so OTP resend updates the
/// pending transaction instead of duplicating it.
pub fn lookup_hash(plaintext: &str) -> String {
    hex::encode(Sha256::digest(plaintext.as_bytes()))
}

/// AES-256-GCM sealing of secrets stored at rest.
///
/// The key is derived from the configured passphrase; a random nonce is
/// prepended to each ciphertext so sealing the same plaintext twice yields
/// different stored bytes.
#[derive(Clone)]
pub struct Vault {
    key: [u8; 32],
}

impl Vault {
    pub fn new(passphrase: &str) -> Self {
        Self {
            key: Sha256::digest(passphrase.as_bytes()).into(),
        }
    }

    pub fn seal(&self, plaintext: &str) -> Result<String, AppError> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| AppError::internal("VAULT_SEAL_FAILED", "bad vault key").with_cause(e))?;
        let nonce_bytes: [u8; NONCE_LEN] = rand::thread_rng().gen();
        let nonce = Nonce::from_slice(&nonce_bytes);

        let mut sealed = cipher.encrypt(nonce, plaintext.as_bytes()).map_err(|e| {
            AppError::internal("VAULT_SEAL_FAILED", "secret sealing failed").with_cause(e)
        })?;

        let mut out = nonce_bytes.to_vec();
        out.append(&mut sealed);
        Ok(Base64::encode_string(&out))
    }

    pub fn open(&self, sealed: &str) -> Result<String, AppError> {
        let bytes = Base64::decode_vec(sealed).map_err(|e| {
            AppError::internal("VAULT_OPEN_FAILED", "sealed secret is not valid base64")
                .with_cause(e)
        })?;
        if bytes.len() <= NONCE_LEN {
            return Err(AppError::internal(
                "VAULT_OPEN_FAILED",
                "sealed secret is too short",
            ));
        }

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| AppError::internal("VAULT_OPEN_FAILED", "bad vault key").with_cause(e))?;
        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_LEN);

        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| {
                AppError::internal("VAULT_OPEN_FAILED", "secret unsealing failed").with_cause(e)
            })?;

        String::from_utf8(plaintext).map_err(|e| {
            AppError::internal("VAULT_OPEN_FAILED", "unsealed secret is not UTF-8").with_cause(e)
        })
    }
}

// Manual Debug keeps the derived key out of logs.
impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::{
        pkcs1::EncodeRsaPublicKey,
        pkcs8::{EncodePublicKey, LineEnding},
        RsaPrivateKey,
    };

    fn test_keypair() -> (RsaPrivateKey, RsaPublicKey) {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, 2048).expect("generate key");
        let public = RsaPublicKey::from(&private);
        (private, public)
    }

    #[test]
    fn oaep_sha1_round_trips_with_matching_key_pair() {
        let (private, public) = test_keypair();
        let sealed = encrypt_with_public_key(&public, "123456789012").unwrap();

        let ciphertext = Base64::decode_vec(&sealed).unwrap();
        let plaintext = private.decrypt(Oaep::new::<Sha1>(), &ciphertext).unwrap();
        assert_eq!(plaintext, b"123456789012");
    }

    #[test]
    fn encrypt_rejects_plaintext_longer_than_modulus_allows() {
        let (_, public) = test_keypair();
        // OAEP-SHA1 over a 2048-bit modulus caps plaintext at 214 bytes.
        let oversized = "x".repeat(300);
        let err = encrypt_with_public_key(&public, &oversized).unwrap_err();
        assert_eq!(err.code, "ENCRYPT_FAILED");
    }

    #[test]
    fn parse_accepts_spki_pem() {
        let (_, public) = test_keypair();
        let pem_text = public.to_public_key_pem(LineEnding::LF).unwrap();
        let parsed = parse_public_key(&pem_text).unwrap();
        assert_eq!(parsed, public);
    }

    #[test]
    fn parse_accepts_pkcs1_pem() {
        let (_, public) = test_keypair();
        let pem_text = public.to_pkcs1_pem(LineEnding::LF).unwrap();
        let parsed = parse_public_key(&pem_text).unwrap();
        assert_eq!(parsed, public);
    }

    #[test]
    fn parse_rejects_non_pem_body() {
        let err = parse_public_key("this is not a key").unwrap_err();
        assert_eq!(err.code, "PUBLIC_KEY_PARSE_FAILED");
    }

    #[test]
    fn parse_rejects_wrong_block_tag() {
        let block = pem::Pem::new("CERTIFICATE REQUEST", vec![1, 2, 3]);
        let err = parse_public_key(&pem::encode(&block)).unwrap_err();
        assert_eq!(err.code, "PUBLIC_KEY_PARSE_FAILED");
    }

    #[test]
    fn vault_round_trips() {
        let vault = Vault::new("test-passphrase");
        let sealed = vault.seal("999988887777").unwrap();
        assert_ne!(sealed, "999988887777");
        assert_eq!(vault.open(&sealed).unwrap(), "999988887777");
    }

    #[test]
    fn vault_sealing_is_randomized() {
        let vault = Vault::new("test-passphrase");
        let a = vault.seal("secret").unwrap();
        let b = vault.seal("secret").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn vault_rejects_wrong_key() {
        let sealed = Vault::new("key-one").seal("secret").unwrap();
        let err = Vault::new("key-two").open(&sealed).unwrap_err();
        assert_eq!(err.code, "VAULT_OPEN_FAILED");
    }

    #[test]
    fn vault_rejects_truncated_input() {
        let vault = Vault::new("k");
        let err = vault.open("AAAA").unwrap_err();
        assert_eq!(err.code, "VAULT_OPEN_FAILED");
    }

    #[test]
    fn lookup_hash_is_deterministic_and_distinct() {
        assert_eq!(lookup_hash("123456789012"), lookup_hash("123456789012"));
        assert_ne!(lookup_hash("123456789012"), lookup_hash("123456789013"));
        assert_eq!(lookup_hash("x").len(), 64);
    }
}
