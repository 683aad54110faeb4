//! Password obfuscation for the identity provider's login form.
//!
//! The IdP's JavaScript encrypts the password with DES in ECB mode under a
//! fixed key shared with the server, then base64-encodes the ciphertext. The
//! server decrypts with the same key, so the encoding must be byte-exact:
//! PKCS7 padding (a full pad block when the message is already a multiple of
//! the 8-byte block size), no IV, no chaining.

use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyInit, block_padding::Pkcs7};
use des::Des;

type DesEcbEnc = ecb::Encryptor<Des>;
type DesEcbDec = ecb::Decryptor<Des>;

/// Shared key baked into the IdP's login page. Only the first 8 bytes are used.
const SHARED_KEY: &str = "PassB01Il71";

/// DES block size in bytes.
const BLOCK_SIZE: usize = 8;

fn key_bytes() -> [u8; BLOCK_SIZE] {
    let mut key = [0u8; BLOCK_SIZE];
    key.copy_from_slice(&SHARED_KEY.as_bytes()[..BLOCK_SIZE]);
    key
}

/// Encode a plaintext secret the way the login form does.
///
/// Deterministic: identical plaintext always produces identical output, which
/// the server relies on to verify a match.
pub fn encode_secret(secret: &str) -> Result<String> {
    let enc = DesEcbEnc::new_from_slice(&key_bytes())
        .map_err(|e| anyhow!("invalid DES key length: {e}"))?;
    let ciphertext = enc.encrypt_padded_vec_mut::<Pkcs7>(secret.as_bytes());
    Ok(BASE64.encode(ciphertext))
}

/// Invert [`encode_secret`]. Used to verify the round-trip property in tests
/// and when diagnosing credential issues against a captured login request.
pub fn decode_secret(encoded: &str) -> Result<String> {
    let ciphertext = BASE64
        .decode(encoded)
        .context("encoded secret is not valid base64")?;
    let dec = DesEcbDec::new_from_slice(&key_bytes())
        .map_err(|e| anyhow!("invalid DES key length: {e}"))?;
    let plaintext = dec
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|e| anyhow!("bad PKCS7 padding in decrypted secret: {e}"))?;
    String::from_utf8(plaintext).context("decrypted secret is not valid UTF-8")
}
