//! Cryptographic utilities for the on-disk token cache
//!
//! - AES-256-GCM for token encryption at rest
//! - Cache secret kept in a `0600` key file, expanded with HKDF-SHA256

use std::fs;
use std::path::Path;

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use tracing::info;
use zeroize::{Zeroize, Zeroizing};

use crate::common::{AppError, AppResult};

/// AES-256-GCM nonce size (96 bits)
const NONCE_SIZE: usize = 12;
/// AES-256 key size (256 bits)
pub const KEY_SIZE: usize = 32;
/// HKDF info label binding derived keys to the token cache
const HKDF_INFO: &[u8] = b"scopegate token cache v1";

/// Symmetric key used to seal cache entries. Wiped on drop.
pub struct SealingKey(Zeroizing<[u8; KEY_SIZE]>);

impl SealingKey {
    /// Derive the sealing key from a raw secret.
    pub fn derive(secret: &[u8]) -> AppResult<Self> {
        let hk = Hkdf::<Sha256>::new(None, secret);
        let mut okm = Zeroizing::new([0u8; KEY_SIZE]);
        hk.expand(HKDF_INFO, &mut okm[..])
            .map_err(|e| AppError::cache(format!("Key derivation failed: {}", e)))?;
        Ok(Self(okm))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

// ── Encryption / Decryption ─────────────────────────────────────────────────

/// Encrypt plaintext bytes with AES-256-GCM.
/// Returns: nonce (12 bytes) || ciphertext+tag
pub fn encrypt(key: &SealingKey, plaintext: &[u8]) -> AppResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| AppError::cache(format!("Encryption failed: {}", e)))?;

    let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

/// Decrypt data produced by `encrypt()`.
pub fn decrypt(key: &SealingKey, data: &[u8]) -> AppResult<Vec<u8>> {
    if data.len() < NONCE_SIZE {
        return Err(AppError::cache("Ciphertext too short"));
    }

    let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| AppError::cache(format!("Decryption failed: {}", e)))
}

/// Seal a string and hex-encode the result for storage in JSON.
pub fn seal_hex(key: &SealingKey, plaintext: &str) -> AppResult<String> {
    Ok(hex::encode(encrypt(key, plaintext.as_bytes())?))
}

/// Reverse of `seal_hex()`.
pub fn open_hex(key: &SealingKey, sealed: &str) -> AppResult<String> {
    let data = hex::decode(sealed).map_err(|e| AppError::cache(format!("Invalid hex: {}", e)))?;
    let plain = decrypt(key, &data)?;
    String::from_utf8(plain)
        .map_err(|e| AppError::cache(format!("Invalid UTF-8 in cache entry: {}", e)))
}

// ── Key File ────────────────────────────────────────────────────────────────

/// Load the cache secret from `path`, creating it on first use, and derive the
/// sealing key from it.
///
/// The key file holds 32 random bytes as hex and is created with mode `0600`.
/// On unix a key file owned by another user is rejected.
pub fn load_or_create_key(path: &Path) -> AppResult<SealingKey> {
    if path.exists() {
        check_owner(path)?;
        let hex_str = Zeroizing::new(fs::read_to_string(path)?);
        let mut secret = hex_to_secret(hex_str.trim())?;
        let key = SealingKey::derive(&secret);
        secret.zeroize();
        return key;
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    info!("Generating new token cache key at {:?}", path);
    let mut secret = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut secret);
    let hex_str = Zeroizing::new(hex::encode(secret));
    write_private(path, hex_str.as_bytes())?;

    let key = SealingKey::derive(&secret);
    secret.zeroize();
    key
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> AppResult<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> AppResult<()> {
    fs::write(path, contents)?;
    Ok(())
}

#[cfg(unix)]
fn check_owner(path: &Path) -> AppResult<()> {
    use std::os::unix::fs::MetadataExt;

    let owner = fs::metadata(path)?.uid();
    let me = unsafe { libc::getuid() };
    if owner != me {
        return Err(AppError::cache(format!(
            "Refusing cache key {:?} owned by uid {} (expected {})",
            path, owner, me
        )));
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_owner(_path: &Path) -> AppResult<()> {
    Ok(())
}

fn hex_to_secret(hex_str: &str) -> AppResult<[u8; KEY_SIZE]> {
    let mut bytes =
        hex::decode(hex_str).map_err(|e| AppError::cache(format!("Invalid hex: {}", e)))?;
    if bytes.len() != KEY_SIZE {
        let len = bytes.len();
        bytes.zeroize();
        return Err(AppError::cache(format!(
            "Key length mismatch: expected {} bytes, got {}",
            KEY_SIZE, len
        )));
    }
    let mut secret = [0u8; KEY_SIZE];
    secret.copy_from_slice(&bytes);
    bytes.zeroize();
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn random_key() -> SealingKey {
        let mut secret = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut secret);
        SealingKey::derive(&secret).unwrap()
    }

    #[test]
    fn test_seal_open() {
        let key = random_key();
        let sealed = seal_hex(&key, "ya29.token").unwrap();
        assert!(!sealed.contains("ya29"));
        assert_eq!(open_hex(&key, &sealed).unwrap(), "ya29.token");
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = seal_hex(&random_key(), "secret").unwrap();
        assert!(open_hex(&random_key(), &sealed).is_err());
    }

    #[test]
    fn test_short_ciphertext_rejected() {
        assert!(decrypt(&random_key(), &[0u8; 4]).is_err());
    }

    #[test]
    fn test_key_file_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.key");

        let first = load_or_create_key(&path).unwrap();
        let second = load_or_create_key(&path).unwrap();
        assert_eq!(first.as_bytes(), second.as_bytes());
    }

    #[cfg(unix)]
    #[test]
    fn test_key_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.key");
        load_or_create_key(&path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_bad_key_length() {
        assert!(hex_to_secret("abcd").is_err());
    }
}
