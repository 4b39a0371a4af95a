// drbackup/src/encryption/mod.rs
//
// Password-derived authenticated encryption for backup artifacts. The
// on-disk envelope is `[salt: 32][nonce: 12][ciphertext + tag]`; the salt and
// nonce are drawn fresh from the OS CSPRNG for every call, and the password
// itself is never persisted anywhere.
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use std::fs;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

use crate::errors::{AppError, Result};

/// AES-256 key width in bytes.
pub const KEY_SIZE: usize = 32;
/// Salt width for key derivation.
pub const SALT_SIZE: usize = 32;
/// GCM nonce width.
pub const NONCE_SIZE: usize = 12;
/// PBKDF2-HMAC-SHA256 iteration count.
pub const PBKDF2_ITERATIONS: u32 = 100_000;
/// Filename suffix marking an encrypted artifact.
pub const ENCRYPTED_SUFFIX: &str = ".encrypted";

const DECRYPTED_SUFFIX: &str = ".decrypted";

/// Encrypts a file with AES-256-GCM under a password-derived key and writes
/// the envelope next to the input with the `.encrypted` suffix appended.
///
/// The whole plaintext is read into memory; inputs here are already-compressed
/// archives, so memory stays bounded by the artifact size. Key derivation and
/// cipher setup happen before the output file is created, so a failing
/// encryption never leaves a truncated envelope behind.
pub fn encrypt_file(input_path: &Path, password: &str) -> Result<PathBuf> {
    let plaintext = fs::read(input_path)?;

    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    let key = derive_key(password, &salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key[..]));

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_slice())
        .map_err(|e| AppError::Crypto(format!("AES-GCM encryption failed: {}", e)))?;

    let mut envelope = Vec::with_capacity(SALT_SIZE + NONCE_SIZE + ciphertext.len());
    envelope.extend_from_slice(&salt);
    envelope.extend_from_slice(&nonce_bytes);
    envelope.extend_from_slice(&ciphertext);

    let output_path = encrypted_path_for(input_path);
    fs::write(&output_path, &envelope)?;

    Ok(output_path)
}

/// Decrypts a file produced by [`encrypt_file`]. The output path is the input
/// with the `.encrypted` suffix stripped, or `<input>.decrypted` when the
/// suffix is absent.
///
/// A wrong password and a corrupted envelope are deliberately reported as the
/// same error; GCM cannot tell them apart and neither should callers.
pub fn decrypt_file(input_path: &Path, password: &str) -> Result<PathBuf> {
    let envelope = fs::read(input_path)?;

    if envelope.len() < SALT_SIZE + NONCE_SIZE {
        return Err(AppError::Format(format!(
            "encrypted file too short: {} bytes, expected at least {}",
            envelope.len(),
            SALT_SIZE + NONCE_SIZE
        )));
    }

    let (salt, rest) = envelope.split_at(SALT_SIZE);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_SIZE);

    let key = derive_key(password, salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key[..]));

    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| AppError::Authentication)?;

    let output_path = decrypted_path_for(input_path);
    fs::write(&output_path, &plaintext)?;

    Ok(output_path)
}

/// Generates a random 256-bit key, base64-encoded for storage in environment
/// variables or secret managers. A generated key is used as the password
/// input to the same KDF path as a human password, so artifacts encrypted
/// either way share one on-disk format.
pub fn generate_key() -> String {
    let mut key = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut key);
    BASE64.encode(key)
}

/// Whether a file looks encrypted. Suffix-only: a renamed envelope bypasses
/// detection, which matches the established artifact naming convention.
pub fn is_encrypted(path: &Path) -> bool {
    path.as_os_str().to_string_lossy().ends_with(ENCRYPTED_SUFFIX)
}

fn derive_key(password: &str, salt: &[u8]) -> Zeroizing<[u8; KEY_SIZE]> {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key[..]);
    key
}

fn encrypted_path_for(path: &Path) -> PathBuf {
    let mut raw = path.as_os_str().to_os_string();
    raw.push(ENCRYPTED_SUFFIX);
    PathBuf::from(raw)
}

fn decrypted_path_for(path: &Path) -> PathBuf {
    let raw = path.as_os_str().to_string_lossy();
    match raw.strip_suffix(ENCRYPTED_SUFFIX) {
        Some(stripped) => PathBuf::from(stripped),
        None => {
            let mut raw = path.as_os_str().to_os_string();
            raw.push(DECRYPTED_SUFFIX);
            PathBuf::from(raw)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TAG_SIZE: usize = 16;

    #[test]
    fn test_encrypt_decrypt_roundtrip() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let plain_path = dir.path().join("backup.tar.gz");
        let content = b"not actually a tarball, but bytes are bytes";
        fs::write(&plain_path, content)?;

        let encrypted_path = encrypt_file(&plain_path, "correct horse battery staple")?;
        assert!(is_encrypted(&encrypted_path));
        assert_ne!(fs::read(&encrypted_path)?, content.to_vec());

        fs::remove_file(&plain_path)?;
        let decrypted_path = decrypt_file(&encrypted_path, "correct horse battery staple")?;
        assert_eq!(decrypted_path, plain_path);
        assert_eq!(fs::read(&decrypted_path)?, content.to_vec());
        Ok(())
    }

    #[test]
    fn test_envelope_layout() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let plain_path = dir.path().join("artifact");
        let content = b"payload";
        fs::write(&plain_path, content)?;

        let encrypted_path = encrypt_file(&plain_path, "pw")?;
        let envelope = fs::read(&encrypted_path)?;
        assert_eq!(envelope.len(), SALT_SIZE + NONCE_SIZE + content.len() + TAG_SIZE);
        Ok(())
    }

    #[test]
    fn test_salt_and_nonce_are_unique_per_call() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, b"same content")?;
        fs::write(&b, b"same content")?;

        let enc_a = fs::read(encrypt_file(&a, "pw")?)?;
        let enc_b = fs::read(encrypt_file(&b, "pw")?)?;
        assert_ne!(enc_a[..SALT_SIZE], enc_b[..SALT_SIZE]);
        assert_ne!(
            enc_a[SALT_SIZE..SALT_SIZE + NONCE_SIZE],
            enc_b[SALT_SIZE..SALT_SIZE + NONCE_SIZE]
        );
        Ok(())
    }

    #[test]
    fn test_wrong_password_is_authentication_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let plain_path = dir.path().join("artifact");
        fs::write(&plain_path, b"secret bytes")?;

        let encrypted_path = encrypt_file(&plain_path, "right")?;
        let result = decrypt_file(&encrypted_path, "wrong");
        assert!(matches!(result, Err(AppError::Authentication)));
        Ok(())
    }

    #[test]
    fn test_corrupted_envelope_is_authentication_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let plain_path = dir.path().join("artifact");
        fs::write(&plain_path, b"secret bytes")?;

        let encrypted_path = encrypt_file(&plain_path, "pw")?;
        let mut envelope = fs::read(&encrypted_path)?;
        let last = envelope.len() - 1;
        envelope[last] ^= 0xff;
        fs::write(&encrypted_path, &envelope)?;

        let result = decrypt_file(&encrypted_path, "pw");
        assert!(matches!(result, Err(AppError::Authentication)));
        Ok(())
    }

    #[test]
    fn test_truncated_envelope_is_format_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let short = dir.path().join("short.encrypted");
        fs::write(&short, vec![0u8; SALT_SIZE + NONCE_SIZE - 1])?;

        let result = decrypt_file(&short, "pw");
        assert!(matches!(result, Err(AppError::Format(_))));
        Ok(())
    }

    #[test]
    fn test_decrypt_without_suffix_appends_decrypted() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let plain_path = dir.path().join("renamed");
        fs::write(&plain_path, b"bytes")?;

        let encrypted_path = encrypt_file(&plain_path, "pw")?;
        let stripped = dir.path().join("no-marker");
        fs::rename(&encrypted_path, &stripped)?;

        let decrypted = decrypt_file(&stripped, "pw")?;
        assert_eq!(decrypted, dir.path().join("no-marker.decrypted"));
        assert_eq!(fs::read(&decrypted)?, b"bytes");
        Ok(())
    }

    #[test]
    fn test_generated_key_is_base64_of_32_bytes() {
        let key = generate_key();
        let decoded = BASE64.decode(&key).unwrap();
        assert_eq!(decoded.len(), KEY_SIZE);
        assert_ne!(generate_key(), key);
    }

    #[test]
    fn test_generated_key_roundtrips_through_kdf() -> anyhow::Result<()> {
        let key = generate_key();

        let dir = tempfile::tempdir()?;
        let plain_path = dir.path().join("artifact");
        fs::write(&plain_path, b"generated-key payload")?;

        let encrypted_path = encrypt_file(&plain_path, &key)?;
        fs::remove_file(&plain_path)?;
        let decrypted = decrypt_file(&encrypted_path, &key)?;
        assert_eq!(fs::read(&decrypted)?, b"generated-key payload");
        Ok(())
    }
}
