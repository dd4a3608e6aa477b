/// AES-256-CBC content cipher
///
/// Artifact bodies are stored as `hex(iv):hex(ciphertext)` tokens, where the
/// IV is 16 fresh random bytes per call and the plaintext is PKCS#7 padded.
/// Encrypting the same text twice therefore yields different tokens.
///
/// Decryption is lenient: anything that is not a well-formed token for this
/// key (rows written before encryption was enabled, a rotated key, plain
/// garbage) is returned unchanged instead of failing the read.
///
/// # Example
///
/// ```
/// use oracle_shared::crypto::ContentCipher;
///
/// let cipher = ContentCipher::new([7u8; 32]);
/// let token = cipher.encrypt(Some("# Dragons")).unwrap();
///
/// assert!(token.contains(':'));
/// assert_eq!(cipher.decrypt(Some(&token)).as_deref(), Some("# Dragons"));
/// assert_eq!(cipher.decrypt(Some("not a token")).as_deref(), Some("not a token"));
/// ```

use aes::Aes256;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Key length in bytes
pub const KEY_LEN: usize = 32;

/// IV length in bytes
pub const IV_LEN: usize = 16;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CipherError {
    #[error("Encryption key is not valid hex: {0}")]
    InvalidHex(String),

    #[error("Encryption key must be 32 bytes, got {0}")]
    InvalidKeyLength(usize),
}

#[derive(Clone)]
pub struct ContentCipher {
    key: [u8; KEY_LEN],
}

impl std::fmt::Debug for ContentCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentCipher").field("key", &"<redacted>").finish()
    }
}

impl ContentCipher {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    /// Builds a cipher from a 64-character hex key
    pub fn from_hex(hex_key: &str) -> Result<Self, CipherError> {
        let bytes = hex::decode(hex_key.trim()).map_err(|e| CipherError::InvalidHex(e.to_string()))?;
        let key: [u8; KEY_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CipherError::InvalidKeyLength(bytes.len()))?;
        Ok(Self::new(key))
    }

    /// Encrypts `plaintext`, or returns None for absent/empty input
    pub fn encrypt(&self, plaintext: Option<&str>) -> Option<String> {
        let plaintext = plaintext.filter(|p| !p.is_empty())?;

        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let ciphertext = Aes256CbcEnc::new(&self.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        Some(format!("{}:{}", hex::encode(iv), hex::encode(ciphertext)))
    }

    /// Decrypts a token produced by [`encrypt`](Self::encrypt)
    ///
    /// Absent or empty input gives None; input that does not decrypt comes
    /// back as-is.
    pub fn decrypt(&self, token: Option<&str>) -> Option<String> {
        let token = token.filter(|t| !t.is_empty())?;
        Some(self.try_decrypt(token).unwrap_or_else(|| token.to_string()))
    }

    fn try_decrypt(&self, token: &str) -> Option<String> {
        let (iv_hex, ct_hex) = token.split_once(':')?;

        let iv: [u8; IV_LEN] = hex::decode(iv_hex).ok()?.as_slice().try_into().ok()?;
        let ciphertext = hex::decode(ct_hex).ok()?;
        if ciphertext.is_empty() {
            return None;
        }

        let plaintext = Aes256CbcDec::new(&self.key.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .ok()?;

        String::from_utf8(plaintext).ok()
    }
}
