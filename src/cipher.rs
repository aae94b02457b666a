//! Symmetric Cipher Service.
//!
//! Protects text secrets with AES-GCM under a single key held by a
//! [`CipherService`]. The caller asks for a fresh nonce per encryption and
//! stores it next to the ciphertext; decryption needs the identical nonce.
//! Keys, nonces and ciphertexts cross the API as standard Base64.

use std::fmt;
use std::sync::Arc;

use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{Aead, KeyInit, Nonce};
use aes_gcm::aes::Aes192;
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::Rng;
use rand_core::{OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{ProvKitError, Result};
use crate::logging::{self, LogSink, TracingSink};

const COMPONENT: &str = "cipher";

/// AES-GCM nonce length in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// Authentication tag appended to every ciphertext.
pub const TAG_LEN: usize = 16;

type Aes192Gcm = AesGcm<Aes192, U12>;

/// AES key sizes selectable through [`generate_key_text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStrength {
    Aes128,
    Aes192,
    Aes256,
}

impl KeyStrength {
    /// Number of key text characters whose Base64 encoding is exactly one
    /// AES key of this strength.
    pub fn text_len(self) -> usize {
        match self {
            KeyStrength::Aes128 => 12,
            KeyStrength::Aes192 => 18,
            KeyStrength::Aes256 => 24,
        }
    }
}

/// Generates random alphanumeric key text suitable for
/// [`CipherService::initialize`].
pub fn generate_key_text(strength: KeyStrength) -> String {
    rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(strength.text_len())
        .map(char::from)
        .collect()
}

/// AES key material. Zeroized on drop and never serialized.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey {
    bytes: Vec<u8>,
}

impl SecretKey {
    /// Derives a key from text: the key bytes are the Base64 encoding of the
    /// UTF-8 text, which must come out at 16, 24 or 32 bytes.
    pub fn from_text(key_text: &str) -> Result<Self> {
        let bytes = BASE64.encode(key_text.as_bytes()).into_bytes();
        match bytes.len() {
            16 | 24 | 32 => Ok(Self { bytes }),
            n => Err(ProvKitError::crypto(format!(
                "derived key is {n} bytes, AES requires 16, 24 or 32"
            ))),
        }
    }

    /// Key size in bits.
    pub fn bits(&self) -> usize {
        self.bytes.len() * 8
    }

    fn seal(&self, nonce: &[u8], plaintext: &[u8]) -> std::result::Result<Vec<u8>, aes_gcm::Error> {
        match self.bytes.len() {
            16 => seal_with::<Aes128Gcm>(&self.bytes, nonce, plaintext),
            24 => seal_with::<Aes192Gcm>(&self.bytes, nonce, plaintext),
            _ => seal_with::<Aes256Gcm>(&self.bytes, nonce, plaintext),
        }
    }

    fn open(&self, nonce: &[u8], ciphertext: &[u8]) -> std::result::Result<Vec<u8>, aes_gcm::Error> {
        match self.bytes.len() {
            16 => open_with::<Aes128Gcm>(&self.bytes, nonce, ciphertext),
            24 => open_with::<Aes192Gcm>(&self.bytes, nonce, ciphertext),
            _ => open_with::<Aes256Gcm>(&self.bytes, nonce, ciphertext),
        }
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey(AES-{}, [REDACTED])", self.bits())
    }
}

fn seal_with<C: KeyInit + Aead>(
    key: &[u8],
    nonce: &[u8],
    plaintext: &[u8],
) -> std::result::Result<Vec<u8>, aes_gcm::Error> {
    let cipher = C::new_from_slice(key).map_err(|_| aes_gcm::Error)?;
    cipher.encrypt(Nonce::<C>::from_slice(nonce), plaintext)
}

fn open_with<C: KeyInit + Aead>(
    key: &[u8],
    nonce: &[u8],
    ciphertext: &[u8],
) -> std::result::Result<Vec<u8>, aes_gcm::Error> {
    let cipher = C::new_from_slice(key).map_err(|_| aes_gcm::Error)?;
    cipher.decrypt(Nonce::<C>::from_slice(nonce), ciphertext)
}

fn decode_nonce(nonce: &str) -> Result<Vec<u8>> {
    let bytes = BASE64
        .decode(nonce)
        .map_err(|e| ProvKitError::crypto("nonce is not valid Base64").with_source(e))?;
    if bytes.len() != NONCE_LEN {
        return Err(ProvKitError::crypto(format!(
            "nonce must be {NONCE_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

/// Encrypts and decrypts text under one AES key.
///
/// The service starts without a key. `initialize` needs `&mut self` while
/// `encrypt`/`decrypt` only borrow, so sharing one service between threads
/// that also rotate the key goes through `Arc<RwLock<CipherService>>`.
pub struct CipherService {
    key: Option<SecretKey>,
    sink: Arc<dyn LogSink>,
}

impl Default for CipherService {
    fn default() -> Self {
        Self::new(TracingSink::shared())
    }
}

impl fmt::Debug for CipherService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherService")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl CipherService {
    /// Creates a service with no key.
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { key: None, sink }
    }

    /// Creates a service and initializes it in one step.
    pub fn with_key(key_text: &str, sink: Arc<dyn LogSink>) -> Result<Self> {
        let mut service = Self::new(sink);
        service.initialize(key_text)?;
        Ok(service)
    }

    /// Derives a key from `key_text` and stores it, replacing any previous key.
    ///
    /// On failure the previous key, if any, is kept.
    pub fn initialize(&mut self, key_text: &str) -> Result<()> {
        let key = SecretKey::from_text(key_text).map_err(|e| self.fail(e))?;
        self.sink
            .debug(COMPONENT, &format!("initialized AES-{} key", key.bits()));
        self.key = Some(key);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.key.is_some()
    }

    /// Returns a fresh random nonce, Base64-encoded.
    ///
    /// Call once per encryption and never reuse the value under the same key.
    pub fn generate_nonce(&self) -> String {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        BASE64.encode(nonce)
    }

    /// Encrypts `plaintext` under the current key and `nonce`.
    ///
    /// # Returns
    /// Base64 of the ciphertext followed by the 16-byte authentication tag.
    pub fn encrypt(&self, plaintext: &str, nonce: &str) -> Result<String> {
        let key = self.key()?;
        let nonce = decode_nonce(nonce).map_err(|e| self.fail(e))?;
        let sealed = key.seal(&nonce, plaintext.as_bytes()).map_err(|e| {
            self.fail(ProvKitError::crypto("Fail to encrypt input").with_source(e.to_string()))
        })?;
        Ok(BASE64.encode(sealed))
    }

    /// Decrypts Base64 `ciphertext` produced by [`CipherService::encrypt`].
    ///
    /// A wrong key, wrong nonce or tampered ciphertext all produce the same
    /// `CryptoFailure` with no cause attached.
    pub fn decrypt(&self, ciphertext: &str, nonce: &str) -> Result<String> {
        let key = self.key()?;
        let nonce = decode_nonce(nonce).map_err(|e| self.fail(e))?;
        let sealed = BASE64.decode(ciphertext).map_err(|e| {
            self.fail(ProvKitError::crypto("ciphertext is not valid Base64").with_source(e))
        })?;
        let plaintext = key
            .open(&nonce, &sealed)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or_else(|| self.fail(ProvKitError::crypto("decryption failed")))?;
        Ok(plaintext)
    }

    fn key(&self) -> Result<&SecretKey> {
        self.key
            .as_ref()
            .ok_or_else(|| self.fail(ProvKitError::NotInitialized))
    }

    fn fail(&self, err: ProvKitError) -> ProvKitError {
        logging::report(self.sink.as_ref(), COMPONENT, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::testing::RecordingSink;

    const TEST_KEY: &str = "1234567891564874";

    fn service() -> CipherService {
        CipherService::with_key(TEST_KEY, Arc::new(RecordingSink::default())).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_hello_world() {
        let service = service();
        let nonce = service.generate_nonce();
        let encrypted = service.encrypt("Hello, World!", &nonce).unwrap();
        assert!(!encrypted.is_empty());
        assert_ne!(encrypted, "Hello, World!");
        assert_eq!(service.decrypt(&encrypted, &nonce).unwrap(), "Hello, World!");
    }

    #[test]
    fn test_key_text_sizes() {
        assert_eq!(SecretKey::from_text(TEST_KEY).unwrap().bits(), 192);
        assert_eq!(SecretKey::from_text("mySecretKey").unwrap().bits(), 128);
        assert_eq!(SecretKey::from_text(&"k".repeat(24)).unwrap().bits(), 256);
        assert!(matches!(
            SecretKey::from_text("short"),
            Err(ProvKitError::CryptoFailure { .. })
        ));
    }

    #[test]
    fn test_generated_key_text_initializes() {
        for strength in [KeyStrength::Aes128, KeyStrength::Aes192, KeyStrength::Aes256] {
            let text = generate_key_text(strength);
            assert_eq!(text.len(), strength.text_len());
            assert!(text.chars().all(|c| c.is_ascii_alphanumeric()));
            let service = CipherService::with_key(&text, Arc::new(RecordingSink::default())).unwrap();
            let nonce = service.generate_nonce();
            let encrypted = service.encrypt("secret", &nonce).unwrap();
            assert_eq!(service.decrypt(&encrypted, &nonce).unwrap(), "secret");
        }
    }

    #[test]
    fn test_nonce_is_twelve_random_bytes() {
        let service = service();
        let a = BASE64.decode(service.generate_nonce()).unwrap();
        let b = BASE64.decode(service.generate_nonce()).unwrap();
        assert_eq!(a.len(), NONCE_LEN);
        assert_ne!(a, b);
    }

    #[test]
    fn test_ciphertext_carries_tag() {
        let service = service();
        let nonce = service.generate_nonce();
        let encrypted = BASE64.decode(service.encrypt("abc", &nonce).unwrap()).unwrap();
        assert_eq!(encrypted.len(), 3 + TAG_LEN);
    }

    #[test]
    fn test_uninitialized_service_fails() {
        let sink = Arc::new(RecordingSink::default());
        let service = CipherService::new(sink.clone());
        let nonce = service.generate_nonce();
        assert!(matches!(
            service.encrypt("x", &nonce),
            Err(ProvKitError::NotInitialized)
        ));
        assert!(matches!(
            service.decrypt("eA==", &nonce),
            Err(ProvKitError::NotInitialized)
        ));
        assert_eq!(sink.errors().len(), 2);
    }

    #[test]
    fn test_malformed_nonce_is_rejected() {
        let service = service();
        let err = service.encrypt("x", "not base64!").unwrap_err();
        assert!(matches!(err, ProvKitError::CryptoFailure { source: Some(_), .. }));

        let short = BASE64.encode([0u8; 8]);
        let err = service.encrypt("x", &short).unwrap_err();
        assert!(matches!(err, ProvKitError::CryptoFailure { .. }));
    }

    #[test]
    fn test_tamper_and_wrong_nonce_look_identical() {
        let service = service();
        let nonce = service.generate_nonce();
        let encrypted = service.encrypt("Hello, World!", &nonce).unwrap();

        let mut raw = BASE64.decode(&encrypted).unwrap();
        raw[0] ^= 0x01;
        let tampered = service.decrypt(&BASE64.encode(raw), &nonce).unwrap_err();
        let wrong_nonce = service
            .decrypt(&encrypted, &service.generate_nonce())
            .unwrap_err();

        assert_eq!(tampered.to_string(), wrong_nonce.to_string());
        assert!(matches!(
            wrong_nonce,
            ProvKitError::CryptoFailure { source: None, .. }
        ));
    }

    #[test]
    fn test_failed_initialize_keeps_previous_key() {
        let mut service = service();
        let nonce = service.generate_nonce();
        let encrypted = service.encrypt("keep", &nonce).unwrap();
        assert!(service.initialize("bad").is_err());
        assert_eq!(service.decrypt(&encrypted, &nonce).unwrap(), "keep");
    }

    #[test]
    fn test_reinitialize_replaces_key() {
        let mut service = service();
        let nonce = service.generate_nonce();
        let encrypted = service.encrypt("rotate", &nonce).unwrap();
        service.initialize("mySecretKey").unwrap();
        assert!(service.decrypt(&encrypted, &nonce).is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let rendered = format!("{:?}", service());
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains(TEST_KEY));
    }
}
