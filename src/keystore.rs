//! Password-protected keystore file.
//!
//! A keystore maps aliases to a private key plus its certificate chain. On
//! disk it is a JSON document whose entry map is encrypted with AES-256-GCM
//! under a key derived from the password with Argon2id:
//!
//! ```json
//! {
//!     "version": 1,
//!     "format": "provkit-keystore-v1",
//!     "kdf": {
//!         "algorithm": "argon2id",
//!         "m_cost": 19456, "t_cost": 2, "p_cost": 1,
//!         "salt": "<base64-16-bytes>"
//!     },
//!     "cipher": { "algorithm": "aes-256-gcm", "nonce": "<base64-12-bytes>" },
//!     "entries": "<base64-ciphertext>"
//! }
//! ```
//!
//! A [`Keystore`] is a snapshot: [`Keystore::open`] loads it, mutations stay
//! in memory, and [`Keystore::store`] rewrites the whole file. Two handles
//! storing to the same path race; the last `store` wins.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bon::Builder;
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::cert::Certificate;
use crate::error::{ProvKitError, Result};
use crate::key::KeyPair;
use crate::logging::{self, LogSink, TracingSink};
use crate::pem_utils;

pub(crate) const COMPONENT: &str = "keystore";

const KEYSTORE_VERSION: u32 = 1;
const KEYSTORE_FORMAT: &str = "provkit-keystore-v1";
const KDF_ALGORITHM: &str = "argon2id";
const CIPHER_ALGORITHM: &str = "aes-256-gcm";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

/// Upper bounds on Argon2 costs. Header values above these are rejected
/// before any key derivation runs.
pub const MAX_M_COST: u32 = 256 * 1024;
pub const MAX_T_COST: u32 = 16;
pub const MAX_P_COST: u32 = 8;

/// Argon2id cost parameters used when a keystore is written.
///
/// The defaults are the OWASP minimum for Argon2id (19 MiB, 2 passes, 1 lane).
#[derive(Clone, Copy, Debug, Builder, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory in KiB.
    #[builder(default = 19 * 1024)]
    pub m_cost: u32,
    #[builder(default = 2)]
    pub t_cost: u32,
    #[builder(default = 1)]
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl KdfParams {
    fn check_limits(&self) -> Result<()> {
        if self.m_cost > MAX_M_COST || self.t_cost > MAX_T_COST || self.p_cost > MAX_P_COST {
            return Err(ProvKitError::keystore(format!(
                "Argon2 costs m_cost={} t_cost={} p_cost={} exceed the supported limits",
                self.m_cost, self.t_cost, self.p_cost
            )));
        }
        Ok(())
    }

    fn derive_key(&self, password: &str, salt: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
        self.check_limits()?;
        let params = Params::new(self.m_cost, self.t_cost, self.p_cost, Some(32))
            .map_err(|e| ProvKitError::keystore("invalid Argon2 parameters").with_source(e.to_string()))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let mut output = Zeroizing::new([0u8; 32]);
        argon2
            .hash_password_into(password.as_bytes(), salt, output.as_mut())
            .map_err(|e| ProvKitError::keystore("key derivation failed").with_source(e.to_string()))?;
        Ok(output)
    }
}

// ── On-disk structures ───────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct KeystoreFile {
    version: u32,
    format: String,
    kdf: KdfHeader,
    cipher: CipherHeader,
    entries: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct KdfHeader {
    algorithm: String,
    #[serde(flatten)]
    params: KdfParams,
    salt: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct CipherHeader {
    algorithm: String,
    nonce: String,
}

/// One entry inside the encrypted map.
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct StoredEntry {
    /// PKCS#8 DER private key, base64.
    private_key: String,
    /// DER certificates, leaf first, base64.
    chain: Vec<String>,
    /// Unix seconds.
    created_at: i64,
}

// ── In-memory view ───────────────────────────────────────────────────────────

/// A private key with its certificate chain, leaf first.
///
/// Entries are only built by [`Keystore::set_key_entry`] or read back from a
/// file, so the chain is never empty.
#[derive(Clone, Debug)]
pub struct KeystoreEntry {
    private_key: KeyPair,
    chain: Vec<Certificate>,
    created_at: OffsetDateTime,
}

impl KeystoreEntry {
    pub fn private_key(&self) -> &KeyPair {
        &self.private_key
    }

    pub fn chain(&self) -> &[Certificate] {
        &self.chain
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    /// The end-entity certificate.
    pub fn certificate(&self) -> &Certificate {
        &self.chain[0]
    }

    /// The chain as concatenated PEM blocks.
    pub fn chain_to_pem(&self) -> Result<String> {
        pem_utils::encode_chain(&self.chain)
    }

    fn to_stored(&self) -> Result<StoredEntry> {
        let private_key = BASE64.encode(self.private_key.to_pkcs8_der()?.as_slice());
        let chain = self
            .chain
            .iter()
            .map(|cert| cert.to_der().map(|der| BASE64.encode(der)))
            .collect::<Result<Vec<_>>>()?;
        Ok(StoredEntry {
            private_key,
            chain,
            created_at: self.created_at.unix_timestamp(),
        })
    }

    fn from_stored(stored: &StoredEntry) -> Result<Self> {
        let key_der = Zeroizing::new(decode_b64(&stored.private_key, "private key")?);
        let private_key = KeyPair::from_pkcs8_der(&key_der)?;
        let chain = stored
            .chain
            .iter()
            .map(|cert| Certificate::from_der(&decode_b64(cert, "certificate")?))
            .collect::<Result<Vec<_>>>()?;
        if chain.is_empty() {
            return Err(ProvKitError::keystore("entry has an empty certificate chain"));
        }
        let created_at = OffsetDateTime::from_unix_timestamp(stored.created_at)
            .map_err(|e| ProvKitError::keystore("invalid entry timestamp").with_source(e))?;
        Ok(Self {
            private_key,
            chain,
            created_at,
        })
    }
}

/// Password-protected container of named key entries backed by one file.
pub struct Keystore {
    path: PathBuf,
    password: Zeroizing<String>,
    kdf: KdfParams,
    entries: BTreeMap<String, KeystoreEntry>,
    sink: Arc<dyn LogSink>,
}

impl fmt::Debug for Keystore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keystore")
            .field("path", &self.path)
            .field("aliases", &self.entries.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Keystore {
    /// Loads the keystore at `path`, or starts an empty one if the file does
    /// not exist. Nothing is written until [`Keystore::store`].
    pub fn open(path: impl AsRef<Path>, password: &str) -> Result<Self> {
        Self::open_with(path, password, KdfParams::default())
    }

    /// Like [`Keystore::open`], with the KDF costs used by later stores.
    ///
    /// An existing file is always decrypted with the costs in its own header.
    pub fn open_with(path: impl AsRef<Path>, password: &str, kdf: KdfParams) -> Result<Self> {
        Self::open_with_sink(path, password, kdf, TracingSink::shared())
    }

    /// Like [`Keystore::open_with`], reporting failures of this handle to `sink`.
    pub fn open_with_sink(
        path: impl AsRef<Path>,
        password: &str,
        kdf: KdfParams,
        sink: Arc<dyn LogSink>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = load_entries(&path, password)
            .map_err(|e| logging::report(sink.as_ref(), COMPONENT, e))?;
        sink.debug(
            COMPONENT,
            &format!("opened {} with {} entries", path.display(), entries.len()),
        );
        Ok(Self {
            path,
            password: Zeroizing::new(password.to_string()),
            kdf,
            entries,
            sink,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stores `key` and `chain` under `alias`, replacing any existing entry.
    ///
    /// The chain must start with the certificate for `key`.
    pub fn set_key_entry(&mut self, alias: &str, key: &KeyPair, chain: Vec<Certificate>) -> Result<()> {
        check_entry(alias, key, &chain).map_err(|e| self.fail(e))?;
        self.entries.insert(
            alias.to_string(),
            KeystoreEntry {
                private_key: key.clone(),
                chain,
                created_at: OffsetDateTime::now_utc(),
            },
        );
        Ok(())
    }

    pub fn entry(&self, alias: &str) -> Option<&KeystoreEntry> {
        self.entries.get(alias)
    }

    pub fn remove_entry(&mut self, alias: &str) -> Option<KeystoreEntry> {
        self.entries.remove(alias)
    }

    pub fn contains_alias(&self, alias: &str) -> bool {
        self.entries.contains_key(alias)
    }

    /// Aliases in sorted order.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encrypts every entry under a fresh salt and nonce and writes the file.
    pub fn store(&self) -> Result<()> {
        self.write_file().map_err(|e| self.fail(e))?;
        self.sink.debug(
            COMPONENT,
            &format!("stored {} entries to {}", self.entries.len(), self.path.display()),
        );
        Ok(())
    }

    fn fail(&self, err: ProvKitError) -> ProvKitError {
        logging::report(self.sink.as_ref(), COMPONENT, err)
    }

    fn write_file(&self) -> Result<()> {
        let stored = self
            .entries
            .iter()
            .map(|(alias, entry)| Ok::<_, ProvKitError>((alias.clone(), entry.to_stored()?)))
            .collect::<Result<BTreeMap<_, _>>>()
            .map_err(ProvKitError::into_keystore)?;
        let plaintext = Zeroizing::new(
            serde_json::to_vec(&stored)
                .map_err(|e| ProvKitError::keystore("failed to encode entries").with_source(e))?,
        );

        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let key = self.kdf.derive_key(&self.password, &salt)?;
        let cipher = Aes256Gcm::new_from_slice(key.as_ref())
            .map_err(|e| ProvKitError::keystore("cipher init failed").with_source(e.to_string()))?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|e| ProvKitError::keystore("failed to encrypt entries").with_source(e.to_string()))?;

        let file = KeystoreFile {
            version: KEYSTORE_VERSION,
            format: KEYSTORE_FORMAT.to_string(),
            kdf: KdfHeader {
                algorithm: KDF_ALGORITHM.to_string(),
                params: self.kdf,
                salt: BASE64.encode(salt),
            },
            cipher: CipherHeader {
                algorithm: CIPHER_ALGORITHM.to_string(),
                nonce: BASE64.encode(nonce),
            },
            entries: BASE64.encode(ciphertext),
        };
        let json = serde_json::to_vec_pretty(&file)
            .map_err(|e| ProvKitError::keystore("failed to encode keystore").with_source(e))?;

        write_atomic(&self.path, &json).map_err(|e| {
            ProvKitError::keystore(format!("Fail to write keystore {}", self.path.display()))
                .with_source(e)
        })
    }
}

fn check_entry(alias: &str, key: &KeyPair, chain: &[Certificate]) -> Result<()> {
    if alias.trim().is_empty() {
        return Err(ProvKitError::keystore("entry name must not be blank"));
    }
    let leaf = chain
        .first()
        .ok_or_else(|| ProvKitError::keystore("certificate chain must not be empty"))?;
    let leaf_key = leaf.public_key().map_err(ProvKitError::into_keystore)?;
    if leaf_key != key.public_key() {
        return Err(ProvKitError::keystore(format!(
            "private key for {alias:?} does not match its certificate"
        )));
    }
    Ok(())
}

fn load_entries(path: &Path, password: &str) -> Result<BTreeMap<String, KeystoreEntry>> {
    match std::fs::read(path) {
        Ok(bytes) => decrypt_entries(&bytes, password),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(e) => Err(ProvKitError::keystore(format!(
            "Fail to initialize keystore {}",
            path.display()
        ))
        .with_source(e)),
    }
}

fn decode_b64(value: &str, what: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(value)
        .map_err(|e| ProvKitError::keystore(format!("invalid {what} encoding")).with_source(e))
}

fn decrypt_entries(bytes: &[u8], password: &str) -> Result<BTreeMap<String, KeystoreEntry>> {
    let file: KeystoreFile = serde_json::from_slice(bytes)
        .map_err(|e| ProvKitError::keystore("not a keystore file").with_source(e))?;
    if file.version != KEYSTORE_VERSION
        || file.format != KEYSTORE_FORMAT
        || file.kdf.algorithm != KDF_ALGORITHM
        || file.cipher.algorithm != CIPHER_ALGORITHM
    {
        return Err(ProvKitError::keystore(format!(
            "unsupported keystore version={} format={}",
            file.version, file.format
        )));
    }

    file.kdf.params.check_limits()?;
    let salt = decode_b64(&file.kdf.salt, "salt")?;
    let nonce = decode_b64(&file.cipher.nonce, "nonce")?;
    if nonce.len() != NONCE_LEN {
        return Err(ProvKitError::keystore(format!("nonce must be {NONCE_LEN} bytes")));
    }
    let ciphertext = decode_b64(&file.entries, "entries")?;

    let key = file.kdf.params.derive_key(password, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(key.as_ref())
        .map_err(|e| ProvKitError::keystore("cipher init failed").with_source(e.to_string()))?;
    let plaintext = Zeroizing::new(
        cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
            .map_err(|_| ProvKitError::keystore("keystore password was incorrect"))?,
    );

    let stored: BTreeMap<String, StoredEntry> = serde_json::from_slice(&plaintext)
        .map_err(|e| ProvKitError::keystore("corrupt keystore entries").with_source(e))?;
    stored
        .iter()
        .map(|(alias, entry)| {
            KeystoreEntry::from_stored(entry)
                .map(|entry| (alias.clone(), entry))
                .map_err(ProvKitError::into_keystore)
        })
        .collect()
}

/// Writes `data` to a uniquely named temporary file next to `path`, syncs
/// it and renames it over `path`.
fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
