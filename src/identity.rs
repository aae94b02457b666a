//! Identity Issuance Service.
//!
//! Mints an RSA key pair, wraps it in a self-signed X.509 certificate for a
//! subject, and installs the pair into a password-protected keystore.
//!
//! Issued certificates follow one profile:
//!
//! - version 3, `sha256WithRSAEncryption`
//! - serial number = issuance time in milliseconds since the Unix epoch
//! - valid from 50 seconds before issuance until ten calendar years after it
//! - issuer = subject
//! - a non-critical subjectAltName naming the common name, as an iPAddress
//!   when it is an IP literal and a dNSName otherwise
//!
//! ```rust,no_run
//! use std::path::Path;
//! use provkit::cert::params::SubjectDescriptor;
//! use provkit::identity::IdentityIssuer;
//!
//! # fn main() -> Result<(), provkit::error::ProvKitError> {
//! let issuer = IdentityIssuer::default();
//! let subject = SubjectDescriptor::builder()
//!     .country("FR")
//!     .organization("Shiyatsu")
//!     .common_name("127.0.0.1")
//!     .build();
//!
//! let identity = issuer.issue_identity(&subject, None)?;
//! issuer.install_identity(
//!     Path::new("server.keystore"),
//!     &identity.cert,
//!     &identity.key,
//!     "Shiyatsu",
//!     "changeit",
//! )?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;

use bon::Builder;
use time::{Duration, OffsetDateTime};

use crate::cert::extensions::{SanEntry, SubjectAltName};
use crate::cert::params::{CertificationRequestInfo, ExtensionParam, SubjectDescriptor, Validity};
use crate::cert::{Certificate, CertificateWithPrivateKey};
use crate::error::{ProvKitError, Result};
use crate::key::{DEFAULT_RSA_BITS, KeyPair};
use crate::keystore::{self, KdfParams, Keystore};
use crate::logging::{self, LogSink, TracingSink};

const COMPONENT: &str = "identity";

pub const DEFAULT_VALIDITY_YEARS: i32 = 10;

/// Clock-skew allowance subtracted from the start of validity.
pub const DEFAULT_BACKDATE: Duration = Duration::seconds(50);

/// A certificate together with the key pair it certifies.
pub type IssuedIdentity = CertificateWithPrivateKey;

/// Issuance settings.
///
/// # Fields
/// * `key_bits` - RSA modulus size for generated key pairs.
/// * `validity_years` - Calendar years between issuance and expiry.
/// * `backdate` - How far before issuance validity starts.
/// * `kdf` - Argon2 costs used when writing keystores.
#[derive(Clone, Debug, Builder)]
pub struct IssuanceConfig {
    #[builder(default = DEFAULT_RSA_BITS)]
    pub key_bits: usize,
    #[builder(default = DEFAULT_VALIDITY_YEARS)]
    pub validity_years: i32,
    #[builder(default = DEFAULT_BACKDATE)]
    pub backdate: Duration,
    #[builder(default)]
    pub kdf: KdfParams,
}

impl Default for IssuanceConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Issues self-signed identities and installs them into keystores.
///
/// Holds no per-call state, so one issuer can be shared between threads.
pub struct IdentityIssuer {
    config: IssuanceConfig,
    sink: Arc<dyn LogSink>,
}

impl Default for IdentityIssuer {
    fn default() -> Self {
        Self::new(IssuanceConfig::default(), TracingSink::shared())
    }
}

impl IdentityIssuer {
    pub fn new(config: IssuanceConfig, sink: Arc<dyn LogSink>) -> Self {
        Self { config, sink }
    }

    pub fn config(&self) -> &IssuanceConfig {
        &self.config
    }

    /// Generates an RSA key pair of `config.key_bits` bits.
    pub fn generate_key_pair(&self) -> Result<KeyPair> {
        let key = KeyPair::generate_rsa(self.config.key_bits).map_err(|e| self.fail(e))?;
        self.sink
            .debug(COMPONENT, &format!("generated {}-bit RSA key pair", key.bits()));
        Ok(key)
    }

    /// Issues a self-signed certificate for `subject`.
    ///
    /// Uses `key_pair` when given, otherwise generates one. The key is
    /// dropped afterwards; use [`IdentityIssuer::issue_identity`] to keep it.
    pub fn issue_self_signed_certificate(
        &self,
        subject: &SubjectDescriptor,
        key_pair: Option<KeyPair>,
    ) -> Result<Certificate> {
        Ok(self.issue_identity(subject, key_pair)?.cert)
    }

    /// Issues a self-signed certificate and returns it with its key pair.
    ///
    /// The certificate is verified before it is returned: its signature must
    /// check out against both the issuing key and the key it embeds, and its
    /// validity window must contain the current time.
    pub fn issue_identity(
        &self,
        subject: &SubjectDescriptor,
        key_pair: Option<KeyPair>,
    ) -> Result<IssuedIdentity> {
        let key = match key_pair {
            Some(key) => key,
            None => self.generate_key_pair()?,
        };

        let cert = self
            .build_certificate(subject, &key)
            .map_err(|e| self.fail(e.into_issuance()))?;

        self.sink.debug(
            COMPONENT,
            &format!("issued self-signed certificate for {}", cert.subject_name()),
        );
        Ok(CertificateWithPrivateKey { cert, key })
    }

    /// Stores `key_pair` and `certificate` under `entry_name` in the keystore
    /// at `keystore_path`, creating the file if needed and replacing any
    /// entry with the same name.
    pub fn install_identity(
        &self,
        keystore_path: &Path,
        certificate: &Certificate,
        key_pair: &KeyPair,
        entry_name: &str,
        password: &str,
    ) -> Result<()> {
        let mut store =
            Keystore::open_with_sink(keystore_path, password, self.config.kdf, Arc::clone(&self.sink))?;
        store.set_key_entry(entry_name, key_pair, vec![certificate.clone()])?;
        store.store()?;
        self.sink.debug(
            keystore::COMPONENT,
            &format!("installed {entry_name:?} into {}", keystore_path.display()),
        );
        Ok(())
    }

    fn build_certificate(&self, subject: &SubjectDescriptor, key: &KeyPair) -> Result<Certificate> {
        let now = OffsetDateTime::now_utc();
        let validity = Validity::backdated(now, self.config.backdate, self.config.validity_years)?;

        let mut extensions = Vec::new();
        if let Some(cn) = subject.common_name() {
            let san = SubjectAltName {
                names: vec![SanEntry::for_host(cn)],
            };
            extensions.push(ExtensionParam::from_extension(san, false)?);
        }

        let request = CertificationRequestInfo::builder()
            .subject(subject.clone())
            .subject_public_key(key.public_key())
            .extensions(extensions)
            .build();
        let cert = Certificate::new_self_signed(&request, key, validity, serial_number_at(now))?;

        cert.verify_signature(&key.public_key())?;
        cert.verify_self_signed()?;
        cert.check_validity(OffsetDateTime::now_utc())?;
        Ok(cert)
    }

    fn fail(&self, err: ProvKitError) -> ProvKitError {
        logging::report(self.sink.as_ref(), COMPONENT, err)
    }
}

/// Milliseconds since the Unix epoch, big-endian, without leading zeros.
fn serial_number_at(instant: OffsetDateTime) -> Vec<u8> {
    let millis = (instant.unix_timestamp_nanos() / 1_000_000) as u64;
    let bytes = millis.to_be_bytes();
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);
    bytes[start..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::testing::RecordingSink;
    use time::macros::datetime;

    fn test_issuer(sink: Arc<dyn LogSink>) -> IdentityIssuer {
        let config = IssuanceConfig::builder()
            .key_bits(2048)
            .kdf(KdfParams::builder().m_cost(1024).t_cost(1).build())
            .build();
        IdentityIssuer::new(config, sink)
    }

    fn serial_to_u64(bytes: &[u8]) -> u64 {
        bytes.iter().fold(0, |acc, b| (acc << 8) | u64::from(*b))
    }

    #[test]
    fn test_default_config() {
        let config = IssuanceConfig::default();
        assert_eq!(config.key_bits, 4096);
        assert_eq!(config.validity_years, 10);
        assert_eq!(config.backdate, Duration::seconds(50));
    }

    #[test]
    fn test_serial_number_is_epoch_millis() {
        let t = datetime!(2024-05-01 12:00:00.123 UTC);
        assert_eq!(serial_to_u64(&serial_number_at(t)), 1_714_564_800_123);
        assert_eq!(serial_number_at(datetime!(1970-01-01 00:00:00 UTC)), vec![0]);
    }

    #[test]
    fn test_issue_identity_profile() {
        let issuer = test_issuer(Arc::new(RecordingSink::default()));
        let subject = SubjectDescriptor::builder()
            .country("FR")
            .organization("Shiyatsu")
            .common_name("127.0.0.1")
            .build();

        let before = OffsetDateTime::now_utc();
        let identity = issuer.issue_identity(&subject, None).unwrap();
        let after = OffsetDateTime::now_utc();

        assert!(identity.is_consistent());
        let cert = &identity.cert;
        assert_eq!(cert.subject(), subject);
        assert_eq!(cert.issuer(), subject);

        let serial = serial_to_u64(&cert.serial_number()) as i128;
        assert!(serial >= before.unix_timestamp_nanos() / 1_000_000);
        assert!(serial <= after.unix_timestamp_nanos() / 1_000_000);

        let validity = cert.validity();
        assert!(validity.not_before <= after - Duration::seconds(50));
        assert!(validity.not_before >= before - Duration::seconds(51));
        assert!(validity.not_after >= before + Duration::days(3650));
        assert!(validity.not_after <= after + Duration::days(3653));

        let san = cert.subject_alt_name().unwrap().unwrap();
        assert_eq!(san.names, vec![SanEntry::for_host("127.0.0.1")]);
        assert!(cert.extensions().iter().all(|ext| !ext.critical));
    }

    #[test]
    fn test_supplied_key_pair_is_used() {
        let issuer = test_issuer(Arc::new(RecordingSink::default()));
        let key = KeyPair::generate_rsa(2048).unwrap();
        let subject = SubjectDescriptor::builder().common_name("example.com").build();

        let cert = issuer
            .issue_self_signed_certificate(&subject, Some(key.clone()))
            .unwrap();
        assert_eq!(cert.public_key().unwrap(), key.public_key());
        assert_eq!(
            cert.subject_alt_name().unwrap().unwrap().names,
            vec![SanEntry::Dns("example.com".to_string())]
        );
    }

    #[test]
    fn test_no_common_name_means_no_san() {
        let issuer = test_issuer(Arc::new(RecordingSink::default()));
        let subject = SubjectDescriptor::builder().organization("Shiyatsu").build();
        let cert = issuer.issue_self_signed_certificate(&subject, None).unwrap();
        assert!(cert.subject_alt_name().unwrap().is_none());
    }

    #[test]
    fn test_unencodable_san_is_issuance_failure_and_logged() {
        let sink = Arc::new(RecordingSink::default());
        let issuer = test_issuer(sink.clone());
        let subject = SubjectDescriptor::builder().common_name("bücher.example").build();

        let err = issuer.issue_self_signed_certificate(&subject, None).unwrap_err();
        assert!(matches!(err, ProvKitError::CertificateIssuanceFailure { .. }));
        assert_eq!(sink.errors().len(), 1);
    }

    #[test]
    fn test_install_rejects_mismatched_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.keystore");
        let sink = Arc::new(RecordingSink::default());
        let issuer = test_issuer(sink.clone());
        let subject = SubjectDescriptor::builder().common_name("localhost").build();

        let identity = issuer.issue_identity(&subject, None).unwrap();
        let other = issuer.generate_key_pair().unwrap();
        let err = issuer
            .install_identity(&path, &identity.cert, &other, "server", "changeit")
            .unwrap_err();

        assert!(matches!(err, ProvKitError::KeystoreFailure { .. }));
        assert!(!path.exists());
        assert_eq!(sink.errors().len(), 1);
        let records = sink.records.lock().unwrap();
        assert!(records.iter().any(|(_, component, ..)| *component == keystore::COMPONENT));
    }
}
