pub mod extensions;
pub mod params;

use der::{Decode, DecodePem, Encode, EncodePem};
use extensions::{SubjectAltName, ToAndFromX509Extension};
use params::{CertificationRequestInfo, ExtensionParam, SubjectDescriptor, Validity};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use crate::error::{ProvKitError, Result};
use crate::issuer::Issuer;
use crate::key::{KeyPair, PublicKey};
use crate::tbs_certificate::from_x509_time;

/// Signature algorithms certificates are signed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// SHA-256 with RSA encryption (RSASSA-PKCS1-v1_5).
    Sha256WithRSA,
}

impl From<SignatureAlgorithm> for x509_cert::spki::AlgorithmIdentifierOwned {
    /// Converts a `SignatureAlgorithm` into an `AlgorithmIdentifierOwned`.
    ///
    /// RSA PKCS#1 v1.5 identifiers carry an explicit NULL parameter (RFC 4055).
    fn from(value: SignatureAlgorithm) -> Self {
        match value {
            SignatureAlgorithm::Sha256WithRSA => x509_cert::spki::AlgorithmIdentifierOwned {
                oid: const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
                parameters: Some(der::asn1::AnyRef::NULL.into()),
            },
        }
    }
}

/// Represents an X.509 certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// The inner representation of the certificate.
    pub inner: x509_cert::Certificate,
}

impl Certificate {
    /// Encodes the certificate into DER format.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.inner
            .to_der()
            .map_err(|e| ProvKitError::crypto("failed to encode certificate").with_source(e))
    }

    /// Encodes the certificate into PEM format.
    pub fn to_pem(&self) -> Result<String> {
        self.inner
            .to_pem(pkcs8::LineEnding::LF)
            .map_err(|e| ProvKitError::crypto("failed to encode certificate").with_source(e))
    }

    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner = x509_cert::Certificate::from_der(der)
            .map_err(|e| ProvKitError::crypto("failed to decode certificate").with_source(e))?;
        Ok(Self { inner })
    }

    pub fn from_pem(pem: &str) -> Result<Self> {
        let inner = x509_cert::Certificate::from_pem(pem)
            .map_err(|e| ProvKitError::crypto("failed to decode certificate").with_source(e))?;
        Ok(Self { inner })
    }

    /// Big-endian serial number bytes, without a leading sign octet.
    pub fn serial_number(&self) -> Vec<u8> {
        let bytes = self.inner.tbs_certificate.serial_number.as_bytes();
        let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
        bytes[start..].to_vec()
    }

    pub fn subject(&self) -> SubjectDescriptor {
        SubjectDescriptor::from_x509_name(&self.inner.tbs_certificate.subject)
    }

    pub fn issuer(&self) -> SubjectDescriptor {
        SubjectDescriptor::from_x509_name(&self.inner.tbs_certificate.issuer)
    }

    /// RFC 4514 rendering of the subject name.
    pub fn subject_name(&self) -> String {
        self.inner.tbs_certificate.subject.to_string()
    }

    pub fn validity(&self) -> Validity {
        let validity = &self.inner.tbs_certificate.validity;
        Validity {
            not_before: from_x509_time(&validity.not_before),
            not_after: from_x509_time(&validity.not_after),
        }
    }

    /// The public key embedded in the certificate.
    pub fn public_key(&self) -> Result<PublicKey> {
        PublicKey::from_x509spki(&self.inner.tbs_certificate.subject_public_key_info)
    }

    pub fn extensions(&self) -> Vec<ExtensionParam> {
        self.inner
            .tbs_certificate
            .extensions
            .iter()
            .flatten()
            .map(|ext| ExtensionParam {
                oid: ext.extn_id,
                critical: ext.critical,
                value: ext.extn_value.as_bytes().to_vec(),
            })
            .collect()
    }

    /// Decodes the subjectAltName extension, if present.
    pub fn subject_alt_name(&self) -> Result<Option<SubjectAltName>> {
        self.extensions()
            .iter()
            .find(|ext| ext.oid == SubjectAltName::OID)
            .map(ExtensionParam::to_extension::<SubjectAltName>)
            .transpose()
    }

    /// SHA-256 over the DER encoding, as colon-separated upper-case hex.
    pub fn fingerprint_sha256(&self) -> Result<String> {
        let digest = Sha256::digest(self.to_der()?);
        Ok(digest
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(":"))
    }

    /// Checks the signature over the TBS portion against `key`.
    pub fn verify_signature(&self, key: &PublicKey) -> Result<()> {
        if self.inner.signature_algorithm.oid != const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION {
            return Err(ProvKitError::crypto(format!(
                "unsupported signature algorithm {}",
                self.inner.signature_algorithm.oid
            )));
        }
        let tbs = self
            .inner
            .tbs_certificate
            .to_der()
            .map_err(|e| ProvKitError::crypto("failed to encode TBS certificate").with_source(e))?;
        let signature = self
            .inner
            .signature
            .as_bytes()
            .ok_or_else(|| ProvKitError::crypto("signature has unused bits"))?;
        key.verify(&tbs, signature)
    }

    /// Checks the signature against the certificate's own public key.
    pub fn verify_self_signed(&self) -> Result<()> {
        self.verify_signature(&self.public_key()?)
    }

    /// Fails unless `at` lies inside the validity window.
    pub fn check_validity(&self, at: OffsetDateTime) -> Result<()> {
        let validity = self.validity();
        if validity.contains(at) {
            Ok(())
        } else {
            Err(ProvKitError::crypto(format!(
                "certificate valid from {} to {}, checked at {at}",
                validity.not_before, validity.not_after
            )))
        }
    }

    /// Creates a new self-signed certificate.
    ///
    /// # Arguments
    /// * `cert_info` - The certification request information.
    /// * `key` - The key pair used to sign the certificate.
    /// * `validity` - The validity window.
    /// * `serial_number` - Big-endian unsigned serial number.
    pub fn new_self_signed(
        cert_info: &CertificationRequestInfo,
        key: &KeyPair,
        validity: Validity,
        serial_number: Vec<u8>,
    ) -> Result<Self> {
        // For self-signed certificates, the issuer is the same as the subject
        let self_issuer = SelfIssuer {
            name: &cert_info.subject,
            key,
            serial_number,
        };
        self_issuer.issue(cert_info, validity)
    }
}

// Helper struct for self-signed certificates
struct SelfIssuer<'a> {
    name: &'a SubjectDescriptor,
    key: &'a KeyPair,
    serial_number: Vec<u8>,
}

impl Issuer for SelfIssuer<'_> {
    fn issuer_name(&self) -> &SubjectDescriptor {
        self.name
    }

    fn signing_key(&self) -> &KeyPair {
        self.key
    }

    fn serial_number(&self) -> Vec<u8> {
        self.serial_number.clone()
    }
}

/// A certificate together with the key pair it certifies.
#[derive(Debug, Clone)]
pub struct CertificateWithPrivateKey {
    pub cert: Certificate,
    pub key: KeyPair,
}

impl CertificateWithPrivateKey {
    /// True when the key pair's public half is the one in the certificate.
    pub fn is_consistent(&self) -> bool {
        self.cert
            .public_key()
            .is_ok_and(|public| public == self.key.public_key())
    }
}
