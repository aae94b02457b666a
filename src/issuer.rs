use der::Encode;
use x509_cert::certificate::CertificateInner;

use crate::cert::Certificate;
use crate::cert::SignatureAlgorithm;
use crate::cert::params::Validity;
use crate::cert::params::{CertificationRequestInfo, SubjectDescriptor};
use crate::error::{ProvKitError, Result};
use crate::key::KeyPair;
use crate::tbs_certificate::TbsCertificate;

/// Represents an entity capable of issuing certificates.
pub trait Issuer {
    /// Returns the distinguished name fields of the issuer.
    fn issuer_name(&self) -> &SubjectDescriptor;

    /// Returns the signing key of the issuer.
    fn signing_key(&self) -> &KeyPair;

    /// Returns the serial number for the next certificate.
    fn serial_number(&self) -> Vec<u8>;

    /// Issues a certificate based on the provided certification request information.
    ///
    /// # Arguments
    /// * `cert_request` - Subject, public key and extensions of the certificate.
    /// * `validity` - The validity window.
    ///
    /// # Returns
    /// The signed certificate. Errors at any stage are reported as
    /// `CertificateIssuanceFailure`.
    fn issue(&self, cert_request: &CertificationRequestInfo, validity: Validity) -> Result<Certificate> {
        let signature_algorithm = SignatureAlgorithm::Sha256WithRSA;

        let tbs_cert = TbsCertificate {
            serial_number: self.serial_number(),
            signature_algorithm: signature_algorithm.clone(),
            issuer: self.issuer_name().as_x509_name()?,
            not_before: validity.not_before,
            not_after: validity.not_after,
            subject: cert_request.subject.as_x509_name()?,
            subject_public_key: cert_request.subject_public_key.clone(),
            extensions: cert_request.extensions.clone(),
        };

        let tbs_cert_inner = tbs_cert.to_tbs_certificate_inner().map_err(ProvKitError::into_issuance)?;
        let tbs_der = tbs_cert_inner.to_der()?;

        let signature = self
            .signing_key()
            .sign_data(&tbs_der)
            .map_err(ProvKitError::into_issuance)?;

        let cert_inner = CertificateInner {
            tbs_certificate: tbs_cert_inner,
            signature_algorithm: signature_algorithm.into(),
            signature: der::asn1::BitString::from_bytes(&signature)?,
        };

        Ok(Certificate { inner: cert_inner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::params::ExtensionParam;
    use crate::cert::extensions::{SanEntry, SubjectAltName};
    use crate::key::PublicKey;

    struct FixedIssuer {
        name: SubjectDescriptor,
        key: KeyPair,
    }

    impl Issuer for FixedIssuer {
        fn issuer_name(&self) -> &SubjectDescriptor {
            &self.name
        }

        fn signing_key(&self) -> &KeyPair {
            &self.key
        }

        fn serial_number(&self) -> Vec<u8> {
            vec![0x2a]
        }
    }

    #[test]
    fn test_issue_signs_with_issuer_key() {
        let issuer = FixedIssuer {
            name: SubjectDescriptor::builder().common_name("issuer.local").build(),
            key: KeyPair::generate_rsa(2048).unwrap(),
        };
        let subject_key = KeyPair::generate_rsa(2048).unwrap();
        let request = CertificationRequestInfo::builder()
            .subject(SubjectDescriptor::builder().common_name("leaf.local").build())
            .subject_public_key(PublicKey::from_key_pair(&subject_key))
            .extensions(vec![
                ExtensionParam::from_extension(
                    SubjectAltName {
                        names: vec![SanEntry::for_host("leaf.local")],
                    },
                    false,
                )
                .unwrap(),
            ])
            .build();

        let cert = issuer.issue(&request, Validity::for_days(1)).unwrap();

        assert_eq!(cert.serial_number(), vec![0x2a]);
        assert_eq!(cert.issuer().common_name(), Some("issuer.local"));
        assert_eq!(cert.subject().common_name(), Some("leaf.local"));
        cert.verify_signature(&issuer.key.public_key()).unwrap();
        assert!(cert.verify_self_signed().is_err());
    }
}
