use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use x509_cert::spki::SubjectPublicKeyInfoOwned;
use zeroize::Zeroizing;

use crate::error::{ProvKitError, Result};

/// Default RSA modulus size for issued identities.
pub const DEFAULT_RSA_BITS: usize = 4096;

/// An RSA key pair.
///
/// Produced per issuance request and handed on to certificate generation or
/// keystore installation; nothing in the crate caches it.
#[derive(Clone)]
pub struct KeyPair {
    private: Box<RsaPrivateKey>,
    public: RsaPublicKey,
}

impl KeyPair {
    /// Generate an RSA key pair with the specified number of bits.
    pub fn generate_rsa(bits: usize) -> Result<Self> {
        let mut rng = rand_core::OsRng;
        let private = RsaPrivateKey::new(&mut rng, bits).map_err(|e| {
            ProvKitError::key_gen(format!("Fail to generate {bits}-bit RSA key pair")).with_source(e)
        })?;
        let public = RsaPublicKey::from(&private);
        Ok(KeyPair {
            private: Box::new(private),
            public,
        })
    }

    /// Generate an RSA key pair of [`DEFAULT_RSA_BITS`].
    pub fn generate() -> Result<Self> {
        Self::generate_rsa(DEFAULT_RSA_BITS)
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.public.clone())
    }

    /// Modulus size in bits.
    pub fn bits(&self) -> usize {
        self.public.size() * 8
    }

    /// Returns the SubjectPublicKeyInfo for the public half.
    pub fn as_spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        self.public_key().to_spki()
    }

    /// Signs `data` with RSASSA-PKCS1-v1_5 over SHA-256.
    pub fn sign_data(&self, data: &[u8]) -> Result<Vec<u8>> {
        let signing_key = SigningKey::<Sha256>::new((*self.private).clone());
        let signature = signing_key
            .try_sign(data)
            .map_err(|e| ProvKitError::crypto("RSA signing failed").with_source(e))?;
        Ok(signature.to_vec())
    }

    /// Encodes the private key as PKCS#8 DER.
    pub fn to_pkcs8_der(&self) -> Result<Zeroizing<Vec<u8>>> {
        let doc = self
            .private
            .to_pkcs8_der()
            .map_err(|e| ProvKitError::crypto("failed to encode private key").with_source(e))?;
        Ok(Zeroizing::new(doc.as_bytes().to_vec()))
    }

    /// Encodes the private key as a PKCS#8 PEM string.
    pub fn to_pkcs8_pem(&self) -> Result<Zeroizing<String>> {
        self.private
            .to_pkcs8_pem(pkcs8::LineEnding::LF)
            .map_err(|e| ProvKitError::crypto("failed to encode private key").with_source(e))
    }

    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let private = RsaPrivateKey::from_pkcs8_der(der)
            .map_err(|e| ProvKitError::crypto("failed to decode private key").with_source(e))?;
        let public = RsaPublicKey::from(&private);
        Ok(KeyPair {
            private: Box::new(private),
            public,
        })
    }

    pub fn from_pkcs8_pem(pem: &str) -> Result<Self> {
        let private = RsaPrivateKey::from_pkcs8_pem(pem)
            .map_err(|e| ProvKitError::crypto("failed to decode private key").with_source(e))?;
        let public = RsaPublicKey::from(&private);
        Ok(KeyPair {
            private: Box::new(private),
            public,
        })
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("bits", &self.bits())
            .finish_non_exhaustive()
    }
}

/// The public half of a [`KeyPair`], or a key read back from a certificate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey(pub RsaPublicKey);

impl PublicKey {
    pub fn from_key_pair(key_pair: &KeyPair) -> Self {
        key_pair.public_key()
    }

    /// Reads an RSA key out of a SubjectPublicKeyInfo.
    pub fn from_x509spki(spki: &SubjectPublicKeyInfoOwned) -> Result<Self> {
        use der::Encode;
        let der = spki.to_der()?;
        let public = RsaPublicKey::from_public_key_der(&der)
            .map_err(|e| ProvKitError::crypto("unsupported public key").with_source(e))?;
        Ok(PublicKey(public))
    }

    pub fn to_spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        use der::Decode;
        let doc = self
            .0
            .to_public_key_der()
            .map_err(|e| ProvKitError::crypto("failed to encode public key").with_source(e))?;
        Ok(SubjectPublicKeyInfoOwned::from_der(doc.as_bytes())?)
    }

    /// Verifies a RSASSA-PKCS1-v1_5 / SHA-256 signature over `data`.
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> Result<()> {
        let verifying_key = VerifyingKey::<Sha256>::new(self.0.clone());
        let signature = Signature::try_from(signature)
            .map_err(|e| ProvKitError::crypto("malformed RSA signature").with_source(e))?;
        verifying_key
            .verify(data, &signature)
            .map_err(|e| ProvKitError::crypto("signature verification failed").with_source(e))
    }
}
