//! Error type shared by every provkit service.

use thiserror::Error;

/// Boxed underlying cause carried by a [`ProvKitError`].
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Represents errors that can occur in the provkit library.
///
/// The set is closed: callers are expected to match it exhaustively. Every
/// variant except [`ProvKitError::NotInitialized`] carries a message and an
/// optional wrapped cause, reachable through [`std::error::Error::source`].
#[derive(Debug, Error)]
pub enum ProvKitError {
    /// A symmetric operation was attempted before a key was set.
    #[error("Secret key is not initialized")]
    NotInitialized,

    /// Encryption, decryption, nonce handling or key derivation failed.
    #[error("Cipher error: {message}")]
    CryptoFailure {
        message: String,
        #[source]
        source: Option<Cause>,
    },

    /// Asymmetric key pair generation failed.
    #[error("Key generation error: {message}")]
    KeyGenFailure {
        message: String,
        #[source]
        source: Option<Cause>,
    },

    /// Building, signing or self-verifying a certificate failed.
    #[error("Certificate issuance error: {message}")]
    CertificateIssuanceFailure {
        message: String,
        #[source]
        source: Option<Cause>,
    },

    /// The keystore could not be opened, decrypted, encoded or written.
    #[error("Keystore error: {message}")]
    KeystoreFailure {
        message: String,
        #[source]
        source: Option<Cause>,
    },
}

pub type Result<T> = std::result::Result<T, ProvKitError>;

impl ProvKitError {
    pub fn crypto(message: impl Into<String>) -> Self {
        ProvKitError::CryptoFailure {
            message: message.into(),
            source: None,
        }
    }

    pub fn key_gen(message: impl Into<String>) -> Self {
        ProvKitError::KeyGenFailure {
            message: message.into(),
            source: None,
        }
    }

    pub fn issuance(message: impl Into<String>) -> Self {
        ProvKitError::CertificateIssuanceFailure {
            message: message.into(),
            source: None,
        }
    }

    pub fn keystore(message: impl Into<String>) -> Self {
        ProvKitError::KeystoreFailure {
            message: message.into(),
            source: None,
        }
    }

    /// Attaches an underlying cause, replacing any previous one.
    ///
    /// Has no effect on [`ProvKitError::NotInitialized`].
    pub fn with_source<E>(mut self, cause: E) -> Self
    where
        E: Into<Cause>,
    {
        match &mut self {
            ProvKitError::NotInitialized => {}
            ProvKitError::CryptoFailure { source, .. }
            | ProvKitError::KeyGenFailure { source, .. }
            | ProvKitError::CertificateIssuanceFailure { source, .. }
            | ProvKitError::KeystoreFailure { source, .. } => *source = Some(cause.into()),
        }
        self
    }

    /// Re-labels a cipher or key error raised by a lower layer as an issuance
    /// failure, keeping its message and cause. Other variants pass through.
    pub(crate) fn into_issuance(self) -> Self {
        match self {
            ProvKitError::CryptoFailure { message, source } => {
                ProvKitError::CertificateIssuanceFailure { message, source }
            }
            other => other,
        }
    }

    /// Re-labels any non-keystore error as a keystore failure.
    pub(crate) fn into_keystore(self) -> Self {
        match self {
            ProvKitError::KeystoreFailure { .. } => self,
            ProvKitError::NotInitialized => ProvKitError::keystore("Secret key is not initialized"),
            ProvKitError::CryptoFailure { message, source }
            | ProvKitError::KeyGenFailure { message, source }
            | ProvKitError::CertificateIssuanceFailure { message, source } => {
                ProvKitError::KeystoreFailure { message, source }
            }
        }
    }
}

impl From<der::Error> for ProvKitError {
    /// Converts a `der::Error` into a certificate issuance failure.
    fn from(err: der::Error) -> Self {
        ProvKitError::issuance("failed to encode certificate structure").with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_with_source_is_exposed() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = ProvKitError::keystore("cannot read keystore").with_source(io);
        assert_eq!(err.to_string(), "Keystore error: cannot read keystore");
        assert_eq!(err.source().unwrap().to_string(), "missing");
    }

    #[test]
    fn test_not_initialized_ignores_source() {
        let err = ProvKitError::NotInitialized.with_source("ignored");
        assert!(err.source().is_none());
    }

    #[test]
    fn test_into_keystore_keeps_message() {
        let err = ProvKitError::issuance("bad spki").into_keystore();
        assert!(matches!(
            err,
            ProvKitError::KeystoreFailure { ref message, .. } if message == "bad spki"
        ));
    }

    #[test]
    fn test_signing_failure_relabels_as_issuance() {
        let err = ProvKitError::crypto("RSA signing failed").into_issuance();
        assert!(matches!(err, ProvKitError::CertificateIssuanceFailure { .. }));
    }

    #[test]
    fn test_key_gen_failure_is_not_relabelled() {
        let err = ProvKitError::key_gen("no entropy").into_issuance();
        assert!(matches!(err, ProvKitError::KeyGenFailure { .. }));
    }
}
