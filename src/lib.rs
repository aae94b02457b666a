//! # ProvKit - Pure Rust Cryptographic Provisioning
//!
//! ProvKit bundles the three pieces a service needs to provision its own
//! secrets and TLS identity, built entirely with RustCrypto libraries and
//! without OpenSSL or ring:
//!
//! - **Secret encryption**: AES-GCM over text, with caller-managed nonces
//!   and Base64 at the boundary ([`cipher`])
//! - **Identity issuance**: RSA key pairs and self-signed X.509 v3
//!   certificates with a subjectAltName for the common name ([`identity`])
//! - **Keystore**: a password-protected file of named key entries, encrypted
//!   with AES-256-GCM under an Argon2id-derived key ([`keystore`])
//!
//! ## Quick Start
//!
//! ### Encrypting a Secret
//!
//! ```rust
//! use provkit::cipher::CipherService;
//!
//! # fn main() -> Result<(), provkit::error::ProvKitError> {
//! let mut service = CipherService::default();
//! service.initialize("1234567891564874")?;
//!
//! // One fresh nonce per encryption, stored next to the ciphertext.
//! let nonce = service.generate_nonce();
//! let ciphertext = service.encrypt("Hello World", &nonce)?;
//!
//! assert_eq!(service.decrypt(&ciphertext, &nonce)?, "Hello World");
//! # Ok(())
//! # }
//! ```
//!
//! ### Issuing and Installing a Self-Signed Identity
//!
//! ```rust,no_run
//! use std::path::Path;
//! use provkit::{cert::params::SubjectDescriptor, identity::IdentityIssuer};
//!
//! # fn main() -> Result<(), provkit::error::ProvKitError> {
//! let issuer = IdentityIssuer::default();
//!
//! let subject = SubjectDescriptor::builder()
//!     .country("FR")
//!     .organization("Shiyatsu")
//!     .organization_unit("Yatsu")
//!     .locality("Paris")
//!     .state("France")
//!     .common_name("127.0.0.1")
//!     .email("shiyatsu@shiyatsu.com")
//!     .build();
//!
//! // Generates a 4096-bit RSA key pair and a certificate valid for ten years.
//! let identity = issuer.issue_identity(&subject, None)?;
//! println!("{}", identity.cert.to_pem()?);
//!
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
//!
//! ### Reading a Keystore
//!
//! ```rust,no_run
//! use provkit::keystore::Keystore;
//!
//! # fn main() -> Result<(), provkit::error::ProvKitError> {
//! let keystore = Keystore::open("server.keystore", "changeit")?;
//! for alias in keystore.aliases() {
//!     let entry = keystore.entry(alias).expect("listed alias");
//!     println!("{alias}: {}", entry.certificate().subject_name());
//!     print!("{}", entry.chain_to_pem()?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Every operation returns [`error::ProvKitError`], a closed set of failure
//! kinds. Failures are also reported to the service's [`logging::LogSink`].
//!
//! ```rust
//! use provkit::{cipher::CipherService, error::ProvKitError};
//!
//! let service = CipherService::default();
//! match service.encrypt("secret", &service.generate_nonce()) {
//!     Ok(_) => unreachable!(),
//!     Err(ProvKitError::NotInitialized) => println!("call initialize first"),
//!     Err(e) => println!("Other error: {e}"),
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`cipher`]: AES-GCM secret encryption and key text generation
//! - [`identity`]: Self-signed identity issuance and keystore installation
//! - [`keystore`]: Password-protected key and certificate container
//! - [`key`]: RSA key pairs, signing and PKCS#8 import/export
//! - [`cert`]: Certificate creation, encoding/decoding and verification
//! - [`issuer`]: Certificate signing
//! - [`tbs_certificate`]: Low-level certificate structure manipulation
//! - [`pem_utils`]: PEM certificate bundles
//! - [`logging`]: Log sink injected into the services
//! - [`error`]: Error type

pub mod cert;
pub mod cipher;
pub mod error;
pub mod identity;
pub mod issuer;
pub mod key;
pub mod keystore;
pub mod logging;
pub mod pem_utils;
pub mod tbs_certificate;
