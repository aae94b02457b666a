//! Issues a self-signed identity for 127.0.0.1 and installs it into a
//! keystore.
//!
//! ```sh
//! cargo run --example install_identity -- target/server.keystore
//! ```

use std::path::PathBuf;

use provkit::cert::params::SubjectDescriptor;
use provkit::error::ProvKitError;
use provkit::identity::IdentityIssuer;

fn main() -> Result<(), ProvKitError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let keystore_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("server.keystore"));

    let subject = SubjectDescriptor::builder()
        .country("FR")
        .state("France")
        .organization("Shiyatsu")
        .organization_unit("Yatsu")
        .locality("Paris")
        .common_name("127.0.0.1")
        .email("shiyatsu@shiyatsu.com")
        .build();

    let issuer = IdentityIssuer::default();
    let identity = issuer.issue_identity(&subject, None)?;
    issuer.install_identity(&keystore_path, &identity.cert, &identity.key, "Shiyatsu", "changeit")?;

    println!("subject:     {}", identity.cert.subject_name());
    println!("fingerprint: {}", identity.cert.fingerprint_sha256()?);
    println!("keystore:    {}", keystore_path.display());
    print!("{}", identity.cert.to_pem()?);
    Ok(())
}
