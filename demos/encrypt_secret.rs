//! Encrypts a password under a fixed key and decrypts it again.
//!
//! ```sh
//! RUST_LOG=debug cargo run --example encrypt_secret
//! ```

use provkit::cipher::CipherService;
use provkit::error::ProvKitError;

fn main() -> Result<(), ProvKitError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut service = CipherService::default();
    service.initialize("mySecretKey")?;

    let password = "Q!R6$eqLxxbnKoCR";
    let nonce = service.generate_nonce();
    let encrypted = service.encrypt(password, &nonce)?;
    let decrypted = service.decrypt(&encrypted, &nonce)?;

    println!("nonce:     {nonce}");
    println!("encrypted: {encrypted}");
    println!("decrypted: {decrypted}");
    Ok(())
}
