//! PushFleet VAPID key generator
//!
//! Prints a fresh VAPID key pair in `.env` format.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin pushfleet-vapid-keygen -- mailto:ops@example.com >> .env
//! ```
//!
//! The subject argument is optional; without it a placeholder is printed.

use pushfleet_notifier::vapid::generate_vapid_credentials;

fn main() -> anyhow::Result<()> {
    let subject = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "mailto:admin@example.com".to_string());

    let credentials = generate_vapid_credentials()
        .map_err(|e| anyhow::anyhow!("Failed to generate VAPID key pair: {}", e))?;

    println!("VAPID_PUBLIC_KEY={}", credentials.public_key);
    println!("VAPID_PRIVATE_KEY={}", credentials.private_key);
    println!("VAPID_SUBJECT={}", subject);

    Ok(())
}
