//! VAPID credentials: loading from configuration and generating new pairs.

use base64::{URL_SAFE_NO_PAD, encode_config};
use jwt_simple::prelude::ES256KeyPair;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};

use pushfleet_common::config::AppConfig;
use pushfleet_common::error::AppError;

/// Signing material for outgoing push requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VapidConfig {
    pub private_key: String,
    pub public_key: String,
    pub subject: String,
}

/// A freshly generated key pair, both halves URL-safe base64 without padding.
#[derive(Debug, Clone)]
pub struct VapidCredentials {
    pub private_key: String,
    pub public_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VapidConfigStatus {
    Missing,
    Incomplete,
    Ready(VapidConfig),
}

impl VapidConfigStatus {
    /// Public key devices need to subscribe, if push is configured.
    pub fn public_key(&self) -> Option<&str> {
        match self {
            VapidConfigStatus::Ready(config) => Some(&config.public_key),
            _ => None,
        }
    }
}

/// Classify the VAPID variables: all three present, some, or none.
pub fn load_vapid_config(config: &AppConfig) -> VapidConfigStatus {
    let private_key = config.vapid_private_key.as_ref();
    let public_key = config.vapid_public_key.as_ref();
    let subject = config.vapid_subject.as_ref();
    let has_any = private_key.is_some() || public_key.is_some() || subject.is_some();

    match (private_key, public_key, subject) {
        (Some(private_key), Some(public_key), Some(subject)) => {
            VapidConfigStatus::Ready(VapidConfig {
                private_key: private_key.clone(),
                public_key: public_key.clone(),
                subject: subject.clone(),
            })
        }
        _ if has_any => VapidConfigStatus::Incomplete,
        _ => VapidConfigStatus::Missing,
    }
}

/// Check that the private key decodes and that it belongs to the public key.
pub fn validate_vapid_config(vapid: &VapidConfig) -> Result<(), AppError> {
    let derived = web_push::VapidSignatureBuilder::from_base64_no_sub(
        &vapid.private_key,
        URL_SAFE_NO_PAD,
    )
    .map_err(|e| AppError::Config(format!("VAPID_PRIVATE_KEY is not a valid key: {}", e)))?
    .get_public_key();

    if encode_config(derived, URL_SAFE_NO_PAD) != vapid.public_key.trim_end_matches('=') {
        return Err(AppError::Config(
            "VAPID_PUBLIC_KEY does not match VAPID_PRIVATE_KEY".to_string(),
        ));
    }

    Ok(())
}

pub fn generate_vapid_credentials() -> Result<VapidCredentials, web_push::WebPushError> {
    let mut rng = OsRng;
    generate_vapid_credentials_with_rng(&mut rng)
}

pub fn generate_vapid_credentials_with_rng<R: RngCore + CryptoRng>(
    rng: &mut R,
) -> Result<VapidCredentials, web_push::WebPushError> {
    let key_pair = generate_es256_keypair_with_rng(rng);
    let private_key = encode_config(key_pair.to_bytes(), URL_SAFE_NO_PAD);
    let public_key =
        web_push::VapidSignatureBuilder::from_base64_no_sub(&private_key, URL_SAFE_NO_PAD)?
            .get_public_key();
    let public_key = encode_config(public_key, URL_SAFE_NO_PAD);

    Ok(VapidCredentials {
        private_key,
        public_key,
    })
}

fn generate_es256_keypair_with_rng<R: RngCore + CryptoRng>(rng: &mut R) -> ES256KeyPair {
    let mut key_bytes = [0u8; 32];
    loop {
        rng.fill_bytes(&mut key_bytes);
        if let Ok(key_pair) = ES256KeyPair::from_bytes(&key_bytes) {
            return key_pair;
        }
    }
}
