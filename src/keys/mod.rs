//! Platform keypair lifecycle and the partner public key registry.

pub mod models;
pub mod service;

pub use models::{KeyLifetime, PartnerPublicKey, PlatformKeyPair, PLATFORM_KEY_LIFETIME_DAYS};
pub use service::{KeyRegistry, RegistryError};
