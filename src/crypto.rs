//! OpenPGP capability used by the key registry and the secret exchange.
//!
//! [`PgpEngine`] is the seam between the exchange workflows and the cryptography; the
//! workflows only ever see ASCII-armored text. [`RpgpEngine`] implements it on top of
//! the `pgp` crate.

use pgp::crypto::hash::HashAlgorithm;
use pgp::crypto::sym::SymmetricKeyAlgorithm;
use pgp::types::{CompressionAlgorithm, PublicKeyTrait, SecretKeyTrait};
use pgp::{Deserializable, KeyType, Message, SecretKeyParamsBuilder, SignedPublicKey, SignedSecretKey};
use rand::thread_rng;
use smallvec::smallvec;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PgpError {
    #[error("key generation failed: {0}")]
    KeyGeneration(String),
    #[error("unable to parse {what}: {reason}")]
    Parse { what: &'static str, reason: String },
    #[error("key has no encryption-capable component")]
    NoEncryptionKey,
    #[error("encryption failed: {0}")]
    Encrypt(String),
    #[error("decryption failed: {0}")]
    Decrypt(String),
}

/// The identity attached to a freshly generated platform key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyIdentity {
    pub name: String,
    pub comment: String,
    pub email: String,
}

impl KeyIdentity {
    pub fn for_product(name: &str, email: &str, product: &str) -> Self {
        Self {
            name: name.to_string(),
            comment: format!("PGP key for partner secret sharing, product: {product}"),
            email: email.to_string(),
        }
    }

    /// RFC 4880 user id, `Name (comment) <email>`.
    pub fn user_id(&self) -> String {
        format!("{} ({}) <{}>", self.name, self.comment, self.email)
    }
}

/// Both armored halves of a generated keypair.
#[derive(Clone)]
pub struct ArmoredKeyPair {
    pub public_key: String,
    pub private_key: String,
}

impl std::fmt::Debug for ArmoredKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArmoredKeyPair")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// key: pgp-engine
pub trait PgpEngine: Send + Sync {
    fn generate_keypair(&self, identity: &KeyIdentity) -> Result<ArmoredKeyPair, PgpError>;

    /// Derives the armored public half of an armored private key.
    fn public_key_of(&self, private_key: &str) -> Result<String, PgpError>;

    fn encrypt(&self, public_key: &str, plaintext: &str) -> Result<String, PgpError>;

    fn decrypt(&self, private_key: &str, ciphertext: &str) -> Result<String, PgpError>;
}

/// RSA keys with no passphrase; the store's access control protects the private half.
#[derive(Clone, Debug)]
pub struct RpgpEngine {
    key_bits: u32,
}

impl RpgpEngine {
    pub fn new(key_bits: u32) -> Self {
        Self { key_bits }
    }

    fn parse_secret_key(armored: &str) -> Result<SignedSecretKey, PgpError> {
        let (key, _headers) =
            SignedSecretKey::from_string(armored).map_err(|err| PgpError::Parse {
                what: "private key",
                reason: err.to_string(),
            })?;
        Ok(key)
    }

    fn parse_public_key(armored: &str) -> Result<SignedPublicKey, PgpError> {
        let (key, _headers) =
            SignedPublicKey::from_string(armored).map_err(|err| PgpError::Parse {
                what: "public key",
                reason: err.to_string(),
            })?;
        Ok(key)
    }

    fn sign_public(secret: &SignedSecretKey) -> Result<SignedPublicKey, PgpError> {
        let mut rng = thread_rng();
        secret
            .public_key()
            .sign(&mut rng, secret, String::new)
            .map_err(|err| PgpError::KeyGeneration(err.to_string()))
    }
}

fn no_passphrase() -> String {
    String::new()
}

impl PgpEngine for RpgpEngine {
    fn generate_keypair(&self, identity: &KeyIdentity) -> Result<ArmoredKeyPair, PgpError> {
        let generation = |err: &dyn std::fmt::Display| PgpError::KeyGeneration(err.to_string());

        let mut params = SecretKeyParamsBuilder::default();
        params
            .key_type(KeyType::Rsa(self.key_bits))
            .can_certify(true)
            .can_sign(true)
            .can_encrypt(true)
            .primary_user_id(identity.user_id())
            .preferred_hash_algorithms(smallvec![
                HashAlgorithm::SHA2_256,
                HashAlgorithm::SHA2_384,
                HashAlgorithm::SHA2_512,
                HashAlgorithm::SHA2_224,
            ])
            .preferred_symmetric_algorithms(smallvec![
                SymmetricKeyAlgorithm::AES256,
                SymmetricKeyAlgorithm::AES192,
                SymmetricKeyAlgorithm::AES128,
            ])
            .preferred_compression_algorithms(smallvec![
                CompressionAlgorithm::ZLIB,
                CompressionAlgorithm::BZip2,
                CompressionAlgorithm::ZIP,
                CompressionAlgorithm::Uncompressed,
            ]);
        let params = params.build().map_err(|err| generation(&err))?;

        let mut rng = thread_rng();
        let secret = params
            .generate(&mut rng)
            .map_err(|err| generation(&err))?
            .sign(&mut rng, no_passphrase)
            .map_err(|err| generation(&err))?;
        let public = Self::sign_public(&secret)?;

        Ok(ArmoredKeyPair {
            public_key: public
                .to_armored_string(Default::default())
                .map_err(|err| generation(&err))?,
            private_key: secret
                .to_armored_string(Default::default())
                .map_err(|err| generation(&err))?,
        })
    }

    fn public_key_of(&self, private_key: &str) -> Result<String, PgpError> {
        let secret = Self::parse_secret_key(private_key)?;
        Self::sign_public(&secret)?
            .to_armored_string(Default::default())
            .map_err(|err| PgpError::KeyGeneration(err.to_string()))
    }

    fn encrypt(&self, public_key: &str, plaintext: &str) -> Result<String, PgpError> {
        let key = Self::parse_public_key(public_key)?;
        let message = Message::new_literal("", plaintext);
        let mut rng = thread_rng();
        let algorithm = SymmetricKeyAlgorithm::AES256;

        // Prefer a dedicated encryption subkey, as most partner tooling generates one.
        let encrypted = match key
            .public_subkeys
            .iter()
            .find(|subkey| subkey.is_encryption_key())
        {
            Some(subkey) => message.encrypt_to_keys_seipdv1(&mut rng, algorithm, &[subkey]),
            None if key.is_encryption_key() => {
                message.encrypt_to_keys_seipdv1(&mut rng, algorithm, &[&key])
            }
            None => return Err(PgpError::NoEncryptionKey),
        }
        .map_err(|err| PgpError::Encrypt(err.to_string()))?;

        encrypted
            .to_armored_string(Default::default())
            .map_err(|err| PgpError::Encrypt(err.to_string()))
    }

    fn decrypt(&self, private_key: &str, ciphertext: &str) -> Result<String, PgpError> {
        let key = Self::parse_secret_key(private_key)?;
        let (message, _headers) =
            Message::from_string(ciphertext).map_err(|err| PgpError::Parse {
                what: "message",
                reason: err.to_string(),
            })?;
        let (decrypted, _key_ids) = message
            .decrypt(no_passphrase, &[&key])
            .map_err(|err| PgpError::Decrypt(err.to_string()))?;
        let content = decrypted
            .get_content()
            .map_err(|err| PgpError::Decrypt(err.to_string()))?
            .ok_or_else(|| PgpError::Decrypt("message has no literal content".into()))?;
        String::from_utf8(content)
            .map_err(|_| PgpError::Decrypt("plaintext is not valid UTF-8".into()))
    }
}
