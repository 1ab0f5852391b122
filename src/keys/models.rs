use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::store::{StoredSecret, Tags};

pub const TAG_CREATED_AT: &str = "created_at";
pub const TAG_EXPIRES_AT: &str = "expires_at";

/// Platform keys are considered due for rotation after this many days.
pub const PLATFORM_KEY_LIFETIME_DAYS: i64 = 90;

/// key: platform-keypair-model
/// The platform's own keypair as held in the store, with its recorded lifetime.
///
/// Entries written before lifetimes were recorded carry no timestamps and never expire.
#[derive(Clone)]
pub struct PlatformKeyPair {
    pub public_key: String,
    pub private_key: String,
    pub created_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl PlatformKeyPair {
    pub(crate) fn from_stored(public: &StoredSecret, private: &StoredSecret) -> Self {
        let lifetime = KeyLifetime::from_tags(&private.tags);
        Self {
            public_key: public.value.clone(),
            private_key: private.value.clone(),
            created_at: lifetime.created_at,
            expires_at: lifetime.expires_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.lifetime().is_expired(now)
    }

    fn lifetime(&self) -> KeyLifetime {
        KeyLifetime {
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}

impl std::fmt::Debug for PlatformKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformKeyPair")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Creation and expiry timestamps carried in store tags as RFC 3339 strings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeyLifetime {
    pub created_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl KeyLifetime {
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            created_at: Some(now),
            expires_at: Some(now + Duration::days(PLATFORM_KEY_LIFETIME_DAYS)),
        }
    }

    pub fn from_tags(tags: &Tags) -> Self {
        let parse = |key: &str| {
            tags.get(key)
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                .map(|value| value.with_timezone(&Utc))
        };
        Self {
            created_at: parse(TAG_CREATED_AT),
            expires_at: parse(TAG_EXPIRES_AT),
        }
    }

    pub fn write_tags(&self, tags: &mut Tags) {
        if let Some(created_at) = self.created_at {
            tags.insert(TAG_CREATED_AT.into(), created_at.to_rfc3339());
        }
        if let Some(expires_at) = self.expires_at {
            tags.insert(TAG_EXPIRES_AT.into(), expires_at.to_rfc3339());
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |expires_at| expires_at <= now)
    }
}

/// A partner's registered public key.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct PartnerPublicKey {
    pub partner_id: String,
    pub public_key: String,
}
