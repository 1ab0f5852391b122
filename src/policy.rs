use std::collections::HashSet;

use thiserror::Error;
use tracing::warn;

use crate::config::{AppConfig, PartnerIdentity};

// key: partner-policy -> partner-import,secret-import,secret-export

#[derive(Debug, Error, PartialEq, Eq)]
#[error("partner '{0}' is not on the allow-list")]
pub struct UnauthorizedPartner(pub String);

/// Static allow-list of partners that may call the exchange operations.
#[derive(Clone, Debug, Default)]
pub struct AuthorizationPolicy {
    accepted: HashSet<String>,
}

impl AuthorizationPolicy {
    pub fn new<I, S>(partner_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            accepted: partner_ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_partners(partners: &[PartnerIdentity]) -> Self {
        Self::new(partners.iter().map(|partner| partner.id.clone()))
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::from_partners(&config.partners)
    }

    pub fn is_authorized_partner(&self, partner_id: &str) -> bool {
        self.accepted.contains(partner_id)
    }

    pub fn authorize(&self, partner_id: &str) -> Result<(), UnauthorizedPartner> {
        if self.is_authorized_partner(partner_id) {
            return Ok(());
        }
        warn!(partner_id, "rejected request from partner outside the allow-list");
        Err(UnauthorizedPartner(partner_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.accepted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }
}
