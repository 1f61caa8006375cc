use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{error::*, handlers::connection::PartyRole};

pub const TAG_CRED_DEF_ID: &str = "anonCredsCredentialDefinitionId";
pub const TAG_REV_REG_ID: &str = "anonCredsRevocationRegistryId";
pub const TAG_CRED_REV_ID: &str = "anonCredsCredentialRevocationId";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CredentialState {
    OfferSent,
    OfferReceived,
    Accepted,
    Done,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevocationNotificationRecord {
    pub revocation_id: String,
    pub comment: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    pub id: String,
    pub thread_id: String,
    pub connection_id: String,
    pub role: PartyRole,
    pub state: CredentialState,
    pub cred_def_id: String,
    pub rev_reg_def_id: String,
    pub revocation_index: u32,
    pub attributes: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
    pub auto_accept: bool,
    pub revocation_notification: Option<RevocationNotificationRecord>,
}

impl CredentialRecord {
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str)
    }

    pub(crate) fn set_anoncreds_tags(&mut self) {
        self.tags
            .insert(TAG_CRED_DEF_ID.to_string(), self.cred_def_id.clone());
        self.tags
            .insert(TAG_REV_REG_ID.to_string(), self.rev_reg_def_id.clone());
        self.tags
            .insert(TAG_CRED_REV_ID.to_string(), self.revocation_index.to_string());
    }

    /// Registry id and revocation index this credential was issued against, read from its tags.
    pub fn revocation_target(&self) -> AgentResult<(String, u32)> {
        let rev_reg_id = self.tag(TAG_REV_REG_ID).ok_or_else(|| self.missing_tag(TAG_REV_REG_ID))?;
        let index = self
            .tag(TAG_CRED_REV_ID)
            .ok_or_else(|| self.missing_tag(TAG_CRED_REV_ID))?
            .parse::<u32>()
            .map_err(|err| {
                AgentError::from_msg(
                    AgentErrorKind::InvalidState,
                    &format!("Credential {} has malformed revocation id: {}", self.id, err),
                )
            })?;
        Ok((rev_reg_id.to_string(), index))
    }

    fn missing_tag(&self, tag: &str) -> AgentError {
        AgentError::from_msg(
            AgentErrorKind::NotFound,
            &format!("Credential {} carries no {} tag", self.id, tag),
        )
    }

    pub fn transition(&mut self, next: CredentialState) -> AgentResult<()> {
        use CredentialState::*;
        let allowed = matches!(
            (self.role, self.state, next),
            (PartyRole::Issuer, OfferSent, Accepted)
                | (PartyRole::Holder, OfferReceived, Accepted)
                | (_, Accepted, Done)
        );
        if !allowed {
            return Err(AgentError::from_msg(
                AgentErrorKind::InvalidState,
                &format!(
                    "Credential {} cannot move from {:?} to {:?}",
                    self.id, self.state, next
                ),
            ));
        }
        self.state = next;
        Ok(())
    }
}
