use std::{collections::BTreeMap, sync::Arc};

use crate::{
    didcomm::{
        events::{AgentEvent, EventBus},
        messages::{
            anoncreds_revocation_id, AriesMessage, CredentialAck, IssueCredential,
            IssuedCredential, OfferCredential, RequestCredential, RevocationNotification,
            REVOCATION_FORMAT_ANONCREDS,
        },
    },
    error::*,
    handlers::{
        connection::{PartyRole, ServiceConnections},
        credential::{CredentialRecord, CredentialState},
        revocation_registry::ServiceRevocationRegistries,
    },
    storage::{agent_storage_inmem::AgentStorageInMem, AgentStorage},
};

/// What goes into a credential offer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OfferInfo {
    pub cred_def_id: String,
    pub rev_reg_def_id: String,
    pub attributes: BTreeMap<String, String>,
    /// Explicit revocation index; the next free one is assigned when absent.
    pub revocation_index: Option<u32>,
    pub comment: Option<String>,
    /// Issue as soon as the holder requests the credential.
    pub auto_accept: bool,
}

impl OfferInfo {
    pub fn new(cred_def_id: &str, rev_reg_def_id: &str, attributes: BTreeMap<String, String>) -> Self {
        Self {
            cred_def_id: cred_def_id.to_string(),
            rev_reg_def_id: rev_reg_def_id.to_string(),
            attributes,
            revocation_index: None,
            comment: None,
            auto_accept: true,
        }
    }
}

pub struct ServiceCredentialsIssuer {
    events: EventBus,
    creds_issuer: AgentStorageInMem<CredentialRecord>,
    service_connections: Arc<ServiceConnections>,
    service_rev_regs: Arc<ServiceRevocationRegistries>,
}

impl ServiceCredentialsIssuer {
    pub fn new(
        events: EventBus,
        service_connections: Arc<ServiceConnections>,
        service_rev_regs: Arc<ServiceRevocationRegistries>,
    ) -> Self {
        Self {
            events,
            creds_issuer: AgentStorageInMem::new("creds-issuer"),
            service_connections,
            service_rev_regs,
        }
    }

    pub fn get_credential(&self, credential_id: &str) -> AgentResult<CredentialRecord> {
        self.creds_issuer.get(credential_id)
    }

    pub fn get_state(&self, credential_id: &str) -> AgentResult<CredentialState> {
        Ok(self.get_credential(credential_id)?.state)
    }

    pub fn credential_ids(&self) -> AgentResult<Vec<String>> {
        self.creds_issuer.find_by(|(id, _)| Some(id.clone()))
    }

    fn find_by_thread_id(&self, thread_id: &str) -> AgentResult<String> {
        self.creds_issuer
            .find_by(|(id, m)| {
                let record = m.lock().ok()?;
                (record.thread_id == thread_id).then(|| id.clone())
            })?
            .pop()
            .ok_or_else(|| {
                AgentError::from_msg(
                    AgentErrorKind::NotFound,
                    &format!("No issued credential on thread {}", thread_id),
                )
            })
    }

    /// Offers a credential bound to a revocation index of `offer_info.rev_reg_def_id` and returns
    /// the id of the issuer-side record.
    pub fn offer_credential(&self, connection_id: &str, offer_info: OfferInfo) -> AgentResult<String> {
        trace!(
            "ServiceCredentialsIssuer::offer_credential >> connection_id: {}, rev_reg_def_id: {}",
            connection_id,
            offer_info.rev_reg_def_id
        );
        let connection = self.service_connections.get_by_id(connection_id)?;
        if !connection.is_completed() {
            return Err(AgentError::from_msg(
                AgentErrorKind::ConnectionNotEstablished,
                &format!("Connection {} is not completed", connection_id),
            ));
        }
        let rev_reg_id = offer_info.rev_reg_def_id.as_str();
        let revocation_index = match offer_info.revocation_index {
            Some(index) => self.service_rev_regs.reserve_index(rev_reg_id, index)?,
            None => self.service_rev_regs.next_free_index(rev_reg_id)?,
        };

        let offer = OfferCredential {
            id: uuid::Uuid::new_v4().to_string(),
            cred_def_id: offer_info.cred_def_id.clone(),
            rev_reg_def_id: offer_info.rev_reg_def_id.clone(),
            attributes: offer_info.attributes.clone(),
            comment: offer_info.comment.clone(),
        };
        let mut record = CredentialRecord {
            id: uuid::Uuid::new_v4().to_string(),
            thread_id: offer.id.clone(),
            connection_id: connection_id.to_string(),
            role: PartyRole::Issuer,
            state: CredentialState::OfferSent,
            cred_def_id: offer_info.cred_def_id,
            rev_reg_def_id: offer_info.rev_reg_def_id,
            revocation_index,
            attributes: offer_info.attributes,
            tags: BTreeMap::new(),
            auto_accept: offer_info.auto_accept,
            revocation_notification: None,
        };
        record.set_anoncreds_tags();
        self.creds_issuer.insert(&record.id, record.clone())?;

        if let Err(err) = self
            .service_connections
            .send_message(connection_id, &AriesMessage::OfferCredential(offer))
        {
            warn!(
                "Offer of credential {} was not delivered, releasing revocation index {}",
                record.id, revocation_index
            );
            self.creds_issuer.remove(&record.id)?;
            self.service_rev_regs
                .release_index(&record.rev_reg_def_id, revocation_index)?;
            return Err(err);
        }
        info!(
            "Offered credential {} with revocation index {} of {}",
            record.id, revocation_index, record.rev_reg_def_id
        );
        self.events
            .publish(AgentEvent::CredentialStateChanged(record.clone()));
        Ok(record.id)
    }

    pub fn process_credential_request(&self, request: RequestCredential) -> AgentResult<()> {
        let credential_id = self.find_by_thread_id(&request.thread_id)?;
        let record = self.creds_issuer.update(&credential_id, |record| {
            record.transition(CredentialState::Accepted)?;
            Ok(record.clone())
        })?;
        self.events
            .publish(AgentEvent::CredentialStateChanged(record.clone()));
        if record.auto_accept {
            self.send_credential(&credential_id)?;
        }
        Ok(())
    }

    pub fn send_credential(&self, credential_id: &str) -> AgentResult<()> {
        let record = self.get_credential(credential_id)?;
        if record.state != CredentialState::Accepted {
            return Err(AgentError::from_msg(
                AgentErrorKind::InvalidState,
                &format!(
                    "Credential {} is in state {:?}, nothing to issue",
                    credential_id, record.state
                ),
            ));
        }
        let msg = IssueCredential {
            thread_id: record.thread_id.clone(),
            credential: IssuedCredential {
                cred_def_id: record.cred_def_id.clone(),
                rev_reg_id: record.rev_reg_def_id.clone(),
                cred_rev_id: record.revocation_index,
                values: record.attributes.clone(),
            },
        };
        self.service_connections
            .send_message(&record.connection_id, &AriesMessage::IssueCredential(msg))
    }

    pub fn process_credential_ack(&self, ack: CredentialAck) -> AgentResult<()> {
        let credential_id = self.find_by_thread_id(&ack.thread_id)?;
        let record = self.creds_issuer.update(&credential_id, |record| {
            record.transition(CredentialState::Done)?;
            Ok(record.clone())
        })?;
        info!(
            "Credential {} issued with revocation index {}",
            record.id, record.revocation_index
        );
        self.events.publish(AgentEvent::CredentialStateChanged(record));
        Ok(())
    }

    pub fn revocation_target(&self, credential_id: &str) -> AgentResult<(String, u32)> {
        self.get_credential(credential_id)?.revocation_target()
    }

    /// Tells the holder the credential got revoked; returns the revocation id sent.
    pub fn send_revocation_notification(
        &self,
        credential_id: &str,
        comment: Option<&str>,
    ) -> AgentResult<String> {
        let record = self.get_credential(credential_id)?;
        let (rev_reg_id, index) = record.revocation_target()?;
        let revocation_id = anoncreds_revocation_id(&rev_reg_id, index);
        let notification = RevocationNotification {
            thread_id: record.thread_id.clone(),
            revocation_format: REVOCATION_FORMAT_ANONCREDS.to_string(),
            revocation_id: revocation_id.clone(),
            comment: comment.map(str::to_string),
        };
        self.service_connections.send_message(
            &record.connection_id,
            &AriesMessage::RevocationNotification(notification),
        )?;
        debug!(
            "Sent revocation notification {} for credential {}",
            revocation_id, credential_id
        );
        Ok(revocation_id)
    }
}
