use std::{collections::BTreeMap, sync::Arc};

use crate::{
    didcomm::{
        events::{AgentEvent, EventBus},
        messages::{
            parse_anoncreds_revocation_id, AriesMessage, CredentialAck, IssueCredential,
            OfferCredential, RequestCredential, RevocationNotification,
            REVOCATION_FORMAT_ANONCREDS,
        },
    },
    error::*,
    handlers::{
        connection::{PartyRole, ServiceConnections},
        credential::{CredentialRecord, CredentialState, RevocationNotificationRecord},
    },
    storage::{agent_storage_inmem::AgentStorageInMem, AgentStorage},
};

pub struct ServiceCredentialsHolder {
    events: EventBus,
    creds_holder: AgentStorageInMem<CredentialRecord>,
    service_connections: Arc<ServiceConnections>,
}

impl ServiceCredentialsHolder {
    pub fn new(events: EventBus, service_connections: Arc<ServiceConnections>) -> Self {
        Self {
            events,
            creds_holder: AgentStorageInMem::new("creds-holder"),
            service_connections,
        }
    }

    pub fn get_credential(&self, credential_id: &str) -> AgentResult<CredentialRecord> {
        self.creds_holder.get(credential_id)
    }

    pub fn get_state(&self, credential_id: &str) -> AgentResult<CredentialState> {
        Ok(self.get_credential(credential_id)?.state)
    }

    pub fn credential_ids(&self) -> AgentResult<Vec<String>> {
        self.creds_holder.find_by(|(id, _)| Some(id.clone()))
    }

    fn find_by_thread_id(&self, thread_id: &str) -> AgentResult<String> {
        self.creds_holder
            .find_by(|(id, m)| {
                let record = m.lock().ok()?;
                (record.thread_id == thread_id).then(|| id.clone())
            })?
            .pop()
            .ok_or_else(|| {
                AgentError::from_msg(
                    AgentErrorKind::NotFound,
                    &format!("No credential on thread {}", thread_id),
                )
            })
    }

    pub fn process_offer(&self, connection_id: &str, offer: OfferCredential) -> AgentResult<String> {
        trace!(
            "ServiceCredentialsHolder::process_offer >> connection_id: {}, thread_id: {}",
            connection_id,
            offer.id
        );
        let record = CredentialRecord {
            id: uuid::Uuid::new_v4().to_string(),
            thread_id: offer.id,
            connection_id: connection_id.to_string(),
            role: PartyRole::Holder,
            state: CredentialState::OfferReceived,
            cred_def_id: offer.cred_def_id,
            rev_reg_def_id: offer.rev_reg_def_id,
            revocation_index: 0,
            attributes: offer.attributes,
            tags: BTreeMap::new(),
            auto_accept: false,
            revocation_notification: None,
        };
        self.creds_holder.insert(&record.id, record.clone())?;
        self.events
            .publish(AgentEvent::CredentialStateChanged(record.clone()));
        Ok(record.id)
    }

    pub fn accept_offer(&self, credential_id: &str) -> AgentResult<()> {
        let record = self.creds_holder.update(credential_id, |record| {
            record.transition(CredentialState::Accepted)?;
            Ok(record.clone())
        })?;
        let request = RequestCredential {
            thread_id: record.thread_id.clone(),
        };
        if let Err(err) = self
            .service_connections
            .send_message(&record.connection_id, &AriesMessage::RequestCredential(request))
        {
            warn!(
                "Request for credential {} was not delivered, offer stays open",
                credential_id
            );
            self.creds_holder.update(credential_id, |record| {
                if record.state == CredentialState::Accepted {
                    record.state = CredentialState::OfferReceived;
                }
                Ok(())
            })?;
            return Err(err);
        }
        debug!("Accepted credential offer {}", credential_id);
        self.events.publish(AgentEvent::CredentialStateChanged(record));
        Ok(())
    }

    pub fn process_credential(&self, msg: IssueCredential) -> AgentResult<()> {
        let credential_id = self.find_by_thread_id(&msg.thread_id)?;
        let record = self.creds_holder.update(&credential_id, |record| {
            if record.state != CredentialState::Accepted {
                return Err(AgentError::from_msg(
                    AgentErrorKind::InvalidState,
                    &format!(
                        "Credential {} is in state {:?}, did not request it",
                        record.id, record.state
                    ),
                ));
            }
            record.cred_def_id = msg.credential.cred_def_id;
            record.rev_reg_def_id = msg.credential.rev_reg_id;
            record.revocation_index = msg.credential.cred_rev_id;
            record.attributes = msg.credential.values;
            record.set_anoncreds_tags();
            record.transition(CredentialState::Done)?;
            Ok(record.clone())
        })?;
        let ack = CredentialAck {
            thread_id: record.thread_id.clone(),
        };
        self.service_connections
            .send_message(&record.connection_id, &AriesMessage::CredentialAck(ack))?;
        self.events.publish(AgentEvent::CredentialStateChanged(record));
        Ok(())
    }

    /// Records a revocation notification on the credential it names.
    pub fn process_revocation_notification(
        &self,
        notification: RevocationNotification,
    ) -> AgentResult<String> {
        if notification.revocation_format != REVOCATION_FORMAT_ANONCREDS {
            return Err(AgentError::from_msg(
                AgentErrorKind::InvalidArguments,
                &format!(
                    "Unsupported revocation format {}",
                    notification.revocation_format
                ),
            ));
        }
        let (rev_reg_id, index) = parse_anoncreds_revocation_id(&notification.revocation_id)
            .ok_or_else(|| {
                AgentError::from_msg(
                    AgentErrorKind::InvalidArguments,
                    &format!("Malformed revocation id {}", notification.revocation_id),
                )
            })?;
        let credential_id = self.find_by_thread_id(&notification.thread_id)?;
        let record = self.creds_holder.update(&credential_id, |record| {
            if record.rev_reg_def_id != rev_reg_id || record.revocation_index != index {
                return Err(AgentError::from_msg(
                    AgentErrorKind::InvalidState,
                    &format!(
                        "Revocation id {} does not name credential {}",
                        notification.revocation_id, record.id
                    ),
                ));
            }
            record.revocation_notification = Some(RevocationNotificationRecord {
                revocation_id: notification.revocation_id.clone(),
                comment: notification.comment.clone(),
            });
            Ok(record.clone())
        })?;
        info!(
            "Credential {} was revoked, revocation id {}",
            record.id, notification.revocation_id
        );
        self.events.publish(AgentEvent::RevocationNotificationReceived {
            credential_id: record.id.clone(),
            revocation_id: notification.revocation_id,
        });
        Ok(record.id)
    }
}
