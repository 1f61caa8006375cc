use std::{collections::BTreeMap, time::Duration};

use futures::{stream, StreamExt, TryStreamExt};

use crate::{
    agent::Agent,
    didcomm::events::{await_event, AgentEvent},
    error::*,
    handlers::{credential::CredentialState, issuer::OfferInfo},
};

pub type CredentialAttributes = BTreeMap<String, String>;

/// Issues credentials one after another over an established connection.
pub struct IssuanceCoordinator {
    issuance_timeout: Duration,
}

impl IssuanceCoordinator {
    pub fn new(issuance_timeout: Duration) -> Self {
        Self { issuance_timeout }
    }

    /// Offers one credential and waits until the holder acknowledged it.
    pub async fn issue(
        &self,
        issuer: &Agent,
        connection_id: &str,
        offer_info: OfferInfo,
    ) -> AgentResult<String> {
        let mut events = issuer.events().subscribe();
        let credential_id = issuer.issuer().offer_credential(connection_id, offer_info)?;
        if issuer.issuer().get_state(&credential_id)? == CredentialState::Done {
            return Ok(credential_id);
        }
        await_event(
            &mut events,
            self.issuance_timeout,
            &format!("issuance of credential {credential_id}"),
            |event| match event {
                AgentEvent::CredentialStateChanged(record)
                    if record.id == credential_id && record.state == CredentialState::Done =>
                {
                    Some(())
                }
                _ => None,
            },
        )
        .await?;
        Ok(credential_id)
    }

    /// Issues one credential per attribute set, in order, and returns their ids in that order.
    /// Stops at the first credential that could not be issued.
    pub async fn issue_batch(
        &self,
        issuer: &Agent,
        connection_id: &str,
        cred_def_id: &str,
        rev_reg_def_id: &str,
        attribute_sets: &[CredentialAttributes],
    ) -> AgentResult<Vec<String>> {
        trace!(
            "IssuanceCoordinator::issue_batch >> connection_id: {}, count: {}",
            connection_id,
            attribute_sets.len()
        );
        stream::iter(attribute_sets)
            .map(Ok::<_, AgentError>)
            .try_fold(Vec::with_capacity(attribute_sets.len()), |mut ids, attributes| async move {
                let offer_info = OfferInfo::new(cred_def_id, rev_reg_def_id, attributes.clone());
                let credential_id = self.issue(issuer, connection_id, offer_info).await?;
                info!("Credential {} of {} issued", ids.len() + 1, attribute_sets.len());
                ids.push(credential_id);
                Ok(ids)
            })
            .await
    }
}
