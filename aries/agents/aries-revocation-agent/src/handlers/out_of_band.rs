use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    didcomm::messages::OutOfBandInvitation,
    error::*,
    storage::{agent_storage_inmem::AgentStorageInMem, AgentStorage},
};

pub const CONNECTIONS_PROTOCOL: &str = "https://didcomm.org/connections/1.0";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutOfBandRole {
    Sender,
    Receiver,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutOfBandRecord {
    pub invitation: OutOfBandInvitation,
    pub role: OutOfBandRole,
    pub auto_accept: bool,
}

pub struct ServiceOutOfBand {
    label: String,
    service_endpoint: Url,
    out_of_band: AgentStorageInMem<OutOfBandRecord>,
}

impl ServiceOutOfBand {
    pub fn new(label: &str, service_endpoint: Url) -> Self {
        Self {
            label: label.to_string(),
            service_endpoint,
            out_of_band: AgentStorageInMem::new("out-of-band"),
        }
    }

    pub fn create_invitation(
        &self,
        recipient_key: &str,
        auto_accept: bool,
    ) -> AgentResult<OutOfBandInvitation> {
        let invitation = OutOfBandInvitation {
            id: uuid::Uuid::new_v4().to_string(),
            label: self.label.clone(),
            recipient_key: recipient_key.to_string(),
            service_endpoint: self.service_endpoint.clone(),
            handshake_protocols: vec![CONNECTIONS_PROTOCOL.to_string()],
        };
        self.out_of_band.insert(
            &invitation.id,
            OutOfBandRecord {
                invitation: invitation.clone(),
                role: OutOfBandRole::Sender,
                auto_accept,
            },
        )?;
        debug!(
            "ServiceOutOfBand::create_invitation >> created invitation {}",
            invitation.id
        );
        Ok(invitation)
    }

    pub fn receive_invitation(&self, invitation: &OutOfBandInvitation) -> AgentResult<String> {
        if !invitation
            .handshake_protocols
            .iter()
            .any(|protocol| protocol == CONNECTIONS_PROTOCOL)
        {
            return Err(AgentError::from_msg(
                AgentErrorKind::InvalidArguments,
                &format!(
                    "Invitation {} offers no supported handshake protocol",
                    invitation.id
                ),
            ));
        }
        self.out_of_band.insert(
            &invitation.id,
            OutOfBandRecord {
                invitation: invitation.clone(),
                role: OutOfBandRole::Receiver,
                auto_accept: true,
            },
        )
    }

    pub fn get(&self, oob_id: &str) -> AgentResult<OutOfBandRecord> {
        self.out_of_band.get(oob_id)
    }
}
