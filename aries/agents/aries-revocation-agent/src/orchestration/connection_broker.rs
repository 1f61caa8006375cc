use std::time::Duration;

use tokio::sync::broadcast::Receiver;

use crate::{
    agent::Agent,
    didcomm::events::{await_event, AgentEvent},
    error::*,
    handlers::connection::ServiceConnections,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionPair {
    pub issuer_connection_id: String,
    pub holder_connection_id: String,
    pub out_of_band_id: String,
}

/// Connects an issuer and a holder through an auto-accepted out-of-band invitation.
pub struct ConnectionBroker {
    connection_timeout: Duration,
}

impl ConnectionBroker {
    pub fn new(connection_timeout: Duration) -> Self {
        Self { connection_timeout }
    }

    async fn await_completed(
        &self,
        connections: &ServiceConnections,
        events: &mut Receiver<AgentEvent>,
        oob_id: &str,
        party: &str,
    ) -> AgentResult<String> {
        if let Some(record) = connections.find_by_out_of_band_id(oob_id)? {
            if record.is_completed() {
                return Ok(record.id);
            }
        }
        await_event(
            events,
            self.connection_timeout,
            &format!("{party} connection of invitation {oob_id}"),
            |event| match event {
                AgentEvent::ConnectionStateChanged(record)
                    if record.out_of_band_id == oob_id && record.is_completed() =>
                {
                    Some(record.id.clone())
                }
                _ => None,
            },
        )
        .await
    }

    pub async fn establish(&self, issuer: &Agent, holder: &Agent) -> AgentResult<ConnectionPair> {
        trace!(
            "ConnectionBroker::establish >> issuer: {}, holder: {}",
            issuer.label(),
            holder.label()
        );
        let mut issuer_events = issuer.events().subscribe();
        let mut holder_events = holder.events().subscribe();

        let invitation = issuer.connections().create_invitation(true)?;
        holder.connections().receive_invitation(&invitation)?;
        let holder_connection = holder
            .connections()
            .find_by_out_of_band_id(&invitation.id)?
            .ok_or_else(|| {
                AgentError::from_msg(
                    AgentErrorKind::ConnectionNotEstablished,
                    &format!("connection not found for invitation {}", invitation.id),
                )
            })?;

        let issuer_connection_id = self
            .await_completed(&issuer.connections(), &mut issuer_events, &invitation.id, "issuer")
            .await?;
        self.await_completed(&holder.connections(), &mut holder_events, &invitation.id, "holder")
            .await?;
        let holder_connection_id = holder_connection.id;

        info!(
            "Established connection {} <-> {} over invitation {}",
            issuer_connection_id, holder_connection_id, invitation.id
        );
        Ok(ConnectionPair {
            issuer_connection_id,
            holder_connection_id,
            out_of_band_id: invitation.id,
        })
    }
}
