use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    didcomm::{
        events::{AgentEvent, EventBus},
        generate_key,
        messages::{AriesMessage, ConnectionRequest, ConnectionResponse, OutOfBandInvitation},
        transport::{Envelope, InMemoryTransport},
    },
    error::*,
    handlers::out_of_band::{OutOfBandRole, ServiceOutOfBand},
    storage::{agent_storage_inmem::AgentStorageInMem, AgentStorage},
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PartyRole {
    Issuer,
    Holder,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    Requested,
    RequestReceived,
    Completed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    pub id: String,
    pub out_of_band_id: String,
    pub thread_id: String,
    pub role: PartyRole,
    pub state: ConnectionState,
    pub our_key: String,
    pub their_key: String,
    pub their_endpoint: Url,
    pub their_label: String,
}

impl ConnectionRecord {
    pub fn is_completed(&self) -> bool {
        self.state == ConnectionState::Completed
    }
}

pub struct ServiceConnections {
    label: String,
    service_endpoint: Url,
    transport: Arc<InMemoryTransport>,
    events: EventBus,
    out_of_band: Arc<ServiceOutOfBand>,
    connections: AgentStorageInMem<ConnectionRecord>,
}

impl ServiceConnections {
    pub fn new(
        label: &str,
        service_endpoint: Url,
        transport: Arc<InMemoryTransport>,
        events: EventBus,
        out_of_band: Arc<ServiceOutOfBand>,
    ) -> Self {
        Self {
            label: label.to_string(),
            service_endpoint,
            transport,
            events,
            out_of_band,
            connections: AgentStorageInMem::new("connections"),
        }
    }

    pub fn create_invitation(&self, auto_accept: bool) -> AgentResult<OutOfBandInvitation> {
        self.out_of_band
            .create_invitation(&generate_key(), auto_accept)
    }

    /// Answers `invitation` with a connection request and returns the new connection id.
    pub fn receive_invitation(&self, invitation: &OutOfBandInvitation) -> AgentResult<String> {
        trace!(
            "ServiceConnections::receive_invitation >> invitation_id: {}",
            invitation.id
        );
        self.out_of_band.receive_invitation(invitation)?;
        let request = ConnectionRequest {
            id: uuid::Uuid::new_v4().to_string(),
            parent_thread_id: invitation.id.clone(),
            label: self.label.clone(),
            endpoint: self.service_endpoint.clone(),
            key: generate_key(),
        };
        let record = ConnectionRecord {
            id: uuid::Uuid::new_v4().to_string(),
            out_of_band_id: invitation.id.clone(),
            thread_id: request.id.clone(),
            role: PartyRole::Holder,
            state: ConnectionState::Requested,
            our_key: request.key.clone(),
            their_key: invitation.recipient_key.clone(),
            their_endpoint: invitation.service_endpoint.clone(),
            their_label: invitation.label.clone(),
        };
        self.connections.insert(&record.id, record.clone())?;
        self.send_to(
            &record.their_endpoint,
            &AriesMessage::ConnectionRequest(request),
            &record.our_key,
            &record.their_key,
        )?;
        self.events
            .publish(AgentEvent::ConnectionStateChanged(record.clone()));
        Ok(record.id)
    }

    pub fn process_request(
        &self,
        request: ConnectionRequest,
        recipient_key: &str,
    ) -> AgentResult<String> {
        trace!(
            "ServiceConnections::process_request >> request_id: {}, invitation_id: {}",
            request.id,
            request.parent_thread_id
        );
        let oob = self.out_of_band.get(&request.parent_thread_id)?;
        if oob.role != OutOfBandRole::Sender || oob.invitation.recipient_key != recipient_key {
            return Err(AgentError::from_msg(
                AgentErrorKind::InvalidState,
                &format!(
                    "Connection request {} does not answer an invitation of ours",
                    request.id
                ),
            ));
        }
        let record = ConnectionRecord {
            id: uuid::Uuid::new_v4().to_string(),
            out_of_band_id: oob.invitation.id.clone(),
            thread_id: request.id,
            role: PartyRole::Issuer,
            state: ConnectionState::RequestReceived,
            our_key: oob.invitation.recipient_key.clone(),
            their_key: request.key,
            their_endpoint: request.endpoint,
            their_label: request.label,
        };
        self.connections.insert(&record.id, record.clone())?;
        self.events
            .publish(AgentEvent::ConnectionStateChanged(record.clone()));
        if oob.auto_accept {
            self.accept_request(&record.id)?;
        }
        Ok(record.id)
    }

    pub fn accept_request(&self, connection_id: &str) -> AgentResult<()> {
        let record = self.get_by_id(connection_id)?;
        if record.state != ConnectionState::RequestReceived {
            return Err(AgentError::from_msg(
                AgentErrorKind::InvalidState,
                &format!(
                    "Connection {} is in state {:?}, no request to accept",
                    connection_id, record.state
                ),
            ));
        }
        let response = ConnectionResponse {
            thread_id: record.thread_id.clone(),
            key: record.our_key.clone(),
            endpoint: self.service_endpoint.clone(),
        };
        self.send_to(
            &record.their_endpoint,
            &AriesMessage::ConnectionResponse(response),
            &record.our_key,
            &record.their_key,
        )?;
        self.complete(connection_id, |_| {})
    }

    pub fn process_response(&self, response: ConnectionResponse) -> AgentResult<()> {
        let connection_id = self
            .connections
            .find_by(|(id, m)| {
                let record = m.lock().ok()?;
                (record.thread_id == response.thread_id && record.role == PartyRole::Holder)
                    .then(|| id.clone())
            })?
            .pop()
            .ok_or_else(|| {
                AgentError::from_msg(
                    AgentErrorKind::NotFound,
                    &format!("No connection awaits a response on thread {}", response.thread_id),
                )
            })?;
        let state = self.get_state(&connection_id)?;
        if state != ConnectionState::Requested {
            return Err(AgentError::from_msg(
                AgentErrorKind::InvalidState,
                &format!("Connection {} is in state {:?}", connection_id, state),
            ));
        }
        self.complete(&connection_id, |record| {
            record.their_key = response.key;
            record.their_endpoint = response.endpoint;
        })
    }

    fn complete<F>(&self, connection_id: &str, f: F) -> AgentResult<()>
    where
        F: FnOnce(&mut ConnectionRecord),
    {
        let record = self.connections.update(connection_id, |record| {
            f(record);
            record.state = ConnectionState::Completed;
            Ok(record.clone())
        })?;
        info!(
            "Connection {} with {} completed",
            record.id, record.their_label
        );
        self.events.publish(AgentEvent::ConnectionStateChanged(record));
        Ok(())
    }

    pub fn send_message(&self, connection_id: &str, message: &AriesMessage) -> AgentResult<()> {
        let record = self.get_by_id(connection_id)?;
        if !record.is_completed() {
            return Err(AgentError::from_msg(
                AgentErrorKind::ConnectionNotEstablished,
                &format!(
                    "Connection {} is in state {:?}, cannot send {}",
                    connection_id,
                    record.state,
                    message.kind()
                ),
            ));
        }
        debug!(
            "Sending {} over connection {}",
            message.kind(),
            connection_id
        );
        self.send_to(
            &record.their_endpoint,
            message,
            &record.our_key,
            &record.their_key,
        )
    }

    fn send_to(
        &self,
        endpoint: &Url,
        message: &AriesMessage,
        sender_key: &str,
        recipient_key: &str,
    ) -> AgentResult<()> {
        let envelope = Envelope::pack(message, sender_key, recipient_key)?;
        self.transport.send(endpoint, envelope)
    }

    pub fn get_by_id(&self, connection_id: &str) -> AgentResult<ConnectionRecord> {
        self.connections.get(connection_id)
    }

    pub fn get_state(&self, connection_id: &str) -> AgentResult<ConnectionState> {
        Ok(self.get_by_id(connection_id)?.state)
    }

    pub fn find_by_out_of_band_id(&self, oob_id: &str) -> AgentResult<Option<ConnectionRecord>> {
        let ids = self.connections.find_by(|(id, m)| {
            let record = m.lock().ok()?;
            (record.out_of_band_id == oob_id).then(|| id.clone())
        })?;
        match ids.first() {
            Some(id) => Ok(Some(self.get_by_id(id)?)),
            None => Ok(None),
        }
    }

    /// Resolves the connection an inbound envelope arrived on.
    pub fn find_by_keys(&self, our_key: &str, their_key: &str) -> AgentResult<ConnectionRecord> {
        let ids = self.connections.find_by(|(id, m)| {
            let record = m.lock().ok()?;
            (record.our_key == our_key && record.their_key == their_key).then(|| id.clone())
        })?;
        match ids.first() {
            Some(id) => self.get_by_id(id),
            None => Err(AgentError::from_msg(
                AgentErrorKind::NotFound,
                &format!("No connection between keys {} and {}", our_key, their_key),
            )),
        }
    }
}
